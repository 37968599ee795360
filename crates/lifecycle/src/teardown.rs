//! 크래시 안전 teardown
//!
//! `init`이 성공한 실행의 리소스는 실행이 어떻게 끝나든 정확히 한 번
//! destroy되어야 합니다.
//!
//! - 정상 종료 또는 검증 실패: [`Session::finish`](crate::driver::Session::finish)
//! - unwind되는 패닉: [`TeardownGuard`]의 `Drop`
//! - `panic = "abort"` 빌드 또는 패닉하는 훅 체인: [`install_crash_handler`]가
//!   설치하는 프로세스 전역 크래시 핸들러
//!
//! 세 경로 모두 [`Teardown::run`]으로 모이며, 첫 결과를 기록한 뒤 이후
//! 호출자에게는 엔진을 다시 호출하지 않고 기록을 반환합니다.
//!
//! 크래시 핸들러는 패닉이 `catch_unwind`로 잡힐지 알 수 없으므로 잡힌
//! 패닉에도 destroy를 실행합니다. 이후 해당 세션의 엔진 호출은
//! [`LifecycleError::TornDown`](crate::error::LifecycleError::TornDown)으로
//! 거부됩니다.

use std::panic;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, Once, PoisonError, TryLockError, Weak};
use std::thread::{self, ThreadId};

use serde::Serialize;
use tracing::{error, info, warn};

use tfprobe_core::metrics as m;

use crate::assembler::InvocationConfig;
use crate::engine::ProvisioningEngine;
use crate::verifier::parse_destroyed;

/// teardown 실행 원인
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TeardownTrigger {
    /// 정상 종료
    Normal,
    /// 패닉 이후 스택 unwind
    Unwind,
    /// 프로세스 전역 패닉 훅
    CrashHandler,
}

impl TeardownTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Unwind => "unwind",
            Self::CrashHandler => "crash_handler",
        }
    }
}

/// teardown 최종 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TeardownStatus {
    /// `destroy` 성공
    Destroyed,
    /// 프로비저닝된 것이 없어 `destroy`를 호출하지 않음
    Skipped,
    /// `destroy` 실패 (리소스가 남아 있을 수 있음)
    Failed,
}

impl TeardownStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Destroyed => "destroyed",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

/// 실행당 한 번뿐인 teardown의 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeardownRecord {
    pub status: TeardownStatus,
    pub trigger: TeardownTrigger,
    /// `destroy` 호출 횟수 (0 또는 1)
    pub destroy_calls: u32,
    /// `Destroy complete! Resources: N destroyed.`의 리소스 수
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destroyed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default)]
struct TeardownState {
    provisioned: bool,
    attempted: bool,
    record: Option<TeardownRecord>,
}

/// 한 실행의 리소스에 대한 정확히 한 번의 teardown
pub struct Teardown<E: ProvisioningEngine> {
    engine: Arc<E>,
    invocation: Arc<InvocationConfig>,
    state: Mutex<TeardownState>,
}

impl<E: ProvisioningEngine> Teardown<E> {
    pub fn new(engine: Arc<E>, invocation: Arc<InvocationConfig>) -> Self {
        Self {
            engine,
            invocation,
            state: Mutex::new(TeardownState::default()),
        }
    }

    /// 리소스 보유 상태로 표시합니다. 이후 teardown은 `destroy`를 호출합니다.
    pub fn mark_provisioned(&self) {
        self.lock().provisioned = true;
    }

    pub fn is_provisioned(&self) -> bool {
        self.lock().provisioned
    }

    /// teardown이 이미 실행됐다면 기록된 결과
    pub fn record(&self) -> Option<TeardownRecord> {
        self.lock().record.clone()
    }

    /// teardown을 실행하거나 이전 실행 결과를 반환합니다.
    ///
    /// 동시 호출자는 첫 호출이 끝날 때까지 대기합니다.
    pub fn run(&self, trigger: TeardownTrigger) -> TeardownRecord {
        let mut state = self.lock();
        self.run_locked(&mut state, trigger)
    }

    /// 패닉 훅용 [`run`](Self::run)
    ///
    /// 상태 잠금을 다른 곳에서 잡고 있으면 기다리지 않고 `None`을 반환합니다.
    /// 이 스레드에서 진행 중인 teardown 안에서 패닉이 난 경우입니다.
    pub fn run_from_crash_handler(&self) -> Option<TeardownRecord> {
        let mut state = match self.state.try_lock() {
            Ok(state) => state,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return None,
        };
        Some(self.run_locked(&mut state, TeardownTrigger::CrashHandler))
    }

    fn lock(&self) -> MutexGuard<'_, TeardownState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run_locked(&self, state: &mut TeardownState, trigger: TeardownTrigger) -> TeardownRecord {
        if let Some(record) = &state.record {
            return record.clone();
        }

        let run_id = self.invocation.run_id();

        // 이전 시도가 destroy 도중 패닉
        if state.attempted {
            let record = TeardownRecord {
                status: TeardownStatus::Failed,
                trigger,
                destroy_calls: 1,
                destroyed: None,
                error: Some("an earlier teardown attempt did not complete".to_owned()),
            };
            error!(run_id = %run_id, "teardown interrupted; resources may be left behind");
            return finish(state, record);
        }
        state.attempted = true;

        if !state.provisioned {
            info!(
                run_id = %run_id,
                trigger = trigger.as_str(),
                "nothing provisioned, skipping teardown"
            );
            let record = TeardownRecord {
                status: TeardownStatus::Skipped,
                trigger,
                destroy_calls: 0,
                destroyed: None,
                error: None,
            };
            return finish(state, record);
        }

        info!(
            run_id = %run_id,
            trigger = trigger.as_str(),
            engine = self.engine.name(),
            "tearing down"
        );

        let record = match self.engine.destroy(&self.invocation) {
            Ok(output) => {
                let destroyed = parse_destroyed(&output.stdout);
                info!(run_id = %run_id, destroyed = ?destroyed, "teardown complete");
                TeardownRecord {
                    status: TeardownStatus::Destroyed,
                    trigger,
                    destroy_calls: 1,
                    destroyed,
                    error: None,
                }
            }
            Err(e) => {
                error!(
                    run_id = %run_id,
                    module_dir = %self.invocation.module_dir().display(),
                    error = %e,
                    "teardown failed; resources may be left behind"
                );
                TeardownRecord {
                    status: TeardownStatus::Failed,
                    trigger,
                    destroy_calls: 1,
                    destroyed: None,
                    error: Some(e.to_string()),
                }
            }
        };
        finish(state, record)
    }
}

fn finish(state: &mut TeardownState, record: TeardownRecord) -> TeardownRecord {
    metrics::counter!(
        m::TEARDOWNS_TOTAL,
        m::LABEL_TRIGGER => record.trigger.as_str(),
        m::LABEL_RESULT => record.status.as_str()
    )
    .increment(1);
    state.record = Some(record.clone());
    record
}

/// drop 시 teardown 실행
///
/// 패닉 중 drop되면 [`TeardownTrigger::Unwind`]로 기록합니다.
pub struct TeardownGuard<E: ProvisioningEngine> {
    teardown: Arc<Teardown<E>>,
    _registration: CrashRegistration,
}

impl<E: ProvisioningEngine> TeardownGuard<E> {
    /// guard를 무장하고 teardown을 크래시 핸들러에 등록합니다.
    pub fn arm(teardown: Arc<Teardown<E>>) -> Self {
        let registration = register_for_crash(&teardown);
        Self {
            teardown,
            _registration: registration,
        }
    }

    pub fn teardown(&self) -> &Arc<Teardown<E>> {
        &self.teardown
    }
}

impl<E: ProvisioningEngine> Drop for TeardownGuard<E> {
    fn drop(&mut self) {
        let trigger = if thread::panicking() {
            TeardownTrigger::Unwind
        } else {
            TeardownTrigger::Normal
        };
        let record = self.teardown.run(trigger);
        if trigger == TeardownTrigger::Unwind {
            warn!(
                run_id = %self.teardown.invocation.run_id(),
                status = record.status.as_str(),
                "teardown after panic"
            );
        }
    }
}

/// 프로세스 전역 패닉 훅에서 호출되는 정리 작업
pub trait Finalize: Send + Sync {
    fn finalize_from_crash(&self);
}

impl<E: ProvisioningEngine> Finalize for Teardown<E> {
    fn finalize_from_crash(&self) {
        let _ = self.run_from_crash_handler();
    }
}

struct PendingEntry {
    id: u64,
    thread: ThreadId,
    target: Weak<dyn Finalize>,
}

static PENDING: LazyLock<Mutex<Vec<PendingEntry>>> = LazyLock::new(|| Mutex::new(Vec::new()));
static NEXT_ID: AtomicU64 = AtomicU64::new(1);
static INSTALL: Once = Once::new();

/// drop 시 크래시 레지스트리에서 finalizer를 제거
pub struct CrashRegistration {
    id: u64,
}

impl Drop for CrashRegistration {
    fn drop(&mut self) {
        let mut pending = PENDING.lock().unwrap_or_else(PoisonError::into_inner);
        pending.retain(|entry| entry.id != self.id);
    }
}

/// 현재 스레드가 패닉하면 `target`을 정리하도록 등록합니다.
pub fn register_for_crash<T: Finalize + 'static>(target: &Arc<T>) -> CrashRegistration {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    let weak: Weak<T> = Arc::downgrade(target);
    let target: Weak<dyn Finalize> = weak;
    PENDING
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(PendingEntry {
            id,
            thread: thread::current().id(),
            target,
        });
    CrashRegistration { id }
}

/// 현재 등록된 finalizer 수
pub fn pending_finalizers() -> usize {
    PENDING
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .len()
}

/// 이전 훅을 연결하여 프로세스 전역 패닉 훅을 설치합니다.
///
/// 여러 번 호출해도 한 번만 설치됩니다. 패닉이 나면 이전 훅을 먼저 실행한 뒤
/// 패닉한 스레드가 등록한 finalizer를 실행합니다.
pub fn install_crash_handler() {
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            previous(info);
            run_thread_finalizers();
        }));
    });
}

fn run_thread_finalizers() {
    let current = thread::current().id();
    let targets: Vec<Arc<dyn Finalize>> = match PENDING.try_lock() {
        Ok(pending) => collect(&pending, current),
        Err(TryLockError::Poisoned(poisoned)) => collect(&poisoned.into_inner(), current),
        Err(TryLockError::WouldBlock) => return,
    };
    for target in targets {
        target.finalize_from_crash();
    }
}

fn collect(pending: &[PendingEntry], thread: ThreadId) -> Vec<Arc<dyn Finalize>> {
    pending
        .iter()
        .filter(|entry| entry.thread == thread)
        .filter_map(|entry| entry.target.upgrade())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockEngine;
    use tfprobe_core::types::RunIdentity;

    fn teardown(engine: MockEngine) -> (Arc<MockEngine>, Arc<Teardown<MockEngine>>) {
        let engine = Arc::new(engine);
        let id = RunIdentity::parse("td01").unwrap();
        let invocation = Arc::new(InvocationConfig::builder("/tmp/module", &id).build().unwrap());
        let teardown = Arc::new(Teardown::new(Arc::clone(&engine), invocation));
        (engine, teardown)
    }

    #[test]
    fn skipped_when_nothing_provisioned() {
        let (engine, td) = teardown(MockEngine::new());
        let record = td.run(TeardownTrigger::Normal);
        assert_eq!(record.status, TeardownStatus::Skipped);
        assert_eq!(record.destroy_calls, 0);
        assert_eq!(engine.count("destroy"), 0);
    }

    #[test]
    fn destroys_exactly_once() {
        let (engine, td) = teardown(MockEngine::new());
        td.mark_provisioned();

        let first = td.run(TeardownTrigger::Normal);
        let second = td.run(TeardownTrigger::Unwind);
        let third = td.run_from_crash_handler().unwrap();

        assert_eq!(first.status, TeardownStatus::Destroyed);
        assert_eq!(first.destroyed, Some(2));
        assert_eq!(second, first);
        assert_eq!(third, first);
        assert_eq!(engine.count("destroy"), 1);
    }

    #[test]
    fn failed_destroy_is_recorded_not_retried() {
        let (engine, td) = teardown(MockEngine::new().with_failing_destroy());
        td.mark_provisioned();

        let record = td.run(TeardownTrigger::Normal);
        assert_eq!(record.status, TeardownStatus::Failed);
        assert!(record.error.unwrap().contains("mock destroy failure"));

        td.run(TeardownTrigger::Normal);
        assert_eq!(engine.count("destroy"), 1);
    }

    #[test]
    fn concurrent_callers_share_one_destroy() {
        let (engine, td) = teardown(MockEngine::new());
        td.mark_provisioned();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let td = Arc::clone(&td);
                thread::spawn(move || td.run(TeardownTrigger::Normal))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().status, TeardownStatus::Destroyed);
        }
        assert_eq!(engine.count("destroy"), 1);
    }

    #[test]
    fn guard_drop_runs_normal_teardown() {
        let (engine, td) = teardown(MockEngine::new());
        td.mark_provisioned();
        {
            let _guard = TeardownGuard::arm(Arc::clone(&td));
        }
        assert_eq!(td.record().unwrap().trigger, TeardownTrigger::Normal);
        assert_eq!(engine.count("destroy"), 1);
    }

    #[test]
    fn unwinding_guard_records_unwind_trigger() {
        let (engine, td) = teardown(MockEngine::new());
        td.mark_provisioned();

        let guard_td = Arc::clone(&td);
        let result = panic::catch_unwind(panic::AssertUnwindSafe(move || {
            let _guard = TeardownGuard::arm(guard_td);
            panic!("assertion inside test body");
        }));

        assert!(result.is_err());
        assert_eq!(td.record().unwrap().trigger, TeardownTrigger::Unwind);
        assert_eq!(engine.count("destroy"), 1);
    }

    #[test]
    fn registration_is_removed_on_drop() {
        let (_engine, td) = teardown(MockEngine::new());
        let id = {
            let registration = register_for_crash(&td);
            let pending = PENDING.lock().unwrap();
            assert!(pending.iter().any(|e| e.id == registration.id));
            registration.id
        };
        let pending = PENDING.lock().unwrap();
        assert!(!pending.iter().any(|e| e.id == id));
    }

    #[test]
    fn trigger_and_status_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&TeardownTrigger::CrashHandler).unwrap(),
            "\"crash_handler\""
        );
        assert_eq!(
            serde_json::to_string(&TeardownStatus::Destroyed).unwrap(),
            "\"destroyed\""
        );
    }
}
