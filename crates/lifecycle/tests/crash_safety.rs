//! 크래시 안전성 테스트 -- 프로세스 전역 패닉 훅을 통한 teardown 검증
//!
//! 훅은 전역이므로 모든 테스트가 훅을 설치하고 직렬로 실행됩니다.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use serial_test::serial;

use tfprobe_core::error::EngineError;
use tfprobe_core::types::RunIdentity;
use tfprobe_lifecycle::teardown::{Teardown, TeardownGuard, pending_finalizers};
use tfprobe_lifecycle::{
    CommandOutput, InvocationConfig, LifecycleError, PlanResult, ProvisioningEngine, Session,
    TeardownStatus, TeardownTrigger, install_crash_handler,
};

/// `apply`가 패닉하는 엔진 (크래시하는 provider 플러그인 모사)
#[derive(Default)]
struct CrashingEngine {
    destroys: AtomicUsize,
}

/// apply/destroy 횟수만 기록하는 정상 엔진
#[derive(Default)]
struct CountingEngine {
    applies: AtomicUsize,
    destroys: AtomicUsize,
}

fn ok(command: &str, stdout: &str) -> CommandOutput {
    CommandOutput {
        command: command.to_owned(),
        exit_code: Some(0),
        stdout: stdout.to_owned(),
        stderr: String::new(),
    }
}

impl ProvisioningEngine for CrashingEngine {
    fn name(&self) -> &str {
        "crashing"
    }

    fn init(&self, _invocation: &InvocationConfig) -> Result<CommandOutput, EngineError> {
        Ok(ok("init", ""))
    }

    fn apply(&self, _invocation: &InvocationConfig) -> Result<CommandOutput, EngineError> {
        panic!("provider crashed during apply");
    }

    fn plan(&self, _invocation: &InvocationConfig) -> Result<PlanResult, EngineError> {
        Ok(PlanResult {
            changes: false,
            output: ok("plan", ""),
        })
    }

    fn output(&self, _invocation: &InvocationConfig, name: &str) -> Result<String, EngineError> {
        Ok(name.to_owned())
    }

    fn destroy(&self, _invocation: &InvocationConfig) -> Result<CommandOutput, EngineError> {
        self.destroys.fetch_add(1, Ordering::SeqCst);
        Ok(ok("destroy", "Destroy complete! Resources: 1 destroyed."))
    }
}

impl ProvisioningEngine for CountingEngine {
    fn name(&self) -> &str {
        "counting"
    }

    fn init(&self, _invocation: &InvocationConfig) -> Result<CommandOutput, EngineError> {
        Ok(ok("init", ""))
    }

    fn apply(&self, _invocation: &InvocationConfig) -> Result<CommandOutput, EngineError> {
        self.applies.fetch_add(1, Ordering::SeqCst);
        Ok(ok(
            "apply",
            "Apply complete! Resources: 1 added, 0 changed, 0 destroyed.",
        ))
    }

    fn plan(&self, _invocation: &InvocationConfig) -> Result<PlanResult, EngineError> {
        Ok(PlanResult {
            changes: false,
            output: ok("plan", ""),
        })
    }

    fn output(&self, _invocation: &InvocationConfig, name: &str) -> Result<String, EngineError> {
        Ok(name.to_owned())
    }

    fn destroy(&self, _invocation: &InvocationConfig) -> Result<CommandOutput, EngineError> {
        self.destroys.fetch_add(1, Ordering::SeqCst);
        Ok(ok("destroy", "Destroy complete! Resources: 1 destroyed."))
    }
}

fn invocation(raw: &str) -> Arc<InvocationConfig> {
    let id = RunIdentity::parse(raw).unwrap();
    Arc::new(InvocationConfig::builder("/tmp/module", &id).build().unwrap())
}

#[test]
#[serial]
fn panic_hook_tears_down_before_unwinding() {
    install_crash_handler();

    let engine = Arc::new(CrashingEngine::default());
    let teardown = Arc::new(Teardown::new(Arc::clone(&engine), invocation("crash1")));
    teardown.mark_provisioned();

    let armed = Arc::clone(&teardown);
    let result = panic::catch_unwind(AssertUnwindSafe(move || {
        let _guard = TeardownGuard::arm(armed);
        panic!("assertion failed inside the test body");
    }));

    assert!(result.is_err());
    let record = teardown.record().expect("teardown ran");
    assert_eq!(record.trigger, TeardownTrigger::CrashHandler);
    assert_eq!(record.status, TeardownStatus::Destroyed);
    assert_eq!(engine.destroys.load(Ordering::SeqCst), 1);
}

#[test]
#[serial]
fn engine_panic_mid_session_destroys_once() {
    install_crash_handler();

    let engine = Arc::new(CrashingEngine::default());
    let session_engine = Arc::clone(&engine);
    let result = panic::catch_unwind(AssertUnwindSafe(move || {
        let mut session = Session::start(session_engine, invocation("crash2"));
        session.init().unwrap();
        let _ = session.apply();
    }));

    assert!(result.is_err());
    assert_eq!(engine.destroys.load(Ordering::SeqCst), 1);
}

#[test]
#[serial]
fn other_threads_panics_do_not_trigger_teardown() {
    install_crash_handler();

    let engine = Arc::new(CrashingEngine::default());
    let teardown = Arc::new(Teardown::new(Arc::clone(&engine), invocation("crash3")));
    teardown.mark_provisioned();
    let guard = TeardownGuard::arm(Arc::clone(&teardown));

    let handle = thread::spawn(|| panic!("unrelated worker panic"));
    assert!(handle.join().is_err());
    assert!(teardown.record().is_none());
    assert_eq!(engine.destroys.load(Ordering::SeqCst), 0);

    drop(guard);
    assert_eq!(teardown.record().unwrap().trigger, TeardownTrigger::Normal);
    assert_eq!(engine.destroys.load(Ordering::SeqCst), 1);
}

#[test]
#[serial]
fn finished_sessions_leave_no_pending_finalizers() {
    install_crash_handler();

    let before = pending_finalizers();
    let engine = Arc::new(CrashingEngine::default());
    let mut session = Session::start(Arc::clone(&engine), invocation("crash4"));
    assert_eq!(pending_finalizers(), before + 1);

    session.init().unwrap();
    let summary = session.finish();

    assert_eq!(summary.teardown.status, TeardownStatus::Destroyed);
    assert_eq!(pending_finalizers(), before);
}

#[test]
#[serial]
fn caught_panic_ends_a_live_session() {
    install_crash_handler();

    let engine = Arc::new(CountingEngine::default());
    let mut session = Session::start(Arc::clone(&engine), invocation("crash5"));
    session.init_and_apply().unwrap();

    // 같은 스레드에서 잡힌 패닉도 훅을 거쳐 destroy를 실행함
    let caught = panic::catch_unwind(|| panic!("helper assertion caught by the caller"));
    assert!(caught.is_err());
    assert_eq!(engine.destroys.load(Ordering::SeqCst), 1);

    // 이미 정리된 세션은 다시 프로비저닝하지 않음
    let err = session.reapply().unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::TornDown {
            trigger: TeardownTrigger::CrashHandler,
            ..
        }
    ));
    assert!(session.is_failed());
    assert_eq!(engine.applies.load(Ordering::SeqCst), 1);

    let summary = session.finish();
    assert_eq!(summary.teardown.trigger, TeardownTrigger::CrashHandler);
    assert_eq!(summary.teardown.status, TeardownStatus::Destroyed);
    assert_eq!(engine.destroys.load(Ordering::SeqCst), 1);
}
