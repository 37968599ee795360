//! 라이프사이클 드라이버
//!
//! [`Session`]은 하나의 호출 설정을 프로비저닝 상태 머신에 따라 진행합니다.
//!
//! ```text
//! Configured ─init─▶ Initialized ─apply─▶ Applied ─verify─▶ Verified
//!      │                  │              │   ▲ reapply        │
//!      └──────────────────┴──── Failed ◀─┴───┘                │
//!                               │                             │
//!                               └──────── teardown ──────▶ Destroyed
//! ```
//!
//! [`TeardownGuard`]는 세션 시작 시점부터 무장되어 있습니다.
//! [`LifecycleDriver`]는 선언적 [`RunPlan`] 전체를 세션으로 실행하고
//! [`RunReport`]를 만듭니다.
//!
//! teardown이 한 번 실행된 세션(크래시 핸들러 경로 포함)은 더 이상 엔진
//! 호출을 받지 않고 `Failed`로 전환됩니다.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info};

use tfprobe_core::config::CaseConfig;
use tfprobe_core::metrics as m;
use tfprobe_core::types::{IdempotenceCheck, Phase, RunIdentity};

use crate::assembler::{InvocationConfig, assemble_case};
use crate::engine::{CommandOutput, PlanResult, ProvisioningEngine};
use crate::error::LifecycleError;
use crate::teardown::{Teardown, TeardownGuard, TeardownRecord, TeardownStatus, TeardownTrigger};
use crate::verifier::{CheckOutcome, Expectation, OutcomeVerifier, ProvisioningResult};

/// 하나의 호출 설정에 대한 프로비저닝 실행
///
/// teardown은 반드시 실행됩니다. [`finish`](Self::finish)가 명시적으로 실행하고,
/// 세션이 drop되면(패닉 포함) guard가 실행합니다.
pub struct Session<E: ProvisioningEngine> {
    engine: Arc<E>,
    invocation: Arc<InvocationConfig>,
    guard: TeardownGuard<E>,
    phase: Phase,
    trail: Vec<Phase>,
    last_apply: Option<ProvisioningResult>,
    interrupt: Option<Arc<AtomicBool>>,
    started: Instant,
}

/// 종료된 세션의 진행 기록
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub phases: Vec<Phase>,
    pub teardown: TeardownRecord,
    pub duration: Duration,
}

impl SessionSummary {
    pub fn final_phase(&self) -> Phase {
        self.phases.last().copied().unwrap_or(Phase::Configured)
    }
}

impl<E: ProvisioningEngine> Session<E> {
    /// 다른 어떤 작업보다 먼저 teardown을 무장하고 크래시 핸들러에 등록합니다.
    pub fn start(engine: Arc<E>, invocation: impl Into<Arc<InvocationConfig>>) -> Self {
        let invocation = invocation.into();
        let teardown = Arc::new(Teardown::new(Arc::clone(&engine), Arc::clone(&invocation)));
        let guard = TeardownGuard::arm(teardown);

        debug!(
            run_id = %invocation.run_id(),
            module_dir = %invocation.module_dir().display(),
            "session started"
        );

        Self {
            engine,
            invocation,
            guard,
            phase: Phase::Configured,
            trail: vec![Phase::Configured],
            last_apply: None,
            interrupt: None,
            started: Instant::now(),
        }
    }

    /// 모든 엔진 호출 전에 `flag`를 확인합니다.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn phases(&self) -> &[Phase] {
        &self.trail
    }

    pub fn invocation(&self) -> &InvocationConfig {
        &self.invocation
    }

    pub fn run_id(&self) -> &RunIdentity {
        self.invocation.run_id()
    }

    pub fn last_apply(&self) -> Option<&ProvisioningResult> {
        self.last_apply.as_ref()
    }

    /// `init` 실행. 성공 이후부터 리소스가 존재하는 것으로 간주합니다.
    pub fn init(&mut self) -> Result<CommandOutput, LifecycleError> {
        self.ensure(Phase::Initialized)?;
        self.before_engine_call()?;

        match self.engine.init(&self.invocation) {
            Ok(output) => {
                self.guard.teardown().mark_provisioned();
                self.advance(Phase::Initialized);
                Ok(output)
            }
            Err(e) => {
                self.fail();
                Err(LifecycleError::Init(e))
            }
        }
    }

    /// 첫 번째 `apply` 실행
    pub fn apply(&mut self) -> Result<ProvisioningResult, LifecycleError> {
        if self.phase != Phase::Initialized {
            return Err(self.reject(Phase::Applied));
        }
        self.run_apply()
    }

    /// `init` 후 `apply`
    pub fn init_and_apply(&mut self) -> Result<ProvisioningResult, LifecycleError> {
        self.init()?;
        self.apply()
    }

    /// 동일한 설정으로 다시 apply
    pub fn reapply(&mut self) -> Result<ProvisioningResult, LifecycleError> {
        if self.phase != Phase::Applied {
            return Err(self.reject(Phase::Applied));
        }
        self.run_apply()
    }

    /// 적용된 상태를 바꾸지 않고 plan 실행
    pub fn plan(&mut self) -> Result<PlanResult, LifecycleError> {
        if self.phase != Phase::Applied {
            return Err(self.reject(Phase::Applied));
        }
        self.before_engine_call()?;

        self.engine.plan(&self.invocation).map_err(|e| {
            self.fail();
            LifecycleError::Plan(e)
        })
    }

    /// output 값 조회. 조회 실패는 단계를 바꾸지 않습니다.
    pub fn output(&mut self, name: &str) -> Result<String, LifecycleError> {
        if !matches!(self.phase, Phase::Applied | Phase::Verified) {
            return Err(self.reject(Phase::Verified));
        }
        self.before_engine_call()?;

        self.engine
            .output(&self.invocation, name)
            .map_err(|source| LifecycleError::Output {
                name: name.to_owned(),
                source,
            })
    }

    /// 모든 검증 통과를 기록합니다.
    pub fn mark_verified(&mut self) -> Result<(), LifecycleError> {
        self.ensure(Phase::Verified)?;
        self.check_torn_down()?;
        self.advance(Phase::Verified);
        Ok(())
    }

    /// 세션을 `Failed`로 전환합니다. teardown은 그대로 실행됩니다.
    pub fn fail(&mut self) {
        if self.phase != Phase::Failed && !self.phase.is_terminal() {
            self.advance(Phase::Failed);
        }
    }

    pub fn is_failed(&self) -> bool {
        self.phase == Phase::Failed
    }

    /// teardown 후 단계 기록을 반환합니다.
    pub fn finish(mut self) -> SessionSummary {
        let teardown = self.guard.teardown().run(TeardownTrigger::Normal);
        match teardown.status {
            TeardownStatus::Destroyed | TeardownStatus::Skipped => self.advance(Phase::Destroyed),
            TeardownStatus::Failed => self.fail(),
        }

        SessionSummary {
            phases: std::mem::take(&mut self.trail),
            teardown,
            duration: self.started.elapsed(),
        }
    }

    fn run_apply(&mut self) -> Result<ProvisioningResult, LifecycleError> {
        self.before_engine_call()?;

        match self.engine.apply(&self.invocation) {
            Ok(output) => {
                let result = ProvisioningResult::from_output(output);
                debug!(
                    run_id = %self.invocation.run_id(),
                    summary = result.summary_text.as_deref().unwrap_or("<none>"),
                    "apply finished"
                );
                self.last_apply = Some(result.clone());
                self.advance(Phase::Applied);
                Ok(result)
            }
            Err(e) => {
                self.fail();
                Err(LifecycleError::Apply(e))
            }
        }
    }

    fn ensure(&mut self, next: Phase) -> Result<(), LifecycleError> {
        if self.phase.can_advance_to(next) {
            Ok(())
        } else {
            Err(self.reject(next))
        }
    }

    fn reject(&mut self, next: Phase) -> LifecycleError {
        let from = self.phase;
        self.fail();
        LifecycleError::InvalidTransition { from, to: next }
    }

    fn before_engine_call(&mut self) -> Result<(), LifecycleError> {
        self.check_torn_down()?;
        self.check_interrupt()
    }

    /// 크래시 핸들러가 이미 destroy한 세션은 다시 프로비저닝하지 않습니다.
    fn check_torn_down(&mut self) -> Result<(), LifecycleError> {
        let Some(record) = self.guard.teardown().record() else {
            return Ok(());
        };
        let phase = self.phase;
        self.fail();
        error!(
            run_id = %self.invocation.run_id(),
            phase = %phase,
            trigger = record.trigger.as_str(),
            "engine call after teardown rejected"
        );
        Err(LifecycleError::TornDown {
            phase,
            trigger: record.trigger,
        })
    }

    fn check_interrupt(&mut self) -> Result<(), LifecycleError> {
        let interrupted = self
            .interrupt
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst));
        if interrupted {
            let phase = self.phase;
            self.fail();
            return Err(LifecycleError::Interrupted { phase });
        }
        Ok(())
    }

    fn advance(&mut self, next: Phase) {
        debug!(
            run_id = %self.invocation.run_id(),
            from = %self.phase,
            to = %next,
            "phase transition"
        );
        self.phase = next;
        self.trail.push(next);
    }
}

/// 한 실행의 선언적 기술
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub name: String,
    pub invocation: InvocationConfig,
    pub idempotence: IdempotenceCheck,
    pub expectations: Vec<Expectation>,
}

impl RunPlan {
    pub fn new(name: impl Into<String>, invocation: InvocationConfig) -> Self {
        Self {
            name: name.into(),
            invocation,
            idempotence: IdempotenceCheck::None,
            expectations: Vec::new(),
        }
    }

    pub fn with_idempotence(mut self, check: IdempotenceCheck) -> Self {
        self.idempotence = check;
        self
    }

    pub fn expect(mut self, expectation: Expectation) -> Self {
        self.expectations.push(expectation);
        self
    }

    /// 설정된 케이스로 plan을 만들고 기대값의 `{run_id}`를 치환합니다.
    pub fn from_case(
        case: &CaseConfig,
        run_id: &RunIdentity,
        base_dir: &Path,
    ) -> Result<Self, LifecycleError> {
        let invocation = assemble_case(case, run_id, base_dir)?;
        let expectations = case
            .expect
            .iter()
            .map(|e| Expectation::from_config(e, run_id))
            .collect();
        Ok(Self {
            name: case.name.clone(),
            invocation,
            idempotence: case.idempotence,
            expectations,
        })
    }
}

/// 한 실행의 결과 (`--output json`용 직렬화 지원)
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub name: String,
    pub run_id: RunIdentity,
    pub phases: Vec<Phase>,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub checks: Vec<CheckOutcome>,
    pub teardown: TeardownRecord,
    pub duration_ms: u64,
}

impl RunReport {
    /// 실행의 모든 실패 메시지
    pub fn failures(&self) -> Vec<String> {
        let mut failures = Vec::new();
        if let Some(error) = &self.error {
            failures.push(error.clone());
        }
        failures.extend(self.checks.iter().filter_map(|c| c.message.clone()));
        if let Some(error) = &self.teardown.error {
            failures.push(format!("teardown: {error}"));
        }
        failures
    }

    /// 실행이 실패했으면 모든 실패 메시지와 함께 패닉합니다.
    ///
    /// 리포트가 만들어진 시점에는 teardown이 이미 끝나 있습니다.
    pub fn assert_passed(&self) {
        if !self.passed {
            panic!(
                "run '{}' (run id {}) failed:\n  - {}",
                self.name,
                self.run_id,
                self.failures().join("\n  - ")
            );
        }
    }
}

/// [`RunPlan`]을 처음부터 끝까지 실행
pub struct LifecycleDriver<E: ProvisioningEngine> {
    engine: Arc<E>,
    verifier: OutcomeVerifier,
    interrupt: Option<Arc<AtomicBool>>,
}

impl<E: ProvisioningEngine> LifecycleDriver<E> {
    pub fn new(engine: Arc<E>) -> Self {
        Self {
            engine,
            verifier: OutcomeVerifier::new(),
            interrupt: None,
        }
    }

    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    /// init → apply → 멱등성 확인 → 검증 → teardown
    ///
    /// teardown 이전 단계의 실패는 실행을 실패로 표시할 뿐이며 teardown은
    /// 항상 실행됩니다.
    pub fn run(&self, plan: RunPlan) -> RunReport {
        let RunPlan {
            name,
            invocation,
            idempotence,
            expectations,
        } = plan;
        let run_id = invocation.run_id().clone();

        info!(
            case = %name,
            run_id = %run_id,
            engine = self.engine.name(),
            idempotence = %idempotence,
            "starting run"
        );

        let mut session = Session::start(Arc::clone(&self.engine), invocation);
        if let Some(flag) = &self.interrupt {
            session = session.with_interrupt(Arc::clone(flag));
        }

        let mut checks = Vec::new();
        let error = match self.drive(&mut session, idempotence, &expectations, &mut checks) {
            Ok(()) => None,
            Err(e) => {
                session.fail();
                Some(e.to_string())
            }
        };

        let summary = session.finish();
        let passed = error.is_none()
            && checks.iter().all(|c| c.passed)
            && summary.teardown.status != TeardownStatus::Failed;

        let result = if passed { "passed" } else { "failed" };
        metrics::counter!(m::RUNS_TOTAL, m::LABEL_RESULT => result).increment(1);
        metrics::histogram!(m::RUN_DURATION_SECONDS).record(summary.duration.as_secs_f64());

        if passed {
            info!(case = %name, run_id = %run_id, "run passed");
        } else {
            error!(
                case = %name,
                run_id = %run_id,
                error = error.as_deref().unwrap_or_default(),
                teardown = summary.teardown.status.as_str(),
                "run failed"
            );
        }

        RunReport {
            name,
            run_id,
            phases: summary.phases,
            passed,
            error,
            checks,
            teardown: summary.teardown,
            duration_ms: u64::try_from(summary.duration.as_millis()).unwrap_or(u64::MAX),
        }
    }

    fn drive(
        &self,
        session: &mut Session<E>,
        idempotence: IdempotenceCheck,
        expectations: &[Expectation],
        checks: &mut Vec<CheckOutcome>,
    ) -> Result<(), LifecycleError> {
        let mut last = session.init_and_apply()?;

        match idempotence {
            IdempotenceCheck::None => {}
            IdempotenceCheck::Reapply => {
                last = session.reapply()?;
                checks.push(self.verifier.check_no_drift(&last));
            }
            IdempotenceCheck::Plan => {
                let plan = session.plan()?;
                checks.push(self.verifier.check_plan_clean(&plan));
            }
        }

        checks.extend(
            self.verifier
                .verify(expectations, &last, |name| session.output(name)),
        );

        if checks.iter().all(|c| c.passed) {
            session.mark_verified()?;
        } else {
            session.fail();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockEngine;
    use crate::verifier::NO_CHANGES_SUMMARY;

    const OUTPUT: &str = "lambda_forwarder_rds_enhanced_monitoring_function_name";

    fn invocation(raw_id: &str) -> InvocationConfig {
        let id = RunIdentity::parse(raw_id).unwrap();
        InvocationConfig::builder("/tmp/examples/complete", &id)
            .var_file("fixtures.us-east-2.tfvars")
            .build()
            .unwrap()
    }

    fn expected_name(id: &str) -> String {
        format!("eg-ue2-test-datadog-forwarder-{id}-forwarder-log")
    }

    #[test]
    fn happy_path_walks_every_phase() {
        let engine = Arc::new(
            MockEngine::new()
                .with_apply_stdout("Apply complete! Resources: 7 added, 0 changed, 0 destroyed.")
                .with_output(OUTPUT, &expected_name("28424")),
        );
        let plan = RunPlan::new("rds", invocation("28424"))
            .expect(Expectation::output_equals(OUTPUT, expected_name("28424")));

        let report = LifecycleDriver::new(Arc::clone(&engine)).run(plan);

        report.assert_passed();
        assert_eq!(
            report.phases,
            vec![
                Phase::Configured,
                Phase::Initialized,
                Phase::Applied,
                Phase::Verified,
                Phase::Destroyed
            ]
        );
        assert_eq!(report.teardown.status, TeardownStatus::Destroyed);
        assert_eq!(engine.calls(), vec!["init", "apply", "output", "destroy"]);
    }

    #[test]
    fn mismatch_fails_but_still_destroys() {
        let engine = Arc::new(MockEngine::new().with_output(OUTPUT, &expected_name("99999")));
        let plan = RunPlan::new("rds", invocation("28424"))
            .expect(Expectation::output_equals(OUTPUT, expected_name("28424")));

        let report = LifecycleDriver::new(Arc::clone(&engine)).run(plan);

        assert!(!report.passed);
        assert!(report.error.is_none());
        let failures = report.failures().join("\n");
        assert!(failures.contains(&expected_name("28424")));
        assert!(failures.contains(&expected_name("99999")));
        assert_eq!(report.phases.last(), Some(&Phase::Destroyed));
        assert!(report.phases.contains(&Phase::Failed));
        assert_eq!(engine.count("destroy"), 1);
    }

    #[test]
    fn apply_failure_still_destroys() {
        let engine = Arc::new(MockEngine::new().with_failing_apply());
        let report = LifecycleDriver::new(Arc::clone(&engine)).run(RunPlan::new("x", invocation("ap01")));

        assert!(!report.passed);
        assert!(report.error.as_deref().unwrap().starts_with("apply failed"));
        assert_eq!(report.teardown.status, TeardownStatus::Destroyed);
        assert_eq!(engine.count("destroy"), 1);
    }

    #[test]
    fn init_failure_skips_destroy() {
        let engine = Arc::new(MockEngine::new().with_failing_init());
        let report = LifecycleDriver::new(Arc::clone(&engine)).run(RunPlan::new("x", invocation("in01")));

        assert!(!report.passed);
        assert_eq!(report.teardown.status, TeardownStatus::Skipped);
        assert_eq!(engine.count("destroy"), 0);
        assert_eq!(engine.count("apply"), 0);
    }

    #[test]
    fn reapply_reports_drift() {
        let engine = Arc::new(
            MockEngine::new()
                .with_apply_stdout("Apply complete! Resources: 3 added, 0 changed, 0 destroyed.")
                .with_apply_stdout("Apply complete! Resources: 0 added, 1 changed, 0 destroyed."),
        );
        let plan =
            RunPlan::new("x", invocation("re01")).with_idempotence(IdempotenceCheck::Reapply);
        let report = LifecycleDriver::new(Arc::clone(&engine)).run(plan);

        assert!(!report.passed);
        assert_eq!(engine.count("apply"), 2);
        assert_eq!(report.checks.len(), 1);
        assert_eq!(report.checks[0].expected, NO_CHANGES_SUMMARY);
    }

    #[test]
    fn summary_expectation_checks_last_apply() {
        let engine = Arc::new(
            MockEngine::new()
                .with_apply_stdout("Apply complete! Resources: 3 added, 0 changed, 0 destroyed."),
        );
        let plan = RunPlan::new("x", invocation("re02"))
            .with_idempotence(IdempotenceCheck::Reapply)
            .expect(Expectation::summary_equals(NO_CHANGES_SUMMARY));
        let report = LifecycleDriver::new(engine).run(plan);
        report.assert_passed();
    }

    #[test]
    fn plan_idempotence_detects_changes() {
        let engine = Arc::new(MockEngine::new().with_plan_changes());
        let plan = RunPlan::new("x", invocation("pl01")).with_idempotence(IdempotenceCheck::Plan);
        let report = LifecycleDriver::new(Arc::clone(&engine)).run(plan);

        assert!(!report.passed);
        assert_eq!(engine.count("plan"), 1);
        assert_eq!(engine.count("destroy"), 1);
    }

    #[test]
    fn interrupt_fails_run_and_tears_down() {
        let engine = Arc::new(MockEngine::new());
        let flag = Arc::new(AtomicBool::new(false));
        let inv = invocation("it01");

        let mut session = Session::start(Arc::clone(&engine), inv).with_interrupt(Arc::clone(&flag));
        session.init_and_apply().unwrap();
        flag.store(true, Ordering::SeqCst);

        let err = session.output(OUTPUT).unwrap_err();
        assert!(matches!(err, LifecycleError::Interrupted { phase: Phase::Applied }));
        assert!(session.is_failed());

        let summary = session.finish();
        assert_eq!(summary.teardown.status, TeardownStatus::Destroyed);
        assert_eq!(summary.final_phase(), Phase::Destroyed);
    }

    #[test]
    fn apply_before_init_is_rejected() {
        let engine = Arc::new(MockEngine::new());
        let mut session = Session::start(Arc::clone(&engine), invocation("tr01"));

        let err = session.apply().unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InvalidTransition {
                from: Phase::Configured,
                to: Phase::Applied
            }
        ));
        assert!(session.is_failed());

        // Failed 이후에는 아무것도 실행하지 않음
        assert!(session.init().is_err());
        assert!(engine.calls().is_empty());

        let summary = session.finish();
        assert_eq!(summary.teardown.status, TeardownStatus::Skipped);
    }

    #[test]
    fn reapply_requires_applied() {
        let engine = Arc::new(MockEngine::new());
        let mut session = Session::start(engine, invocation("tr02"));
        session.init().unwrap();
        assert!(matches!(
            session.reapply(),
            Err(LifecycleError::InvalidTransition {
                from: Phase::Initialized,
                ..
            })
        ));
    }

    #[test]
    fn dropping_a_session_tears_down() {
        let engine = Arc::new(MockEngine::new());
        {
            let mut session = Session::start(Arc::clone(&engine), invocation("dr01"));
            session.init_and_apply().unwrap();
        }
        assert_eq!(engine.count("destroy"), 1);
    }

    #[test]
    fn engine_calls_after_teardown_are_rejected() {
        let engine = Arc::new(MockEngine::new());
        let mut session = Session::start(Arc::clone(&engine), invocation("td02"));
        session.init_and_apply().unwrap();

        // 크래시 핸들러가 세션 도중 destroy한 상황
        let record = session.guard.teardown().run_from_crash_handler().unwrap();
        assert_eq!(record.status, TeardownStatus::Destroyed);

        let err = session.reapply().unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::TornDown {
                phase: Phase::Applied,
                trigger: TeardownTrigger::CrashHandler
            }
        ));
        assert!(session.is_failed());
        assert!(session.output(OUTPUT).is_err());
        assert!(session.mark_verified().is_err());
        assert_eq!(engine.calls(), vec!["init", "apply", "destroy"]);

        let summary = session.finish();
        assert_eq!(summary.teardown.trigger, TeardownTrigger::CrashHandler);
        assert_eq!(engine.count("destroy"), 1);
    }

    #[test]
    fn verification_after_teardown_fails_the_run() {
        let engine = Arc::new(MockEngine::new().with_output(OUTPUT, &expected_name("td03")));
        let mut session = Session::start(Arc::clone(&engine), invocation("td03"));
        session.init_and_apply().unwrap();
        assert_eq!(session.output(OUTPUT).unwrap(), expected_name("td03"));

        session.guard.teardown().run(TeardownTrigger::Unwind);

        assert!(matches!(
            session.mark_verified(),
            Err(LifecycleError::TornDown { .. })
        ));
        let summary = session.finish();
        assert!(summary.phases.contains(&Phase::Failed));
        assert!(!summary.phases.contains(&Phase::Verified));
    }

    #[test]
    fn panicking_engine_call_tears_down_while_unwinding() {
        let engine = Arc::new(MockEngine::new().with_panicking_apply());
        let session_engine = Arc::clone(&engine);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let mut session = Session::start(session_engine, invocation("pa01"));
            session.init().unwrap();
            let _ = session.apply();
        }));

        assert!(result.is_err());
        assert_eq!(engine.calls(), vec!["init", "apply", "destroy"]);
    }

    #[test]
    fn from_case_renders_expectations() {
        let case: CaseConfig = toml::from_str(
            r#"
            name = "rds"
            module_dir = "examples/complete"
            var_files = ["fixtures.us-east-2.tfvars"]

            [[expect]]
            kind = "output"
            name = "lambda_forwarder_rds_enhanced_monitoring_function_name"
            equals = "eg-ue2-test-datadog-forwarder-{run_id}-forwarder-log"
            "#,
        )
        .unwrap();
        let id = RunIdentity::parse("28424").unwrap();
        let plan = RunPlan::from_case(&case, &id, Path::new("/repo/test")).unwrap();

        assert_eq!(plan.name, "rds");
        assert_eq!(
            plan.invocation.module_dir(),
            Path::new("/repo/test/examples/complete")
        );
        assert_eq!(
            plan.expectations,
            vec![Expectation::output_equals(OUTPUT, expected_name("28424"))]
        );
    }

    #[test]
    fn report_serializes_to_json() {
        let engine = Arc::new(MockEngine::new());
        let report = LifecycleDriver::new(engine).run(RunPlan::new("json", invocation("js01")));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["run_id"], "js01");
        assert_eq!(json["teardown"]["status"], "destroyed");
        assert_eq!(json["phases"][0], "configured");
    }
}
