//! 프로비저닝 엔진 추상화
//!
//! [`ProvisioningEngine`]은 라이프사이클과 외부 인프라 도구 사이의 경계입니다.
//! 운영 코드는 [`TerraformCli`](crate::terraform::TerraformCli)를, 단위 테스트는
//! `MockEngine`을 사용합니다.
//!
//! ```text
//! ┌─────────────────┐
//! │ LifecycleDriver │──── Session ──── TeardownGuard
//! └────────┬────────┘                       │
//!          ▼                                ▼
//!   ┌───────────────────┐  init/apply/plan/output/destroy
//!   │ProvisioningEngine │ (trait)
//!   └───────────────────┘
//!        │         │
//!        ▼         ▼
//!  TerraformCli  MockEngine
//! ```
//!
//! teardown은 `Drop`과 패닉 훅에서 실행되며 둘 다 await할 수 없으므로
//! trait은 동기 방식입니다.

use std::process::Output;

use tfprobe_core::error::EngineError;

use crate::assembler::InvocationConfig;

/// 엔진 명령 한 번의 실행 결과
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CommandOutput {
    /// 진단용 전체 명령줄
    pub command: String,
    /// 종료 코드 (시그널로 종료되면 `None`)
    pub exit_code: Option<i32>,
    /// 표준 출력
    pub stdout: String,
    /// 표준 에러
    pub stderr: String,
}

impl CommandOutput {
    /// 종료된 프로세스로부터 생성
    pub fn from_process(command: impl Into<String>, output: Output) -> Self {
        Self {
            command: command.into(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }

    /// 종료 코드 0 여부
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// stdout 뒤에 stderr를 이어 붙인 텍스트
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }

    /// `accepted`에 없는 종료 코드를 [`EngineError::Failed`]로 변환합니다.
    pub fn into_result(self, accepted: &[i32]) -> Result<Self, EngineError> {
        match self.exit_code {
            Some(code) if accepted.contains(&code) => Ok(self),
            exit_code => Err(EngineError::Failed {
                command: self.command,
                exit_code,
                stdout: self.stdout,
                stderr: self.stderr,
            }),
        }
    }
}

/// `plan` 실행 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanResult {
    /// 변경 사항 포함 여부
    pub changes: bool,
    /// 원본 명령 출력
    pub output: CommandOutput,
}

/// 전체 라이프사이클을 구동하는 외부 프로비저닝 도구
///
/// 모든 메서드는 실행에 고정된 [`InvocationConfig`]를 받습니다.
/// `destroy`는 리소스가 이미 없는 설정에 대해 호출되어도 실패하지 않아야 합니다.
pub trait ProvisioningEngine: Send + Sync + 'static {
    /// 로그용 짧은 엔진 이름
    fn name(&self) -> &str;

    /// 모듈 초기화 (provider, backend)
    fn init(&self, invocation: &InvocationConfig) -> Result<CommandOutput, EngineError>;

    /// 리소스 생성 또는 갱신
    fn apply(&self, invocation: &InvocationConfig) -> Result<CommandOutput, EngineError>;

    /// 적용하지 않고 변경 예정 사항 계산
    fn plan(&self, invocation: &InvocationConfig) -> Result<PlanResult, EngineError>;

    /// 이름으로 output 하나를 텍스트로 조회
    fn output(&self, invocation: &InvocationConfig, name: &str) -> Result<String, EngineError>;

    /// 설정으로 생성된 모든 리소스 제거
    fn destroy(&self, invocation: &InvocationConfig) -> Result<CommandOutput, EngineError>;
}

/// 실패 주입과 호출 기록을 지원하는 테스트용 엔진
#[cfg(test)]
#[derive(Default)]
pub struct MockEngine {
    outputs: std::collections::BTreeMap<String, String>,
    apply_stdout: std::sync::Mutex<std::collections::VecDeque<String>>,
    fail_init: bool,
    fail_apply: bool,
    fail_destroy: bool,
    panic_on_apply: bool,
    plan_changes: bool,
    calls: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl MockEngine {
    pub const NO_CHANGES: &'static str = "Apply complete! Resources: 0 added, 0 changed, 0 destroyed.";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, name: &str, value: &str) -> Self {
        self.outputs.insert(name.to_owned(), value.to_owned());
        self
    }

    /// 다음 apply의 stdout을 큐에 추가합니다. 큐가 비면 변경 없음을 보고합니다.
    pub fn with_apply_stdout(self, stdout: &str) -> Self {
        self.apply_stdout
            .lock()
            .unwrap()
            .push_back(stdout.to_owned());
        self
    }

    pub fn with_failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    pub fn with_failing_apply(mut self) -> Self {
        self.fail_apply = true;
        self
    }

    pub fn with_failing_destroy(mut self) -> Self {
        self.fail_destroy = true;
        self
    }

    pub fn with_panicking_apply(mut self) -> Self {
        self.panic_on_apply = true;
        self
    }

    pub fn with_plan_changes(mut self) -> Self {
        self.plan_changes = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, command: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == command)
            .count()
    }

    fn record(&self, command: &str) -> CommandOutput {
        self.calls.lock().unwrap().push(command.to_owned());
        CommandOutput {
            command: format!("mock {command}"),
            exit_code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    fn failure(command: &str) -> EngineError {
        EngineError::Failed {
            command: format!("mock {command}"),
            exit_code: Some(1),
            stdout: String::new(),
            stderr: format!("Error: mock {command} failure"),
        }
    }
}

#[cfg(test)]
impl ProvisioningEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    fn init(&self, _invocation: &InvocationConfig) -> Result<CommandOutput, EngineError> {
        let out = self.record("init");
        if self.fail_init {
            return Err(Self::failure("init"));
        }
        Ok(out)
    }

    fn apply(&self, _invocation: &InvocationConfig) -> Result<CommandOutput, EngineError> {
        let mut out = self.record("apply");
        if self.panic_on_apply {
            panic!("mock apply panicked");
        }
        if self.fail_apply {
            return Err(Self::failure("apply"));
        }
        out.stdout = self
            .apply_stdout
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Self::NO_CHANGES.to_owned());
        Ok(out)
    }

    fn plan(&self, _invocation: &InvocationConfig) -> Result<PlanResult, EngineError> {
        let mut out = self.record("plan");
        if self.plan_changes {
            out.exit_code = Some(2);
            out.stdout = "Plan: 1 to add, 0 to change, 0 to destroy.".to_owned();
        } else {
            out.stdout = "No changes. Your infrastructure matches the configuration.".to_owned();
        }
        Ok(PlanResult {
            changes: self.plan_changes,
            output: out,
        })
    }

    fn output(&self, _invocation: &InvocationConfig, name: &str) -> Result<String, EngineError> {
        self.record("output");
        self.outputs
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::Failed {
                command: format!("mock output {name}"),
                exit_code: Some(1),
                stdout: String::new(),
                stderr: format!("Error: Output \"{name}\" not found"),
            })
    }

    fn destroy(&self, _invocation: &InvocationConfig) -> Result<CommandOutput, EngineError> {
        let mut out = self.record("destroy");
        if self.fail_destroy {
            return Err(Self::failure("destroy"));
        }
        out.stdout = "Destroy complete! Resources: 2 destroyed.".to_owned();
        Ok(out)
    }
}
