//! Terraform CLI 엔진
//!
//! [`TerraformCli`]는 모듈 디렉토리 안에서 `terraform`(또는 `tofu`) 바이너리를
//! 실행합니다. 출력이 재시도 가능 패턴과 일치하는 실패는 선형 백오프
//! (`backoff * attempt`)로 재시도하고, 그 외의 실패는 즉시 반환합니다.

use std::collections::BTreeMap;
use std::process::Command;
use std::thread;
use std::time::{Duration, Instant};

use regex::Regex;
use tracing::{debug, info, warn};

use tfprobe_core::config::EngineConfig;
use tfprobe_core::error::{ConfigError, EngineError};
use tfprobe_core::metrics as m;

use crate::assembler::InvocationConfig;
use crate::engine::{CommandOutput, PlanResult, ProvisioningEngine};

/// 재시도할 일시적 provider 오류 (패턴, 설명)
pub const DEFAULT_RETRYABLE_ERRORS: &[(&str, &str)] = &[
    (
        r"(?i)request limit exceeded",
        "Rate limited by the provider API",
    ),
    (
        r"(?i)throttling",
        "Throttled by the provider API",
    ),
    (
        r"(?i)TLS handshake timeout",
        "Transient network failure",
    ),
    (
        r"(?i)connection reset by peer",
        "Transient network failure",
    ),
    (
        r"(?i)Failed to query available provider packages",
        "Provider registry unavailable",
    ),
    (
        r"(?i)error installing provider",
        "Provider download failed",
    ),
    (
        r"(?i)timeout while waiting for state to become",
        "Resource did not settle in time",
    ),
    (
        r"(?i)Error acquiring the state lock",
        "State lock held by another process",
    ),
];

/// `plan -detailed-exitcode`의 "변경 있음" 종료 코드
const PLAN_CHANGES_EXIT_CODE: i32 = 2;

/// Terraform CLI 기반 엔진
#[derive(Debug, Clone)]
pub struct TerraformCli {
    binary: String,
    env: BTreeMap<String, String>,
    max_retries: u32,
    retry_backoff: Duration,
    retryable: Vec<(Regex, String)>,
}

impl TerraformCli {
    /// 재시도 없이 `binary`용 엔진을 생성합니다.
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            env: BTreeMap::new(),
            max_retries: 0,
            retry_backoff: Duration::from_secs(5),
            retryable: Vec::new(),
        }
    }

    /// `[engine]` 섹션으로부터 생성합니다.
    ///
    /// # Errors
    ///
    /// 재시도 패턴이 컴파일되지 않으면 `ConfigError::InvalidValue`를 반환합니다.
    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        let mut cli = Self::new(config.binary.as_str())
            .with_retries(config.max_retries, Duration::from_secs(config.retry_backoff_secs));

        if config.default_retryable_errors {
            for (pattern, description) in DEFAULT_RETRYABLE_ERRORS {
                cli = cli.with_retryable_error(pattern, description)?;
            }
        }
        for (pattern, description) in &config.retryable_errors {
            cli = cli.with_retryable_error(pattern, description)?;
        }
        for (key, value) in &config.env {
            cli = cli.with_env(key.as_str(), value.as_str());
        }
        Ok(cli)
    }

    pub fn with_retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff = backoff;
        self
    }

    pub fn with_retryable_error(
        mut self,
        pattern: &str,
        description: &str,
    ) -> Result<Self, ConfigError> {
        let regex = Regex::new(pattern).map_err(|e| ConfigError::InvalidValue {
            field: format!("engine.retryable_errors.{pattern}"),
            reason: e.to_string(),
        })?;
        self.retryable.push((regex, description.to_owned()));
        Ok(self)
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// `err`와 일치하는 첫 재시도 패턴의 설명
    fn retry_reason(&self, err: &EngineError) -> Option<&str> {
        let captured = err.captured_output()?;
        self.retryable
            .iter()
            .find(|(regex, _)| regex.is_match(&captured))
            .map(|(_, description)| description.as_str())
    }

    fn spawn(
        &self,
        invocation: &InvocationConfig,
        subcommand: &str,
        args: &[String],
    ) -> Result<CommandOutput, EngineError> {
        let command_line = format!("{} {} {}", self.binary, subcommand, args.join(" "));
        let command_line = command_line.trim_end().to_owned();

        debug!(
            command = %command_line,
            dir = %invocation.module_dir().display(),
            "running engine command"
        );

        let output = Command::new(&self.binary)
            .arg(subcommand)
            .args(args)
            .current_dir(invocation.module_dir())
            .env("TF_IN_AUTOMATION", "1")
            .env("TF_INPUT", "0")
            .envs(&self.env)
            .envs(invocation.env())
            .output()
            .map_err(|e| EngineError::Spawn {
                command: command_line.clone(),
                reason: e.to_string(),
            })?;

        Ok(CommandOutput::from_process(command_line, output))
    }

    /// 하위 명령을 실행하고, 재시도 패턴과 일치하는 실패는 재시도합니다.
    fn run_with_retry(
        &self,
        invocation: &InvocationConfig,
        subcommand: &'static str,
        args: &[String],
        accepted: &[i32],
    ) -> Result<CommandOutput, EngineError> {
        let start = Instant::now();
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.retry_backoff * attempt;
                warn!(
                    command = subcommand,
                    attempt = attempt,
                    backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                    "retrying engine command"
                );
                metrics::counter!(m::ENGINE_RETRIES_TOTAL, m::LABEL_COMMAND => subcommand)
                    .increment(1);
                thread::sleep(backoff);
            }

            match self
                .spawn(invocation, subcommand, args)
                .and_then(|output| output.into_result(accepted))
            {
                Ok(output) => {
                    record_command(subcommand, "success", start);
                    return Ok(output);
                }
                Err(e) => {
                    let reason = self.retry_reason(&e);
                    if let Some(reason) = reason {
                        info!(command = subcommand, reason = reason, "retryable engine error");
                    }
                    let retryable = reason.is_some();
                    last_error = Some(e);
                    if !retryable {
                        break;
                    }
                }
            }
        }

        record_command(subcommand, "failure", start);
        Err(last_error.unwrap_or_else(|| EngineError::Spawn {
            command: format!("{} {subcommand}", self.binary),
            reason: "unknown error".to_owned(),
        }))
    }
}

fn record_command(subcommand: &'static str, result: &'static str, start: Instant) {
    metrics::counter!(
        m::ENGINE_COMMANDS_TOTAL,
        m::LABEL_COMMAND => subcommand,
        m::LABEL_RESULT => result
    )
    .increment(1);
    metrics::histogram!(m::ENGINE_COMMAND_DURATION_SECONDS, m::LABEL_COMMAND => subcommand)
        .record(start.elapsed().as_secs_f64());
}

fn with_variables(base: &[&str], invocation: &InvocationConfig) -> Vec<String> {
    base.iter()
        .map(|s| (*s).to_owned())
        .chain(invocation.variable_args())
        .collect()
}

/// output 값을 텍스트로 변환: 문자열은 따옴표 없이, 나머지는 compact JSON
fn decode_output(name: &str, raw: &str) -> Result<String, EngineError> {
    let value: serde_json::Value =
        serde_json::from_str(raw.trim()).map_err(|e| EngineError::OutputDecode {
            name: name.to_owned(),
            reason: e.to_string(),
        })?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

impl ProvisioningEngine for TerraformCli {
    fn name(&self) -> &str {
        "terraform"
    }

    fn init(&self, invocation: &InvocationConfig) -> Result<CommandOutput, EngineError> {
        let args = vec![
            format!("-upgrade={}", invocation.upgrade()),
            "-input=false".to_owned(),
            "-no-color".to_owned(),
        ];
        self.run_with_retry(invocation, "init", &args, &[0])
    }

    fn apply(&self, invocation: &InvocationConfig) -> Result<CommandOutput, EngineError> {
        let args = with_variables(
            &["-input=false", "-auto-approve", "-no-color", "-lock=false"],
            invocation,
        );
        self.run_with_retry(invocation, "apply", &args, &[0])
    }

    fn plan(&self, invocation: &InvocationConfig) -> Result<PlanResult, EngineError> {
        let args = with_variables(
            &["-input=false", "-detailed-exitcode", "-no-color", "-lock=false"],
            invocation,
        );
        let output =
            self.run_with_retry(invocation, "plan", &args, &[0, PLAN_CHANGES_EXIT_CODE])?;
        Ok(PlanResult {
            changes: output.exit_code == Some(PLAN_CHANGES_EXIT_CODE),
            output,
        })
    }

    fn output(&self, invocation: &InvocationConfig, name: &str) -> Result<String, EngineError> {
        let args = vec!["-no-color".to_owned(), "-json".to_owned(), name.to_owned()];
        let output = self.run_with_retry(invocation, "output", &args, &[0])?;
        decode_output(name, &output.stdout)
    }

    fn destroy(&self, invocation: &InvocationConfig) -> Result<CommandOutput, EngineError> {
        let args = with_variables(
            &["-input=false", "-auto-approve", "-no-color", "-lock=false"],
            invocation,
        );
        self.run_with_retry(invocation, "destroy", &args, &[0])
    }
}
