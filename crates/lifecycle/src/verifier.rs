//! 결과 검증
//!
//! 이름 있는 output과 엔진의 변경 요약을 기대 리터럴과 비교합니다.
//! 모든 검사는 [`CheckOutcome`]을 만들며, 불일치는 panic이 아니라 두 리터럴을
//! 담은 실패 결과이므로 이후에도 teardown이 실행됩니다.
//!
//! 변경 요약은 전체 명령 출력에서 패턴으로 찾습니다:
//!
//! ```text
//! Apply complete! Resources: 1 added, 0 changed, 0 destroyed.
//!                 └──────────────── extracted ───────────────┘
//! ```

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::warn;

use tfprobe_core::config::{ExpectationConfig, RUN_ID_PLACEHOLDER};
use tfprobe_core::metrics as m;
use tfprobe_core::types::RunIdentity;

use crate::engine::{CommandOutput, PlanResult};

/// 멱등 재적용이 보고해야 하는 요약
pub const NO_CHANGES_SUMMARY: &str = "Resources: 0 added, 0 changed, 0 destroyed.";

static SUMMARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Resources: (?:(\d+) imported, )?(\d+) added, (\d+) changed, (\d+) destroyed\.")
        .expect("summary pattern is valid")
});

static DESTROY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Destroy complete! Resources: (\d+) destroyed\.")
        .expect("destroy pattern is valid")
});

/// 파싱된 `Resources: ...` 요약
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ChangeSummary {
    pub imported: u64,
    pub added: u64,
    pub changed: u64,
    pub destroyed: u64,
}

impl ChangeSummary {
    /// 변경된 리소스 없음
    pub fn is_no_op(&self) -> bool {
        self.imported == 0 && self.added == 0 && self.changed == 0 && self.destroyed == 0
    }
}

impl fmt::Display for ChangeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Resources: ")?;
        if self.imported > 0 {
            write!(f, "{} imported, ", self.imported)?;
        }
        write!(
            f,
            "{} added, {} changed, {} destroyed.",
            self.added, self.changed, self.destroyed
        )
    }
}

/// `text`의 마지막 `Resources: N added, M changed, P destroyed.`를 반환합니다.
pub fn extract_summary(text: &str) -> Option<&str> {
    SUMMARY_RE.find_iter(text).last().map(|m| m.as_str())
}

/// `text`의 마지막 변경 요약을 파싱합니다.
pub fn parse_summary(text: &str) -> Option<ChangeSummary> {
    let caps = SUMMARY_RE.captures_iter(text).last()?;
    let number = |idx: usize| {
        caps.get(idx)
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .unwrap_or(0)
    };
    Some(ChangeSummary {
        imported: number(1),
        added: number(2),
        changed: number(3),
        destroyed: number(4),
    })
}

/// `Destroy complete! Resources: N destroyed.`가 보고한 리소스 수
pub fn parse_destroyed(text: &str) -> Option<u64> {
    DESTROY_RE
        .captures_iter(text)
        .last()
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// 추출된 요약을 포함한 apply 출력
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningResult {
    /// 명령 원본 출력
    pub output: CommandOutput,
    /// 요약 리터럴 (찾은 경우)
    pub summary_text: Option<String>,
    /// 파싱된 요약 (찾은 경우)
    pub summary: Option<ChangeSummary>,
}

impl ProvisioningResult {
    pub fn from_output(output: CommandOutput) -> Self {
        let text = output.combined();
        let summary_text = extract_summary(&text).map(str::to_owned);
        let summary = parse_summary(&text);
        Self {
            output,
            summary_text,
            summary,
        }
    }
}

/// `template`의 `{run_id}`를 치환합니다.
pub fn render_template(template: &str, run_id: &RunIdentity) -> String {
    template.replace(RUN_ID_PLACEHOLDER, run_id.as_str())
}

/// 실행의 단일 기대 속성
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    /// output이 리터럴과 같음
    OutputEquals { name: String, expected: String },
    /// output이 조각을 포함
    OutputContains { name: String, fragment: String },
    /// apply 요약이 리터럴과 같음
    SummaryEquals { expected: String },
}

impl Expectation {
    pub fn output_equals(name: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::OutputEquals {
            name: name.into(),
            expected: expected.into(),
        }
    }

    pub fn output_contains(name: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self::OutputContains {
            name: name.into(),
            fragment: fragment.into(),
        }
    }

    pub fn summary_equals(expected: impl Into<String>) -> Self {
        Self::SummaryEquals {
            expected: expected.into(),
        }
    }

    /// 설정으로부터 생성하며 기대 리터럴의 `{run_id}`를 치환합니다.
    pub fn from_config(config: &ExpectationConfig, run_id: &RunIdentity) -> Self {
        match config {
            ExpectationConfig::Output { name, equals } => {
                Self::output_equals(name.as_str(), render_template(equals, run_id))
            }
            ExpectationConfig::OutputContains { name, contains } => {
                Self::output_contains(name.as_str(), render_template(contains, run_id))
            }
            ExpectationConfig::Summary { equals } => {
                Self::summary_equals(render_template(equals, run_id))
            }
        }
    }

    /// 보고서에 쓰이는 검사 라벨
    pub fn label(&self) -> String {
        match self {
            Self::OutputEquals { name, .. } => format!("output {name} equals"),
            Self::OutputContains { name, .. } => format!("output {name} contains"),
            Self::SummaryEquals { .. } => "apply summary equals".to_owned(),
        }
    }
}

/// 단일 검사 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckOutcome {
    pub check: String,
    pub passed: bool,
    pub expected: String,
    pub actual: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CheckOutcome {
    fn pass(check: String, expected: String, actual: String) -> Self {
        Self {
            check,
            passed: true,
            expected,
            actual: Some(actual),
            message: None,
        }
    }

    fn mismatch(check: String, expected: String, actual: String) -> Self {
        let message = format!("{check}: expected {expected:?}, got {actual:?}");
        Self {
            check,
            passed: false,
            expected,
            actual: Some(actual),
            message: Some(message),
        }
    }

    fn unavailable(check: String, expected: String, reason: String) -> Self {
        let message = format!("{check}: expected {expected:?}, but {reason}");
        Self {
            check,
            passed: false,
            expected,
            actual: None,
            message: Some(message),
        }
    }
}

/// 엔진 결과에 대해 기대값을 평가합니다.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutcomeVerifier;

impl OutcomeVerifier {
    pub fn new() -> Self {
        Self
    }

    /// 모든 기대값을 평가합니다.
    ///
    /// `fetch_output`은 output을 읽으며, 읽기 오류는 오류 텍스트를 담은
    /// 실패 검사가 됩니다.
    pub fn verify<F, E>(
        &self,
        expectations: &[Expectation],
        result: &ProvisioningResult,
        mut fetch_output: F,
    ) -> Vec<CheckOutcome>
    where
        F: FnMut(&str) -> Result<String, E>,
        E: fmt::Display,
    {
        expectations
            .iter()
            .map(|expectation| {
                let label = expectation.label();
                let outcome = match expectation {
                    Expectation::OutputEquals { name, expected } => match fetch_output(name) {
                        Ok(actual) if actual == *expected => {
                            CheckOutcome::pass(label, expected.clone(), actual)
                        }
                        Ok(actual) => CheckOutcome::mismatch(label, expected.clone(), actual),
                        Err(e) => CheckOutcome::unavailable(
                            label,
                            expected.clone(),
                            format!("the output could not be read: {e}"),
                        ),
                    },
                    Expectation::OutputContains { name, fragment } => match fetch_output(name) {
                        Ok(actual) if actual.contains(fragment.as_str()) => {
                            CheckOutcome::pass(label, fragment.clone(), actual)
                        }
                        Ok(actual) => CheckOutcome::mismatch(label, fragment.clone(), actual),
                        Err(e) => CheckOutcome::unavailable(
                            label,
                            fragment.clone(),
                            format!("the output could not be read: {e}"),
                        ),
                    },
                    Expectation::SummaryEquals { expected } => {
                        summary_check(label, expected, result)
                    }
                };
                record(&outcome);
                outcome
            })
            .collect()
    }

    /// 재적용은 정확히 [`NO_CHANGES_SUMMARY`]를 보고해야 합니다.
    pub fn check_no_drift(&self, result: &ProvisioningResult) -> CheckOutcome {
        let outcome = summary_check(
            "idempotent re-apply".to_owned(),
            NO_CHANGES_SUMMARY,
            result,
        );
        record(&outcome);
        outcome
    }

    /// `plan -detailed-exitcode`는 변경 없음을 보고해야 합니다.
    pub fn check_plan_clean(&self, plan: &PlanResult) -> CheckOutcome {
        let check = "idempotent plan".to_owned();
        let expected = "no changes".to_owned();
        let outcome = if plan.changes {
            let detail = plan
                .output
                .stdout
                .lines()
                .rev()
                .find(|line| line.trim_start().starts_with("Plan:"))
                .map(|line| line.trim().to_owned())
                .unwrap_or_else(|| "changes detected".to_owned());
            CheckOutcome::mismatch(check, expected, detail)
        } else {
            CheckOutcome::pass(check, expected.clone(), expected)
        };
        record(&outcome);
        outcome
    }
}

fn summary_check(label: String, expected: &str, result: &ProvisioningResult) -> CheckOutcome {
    match &result.summary_text {
        Some(actual) if actual == expected => {
            CheckOutcome::pass(label, expected.to_owned(), actual.clone())
        }
        Some(actual) => CheckOutcome::mismatch(label, expected.to_owned(), actual.clone()),
        None => CheckOutcome::unavailable(
            label,
            expected.to_owned(),
            format!(
                "no 'Resources: ...' summary was found in the output of '{}'",
                result.output.command
            ),
        ),
    }
}

fn record(outcome: &CheckOutcome) {
    if !outcome.passed {
        metrics::counter!(m::ASSERTION_FAILURES_TOTAL).increment(1);
        warn!(
            check = %outcome.check,
            message = outcome.message.as_deref().unwrap_or_default(),
            "check failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply_result(stdout: &str) -> ProvisioningResult {
        ProvisioningResult::from_output(CommandOutput {
            command: "terraform apply".to_owned(),
            exit_code: Some(0),
            stdout: stdout.to_owned(),
            stderr: String::new(),
        })
    }

    fn rid(raw: &str) -> RunIdentity {
        RunIdentity::parse(raw).unwrap()
    }

    #[test]
    fn extracts_summary_embedded_in_larger_output() {
        let text = "module.forwarder.aws_lambda_function.this[0]: Creating...\n\
                    module.forwarder.aws_lambda_function.this[0]: Creation complete after 12s\n\
                    \n\
                    Apply complete! Resources: 7 added, 0 changed, 0 destroyed.\n\
                    \n\
                    Outputs:\n\
                    lambda_forwarder_log_function_name = \"eg-ue2-test\"\n";
        assert_eq!(
            extract_summary(text),
            Some("Resources: 7 added, 0 changed, 0 destroyed.")
        );
        assert_eq!(
            parse_summary(text),
            Some(ChangeSummary {
                imported: 0,
                added: 7,
                changed: 0,
                destroyed: 0
            })
        );
    }

    #[test]
    fn last_summary_wins() {
        let text = "Resources: 3 added, 0 changed, 0 destroyed.\n...\nResources: 0 added, 1 changed, 0 destroyed.";
        assert_eq!(
            extract_summary(text),
            Some("Resources: 0 added, 1 changed, 0 destroyed.")
        );
    }

    #[test]
    fn summary_with_imports() {
        let text = "Apply complete! Resources: 2 imported, 1 added, 0 changed, 0 destroyed.";
        let summary = parse_summary(text).unwrap();
        assert_eq!(summary.imported, 2);
        assert_eq!(summary.added, 1);
        assert!(!summary.is_no_op());
        assert_eq!(
            summary.to_string(),
            "Resources: 2 imported, 1 added, 0 changed, 0 destroyed."
        );
    }

    #[test]
    fn missing_summary() {
        assert_eq!(extract_summary("No changes. Nothing to do."), None);
        assert_eq!(parse_summary(""), None);
    }

    #[test]
    fn no_op_summary_display_matches_constant() {
        assert_eq!(ChangeSummary::default().to_string(), NO_CHANGES_SUMMARY);
        assert!(ChangeSummary::default().is_no_op());
    }

    #[test]
    fn destroy_count_is_parsed() {
        assert_eq!(
            parse_destroyed("...\nDestroy complete! Resources: 4 destroyed.\n"),
            Some(4)
        );
        assert_eq!(parse_destroyed("nothing here"), None);
    }

    #[test]
    fn template_renders_run_id() {
        assert_eq!(
            render_template("eg-ue2-test-datadog-forwarder-{run_id}-forwarder-log", &rid("28424")),
            "eg-ue2-test-datadog-forwarder-28424-forwarder-log"
        );
    }

    #[test]
    fn expectation_from_config_renders_each_kind() {
        let id = rid("ab12");
        let cfg = ExpectationConfig::OutputContains {
            name: "arn".to_owned(),
            contains: "function:eg-{run_id}".to_owned(),
        };
        assert_eq!(
            Expectation::from_config(&cfg, &id),
            Expectation::output_contains("arn", "function:eg-ab12")
        );
        let cfg = ExpectationConfig::Summary {
            equals: NO_CHANGES_SUMMARY.to_owned(),
        };
        assert_eq!(
            Expectation::from_config(&cfg, &id),
            Expectation::summary_equals(NO_CHANGES_SUMMARY)
        );
    }

    #[test]
    fn output_equality_pass_and_mismatch() {
        let verifier = OutcomeVerifier::new();
        let result = apply_result("Apply complete! Resources: 1 added, 0 changed, 0 destroyed.");
        let expectations = vec![
            Expectation::output_equals("good", "eg-ue2-test-datadog-lambda-forwarder-x1-logs"),
            Expectation::output_equals("bad", "eg-ue2-test-datadog-forwarder-28424-forwarder-log"),
        ];

        let outcomes = verifier.verify(&expectations, &result, |name| match name {
            "good" => Ok::<_, String>("eg-ue2-test-datadog-lambda-forwarder-x1-logs".to_owned()),
            _ => Ok("eg-ue2-test-datadog-forwarder-99999-forwarder-log".to_owned()),
        });

        assert!(outcomes[0].passed);
        assert!(outcomes[0].message.is_none());
        assert!(!outcomes[1].passed);
        let message = outcomes[1].message.as_deref().unwrap();
        assert!(message.contains("eg-ue2-test-datadog-forwarder-28424-forwarder-log"));
        assert!(message.contains("eg-ue2-test-datadog-forwarder-99999-forwarder-log"));
    }

    #[test]
    fn output_fetch_error_is_a_failed_check() {
        let verifier = OutcomeVerifier::new();
        let result = apply_result("");
        let outcomes = verifier.verify(
            &[Expectation::output_equals("missing", "x")],
            &result,
            |_| Err("Output \"missing\" not found"),
        );
        assert!(!outcomes[0].passed);
        assert_eq!(outcomes[0].actual, None);
        assert!(outcomes[0].message.as_deref().unwrap().contains("not found"));
    }

    #[test]
    fn output_contains_check() {
        let verifier = OutcomeVerifier::new();
        let result = apply_result("");
        let outcomes = verifier.verify(
            &[
                Expectation::output_contains("arn", "function:eg-ue2"),
                Expectation::output_contains("arn", "us-west-1"),
            ],
            &result,
            |_| {
                Ok::<_, String>(
                    "arn:aws:lambda:us-east-2:123456789012:function:eg-ue2-test".to_owned(),
                )
            },
        );
        assert!(outcomes[0].passed);
        assert!(!outcomes[1].passed);
    }

    #[test]
    fn summary_expectation_uses_extracted_text() {
        let verifier = OutcomeVerifier::new();
        let result = apply_result("noise\nApply complete! Resources: 0 added, 0 changed, 0 destroyed.\nmore noise");
        let outcomes = verifier.verify(
            &[Expectation::summary_equals(NO_CHANGES_SUMMARY)],
            &result,
            |_| Err::<String, _>("unused"),
        );
        assert!(outcomes[0].passed);
    }

    #[test]
    fn no_drift_check() {
        let verifier = OutcomeVerifier::new();
        let clean = apply_result("Apply complete! Resources: 0 added, 0 changed, 0 destroyed.");
        assert!(verifier.check_no_drift(&clean).passed);

        let drift = apply_result("Apply complete! Resources: 0 added, 1 changed, 0 destroyed.");
        let outcome = verifier.check_no_drift(&drift);
        assert!(!outcome.passed);
        assert_eq!(
            outcome.actual.as_deref(),
            Some("Resources: 0 added, 1 changed, 0 destroyed.")
        );

        let silent = apply_result("");
        let outcome = verifier.check_no_drift(&silent);
        assert!(!outcome.passed);
        assert!(outcome.message.unwrap().contains("terraform apply"));
    }

    #[test]
    fn plan_clean_check() {
        let verifier = OutcomeVerifier::new();
        let mut plan = PlanResult {
            changes: false,
            output: CommandOutput {
                command: "terraform plan".to_owned(),
                exit_code: Some(0),
                stdout: "No changes.".to_owned(),
                stderr: String::new(),
            },
        };
        assert!(verifier.check_plan_clean(&plan).passed);

        plan.changes = true;
        plan.output.exit_code = Some(2);
        plan.output.stdout = "  # null_resource.x will be created\nPlan: 1 to add, 0 to change, 0 to destroy.\n".to_owned();
        let outcome = verifier.check_plan_clean(&plan);
        assert!(!outcome.passed);
        assert_eq!(
            outcome.actual.as_deref(),
            Some("Plan: 1 to add, 0 to change, 0 to destroy.")
        );
    }
}
