//! 도메인 타입: 실행 식별자, 라이프사이클 단계, 모듈 변수 값
//!
//! 모든 크레이트가 공유하는 값 타입을 정의합니다.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::IdentityError;

/// 실행 식별자 최대 길이
pub const MAX_RUN_ID_LEN: usize = 32;

/// 한 번의 테스트 실행을 구분하는 식별자
///
/// 모든 프로비저닝 리소스 이름의 접미어로 사용됩니다.
/// 소문자 영숫자만 허용하며, 생성 후에는 변경할 수 없습니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RunIdentity(String);

impl RunIdentity {
    /// 외부에서 주어진 식별자를 정규화(trim + 소문자)하고 검증합니다.
    pub fn parse(raw: &str) -> Result<Self, IdentityError> {
        let normalized = raw.trim().to_ascii_lowercase();

        if normalized.is_empty() || normalized.len() > MAX_RUN_ID_LEN {
            return Err(IdentityError::InvalidLength {
                length: normalized.len(),
                min: 1,
                max: MAX_RUN_ID_LEN,
            });
        }

        if let Some(bad) = normalized.chars().find(|c| !c.is_ascii_alphanumeric()) {
            return Err(IdentityError::InvalidFormat {
                value: raw.to_owned(),
                reason: format!("character '{bad}' is not lowercase alphanumeric"),
            });
        }

        Ok(Self(normalized))
    }

    /// 식별자 문자열
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RunIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for RunIdentity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// 라이프사이클 단계
///
/// `Configured → Initialized → Applied → Verified → Destroyed`,
/// 그리고 종료되지 않은 모든 단계에서 도달 가능한 `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Configured,
    Initialized,
    Applied,
    Verified,
    Destroyed,
    Failed,
}

impl Phase {
    /// 정상 경로에서 허용되는 전이인지 확인합니다.
    ///
    /// `Failed`로의 전이와 `Destroyed`로의 전이(teardown)는 별도로 처리됩니다.
    pub fn can_advance_to(self, next: Phase) -> bool {
        matches!(
            (self, next),
            (Phase::Configured, Phase::Initialized)
                | (Phase::Initialized, Phase::Applied)
                // 재적용(idempotence 확인)은 Applied에 머무름
                | (Phase::Applied, Phase::Applied)
                | (Phase::Applied, Phase::Verified)
        )
    }

    /// 종료 단계 여부
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Destroyed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Configured => "configured",
            Self::Initialized => "initialized",
            Self::Applied => "applied",
            Self::Verified => "verified",
            Self::Destroyed => "destroyed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// 모듈에 전달하는 인라인 변수 값
///
/// 엔진의 `-var name=value` 인자로 렌더링됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VarValue {
    Bool(bool),
    Number(i64),
    String(String),
    List(Vec<String>),
}

impl VarValue {
    /// HCL 리터럴로 렌더링합니다.
    ///
    /// 문자열은 그대로(따옴표 없이) 전달되고, 리스트는 JSON 배열 형식으로
    /// 렌더링됩니다 (`["a","b"]`).
    pub fn to_hcl(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => n.to_string(),
            Self::String(s) => s.clone(),
            Self::List(items) => {
                let quoted: Vec<String> = items.iter().map(|item| quote_hcl(item)).collect();
                format!("[{}]", quoted.join(","))
            }
        }
    }
}

impl From<bool> for VarValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for VarValue {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for VarValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for VarValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<String>> for VarValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

fn quote_hcl(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('"');
    for c in raw.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// 멱등성(no-drift) 확인 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdempotenceCheck {
    /// 확인하지 않음
    #[default]
    None,
    /// 같은 설정으로 다시 apply 후 0/0/0 요약을 기대
    Reapply,
    /// `plan -detailed-exitcode`로 변경 없음을 기대
    Plan,
}

impl fmt::Display for IdempotenceCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Reapply => "reapply",
            Self::Plan => "plan",
        };
        f.write_str(s)
    }
}
