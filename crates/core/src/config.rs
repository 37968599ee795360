//! 설정 관리: tfprobe.toml 파싱 및 런타임 설정
//!
//! [`ProbeConfig`]는 테스트 스위트 전체 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`TFPROBE_ENGINE_BINARY=tofu` 형식)
//! 3. 설정 파일 (`tfprobe.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), tfprobe_core::error::ProbeError> {
//! use tfprobe_core::config::ProbeConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = ProbeConfig::load("tfprobe.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = ProbeConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, ProbeError};
use crate::types::{IdempotenceCheck, RunIdentity, VarValue};

/// 기대값 템플릿에서 실행 식별자로 치환되는 자리표시자
pub const RUN_ID_PLACEHOLDER: &str = "{run_id}";

/// 생성 식별자의 허용 길이 범위
pub const MIN_IDENTITY_LENGTH: usize = 4;
pub const MAX_IDENTITY_LENGTH: usize = crate::types::MAX_RUN_ID_LEN;

/// tfprobe 통합 설정
///
/// `tfprobe.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 프로비저닝 엔진 설정
    #[serde(default)]
    pub engine: EngineConfig,
    /// 환경 부트스트랩 설정
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
    /// 실행 식별자 설정
    #[serde(default)]
    pub identity: IdentityConfig,
    /// 테스트 케이스 목록 (`[[case]]`)
    #[serde(default, rename = "case")]
    pub cases: Vec<CaseConfig>,
}

impl ProbeConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    ///
    /// 설정 로딩 순서:
    /// 1. TOML 파일 파싱
    /// 2. 환경변수 오버라이드 적용
    /// 3. 유효성 검증
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ProbeError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ProbeError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProbeError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                ProbeError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, ProbeError> {
        toml::from_str(toml_str).map_err(|e| {
            ProbeError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `TFPROBE_{SECTION}_{FIELD}`
    /// 예: `TFPROBE_IDENTITY_FIXED=28424`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "TFPROBE_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "TFPROBE_GENERAL_LOG_FORMAT");
        override_bool(&mut self.general.parallel, "TFPROBE_GENERAL_PARALLEL");
        override_string(
            &mut self.general.metrics_file,
            "TFPROBE_GENERAL_METRICS_FILE",
        );

        // Engine
        override_string(&mut self.engine.binary, "TFPROBE_ENGINE_BINARY");
        override_u32(&mut self.engine.max_retries, "TFPROBE_ENGINE_MAX_RETRIES");
        override_u64(
            &mut self.engine.retry_backoff_secs,
            "TFPROBE_ENGINE_RETRY_BACKOFF_SECS",
        );

        // Bootstrap
        override_bool(&mut self.bootstrap.enabled, "TFPROBE_BOOTSTRAP_ENABLED");
        override_string(&mut self.bootstrap.path, "TFPROBE_BOOTSTRAP_PATH");

        // Identity
        override_usize(&mut self.identity.length, "TFPROBE_IDENTITY_LENGTH");
        override_string(&mut self.identity.fixed, "TFPROBE_IDENTITY_FIXED");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ProbeError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.engine.binary.trim().is_empty() {
            return Err(invalid("engine.binary", "must not be empty"));
        }

        for pattern in self.engine.retryable_errors.keys() {
            if let Err(e) = regex::Regex::new(pattern) {
                return Err(invalid(
                    "engine.retryable_errors",
                    format!("pattern '{pattern}' does not compile: {e}"),
                ));
            }
        }

        if self.bootstrap.enabled && self.bootstrap.path.trim().is_empty() {
            return Err(invalid(
                "bootstrap.path",
                "path must not be empty when bootstrap is enabled",
            ));
        }

        if !(MIN_IDENTITY_LENGTH..=MAX_IDENTITY_LENGTH).contains(&self.identity.length) {
            return Err(invalid(
                "identity.length",
                format!("must be between {MIN_IDENTITY_LENGTH} and {MAX_IDENTITY_LENGTH}"),
            ));
        }

        if !self.identity.fixed.is_empty() {
            RunIdentity::parse(&self.identity.fixed)
                .map_err(|e| invalid("identity.fixed", e.to_string()))?;
        }

        let mut seen = HashSet::new();
        for (idx, case) in self.cases.iter().enumerate() {
            if case.name.trim().is_empty() {
                return Err(invalid(format!("case[{idx}].name"), "must not be empty"));
            }
            if !seen.insert(case.name.as_str()) {
                return Err(invalid(
                    format!("case[{idx}].name"),
                    format!("duplicate case name '{}'", case.name),
                ));
            }
            case.validate(idx)?;
        }

        Ok(())
    }

    /// 이름으로 케이스를 찾습니다.
    pub fn case(&self, name: &str) -> Option<&CaseConfig> {
        self.cases.iter().find(|c| c.name == name)
    }

    /// 실행할 케이스를 고릅니다. `names`가 비어 있으면 전체를 반환합니다.
    pub fn select_cases(&self, names: &[String]) -> Result<Vec<&CaseConfig>, ConfigError> {
        if names.is_empty() {
            return Ok(self.cases.iter().collect());
        }
        names
            .iter()
            .map(|name| {
                self.case(name).ok_or_else(|| ConfigError::InvalidValue {
                    field: "case".to_owned(),
                    reason: format!("unknown case '{name}'"),
                })
            })
            .collect()
    }
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ProbeError {
    ProbeError::Config(ConfigError::InvalidValue {
        field: field.into(),
        reason: reason.into(),
    })
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 케이스 병렬 실행 요청 (공유 전제조건이 없을 때만 적용)
    pub parallel: bool,
    /// Prometheus 텍스트 형식 메트릭 출력 파일 (빈 문자열이면 비활성)
    pub metrics_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
            parallel: false,
            metrics_file: String::new(),
        }
    }
}

/// 프로비저닝 엔진 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 엔진 실행 파일 (terraform, tofu 등)
    pub binary: String,
    /// 재시도 가능한 에러에 대한 최대 재시도 횟수
    pub max_retries: u32,
    /// 재시도 기본 대기 시간 (초, 시도 횟수에 비례하여 증가)
    pub retry_backoff_secs: u64,
    /// 잘 알려진 일시적 에러 목록을 재시도 대상에 포함
    pub default_retryable_errors: bool,
    /// 재시도 대상 에러 (정규식 → 설명)
    pub retryable_errors: BTreeMap<String, String>,
    /// 엔진 프로세스에 추가로 전달할 환경변수
    pub env: BTreeMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: "terraform".to_owned(),
            max_retries: 0,
            retry_backoff_secs: 5,
            default_retryable_errors: false,
            retryable_errors: BTreeMap::new(),
            env: BTreeMap::new(),
        }
    }
}

/// 환경 부트스트랩 설정 (`git config --global --add safe.directory`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 신뢰 디렉토리로 등록할 경로
    pub path: String,
    /// git 실행 파일
    pub git_binary: String,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: ".".to_owned(),
            git_binary: "git".to_owned(),
        }
    }
}

/// 실행 식별자 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// 생성 식별자 길이
    pub length: usize,
    /// 고정 식별자 (실행 재현용, 빈 문자열이면 매번 생성)
    pub fixed: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            length: 12,
            fixed: String::new(),
        }
    }
}

/// 테스트 케이스 설정 (`[[case]]`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CaseConfig {
    /// 케이스 이름
    pub name: String,
    /// 모듈 디렉토리 (설정 파일 기준 상대 경로 허용)
    pub module_dir: String,
    /// 변수 파일 오버레이 (순서대로 적용, 나중 것이 우선)
    pub var_files: Vec<String>,
    /// 실행 식별자 뒤에 붙일 추가 attributes
    pub attributes: Vec<String>,
    /// 모듈의 `enabled` 변수 (미지정 시 전달하지 않음)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// 멱등성 확인 방식
    pub idempotence: IdempotenceCheck,
    /// 추가 인라인 변수
    pub vars: BTreeMap<String, VarValue>,
    /// 기대값 목록 (`[[case.expect]]`)
    pub expect: Vec<ExpectationConfig>,
}

impl CaseConfig {
    fn validate(&self, idx: usize) -> Result<(), ProbeError> {
        if self.module_dir.trim().is_empty() {
            return Err(invalid(
                format!("case[{idx}].module_dir"),
                "must not be empty",
            ));
        }
        if self.var_files.iter().any(|f| f.trim().is_empty()) {
            return Err(invalid(
                format!("case[{idx}].var_files"),
                "entries must not be empty",
            ));
        }
        for (eidx, expect) in self.expect.iter().enumerate() {
            if let Some(reason) = expect.problem() {
                return Err(invalid(format!("case[{idx}].expect[{eidx}]"), reason));
            }
        }
        Ok(())
    }
}

/// 기대값 설정
///
/// 기대 문자열 안의 `{run_id}`는 실행 식별자로 치환됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExpectationConfig {
    /// output 값이 정확히 일치
    Output { name: String, equals: String },
    /// output 값이 부분 문자열을 포함
    OutputContains { name: String, contains: String },
    /// apply 결과 요약(`Resources: ...`)이 정확히 일치
    Summary { equals: String },
}

impl ExpectationConfig {
    fn problem(&self) -> Option<&'static str> {
        match self {
            Self::Output { name, .. } | Self::OutputContains { name, .. }
                if name.trim().is_empty() =>
            {
                Some("output name must not be empty")
            }
            Self::OutputContains { contains, .. } if contains.is_empty() => {
                Some("contains must not be empty")
            }
            Self::Summary { equals } if equals.trim().is_empty() => {
                Some("summary must not be empty")
            }
            _ => None,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}
