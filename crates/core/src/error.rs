//! 에러 타입: 도메인별 에러 정의

/// tfprobe 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 실행 식별자 에러
    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),

    /// 프로비저닝 엔진 호출 에러
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// 라이프사이클 진행 에러
    #[error("lifecycle error: {0}")]
    Lifecycle(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 실행 식별자(run identity) 에러
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    /// 허용되지 않는 문자 포함
    #[error("invalid run identity '{value}': {reason}")]
    InvalidFormat { value: String, reason: String },

    /// 길이 범위 위반
    #[error("invalid run identity length {length} (allowed: {min}..={max})")]
    InvalidLength { length: usize, min: usize, max: usize },

    /// 엔트로피 소스 사용 불가
    #[error("entropy source unavailable: {0}")]
    EntropyUnavailable(String),

    /// 같은 프로세스에서 이미 발급된 식별자
    #[error("run identity '{0}' was already issued in this process")]
    Reused(String),
}

/// 프로비저닝 엔진(외부 프로세스) 호출 에러
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// 프로세스 실행 자체 실패
    #[error("failed to spawn '{command}': {reason}")]
    Spawn { command: String, reason: String },

    /// 프로세스가 실패 상태로 종료
    #[error("'{command}' failed (exit code {}):\n--- stdout ---\n{stdout}\n--- stderr ---\n{stderr}", exit_code_label(.exit_code))]
    Failed {
        command: String,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    /// output 값 디코딩 실패
    #[error("failed to decode output '{name}': {reason}")]
    OutputDecode { name: String, reason: String },
}

impl EngineError {
    /// 실패한 명령의 stdout + stderr (재시도 판정용)
    pub fn captured_output(&self) -> Option<String> {
        match self {
            Self::Failed { stdout, stderr, .. } => Some(format!("{stdout}\n{stderr}")),
            _ => None,
        }
    }
}

fn exit_code_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".to_owned(),
    }
}
