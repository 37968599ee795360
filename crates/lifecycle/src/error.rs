//! 라이프사이클 에러 타입
//!
//! [`LifecycleError`]는 식별자 생성부터 teardown까지 한 실행에서 발생할 수
//! 있는 모든 실패를 표현합니다. `From<LifecycleError> for ProbeError` 구현으로
//! 설정 에러와 함께 `?`로 전파할 수 있습니다.

use tfprobe_core::error::{EngineError, IdentityError, ProbeError};
use tfprobe_core::types::Phase;

use crate::teardown::TeardownTrigger;

/// 라이프사이클 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// 환경 부트스트랩 실패 (호출자는 로그만 남기고 계속 진행)
    #[error("bootstrap failed: {0}")]
    Bootstrap(String),

    /// `init` 실패
    #[error("init failed: {0}")]
    Init(#[source] EngineError),

    /// `apply` 실패
    #[error("apply failed: {0}")]
    Apply(#[source] EngineError),

    /// `plan` 실패
    #[error("plan failed: {0}")]
    Plan(#[source] EngineError),

    /// output 값을 읽지 못함
    #[error("output '{name}' unavailable: {source}")]
    Output {
        /// output 이름
        name: String,
        /// 원인 엔진 에러
        source: EngineError,
    },

    /// `destroy` 실패
    #[error("destroy failed: {0}")]
    Destroy(#[source] EngineError),

    /// 현재 단계에서 허용되지 않는 작업
    #[error("invalid lifecycle transition: {from} -> {to}")]
    InvalidTransition {
        /// 세션의 현재 단계
        from: Phase,
        /// 작업이 진입하려던 단계
        to: Phase,
    },

    /// 엔진 호출 전에 인터럽트 플래그가 설정됨
    #[error("run interrupted while {phase}")]
    Interrupted {
        /// 인터럽트 시점의 단계
        phase: Phase,
    },

    /// teardown이 이미 실행된 세션에 대한 엔진 호출
    #[error("teardown already ran ({}) while {phase}; no further engine calls are allowed", trigger.as_str())]
    TornDown {
        /// 거부 시점의 단계
        phase: Phase,
        /// teardown을 실행한 경로
        trigger: TeardownTrigger,
    },

    /// 호출 파라미터 구조 오류
    #[error("invalid invocation parameter '{field}': {reason}")]
    Invocation {
        /// 문제 필드
        field: String,
        /// 사유
        reason: String,
    },

    /// 실행 식별자 생성 실패
    #[error(transparent)]
    Identity(#[from] IdentityError),
}

impl From<LifecycleError> for ProbeError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::Identity(e) => ProbeError::Identity(e),
            other => ProbeError::Lifecycle(other.to_string()),
        }
    }
}
