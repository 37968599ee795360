//! 실행 식별자 생성
//!
//! 모든 실행은 v4 UUID에서 뽑은 짧은 소문자 hex 토큰을 받습니다. 이 토큰은
//! 모듈이 프로비저닝하는 모든 리소스 이름의 접미사가 되므로 두 실행이 같은
//! 토큰을 공유해서는 안 됩니다. 이 프로세스가 발급한 토큰은 기억되며, 중복은
//! 다시 발급하지 않고 [`IdentityError::Reused`]로 보고합니다.

use std::collections::HashSet;
use std::sync::{LazyLock, Mutex, PoisonError};

use tracing::{debug, warn};
use uuid::Uuid;

use tfprobe_core::config::{IdentityConfig, MAX_IDENTITY_LENGTH, MIN_IDENTITY_LENGTH};
use tfprobe_core::error::IdentityError;
use tfprobe_core::types::RunIdentity;

/// 기본 토큰 길이 (48비트 엔트로피)
pub const DEFAULT_IDENTITY_LENGTH: usize = 12;

static ISSUED: LazyLock<Mutex<HashSet<String>>> = LazyLock::new(|| Mutex::new(HashSet::new()));

/// 충돌에 강한 실행 식별자 생성기
#[derive(Debug, Clone, Copy)]
pub struct IdentityGenerator {
    length: usize,
}

impl IdentityGenerator {
    /// `length` 글자(4..=32) 토큰을 만드는 생성기를 생성합니다.
    pub fn new(length: usize) -> Result<Self, IdentityError> {
        if !(MIN_IDENTITY_LENGTH..=MAX_IDENTITY_LENGTH).contains(&length) {
            return Err(IdentityError::InvalidLength {
                length,
                min: MIN_IDENTITY_LENGTH,
                max: MAX_IDENTITY_LENGTH,
            });
        }
        Ok(Self { length })
    }

    /// 토큰 길이
    pub fn length(&self) -> usize {
        self.length
    }

    /// 새 식별자를 생성합니다.
    ///
    /// UUID는 `uuid` 크레이트를 통해 OS 엔트로피에서 얻으며, OS 소스를 읽을 수
    /// 없으면 `uuid`가 패닉합니다.
    ///
    /// # Errors
    ///
    /// - [`IdentityError::EntropyUnavailable`]: 소스가 nil UUID를 반환한 경우
    /// - [`IdentityError::Reused`]: 이 프로세스가 이미 발급한 토큰인 경우
    pub fn generate(&self) -> Result<RunIdentity, IdentityError> {
        let uuid = Uuid::new_v4();
        if uuid.is_nil() {
            return Err(IdentityError::EntropyUnavailable(
                "random source returned an all-zero uuid".to_owned(),
            ));
        }

        let hex = uuid.simple().to_string();
        let identity = RunIdentity::parse(&hex[..self.length])?;
        claim(&identity)?;

        debug!(run_id = %identity, length = self.length, "generated run identity");
        Ok(identity)
    }
}

impl Default for IdentityGenerator {
    fn default() -> Self {
        Self {
            length: DEFAULT_IDENTITY_LENGTH,
        }
    }
}

/// 설정으로부터 실행 식별자를 결정합니다.
///
/// `fixed` 값이 있으면 (정규화 후) 그대로 사용하여 이전 실행을 재현하고,
/// 없으면 새 식별자를 생성합니다.
pub fn resolve_identity(config: &IdentityConfig) -> Result<RunIdentity, IdentityError> {
    if !config.fixed.is_empty() {
        let identity = RunIdentity::parse(&config.fixed)?;
        warn!(
            run_id = %identity,
            "using fixed run identity; concurrent runs with the same identity will collide"
        );
        return Ok(identity);
    }

    IdentityGenerator::new(config.length)?.generate()
}

fn claim(identity: &RunIdentity) -> Result<(), IdentityError> {
    let mut issued = ISSUED.lock().unwrap_or_else(PoisonError::into_inner);
    if !issued.insert(identity.as_str().to_owned()) {
        return Err(IdentityError::Reused(identity.to_string()));
    }
    Ok(())
}
