#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod metrics;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, EngineError, IdentityError, ProbeError};

// 설정
pub use config::{CaseConfig, ExpectationConfig, ProbeConfig};

// 도메인 타입
pub use types::{IdempotenceCheck, Phase, RunIdentity, VarValue};
