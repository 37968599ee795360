//! CLI-specific error types and exit code mapping

use tfprobe_core::error::{ConfigError, ProbeError};
use tfprobe_lifecycle::LifecycleError;

/// CLI-specific error type.
///
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// At least one case failed.
    #[error("{failed} of {total} case(s) failed")]
    SuiteFailed { failed: usize, total: usize },

    /// The run was interrupted (Ctrl-C); teardown has run.
    #[error("interrupted")]
    Interrupted,

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from tfprobe-core.
    #[error("{0}")]
    Core(#[from] ProbeError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                 |
    /// |------|-------------------------|
    /// | 0    | Success                 |
    /// | 1    | General / command error |
    /// | 2    | Configuration error     |
    /// | 4    | One or more cases failed |
    /// | 10   | IO error                |
    /// | 130  | Interrupted             |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Core(ProbeError::Config(_)) => 2,
            Self::SuiteFailed { .. } => 4,
            Self::Io(_) | Self::Core(ProbeError::Io(_)) => 10,
            Self::Interrupted => 130,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Core(_) => 1,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::Core(ProbeError::Config(e))
    }
}

impl From<LifecycleError> for CliError {
    fn from(e: LifecycleError) -> Self {
        Self::Core(e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tfprobe_core::error::IdentityError;

    #[test]
    fn test_exit_code_config_error() {
        let err = CliError::Config("test error".to_owned());
        assert_eq!(err.exit_code(), 2, "config error should return exit code 2");
    }

    #[test]
    fn test_exit_code_core_config_error() {
        let err: CliError = ConfigError::FileNotFound {
            path: "tfprobe.toml".to_owned(),
        }
        .into();
        assert_eq!(err.exit_code(), 2, "core config error should return exit code 2");
    }

    #[test]
    fn test_exit_code_suite_failed() {
        let err = CliError::SuiteFailed { failed: 1, total: 3 };
        assert_eq!(err.exit_code(), 4);
        assert_eq!(err.to_string(), "1 of 3 case(s) failed");
    }

    #[test]
    fn test_exit_code_interrupted() {
        assert_eq!(CliError::Interrupted.exit_code(), 130);
    }

    #[test]
    fn test_exit_code_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        assert_eq!(CliError::Io(io_err).exit_code(), 10);
    }

    #[test]
    fn test_exit_code_command_error() {
        let err = CliError::Command("test error".to_owned());
        assert_eq!(err.exit_code(), 1);
        assert_eq!(err.to_string(), "test error");
    }

    #[test]
    fn test_from_lifecycle_identity_error() {
        let err: CliError =
            LifecycleError::Identity(IdentityError::Reused("abc123".to_owned())).into();
        match err {
            CliError::Core(ProbeError::Identity(_)) => {}
            other => panic!("expected Core(Identity), got {other:?}"),
        }
    }

    #[test]
    fn test_from_lifecycle_engine_error_is_general() {
        let err: CliError = LifecycleError::Bootstrap("git missing".to_owned()).into();
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().contains("git missing"));
    }
}
