//! 환경 부트스트랩
//!
//! 작업 트리를 git에서 신뢰하도록 표시합니다
//! (`git config --global --add safe.directory <path>`). 마운트된 체크아웃에서
//! 가져온 모듈 소스를 다른 사용자로 실행되는 컨테이너에서도 읽을 수 있게 합니다.
//! 실패는 보고만 하고 실행은 계속됩니다.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{info, warn};

use tfprobe_core::config::BootstrapConfig;

use crate::error::LifecycleError;

/// 부트스트랩 단계 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// 부트스트랩 비활성화
    Disabled,
    /// 디렉토리가 `safe.directory`에 추가됨
    Trusted { path: PathBuf },
    /// 단계 실패 (실행은 계속)
    Failed { reason: String },
}

/// `path`를 git 전역 `safe.directory` 목록에 추가합니다.
pub fn trust_directory(git: &str, path: &Path) -> Result<PathBuf, LifecycleError> {
    let canonical = path
        .canonicalize()
        .map_err(|e| LifecycleError::Bootstrap(format!("{}: {e}", path.display())))?;

    let output = Command::new(git)
        .args(["config", "--global", "--add", "safe.directory"])
        .arg(&canonical)
        .output()
        .map_err(|e| LifecycleError::Bootstrap(format!("failed to run '{git}': {e}")))?;

    if !output.status.success() {
        return Err(LifecycleError::Bootstrap(format!(
            "'{git} config' exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(canonical)
}

/// 설정된 부트스트랩을 실행합니다. 호출자를 실패시키지 않습니다.
pub fn run_bootstrap(config: &BootstrapConfig) -> BootstrapOutcome {
    if !config.enabled {
        return BootstrapOutcome::Disabled;
    }

    match trust_directory(&config.git_binary, Path::new(&config.path)) {
        Ok(path) => {
            info!(path = %path.display(), "marked directory as git safe.directory");
            BootstrapOutcome::Trusted { path }
        }
        Err(e) => {
            warn!(error = %e, "environment bootstrap failed, continuing");
            BootstrapOutcome::Failed {
                reason: e.to_string(),
            }
        }
    }
}
