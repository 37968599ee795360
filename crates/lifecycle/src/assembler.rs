//! 호출 설정 조립
//!
//! [`InvocationBuilder`]는 한 실행의 모듈 디렉토리, 변수 파일 오버레이, 인라인
//! 변수를 모아 [`InvocationConfig`]로 고정합니다. 고정된 값에는 setter가 없으며
//! 드라이버와 teardown finalizer가 `Arc`로 공유합니다.
//!
//! 여기서는 구조 검증만 수행합니다. 모듈이 변수를 받아들이는지는 엔진이
//! 판단합니다.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tfprobe_core::config::CaseConfig;
use tfprobe_core::types::{RunIdentity, VarValue};

use crate::error::LifecycleError;

/// 실행 식별자(및 추가 attributes)를 받는 변수
pub const ATTRIBUTES_VAR: &str = "attributes";

/// 모듈의 리소스 생성 여부를 정하는 변수
pub const ENABLED_VAR: &str = "enabled";

/// 타입이 있는 모듈 변수
///
/// `attributes`와 `enabled`는 테스트 대상 모듈이 모두 이해하는 두 변수이며,
/// 나머지는 `extra`에 들어갑니다.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleVariables {
    attributes: Vec<String>,
    enabled: Option<bool>,
    extra: BTreeMap<String, VarValue>,
}

impl ModuleVariables {
    /// 이름 attributes (첫 항목은 항상 실행 식별자)
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    /// 설정된 경우 `enabled` 값
    pub fn enabled(&self) -> Option<bool> {
        self.enabled
    }

    /// 이름순으로 정렬된 추가 인라인 변수
    pub fn extra(&self) -> &BTreeMap<String, VarValue> {
        &self.extra
    }
}

/// 한 실행의 불변 엔진 호출 파라미터
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationConfig {
    module_dir: PathBuf,
    var_files: Vec<PathBuf>,
    variables: ModuleVariables,
    upgrade: bool,
    env: BTreeMap<String, String>,
    run_id: RunIdentity,
}

impl InvocationConfig {
    /// `module_dir`에 대한 builder를 시작하고 `run_id`를 `attributes`에 연결합니다.
    pub fn builder(module_dir: impl Into<PathBuf>, run_id: &RunIdentity) -> InvocationBuilder {
        InvocationBuilder {
            module_dir: module_dir.into(),
            run_id: run_id.clone(),
            var_files: Vec::new(),
            attributes: Vec::new(),
            enabled: None,
            extra: BTreeMap::new(),
            env: BTreeMap::new(),
        }
    }

    pub fn module_dir(&self) -> &Path {
        &self.module_dir
    }

    /// 적용 순서대로의 변수 파일 오버레이
    pub fn var_files(&self) -> &[PathBuf] {
        &self.var_files
    }

    pub fn variables(&self) -> &ModuleVariables {
        &self.variables
    }

    /// 항상 `true` (모든 실행이 provider 플러그인을 갱신)
    pub fn upgrade(&self) -> bool {
        self.upgrade
    }

    /// 엔진 프로세스용 추가 환경변수
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn run_id(&self) -> &RunIdentity {
        &self.run_id
    }

    /// `apply`, `plan`, `destroy`용 변수 인자를 생성합니다.
    ///
    /// 순서: 목록 순서대로의 `-var-file`, `attributes`, `enabled`, 추가 변수.
    /// 엔진은 뒤의 인자를 앞의 인자 위에 적용하므로 마지막 오버레이가 앞선
    /// 오버레이보다 우선하고, 인라인 값은 모든 파일보다 우선합니다.
    pub fn variable_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.var_files.len() + 2 * (self.variables.extra.len() + 2));

        for file in &self.var_files {
            args.push(format!("-var-file={}", file.display()));
        }

        args.push("-var".to_owned());
        args.push(format!(
            "{ATTRIBUTES_VAR}={}",
            VarValue::List(self.variables.attributes.clone()).to_hcl()
        ));

        if let Some(enabled) = self.variables.enabled {
            args.push("-var".to_owned());
            args.push(format!("{ENABLED_VAR}={enabled}"));
        }

        for (name, value) in &self.variables.extra {
            args.push("-var".to_owned());
            args.push(format!("{name}={}", value.to_hcl()));
        }

        args
    }
}

/// [`InvocationConfig`] builder
#[derive(Debug, Clone)]
pub struct InvocationBuilder {
    module_dir: PathBuf,
    run_id: RunIdentity,
    var_files: Vec<PathBuf>,
    attributes: Vec<String>,
    enabled: Option<bool>,
    extra: BTreeMap<String, VarValue>,
    env: BTreeMap<String, String>,
}

impl InvocationBuilder {
    /// 변수 파일 오버레이 추가 (상대 경로는 모듈 디렉토리 기준)
    pub fn var_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.var_files.push(path.into());
        self
    }

    pub fn var_files<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.var_files.extend(paths.into_iter().map(Into::into));
        self
    }

    /// 실행 식별자 뒤에 이름 attribute 추가
    pub fn attribute(mut self, value: impl Into<String>) -> Self {
        self.attributes.push(value.into());
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// 추가 인라인 변수 설정. 같은 이름으로 다시 호출하면 값을 교체합니다.
    pub fn var(mut self, name: impl Into<String>, value: impl Into<VarValue>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// 설정을 고정합니다.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::Invocation`]: 모듈 디렉토리나 변수 파일 경로가 비어 있거나,
    /// 변수 이름이 식별자가 아니거나, `attributes`/`enabled`를 타입 없는 변수로
    /// 전달한 경우
    pub fn build(self) -> Result<InvocationConfig, LifecycleError> {
        if self.module_dir.as_os_str().is_empty() {
            return Err(invocation_error("module_dir", "must not be empty"));
        }

        if self.var_files.iter().any(|f| f.as_os_str().is_empty()) {
            return Err(invocation_error("var_files", "entries must not be empty"));
        }

        for name in self.extra.keys() {
            if name == ATTRIBUTES_VAR || name == ENABLED_VAR {
                return Err(invocation_error(
                    name,
                    "reserved variable; use the typed attribute()/enabled() setters",
                ));
            }
            if !is_identifier(name) {
                return Err(invocation_error(name, "not a valid variable name"));
            }
        }

        if self.attributes.iter().any(|a| a.is_empty()) {
            return Err(invocation_error(ATTRIBUTES_VAR, "entries must not be empty"));
        }

        let mut attributes = Vec::with_capacity(self.attributes.len() + 1);
        attributes.push(self.run_id.to_string());
        attributes.extend(self.attributes);

        Ok(InvocationConfig {
            module_dir: self.module_dir,
            var_files: self.var_files,
            variables: ModuleVariables {
                attributes,
                enabled: self.enabled,
                extra: self.extra,
            },
            upgrade: true,
            env: self.env,
            run_id: self.run_id,
        })
    }
}

/// 설정된 케이스의 호출 설정을 만듭니다.
///
/// 상대 `module_dir`는 `base_dir`(suite 파일이 있는 디렉토리) 기준으로
/// 해석합니다.
pub fn assemble_case(
    case: &CaseConfig,
    run_id: &RunIdentity,
    base_dir: &Path,
) -> Result<InvocationConfig, LifecycleError> {
    let module_dir = Path::new(&case.module_dir);
    let module_dir = if module_dir.is_absolute() {
        module_dir.to_path_buf()
    } else {
        base_dir.join(module_dir)
    };

    let mut builder = InvocationConfig::builder(module_dir, run_id).var_files(&case.var_files);
    for attribute in &case.attributes {
        builder = builder.attribute(attribute.as_str());
    }
    if let Some(enabled) = case.enabled {
        builder = builder.enabled(enabled);
    }
    for (name, value) in &case.vars {
        builder = builder.var(name.as_str(), value.clone());
    }
    builder.build()
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn invocation_error(field: &str, reason: &str) -> LifecycleError {
    LifecycleError::Invocation {
        field: field.to_owned(),
        reason: reason.to_owned(),
    }
}
