//! `tfprobe config` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use tfprobe_core::config::{CaseConfig, ProbeConfig};

use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

const SECTIONS: &str = "general, engine, bootstrap, identity, case";
const REDACTED: &str = "***REDACTED***";

/// Execute the `config` command.
pub async fn execute(
    args: ConfigArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => execute_validate(config_path, writer).await,
        ConfigAction::Show { section } => execute_show(config_path, section, writer).await,
    }
}

/// Loads and validates the suite file, reporting any errors.
///
/// # Errors
///
/// Returns `CliError::Config` if validation fails (parse errors, invalid values).
async fn execute_validate(config_path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    info!(path = %config_path.display(), "validating configuration");

    let report = match ProbeConfig::load(config_path).await {
        Ok(config) => ConfigValidationReport {
            source: config_path.display().to_string(),
            valid: true,
            cases: config.cases.iter().map(|c| c.name.clone()).collect(),
            errors: Vec::new(),
        },
        Err(e) => ConfigValidationReport {
            source: config_path.display().to_string(),
            valid: false,
            cases: Vec::new(),
            errors: vec![e.to_string()],
        },
    };

    writer.render(&report)?;

    if !report.valid {
        return Err(CliError::Config("configuration is invalid".to_owned()));
    }

    Ok(())
}

/// Shows the effective configuration (file + env overrides + defaults),
/// with sensitive engine environment values redacted.
async fn execute_show(
    config_path: &Path,
    section: Option<String>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    info!(path = %config_path.display(), "loading configuration");

    let mut config = ProbeConfig::load(config_path).await?;
    redact_engine_env(&mut config);

    let report = ConfigReport::build(config_path, &config, section)?;
    writer.render(&report)?;

    Ok(())
}

#[derive(Serialize)]
struct CaseSection<'a> {
    case: &'a [CaseConfig],
}

/// Replaces values of engine environment variables that look like secrets.
fn redact_engine_env(config: &mut ProbeConfig) {
    for (key, value) in config.engine.env.iter_mut() {
        if is_sensitive(key) {
            *value = REDACTED.to_owned();
        }
    }
}

fn is_sensitive(key: &str) -> bool {
    let key = key.to_ascii_uppercase();
    ["SECRET", "TOKEN", "PASSWORD", "ACCESS_KEY", "PRIVATE_KEY", "CREDENTIAL"]
        .iter()
        .any(|marker| key.contains(marker))
}

fn to_toml<T: Serialize>(value: &T) -> Result<String, CliError> {
    toml::to_string_pretty(value)
        .map_err(|e| CliError::Command(format!("failed to serialize configuration: {e}")))
}

fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value, CliError> {
    Ok(serde_json::to_value(value)?)
}

/// Configuration display report.
///
/// `config_toml` is only used for text rendering; JSON output carries `config`.
#[derive(Serialize)]
pub struct ConfigReport {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub config: serde_json::Value,
    #[serde(skip)]
    pub config_toml: String,
}

impl ConfigReport {
    fn build(
        config_path: &Path,
        config: &ProbeConfig,
        section: Option<String>,
    ) -> Result<Self, CliError> {
        let (config_toml, value) = match section.as_deref() {
            None => (to_toml(config)?, to_json(config)?),
            Some("general") => (to_toml(&config.general)?, to_json(&config.general)?),
            Some("engine") => (to_toml(&config.engine)?, to_json(&config.engine)?),
            Some("bootstrap") => (to_toml(&config.bootstrap)?, to_json(&config.bootstrap)?),
            Some("identity") => (to_toml(&config.identity)?, to_json(&config.identity)?),
            Some("case") => {
                let cases = CaseSection {
                    case: &config.cases,
                };
                (to_toml(&cases)?, to_json(&config.cases)?)
            }
            Some(other) => {
                return Err(CliError::Command(format!(
                    "unknown section: {other} (expected: {SECTIONS})"
                )));
            }
        };

        Ok(Self {
            source: config_path.display().to_string(),
            section,
            config: value,
            config_toml,
        })
    }
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if let Some(ref section) = self.section {
            let section_label = format!("[{}]", section);
            writeln!(
                w,
                "Configuration {} (source: {})",
                section_label.bold(),
                self.source
            )?;
        } else {
            writeln!(w, "Configuration (source: {})", self.source.bold())?;
        }

        writeln!(w)?;
        write!(w, "{}", self.config_toml)?;

        Ok(())
    }
}

/// Configuration validation report.
#[derive(Serialize)]
pub struct ConfigValidationReport {
    pub source: String,
    pub valid: bool,
    /// Names of the configured cases
    pub cases: Vec<String>,
    /// Validation error messages (empty if valid)
    pub errors: Vec<String>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Config Validation: {}", self.source.bold())?;

        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
            writeln!(w, "  Cases: {}", self.cases.len())?;
            for case in &self.cases {
                writeln!(w, "    - {case}")?;
            }
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for err in &self.errors {
                writeln!(w, "  Error: {}", err.red())?;
            }
        }

        Ok(())
    }
}
