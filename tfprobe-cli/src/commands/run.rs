//! `tfprobe run` command handler

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, warn};

use tfprobe_core::config::{CaseConfig, IdentityConfig, ProbeConfig};
use tfprobe_core::types::RunIdentity;
use tfprobe_lifecycle::{
    BootstrapOutcome, LifecycleDriver, LifecycleError, RunPlan, RunReport, TeardownStatus,
    TerraformCli, install_crash_handler, resolve_identity, run_bootstrap,
};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::metrics_file::MetricsFile;
use crate::output::{OutputWriter, Render};

/// Execute the `run` command.
pub async fn execute(
    args: RunArgs,
    mut config: ProbeConfig,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    if let Some(run_id) = args.run_id {
        RunIdentity::parse(&run_id).map_err(LifecycleError::from)?;
        config.identity.fixed = run_id;
    }

    let cases: Vec<CaseConfig> = config
        .select_cases(&args.cases)?
        .into_iter()
        .cloned()
        .collect();
    if cases.is_empty() {
        return Err(CliError::Config(format!(
            "no cases to run in {}",
            config_path.display()
        )));
    }

    let metrics = match metrics_path(args.metrics_file, &config) {
        Some(path) => Some(MetricsFile::install(path).map_err(|e| CliError::Command(e.to_string()))?),
        None => None,
    };

    let bootstrap = run_bootstrap(&config.bootstrap);
    if let BootstrapOutcome::Trusted { path } = &bootstrap {
        info!(path = %path.display(), "bootstrap complete");
    }

    install_crash_handler();

    let engine = Arc::new(TerraformCli::from_config(&config.engine)?);
    let interrupt = Arc::new(AtomicBool::new(false));
    let signal_task = spawn_interrupt_listener(Arc::clone(&interrupt));

    let base_dir = suite_dir(config_path);
    let parallel = config.general.parallel && {
        match parallel_blocker(&config, &cases, &base_dir) {
            Some(reason) => {
                warn!(reason = %reason, "parallel execution disabled, running cases serially");
                false
            }
            None => true,
        }
    };

    info!(
        cases = cases.len(),
        parallel = parallel,
        engine = engine.binary(),
        "starting suite"
    );

    let context = CaseContext {
        engine,
        interrupt: Arc::clone(&interrupt),
        identity: config.identity.clone(),
        base_dir,
    };

    let mut report = SuiteReport {
        source: config_path.display().to_string(),
        parallel,
        interrupted: false,
        passed: 0,
        failed: 0,
        runs: Vec::new(),
        errors: Vec::new(),
    };

    if parallel {
        let handles: Vec<(String, JoinHandle<Result<RunReport, LifecycleError>>)> = cases
            .into_iter()
            .map(|case| (case.name.clone(), context.spawn(case)))
            .collect();
        for (name, handle) in handles {
            report.collect(name, handle.await);
        }
    } else {
        for case in cases {
            if interrupt.load(Ordering::SeqCst) {
                report.errors.push(CaseError {
                    case: case.name,
                    error: "skipped: run interrupted".to_owned(),
                });
                continue;
            }
            let name = case.name.clone();
            let result = context.spawn(case).await;
            report.collect(name, result);
        }
    }

    signal_task.abort();
    report.interrupted = interrupt.load(Ordering::SeqCst);
    report.passed = report.runs.iter().filter(|r| r.passed).count();
    report.failed = report.runs.len() - report.passed + report.errors.len();

    writer.render(&report)?;

    if let Some(metrics) = metrics {
        if let Err(e) = metrics.flush().await {
            warn!(path = %metrics.path().display(), error = %e, "failed to write metrics file");
        }
    }

    if report.interrupted {
        return Err(CliError::Interrupted);
    }
    if report.failed > 0 {
        return Err(CliError::SuiteFailed {
            failed: report.failed,
            total: report.runs.len() + report.errors.len(),
        });
    }
    Ok(())
}

/// Shared state every case runs with.
struct CaseContext {
    engine: Arc<TerraformCli>,
    interrupt: Arc<AtomicBool>,
    identity: IdentityConfig,
    base_dir: PathBuf,
}

impl CaseContext {
    /// Runs one case on a blocking thread; engine calls are blocking process waits.
    fn spawn(&self, case: CaseConfig) -> JoinHandle<Result<RunReport, LifecycleError>> {
        let engine = Arc::clone(&self.engine);
        let interrupt = Arc::clone(&self.interrupt);
        let identity = self.identity.clone();
        let base_dir = self.base_dir.clone();

        tokio::task::spawn_blocking(move || {
            let run_id = resolve_identity(&identity)?;
            let plan = RunPlan::from_case(&case, &run_id, &base_dir)?;
            Ok(LifecycleDriver::new(engine).with_interrupt(interrupt).run(plan))
        })
    }
}

fn spawn_interrupt_listener(flag: Arc<AtomicBool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; finishing the current engine call, then tearing down");
            flag.store(true, Ordering::SeqCst);
        }
    })
}

fn metrics_path(cli: Option<PathBuf>, config: &ProbeConfig) -> Option<PathBuf> {
    cli.or_else(|| {
        let configured = config.general.metrics_file.trim();
        (!configured.is_empty()).then(|| PathBuf::from(configured))
    })
}

/// Directory relative module paths are resolved against.
fn suite_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Why the selected cases cannot run concurrently, if anything prevents it.
fn parallel_blocker(config: &ProbeConfig, cases: &[CaseConfig], base_dir: &Path) -> Option<String> {
    if config.bootstrap.enabled {
        return Some("bootstrap modifies global git configuration".to_owned());
    }
    if !config.identity.fixed.is_empty() {
        return Some("a fixed run identity would be shared by every case".to_owned());
    }
    let mut seen = HashSet::new();
    for case in cases {
        let dir = base_dir.join(&case.module_dir);
        if !seen.insert(dir) {
            return Some(format!(
                "module directory '{}' is used by more than one case",
                case.module_dir
            ));
        }
    }
    None
}

/// Case that produced no run report.
#[derive(Debug, Serialize)]
pub struct CaseError {
    pub case: String,
    pub error: String,
}

/// Result of a whole `tfprobe run`.
#[derive(Debug, Serialize)]
pub struct SuiteReport {
    pub source: String,
    pub parallel: bool,
    pub interrupted: bool,
    pub passed: usize,
    pub failed: usize,
    pub runs: Vec<RunReport>,
    pub errors: Vec<CaseError>,
}

impl SuiteReport {
    fn collect(&mut self, case: String, result: Result<Result<RunReport, LifecycleError>, JoinError>) {
        match result {
            Ok(Ok(run)) => self.runs.push(run),
            Ok(Err(e)) => {
                error!(case = %case, error = %e, "case could not start");
                self.errors.push(CaseError {
                    case,
                    error: e.to_string(),
                });
            }
            Err(e) => {
                let error = if e.is_panic() {
                    "case panicked".to_owned()
                } else {
                    format!("case task failed: {e}")
                };
                error!(case = %case, error = %error, "case aborted");
                self.errors.push(CaseError { case, error });
            }
        }
    }
}

impl Render for SuiteReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Suite: {}", self.source.bold())?;
        writeln!(w)?;

        for run in &self.runs {
            let mark = if run.passed {
                "PASS".green()
            } else {
                "FAIL".red()
            };
            let teardown = match run.teardown.status {
                TeardownStatus::Destroyed => run.teardown.status.as_str().green(),
                TeardownStatus::Skipped => run.teardown.status.as_str().normal(),
                TeardownStatus::Failed => run.teardown.status.as_str().red().bold(),
            };
            writeln!(
                w,
                "  {} {} (run id {}, {:.1}s, teardown: {})",
                mark,
                run.name.bold(),
                run.run_id,
                run.duration_ms as f64 / 1000.0,
                teardown
            )?;
            for failure in run.failures() {
                writeln!(w, "      - {failure}")?;
            }
        }

        for e in &self.errors {
            writeln!(w, "  {} {}: {}", "ERROR".red(), e.case.bold(), e.error)?;
        }

        writeln!(w)?;
        let failed = if self.failed > 0 {
            self.failed.to_string().red()
        } else {
            self.failed.to_string().normal()
        };
        writeln!(
            w,
            "Result: {} passed, {} failed{}",
            self.passed.to_string().green(),
            failed,
            if self.interrupted { " (interrupted)" } else { "" }
        )?;
        Ok(())
    }
}
