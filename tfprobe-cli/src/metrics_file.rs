//! Prometheus metrics written to a text file at the end of a run.
//!
//! A CLI run is too short-lived to be scraped, so the recorder is
//! installed without an HTTP listener and its rendered text-format
//! snapshot is written to a file (node_exporter textfile collector
//! style).

use std::path::{Path, PathBuf};

use anyhow::Result;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use tfprobe_core::metrics::{COMMAND_DURATION_BUCKETS, ENGINE_COMMAND_DURATION_SECONDS, describe_all};

/// Installed recorder plus the file it is flushed to.
pub struct MetricsFile {
    handle: PrometheusHandle,
    path: PathBuf,
}

impl MetricsFile {
    /// Install the global recorder. Call once per process.
    ///
    /// # Errors
    ///
    /// - Global recorder is already installed
    pub fn install(path: impl Into<PathBuf>) -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full(ENGINE_COMMAND_DURATION_SECONDS.to_owned()),
                &COMMAND_DURATION_BUCKETS,
            )
            .map_err(|e| anyhow::anyhow!("invalid histogram buckets: {}", e))?
            .install_recorder()
            .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {}", e))?;

        describe_all();

        let path = path.into();
        tracing::debug!(path = %path.display(), "metrics recorder installed");
        Ok(Self { handle, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the current snapshot in Prometheus text format.
    pub async fn flush(&self) -> std::io::Result<()> {
        tokio::fs::write(&self.path, self.handle.render()).await?;
        tracing::info!(path = %self.path.display(), "metrics written");
        Ok(())
    }
}
