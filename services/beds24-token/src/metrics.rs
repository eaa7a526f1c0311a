//! Prometheus snapshot of the credential counters
//!
//! The tool runs once and exits, so there is no scrape endpoint. With
//! `--metrics-file` the recorder is installed at startup and the rendered
//! text exposition is written to that file on exit, in the format read by
//! the node_exporter textfile collector.

use std::path::Path;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the process-wide Prometheus recorder.
pub fn install_recorder() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")
}

/// Render the current counters and replace `path` with them.
///
/// Written to a sibling temp file first so a collector never reads a partial
/// snapshot.
pub fn write_snapshot(handle: &PrometheusHandle, path: &Path) -> Result<()> {
    let tmp = path.with_extension("prom.tmp");
    std::fs::write(&tmp, handle.render())
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("failed to move metrics snapshot to {}", path.display()))
}
