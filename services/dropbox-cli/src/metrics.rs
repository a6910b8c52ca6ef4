//! Prometheus metrics exposition
//!
//! The SDK records `babel_requests_total` (label `style`) and
//! `babel_call_errors_total` (label `kind`). With `--metrics` the CLI prints
//! the rendered snapshot after the command finishes.

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the global Prometheus recorder and return a handle for rendering.
pub fn install_recorder() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")
}
