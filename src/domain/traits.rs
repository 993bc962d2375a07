// ============================================================
// Layer 3 — Core Traits
// ============================================================
// Seams the trainer talks through. Implementations live in
// infra/ (loggers); the burn-aware Callback trait lives next to
// the model in callbacks/ because its hooks receive the network.

use anyhow::Result;
use serde_yaml::Value;

use crate::domain::metrics::MetricMap;

// ─── MetricsLogger ────────────────────────────────────────────────────────────
/// Anything that records hyper-parameters and metrics for a run.
///
/// Implementations:
///   - CsvLogger     → metrics.csv + hparams.yaml on disk
///   - TracingLogger → metrics as tracing events
pub trait MetricsLogger {
    /// Short name used in log lines.
    fn name(&self) -> &str;

    /// Called once, before fitting, with the resolved run configuration.
    fn log_hyperparams(&mut self, params: &Value) -> Result<()>;

    fn log_metrics(&mut self, metrics: &MetricMap, step: usize) -> Result<()>;

    /// Flush whatever is buffered. `status` is "success" or "failed".
    fn finalize(&mut self, _status: &str) -> Result<()> {
        Ok(())
    }
}
