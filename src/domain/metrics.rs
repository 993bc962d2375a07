// ============================================================
// Layer 3 — Metrics and Lifecycle Types
// ============================================================
// Plain data shared by the trainer, callbacks and loggers.
// No burn types here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Named scalar metrics, e.g. {"val_acc": 0.91, "val_loss": 0.27}.
/// A BTreeMap keeps the printed and CSV column order stable.
pub type MetricMap = BTreeMap<String, f64>;

/// Render metrics as `name=value` pairs on one line.
pub fn format_metrics(metrics: &MetricMap) -> String {
    if metrics.is_empty() {
        return "{}".to_string();
    }
    metrics
        .iter()
        .map(|(k, v)| format!("{k}={v:.4}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Which part of the lifecycle a datamodule is being prepared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fit,
    Test,
    Predict,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Fit => "fit",
            Stage::Test => "test",
            Stage::Predict => "predict",
        };
        f.write_str(name)
    }
}

/// Whether a monitored metric should go down or up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorMode {
    #[default]
    Min,
    Max,
}

impl MonitorMode {
    /// Returns true if `current` beats `best` by more than `min_delta`.
    /// Anything beats "no best yet".
    pub fn is_improvement(&self, current: f64, best: Option<f64>, min_delta: f64) -> bool {
        if current.is_nan() {
            return false;
        }
        match (self, best) {
            (_, None) => true,
            (MonitorMode::Min, Some(best)) => current < best - min_delta,
            (MonitorMode::Max, Some(best)) => current > best + min_delta,
        }
    }
}

/// Output of the predict loop for one sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub label: String,
    pub score: f32,
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_improvement() {
        // 2.3 < 3.0 → improvement when minimising
        assert!(MonitorMode::Min.is_improvement(2.3, Some(3.0), 0.0));
        assert!(!MonitorMode::Min.is_improvement(2.3, Some(2.0), 0.0));
        assert!(MonitorMode::Max.is_improvement(0.9, Some(0.8), 0.0));
        assert!(!MonitorMode::Max.is_improvement(0.81, Some(0.8), 0.05));
        assert!(MonitorMode::Max.is_improvement(0.1, None, 0.0));
        assert!(!MonitorMode::Min.is_improvement(f64::NAN, None, 0.0));
    }

    #[test]
    fn test_format_metrics() {
        let mut m = MetricMap::new();
        m.insert("val_loss".into(), 0.5);
        m.insert("val_acc".into(), 0.75);
        assert_eq!(format_metrics(&m), "val_acc=0.7500, val_loss=0.5000");
        assert_eq!(format_metrics(&MetricMap::new()), "{}");
    }
}
