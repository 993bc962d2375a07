// ============================================================
// Layer 5 — Training Callbacks
// ============================================================
// Hooks the trainer calls at fixed points of `fit`:
//
//   on_fit_start
//   ┌─ per epoch ─────────────────────────────────┐
//   │ train batches                               │
//   │ on_train_epoch_end(train metrics)           │
//   │ validation batches                          │
//   │ on_validation_end(model, all metrics) → Control
//   └─────────────────────────────────────────────┘
//   on_fit_end
//
// Every hook has a no-op default, so a callback only writes
// the ones it cares about. A `Control::Stop` from any callback
// ends fitting once `min_epochs` have run.

pub mod early_stopping;
pub mod model_checkpoint;

use std::path::Path;

use anyhow::Result;
use burn::tensor::backend::AutodiffBackend;

use crate::domain::metrics::MetricMap;
use crate::ml::model::ImageClassifier;

pub use early_stopping::EarlyStopping;
pub use model_checkpoint::ModelCheckpoint;

/// Where the trainer is when a hook fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitContext {
    /// 1-based; 0 before the first epoch.
    pub epoch:       usize,
    pub global_step: usize,
    pub max_epochs:  usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Stop,
}

pub trait Callback<B: AutodiffBackend> {
    fn name(&self) -> &str;

    fn on_fit_start(&mut self, _ctx: &FitContext) -> Result<()> {
        Ok(())
    }

    fn on_train_epoch_end(&mut self, _ctx: &FitContext, _metrics: &MetricMap) -> Result<()> {
        Ok(())
    }

    fn on_validation_end(
        &mut self,
        _ctx:     &FitContext,
        _model:   &ImageClassifier<B>,
        _metrics: &MetricMap,
    ) -> Result<Control> {
        Ok(Control::Continue)
    }

    fn on_fit_end(&mut self, _ctx: &FitContext) -> Result<()> {
        Ok(())
    }

    /// Set by checkpointing callbacks once they have saved something.
    fn best_model_path(&self) -> Option<&Path> {
        None
    }

    fn best_model_score(&self) -> Option<f64> {
        None
    }
}

/// Look up a monitored metric, failing with the names that do exist.
pub(crate) fn monitored(metrics: &MetricMap, monitor: &str, who: &str) -> Result<f64> {
    metrics.get(monitor).copied().ok_or_else(|| {
        anyhow::anyhow!(
            "{who} monitors '{monitor}' but it was not logged (available: {})",
            metrics.keys().cloned().collect::<Vec<_>>().join(", ")
        )
    })
}
