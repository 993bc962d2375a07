use anyhow::Result;
use burn::tensor::backend::AutodiffBackend;
use serde::Deserialize;

use crate::callbacks::{monitored, Callback, Control, FitContext};
use crate::domain::metrics::{MetricMap, MonitorMode};
use crate::ml::model::ImageClassifier;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EarlyStoppingArgs {
    pub monitor:   String,
    pub mode:      MonitorMode,
    pub patience:  usize,
    pub min_delta: f64,
}

impl Default for EarlyStoppingArgs {
    fn default() -> Self {
        Self {
            monitor:   "val_loss".to_string(),
            mode:      MonitorMode::Min,
            patience:  3,
            min_delta: 0.0,
        }
    }
}

/// Stops fitting after `patience` validations without improvement.
pub struct EarlyStopping {
    args: EarlyStoppingArgs,
    best: Option<f64>,
    wait: usize,
}

impl EarlyStopping {
    pub fn new(args: EarlyStoppingArgs) -> Self {
        Self { args, best: None, wait: 0 }
    }
}

impl<B: AutodiffBackend> Callback<B> for EarlyStopping {
    fn name(&self) -> &str {
        "EarlyStopping"
    }

    fn on_fit_start(&mut self, _ctx: &FitContext) -> Result<()> {
        self.best = None;
        self.wait = 0;
        Ok(())
    }

    fn on_validation_end(
        &mut self,
        ctx:      &FitContext,
        _model:   &ImageClassifier<B>,
        metrics:  &MetricMap,
    ) -> Result<Control> {
        let current = monitored(metrics, &self.args.monitor, "EarlyStopping")?;

        if self.args.mode.is_improvement(current, self.best, self.args.min_delta) {
            self.best = Some(current);
            self.wait = 0;
            return Ok(Control::Continue);
        }

        self.wait += 1;
        if self.wait >= self.args.patience {
            tracing::info!(
                "Epoch {}: {} did not improve for {} validations (best {:.4}), stopping",
                ctx.epoch,
                self.args.monitor,
                self.wait,
                self.best.unwrap_or(f64::NAN),
            );
            return Ok(Control::Stop);
        }
        Ok(Control::Continue)
    }
}
