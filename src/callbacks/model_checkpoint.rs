// ============================================================
// Layer 5 — ModelCheckpoint
// ============================================================
// Saves the model whenever the monitored metric improves.
//
//   callbacks:
//     model_checkpoint:
//       _target_: ModelCheckpoint
//       dirpath: ${paths.output_dir}/checkpoints
//       filename: epoch_best        ← fixed name, one file total
//       monitor: val_loss           ← null saves after every validation
//       mode: min
//
// The last improving save is remembered as best_model_path, which
// the test stage loads before evaluating.

use std::path::{Path, PathBuf};

use anyhow::Result;
use burn::tensor::backend::AutodiffBackend;
use serde::Deserialize;

use crate::callbacks::{monitored, Callback, Control, FitContext};
use crate::domain::metrics::{MetricMap, MonitorMode};
use crate::infra::checkpoint::{CheckpointPolicy, CheckpointWriter, FilenameStrategy};
use crate::ml::model::ImageClassifier;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelCheckpointArgs {
    pub dirpath:  PathBuf,
    pub filename: String,
    pub monitor:  Option<String>,
    pub mode:     MonitorMode,
}

impl Default for ModelCheckpointArgs {
    fn default() -> Self {
        Self {
            dirpath:  PathBuf::from("checkpoints"),
            filename: "epoch_best".to_string(),
            monitor:  Some("val_loss".to_string()),
            mode:     MonitorMode::Min,
        }
    }
}

pub struct ModelCheckpoint {
    writer:     CheckpointWriter,
    monitor:    Option<String>,
    mode:       MonitorMode,
    best_path:  Option<PathBuf>,
    best_score: Option<f64>,
}

impl ModelCheckpoint {
    pub fn new(args: ModelCheckpointArgs) -> Result<Self> {
        let writer = CheckpointWriter::new(CheckpointPolicy {
            directory: args.dirpath,
            filename:  FilenameStrategy::parse(&args.filename),
        })?;
        Ok(Self {
            writer,
            monitor:    args.monitor,
            mode:       args.mode,
            best_path:  None,
            best_score: None,
        })
    }

    pub fn dirpath(&self) -> &Path {
        &self.writer.policy().directory
    }

    fn save<B: AutodiffBackend>(&mut self, model: &ImageClassifier<B>, ctx: &FitContext) -> Result<PathBuf> {
        tracing::info!("Saving checkpoint to: {}", self.dirpath().display());
        self.writer.save(model, ctx.epoch, ctx.global_step)
    }
}

impl<B: AutodiffBackend> Callback<B> for ModelCheckpoint {
    fn name(&self) -> &str {
        "ModelCheckpoint"
    }

    fn on_validation_end(
        &mut self,
        ctx:     &FitContext,
        model:   &ImageClassifier<B>,
        metrics: &MetricMap,
    ) -> Result<Control> {
        let Some(monitor) = self.monitor.clone() else {
            self.best_path = Some(self.save(model, ctx)?);
            return Ok(Control::Continue);
        };

        let current = monitored(metrics, &monitor, "ModelCheckpoint")?;
        if self.mode.is_improvement(current, self.best_score, 0.0) {
            tracing::info!(
                "Epoch {}: {monitor} improved to {current:.4} (previous best {})",
                ctx.epoch,
                self.best_score.map_or("none".to_string(), |b| format!("{b:.4}")),
            );
            self.best_path = Some(self.save(model, ctx)?);
            self.best_score = Some(current);
        }
        Ok(Control::Continue)
    }

    fn best_model_path(&self) -> Option<&Path> {
        self.best_path.as_deref()
    }

    fn best_model_score(&self) -> Option<f64> {
        self.best_score
    }
}
