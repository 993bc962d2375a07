// ============================================================
// Layer 2 — InferUseCase
// ============================================================
// Loads a trained checkpoint and prepares the model for
// inference:
//
//   Step 1: Create paths.log_dir, open infer_log.log
//   Step 2: Print the resolved config
//   Step 3: Build the model from `model`
//   Step 4: Load `ckpt_path` into it (missing or mismatched → error)
//   Step 5: Switch to evaluation mode
//   Step 6: Report input_folder / output_folder
//
// Single images are classified with ml::inferencer::infer.
// Walking input_folder and writing results to output_folder is
// not part of this use case.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use burn::{module::AutodiffModule, prelude::*, tensor::backend::AutodiffBackend};

use crate::application::accelerator_at;
use crate::config::ConfigTree;
use crate::infra::{checkpoint::load_checkpoint, logging::LoggingContext};
use crate::ml::backend::{dispatch, Accelerator, BackendTask};
use crate::registry::{Components, Section};

/// What was loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferOutcome {
    pub checkpoint:      PathBuf,
    pub epoch:           usize,
    pub parameter_count: usize,
}

pub struct InferUseCase {
    cfg: ConfigTree,
}

impl InferUseCase {
    pub fn new(cfg: ConfigTree) -> Self {
        Self { cfg }
    }

    pub fn execute(&self) -> Result<InferOutcome> {
        let cfg = &self.cfg;

        let log_dir = PathBuf::from(cfg.require_str("paths.log_dir")?);
        fs::create_dir_all(&log_dir)
            .with_context(|| format!("Cannot create log_dir '{}'", log_dir.display()))?;
        let _logging = LoggingContext::open(&log_dir.join("infer_log.log"))?;

        println!("Configuration:\n{}", cfg.to_yaml()?);

        // Checkpoints load on the CPU unless told otherwise.
        let accelerator = accelerator_at(cfg, "accelerator", Accelerator::Cpu)?;
        dispatch(accelerator, InferTask { cfg })
    }
}

struct InferTask<'a> {
    cfg: &'a ConfigTree,
}

impl BackendTask for InferTask<'_> {
    type Output = InferOutcome;

    fn run<B: AutodiffBackend>(self, device: B::Device) -> Result<InferOutcome> {
        let cfg = self.cfg;

        let components = Components::<B>::builtin();
        components.validate(cfg, &[Section::Model])?;

        let model_node = cfg.require("model")?;
        tracing::info!("Instantiating model <{}>", model_node.target().unwrap_or_default());
        let classifier = components.models.instantiate(&model_node, &device)?;

        let ckpt_path = Path::new(cfg.require_str("ckpt_path")?);
        tracing::info!("Loading model checkpoint: {}", ckpt_path.display());
        let (network, meta) = load_checkpoint(classifier.network, ckpt_path, &device)?;

        // Evaluation mode: no autodiff graph, dropout off.
        let network = network.valid();

        tracing::info!("Input folder: {}", cfg.require_str("input_folder")?);
        tracing::info!("Output folder: {}", cfg.require_str("output_folder")?);

        tracing::info!("Starting inference...");
        tracing::info!("Inference completed.");

        Ok(InferOutcome {
            checkpoint:      ckpt_path.to_path_buf(),
            epoch:           meta.epoch,
            parameter_count: network.num_params(),
        })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::checkpoint::{CheckpointPolicy, CheckpointWriter, FilenameStrategy};
    use crate::ml::model::ImageClassifierConfig;
    use burn::backend::{Autodiff, NdArray};

    fn config(root: &Path, ckpt: &Path, conv_channels: &str) -> ConfigTree {
        let yaml = format!(
            r#"
ckpt_path: {ckpt}
input_folder: {root}/samples
output_folder: {root}/predictions
accelerator: cpu
paths:
  log_dir: {root}/logs
model:
  _target_: ImageClassifier
  num_classes: 3
  conv_channels: {conv_channels}
  hidden_size: 8
"#,
            root = root.display(),
            ckpt = ckpt.display(),
        );
        ConfigTree::from_yaml_str(&yaml).unwrap()
    }

    fn saved_checkpoint(dir: &Path) -> PathBuf {
        let writer = CheckpointWriter::new(CheckpointPolicy {
            directory: dir.join("checkpoints"),
            filename:  FilenameStrategy::Fixed("epoch_best".into()),
        })
        .unwrap();
        let model = ImageClassifierConfig::new(3, 3, vec![4], 8, 0.2).init::<Autodiff<NdArray>>(&Default::default());
        writer.save(&model, 4, 40).unwrap()
    }

    #[test]
    fn loads_checkpoint_and_logs_each_step() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = saved_checkpoint(dir.path());

        let outcome = InferUseCase::new(config(dir.path(), &ckpt, "[4]")).execute().unwrap();
        assert_eq!(outcome.epoch, 4);
        assert_eq!(outcome.checkpoint, ckpt);

        let log = fs::read_to_string(dir.path().join("logs").join("infer_log.log")).unwrap();
        let expected = [
            "Instantiating model <ImageClassifier>",
            "Loading model checkpoint:",
            "Input folder:",
            "Output folder:",
            "Starting inference...",
            "Inference completed.",
        ];
        let mut from = 0;
        for line in expected {
            let at = log[from..].find(line).unwrap_or_else(|| panic!("'{line}' missing or out of order"));
            from += at + line.len();
        }
    }

    #[test]
    fn missing_checkpoint_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), &dir.path().join("absent.mpk"), "[4]");
        let err = InferUseCase::new(cfg).execute().unwrap_err();
        assert!(format!("{err:#}").contains("not found"));
        let log = fs::read_to_string(dir.path().join("logs").join("infer_log.log")).unwrap();
        assert!(!log.contains("Starting inference..."));
    }

    #[test]
    fn checkpoint_from_a_different_architecture_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = saved_checkpoint(dir.path());
        assert!(InferUseCase::new(config(dir.path(), &ckpt, "[4, 8]")).execute().is_err());
    }
}
