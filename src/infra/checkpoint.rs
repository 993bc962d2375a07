// ============================================================
// Layer 6 — Checkpoints
// ============================================================
// Saves and restores model weights using Burn's CompactRecorder.
//
// What one checkpoint holds (ClassifierCheckpoint):
//   state_dict       — the network's record (all learned parameters)
//   epoch            — epoch the weights were taken after
//   global_step      — optimiser steps taken so far
//   parameter_count  — number of scalars in state_dict
//
// Where it goes is decided by a CheckpointPolicy:
//
//   CheckpointPolicy { directory: "checkpoints", filename: Fixed("epoch_best") }
//     → checkpoints/epoch_best.mpk, overwritten on every save
//
//   CheckpointPolicy { directory: "checkpoints", filename: Template("e{epoch}-s{step}") }
//     → checkpoints/e1-s40.mpk, checkpoints/e2-s80.mpk, ...
//
// Loading is strict: a missing file, a record whose parameter
// count differs from the model it is loaded into, or any parameter
// whose shape differs, is an error.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use burn::{
    module::{ModuleVisitor, ParamId},
    prelude::*,
    record::{CompactRecorder, Record, Recorder},
};

use crate::ml::model::{ImageClassifier, ImageClassifierRecord};

/// Extension CompactRecorder gives its files (named MessagePack).
pub const EXTENSION: &str = "mpk";

// ─── Record ───────────────────────────────────────────────────────────────────
#[derive(Record)]
pub struct ClassifierCheckpoint<B: Backend> {
    pub state_dict:      ImageClassifierRecord<B>,
    pub epoch:           usize,
    pub global_step:     usize,
    pub parameter_count: usize,
}

/// The bookkeeping stored next to the weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointMeta {
    pub epoch:       usize,
    pub global_step: usize,
}

// ─── Policy ───────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilenameStrategy {
    /// Same name every time: each save replaces the last.
    Fixed(String),
    /// `{epoch}` and `{step}` are substituted per save.
    Template(String),
}

impl FilenameStrategy {
    /// Names containing a `{` placeholder become templates.
    pub fn parse(raw: &str) -> Self {
        if raw.contains('{') {
            FilenameStrategy::Template(raw.to_string())
        } else {
            FilenameStrategy::Fixed(raw.to_string())
        }
    }

    pub fn render(&self, epoch: usize, step: usize) -> String {
        match self {
            FilenameStrategy::Fixed(name) => name.clone(),
            FilenameStrategy::Template(pattern) => pattern
                .replace("{epoch}", &epoch.to_string())
                .replace("{step}", &step.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointPolicy {
    pub directory: PathBuf,
    pub filename:  FilenameStrategy,
}

impl CheckpointPolicy {
    pub fn path_for(&self, epoch: usize, step: usize) -> PathBuf {
        let name = self.filename.render(epoch, step);
        self.directory.join(format!("{name}.{EXTENSION}"))
    }
}

// ─── Writer ───────────────────────────────────────────────────────────────────
/// Writes checkpoints wherever its policy says.
#[derive(Debug, Clone)]
pub struct CheckpointWriter {
    policy: CheckpointPolicy,
}

impl CheckpointWriter {
    /// Creates the policy's directory if it does not exist yet.
    pub fn new(policy: CheckpointPolicy) -> Result<Self> {
        fs::create_dir_all(&policy.directory).with_context(|| {
            format!("Cannot create checkpoint directory '{}'", policy.directory.display())
        })?;
        Ok(Self { policy })
    }

    pub fn policy(&self) -> &CheckpointPolicy {
        &self.policy
    }

    /// Save `model` and return the path written.
    pub fn save<B: Backend>(&self, model: &ImageClassifier<B>, epoch: usize, global_step: usize) -> Result<PathBuf> {
        let path = self.policy.path_for(epoch, global_step);
        let checkpoint = ClassifierCheckpoint {
            state_dict:      model.clone().into_record(),
            epoch,
            global_step,
            parameter_count: model.num_params(),
        };

        CompactRecorder::new()
            .record(checkpoint, path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

        tracing::debug!("Saved checkpoint: epoch {epoch}, step {global_step} → '{}'", path.display());
        Ok(path)
    }
}

// ─── Loading ──────────────────────────────────────────────────────────────────
/// Load the checkpoint at `path` into `model`.
///
/// `path` may be given with or without the `.mpk` extension.
pub fn load_checkpoint<B: Backend>(
    model:  ImageClassifier<B>,
    path:   &Path,
    device: &B::Device,
) -> Result<(ImageClassifier<B>, CheckpointMeta)> {
    let path = resolve_path(path)?;
    let expected = model.num_params();
    let expected_shapes = parameter_shapes(&model);

    let checkpoint: ClassifierCheckpoint<B> = CompactRecorder::new()
        .load(path.clone(), device)
        .with_context(|| format!("Cannot load checkpoint '{}'", path.display()))?;

    if checkpoint.parameter_count != expected {
        bail!(
            "Checkpoint '{}' holds {} parameters but the model has {}; \
             does the model config match the one used for training?",
            path.display(),
            checkpoint.parameter_count,
            expected,
        );
    }

    // load_record takes tensors as stored, whatever their shape.
    let model = model.load_record(checkpoint.state_dict);
    let loaded_shapes = parameter_shapes(&model);
    if loaded_shapes.len() != expected_shapes.len() {
        bail!(
            "Checkpoint '{}' holds {} parameter tensors but the model has {}",
            path.display(),
            loaded_shapes.len(),
            expected_shapes.len(),
        );
    }
    for (index, (loaded, wanted)) in loaded_shapes.iter().zip(&expected_shapes).enumerate() {
        if loaded != wanted {
            bail!(
                "Checkpoint '{}' does not match the model: parameter #{index} has shape {loaded:?}, expected {wanted:?}",
                path.display(),
            );
        }
    }

    let meta = CheckpointMeta { epoch: checkpoint.epoch, global_step: checkpoint.global_step };
    Ok((model, meta))
}

fn resolve_path(path: &Path) -> Result<PathBuf> {
    let suffix = format!(".{EXTENSION}");
    let given = path.to_string_lossy();
    let full = if given.ends_with(&suffix) {
        path.to_path_buf()
    } else {
        PathBuf::from(format!("{given}{suffix}"))
    };
    if !full.is_file() {
        bail!("Checkpoint file '{}' not found", full.display());
    }
    Ok(full)
}

/// Shapes of every float parameter, in module visiting order.
#[derive(Default)]
struct ShapeCollector {
    shapes: Vec<Vec<usize>>,
}

impl<B: Backend> ModuleVisitor<B> for ShapeCollector {
    fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
        self.shapes.push(tensor.dims().to_vec());
    }
}

fn parameter_shapes<B: Backend>(model: &ImageClassifier<B>) -> Vec<Vec<usize>> {
    let mut collector = ShapeCollector::default();
    model.visit(&mut collector);
    collector.shapes
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::ImageClassifierConfig;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn tiny(channels: Vec<usize>) -> ImageClassifier<TestBackend> {
        ImageClassifierConfig::new(3, 3, channels, 8, 0.0).init(&Default::default())
    }

    fn writer_in(dir: &Path, name: &str) -> CheckpointWriter {
        CheckpointWriter::new(CheckpointPolicy {
            directory: dir.to_path_buf(),
            filename:  FilenameStrategy::Fixed(name.into()),
        })
        .unwrap()
    }

    fn files_in(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir).unwrap().map(|e| e.unwrap().path()).collect();
        files.sort();
        files
    }

    #[test]
    fn fixed_filename_keeps_exactly_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = CheckpointWriter::new(CheckpointPolicy {
            directory: dir.path().join("ckpt"),
            filename:  FilenameStrategy::Fixed("epoch_best".into()),
        })
        .unwrap();

        let model = tiny(vec![4]);
        for epoch in 1..=3 {
            writer.save(&model, epoch, epoch * 10).unwrap();
        }

        let files = files_in(&dir.path().join("ckpt"));
        assert_eq!(files, vec![dir.path().join("ckpt").join("epoch_best.mpk")]);

        let (_, meta) = load_checkpoint(tiny(vec![4]), &files[0], &Default::default()).unwrap();
        assert_eq!(meta, CheckpointMeta { epoch: 3, global_step: 30 });
    }

    #[test]
    fn template_filename_keeps_one_file_per_save() {
        let dir = tempfile::tempdir().unwrap();
        let writer = CheckpointWriter::new(CheckpointPolicy {
            directory: dir.path().to_path_buf(),
            filename:  FilenameStrategy::parse("e{epoch}-s{step}"),
        })
        .unwrap();

        let model = tiny(vec![4]);
        writer.save(&model, 1, 5).unwrap();
        writer.save(&model, 2, 10).unwrap();
        assert_eq!(
            files_in(dir.path()),
            vec![dir.path().join("e1-s5.mpk"), dir.path().join("e2-s10.mpk")]
        );
    }

    #[test]
    fn loaded_weights_reproduce_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let writer = CheckpointWriter::new(CheckpointPolicy {
            directory: dir.path().to_path_buf(),
            filename:  FilenameStrategy::Fixed("m".into()),
        })
        .unwrap();
        let device = Default::default();
        let original = tiny(vec![4]);
        writer.save(&original, 1, 1).unwrap();

        // Extension is optional when loading.
        let (restored, _) = load_checkpoint(tiny(vec![4]), &dir.path().join("m"), &device).unwrap();

        let input = Tensor::<TestBackend, 4>::ones([1, 3, 8, 8], &device);
        let diff: f32 = (original.forward(input.clone()) - restored.forward(input))
            .abs()
            .max()
            .into_scalar()
            .elem();
        // CompactRecorder stores half precision.
        assert!(diff < 0.05, "max diff {diff}");
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_checkpoint(tiny(vec![4]), &dir.path().join("absent.mpk"), &Default::default())
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn mismatched_architecture_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let writer = CheckpointWriter::new(CheckpointPolicy {
            directory: dir.path().to_path_buf(),
            filename:  FilenameStrategy::Fixed("m".into()),
        })
        .unwrap();
        let path = writer.save(&tiny(vec![4]), 1, 1).unwrap();
        assert!(load_checkpoint(tiny(vec![4, 8]), &path, &Default::default()).is_err());
    }

    #[test]
    fn save_returns_the_path_it_wrote() {
        let dir = tempfile::tempdir().unwrap();
        let writer = writer_in(dir.path(), "epoch_best");
        let path = writer.save(&tiny(vec![4]), 1, 1).unwrap();
        assert!(path.is_file(), "{} was not written", path.display());
        assert_eq!(path, writer.policy().path_for(1, 1));

        // A dot in the configured name is kept, not treated as an extension.
        let dotted = writer_in(dir.path(), "run.v2").save(&tiny(vec![4]), 1, 1).unwrap();
        assert_eq!(dotted, dir.path().join("run.v2.mpk"));
        assert!(dotted.is_file());
    }

    #[test]
    fn same_parameter_count_with_different_shapes_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let saved: ImageClassifier<TestBackend> = ImageClassifierConfig::new(3, 3, vec![4], 8, 0.0).init(&device);
        let other: ImageClassifier<TestBackend> = ImageClassifierConfig::new(7, 3, vec![4], 5, 0.0).init(&device);
        assert_eq!(saved.num_params(), other.num_params());

        let path = writer_in(dir.path(), "m").save(&saved, 1, 1).unwrap();
        let err = load_checkpoint(other, &path, &device).unwrap_err();
        assert!(err.to_string().contains("has shape"), "{err}");
    }

    #[test]
    fn filename_strategy_parsing() {
        assert_eq!(FilenameStrategy::parse("epoch_best"), FilenameStrategy::Fixed("epoch_best".into()));
        assert_eq!(FilenameStrategy::parse("{epoch}").render(7, 1), "7");
    }
}
