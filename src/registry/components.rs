// ============================================================
// Layer 2 — Built-in Components
// ============================================================
// Every `_target_` a configuration may name, grouped by the
// config section it can appear in:
//
//   model       ImageClassifier
//   data        ImageFolderDataModule
//   callbacks.* ModelCheckpoint, EarlyStopping
//   logger.*    CsvLogger, TracingLogger
//   trainer     Trainer
//
// `Components::validate` walks the sections a command uses and
// checks every target before anything is built.

use anyhow::Result;
use burn::tensor::backend::AutodiffBackend;
use serde::Deserialize;

use crate::callbacks::{
    early_stopping::{EarlyStopping, EarlyStoppingArgs},
    model_checkpoint::{ModelCheckpoint, ModelCheckpointArgs},
    Callback,
};
use crate::config::{ConfigError, ConfigNode, ConfigTree};
use crate::data::{
    datamodule::DataModule,
    image_folder::{ImageFolderArgs, ImageFolderDataModule},
};
use crate::domain::traits::MetricsLogger;
use crate::infra::metrics::{CsvLogger, CsvLoggerArgs, TracingLogger, TracingLoggerArgs};
use crate::ml::{
    model::{Classifier, ImageClassifierConfig, OptimizerSettings},
    trainer::TrainerSettings,
};
use crate::registry::Registry;

/// Top-level config sections that hold components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Model,
    Data,
    Trainer,
    Callbacks,
    Loggers,
}

impl Section {
    pub fn key(&self) -> &'static str {
        match self {
            Section::Model => "model",
            Section::Data => "data",
            Section::Trainer => "trainer",
            Section::Callbacks => "callbacks",
            Section::Loggers => "logger",
        }
    }

    /// Whether the section is a mapping of named entries
    /// rather than one component.
    fn is_collection(&self) -> bool {
        matches!(self, Section::Callbacks | Section::Loggers)
    }
}

pub struct Components<B: AutodiffBackend> {
    pub models:      Registry<Classifier<B>, B::Device>,
    pub datamodules: Registry<Box<dyn DataModule>>,
    pub callbacks:   Registry<Box<dyn Callback<B>>>,
    pub loggers:     Registry<Box<dyn MetricsLogger>>,
    pub trainers:    Registry<TrainerSettings>,
}

impl<B: AutodiffBackend> Components<B> {
    pub fn builtin() -> Self {
        let mut models: Registry<Classifier<B>, B::Device> = Registry::new("model");
        models.register("ImageClassifier", build_image_classifier::<B>);

        let mut datamodules: Registry<Box<dyn DataModule>> = Registry::new("datamodule");
        datamodules.register("ImageFolderDataModule", build_image_folder);

        let mut callbacks: Registry<Box<dyn Callback<B>>> = Registry::new("callback");
        callbacks
            .register("ModelCheckpoint", build_model_checkpoint::<B>)
            .register("EarlyStopping", build_early_stopping::<B>);

        let mut loggers: Registry<Box<dyn MetricsLogger>> = Registry::new("logger");
        loggers
            .register("CsvLogger", build_csv_logger)
            .register("TracingLogger", build_tracing_logger);

        let mut trainers: Registry<TrainerSettings> = Registry::new("trainer");
        trainers.register("Trainer", build_trainer_settings);

        Self { models, datamodules, callbacks, loggers, trainers }
    }

    /// Check every `_target_` in `sections` against the registries.
    ///
    /// Single-component sections must be present and carry a target.
    /// Entries of `callbacks` / `logger` without a `_target_` key are
    /// skipped, the same way instantiation skips them; a key that is
    /// there but not a name is an error.
    pub fn validate(&self, cfg: &ConfigTree, sections: &[Section]) -> Result<()> {
        for section in sections {
            if section.is_collection() {
                let Some(node) = cfg.node(section.key()) else {
                    continue;
                };
                for (_, entry) in node.entries() {
                    if !entry.has_target_key() {
                        continue;
                    }
                    match section {
                        Section::Callbacks => self.callbacks.check(&entry)?,
                        _ => self.loggers.check(&entry)?,
                    };
                }
                continue;
            }

            let node = cfg.require(section.key())?;
            match section {
                Section::Model => self.models.check(&node)?,
                Section::Data => self.datamodules.check(&node)?,
                _ => self.trainers.check(&node)?,
            };
        }
        Ok(())
    }
}

// ─── Factories ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ImageClassifierArgs {
    num_classes: usize,
    #[serde(default = "default_in_channels")]
    in_channels: usize,
    #[serde(default = "default_conv_channels")]
    conv_channels: Vec<usize>,
    #[serde(default = "default_hidden_size")]
    hidden_size: usize,
    #[serde(default = "default_dropout")]
    dropout: f64,
    #[serde(default)]
    optimizer: OptimizerSettings,
}

fn default_in_channels() -> usize { 3 }
fn default_conv_channels() -> Vec<usize> { vec![32, 64, 128] }
fn default_hidden_size() -> usize { 256 }
fn default_dropout() -> f64 { 0.2 }

fn build_image_classifier<B: AutodiffBackend>(node: &ConfigNode<'_>, device: &B::Device) -> Result<Classifier<B>> {
    let args: ImageClassifierArgs = node.args()?;
    if args.num_classes == 0 {
        anyhow::bail!("num_classes must be positive");
    }
    if !(0.0..1.0).contains(&args.dropout) {
        anyhow::bail!("dropout must lie in [0, 1), got {}", args.dropout);
    }
    let config = ImageClassifierConfig::new(
        args.num_classes,
        args.in_channels,
        args.conv_channels,
        args.hidden_size,
        args.dropout,
    );
    Ok(Classifier { network: config.init(device), optimizer: args.optimizer })
}

fn build_image_folder(node: &ConfigNode<'_>, _: &()) -> Result<Box<dyn DataModule>> {
    let args: ImageFolderArgs = node.args()?;
    Ok(Box::new(ImageFolderDataModule::new(args)?))
}

fn build_model_checkpoint<B: AutodiffBackend>(node: &ConfigNode<'_>, _: &()) -> Result<Box<dyn Callback<B>>> {
    let args: ModelCheckpointArgs = node.args()?;
    Ok(Box::new(ModelCheckpoint::new(args)?))
}

fn build_early_stopping<B: AutodiffBackend>(node: &ConfigNode<'_>, _: &()) -> Result<Box<dyn Callback<B>>> {
    let args: EarlyStoppingArgs = node.args()?;
    Ok(Box::new(EarlyStopping::new(args)))
}

fn build_csv_logger(node: &ConfigNode<'_>, _: &()) -> Result<Box<dyn MetricsLogger>> {
    let args: CsvLoggerArgs = node.args()?;
    Ok(Box::new(CsvLogger::new(args)?))
}

fn build_tracing_logger(node: &ConfigNode<'_>, _: &()) -> Result<Box<dyn MetricsLogger>> {
    let args: TracingLoggerArgs = node.args()?;
    Ok(Box::new(TracingLogger::new(args)))
}

fn build_trainer_settings(node: &ConfigNode<'_>, _: &()) -> Result<TrainerSettings> {
    let settings: TrainerSettings = node.args()?;
    if settings.check_val_every_n_epoch == 0 {
        return Err(ConfigError::WrongType {
            key:      format!("{}.check_val_every_n_epoch", node.path()),
            expected: "a positive integer",
        }
        .into());
    }
    Ok(settings)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray>;

    const ALL: [Section; 5] = [Section::Model, Section::Data, Section::Trainer, Section::Callbacks, Section::Loggers];

    fn tree(yaml: &str) -> ConfigTree {
        ConfigTree::from_yaml_str(yaml).unwrap()
    }

    const VALID: &str = r#"
model:
  _target_: ImageClassifier
  num_classes: 3
data:
  _target_: ImageFolderDataModule
trainer:
  _target_: Trainer
callbacks:
  early_stopping:
    _target_: EarlyStopping
  note: just a string
logger: null
"#;

    #[test]
    fn valid_config_passes() {
        let components = Components::<TestBackend>::builtin();
        components.validate(&tree(VALID), &ALL).unwrap();
    }

    #[test]
    fn unknown_callback_target_is_caught_before_instantiation() {
        let components = Components::<TestBackend>::builtin();
        let cfg = tree(&VALID.replace("_target_: EarlyStopping", "_target_: RichProgressBar"));
        let err = components.validate(&cfg, &ALL).unwrap_err();
        assert!(err.to_string().contains("RichProgressBar"), "{err}");
    }

    #[test]
    fn null_callback_target_is_caught_at_validation() {
        let components = Components::<TestBackend>::builtin();
        let cfg = tree(&VALID.replace("_target_: EarlyStopping", "_target_: null"));
        let err = components.validate(&cfg, &ALL).unwrap_err();
        assert!(err.to_string().contains("callbacks.early_stopping"), "{err}");
    }

    #[test]
    fn missing_model_section_is_an_error() {
        let components = Components::<TestBackend>::builtin();
        let cfg = tree("data:\n  _target_: ImageFolderDataModule\n");
        assert!(components.validate(&cfg, &[Section::Model]).is_err());
        components.validate(&cfg, &[Section::Data]).unwrap();
    }

    #[test]
    fn model_factory_applies_defaults() {
        let components = Components::<TestBackend>::builtin();
        let cfg = tree("model:\n  _target_: ImageClassifier\n  num_classes: 4\n  conv_channels: [4]\n  optimizer:\n    lr: 0.01\n");
        let model = components.models.instantiate(&cfg.node("model").unwrap(), &Default::default()).unwrap();
        assert_eq!(model.optimizer.lr, 0.01);
        assert_eq!(model.network.blocks.len(), 1);
    }

    #[test]
    fn trainer_factory_rejects_unknown_keys() {
        let components = Components::<TestBackend>::builtin();
        let cfg = tree("trainer:\n  _target_: Trainer\n  max_epochs: 2\n  gpus: 4\n");
        assert!(components.trainers.instantiate(&cfg.node("trainer").unwrap(), &()).is_err());
    }
}
