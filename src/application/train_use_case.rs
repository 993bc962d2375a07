// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates a training run from a composed config:
//
//   Step 1: Create paths.log_dir, open train_log.log   (Layer 6 - infra)
//   Step 2: Print the resolved config
//   Step 3: Pick the backend from trainer.accelerator  (Layer 5 - ml)
//   Step 4: Validate every _target_                    (Layer 2 - registry)
//   Step 5: Build the datamodule                       (Layer 4 - data)
//   Step 6: Build the model                            (Layer 5 - ml)
//   Step 7: Build callbacks and loggers
//   Step 8: Build the trainer, log hyper-parameters
//   Step 9: train? → fit, test? → test                 (lifecycle)
//
// Reference: Burn Book §5 (Training)

use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use burn::tensor::backend::AutodiffBackend;

use crate::application::{
    accelerator_at,
    instantiate::{instantiate_callbacks, instantiate_loggers},
    lifecycle::{run_stages, RunFlags, RunOutcome, TrainState},
};
use crate::config::ConfigTree;
use crate::infra::logging::LoggingContext;
use crate::ml::{
    backend::{dispatch, Accelerator, BackendTask},
    trainer::Trainer,
};
use crate::registry::{Components, Section};

pub struct TrainUseCase {
    cfg: ConfigTree,
}

impl TrainUseCase {
    pub fn new(cfg: ConfigTree) -> Self {
        Self { cfg }
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<RunOutcome> {
        let cfg = &self.cfg;

        // ── Step 1: Log directory and log file ───────────────────────────────
        let log_dir = PathBuf::from(cfg.require_str("paths.log_dir")?);
        fs::create_dir_all(&log_dir)
            .with_context(|| format!("Cannot create log_dir '{}'", log_dir.display()))?;
        let _logging = LoggingContext::open(&log_dir.join("train_log.log"))?;

        // ── Step 2: Show what is about to run ────────────────────────────────
        println!("{}", cfg.to_yaml()?);

        // ── Step 3: Backend ──────────────────────────────────────────────────
        let accelerator = accelerator_at(cfg, "trainer.accelerator", Accelerator::Auto)?;
        dispatch(accelerator, TrainTask { cfg })
    }
}

struct TrainTask<'a> {
    cfg: &'a ConfigTree,
}

impl BackendTask for TrainTask<'_> {
    type Output = RunOutcome;

    fn run<B: AutodiffBackend>(self, device: B::Device) -> Result<RunOutcome> {
        let cfg = self.cfg;
        let mut state = TrainState::Configured;

        // ── Step 4: Validate every target before building anything ───────────
        let components = Components::<B>::builtin();
        components.validate(
            cfg,
            &[Section::Data, Section::Model, Section::Callbacks, Section::Loggers, Section::Trainer],
        )?;

        // ── Step 5: Datamodule ───────────────────────────────────────────────
        let data_node = cfg.require("data")?;
        tracing::info!("Instantiating datamodule <{}>", data_node.target().unwrap_or_default());
        let mut datamodule = components.datamodules.instantiate(&data_node, &())?;
        tracing::debug!("Datamodule config:\n{}", data_node.to_yaml()?);
        state.advance(TrainState::DataReady)?;

        // ── Step 6: Model ────────────────────────────────────────────────────
        let model_node = cfg.require("model")?;
        tracing::info!("Instantiating model <{}>", model_node.target().unwrap_or_default());
        let model = components.models.instantiate(&model_node, &device)?;
        tracing::debug!("Model config:\n{}", model_node.to_yaml()?);
        state.advance(TrainState::ModelReady)?;

        // ── Step 7: Callbacks and loggers ────────────────────────────────────
        let callbacks = instantiate_callbacks(&components.callbacks, cfg.node("callbacks"))?;
        let loggers = instantiate_loggers(&components.loggers, cfg.node("logger"))?;

        // ── Step 8: Trainer ──────────────────────────────────────────────────
        let trainer_node = cfg.require("trainer")?;
        tracing::info!("Instantiating trainer <{}>", trainer_node.target().unwrap_or_default());
        let settings = components.trainers.instantiate(&trainer_node, &())?;
        let mut trainer = Trainer::<B>::new(settings, device, callbacks, loggers);
        trainer.log_hyperparams(cfg.as_value())?;
        state.advance(TrainState::TrainerReady)?;

        // ── Step 9: Train and/or test ────────────────────────────────────────
        let flags = RunFlags { train: cfg.flag("train")?, test: cfg.flag("test")? };
        let outcome = run_stages(&mut trainer, model, datamodule.as_mut(), flags, &mut state);
        finish_run(outcome, |status| trainer.finalize(status))
    }
}

/// Finalize loggers with the run's status. A failed run keeps its own
/// error; a finalize failure on top of it is only logged.
fn finish_run<T>(outcome: Result<T>, finalize: impl FnOnce(&str) -> Result<()>) -> Result<T> {
    match outcome {
        Ok(value) => {
            finalize("success")?;
            Ok(value)
        }
        Err(err) => {
            if let Err(finalize_err) = finalize("failed") {
                tracing::error!("Finalizing loggers failed: {finalize_err:#}");
            }
            Err(err)
        }
    }
}
