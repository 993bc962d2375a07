// ============================================================
// Layer 2 — Train / Test Lifecycle
// ============================================================
// The order a training run goes through, as a state machine:
//
//   Configured → DataReady → ModelReady → TrainerReady
//              → [Trained] → [Tested] → Done
//
// Trained and Tested are optional (the `train` / `test` flags);
// every other step is mandatory and nothing goes backwards.
//
// `run_stages` is written against the Lifecycle trait rather
// than the concrete Trainer, so the stage logic can be checked
// without a backend.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use burn::tensor::backend::AutodiffBackend;

use crate::data::datamodule::DataModule;
use crate::domain::metrics::{format_metrics, MetricMap};
use crate::infra::logging::task_wrapper;
use crate::ml::{model::Classifier, trainer::Trainer};

// ─── States ───────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TrainState {
    Configured,
    DataReady,
    ModelReady,
    TrainerReady,
    Trained,
    Tested,
    Done,
}

impl TrainState {
    fn is_optional(&self) -> bool {
        matches!(self, TrainState::Trained | TrainState::Tested)
    }

    /// Move forward to `next`. Only optional states may be skipped.
    pub fn advance(&mut self, next: TrainState) -> Result<()> {
        if next <= *self {
            bail!("cannot go from {self:?} back to {next:?}");
        }
        let skipped = ALL_STATES
            .iter()
            .filter(|s| **s > *self && **s < next)
            .find(|s| !s.is_optional());
        if let Some(skipped) = skipped {
            bail!("cannot go from {self:?} to {next:?} without passing {skipped:?}");
        }
        tracing::debug!("Run state: {self:?} → {next:?}");
        *self = next;
        Ok(())
    }
}

const ALL_STATES: [TrainState; 7] = [
    TrainState::Configured,
    TrainState::DataReady,
    TrainState::ModelReady,
    TrainState::TrainerReady,
    TrainState::Trained,
    TrainState::Tested,
    TrainState::Done,
];

// ─── Lifecycle ────────────────────────────────────────────────────────────────
/// What the train/test stages need from a trainer.
pub trait Lifecycle {
    type Model;

    fn fit(&mut self, model: Self::Model, datamodule: &mut dyn DataModule) -> Result<Self::Model>;

    fn test(
        &mut self,
        model:      &Self::Model,
        datamodule: &mut dyn DataModule,
        ckpt_path:  Option<&Path>,
    ) -> Result<MetricMap>;

    fn callback_metrics(&self) -> MetricMap;

    fn best_model_path(&self) -> Option<PathBuf>;
}

impl<B: AutodiffBackend> Lifecycle for Trainer<B> {
    type Model = Classifier<B>;

    fn fit(&mut self, model: Classifier<B>, datamodule: &mut dyn DataModule) -> Result<Classifier<B>> {
        Trainer::fit(self, model, datamodule)
    }

    fn test(
        &mut self,
        model:      &Classifier<B>,
        datamodule: &mut dyn DataModule,
        ckpt_path:  Option<&Path>,
    ) -> Result<MetricMap> {
        Trainer::test(self, model, datamodule, ckpt_path)
    }

    fn callback_metrics(&self) -> MetricMap {
        Trainer::callback_metrics(self).clone()
    }

    fn best_model_path(&self) -> Option<PathBuf> {
        Trainer::best_model_path(self)
    }
}

// ─── Stages ───────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunFlags {
    pub train: bool,
    pub test:  bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOutcome {
    pub train_metrics: Option<MetricMap>,
    pub test_metrics:  Option<MetricMap>,
}

/// Fit once if `flags.train`, then test once if `flags.test`.
/// `state` must be TrainerReady on entry and is Done on success.
pub fn run_stages<L: Lifecycle>(
    trainer:    &mut L,
    model:      L::Model,
    datamodule: &mut dyn DataModule,
    flags:      RunFlags,
    state:      &mut TrainState,
) -> Result<RunOutcome> {
    if *state != TrainState::TrainerReady {
        bail!("train/test stages need a ready trainer, run is at {state:?}");
    }
    let mut outcome = RunOutcome::default();
    let mut model = model;

    if flags.train {
        model = task_wrapper("train", || train_stage(trainer, model, datamodule))?;
        state.advance(TrainState::Trained)?;
        outcome.train_metrics = Some(trainer.callback_metrics());
    }

    if flags.test {
        let metrics = task_wrapper("test", || test_stage(trainer, &model, datamodule))?;
        state.advance(TrainState::Tested)?;
        outcome.test_metrics = Some(metrics);
    }

    state.advance(TrainState::Done)?;
    Ok(outcome)
}

fn train_stage<L: Lifecycle>(trainer: &mut L, model: L::Model, datamodule: &mut dyn DataModule) -> Result<L::Model> {
    tracing::info!("Starting training!");
    let model = trainer.fit(model, datamodule)?;
    tracing::info!("Training metrics:\n{}", format_metrics(&trainer.callback_metrics()));
    Ok(model)
}

fn test_stage<L: Lifecycle>(trainer: &mut L, model: &L::Model, datamodule: &mut dyn DataModule) -> Result<MetricMap> {
    tracing::info!("Starting testing!");
    let metrics = match trainer.best_model_path() {
        Some(best) => {
            tracing::info!("Loading best checkpoint: {}", best.display());
            trainer.test(model, datamodule, Some(&best))?
        }
        None => {
            tracing::warn!("No checkpoint found! Using current model weights.");
            trainer.test(model, datamodule, None)?
        }
    };
    tracing::info!("Test metrics:\n{}", format_metrics(&metrics));
    Ok(metrics)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{datamodule::LoaderSettings, dataset::ImageDataset};
    use crate::domain::metrics::Stage;
    use crate::infra::logging::capture::capture_logs;

    /// Counts calls and remembers which checkpoint test() was given.
    #[derive(Default)]
    struct MockTrainer {
        fits:        usize,
        tests:       usize,
        tested_with: Vec<Option<PathBuf>>,
        best:        Option<PathBuf>,
        fail_fit:    bool,
    }

    impl Lifecycle for MockTrainer {
        type Model = u32;

        fn fit(&mut self, model: u32, _dm: &mut dyn DataModule) -> Result<u32> {
            self.fits += 1;
            if self.fail_fit {
                bail!("diverged");
            }
            Ok(model + 1)
        }

        fn test(&mut self, _model: &u32, _dm: &mut dyn DataModule, ckpt_path: Option<&Path>) -> Result<MetricMap> {
            self.tests += 1;
            self.tested_with.push(ckpt_path.map(Path::to_path_buf));
            Ok(MetricMap::from([("test_acc".to_string(), 0.5)]))
        }

        fn callback_metrics(&self) -> MetricMap {
            MetricMap::from([("val_loss".to_string(), 0.25)])
        }

        fn best_model_path(&self) -> Option<PathBuf> {
            self.best.clone()
        }
    }

    /// A datamodule the mock trainer never looks at.
    struct NoData;

    impl DataModule for NoData {
        fn setup(&mut self, _stage: Stage) -> Result<()> {
            Ok(())
        }
        fn class_names(&self) -> &[String] {
            &[]
        }
        fn loader_settings(&self) -> LoaderSettings {
            LoaderSettings { batch_size: 1, num_workers: 0, seed: 0, image_size: 1 }
        }
        fn train_dataset(&self) -> Result<ImageDataset> {
            bail!("unused")
        }
        fn val_dataset(&self) -> Result<ImageDataset> {
            bail!("unused")
        }
        fn test_dataset(&self) -> Result<ImageDataset> {
            bail!("unused")
        }
        fn predict_dataset(&self) -> Result<ImageDataset> {
            bail!("unused")
        }
    }

    fn run(trainer: &mut MockTrainer, flags: RunFlags) -> (Result<RunOutcome>, TrainState) {
        let mut state = TrainState::TrainerReady;
        let outcome = run_stages(trainer, 0, &mut NoData, flags, &mut state);
        (outcome, state)
    }

    #[test]
    fn train_without_test_fits_once_and_never_tests() {
        let mut trainer = MockTrainer::default();
        let (outcome, state) = run(&mut trainer, RunFlags { train: true, test: false });
        let outcome = outcome.unwrap();
        assert_eq!(trainer.fits, 1);
        assert_eq!(trainer.tests, 0);
        assert_eq!(state, TrainState::Done);
        assert_eq!(outcome.train_metrics.unwrap()["val_loss"], 0.25);
        assert!(outcome.test_metrics.is_none());
    }

    #[test]
    fn test_uses_recorded_best_checkpoint() {
        let best = PathBuf::from("checkpoints/epoch_best.mpk");
        let mut trainer = MockTrainer { best: Some(best.clone()), ..Default::default() };
        let (_guard, logs) = capture_logs();
        let (outcome, _) = run(&mut trainer, RunFlags { train: true, test: true });
        outcome.unwrap();
        assert_eq!(trainer.tested_with, vec![Some(best)]);
        assert!(logs.text().contains("Loading best checkpoint: checkpoints/epoch_best.mpk"));
    }

    #[test]
    fn test_without_checkpoint_warns_and_uses_current_weights() {
        let mut trainer = MockTrainer::default();
        let (_guard, logs) = capture_logs();
        let (outcome, _) = run(&mut trainer, RunFlags { train: false, test: true });
        assert_eq!(outcome.unwrap().test_metrics.unwrap()["test_acc"], 0.5);
        assert_eq!(trainer.fits, 0);
        assert_eq!(trainer.tested_with, vec![None]);
        assert!(logs.text().contains("[WARN] - No checkpoint found! Using current model weights."));
    }

    #[test]
    fn failed_fit_is_logged_and_stops_the_run() {
        let mut trainer = MockTrainer { fail_fit: true, ..Default::default() };
        let (_guard, logs) = capture_logs();
        let (outcome, state) = run(&mut trainer, RunFlags { train: true, test: true });
        assert_eq!(outcome.unwrap_err().to_string(), "diverged");
        assert_eq!(trainer.tests, 0);
        assert_eq!(state, TrainState::TrainerReady);
        assert!(logs.text().contains("Task 'train' failed after"));
    }

    #[test]
    fn states_only_move_forward() {
        let mut state = TrainState::Configured;
        assert!(state.advance(TrainState::ModelReady).is_err());
        state.advance(TrainState::DataReady).unwrap();
        state.advance(TrainState::ModelReady).unwrap();
        state.advance(TrainState::TrainerReady).unwrap();
        state.advance(TrainState::Tested).unwrap();
        assert!(state.advance(TrainState::Trained).is_err());
        state.advance(TrainState::Done).unwrap();
    }
}
