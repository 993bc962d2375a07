// ============================================================
// Layer 5 — Trainer
// ============================================================
// Lightning-style fit / test / predict over a DataModule using
// Burn's DataLoader and Adam.
//
// Backends:
//   - Training runs on B (an AutodiffBackend) so loss.backward()
//     has a graph to walk
//   - Validation, test and predict run on network.valid(), the
//     same weights on B::InnerBackend with autodiff stripped;
//     dropout and batch-norm statistics updates are inactive there
//
// Metrics:
//   train_loss_step          every log_every_n_steps optimiser steps
//   train_loss, train_acc    after every training epoch
//   val_loss, val_acc        after every check_val_every_n_epoch epochs
//   test_loss, test_acc      from test()
//
// Every metric is written to all loggers and kept in
// callback_metrics, which holds the latest value of each name.
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Result;
use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder},
    module::AutodiffModule,
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use serde::Deserialize;
use serde_yaml::Value;

use crate::callbacks::{Callback, Control, FitContext};
use crate::data::{
    batcher::{ImageBatch, ImageBatcher},
    datamodule::{DataModule, LoaderSettings},
    dataset::ImageDataset,
};
use crate::domain::{
    metrics::{format_metrics, MetricMap, Prediction, Stage},
    traits::MetricsLogger,
};
use crate::infra::checkpoint::load_checkpoint;
use crate::ml::{
    backend::Accelerator,
    inferencer::{best_label, tensor_to_vec},
    model::{Classifier, ImageClassifier},
};

// ─── Settings ─────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainerSettings {
    pub max_epochs:              usize,
    pub min_epochs:              usize,
    pub limit_train_batches:     Option<usize>,
    pub limit_val_batches:       Option<usize>,
    pub limit_test_batches:      Option<usize>,
    pub check_val_every_n_epoch: usize,
    pub log_every_n_steps:       usize,
    pub seed:                    u64,
    pub accelerator:             Accelerator,
}

impl Default for TrainerSettings {
    fn default() -> Self {
        Self {
            max_epochs:              10,
            min_epochs:              0,
            limit_train_batches:     None,
            limit_val_batches:       None,
            limit_test_batches:      None,
            check_val_every_n_epoch: 1,
            log_every_n_steps:       50,
            seed:                    42,
            accelerator:             Accelerator::Auto,
        }
    }
}

/// Mean loss and accuracy over one pass of a loader.
#[derive(Debug, Clone, Copy)]
struct EpochStats {
    loss:     f64,
    accuracy: f64,
}

#[derive(Default)]
struct Accumulator {
    loss_sum: f64,
    batches:  usize,
    correct:  usize,
    samples:  usize,
}

impl Accumulator {
    fn add<BB: Backend>(&mut self, loss: f64, logits: Tensor<BB, 2>, targets: Tensor<BB, 1, Int>) {
        let [batch_size, _] = logits.dims();
        let predicted = logits.argmax(1).reshape([batch_size]);
        let correct: i64 = predicted.equal(targets).int().sum().into_scalar().elem::<i64>();

        self.loss_sum += loss;
        self.batches  += 1;
        self.correct  += correct as usize;
        self.samples  += batch_size;
    }

    fn stats(&self) -> EpochStats {
        EpochStats {
            loss:     if self.batches > 0 { self.loss_sum / self.batches as f64 } else { f64::NAN },
            accuracy: if self.samples > 0 { self.correct as f64 / self.samples as f64 } else { 0.0 },
        }
    }
}

// ─── Trainer ──────────────────────────────────────────────────────────────────
pub struct Trainer<B: AutodiffBackend> {
    settings:         TrainerSettings,
    device:           B::Device,
    callbacks:        Vec<Box<dyn Callback<B>>>,
    loggers:          Vec<Box<dyn MetricsLogger>>,
    callback_metrics: MetricMap,
    global_step:      usize,
    current_epoch:    usize,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(
        settings:  TrainerSettings,
        device:    B::Device,
        callbacks: Vec<Box<dyn Callback<B>>>,
        loggers:   Vec<Box<dyn MetricsLogger>>,
    ) -> Self {
        Self {
            settings,
            device,
            callbacks,
            loggers,
            callback_metrics: MetricMap::new(),
            global_step:      0,
            current_epoch:    0,
        }
    }

    pub fn settings(&self) -> &TrainerSettings {
        &self.settings
    }

    /// Latest value of every metric logged so far.
    pub fn callback_metrics(&self) -> &MetricMap {
        &self.callback_metrics
    }

    pub fn global_step(&self) -> usize {
        self.global_step
    }

    /// Best checkpoint recorded by the first callback that has one.
    pub fn best_model_path(&self) -> Option<PathBuf> {
        self.callbacks
            .iter()
            .find_map(|cb| cb.best_model_path())
            .map(Path::to_path_buf)
    }

    pub fn log_hyperparams(&mut self, params: &Value) -> Result<()> {
        for logger in &mut self.loggers {
            logger.log_hyperparams(params)?;
        }
        Ok(())
    }

    /// Flush every logger. `status` is "success" or "failed".
    pub fn finalize(&mut self, status: &str) -> Result<()> {
        for logger in &mut self.loggers {
            logger.finalize(status)?;
        }
        Ok(())
    }

    fn log_metrics(&mut self, metrics: &MetricMap, step: usize) -> Result<()> {
        self.callback_metrics.extend(metrics.iter().map(|(k, v)| (k.clone(), *v)));
        for logger in &mut self.loggers {
            logger.log_metrics(metrics, step)?;
        }
        Ok(())
    }

    fn context(&self) -> FitContext {
        FitContext {
            epoch:       self.current_epoch,
            global_step: self.global_step,
            max_epochs:  self.settings.max_epochs,
        }
    }

    // ── fit ──────────────────────────────────────────────────────────────────
    pub fn fit(&mut self, model: Classifier<B>, datamodule: &mut dyn DataModule) -> Result<Classifier<B>> {
        B::seed(self.settings.seed);
        datamodule.prepare_data()?;
        datamodule.setup(Stage::Fit)?;

        let loader_settings = datamodule.loader_settings();
        let train_loader = build_loader::<B>(&self.device, loader_settings, true, datamodule.train_dataset()?);
        let val_dataset = datamodule.val_dataset()?;
        if val_dataset.sample_count() == 0 {
            tracing::warn!("Validation split is empty; val_loss will be NaN");
        }
        let val_loader =
            build_loader::<B::InnerBackend>(&self.device, loader_settings, false, val_dataset);

        let Classifier { mut network, optimizer } = model;
        let mut optim = optimizer.adam().init();

        tracing::info!(
            "Fitting for up to {} epochs ({} trainable parameters)",
            self.settings.max_epochs,
            network.num_params(),
        );

        let ctx = self.context();
        for cb in &mut self.callbacks {
            cb.on_fit_start(&ctx)?;
        }

        for epoch in 1..=self.settings.max_epochs {
            self.current_epoch = epoch;

            // ── Training phase ────────────────────────────────────────────────
            let mut acc = Accumulator::default();
            let limit = self.settings.limit_train_batches.unwrap_or(usize::MAX);

            for batch in train_loader.iter().take(limit) {
                let (loss, logits) = network.forward_loss(batch.images, batch.targets.clone());
                let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();
                acc.add(loss_val, logits, batch.targets);

                // Backward pass + Adam update
                let grads = loss.backward();
                let grads = GradientsParams::from_grads(grads, &network);
                network = optim.step(optimizer.lr, network, grads);
                self.global_step += 1;

                if self.settings.log_every_n_steps > 0 && self.global_step % self.settings.log_every_n_steps == 0 {
                    let step_metrics = MetricMap::from([("train_loss_step".to_string(), loss_val)]);
                    self.log_metrics(&step_metrics, self.global_step)?;
                }
            }

            let train = acc.stats();
            let train_metrics = MetricMap::from([
                ("train_loss".to_string(), train.loss),
                ("train_acc".to_string(), train.accuracy),
            ]);
            self.log_epoch_metrics(&train_metrics)?;

            let ctx = self.context();
            for cb in &mut self.callbacks {
                cb.on_train_epoch_end(&ctx, &train_metrics)?;
            }

            let every = self.settings.check_val_every_n_epoch.max(1);
            if epoch % every != 0 {
                tracing::info!(
                    "Epoch {:>3}/{} | train_loss={:.4} | train_acc={:.1}%",
                    epoch, self.settings.max_epochs, train.loss, train.accuracy * 100.0,
                );
                continue;
            }

            // ── Validation phase ──────────────────────────────────────────────
            let val = evaluate(&network.valid(), &val_loader, self.settings.limit_val_batches);
            let val_metrics = MetricMap::from([
                ("val_loss".to_string(), val.loss),
                ("val_acc".to_string(), val.accuracy),
            ]);
            self.log_epoch_metrics(&val_metrics)?;

            tracing::info!(
                "Epoch {:>3}/{} | train_loss={:.4} | val_loss={:.4} | val_acc={:.1}%",
                epoch, self.settings.max_epochs, train.loss, val.loss, val.accuracy * 100.0,
            );

            let ctx = self.context();
            let mut stop = false;
            for cb in &mut self.callbacks {
                if cb.on_validation_end(&ctx, &network, &self.callback_metrics)? == Control::Stop {
                    tracing::debug!("{} requested a stop at epoch {epoch}", cb.name());
                    stop = true;
                }
            }
            if stop {
                if epoch >= self.settings.min_epochs {
                    tracing::info!("Stopping early after epoch {epoch}");
                    break;
                }
                tracing::info!("Stop requested before min_epochs={}, continuing", self.settings.min_epochs);
            }
        }

        let ctx = self.context();
        for cb in &mut self.callbacks {
            cb.on_fit_end(&ctx)?;
        }
        datamodule.teardown(Stage::Fit);

        tracing::info!("Fit finished: {}", format_metrics(&self.callback_metrics));
        Ok(Classifier { network, optimizer })
    }

    /// Epoch-level metrics are logged with an `epoch` column.
    fn log_epoch_metrics(&mut self, metrics: &MetricMap) -> Result<()> {
        self.callback_metrics.extend(metrics.iter().map(|(k, v)| (k.clone(), *v)));
        let mut row = metrics.clone();
        row.insert("epoch".to_string(), self.current_epoch as f64);
        for logger in &mut self.loggers {
            logger.log_metrics(&row, self.global_step)?;
        }
        Ok(())
    }

    // ── test ─────────────────────────────────────────────────────────────────
    /// Evaluate on the test split. With `ckpt_path`, the checkpoint's
    /// weights are loaded into a copy of the network first.
    pub fn test(
        &mut self,
        model:      &Classifier<B>,
        datamodule: &mut dyn DataModule,
        ckpt_path:  Option<&Path>,
    ) -> Result<MetricMap> {
        datamodule.prepare_data()?;
        datamodule.setup(Stage::Test)?;

        let network = match ckpt_path {
            Some(path) => {
                let (network, meta) = load_checkpoint(model.network.clone(), path, &self.device)?;
                tracing::info!(
                    "Restored weights from '{}' (epoch {}, step {})",
                    path.display(), meta.epoch, meta.global_step,
                );
                network
            }
            None => model.network.clone(),
        };

        let loader = build_loader::<B::InnerBackend>(
            &self.device,
            datamodule.loader_settings(),
            false,
            datamodule.test_dataset()?,
        );
        let stats = evaluate(&network.valid(), &loader, self.settings.limit_test_batches);
        let metrics = MetricMap::from([
            ("test_loss".to_string(), stats.loss),
            ("test_acc".to_string(), stats.accuracy),
        ]);
        self.log_metrics(&metrics, self.global_step)?;
        datamodule.teardown(Stage::Test);
        Ok(metrics)
    }

    // ── predict ──────────────────────────────────────────────────────────────
    /// One prediction per sample of the predict split, in dataset order.
    pub fn predict(&mut self, model: &Classifier<B>, datamodule: &mut dyn DataModule) -> Result<Vec<Prediction>> {
        datamodule.prepare_data()?;
        datamodule.setup(Stage::Predict)?;
        let class_names = datamodule.class_names().to_vec();

        let loader = build_loader::<B::InnerBackend>(
            &self.device,
            datamodule.loader_settings(),
            false,
            datamodule.predict_dataset()?,
        );
        let network = model.network.valid();

        let mut predictions = Vec::new();
        for batch in loader.iter() {
            let logits = network.forward(batch.images);
            let [_, num_classes] = logits.dims();
            let scores = tensor_to_vec(logits)?;
            for row in scores.chunks(num_classes) {
                let (label, score) = best_label(row, &class_names)?;
                predictions.push(Prediction { label: label.to_string(), score });
            }
        }
        datamodule.teardown(Stage::Predict);
        Ok(predictions)
    }
}

fn build_loader<BB: Backend>(
    device:   &BB::Device,
    settings: LoaderSettings,
    shuffle:  bool,
    dataset:  ImageDataset,
) -> Arc<dyn DataLoader<ImageBatch<BB>>> {
    let batcher = ImageBatcher::<BB>::new(device.clone(), settings.image_size);
    let mut builder = DataLoaderBuilder::new(batcher).batch_size(settings.batch_size);
    if shuffle {
        builder = builder.shuffle(settings.seed);
    }
    if settings.num_workers > 0 {
        builder = builder.num_workers(settings.num_workers);
    }
    builder.build(dataset)
}

fn evaluate<BB: Backend>(
    network: &ImageClassifier<BB>,
    loader:  &Arc<dyn DataLoader<ImageBatch<BB>>>,
    limit:   Option<usize>,
) -> EpochStats {
    let mut acc = Accumulator::default();
    for batch in loader.iter().take(limit.unwrap_or(usize::MAX)) {
        let (loss, logits) = network.forward_loss(batch.images, batch.targets.clone());
        acc.add(loss.into_scalar().elem::<f64>(), logits, batch.targets);
    }
    acc.stats()
}
