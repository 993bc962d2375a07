// ============================================================
// Layer 4 — DataModule
// ============================================================
// Everything the trainer needs to know about data, behind one
// trait: how to find it, how to split it, how to batch it.
//
// Lifecycle the trainer drives:
//
//   prepare_data()  once, before anything else
//   setup(stage)    build the datasets for Fit / Test / Predict
//   *_dataset()     hand a dataset to a DataLoader
//   teardown(stage) release whatever setup built

use anyhow::Result;

use crate::data::dataset::ImageDataset;
use crate::domain::metrics::Stage;

/// How DataLoaders over this module's datasets should be built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderSettings {
    pub batch_size:  usize,
    pub num_workers: usize,
    /// Shuffle seed for the training loader.
    pub seed:        u64,
    pub image_size:  usize,
}

pub trait DataModule {
    /// Check or fetch the raw data. Called once per fit/test/predict.
    fn prepare_data(&mut self) -> Result<()> {
        Ok(())
    }

    fn setup(&mut self, stage: Stage) -> Result<()>;

    fn teardown(&mut self, _stage: Stage) {}

    /// Class names indexed by label.
    fn class_names(&self) -> &[String];

    fn loader_settings(&self) -> LoaderSettings;

    fn train_dataset(&self) -> Result<ImageDataset>;
    fn val_dataset(&self) -> Result<ImageDataset>;
    fn test_dataset(&self) -> Result<ImageDataset>;
    fn predict_dataset(&self) -> Result<ImageDataset>;
}
