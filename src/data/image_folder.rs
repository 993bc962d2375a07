// ============================================================
// Layer 4 — ImageFolderDataModule
// ============================================================
// A dataset laid out as one sub-directory per class:
//
//   data_dir/
//     beagle/      img_001.jpg  img_002.jpg ...
//     boxer/       ...
//     poodle/      ...
//
// Class names are the sorted sub-directory names; the label of
// an image is the index of its directory in that list.
//
// setup() scans the tree, drops files that cannot be read as
// images, shuffles with `seed` and splits by `splits` into
// train / val / test. Predict reuses the test split.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::data::{
    datamodule::{DataModule, LoaderSettings},
    dataset::{ImageDataset, ImageSample},
    splitter::split_by_fractions,
    transform::{ImageTransform, CHANNELS, IMAGENET_MEAN, IMAGENET_STD},
};
use crate::domain::metrics::Stage;

// ─── Constructor arguments ───────────────────────────────────────────────────
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImageFolderArgs {
    pub data_dir:    PathBuf,
    pub image_size:  usize,
    pub batch_size:  usize,
    pub num_workers: usize,
    pub splits:      Vec<f64>,
    pub seed:        u64,
    pub mean:        Vec<f32>,
    pub std:         Vec<f32>,
    pub extensions:  Vec<String>,
}

impl Default for ImageFolderArgs {
    fn default() -> Self {
        Self {
            data_dir:    PathBuf::from("data"),
            image_size:  224,
            batch_size:  32,
            num_workers: 0,
            splits:      vec![0.8, 0.1, 0.1],
            seed:        42,
            mean:        IMAGENET_MEAN.to_vec(),
            std:         IMAGENET_STD.to_vec(),
            extensions:  vec!["jpg".into(), "jpeg".into(), "png".into()],
        }
    }
}

struct Splits {
    train: ImageDataset,
    val:   ImageDataset,
    test:  ImageDataset,
}

pub struct ImageFolderDataModule {
    args:        ImageFolderArgs,
    transform:   ImageTransform,
    class_names: Vec<String>,
    splits:      Option<Splits>,
}

impl ImageFolderDataModule {
    pub fn new(args: ImageFolderArgs) -> Result<Self> {
        if args.image_size == 0 {
            bail!("image_size must be positive");
        }
        if args.batch_size == 0 {
            bail!("batch_size must be positive");
        }
        if args.splits.len() != 3 {
            bail!("splits must have three entries (train, val, test), got {:?}", args.splits);
        }
        if args.splits.iter().any(|f| !(0.0..=1.0).contains(f)) {
            bail!("split fractions must lie in [0, 1], got {:?}", args.splits);
        }
        if args.splits.iter().sum::<f64>() > 1.0 + 1e-6 {
            bail!("split fractions sum to more than 1: {:?}", args.splits);
        }
        let mean = channel_stats("mean", &args.mean)?;
        let std = channel_stats("std", &args.std)?;
        if std.iter().any(|s| *s <= 0.0) {
            bail!("std values must be positive, got {:?}", args.std);
        }

        let transform = ImageTransform::new(args.image_size, mean, std);
        Ok(Self { args, transform, class_names: Vec::new(), splits: None })
    }

    pub fn args(&self) -> &ImageFolderArgs {
        &self.args
    }

    fn has_allowed_extension(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        self.args.extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext))
    }

    /// Sorted class directories and every readable image inside them.
    fn scan(&self) -> Result<(Vec<String>, Vec<ImageSample>)> {
        let root = &self.args.data_dir;
        let mut class_dirs: Vec<PathBuf> = fs::read_dir(root)
            .with_context(|| format!("Cannot read data_dir '{}'", root.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_dir())
            .collect();
        class_dirs.sort();

        let mut class_names = Vec::with_capacity(class_dirs.len());
        let mut samples = Vec::new();
        let mut dropped = 0usize;

        for (label, dir) in class_dirs.iter().enumerate() {
            let name = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let mut files: Vec<PathBuf> = fs::read_dir(dir)
                .with_context(|| format!("Cannot read class directory '{}'", dir.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.is_file() && self.has_allowed_extension(path))
                .collect();
            files.sort();

            for path in files {
                // Only the header is read here; pixels are decoded per item.
                match image::image_dimensions(&path) {
                    Ok(_) => samples.push(ImageSample { path, label }),
                    Err(e) => {
                        tracing::warn!("Skipping unreadable image '{}': {e}", path.display());
                        dropped += 1;
                    }
                }
            }
            class_names.push(name);
        }

        tracing::info!(
            "Found {} images in {} classes under '{}' ({} skipped)",
            samples.len(),
            class_names.len(),
            root.display(),
            dropped,
        );
        Ok((class_names, samples))
    }

    fn split(&self, which: &str) -> Result<ImageDataset> {
        let Some(splits) = &self.splits else {
            bail!("ImageFolderDataModule: {which} dataset requested before setup()");
        };
        let dataset = match which {
            "train" => &splits.train,
            "val" => &splits.val,
            _ => &splits.test,
        };
        Ok(dataset.clone())
    }
}

fn channel_stats(name: &str, values: &[f32]) -> Result<[f32; CHANNELS]> {
    values
        .try_into()
        .map_err(|_| anyhow::anyhow!("{name} must have {CHANNELS} values, got {}", values.len()))
}

impl DataModule for ImageFolderDataModule {
    fn prepare_data(&mut self) -> Result<()> {
        let root = &self.args.data_dir;
        if !root.is_dir() {
            bail!("data_dir '{}' does not exist or is not a directory", root.display());
        }
        Ok(())
    }

    fn setup(&mut self, stage: Stage) -> Result<()> {
        if self.splits.is_some() {
            tracing::debug!("Datamodule already set up, reusing splits for {stage}");
            return Ok(());
        }

        let (class_names, samples) = self.scan()?;
        if class_names.is_empty() {
            bail!("No class directories found under '{}'", self.args.data_dir.display());
        }

        let mut parts = split_by_fractions(samples, &self.args.splits, self.args.seed).into_iter();
        let mut next = || ImageDataset::new(parts.next().unwrap_or_default(), self.transform.clone());
        let splits = Splits { train: next(), val: next(), test: next() };

        tracing::info!(
            "Split for {stage}: {} train / {} val / {} test",
            splits.train.sample_count(),
            splits.val.sample_count(),
            splits.test.sample_count(),
        );

        self.class_names = class_names;
        self.splits = Some(splits);
        Ok(())
    }

    fn teardown(&mut self, stage: Stage) {
        tracing::debug!("Datamodule teardown after {stage}");
    }

    fn class_names(&self) -> &[String] {
        &self.class_names
    }

    fn loader_settings(&self) -> LoaderSettings {
        LoaderSettings {
            batch_size:  self.args.batch_size,
            num_workers: self.args.num_workers,
            seed:        self.args.seed,
            image_size:  self.args.image_size,
        }
    }

    fn train_dataset(&self) -> Result<ImageDataset> {
        self.split("train")
    }

    fn val_dataset(&self) -> Result<ImageDataset> {
        self.split("val")
    }

    fn test_dataset(&self) -> Result<ImageDataset> {
        self.split("test")
    }

    fn predict_dataset(&self) -> Result<ImageDataset> {
        self.split("test")
    }
}
