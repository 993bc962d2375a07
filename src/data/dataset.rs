use std::path::PathBuf;

use burn::data::dataset::Dataset;

use crate::data::transform::ImageTransform;

/// One labelled image on disk. Decoding happens in `ImageDataset::get`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSample {
    pub path:  PathBuf,
    pub label: usize,
}

/// One decoded, transformed image: CHW floats plus its class index.
#[derive(Debug, Clone)]
pub struct ImageItem {
    pub pixels: Vec<f32>,
    pub label:  usize,
}

#[derive(Debug, Clone)]
pub struct ImageDataset {
    samples:   Vec<ImageSample>,
    transform: ImageTransform,
}

impl ImageDataset {
    pub fn new(samples: Vec<ImageSample>, transform: ImageTransform) -> Self {
        Self { samples, transform }
    }

    pub fn sample_count(&self) -> usize { self.samples.len() }

    pub fn samples(&self) -> &[ImageSample] { &self.samples }

    pub fn transform(&self) -> &ImageTransform { &self.transform }
}

impl Dataset<ImageItem> for ImageDataset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        let sample = self.samples.get(index)?;
        // Files are checked at setup, but may have changed since.
        let pixels = match image::open(&sample.path) {
            Ok(img) => self.transform.apply(&img),
            Err(e) => {
                tracing::warn!("Cannot decode '{}': {e}. Using a blank image.", sample.path.display());
                self.transform.blank()
            }
        };
        Some(ImageItem { pixels, label: sample.label })
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}
