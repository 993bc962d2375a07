// ============================================================
// Layer 4 — Image Transform
// ============================================================
// Turns a decoded image into the flat CHW float buffer the
// batcher stacks into a tensor:
//
//   DynamicImage ──resize──▶ size×size RGB ──scale──▶ [0, 1]
//                ──normalize──▶ (x - mean) / std ──▶ Vec<f32> (C, H, W)
//
// Channel order is R, G, B. The buffer always has
// CHANNELS * size * size values.

use image::{imageops::FilterType, DynamicImage};

pub const CHANNELS: usize = 3;

/// ImageNet statistics, the usual defaults for RGB photographs.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Debug, Clone, PartialEq)]
pub struct ImageTransform {
    pub size: usize,
    pub mean: [f32; CHANNELS],
    pub std:  [f32; CHANNELS],
}

impl ImageTransform {
    pub fn new(size: usize, mean: [f32; CHANNELS], std: [f32; CHANNELS]) -> Self {
        Self { size, mean, std }
    }

    /// Number of f32 values `apply` produces.
    pub fn value_count(&self) -> usize {
        CHANNELS * self.size * self.size
    }

    pub fn apply(&self, image: &DynamicImage) -> Vec<f32> {
        let side = self.size as u32;
        let rgb = image.resize_exact(side, side, FilterType::Triangle).to_rgb8();

        let plane = self.size * self.size;
        let mut out = vec![0.0f32; self.value_count()];
        for (i, pixel) in rgb.pixels().enumerate() {
            for c in 0..CHANNELS {
                let value = pixel.0[c] as f32 / 255.0;
                out[c * plane + i] = (value - self.mean[c]) / self.std[c];
            }
        }
        out
    }

    /// What an all-black image looks like after normalisation.
    pub fn blank(&self) -> Vec<f32> {
        let plane = self.size * self.size;
        (0..CHANNELS)
            .flat_map(|c| std::iter::repeat(-self.mean[c] / self.std[c]).take(plane))
            .collect()
    }
}

impl Default for ImageTransform {
    fn default() -> Self {
        Self::new(224, IMAGENET_MEAN, IMAGENET_STD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn output_is_channel_major() {
        let transform = ImageTransform::new(2, [0.0; 3], [1.0; 3]);
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([255, 0, 51])));
        let out = transform.apply(&image);
        assert_eq!(out.len(), 12);
        assert!(out[..4].iter().all(|&v| (v - 1.0).abs() < 1e-6));
        assert!(out[4..8].iter().all(|&v| v.abs() < 1e-6));
        assert!(out[8..].iter().all(|&v| (v - 0.2).abs() < 1e-6));
    }

    #[test]
    fn normalisation_uses_mean_and_std() {
        let transform = ImageTransform::new(1, [0.5; 3], [0.25; 3]);
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(1, 1, Rgb([255, 255, 255])));
        assert!(transform.apply(&image).iter().all(|&v| (v - 2.0).abs() < 1e-6));
    }

    #[test]
    fn blank_matches_a_black_image() {
        let transform = ImageTransform::new(3, IMAGENET_MEAN, IMAGENET_STD);
        let black = DynamicImage::ImageRgb8(RgbImage::new(3, 3));
        let expected = transform.apply(&black);
        for (a, b) in transform.blank().iter().zip(&expected) {
            assert!((a - b).abs() < 1e-6);
        }
    }
}
