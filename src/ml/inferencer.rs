// ============================================================
// Layer 5 — Inferencer
// ============================================================
// Classifies one prepared image:
//
//   [C, H, W] ──add batch axis──▶ [1, C, H, W] ──forward──▶ [1, K]
//             ──argmax──▶ (class_names[i], logits[0][i])
//
// The image must already be resized and normalised the way the
// model was trained. The returned score is the raw logit: no
// softmax, no threshold. Ties go to the lowest index.

use anyhow::{bail, Result};
use burn::prelude::*;

use crate::ml::model::ImageClassifier;

/// Anything that maps a batch of images to per-class scores.
pub trait ImageClassify<B: Backend> {
    /// [N, C, H, W] → [N, num_classes]
    fn logits(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;
}

impl<B: Backend> ImageClassify<B> for ImageClassifier<B> {
    fn logits(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.forward(images)
    }
}

/// Predict the label of a single unbatched image tensor.
pub fn infer<B: Backend, M: ImageClassify<B>>(
    model:       &M,
    image:       Tensor<B, 3>,
    class_names: &[String],
) -> Result<(String, f32)> {
    let logits = model.logits(image.unsqueeze::<4>());
    let scores = tensor_to_vec(logits)?;
    let (label, score) = best_label(&scores, class_names)?;
    Ok((label.to_string(), score))
}

/// Highest score and its class name. The first maximum wins.
pub fn best_label<'a>(scores: &[f32], class_names: &'a [String]) -> Result<(&'a str, f32)> {
    let Some(first) = scores.first() else {
        bail!("model returned no scores");
    };
    let (index, score) = scores
        .iter()
        .enumerate()
        .skip(1)
        .fold((0, *first), |(bi, bs), (i, &s)| if s > bs { (i, s) } else { (bi, bs) });

    match class_names.get(index) {
        Some(name) => Ok((name.as_str(), score)),
        None => bail!(
            "predicted class index {index} is outside the {} known class names",
            class_names.len()
        ),
    }
}

pub(crate) fn tensor_to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("Cannot read tensor values: {e:?}"))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use std::cell::Cell;

    type TestBackend = NdArray;

    /// Returns fixed logits and remembers the input shape it saw.
    struct FixedLogits {
        logits: Vec<f32>,
        seen:   Cell<Option<[usize; 4]>>,
    }

    impl ImageClassify<TestBackend> for FixedLogits {
        fn logits(&self, images: Tensor<TestBackend, 4>) -> Tensor<TestBackend, 2> {
            self.seen.set(Some(images.dims()));
            Tensor::<TestBackend, 1>::from_floats(self.logits.as_slice(), &images.device())
                .reshape([1, self.logits.len()])
        }
    }

    fn names(n: &[&str]) -> Vec<String> {
        n.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn picks_highest_logit_and_returns_raw_score() {
        let model = FixedLogits { logits: vec![0.1, 5.2, 0.3], seen: Cell::new(None) };
        let image = Tensor::<TestBackend, 3>::zeros([3, 4, 4], &Default::default());

        let (label, score) = infer(&model, image, &names(&["a", "b", "c"])).unwrap();
        assert_eq!(label, "b");
        assert!((score - 5.2).abs() < 1e-6);
        assert_eq!(model.seen.get(), Some([1, 3, 4, 4]));
    }

    #[test]
    fn ties_resolve_to_first_index() {
        let classes = names(&["x", "y", "z"]);
        assert_eq!(best_label(&[1.0, 3.0, 3.0], &classes).unwrap(), ("y", 3.0));
    }

    #[test]
    fn index_beyond_class_names_is_an_error() {
        assert!(best_label(&[0.0, 1.0], &names(&["only"])).is_err());
        assert!(best_label(&[], &names(&["a"])).is_err());
    }

    #[test]
    fn works_with_the_real_classifier() {
        use crate::ml::model::ImageClassifierConfig;
        let device = Default::default();
        let model = ImageClassifierConfig::new(2, 3, vec![4], 8, 0.0).init::<TestBackend>(&device);
        let image = Tensor::<TestBackend, 3>::ones([3, 8, 8], &device);
        let (label, _) = infer(&model, image, &names(&["cat", "dog"])).unwrap();
        assert!(label == "cat" || label == "dog");
    }
}
