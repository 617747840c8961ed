//! Class-weighted cross entropy over segmentation logits.

use burn::{
    nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig},
    prelude::*,
    tensor::{backend::Backend, Int, Tensor},
};
use log::info;

use super::{check_logits_labels, check_num_classes, resolve_class_weights, LossTerm};
use crate::error::{OncoSegError, OncoSegResult};

/// Inverse-frequency class weights: `1 / portion` for every class.
///
/// `portions` are the fractions of each class in the training labels.
pub fn class_weights_from_portions(portions: &[f32]) -> OncoSegResult<Vec<f32>> {
    if portions.is_empty() {
        return Err(OncoSegError::InvalidConfiguration {
            reason: "Class portions must not be empty".to_string(),
        });
    }
    if let Some(bad) = portions.iter().find(|p| !p.is_finite() || **p <= 0.0) {
        return Err(OncoSegError::InvalidConfiguration {
            reason: format!("Class portions must be positive, got {bad}"),
        });
    }

    let weights: Vec<f32> = portions.iter().map(|p| 1.0 / p).collect();
    info!("cross entropy weights {weights:?} for class portions {portions:?}");
    Ok(weights)
}

/// Configuration for [`WeightedCrossEntropyLoss`].
#[derive(Config, Debug)]
pub struct WeightedCrossEntropyLossConfig {
    /// Number of classes `K`; when set, `class_weights` is checked against it in `init`.
    #[config(default = "None")]
    pub num_classes: Option<usize>,
    /// Optional per-class weights.
    #[config(default = "None")]
    pub class_weights: Option<Vec<f32>>,
    /// Optional label smoothing factor in `[0, 1]`.
    #[config(default = "None")]
    pub smoothing: Option<f32>,
}

impl WeightedCrossEntropyLossConfig {
    /// Initialize the loss on `device`.
    pub fn init<B: Backend>(&self, device: &B::Device) -> OncoSegResult<WeightedCrossEntropyLoss<B>> {
        check_num_classes(self.num_classes)?;
        if let Some(weights) = &self.class_weights {
            let num_classes = self.num_classes.unwrap_or(weights.len());
            resolve_class_weights(Some(weights.as_slice()), num_classes, "cross entropy class weights")?;
        }
        if let Some(alpha) = self.smoothing {
            if !(0.0..=1.0).contains(&alpha) {
                return Err(OncoSegError::InvalidConfiguration {
                    reason: format!("Label smoothing must lie in [0, 1], got {alpha}"),
                });
            }
        }

        let ce_loss = CrossEntropyLossConfig::new()
            .with_weights(self.class_weights.clone())
            .with_smoothing(self.smoothing)
            .init(device);

        Ok(WeightedCrossEntropyLoss {
            ce_loss,
            num_classes: self.num_classes.or(self.class_weights.as_ref().map(Vec::len)),
        })
    }
}

/// Weighted cross entropy: weighted mean of the per-pixel negative log-likelihood.
#[derive(Debug, Clone)]
pub struct WeightedCrossEntropyLoss<B: Backend> {
    ce_loss: CrossEntropyLoss<B>,
    num_classes: Option<usize>,
}

impl<B: Backend> WeightedCrossEntropyLoss<B> {
    /// Calculate the loss.
    ///
    /// # Arguments
    /// * `logits` - Raw class scores with shape [N, K, H, W]
    /// * `labels` - Class index per pixel in `[0, K)` with shape [N, H, W]
    pub fn forward(&self, logits: Tensor<B, 4>, labels: Tensor<B, 3, Int>) -> Tensor<B, 1> {
        if let Err(err) = check_logits_labels(logits.dims(), labels.dims()) {
            panic!("{err}");
        }
        let [n, k, h, w] = logits.dims();
        if let Some(expected) = self.num_classes {
            assert_eq!(expected, k, "Logits must have one channel per class");
        }

        // [N, K, H, W] -> [N * H * W, K], one row per pixel
        let per_pixel = logits.permute([0, 2, 3, 1]).reshape([n * h * w, k]);
        self.ce_loss.forward(per_pixel, labels.reshape([n * h * w]))
    }
}

impl<B: Backend> LossTerm<B> for WeightedCrossEntropyLoss<B> {
    fn name(&self) -> String {
        "WeightedCrossEntropyLoss".to_string()
    }

    fn loss(&self, logits: Tensor<B, 4>, labels: Tensor<B, 3, Int>) -> Tensor<B, 1> {
        self.forward(logits, labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::losses::FocalLossConfig;
    use burn::{backend::NdArray, tensor::ElementConversion};

    type TestBackend = NdArray<f32>;

    fn inputs() -> (Tensor<TestBackend, 4>, Tensor<TestBackend, 3, Int>) {
        let device = Default::default();
        let logits = Tensor::from_floats(
            [
                [[[1.0, -0.5], [0.2, 2.0]], [[0.0, 1.5], [-1.0, 0.3]]],
                [[[0.7, 0.1], [0.0, -2.0]], [[0.4, 0.9], [1.2, 0.5]]],
            ],
            &device,
        );
        let labels = Tensor::from_ints([[[0, 1], [1, 0]], [[1, 1], [0, 1]]], &device);
        (logits, labels)
    }

    #[test]
    fn test_class_weights_from_portions() {
        let weights = class_weights_from_portions(&[0.3, 0.7]).unwrap();
        assert!((weights[0] - 1.0 / 0.3).abs() < 1e-5);
        assert!((weights[1] - 1.0 / 0.7).abs() < 1e-5);

        assert!(class_weights_from_portions(&[]).is_err());
        assert!(class_weights_from_portions(&[0.0, 1.0]).is_err());
    }

    #[test]
    fn test_matches_focal_with_zero_gamma() {
        let device = Default::default();
        let weights = vec![3.3, 1.4];
        let ce = WeightedCrossEntropyLossConfig::new()
            .with_class_weights(Some(weights.clone()))
            .init::<TestBackend>(&device)
            .unwrap();
        let focal = FocalLossConfig::new()
            .with_gamma(0.0)
            .with_class_weights(Some(weights))
            .init::<TestBackend>()
            .unwrap();

        let (logits, labels) = inputs();
        let a = ce.forward(logits.clone(), labels.clone()).into_scalar().elem::<f32>();
        let b = focal.forward(logits, labels).into_scalar().elem::<f32>();
        assert!((a - b).abs() < 1e-5, "{a} vs {b}");
    }

    #[test]
    fn test_weight_length_checked_against_class_count() {
        let result = WeightedCrossEntropyLossConfig::new()
            .with_num_classes(Some(2))
            .with_class_weights(Some(vec![1.0; 3]))
            .init::<TestBackend>(&Default::default());

        match result {
            Err(OncoSegError::WeightLengthMismatch {
                expected, actual, ..
            }) => {
                assert_eq!(expected, 2);
                assert_eq!(actual, 3);
            }
            other => panic!("Expected WeightLengthMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_smoothing_rejected() {
        let result = WeightedCrossEntropyLossConfig::new()
            .with_smoothing(Some(1.5))
            .init::<TestBackend>(&Default::default());
        assert!(matches!(
            result,
            Err(OncoSegError::InvalidConfiguration { .. })
        ));
    }
}
