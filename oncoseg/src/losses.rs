//! Loss functions for segmentation and response-prediction training.
//!
//! Every loss here consumes raw network logits `[N, K, H, W]` together with an
//! integer label map `[N, H, W]` and can be registered, with a weight, in a
//! [`WeightedLossAggregator`]:
//!
//! - [`FocalCrossEntropyLoss`]: `(1 - p)^γ` modulated cross entropy
//! - [`WeightedCrossEntropyLoss`]: class-weighted cross entropy
//! - [`BoundaryDistanceLoss`]: signed-distance boundary penalty
//!
//! The aggregator combines them for a plain batch or for a mixup batch that
//! carries two label sets.

pub mod aggregator;
pub mod boundary;
pub mod cross_entropy;
pub mod focal;

pub use aggregator::{LossWeights, RegisteredLoss, WeightedLossAggregator};
pub use boundary::{BoundaryDistanceLoss, BoundaryLossConfig, DistanceFieldBuilder};
pub use cross_entropy::{
    class_weights_from_portions, WeightedCrossEntropyLoss, WeightedCrossEntropyLossConfig,
};
pub use focal::{FocalCrossEntropyLoss, FocalLossConfig};

use burn::prelude::*;
use burn::tensor::{backend::Backend, Int, Tensor};

use crate::error::{OncoSegError, OncoSegResult};

/// A loss that can be registered in a [`WeightedLossAggregator`].
///
/// Implementations map `(logits, labels)` to a loss tensor of shape `[1]`
/// (mean or sum reduction) or `[N]` (no reduction, one value per sample).
/// All terms registered in one aggregator must agree on that shape.
pub trait LossTerm<B: Backend> {
    /// Name used in loss listings and per-term logging.
    fn name(&self) -> String;

    /// Evaluate the term.
    ///
    /// # Arguments
    /// * `logits` - Raw network output with shape [N, K, H, W]
    /// * `labels` - Class index per pixel with shape [N, H, W]
    fn loss(&self, logits: Tensor<B, 4>, labels: Tensor<B, 3, Int>) -> Tensor<B, 1>;
}

/// Policy for collapsing per-sample losses over the batch.
#[derive(Config, Debug, Copy, PartialEq, Eq)]
pub enum Reduction {
    /// Average over the batch.
    Mean,
    /// Sum over the batch.
    Sum,
    /// Keep one value per sample.
    None,
}

impl Reduction {
    /// Reduce a per-sample loss vector `[N]`.
    pub fn apply<B: Backend>(self, per_sample: Tensor<B, 1>) -> Tensor<B, 1> {
        match self {
            Self::Mean => per_sample.mean(),
            Self::Sum => per_sample.sum(),
            Self::None => per_sample,
        }
    }
}

/// Validate an optional per-class weight vector against the class count and
/// expand it to a dense vector (all ones when absent).
pub(crate) fn resolve_class_weights(
    weights: Option<&[f32]>,
    num_classes: usize,
    context: &str,
) -> OncoSegResult<Vec<f32>> {
    let Some(weights) = weights else {
        return Ok(vec![1.0; num_classes]);
    };

    if weights.len() != num_classes {
        return Err(OncoSegError::WeightLengthMismatch {
            context: context.to_string(),
            expected: num_classes,
            actual: weights.len(),
        });
    }
    if let Some(bad) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
        return Err(OncoSegError::InvalidConfiguration {
            reason: format!("{context} must be finite and non-negative, got {bad}"),
        });
    }

    Ok(weights.to_vec())
}

/// Reject a configured class count below two.
pub(crate) fn check_num_classes(num_classes: Option<usize>) -> OncoSegResult<()> {
    match num_classes {
        Some(k) if k < 2 => Err(OncoSegError::InvalidConfiguration {
            reason: format!("At least 2 classes are required, got {k}"),
        }),
        _ => Ok(()),
    }
}

/// Check that logits `[N, K, H, W]` and labels `[N, H, W]` describe the same batch.
pub(crate) fn check_logits_labels(logits: [usize; 4], labels: [usize; 3]) -> OncoSegResult<()> {
    let [n, _, h, w] = logits;
    if labels != [n, h, w] {
        return Err(OncoSegError::InvalidTensorShape {
            expected: format!("[{n}, {h}, {w}]"),
            actual: format!("{labels:?}"),
        });
    }
    Ok(())
}
