//! Focal cross-entropy loss.
//!
//! Lin et al., "Focal Loss for Dense Object Detection"
//! (<https://arxiv.org/abs/1708.02002>). The log-likelihood of every class is
//! scaled by `(1 - p)^γ` before the negative log-likelihood is taken, so
//! confidently classified pixels contribute less than with plain cross entropy.

use burn::{
    prelude::*,
    tensor::{
        activation::{log_softmax, softmax},
        backend::Backend,
        Int, Tensor,
    },
};

use super::{check_logits_labels, check_num_classes, resolve_class_weights, LossTerm, Reduction};
use crate::error::{OncoSegError, OncoSegResult};

/// Configuration for [`FocalCrossEntropyLoss`].
#[derive(Config, Debug)]
pub struct FocalLossConfig {
    /// Focusing exponent γ; `0` reduces to weighted cross entropy.
    #[config(default = 2.0)]
    pub gamma: f32,
    /// Number of classes `K`; when set, `class_weights` is checked against it in `init`.
    #[config(default = "None")]
    pub num_classes: Option<usize>,
    /// Optional per-class weights (length must match the logits' class axis).
    #[config(default = "None")]
    pub class_weights: Option<Vec<f32>>,
    /// Label value excluded from the loss.
    #[config(default = "-100")]
    pub ignore_index: i64,
    /// Reduction over the batch.
    #[config(default = "Reduction::Mean")]
    pub reduction: Reduction,
}

impl FocalLossConfig {
    /// Initialize a focal loss, validating γ and the class weights.
    pub fn init<B: Backend>(&self) -> OncoSegResult<FocalCrossEntropyLoss<B>> {
        check_gamma(self.gamma)?;
        check_num_classes(self.num_classes)?;
        if let Some(weights) = &self.class_weights {
            let num_classes = self.num_classes.unwrap_or(weights.len());
            resolve_class_weights(Some(weights.as_slice()), num_classes, "focal class weights")?;
        }

        Ok(FocalCrossEntropyLoss {
            gamma: self.gamma,
            num_classes: self.num_classes,
            class_weights: self.class_weights.clone(),
            ignore_index: self.ignore_index,
            reduction: self.reduction,
            _phantom: std::marker::PhantomData,
        })
    }
}

fn check_gamma(gamma: f32) -> OncoSegResult<()> {
    if !gamma.is_finite() || gamma < 0.0 {
        return Err(OncoSegError::InvalidConfiguration {
            reason: format!("Focal gamma must be finite and non-negative, got {gamma}"),
        });
    }
    Ok(())
}

/// Focal cross-entropy over per-pixel class logits.
#[derive(Debug, Clone)]
pub struct FocalCrossEntropyLoss<B: Backend> {
    gamma: f32,
    num_classes: Option<usize>,
    class_weights: Option<Vec<f32>>,
    ignore_index: i64,
    reduction: Reduction,
    _phantom: std::marker::PhantomData<B>,
}

impl<B: Backend> FocalCrossEntropyLoss<B> {
    /// Current focusing exponent.
    pub const fn gamma(&self) -> f32 {
        self.gamma
    }

    /// Change the focusing exponent between steps.
    pub fn set_gamma(&mut self, gamma: f32) -> OncoSegResult<()> {
        check_gamma(gamma)?;
        self.gamma = gamma;
        Ok(())
    }

    /// Calculate the focal loss.
    ///
    /// # Arguments
    /// * `logits` - Raw class scores with shape [N, K, H, W]
    /// * `labels` - Class index per pixel with shape [N, H, W]; values equal to
    ///   the ignore index are excluded, all others must lie in `[0, K)`
    ///
    /// # Returns
    /// Weighted mean (`Mean`), weighted sum (`Sum`) or per-sample weighted
    /// mean `[N]` (`None`). Samples whose pixels are all ignored yield `0`.
    pub fn forward(&self, logits: Tensor<B, 4>, labels: Tensor<B, 3, Int>) -> Tensor<B, 1> {
        self.assertions(logits.dims(), labels.dims());

        let [n, k, h, w] = logits.dims();
        let device = logits.device();

        let probs = softmax(logits.clone(), 1);
        let focal_factor = (Tensor::ones_like(&probs) - probs).powf_scalar(self.gamma);
        let modulated = focal_factor * log_softmax(logits, 1);

        let ignored = labels.clone().equal_elem(self.ignore_index);
        let safe_labels = labels.mask_fill(ignored.clone(), 0);

        let picked = modulated
            .gather(1, safe_labels.clone().unsqueeze_dim::<4>(1))
            .reshape([n, h * w]);

        let class_weights = match &self.class_weights {
            Some(weights) => Tensor::<B, 1>::from_floats(weights.as_slice(), &device),
            None => Tensor::<B, 1>::ones([k], &device),
        };
        let pixel_weights = class_weights
            .gather(0, safe_labels.reshape([n * h * w]))
            .reshape([n, h * w])
            * ignored.bool_not().float().reshape([n, h * w]);

        let losses = picked.neg() * pixel_weights.clone();

        match self.reduction {
            Reduction::Mean => losses.sum() / nonzero(pixel_weights.sum()),
            Reduction::Sum => losses.sum(),
            Reduction::None => {
                let per_sample = losses.sum_dim(1).reshape([n]);
                per_sample / nonzero(pixel_weights.sum_dim(1).reshape([n]))
            }
        }
    }

    fn assertions(&self, logits: [usize; 4], labels: [usize; 3]) {
        if let Err(err) = check_logits_labels(logits, labels) {
            panic!("{err}");
        }
        if let Some(expected) = self.num_classes {
            assert_eq!(expected, logits[1], "Logits must have one channel per class");
        }
        if let Some(weights) = &self.class_weights {
            assert_eq!(
                weights.len(),
                logits[1],
                "Focal class weights must have one entry per class"
            );
        }
    }
}

/// Replace exact zeros by one so an all-ignored denominator divides a zero numerator.
fn nonzero<B: Backend>(denominator: Tensor<B, 1>) -> Tensor<B, 1> {
    let zeros = denominator.clone().equal_elem(0.0).float();
    denominator + zeros
}

impl<B: Backend> LossTerm<B> for FocalCrossEntropyLoss<B> {
    fn name(&self) -> String {
        "FocalCrossEntropyLoss".to_string()
    }

    fn loss(&self, logits: Tensor<B, 4>, labels: Tensor<B, 3, Int>) -> Tensor<B, 1> {
        self.forward(logits, labels)
    }
}
