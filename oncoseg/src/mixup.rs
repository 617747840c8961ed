//! Mixup sampling for two-batch training steps.
//!
//! Two independently drawn batches are blended as `λ·a + (1 − λ)·b`; the two
//! label sets are not blended but routed through
//! [`WeightedLossAggregator::compute_mixed`](crate::losses::WeightedLossAggregator::compute_mixed).

use burn::{
    config::Config,
    tensor::{backend::Backend, Int, Tensor},
};
use rand::{distributions::Distribution, rngs::StdRng, Rng, SeedableRng};
use rand_distr::Beta;

use crate::error::{OncoSegError, OncoSegResult};

/// Configuration for [`MixupSampler`].
#[derive(Config, Debug)]
pub struct MixupConfig {
    /// Shape parameter of the symmetric `Beta(α, α)` distribution.
    #[config(default = 0.4)]
    pub alpha: f64,
    /// Probability that a step is mixed at all.
    #[config(default = 0.5)]
    pub prob: f64,
    /// Fixed seed for reproducible draws; entropy-seeded when absent.
    #[config(default = "None")]
    pub seed: Option<u64>,
}

impl MixupConfig {
    /// Build a sampler, validating `alpha` and `prob`.
    pub fn init(&self) -> OncoSegResult<MixupSampler> {
        if !(0.0..=1.0).contains(&self.prob) {
            return Err(OncoSegError::InvalidConfiguration {
                reason: format!("Mixup probability must lie in [0, 1], got {}", self.prob),
            });
        }
        let beta = Beta::new(self.alpha, self.alpha).map_err(|err| {
            OncoSegError::InvalidConfiguration {
                reason: format!("Mixup alpha {} is not a valid Beta parameter: {err}", self.alpha),
            }
        })?;

        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(MixupSampler {
            beta: Some(beta),
            prob: self.prob,
            rng,
        })
    }
}

/// Draws the mixing coefficient λ for each training step.
#[derive(Debug, Clone)]
pub struct MixupSampler {
    beta: Option<Beta<f64>>,
    prob: f64,
    rng: StdRng,
}

impl MixupSampler {
    /// A sampler that never mixes.
    pub fn disabled() -> Self {
        Self {
            beta: None,
            prob: 0.0,
            rng: StdRng::seed_from_u64(0),
        }
    }

    /// Whether any batch can be mixed.
    pub fn is_enabled(&self) -> bool {
        self.beta.is_some() && self.prob > 0.0
    }

    /// `1.0` with probability `1 − prob`, otherwise a draw from `Beta(α, α)`.
    pub fn sample_lambda(&mut self) -> f64 {
        let Some(beta) = &self.beta else {
            return 1.0;
        };
        if self.prob <= 0.0 || !self.rng.gen_bool(self.prob) {
            return 1.0;
        }
        beta.sample(&mut self.rng)
    }

    /// Blend two batches and pair them with their label sets.
    pub fn mix<B: Backend>(
        &mut self,
        first: (Tensor<B, 4>, Tensor<B, 3, Int>),
        second: (Tensor<B, 4>, Tensor<B, 3, Int>),
    ) -> MixupBatch<B> {
        let lambda = self.sample_lambda();
        MixupBatch::new(first, second, lambda)
    }
}

/// `λ·a + (1 − λ)·b`.
pub fn blend_inputs<B: Backend, const D: usize>(
    a: Tensor<B, D>,
    b: Tensor<B, D>,
    lambda: f64,
) -> Tensor<B, D> {
    if lambda == 1.0 {
        return a;
    }
    if lambda == 0.0 {
        return b;
    }
    a.mul_scalar(lambda) + b.mul_scalar(1.0 - lambda)
}

/// A blended input batch with both of its label sets.
#[derive(Debug, Clone)]
pub struct MixupBatch<B: Backend> {
    /// Blended inputs `[N, C, H, W]`.
    pub inputs: Tensor<B, 4>,
    /// Labels of the first source batch `[N, H, W]`.
    pub labels1: Tensor<B, 3, Int>,
    /// Labels of the second source batch `[N, H, W]`.
    pub labels2: Tensor<B, 3, Int>,
    /// Mixing coefficient of the first batch.
    pub lambda: f64,
}

impl<B: Backend> MixupBatch<B> {
    /// Blend two `(inputs, labels)` batches with coefficient `lambda` on the first.
    pub fn new(
        first: (Tensor<B, 4>, Tensor<B, 3, Int>),
        second: (Tensor<B, 4>, Tensor<B, 3, Int>),
        lambda: f64,
    ) -> Self {
        let (inputs1, labels1) = first;
        let (inputs2, labels2) = second;
        Self {
            inputs: blend_inputs(inputs1, inputs2, lambda),
            labels1,
            labels2,
            lambda,
        }
    }

    /// True when the blended input is exactly one of the source batches.
    pub fn is_pure(&self) -> bool {
        self.lambda == 1.0 || self.lambda == 0.0
    }

    /// The label set the input degenerates to, if the batch is pure.
    pub fn pure_labels(&self) -> Option<&Tensor<B, 3, Int>> {
        if self.lambda == 1.0 {
            Some(&self.labels1)
        } else if self.lambda == 0.0 {
            Some(&self.labels2)
        } else {
            None
        }
    }
}
