//! Configuration for the training demo.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for the synthetic-lesion training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Number of training epochs.
    pub num_epochs: usize,
    /// Training batches drawn per epoch.
    pub batches_per_epoch: usize,
    /// Validation batches evaluated per epoch.
    pub valid_batches: usize,
    /// Batch size.
    pub batch_size: usize,
    /// Side length of the square images.
    pub image_size: usize,
    /// Number of classes, background included.
    pub num_classes: usize,
    /// Learning rate for Adam.
    pub learning_rate: f64,
    /// Learning rate decay applied every `lr_decay_every` epochs.
    pub lr_decay: f64,
    pub lr_decay_every: usize,
    /// Focusing exponent of the focal loss.
    pub focal_gamma: f32,
    /// Registry weight of the focal loss.
    pub focal_weight: f32,
    /// Registry weight of the boundary loss once warm-up is over.
    pub boundary_weight: f32,
    /// Epochs during which the boundary loss weight is held at zero.
    pub boundary_warmup_epochs: usize,
    /// Global scale of the boundary loss.
    pub boundary_lambda: f32,
    /// Mixup Beta shape parameter.
    pub mixup_alpha: f64,
    /// Probability of mixing a step.
    pub mixup_prob: f64,
    /// Every n-th epoch trains without mixup (0 disables the rule).
    pub pure_epoch_every: usize,
    /// Seed for data generation and mixup draws.
    pub seed: u64,
    /// Where the final model is written.
    pub checkpoint_path: PathBuf,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            num_epochs: 20,
            batches_per_epoch: 16,
            valid_batches: 4,
            batch_size: 4,
            image_size: 32,
            num_classes: 3,
            learning_rate: 1e-2,
            lr_decay: 0.5,
            lr_decay_every: 8,
            focal_gamma: 2.0,
            focal_weight: 1.0,
            boundary_weight: 1.0,
            boundary_warmup_epochs: 2,
            boundary_lambda: 0.001,
            mixup_alpha: 0.4,
            mixup_prob: 0.5,
            pure_epoch_every: 5,
            seed: 42,
            checkpoint_path: PathBuf::from("checkpoints"),
        }
    }
}

impl TrainingConfig {
    /// Loss weights for `epoch`: `[focal, boundary]`.
    pub fn loss_weights(&self, epoch: usize) -> Vec<f32> {
        let boundary = if epoch < self.boundary_warmup_epochs {
            0.0
        } else {
            self.boundary_weight
        };
        vec![self.focal_weight, boundary]
    }

    /// Learning rate for `epoch` under the step decay schedule.
    pub fn learning_rate_at(&self, epoch: usize) -> f64 {
        if self.lr_decay_every == 0 {
            return self.learning_rate;
        }
        let steps = (epoch / self.lr_decay_every) as i32;
        self.learning_rate * self.lr_decay.powi(steps)
    }

    /// Whether mixup is switched off for `epoch`.
    pub const fn is_pure_epoch(&self, epoch: usize) -> bool {
        self.pure_epoch_every != 0 && epoch % self.pure_epoch_every == 0
    }
}
