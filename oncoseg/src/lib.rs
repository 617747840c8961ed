//! Multi-objective segmentation losses for Burn.
//!
//! Boundary-aware signed-distance loss, focal and class-weighted cross
//! entropy, a weighted aggregator that supports loss-level mixup, and a small
//! step driver that refuses to apply updates from a diverged loss.
//!
//! ```rust,ignore
//! use oncoseg_burn::losses::{BoundaryLossConfig, FocalLossConfig, WeightedLossAggregator};
//!
//! let losses = WeightedLossAggregator::<B>::new()
//!     .with_term(FocalLossConfig::new().init()?, 1.0)?
//!     .with_term(BoundaryLossConfig::new().with_num_classes(4).init()?, 1.0)?;
//! let loss = losses.compute_mixed(logits, labels1, labels2, lambda);
//! ```

mod error;
pub mod losses;
pub mod metrics;
pub mod mixup;
pub mod training;

pub use error::{ensure_finite, OncoSegError, OncoSegResult};
pub use losses::{LossTerm, Reduction};
pub use mixup::{blend_inputs, MixupBatch, MixupConfig, MixupSampler};
pub use training::{EpochStats, SegmentationLearner, SegmentationModel, StepOutput};
