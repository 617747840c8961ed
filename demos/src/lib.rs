//! Demo applications for `oncoseg-burn`.
//!
//! ## Available Examples
//!
//! - `train`: mixup training of a small network on synthetic lesions with the
//!   focal and boundary losses
//!
//! ## Usage
//!
//! ```bash
//! # Train with defaults
//! cargo run --bin train
//!
//! # Train from a configuration file
//! cargo run --bin train -- --config train_config.json
//!
//! # Train on the GPU
//! cargo run --bin train --features wgpu --no-default-features
//! ```

pub mod backend;
pub mod config;
pub mod data;
pub mod model;

pub use backend::{create_device, SelectedBackend, SelectedDevice, TrainBackend, BACKEND_NAME};
pub use config::TrainingConfig;
pub use data::SyntheticLesions;
pub use model::{TinySegNet, TinySegNetConfig};
