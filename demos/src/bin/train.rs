//! Segmentation training with mixup and a weighted loss registry.
//!
//! Trains a small network on synthetic lesion images with focal cross entropy
//! plus the signed-distance boundary loss. The boundary term is held at zero
//! weight for the first epochs, every few epochs train without mixup, and a
//! diverged loss ends the run.
//!
//! ## Usage
//!
//! ```bash
//! # Train with default configuration
//! cargo run --bin train
//!
//! # Train with a configuration file and overrides
//! cargo run --bin train -- --config train_config.json --num-epochs 5
//!
//! # Log every loss term contribution
//! RUST_LOG=oncoseg_burn=trace cargo run --bin train
//! ```

use anyhow::{ensure, Context, Result};
use burn::{
    optim::AdamConfig,
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
};
use clap::Parser;
use log::info;
use oncoseg_burn::{
    losses::{BoundaryLossConfig, FocalLossConfig, WeightedLossAggregator},
    metrics::DiceAccumulator,
    EpochStats, MixupConfig, MixupSampler, SegmentationLearner,
};
use oncoseg_demos::{
    create_device, SyntheticLesions, TinySegNet, TinySegNetConfig, TrainBackend, TrainingConfig,
    BACKEND_NAME,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override number of epochs
    #[arg(long)]
    num_epochs: Option<usize>,

    /// Override batch size
    #[arg(long)]
    batch_size: Option<usize>,

    /// Override learning rate
    #[arg(long)]
    learning_rate: Option<f64>,

    /// Override mixup probability
    #[arg(long)]
    mixup_prob: Option<f64>,

    /// Override checkpoint path
    #[arg(long)]
    checkpoint_path: Option<PathBuf>,
}

fn main() -> Result<()> {
    pretty_env_logger::init();
    let args = Args::parse();

    let mut config = if let Some(config_path) = &args.config {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;
        serde_json::from_str::<TrainingConfig>(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?
    } else {
        TrainingConfig::default()
    };

    if let Some(num_epochs) = args.num_epochs {
        config.num_epochs = num_epochs;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(learning_rate) = args.learning_rate {
        config.learning_rate = learning_rate;
    }
    if let Some(mixup_prob) = args.mixup_prob {
        config.mixup_prob = mixup_prob;
    }
    if let Some(checkpoint_path) = args.checkpoint_path {
        config.checkpoint_path = checkpoint_path;
    }

    ensure!(config.batch_size > 0, "Batch size must be greater than 0");
    ensure!(config.num_epochs > 0, "Number of epochs must be greater than 0");
    ensure!(config.learning_rate > 0.0, "Learning rate must be positive");
    ensure!(config.image_size >= 6, "Image size must be at least 6");
    ensure!(config.num_classes >= 2, "At least two classes are required");

    println!("Starting training with configuration:");
    println!("  Epochs: {}", config.num_epochs);
    println!("  Batch size: {}", config.batch_size);
    println!("  Learning rate: {}", config.learning_rate);
    println!("  Classes: {}", config.num_classes);
    println!(
        "  Mixup: alpha {} prob {}",
        config.mixup_alpha, config.mixup_prob
    );

    std::fs::create_dir_all(&config.checkpoint_path).with_context(|| {
        format!(
            "Failed to create checkpoint directory at {}",
            config.checkpoint_path.display()
        )
    })?;

    let device = create_device();
    println!("Using backend: {BACKEND_NAME}");

    let losses = create_losses(&config)?;
    println!("{}", losses.describe());

    let model = TinySegNetConfig::new(config.num_classes).init::<TrainBackend>(&device);
    let mut learner =
        SegmentationLearner::new(model, AdamConfig::new().init(), config.learning_rate, losses);

    let mixup = MixupConfig::new()
        .with_alpha(config.mixup_alpha)
        .with_prob(config.mixup_prob)
        .with_seed(Some(config.seed));
    let mut sampler = mixup.init().context("Invalid mixup configuration")?;
    let mut no_mixup = MixupSampler::disabled();

    let mut train_data = SyntheticLesions::new(config.seed, config.image_size, config.num_classes);
    // fixed validation set, regenerated identically every epoch
    let valid_seed = config.seed.wrapping_add(1);

    let dice_head: Vec<String> = (0..config.num_classes).map(|i| format!("Dice_{i}")).collect();
    println!("Hints: Dice_0 is the dice coefficient for all non-zero labels");
    println!(
        "Epoch \t TrainingLoss \t TrainAccuracy \t TestLoss \t {}",
        dice_head.join("\t")
    );

    for epoch in 0..config.num_epochs {
        learner
            .losses_mut()
            .update_weights(config.loss_weights(epoch))
            .context("Failed to update loss weights")?;
        learner.set_learning_rate(config.learning_rate_at(epoch));

        let epoch_sampler = if config.is_pure_epoch(epoch) {
            &mut no_mixup
        } else {
            &mut sampler
        };

        let mut train_stats = EpochStats::new();
        for step in 0..config.batches_per_epoch {
            let first = train_data.batch::<TrainBackend>(config.batch_size, &device);
            let second = train_data.batch::<TrainBackend>(config.batch_size, &device);
            let batch = epoch_sampler.mix(first, second);

            // a diverged loss ends the run
            let output = learner
                .train_batch_mixup(&batch)
                .with_context(|| format!("Training failed at epoch {epoch}, step {step}"))?;
            train_stats.record(&output, batch.pure_labels());
        }

        let mut valid_data =
            SyntheticLesions::new(valid_seed, config.image_size, config.num_classes);
        let mut valid_stats = EpochStats::new();
        let mut dice = DiceAccumulator::new(config.num_classes);
        for _ in 0..config.valid_batches {
            let (inputs, labels) = valid_data.batch::<TrainBackend>(config.batch_size, &device);
            let output = learner
                .test_batch(inputs, labels.clone())
                .context("Validation loss is not finite")?;
            dice.update(output.logits.clone(), labels.clone());
            valid_stats.record(&output, Some(&labels));
        }

        let accuracy = train_stats
            .accuracy()
            .map_or_else(|| "-".to_string(), |a| format!("{a:.4}"));
        let dice_values: Vec<String> = dice.averages().iter().map(|d| format!("{d:.3}")).collect();
        println!(
            "{epoch} \t {:.4} \t {accuracy} \t {:.4} \t {}",
            train_stats.mean_loss(),
            valid_stats.mean_loss(),
            dice_values.join("\t")
        );
        info!(
            "epoch {epoch}: lr {}, weights {:?}",
            learner.learning_rate(),
            learner.losses().weights()
        );
    }

    save_final_model(&config, learner.into_model())?;
    println!("Training completed successfully!");

    Ok(())
}

/// Focal cross entropy plus the boundary loss, in that order.
fn create_losses(config: &TrainingConfig) -> Result<WeightedLossAggregator<TrainBackend>> {
    let focal = FocalLossConfig::new()
        .with_gamma(config.focal_gamma)
        .with_num_classes(Some(config.num_classes))
        .init::<TrainBackend>()
        .context("Invalid focal loss configuration")?;
    let boundary = BoundaryLossConfig::new()
        .with_num_classes(config.num_classes)
        .with_lambda_coeff(config.boundary_lambda)
        .init::<TrainBackend>()
        .context("Invalid boundary loss configuration")?;

    let weights = config.loss_weights(0);
    let losses = WeightedLossAggregator::new()
        .with_term(focal, weights[0])?
        .with_term(boundary, weights[1])?;
    Ok(losses)
}

fn save_final_model(config: &TrainingConfig, model: TinySegNet<TrainBackend>) -> Result<()> {
    let final_model_path = config.checkpoint_path.join("final_model");
    println!("Saving final model to: {}", final_model_path.display());

    model
        .save_file(
            &final_model_path,
            &NamedMpkFileRecorder::<FullPrecisionSettings>::new(),
        )
        .with_context(|| {
            format!(
                "Failed to save final model to {}",
                final_model_path.display()
            )
        })?;

    Ok(())
}
