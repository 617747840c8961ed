//! Single-step training and evaluation driver.
//!
//! [`SegmentationLearner`] runs forward, loss aggregation, backward and the
//! optimizer update strictly in sequence. A step whose aggregated loss is not
//! finite is rejected before backward and leaves the parameters untouched.

use burn::{
    module::AutodiffModule,
    optim::{GradientsParams, Optimizer},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Int, Tensor,
    },
};
use log::warn;

use crate::{
    error::{ensure_finite, OncoSegResult},
    losses::WeightedLossAggregator,
    metrics::pixel_accuracy_counts,
    mixup::MixupBatch,
};

/// A network mapping an input batch `[N, C, H, W]` to class logits `[N, K, H, W]`.
pub trait SegmentationModel<B: Backend> {
    /// Class logits for `inputs`.
    fn forward(&self, inputs: Tensor<B, 4>) -> Tensor<B, 4>;
}

/// Result of one training or evaluation step.
#[derive(Debug, Clone)]
pub struct StepOutput<B: Backend> {
    /// Aggregated loss of the step.
    pub loss: f64,
    /// Network output, detached from the graph.
    pub logits: Tensor<B, 4>,
}

/// Owns a model, its optimizer and the weighted loss registry.
pub struct SegmentationLearner<B, M, O>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + SegmentationModel<B>,
    O: Optimizer<M, B>,
{
    model: M,
    optim: O,
    learning_rate: f64,
    losses: WeightedLossAggregator<B>,
}

impl<B, M, O> SegmentationLearner<B, M, O>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + SegmentationModel<B>,
    O: Optimizer<M, B>,
{
    /// Learner over `model` with a fixed learning rate until changed.
    pub fn new(model: M, optim: O, learning_rate: f64, losses: WeightedLossAggregator<B>) -> Self {
        Self {
            model,
            optim,
            learning_rate,
            losses,
        }
    }

    /// Current model.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Consume the learner, returning the trained model.
    pub fn into_model(self) -> M {
        self.model
    }

    /// The loss registry.
    pub fn losses(&self) -> &WeightedLossAggregator<B> {
        &self.losses
    }

    /// Mutable access to the loss registry, e.g. to anneal weights between steps.
    pub fn losses_mut(&mut self) -> &mut WeightedLossAggregator<B> {
        &mut self.losses
    }

    /// Learning rate used by the next step.
    pub const fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Change the learning rate, e.g. for step decay.
    pub fn set_learning_rate(&mut self, learning_rate: f64) {
        self.learning_rate = learning_rate;
    }

    /// One optimizer step against a single label set.
    pub fn train_batch(
        &mut self,
        inputs: Tensor<B, 4>,
        labels: Tensor<B, 3, Int>,
    ) -> OncoSegResult<StepOutput<B>> {
        let logits = self.model.forward(inputs);
        let loss = self.losses.compute_single(logits.clone(), labels);
        self.optimize(logits, loss)
    }

    /// One optimizer step on a blended batch with two label sets.
    pub fn train_batch_mixup(&mut self, batch: &MixupBatch<B>) -> OncoSegResult<StepOutput<B>> {
        let logits = self.model.forward(batch.inputs.clone());
        let loss = self.losses.compute_mixed(
            logits.clone(),
            batch.labels1.clone(),
            batch.labels2.clone(),
            batch.lambda,
        );
        self.optimize(logits, loss)
    }

    /// Evaluate a batch without touching the parameters.
    ///
    /// The forward pass runs on the inner backend through
    /// [`AutodiffModule::valid`], so no gradient graph is recorded. The logits
    /// are moved back untracked for the loss registry.
    pub fn test_batch(
        &self,
        inputs: Tensor<B, 4>,
        labels: Tensor<B, 3, Int>,
    ) -> OncoSegResult<StepOutput<B>>
    where
        M::InnerModule: SegmentationModel<B::InnerBackend>,
    {
        let model = self.model.valid();
        let logits = Tensor::from_inner(model.forward(inputs.inner()));
        let loss = self.losses.compute_single(logits.clone(), labels);
        let loss = ensure_finite(scalar(loss))?;
        Ok(StepOutput { loss, logits })
    }

    fn optimize(&mut self, logits: Tensor<B, 4>, loss: Tensor<B, 1>) -> OncoSegResult<StepOutput<B>> {
        // per-sample losses are summed, never averaged twice
        let loss = loss.sum();
        let value = ensure_finite(scalar(loss.clone())).inspect_err(|err| {
            warn!("{err}; skipping the parameter update");
        })?;

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.model);
        self.model = self.optim.step(self.learning_rate, self.model.clone(), grads);

        Ok(StepOutput {
            loss: value,
            logits: logits.detach(),
        })
    }
}

fn scalar<B: Backend>(loss: Tensor<B, 1>) -> f64 {
    loss.sum().into_scalar().elem::<f64>()
}

/// Running loss and pixel accuracy over an epoch.
#[derive(Debug, Clone, Default)]
pub struct EpochStats {
    loss_sum: f64,
    batches: usize,
    correct: usize,
    total: usize,
}

impl EpochStats {
    /// Empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a step. `accuracy_labels` is the label set the input
    /// degenerates to, or `None` for a blended step.
    pub fn record<B: Backend>(
        &mut self,
        output: &StepOutput<B>,
        accuracy_labels: Option<&Tensor<B, 3, Int>>,
    ) {
        self.loss_sum += output.loss;
        self.batches += 1;

        if let Some(labels) = accuracy_labels {
            let (correct, total) = pixel_accuracy_counts(output.logits.clone(), labels.clone());
            self.correct += correct;
            self.total += total;
        }
    }

    /// Number of recorded steps.
    pub fn batches(&self) -> usize {
        self.batches
    }

    /// Mean step loss, `0` when nothing was recorded.
    pub fn mean_loss(&self) -> f64 {
        if self.batches == 0 {
            0.0
        } else {
            self.loss_sum / self.batches as f64
        }
    }

    /// Pixel accuracy over the pure steps; `None` if there were none.
    pub fn accuracy(&self) -> Option<f64> {
        (self.total > 0).then(|| self.correct as f64 / self.total as f64)
    }
}
