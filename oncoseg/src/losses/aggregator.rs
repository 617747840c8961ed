//! Weighted combination of loss terms, for plain and mixup batches.

use core::fmt;

use burn::tensor::{backend::Backend, ElementConversion, Int, Tensor};
use log::trace;
use serde::{Deserialize, Serialize};

use super::LossTerm;
use crate::error::{OncoSegError, OncoSegResult};

/// Per-term weights of a [`WeightedLossAggregator`], in registration order.
///
/// A plain value: clone it to hand the same weights to every replica of a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossWeights(pub Vec<f32>);

impl LossWeights {
    /// Weights in registration order.
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Number of weights.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no weight is held.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<f32>> for LossWeights {
    fn from(weights: Vec<f32>) -> Self {
        Self(weights)
    }
}

/// A loss term together with its weight.
pub struct RegisteredLoss<B: Backend> {
    term: Box<dyn LossTerm<B>>,
    weight: f32,
}

impl<B: Backend> RegisteredLoss<B> {
    /// Name reported by the term.
    pub fn name(&self) -> String {
        self.term.name()
    }

    /// Current weight of the term.
    pub const fn weight(&self) -> f32 {
        self.weight
    }
}

impl<B: Backend> fmt::Debug for RegisteredLoss<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredLoss")
            .field("term", &self.term.name())
            .field("weight", &self.weight)
            .finish()
    }
}

/// Ordered registry of weighted loss terms.
///
/// The combined loss is `Σ weight_i · term_i`. Terms whose weight is zero are
/// not evaluated at all. The aggregator does not check the result for
/// finiteness; that is left to the caller (see [`crate::ensure_finite`]).
pub struct WeightedLossAggregator<B: Backend> {
    terms: Vec<RegisteredLoss<B>>,
}

impl<B: Backend> Default for WeightedLossAggregator<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> fmt::Debug for WeightedLossAggregator<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.terms.iter()).finish()
    }
}

impl<B: Backend> WeightedLossAggregator<B> {
    /// Empty registry.
    pub const fn new() -> Self {
        Self { terms: Vec::new() }
    }

    /// Append a term to the registry.
    pub fn add_term<T>(&mut self, term: T, weight: f32) -> OncoSegResult<()>
    where
        T: LossTerm<B> + 'static,
    {
        check_weight(weight)?;
        self.terms.push(RegisteredLoss {
            term: Box::new(term),
            weight,
        });
        Ok(())
    }

    /// Builder form of [`Self::add_term`].
    pub fn with_term<T>(mut self, term: T, weight: f32) -> OncoSegResult<Self>
    where
        T: LossTerm<B> + 'static,
    {
        self.add_term(term, weight)?;
        Ok(self)
    }

    /// Replace the whole weight vector.
    ///
    /// The registry is left untouched when the new weights are rejected.
    pub fn update_weights(&mut self, weights: impl Into<LossWeights>) -> OncoSegResult<()> {
        let weights = weights.into();
        if weights.len() != self.terms.len() {
            return Err(OncoSegError::WeightLengthMismatch {
                context: "loss term weights".to_string(),
                expected: self.terms.len(),
                actual: weights.len(),
            });
        }
        for weight in weights.as_slice() {
            check_weight(*weight)?;
        }

        for (registered, weight) in self.terms.iter_mut().zip(weights.0) {
            registered.weight = weight;
        }
        Ok(())
    }

    /// Snapshot of the current weights.
    pub fn weights(&self) -> LossWeights {
        LossWeights(self.terms.iter().map(|t| t.weight).collect())
    }

    /// Registered terms in order.
    pub fn terms(&self) -> &[RegisteredLoss<B>] {
        &self.terms
    }

    /// Number of registered terms, zero-weight ones included.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Whether no term is registered.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// One line listing every term and its weight.
    pub fn describe(&self) -> String {
        let listing: Vec<String> = self
            .terms
            .iter()
            .map(|t| format!("{} x {}", t.term.name(), t.weight))
            .collect();
        format!("Loss functions: [{}]", listing.join(", "))
    }

    /// Combined loss against a single label set.
    pub fn compute_single(&self, logits: Tensor<B, 4>, labels: Tensor<B, 3, Int>) -> Tensor<B, 1> {
        let device = logits.device();
        sum_contributions(self.contributions(logits, &[(labels, 1.0)]), &device)
    }

    /// Combined loss for a mixup batch.
    ///
    /// Each active term contributes `w · (λ · term(labels1) + (1 − λ) · term(labels2))`;
    /// a branch whose factor is exactly zero is not evaluated. `lambda` must lie
    /// in `[0, 1]`; debug builds panic otherwise.
    pub fn compute_mixed(
        &self,
        logits: Tensor<B, 4>,
        labels1: Tensor<B, 3, Int>,
        labels2: Tensor<B, 3, Int>,
        lambda: f64,
    ) -> Tensor<B, 1> {
        let device = logits.device();
        let branches = mixup_branches(labels1, labels2, lambda);
        sum_contributions(self.contributions(logits, &branches), &device)
    }

    /// [`Self::compute_single`] plus the weighted contribution of every evaluated term.
    pub fn compute_single_detailed(
        &self,
        logits: Tensor<B, 4>,
        labels: Tensor<B, 3, Int>,
    ) -> (Tensor<B, 1>, Vec<(String, f64)>) {
        let device = logits.device();
        detailed(self.contributions(logits, &[(labels, 1.0)]), &device)
    }

    /// [`Self::compute_mixed`] plus the weighted contribution of every evaluated term.
    pub fn compute_mixed_detailed(
        &self,
        logits: Tensor<B, 4>,
        labels1: Tensor<B, 3, Int>,
        labels2: Tensor<B, 3, Int>,
        lambda: f64,
    ) -> (Tensor<B, 1>, Vec<(String, f64)>) {
        let device = logits.device();
        let branches = mixup_branches(labels1, labels2, lambda);
        detailed(self.contributions(logits, &branches), &device)
    }

    fn contributions(
        &self,
        logits: Tensor<B, 4>,
        branches: &[(Tensor<B, 3, Int>, f64)],
    ) -> Vec<(String, Tensor<B, 1>)> {
        let mut out = Vec::with_capacity(self.terms.len());

        for registered in self.terms.iter().filter(|t| t.weight != 0.0) {
            let mut term_total: Option<Tensor<B, 1>> = None;

            for (labels, scale) in branches {
                if *scale == 0.0 {
                    continue;
                }
                let factor = f64::from(registered.weight) * scale;
                trace!("{} weighted by {factor}", registered.term.name());

                let value = registered
                    .term
                    .loss(logits.clone(), labels.clone())
                    .mul_scalar(factor);
                term_total = Some(match term_total {
                    Some(acc) => acc + value,
                    None => value,
                });
            }

            if let Some(value) = term_total {
                out.push((registered.term.name(), value));
            }
        }

        out
    }
}

fn mixup_branches<B: Backend>(
    labels1: Tensor<B, 3, Int>,
    labels2: Tensor<B, 3, Int>,
    lambda: f64,
) -> [(Tensor<B, 3, Int>, f64); 2] {
    debug_assert!(
        (0.0..=1.0).contains(&lambda),
        "Mixup lambda must lie in [0, 1], got {lambda}"
    );
    [(labels1, lambda), (labels2, 1.0 - lambda)]
}

fn check_weight(weight: f32) -> OncoSegResult<()> {
    if !weight.is_finite() || weight < 0.0 {
        return Err(OncoSegError::InvalidConfiguration {
            reason: format!("Loss term weights must be finite and non-negative, got {weight}"),
        });
    }
    Ok(())
}

fn sum_contributions<B: Backend>(
    contributions: Vec<(String, Tensor<B, 1>)>,
    device: &B::Device,
) -> Tensor<B, 1> {
    contributions
        .into_iter()
        .map(|(_, value)| value)
        .reduce(|acc, value| acc + value)
        .unwrap_or_else(|| Tensor::zeros([1], device))
}

fn detailed<B: Backend>(
    contributions: Vec<(String, Tensor<B, 1>)>,
    device: &B::Device,
) -> (Tensor<B, 1>, Vec<(String, f64)>) {
    let details = contributions
        .iter()
        .map(|(name, value)| (name.clone(), value.clone().sum().into_scalar().elem::<f64>()))
        .collect();
    (sum_contributions(contributions, device), details)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::losses::{BoundaryLossConfig, FocalLossConfig};
    use burn::{backend::NdArray, tensor::TensorData};

    type TestBackend = NdArray<f32>;

    /// Returns a fixed value that depends on the first label, so the two
    /// mixup branches can be told apart.
    struct LabelEcho;

    impl LossTerm<TestBackend> for LabelEcho {
        fn name(&self) -> String {
            "LabelEcho".to_string()
        }

        fn loss(
            &self,
            _logits: Tensor<TestBackend, 4>,
            labels: Tensor<TestBackend, 3, Int>,
        ) -> Tensor<TestBackend, 1> {
            labels.float().mean().add_scalar(1.0)
        }
    }

    /// Fails the test if it is ever evaluated.
    struct MustNotRun;

    impl LossTerm<TestBackend> for MustNotRun {
        fn name(&self) -> String {
            "MustNotRun".to_string()
        }

        fn loss(
            &self,
            _logits: Tensor<TestBackend, 4>,
            _labels: Tensor<TestBackend, 3, Int>,
        ) -> Tensor<TestBackend, 1> {
            panic!("zero-weight term was evaluated");
        }
    }

    fn logits() -> Tensor<TestBackend, 4> {
        Tensor::from_floats(
            [[[[1.0, 0.5], [-0.5, 2.0]], [[0.0, 1.0], [1.5, -1.0]]]],
            &Default::default(),
        )
    }

    fn labels(values: [[i64; 2]; 2]) -> Tensor<TestBackend, 3, Int> {
        Tensor::from_ints([values], &Default::default())
    }

    fn value(t: Tensor<TestBackend, 1>) -> f64 {
        t.into_scalar().elem::<f64>()
    }

    /// Two samples, two classes, 5x5 pixels.
    fn lesion_logits() -> Tensor<TestBackend, 4> {
        let values: Vec<f32> = (0..100)
            .map(|i| ((i * 37 % 17) as f32 - 8.0) / 4.0)
            .collect();
        Tensor::from_data(TensorData::new(values, [2, 2, 5, 5]), &Default::default())
    }

    /// A square lesion of side `side` at the top-left corner `origin` of every sample.
    fn lesion_labels(origin: usize, side: usize) -> Tensor<TestBackend, 3, Int> {
        let values: Vec<i64> = (0..50)
            .map(|i| {
                let (row, col) = ((i % 25) / 5, i % 5);
                let inside = (origin..origin + side).contains(&row)
                    && (origin..origin + side).contains(&col);
                i64::from(inside)
            })
            .collect();
        Tensor::from_data(TensorData::new(values, [2, 5, 5]), &Default::default())
    }

    #[test]
    fn test_zero_weight_terms_are_skipped() {
        let aggregator = WeightedLossAggregator::<TestBackend>::new()
            .with_term(LabelEcho, 2.0)
            .unwrap()
            .with_term(MustNotRun, 0.0)
            .unwrap();

        let single = value(aggregator.compute_single(logits(), labels([[0, 0], [0, 0]])));
        assert!((single - 2.0).abs() < 1e-6);

        let mixed = value(aggregator.compute_mixed(
            logits(),
            labels([[0, 0], [0, 0]]),
            labels([[1, 1], [1, 1]]),
            0.5,
        ));
        assert!((mixed - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_mixed_with_lambda_one_equals_single() {
        let aggregator = WeightedLossAggregator::<TestBackend>::new()
            .with_term(FocalLossConfig::new().init::<TestBackend>().unwrap(), 1.0)
            .unwrap()
            .with_term(BoundaryLossConfig::new().init::<TestBackend>().unwrap(), 1.0)
            .unwrap()
            .with_term(MustNotRun, 0.0)
            .unwrap();

        let l1 = labels([[0, 1], [1, 0]]);
        // never evaluated: its branch factor is zero
        let l2 = labels([[1, 1], [1, 1]]);

        let single = value(aggregator.compute_single(logits(), l1.clone()));
        let mixed = value(aggregator.compute_mixed(logits(), l1, l2, 1.0));
        assert!((single - mixed).abs() < 1e-6);
    }

    #[test]
    fn test_mixed_is_linear_in_lambda() {
        let aggregator = WeightedLossAggregator::<TestBackend>::new()
            .with_term(FocalLossConfig::new().init::<TestBackend>().unwrap(), 0.7)
            .unwrap();

        let l1 = labels([[0, 1], [1, 0]]);
        let l2 = labels([[1, 0], [0, 0]]);
        let lambda = 0.3;

        let a = value(aggregator.compute_single(logits(), l1.clone()));
        let b = value(aggregator.compute_single(logits(), l2.clone()));
        let mixed = value(aggregator.compute_mixed(logits(), l1, l2, lambda));

        assert!((mixed - (lambda * a + (1.0 - lambda) * b)).abs() < 1e-5);
    }

    #[test]
    fn test_single_is_weighted_sum_of_terms() {
        let focal = FocalLossConfig::new().init::<TestBackend>().unwrap();
        let boundary = BoundaryLossConfig::new().init::<TestBackend>().unwrap();
        let aggregator = WeightedLossAggregator::<TestBackend>::new()
            .with_term(focal.clone(), 0.7)
            .unwrap()
            .with_term(boundary.clone(), 1.3)
            .unwrap();

        let labels = lesion_labels(1, 3);
        let combined = value(aggregator.compute_single(lesion_logits(), labels.clone()));
        let expected = 0.7 * value(focal.loss(lesion_logits(), labels.clone()))
            + 1.3 * value(boundary.loss(lesion_logits(), labels));

        assert!(expected != 0.0);
        assert!((combined - expected).abs() < 1e-5, "{combined} vs {expected}");
    }

    #[test]
    fn test_mixed_with_lambda_zero_equals_second_labels() {
        let aggregator = WeightedLossAggregator::<TestBackend>::new()
            .with_term(FocalLossConfig::new().init::<TestBackend>().unwrap(), 0.7)
            .unwrap()
            .with_term(BoundaryLossConfig::new().init::<TestBackend>().unwrap(), 1.3)
            .unwrap();

        let l1 = lesion_labels(0, 2);
        let l2 = lesion_labels(1, 3);

        let single = value(aggregator.compute_single(lesion_logits(), l2.clone()));
        let mixed = value(aggregator.compute_mixed(lesion_logits(), l1, l2, 0.0));
        assert!((single - mixed).abs() < 1e-6, "{single} vs {mixed}");
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "Mixup lambda must lie in [0, 1]")]
    fn test_mixed_rejects_lambda_out_of_range() {
        let aggregator = WeightedLossAggregator::<TestBackend>::new()
            .with_term(LabelEcho, 1.0)
            .unwrap();
        let _ = aggregator.compute_mixed(
            logits(),
            labels([[0, 0], [0, 0]]),
            labels([[1, 1], [1, 1]]),
            1.5,
        );
    }

    #[test]
    fn test_update_weights_length_mismatch() {
        let mut aggregator = WeightedLossAggregator::<TestBackend>::new()
            .with_term(LabelEcho, 1.0)
            .unwrap()
            .with_term(LabelEcho, 1.0)
            .unwrap();

        let result = aggregator.update_weights(vec![1.0, 0.5, 0.1]);
        assert!(matches!(
            result,
            Err(OncoSegError::WeightLengthMismatch {
                expected: 2,
                actual: 3,
                ..
            })
        ));
        assert_eq!(aggregator.weights(), LossWeights(vec![1.0, 1.0]));

        assert!(aggregator.update_weights(vec![1.0, -0.5]).is_err());

        aggregator.update_weights(vec![1.0, 0.0]).unwrap();
        assert_eq!(aggregator.weights().as_slice(), &[1.0, 0.0]);
    }

    #[test]
    fn test_empty_registry_yields_zero() {
        let aggregator = WeightedLossAggregator::<TestBackend>::new();
        let result = aggregator.compute_single(logits(), labels([[0, 1], [1, 0]]));
        assert_eq!(result.dims(), [1]);
        assert_eq!(value(result), 0.0);
    }

    #[test]
    fn test_detailed_reports_active_terms() {
        let aggregator = WeightedLossAggregator::<TestBackend>::new()
            .with_term(LabelEcho, 2.0)
            .unwrap()
            .with_term(MustNotRun, 0.0)
            .unwrap();

        let (total, details) = aggregator.compute_mixed_detailed(
            logits(),
            labels([[1, 1], [1, 1]]),
            labels([[0, 0], [0, 0]]),
            0.25,
        );

        assert_eq!(details.len(), 1);
        assert_eq!(details[0].0, "LabelEcho");
        // 2 * (0.25 * 2 + 0.75 * 1)
        assert!((details[0].1 - 2.5).abs() < 1e-6);
        assert!((value(total) - 2.5).abs() < 1e-6);
    }

    #[test]
    fn test_describe_lists_terms() {
        let aggregator = WeightedLossAggregator::<TestBackend>::new()
            .with_term(LabelEcho, 1.0)
            .unwrap()
            .with_term(MustNotRun, 0.5)
            .unwrap();
        assert_eq!(
            aggregator.describe(),
            "Loss functions: [LabelEcho x 1, MustNotRun x 0.5]"
        );
    }
}
