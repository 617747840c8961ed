//! Segmentation metrics for the epoch summary.

use burn::tensor::{backend::Backend, ElementConversion, Int, Tensor};

/// Correctly classified pixels and total pixels of a batch.
///
/// # Arguments
/// * `logits` - Class scores with shape [N, K, H, W]
/// * `labels` - Class index per pixel with shape [N, H, W]
pub fn pixel_accuracy_counts<B: Backend>(
    logits: Tensor<B, 4>,
    labels: Tensor<B, 3, Int>,
) -> (usize, usize) {
    let [n, _, h, w] = logits.dims();
    let predicted = logits.argmax(1).squeeze::<3>(1);
    let correct = predicted
        .equal(labels)
        .int()
        .sum()
        .into_scalar()
        .elem::<i64>();
    (correct.max(0) as usize, n * h * w)
}

/// Running per-class Dice coefficients.
///
/// Index 0 holds the Dice of all non-zero classes collapsed into one
/// foreground; index `k > 0` holds the Dice of class `k`. A sample only
/// contributes to an index when that foreground is present in its label.
#[derive(Debug, Clone)]
pub struct DiceAccumulator {
    sums: Vec<f64>,
    counts: Vec<usize>,
}

impl DiceAccumulator {
    /// Empty accumulator for `num_classes` classes, background included.
    pub fn new(num_classes: usize) -> Self {
        Self {
            sums: vec![0.0; num_classes],
            counts: vec![0; num_classes],
        }
    }

    /// Number of Dice entries.
    pub fn num_classes(&self) -> usize {
        self.sums.len()
    }

    /// Add every sample of a batch.
    pub fn update<B: Backend>(&mut self, logits: Tensor<B, 4>, labels: Tensor<B, 3, Int>) {
        let [n, k, h, w] = logits.dims();
        assert_eq!(k, self.num_classes(), "Dice class count does not match logits");

        let predicted: Vec<i64> = logits
            .argmax(1)
            .into_data()
            .iter::<i64>()
            .collect();
        let labels: Vec<i64> = labels.into_data().iter::<i64>().collect();

        let plane = h * w;
        for sample in 0..n {
            let range = sample * plane..(sample + 1) * plane;
            let pred = &predicted[range.clone()];
            let gt = &labels[range];

            if let Some(dice) = dice(pred, gt, |v| v != 0) {
                self.sums[0] += dice;
                self.counts[0] += 1;
            }
            for class in 1..k as i64 {
                if let Some(dice) = dice(pred, gt, |v| v == class) {
                    self.sums[class as usize] += dice;
                    self.counts[class as usize] += 1;
                }
            }
        }
    }

    /// `sum / (count + 1e-8)` per index.
    pub fn averages(&self) -> Vec<f64> {
        self.sums
            .iter()
            .zip(&self.counts)
            .map(|(sum, count)| sum / (*count as f64 + 1e-8))
            .collect()
    }

    /// Samples counted per index.
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// Clear all sums and counts.
    pub fn reset(&mut self) {
        self.sums.iter_mut().for_each(|s| *s = 0.0);
        self.counts.iter_mut().for_each(|c| *c = 0);
    }
}

/// `2|P ∩ G| / (|P| + |G|)`, or `None` when the foreground is absent from `gt`.
fn dice(pred: &[i64], gt: &[i64], foreground: impl Fn(i64) -> bool) -> Option<f64> {
    let mut intersection = 0usize;
    let mut pred_count = 0usize;
    let mut gt_count = 0usize;

    for (&p, &g) in pred.iter().zip(gt) {
        let (p, g) = (foreground(p), foreground(g));
        pred_count += usize::from(p);
        gt_count += usize::from(g);
        intersection += usize::from(p && g);
    }

    (gt_count > 0).then(|| 2.0 * intersection as f64 / (pred_count + gt_count) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    /// Logits whose argmax is `classes` for a 3-class problem.
    fn one_hot_logits(classes: [[i64; 2]; 2]) -> Tensor<TestBackend, 4> {
        let mut data = vec![0.0f32; 3 * 4];
        for (i, class) in classes.iter().flatten().enumerate() {
            data[*class as usize * 4 + i] = 5.0;
        }
        Tensor::<TestBackend, 1>::from_floats(data.as_slice(), &Default::default())
            .reshape([1, 3, 2, 2])
    }

    #[test]
    fn test_pixel_accuracy_counts() {
        let logits = one_hot_logits([[0, 1], [2, 2]]);
        let labels = Tensor::<TestBackend, 3, Int>::from_ints([[[0, 1], [1, 2]]], &Default::default());
        assert_eq!(pixel_accuracy_counts(logits, labels), (3, 4));
    }

    #[test]
    fn test_dice_per_class() {
        let mut acc = DiceAccumulator::new(3);
        let logits = one_hot_logits([[0, 1], [1, 2]]);
        let labels = Tensor::<TestBackend, 3, Int>::from_ints([[[0, 1], [2, 2]]], &Default::default());
        acc.update(logits, labels);

        let avg = acc.averages();
        // foreground: pred {1,2,3}, gt {1,2,3}
        assert!((avg[0] - 1.0).abs() < 1e-6);
        // class 1: pred {1,2}, gt {1}
        assert!((avg[1] - 2.0 / 3.0).abs() < 1e-6);
        // class 2: pred {3}, gt {2,3}
        assert!((avg[2] - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(acc.counts(), &[1, 1, 1]);
    }

    #[test]
    fn test_absent_class_not_counted() {
        let mut acc = DiceAccumulator::new(3);
        let logits = one_hot_logits([[0, 2], [0, 0]]);
        let labels = Tensor::<TestBackend, 3, Int>::from_ints([[[0, 1], [0, 0]]], &Default::default());
        acc.update(logits, labels);

        assert_eq!(acc.counts(), &[1, 1, 0]);
        let avg = acc.averages();
        assert!((avg[0] - 1.0).abs() < 1e-6);
        assert_eq!(avg[1], 0.0);
        assert_eq!(avg[2], 0.0);

        acc.reset();
        assert_eq!(acc.counts(), &[0, 0, 0]);
    }
}
