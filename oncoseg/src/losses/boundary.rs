//! Boundary loss for highly unbalanced segmentation.
//!
//! Kervadec et al., "Boundary loss for highly unbalanced segmentation"
//! (<https://arxiv.org/abs/1812.07032>). Each foreground class is turned into a
//! signed distance field, positive outside the class and negative inside, and
//! the loss is the mean of `probability * field`: probability mass outside the
//! boundary is penalized, mass inside is rewarded.
//!
//! Morphology and distance transforms only run over the two trailing (H, W)
//! axes. Volumes `[N, D, H, W]` are handled slice by slice; no 3-D distance
//! is ever computed.

use burn::{
    prelude::*,
    tensor::{activation::softmax, backend::Backend, Int, Tensor, TensorData},
};
use log::debug;
use oncoseg_morph::{binary_dilation, euclidean_distance_transform, StructuringElement};

use super::{check_logits_labels, resolve_class_weights, LossTerm, Reduction};
use crate::error::{OncoSegError, OncoSegResult};

/// Builds per-class signed distance fields from integer label maps.
#[derive(Debug, Clone)]
pub struct DistanceFieldBuilder {
    structuring_element: StructuringElement,
}

impl Default for DistanceFieldBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DistanceFieldBuilder {
    /// Builder with the 3x3 square structuring element.
    pub fn new() -> Self {
        Self {
            structuring_element: StructuringElement::square3(),
        }
    }

    /// Builder with a custom structuring element for the boundary extraction.
    pub const fn with_structuring_element(structuring_element: StructuringElement) -> Self {
        Self {
            structuring_element,
        }
    }

    /// Signed distance field of `class` for a single `[height, width]` slice.
    ///
    /// The boundary is the one-pixel inner rim of the class region. Pixels
    /// outside the class get `+distance` to that rim, interior pixels get
    /// `-distance`, rim pixels get `0`.
    ///
    /// Returns an all-zero field when the class is absent, and also when the
    /// class covers the whole slice (no rim, so no finite distance exists).
    pub fn signed_distance(&self, labels: &[i64], [height, width]: [usize; 2], class: i64) -> Vec<f32> {
        let shape = [height, width];
        let in_class: Vec<bool> = labels.iter().map(|&l| l == class).collect();
        if !in_class.iter().any(|&v| v) {
            return vec![0.0; labels.len()];
        }

        let not_class: Vec<bool> = in_class.iter().map(|v| !v).collect();
        let dilated = binary_dilation(&not_class, &shape, &self.structuring_element);
        let boundary: Vec<bool> = dilated
            .iter()
            .zip(&in_class)
            .map(|(&d, &c)| d && c)
            .collect();
        if !boundary.iter().any(|&v| v) {
            return vec![0.0; labels.len()];
        }

        let off_boundary: Vec<bool> = boundary.iter().map(|v| !v).collect();
        let distance = euclidean_distance_transform(&off_boundary, &shape);

        distance
            .iter()
            .enumerate()
            .map(|(i, &d)| {
                let inside = in_class[i] ^ boundary[i];
                let sign = f32::from(u8::from(not_class[i])) - f32::from(u8::from(inside));
                d * sign
            })
            .collect()
    }

    /// Signed distance fields of `class` for every sample of a label batch `[N, H, W]`.
    pub fn signed_distance_batch<B: Backend>(
        &self,
        labels: Tensor<B, 3, Int>,
        class: usize,
    ) -> Tensor<B, 3> {
        let [n, h, w] = labels.dims();
        let device = labels.device();
        let host = labels_to_host(labels);
        let field = self.fields_for_class(&host, n, [h, w], class);
        Tensor::from_data(TensorData::new(field, [n, h, w]), &device)
    }

    /// Signed distance fields of `class` for a volume batch `[N, D, H, W]`.
    ///
    /// Each depth slice is treated as an independent 2-D image.
    pub fn signed_distance_volume<B: Backend>(
        &self,
        labels: Tensor<B, 4, Int>,
        class: usize,
    ) -> Tensor<B, 4> {
        let [n, d, h, w] = labels.dims();
        let device = labels.device();
        let host = labels_to_host(labels);
        let field = self.fields_for_class(&host, n * d, [h, w], class);
        Tensor::from_data(TensorData::new(field, [n, d, h, w]), &device)
    }

    /// Explicit loop over the `slices` leading 2-D planes of `labels`.
    fn fields_for_class(
        &self,
        labels: &[i64],
        slices: usize,
        plane: [usize; 2],
        class: usize,
    ) -> Vec<f32> {
        let size = plane[0] * plane[1];
        let mut field = Vec::with_capacity(labels.len());

        for s in 0..slices {
            let slice = &labels[s * size..(s + 1) * size];
            if !slice.contains(&(class as i64)) {
                debug!("class {class} absent from slice {s}; boundary term contributes zero");
                field.extend(std::iter::repeat(0.0).take(size));
                continue;
            }
            field.extend(self.signed_distance(slice, plane, class as i64));
        }

        field
    }
}

fn labels_to_host<B: Backend, const D: usize>(labels: Tensor<B, D, Int>) -> Vec<i64> {
    labels.into_data().iter::<i64>().collect()
}

/// Configuration for [`BoundaryDistanceLoss`].
#[derive(Config, Debug)]
pub struct BoundaryLossConfig {
    /// Global scale applied after reduction.
    #[config(default = 0.001)]
    pub lambda_coeff: f32,
    /// Number of classes `K`, background included.
    #[config(default = 2)]
    pub num_classes: usize,
    /// Optional per-class weights of length `K` (default all ones).
    #[config(default = "None")]
    pub class_weights: Option<Vec<f32>>,
    /// Reduction over the batch.
    #[config(default = "Reduction::Mean")]
    pub reduction: Reduction,
}

impl BoundaryLossConfig {
    /// Initialize a boundary loss, validating the class weights.
    pub fn init<B: Backend>(&self) -> OncoSegResult<BoundaryDistanceLoss<B>> {
        if self.num_classes < 2 {
            return Err(OncoSegError::InvalidConfiguration {
                reason: format!(
                    "Boundary loss needs at least 2 classes, got {}",
                    self.num_classes
                ),
            });
        }
        if !self.lambda_coeff.is_finite() {
            return Err(OncoSegError::InvalidConfiguration {
                reason: format!("lambda_coeff must be finite, got {}", self.lambda_coeff),
            });
        }
        let class_weights = resolve_class_weights(
            self.class_weights.as_deref(),
            self.num_classes,
            "boundary class weights",
        )?;

        Ok(BoundaryDistanceLoss {
            lambda_coeff: self.lambda_coeff,
            num_classes: self.num_classes,
            class_weights,
            reduction: self.reduction,
            builder: DistanceFieldBuilder::new(),
            _phantom: std::marker::PhantomData,
        })
    }
}

/// Signed-distance boundary loss over class probability maps.
///
/// Class 0 is background and never penalized.
#[derive(Debug, Clone)]
pub struct BoundaryDistanceLoss<B: Backend> {
    lambda_coeff: f32,
    num_classes: usize,
    class_weights: Vec<f32>,
    reduction: Reduction,
    builder: DistanceFieldBuilder,
    _phantom: std::marker::PhantomData<B>,
}

impl<B: Backend> BoundaryDistanceLoss<B> {
    /// Number of classes the loss was configured for.
    pub const fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Per-class weights, background included.
    pub fn class_weights(&self) -> &[f32] {
        &self.class_weights
    }

    /// Calculate the boundary loss.
    ///
    /// # Arguments
    /// * `probabilities` - Softmax output with shape [N, K, H, W]
    /// * `labels` - Class index per pixel with shape [N, H, W]
    ///
    /// # Returns
    /// Loss of shape [1], or [N] with `Reduction::None`
    pub fn forward(&self, probabilities: Tensor<B, 4>, labels: Tensor<B, 3, Int>) -> Tensor<B, 1> {
        self.assertions(probabilities.dims(), labels.dims());

        let [n, _, h, w] = probabilities.dims();
        let host = labels_to_host(labels);
        self.accumulate(probabilities.reshape([n, self.num_classes, h * w]), &host, n, [h, w])
    }

    /// Calculate the boundary loss for volumes.
    ///
    /// # Arguments
    /// * `probabilities` - Softmax output with shape [N, K, D, H, W]
    /// * `labels` - Class index per voxel with shape [N, D, H, W]
    ///
    /// Distance fields are computed per depth slice; the per-sample mean runs
    /// over the whole volume.
    pub fn forward_volume(
        &self,
        probabilities: Tensor<B, 5>,
        labels: Tensor<B, 4, Int>,
    ) -> Tensor<B, 1> {
        let [n, k, d, h, w] = probabilities.dims();
        let [ln, ld, lh, lw] = labels.dims();
        assert_eq!(
            [n, d, h, w],
            [ln, ld, lh, lw],
            "Probabilities and labels must share batch and spatial dims"
        );
        assert_eq!(k, self.num_classes, "Probability channels must equal K");

        let host = labels_to_host(labels);
        // Slices are laid out sample-major, so [N * D, H * W] regroups as [N, D * H * W].
        self.accumulate(probabilities.reshape([n, k, d * h * w]), &host, n * d, [h, w])
    }

    /// Shared class loop: `probabilities` is [N, K, S] with S spatial elements
    /// per sample, `labels` holds `slices` planes of `plane` elements.
    fn accumulate(
        &self,
        probabilities: Tensor<B, 3>,
        labels: &[i64],
        slices: usize,
        plane: [usize; 2],
    ) -> Tensor<B, 1> {
        let [n, _, spatial] = probabilities.dims();
        let device = probabilities.device();
        let mut per_sample = Tensor::<B, 1>::zeros([n], &device);

        for class in 1..self.num_classes {
            let field = self.builder.fields_for_class(labels, slices, plane, class);
            let field = Tensor::<B, 2>::from_data(TensorData::new(field, [n, spatial]), &device);

            let prob = probabilities.clone().narrow(1, class, 1).reshape([n, spatial]);
            let class_term = (prob * field).mean_dim(1).reshape([n]);
            per_sample = per_sample + class_term * self.class_weights[class];
        }

        self.reduction.apply(per_sample) * self.lambda_coeff
    }

    fn assertions(&self, probabilities: [usize; 4], labels: [usize; 3]) {
        if let Err(err) = check_logits_labels(probabilities, labels) {
            panic!("{err}");
        }
        assert_eq!(
            probabilities[1], self.num_classes,
            "Probability channels must equal the configured class count"
        );
    }
}

impl<B: Backend> LossTerm<B> for BoundaryDistanceLoss<B> {
    fn name(&self) -> String {
        "BoundaryDistanceLoss".to_string()
    }

    fn loss(&self, logits: Tensor<B, 4>, labels: Tensor<B, 3, Int>) -> Tensor<B, 1> {
        self.forward(softmax(logits, 1), labels)
    }
}
