//! Binary morphology and distance transforms for segmentation masks
//!
//! This crate provides the mask operations that loss functions need but that
//! tensor frameworks do not ship: binary dilation with an arbitrary structuring
//! element and the exact Euclidean distance transform.
//!
//! Every operation treats the **two trailing axes** of the input shape as the
//! spatial plane. Any leading axes (batch, depth, ...) only enumerate
//! independent 2-D slices, so a `[N, D, H, W]` volume is processed as `N * D`
//! separate `[H, W]` images.

mod dilation;
mod distance;

pub use dilation::{binary_dilation, StructuringElement};
pub use distance::euclidean_distance_transform;

/// Splits a shape into the number of independent 2-D slices and the
/// `(height, width)` of each slice.
///
/// # Panics
///
/// Panics if `shape` has fewer than two axes or if its element count differs
/// from `len`.
pub(crate) fn plane_layout(shape: &[usize], len: usize) -> (usize, usize, usize) {
    assert!(
        shape.len() >= 2,
        "Mask must have at least two (spatial) axes, got shape {shape:?}"
    );
    let numel: usize = shape.iter().product();
    assert_eq!(
        numel, len,
        "Mask length {len} does not match shape {shape:?} ({numel} elements)"
    );

    let height = shape[shape.len() - 2];
    let width = shape[shape.len() - 1];
    let slices = shape[..shape.len() - 2].iter().product();
    (slices, height, width)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plane_layout_leading_axes() {
        assert_eq!(plane_layout(&[2, 3, 4, 5], 120), (6, 4, 5));
        assert_eq!(plane_layout(&[4, 5], 20), (1, 4, 5));
    }

    #[test]
    #[should_panic(expected = "at least two")]
    fn test_plane_layout_rejects_1d() {
        plane_layout(&[5], 5);
    }

    #[test]
    fn test_dilation_then_distance_ring() {
        // A single seed pixel dilated by the 3x3 square becomes a 3x3 block;
        // distances are then measured to that block.
        let mut mask = vec![false; 49];
        mask[3 * 7 + 3] = true;
        let dilated = binary_dilation(&mask, &[7, 7], &StructuringElement::square3());
        assert_eq!(dilated.iter().filter(|v| **v).count(), 9);

        let not_block: Vec<bool> = dilated.iter().map(|v| !v).collect();
        let dist = euclidean_distance_transform(&not_block, &[7, 7]);
        assert_eq!(dist[3 * 7 + 3], 0.0);
        assert!((dist[3 * 7] - 2.0).abs() < 1e-6);
    }
}
