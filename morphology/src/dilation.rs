//! Binary dilation with a small structuring element.

use crate::plane_layout;

/// Structuring element for binary morphology.
///
/// The kernel is stored row-major; the anchor is the kernel cell that is
/// aligned with the output pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuringElement {
    kernel: Vec<bool>,
    height: usize,
    width: usize,
    anchor: (usize, usize),
}

impl StructuringElement {
    /// Create a structuring element from a row-major kernel, anchored at its center.
    ///
    /// # Panics
    ///
    /// Panics if `kernel.len() != height * width` or the kernel is empty.
    pub fn new(kernel: Vec<bool>, height: usize, width: usize) -> Self {
        assert!(height > 0 && width > 0, "Structuring element must not be empty");
        assert_eq!(
            kernel.len(),
            height * width,
            "Kernel length must equal height * width"
        );
        Self {
            kernel,
            height,
            width,
            anchor: (height / 2, width / 2),
        }
    }

    /// Full 3x3 square (8-neighbourhood).
    pub fn square3() -> Self {
        Self::new(vec![true; 9], 3, 3)
    }

    /// 3x3 cross (4-neighbourhood).
    pub fn cross3() -> Self {
        Self::new(
            vec![false, true, false, true, true, true, false, true, false],
            3,
            3,
        )
    }

    /// Kernel dimensions as `[height, width]`.
    pub const fn dims(&self) -> [usize; 2] {
        [self.height, self.width]
    }

    /// Offsets `(dy, dx)` of the active kernel cells relative to the anchor.
    fn offsets(&self) -> Vec<(isize, isize)> {
        let (ay, ax) = self.anchor;
        (0..self.height)
            .flat_map(|ky| (0..self.width).map(move |kx| (ky, kx)))
            .filter(|&(ky, kx)| self.kernel[ky * self.width + kx])
            .map(|(ky, kx)| (ky as isize - ay as isize, kx as isize - ax as isize))
            .collect()
    }
}

/// Binary dilation over the two trailing axes of `mask`.
///
/// Pixels beyond the image border count as `false`, so a region touching the
/// border does not grow from outside the image.
///
/// # Panics
///
/// Panics if `shape` has fewer than two axes or does not match `mask.len()`.
pub fn binary_dilation(
    mask: &[bool],
    shape: &[usize],
    structuring_element: &StructuringElement,
) -> Vec<bool> {
    let (slices, height, width) = plane_layout(shape, mask.len());
    let offsets = structuring_element.offsets();
    let plane = height * width;
    let mut out = vec![false; mask.len()];

    for s in 0..slices {
        let src = &mask[s * plane..(s + 1) * plane];
        let dst = &mut out[s * plane..(s + 1) * plane];

        for y in 0..height {
            for x in 0..width {
                // Reflected kernel: output is set when any source pixel whose
                // translated element covers (y, x) is set.
                dst[y * width + x] = offsets.iter().any(|&(dy, dx)| {
                    let sy = y as isize - dy;
                    let sx = x as isize - dx;
                    sy >= 0
                        && sx >= 0
                        && (sy as usize) < height
                        && (sx as usize) < width
                        && src[sy as usize * width + sx as usize]
                });
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&str]) -> Vec<bool> {
        rows.iter()
            .flat_map(|r| r.chars().map(|c| c == '#'))
            .collect()
    }

    #[test]
    fn test_square_dilation_grows_by_one() {
        let mask = grid(&[".....", ".....", "..#..", ".....", "....."]);
        let out = binary_dilation(&mask, &[5, 5], &StructuringElement::square3());
        let expected = grid(&[".....", ".###.", ".###.", ".###.", "....."]);
        assert_eq!(out, expected);
    }

    #[test]
    fn test_cross_dilation() {
        let mask = grid(&[".....", ".....", "..#..", ".....", "....."]);
        let out = binary_dilation(&mask, &[5, 5], &StructuringElement::cross3());
        let expected = grid(&[".....", "..#..", ".###.", "..#..", "....."]);
        assert_eq!(out, expected);
    }

    #[test]
    fn test_border_counts_as_false() {
        let mask = grid(&["###", "###", "###"]);
        let not_mask: Vec<bool> = mask.iter().map(|v| !v).collect();
        let out = binary_dilation(&not_mask, &[3, 3], &StructuringElement::square3());
        assert!(out.iter().all(|v| !v));
    }

    #[test]
    fn test_slices_are_independent() {
        let mut mask = vec![false; 2 * 9];
        mask[4] = true; // center of first slice only
        let out = binary_dilation(&mask, &[2, 3, 3], &StructuringElement::square3());
        assert!(out[..9].iter().all(|v| *v));
        assert!(out[9..].iter().all(|v| !v));
    }
}
