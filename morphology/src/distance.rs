//! Exact Euclidean distance transform.
//!
//! Separable lower-envelope algorithm of Felzenszwalb & Huttenlocher
//! ("Distance Transforms of Sampled Functions"): one 1-D squared distance
//! pass along rows followed by one along columns, `O(H * W)` per slice.

use crate::plane_layout;

/// Stand-in for "no seed on this line"; finite so the parabola intersection
/// arithmetic never produces `inf - inf`.
const FAR: f64 = 1e20;

/// Euclidean distance transform over the two trailing axes of `input`.
///
/// Follows the `scipy.ndimage.distance_transform_edt` convention: every
/// `true` element receives the distance to the nearest `false` element of its
/// slice, every `false` element receives `0.0`.
///
/// A slice that contains no `false` element has no defined distance; all of
/// its elements are set to `f32::INFINITY`. Callers decide how to treat it.
///
/// # Panics
///
/// Panics if `shape` has fewer than two axes or does not match `input.len()`.
pub fn euclidean_distance_transform(input: &[bool], shape: &[usize]) -> Vec<f32> {
    let (slices, height, width) = plane_layout(shape, input.len());
    let plane = height * width;
    let mut out = vec![0.0f32; input.len()];

    let line = height.max(width);
    let mut f = vec![0.0f64; line];
    let mut d = vec![0.0f64; line];
    let mut v = vec![0usize; line];
    let mut z = vec![0.0f64; line + 1];
    let mut sq = vec![0.0f64; plane];

    for s in 0..slices {
        let src = &input[s * plane..(s + 1) * plane];
        let dst = &mut out[s * plane..(s + 1) * plane];

        if src.iter().all(|&v| v) {
            dst.fill(f32::INFINITY);
            continue;
        }

        for (cell, &value) in sq.iter_mut().zip(src) {
            *cell = if value { FAR } else { 0.0 };
        }

        // rows
        for y in 0..height {
            let row = &mut sq[y * width..(y + 1) * width];
            f[..width].copy_from_slice(row);
            squared_distance_1d(&f[..width], &mut d[..width], &mut v, &mut z);
            row.copy_from_slice(&d[..width]);
        }

        // columns
        for x in 0..width {
            for y in 0..height {
                f[y] = sq[y * width + x];
            }
            squared_distance_1d(&f[..height], &mut d[..height], &mut v, &mut z);
            for y in 0..height {
                sq[y * width + x] = d[y];
            }
        }

        for (cell, &value) in dst.iter_mut().zip(&sq) {
            *cell = libm::sqrt(value) as f32;
        }
    }

    out
}

/// 1-D squared distance transform of the sampled function `f` into `d`.
///
/// `v` holds the parabola vertices of the lower envelope and `z` the
/// boundaries between them; both are scratch buffers of length `>= f.len()`
/// and `>= f.len() + 1`.
fn squared_distance_1d(f: &[f64], d: &mut [f64], v: &mut [usize], z: &mut [f64]) {
    let n = f.len();
    if n == 0 {
        return;
    }

    let intersect = |q: usize, p: usize| -> f64 {
        let (qf, pf) = (q as f64, p as f64);
        ((f[q] + qf * qf) - (f[p] + pf * pf)) / (2.0 * qf - 2.0 * pf)
    };

    let mut k = 0usize;
    v[0] = 0;
    z[0] = f64::NEG_INFINITY;
    z[1] = f64::INFINITY;

    for q in 1..n {
        let mut s = intersect(q, v[k]);
        while s <= z[k] {
            k -= 1;
            s = intersect(q, v[k]);
        }
        k += 1;
        v[k] = q;
        z[k] = s;
        z[k + 1] = f64::INFINITY;
    }

    k = 0;
    for (q, out) in d.iter_mut().enumerate().take(n) {
        while z[k + 1] < q as f64 {
            k += 1;
        }
        let dq = q as f64 - v[k] as f64;
        *out = dq * dq + f[v[k]];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Brute-force reference: distance from each `true` pixel to the nearest `false`.
    fn brute_force(input: &[bool], height: usize, width: usize) -> Vec<f32> {
        let zeros: Vec<(usize, usize)> = (0..height * width)
            .filter(|&i| !input[i])
            .map(|i| (i / width, i % width))
            .collect();
        (0..height * width)
            .map(|i| {
                let (y, x) = (i / width, i % width);
                zeros
                    .iter()
                    .map(|&(zy, zx)| {
                        let dy = y as f32 - zy as f32;
                        let dx = x as f32 - zx as f32;
                        dy.hypot(dx)
                    })
                    .fold(f32::INFINITY, f32::min)
            })
            .collect()
    }

    #[test]
    fn test_single_background_pixel() {
        let mut input = vec![true; 25];
        input[0] = false;
        let out = euclidean_distance_transform(&input, &[5, 5]);
        assert_eq!(out[0], 0.0);
        assert!((out[4] - 4.0).abs() < 1e-6);
        assert!((out[24] - 32.0f32.sqrt()).abs() < 1e-5);
    }

    #[test]
    fn test_matches_brute_force() {
        let (h, w) = (9, 11);
        // deterministic scattered pattern of background pixels
        let input: Vec<bool> = (0..h * w).map(|i| (i * 7 + i / 3) % 13 != 0).collect();
        let out = euclidean_distance_transform(&input, &[h, w]);
        let reference = brute_force(&input, h, w);
        for (a, b) in out.iter().zip(&reference) {
            assert!((a - b).abs() < 1e-4, "{a} vs {b}");
        }
    }

    #[test]
    fn test_no_background_is_infinite() {
        let out = euclidean_distance_transform(&[true; 6], &[2, 3]);
        assert!(out.iter().all(|v| v.is_infinite()));
    }

    #[test]
    fn test_leading_axes_are_independent_slices() {
        let mut input = vec![true; 2 * 4 * 4];
        input[0] = false; // first slice: corner
        input[16 + 15] = false; // second slice: opposite corner
        let out = euclidean_distance_transform(&input, &[2, 4, 4]);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[16 + 15], 0.0);
        assert!((out[15] - 18.0f32.sqrt()).abs() < 1e-5);
        assert!((out[16] - 18.0f32.sqrt()).abs() < 1e-5);
    }
}
