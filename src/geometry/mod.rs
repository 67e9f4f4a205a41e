//! Low-discrepancy point sets on the unit sphere.
//!
//! The camera sampler places its viewpoints with a Hammersley sequence mapped
//! onto the sphere. Compared with independent uniform draws, consecutive
//! indices of the sequence fill the sphere evenly, so even a handful of views
//! covers every side of the object.

use std::f64::consts::PI;

/// Prime bases used by the Halton sequence, one per dimension.
pub const PRIMES: [u32; 16] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53];

/// Computes the radical inverse of `n` in the given `base`.
///
/// The digits of `n` written in `base` are mirrored around the radix point,
/// e.g. `radical_inverse(2, 6)` is `0b0.011 = 0.375`.
pub fn radical_inverse(base: u32, mut n: u64) -> f64 {
    let base_u64 = u64::from(base);
    let inv_base = 1.0 / f64::from(base);
    let mut inv_base_n = inv_base;
    let mut val = 0.0;
    while n > 0 {
        let digit = n % base_u64;
        val += digit as f64 * inv_base_n;
        n /= base_u64;
        inv_base_n *= inv_base;
    }
    val
}

/// Returns the `n`-th point of the `dim`-dimensional Halton sequence.
///
/// # Panics
///
/// Panics if `dim` exceeds the number of tabulated [`PRIMES`].
pub fn halton(dim: usize, n: u64) -> Vec<f64> {
    PRIMES[..dim]
        .iter()
        .map(|&base| radical_inverse(base, n))
        .collect()
}

/// Returns the `n`-th of `num_samples` points of the `dim`-dimensional
/// Hammersley set: `n / num_samples` followed by a `(dim - 1)`-dimensional
/// Halton point.
pub fn hammersley(dim: usize, n: u64, num_samples: u64) -> Vec<f64> {
    let mut point = Vec::with_capacity(dim);
    point.push(n as f64 / num_samples as f64);
    point.extend(halton(dim.saturating_sub(1), n));
    point
}

/// Maps the `n`-th of `num_samples` Hammersley points onto the unit sphere.
///
/// `offset` is a 2D shift in `[0, 1)²` drawn once per run. The first
/// component shifts the latitude coordinate by less than one stratum
/// (`offset.0 / num_samples`), the second rotates the longitude coordinate
/// with wraparound, so the shifted set keeps its even coverage.
///
/// # Returns
///
/// `(yaw, pitch)` in radians with `yaw ∈ [0, 2π)` and `pitch ∈ [-π/2, π/2]`.
///
/// # Examples
///
/// ```rust
/// use multiview_render::geometry::sphere_hammersley;
///
/// let (yaw, pitch) = sphere_hammersley(0, 8, (0.0, 0.0));
/// assert_eq!(yaw, 0.0);
/// assert!((pitch + std::f64::consts::FRAC_PI_2).abs() < 1e-12);
/// ```
pub fn sphere_hammersley(n: u64, num_samples: u64, offset: (f64, f64)) -> (f64, f64) {
    let point = hammersley(2, n, num_samples);
    let u = (point[0] + offset.0 / num_samples as f64).clamp(0.0, 1.0);
    let v = (point[1] + offset.1).rem_euclid(1.0);

    let pitch = (1.0 - 2.0 * u).acos() - PI / 2.0;
    let yaw = v * 2.0 * PI;
    (yaw, pitch)
}

/// Samples all `num_samples` sphere points for the given offset.
pub fn sphere_hammersley_set(num_samples: u64, offset: (f64, f64)) -> Vec<(f64, f64)> {
    (0..num_samples)
        .map(|i| sphere_hammersley(i, num_samples, offset))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_radical_inverse() {
        assert_eq!(radical_inverse(2, 0), 0.0);
        assert_relative_eq!(radical_inverse(2, 1), 0.5);
        assert_relative_eq!(radical_inverse(2, 6), 0.375);
        assert_relative_eq!(radical_inverse(3, 5), 7.0 / 9.0);
    }

    #[test]
    fn test_hammersley_first_coordinate_is_stratified() {
        let n = 16;
        for i in 0..n {
            let p = hammersley(3, i, n);
            assert_eq!(p.len(), 3);
            assert_relative_eq!(p[0], i as f64 / n as f64);
        }
    }

    #[test]
    fn test_sphere_points_are_distinct() {
        for &n in &[1_u64, 2, 7, 64, 150] {
            let points = sphere_hammersley_set(n, (0.37, 0.81));
            assert_eq!(points.len(), n as usize);
            for i in 0..points.len() {
                for j in (i + 1)..points.len() {
                    let (a, b) = (points[i], points[j]);
                    assert!(
                        (a.0 - b.0).abs() > 1e-9 || (a.1 - b.1).abs() > 1e-9,
                        "Points {} and {} coincide for n = {}",
                        i,
                        j,
                        n
                    );
                }
            }
        }
    }

    #[test]
    fn test_sphere_points_in_range() {
        let points = sphere_hammersley_set(500, (0.999, 0.999));
        for (yaw, pitch) in points {
            assert!((0.0..2.0 * PI).contains(&yaw), "yaw out of range: {}", yaw);
            assert!(
                (-PI / 2.0..=PI / 2.0).contains(&pitch),
                "pitch out of range: {}",
                pitch
            );
        }
    }

    #[test]
    fn test_yaw_coverage_is_even() {
        // Low-discrepancy yaw values fill equal-width bins almost exactly.
        let n = 256;
        let bins = 8;
        let mut counts = vec![0usize; bins];
        for (yaw, _) in sphere_hammersley_set(n, (0.25, 0.6)) {
            let bin = ((yaw / (2.0 * PI)) * bins as f64) as usize;
            counts[bin.min(bins - 1)] += 1;
        }
        let expected = n as f64 / bins as f64;
        for (bin, &count) in counts.iter().enumerate() {
            assert!(
                (count as f64 - expected).abs() <= 2.0,
                "Bin {} has {} points, expected about {}",
                bin,
                count,
                expected
            );
        }
    }

    #[test]
    fn test_sphere_discrepancy_against_uniform() {
        // Fraction of points above a latitude should match the spherical cap
        // area (1 - sin(lat)) / 2 much more tightly than random sampling.
        let n = 400;
        let points = sphere_hammersley_set(n, (0.5, 0.1));
        let mut worst: f64 = 0.0;
        for k in 1..10 {
            let lat = -PI / 2.0 + PI * k as f64 / 10.0;
            let above = points.iter().filter(|(_, p)| *p > lat).count() as f64 / n as f64;
            let expected = (1.0 - lat.sin()) / 2.0;
            worst = worst.max((above - expected).abs());
        }
        assert!(worst < 0.01, "Latitude discrepancy too large: {}", worst);
    }

    #[test]
    fn test_sphere_sampling_is_deterministic() {
        let a = sphere_hammersley_set(32, (0.3, 0.7));
        let b = sphere_hammersley_set(32, (0.3, 0.7));
        assert_eq!(a, b);
    }
}
