//! Implements the camera pose generator.
//!
//! This module provides the [`ViewSampler`], which turns points of the
//! low-discrepancy sphere sequence ([`crate::geometry`]) into full camera
//! poses. Field of view and distance are coupled through a base framing
//! radius `b`: a sphere of radius `b` around the object center exactly fills
//! the frame when `b = radius * sin(fov / 2)`. Sampling therefore happens in
//! that shared parameter space instead of drawing fov and radius separately.

use log::debug;
use nalgebra::Vector3;
use rand::distributions::{Distribution, Uniform};
use rand::Rng;
use rand_distr::{LogNormal, Normal};

use crate::camera::{CameraError, CameraPose, ViewSamplingConfig, ViewSet};
use crate::geometry::sphere_hammersley;

/// Generates [`ViewSet`]s from a validated [`ViewSamplingConfig`].
///
/// The sampler holds no random state. Every call to [`ViewSampler::sample`]
/// receives the generator explicitly, so callers decide how runs are seeded.
///
/// # Examples
///
/// ```rust
/// use multiview_render::camera::{ViewSampler, ViewSamplingConfig};
/// use rand::{rngs::StdRng, SeedableRng};
///
/// let config = ViewSamplingConfig { num_views: 12, ..Default::default() };
/// let sampler = ViewSampler::new(config).unwrap();
///
/// let views = sampler.sample(&mut StdRng::seed_from_u64(7));
/// assert_eq!(views.len(), 12);
/// assert_eq!(views, sampler.sample(&mut StdRng::seed_from_u64(7)));
/// ```
#[derive(Debug, Clone)]
pub struct ViewSampler {
    config: ViewSamplingConfig,
}

impl ViewSampler {
    /// Creates a new [`ViewSampler`], validating the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CameraError::InvalidParams`] if the configuration is rejected by
    /// [`crate::camera::validation::validate_sampling`]. No random number is
    /// drawn before this check.
    pub fn new(config: ViewSamplingConfig) -> Result<Self, CameraError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ViewSamplingConfig {
        &self.config
    }

    /// Radius bounds `(min, max)` reachable for a given base radius.
    ///
    /// The widest fov gives the closest camera and the narrowest fov the
    /// farthest one.
    pub fn radius_bounds(&self, base_radius: f64) -> (f64, f64) {
        let (half_fov_min, half_fov_max) = self.config.half_fov_range();
        (base_radius / half_fov_max.sin(), base_radius / half_fov_min.sin())
    }

    /// Samples one [`ViewSet`].
    ///
    /// Random numbers are drawn in a fixed order (sphere offset, base radius,
    /// then for each view: distance, radius perturbation, center jitter,
    /// position jitter), so the same seeded generator always yields the same
    /// set.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ViewSet {
        let config = &self.config;
        let num_views = config.num_views as u64;

        let offset = (rng.gen::<f64>(), rng.gen::<f64>());
        let base_radius = Uniform::new_inclusive(config.radius_min, config.radius_max).sample(rng);

        // Uniform in 1/r² spreads the subtended solid angle evenly instead of
        // crowding views near the closest distance.
        let (radius_bound_min, radius_bound_max) = self.radius_bounds(base_radius);
        let k_dist = Uniform::new_inclusive(
            1.0 / (radius_bound_max * radius_bound_max),
            1.0 / (radius_bound_min * radius_bound_min),
        );

        let radius_noise = config.radius_jitter.and_then(radius_factor);
        let pose_noise = config.pose_jitter.and_then(|s| Normal::new(0.0, s).ok());

        debug!(
            "Sampling {} views: base radius {:.4}, radius bounds [{:.4}, {:.4}]",
            num_views, base_radius, radius_bound_min, radius_bound_max
        );

        let poses = (0..num_views)
            .map(|i| {
                let (yaw, raw_pitch) = sphere_hammersley(i, num_views, offset);
                let pitch = match config.min_pitch {
                    Some(min_pitch) => (raw_pitch - min_pitch).abs() + min_pitch,
                    None => raw_pitch,
                };

                let k = k_dist.sample(rng);
                let radius = (1.0 / k.sqrt()).clamp(radius_bound_min, radius_bound_max);
                let fov = 2.0 * (base_radius / radius).min(1.0).asin();

                let radius = match &radius_noise {
                    Some(noise) => radius * noise.sample(rng),
                    None => radius,
                };

                let (center_jitter, position_jitter) = match &pose_noise {
                    Some(noise) => (sample_vector(noise, rng), sample_vector(noise, rng)),
                    None => (Vector3::zeros(), Vector3::zeros()),
                };

                CameraPose {
                    yaw,
                    pitch,
                    radius,
                    fov,
                    center_jitter,
                    position_jitter,
                }
            })
            .collect();

        ViewSet { base_radius, poses }
    }
}

/// Log-normal factor with mean 1 and standard deviation `std`, so a
/// perturbed radius stays positive.
fn radius_factor(std: f64) -> Option<LogNormal<f64>> {
    let sigma2 = (1.0 + std * std).ln();
    LogNormal::new(-sigma2 / 2.0, sigma2.sqrt()).ok()
}

fn sample_vector<R: Rng + ?Sized>(noise: &Normal<f64>, rng: &mut R) -> Vector3<f64> {
    Vector3::new(noise.sample(rng), noise.sample(rng), noise.sample(rng))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::f64::consts::PI;

    fn config(num_views: usize) -> ViewSamplingConfig {
        ViewSamplingConfig {
            num_views,
            ..Default::default()
        }
    }

    #[test]
    fn test_sampler_rejects_invalid_config() {
        let result = ViewSampler::new(ViewSamplingConfig {
            num_views: 0,
            ..Default::default()
        });
        assert!(matches!(result, Err(CameraError::InvalidParams(_))));
    }

    #[test]
    fn test_framing_invariant() {
        let sampler = ViewSampler::new(config(200)).unwrap();
        let views = sampler.sample(&mut StdRng::seed_from_u64(1));
        assert_eq!(views.len(), 200);
        for pose in views.iter() {
            assert_relative_eq!(
                views.base_radius,
                pose.radius * (pose.fov / 2.0).sin(),
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn test_fov_and_radius_within_bounds() {
        let cfg = ViewSamplingConfig {
            fov_min: 20.0,
            fov_max: 70.0,
            radius_min: 0.4,
            radius_max: 0.9,
            ..config(300)
        };
        let sampler = ViewSampler::new(cfg.clone()).unwrap();
        for seed in 0..5 {
            let views = sampler.sample(&mut StdRng::seed_from_u64(seed));
            assert!(views.base_radius >= cfg.radius_min && views.base_radius <= cfg.radius_max);
            let (r_min, r_max) = sampler.radius_bounds(views.base_radius);
            for pose in views.iter() {
                assert!(
                    pose.fov >= cfg.fov_min.to_radians() - 1e-9
                        && pose.fov <= cfg.fov_max.to_radians() + 1e-9,
                    "fov {} outside range",
                    pose.fov.to_degrees()
                );
                assert!(
                    pose.radius >= r_min - 1e-9 && pose.radius <= r_max + 1e-9,
                    "radius {} outside [{}, {}]",
                    pose.radius,
                    r_min,
                    r_max
                );
            }
        }
    }

    #[test]
    fn test_same_seed_reproduces_view_set() {
        let cfg = ViewSamplingConfig {
            radius_jitter: Some(0.08),
            pose_jitter: Some(0.08),
            ..config(40)
        };
        let sampler = ViewSampler::new(cfg).unwrap();
        let a = sampler.sample(&mut StdRng::seed_from_u64(42));
        let b = sampler.sample(&mut StdRng::seed_from_u64(42));
        let c = sampler.sample(&mut StdRng::seed_from_u64(43));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_min_pitch_folds_views_upward() {
        let min_pitch = 0.2;
        let cfg = ViewSamplingConfig {
            min_pitch: Some(min_pitch),
            ..config(100)
        };
        let views = ViewSampler::new(cfg)
            .unwrap()
            .sample(&mut StdRng::seed_from_u64(3));
        assert_eq!(views.len(), 100);
        for pose in views.iter() {
            assert!(pose.pitch >= min_pitch, "pitch {} below floor", pose.pitch);
        }

        let unfolded = ViewSampler::new(ViewSamplingConfig {
            min_pitch: None,
            ..config(100)
        })
        .unwrap()
        .sample(&mut StdRng::seed_from_u64(3));
        assert!(unfolded.iter().any(|p| p.pitch < 0.0));
    }

    #[test]
    fn test_yaw_spread() {
        let views = ViewSampler::new(config(64))
            .unwrap()
            .sample(&mut StdRng::seed_from_u64(9));
        for pose in views.iter() {
            assert!(pose.yaw >= 0.0 && pose.yaw < 2.0 * PI);
        }
        let mut quadrants = [0usize; 4];
        for pose in views.iter() {
            quadrants[((pose.yaw / (PI / 2.0)) as usize).min(3)] += 1;
        }
        assert!(quadrants.iter().all(|&q| q == 16), "{:?}", quadrants);
    }

    #[test]
    fn test_radius_jitter_keeps_radius_positive() {
        let cfg = ViewSamplingConfig {
            fov_min: 40.0,
            fov_max: 40.0,
            radius_min: 0.5,
            radius_max: 0.5,
            radius_jitter: Some(0.5),
            ..config(2000)
        };
        let views = ViewSampler::new(cfg)
            .unwrap()
            .sample(&mut StdRng::seed_from_u64(0));
        let nominal = 0.5 / 20.0_f64.to_radians().sin();
        for pose in views.iter() {
            assert!(pose.radius > 0.0, "non-positive radius {}", pose.radius);
            // fov comes from the unperturbed radius.
            assert_relative_eq!(pose.fov, 40.0_f64.to_radians(), epsilon = 1e-9);
        }
        let mean_factor =
            views.iter().map(|p| p.radius / nominal).sum::<f64>() / views.len() as f64;
        assert!(
            (mean_factor - 1.0).abs() < 0.05,
            "mean radius factor {}",
            mean_factor
        );
    }

    #[test]
    fn test_no_jitter_by_default() {
        let views = ViewSampler::new(config(10))
            .unwrap()
            .sample(&mut StdRng::seed_from_u64(0));
        assert!(!views.has_jitter());
    }

    #[test]
    fn test_jitter_is_small_and_centered() {
        let cfg = ViewSamplingConfig {
            pose_jitter: Some(0.08),
            ..config(2000)
        };
        let views = ViewSampler::new(cfg)
            .unwrap()
            .sample(&mut StdRng::seed_from_u64(11));
        assert!(views.has_jitter());
        let mean: Vector3<f64> = views
            .iter()
            .map(|p| p.center_jitter)
            .fold(Vector3::zeros(), |acc, v| acc + v)
            / views.len() as f64;
        assert!(mean.norm() < 0.02, "jitter mean {}", mean);
        assert!(views.iter().all(|p| p.position_jitter.amax() < 0.8));
    }

    #[test]
    fn test_fixed_fov_and_radius() {
        let cfg = ViewSamplingConfig {
            fov_min: 40.0,
            fov_max: 40.0,
            radius_min: 0.5,
            radius_max: 0.5,
            ..config(8)
        };
        let views = ViewSampler::new(cfg)
            .unwrap()
            .sample(&mut StdRng::seed_from_u64(5));
        assert_eq!(views.base_radius, 0.5);
        let expected_radius = 0.5 / 20.0_f64.to_radians().sin();
        for pose in views.iter() {
            assert_relative_eq!(pose.radius, expected_radius, epsilon = 1e-9);
            assert_relative_eq!(pose.fov, 40.0_f64.to_radians(), epsilon = 1e-9);
        }
    }
}
