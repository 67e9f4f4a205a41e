//! Camera viewpoints sampled around an object.
//!
//! A [`ViewSet`] holds every [`CameraPose`] rendered for one asset. Poses are
//! produced by the [`ViewSampler`] from a validated [`ViewSamplingConfig`].

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

pub mod sampler;

pub use sampler::ViewSampler;

/// One sampled viewpoint looking at the object center.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraPose {
    /// Azimuth around the vertical axis in radians, `[0, 2π)`.
    pub yaw: f64,
    /// Elevation in radians, `[-π/2, π/2]`.
    pub pitch: f64,
    /// Distance from the object center to the camera.
    pub radius: f64,
    /// Full field of view in radians.
    pub fov: f64,
    /// Perturbation of the look-at target.
    pub center_jitter: Vector3<f64>,
    /// Perturbation of the camera position.
    pub position_jitter: Vector3<f64>,
}

/// The ordered set of poses rendered for one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewSet {
    /// Framing radius shared by every pose of the set.
    pub base_radius: f64,
    pub poses: Vec<CameraPose>,
}

impl ViewSet {
    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CameraPose> {
        self.poses.iter()
    }

    /// Returns `true` if any pose carries a center or position jitter.
    pub fn has_jitter(&self) -> bool {
        self.poses
            .iter()
            .any(|p| p.center_jitter != Vector3::zeros() || p.position_jitter != Vector3::zeros())
    }
}

/// Parameters controlling how a [`ViewSet`] is sampled.
///
/// Field-of-view bounds are given in degrees, as users usually think about
/// lenses; generated poses carry radians. Setting `radius_min == radius_max`
/// fixes the base radius instead of drawing it per asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewSamplingConfig {
    /// Number of views per asset.
    pub num_views: usize,
    /// Narrowest field of view in degrees.
    pub fov_min: f64,
    /// Widest field of view in degrees.
    pub fov_max: f64,
    /// Lower bound of the base framing radius.
    pub radius_min: f64,
    /// Upper bound of the base framing radius.
    pub radius_max: f64,
    /// Pitches below this value (radians) are folded back above it.
    pub min_pitch: Option<f64>,
    /// Standard deviation of the log-normal radius factor (mean 1).
    pub radius_jitter: Option<f64>,
    /// Standard deviation of each center and position jitter component.
    pub pose_jitter: Option<f64>,
}

impl Default for ViewSamplingConfig {
    fn default() -> Self {
        Self {
            num_views: 150,
            fov_min: 10.0,
            fov_max: 90.0,
            radius_min: 0.35,
            radius_max: 0.6,
            min_pitch: Some(0.0),
            radius_jitter: None,
            pose_jitter: None,
        }
    }
}

impl ViewSamplingConfig {
    /// Checks every parameter, see [`validation::validate_sampling`].
    pub fn validate(&self) -> Result<(), CameraError> {
        validation::validate_sampling(self)
    }

    /// Half field-of-view bounds in radians, `(min, max)`.
    pub fn half_fov_range(&self) -> (f64, f64) {
        (
            self.fov_min.to_radians() / 2.0,
            self.fov_max.to_radians() / 2.0,
        )
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CameraError {
    #[error("Invalid sampling parameters: {0}")]
    InvalidParams(String),
}

/// Common validation functions for sampling parameters
pub mod validation {
    use super::*;

    fn check_std(name: &str, value: Option<f64>) -> Result<(), CameraError> {
        match value {
            Some(s) if !s.is_finite() || s < 0.0 => Err(CameraError::InvalidParams(format!(
                "{name} must be a finite non-negative standard deviation, got {s}"
            ))),
            _ => Ok(()),
        }
    }

    pub fn validate_sampling(config: &ViewSamplingConfig) -> Result<(), CameraError> {
        if config.num_views == 0 {
            return Err(CameraError::InvalidParams(
                "num_views must be greater than zero".to_string(),
            ));
        }
        if !config.fov_min.is_finite() || !config.fov_max.is_finite() {
            return Err(CameraError::InvalidParams(
                "fov bounds must be finite".to_string(),
            ));
        }
        if config.fov_min > config.fov_max {
            return Err(CameraError::InvalidParams(format!(
                "fov_min ({}) must not exceed fov_max ({})",
                config.fov_min, config.fov_max
            )));
        }
        if config.fov_min <= 0.0 || config.fov_max > 180.0 {
            return Err(CameraError::InvalidParams(format!(
                "fov range [{}, {}] must lie within (0, 180] degrees",
                config.fov_min, config.fov_max
            )));
        }
        if !config.radius_min.is_finite() || !config.radius_max.is_finite() {
            return Err(CameraError::InvalidParams(
                "radius bounds must be finite".to_string(),
            ));
        }
        if config.radius_min > config.radius_max {
            return Err(CameraError::InvalidParams(format!(
                "radius_min ({}) must not exceed radius_max ({})",
                config.radius_min, config.radius_max
            )));
        }
        if config.radius_min <= 0.0 {
            return Err(CameraError::InvalidParams(format!(
                "radius_min must be positive, got {}",
                config.radius_min
            )));
        }
        if let Some(p) = config.min_pitch {
            if !p.is_finite() {
                return Err(CameraError::InvalidParams(
                    "min_pitch must be finite".to_string(),
                ));
            }
        }
        check_std("radius_jitter", config.radius_jitter)?;
        check_std("pose_jitter", config.pose_jitter)?;
        Ok(())
    }
}
