//! Render job descriptors handed to the external renderer.
//!
//! A [`RenderJob`] bundles an asset, its output directory, the sampled
//! [`ViewSet`] and the shared [`RenderParams`]. Building one checks the asset
//! and prepares the output directory; the renderer only has to read it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::camera::ViewSet;

/// Asset container formats the renderer can import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetFormat {
    Ply,
    Glb,
    Obj,
    /// A Blender scene, opened as the primary scene instead of imported.
    Blend,
}

impl AssetFormat {
    pub const ALL: [AssetFormat; 4] = [
        AssetFormat::Ply,
        AssetFormat::Glb,
        AssetFormat::Obj,
        AssetFormat::Blend,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            AssetFormat::Ply => "ply",
            AssetFormat::Glb => "glb",
            AssetFormat::Obj => "obj",
            AssetFormat::Blend => "blend",
        }
    }

    /// Looks up a format by file extension, ignoring case.
    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.extension().eq_ignore_ascii_case(ext))
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

impl fmt::Display for AssetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ".{}", self.extension())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum JobError {
    #[error("Invalid render parameters: {0}")]
    InvalidParams(String),
    #[error("Unsupported asset format: {0}")]
    UnsupportedFormat(String),
    #[error("Asset does not exist: {0}")]
    MissingAsset(String),
    #[error("IO Error: {0}")]
    Io(String),
}

impl From<std::io::Error> for JobError {
    fn from(err: std::io::Error) -> Self {
        JobError::Io(err.to_string())
    }
}

/// Rendering parameters shared by every asset of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderParams {
    /// Path-tracing samples per pixel.
    pub num_samples: u32,
    /// Width and height of the square output images in pixels.
    pub resolution: u32,
    /// Seed for the renderer's lighting setup, independent of pose sampling.
    pub light_seed: Option<u64>,
    /// Ask the renderer to export the normalized mesh as well.
    pub save_mesh: bool,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            num_samples: 32,
            resolution: 518,
            light_seed: None,
            save_mesh: false,
        }
    }
}

impl RenderParams {
    pub fn validate(&self) -> Result<(), JobError> {
        if self.resolution == 0 {
            return Err(JobError::InvalidParams(
                "resolution must be greater than zero".to_string(),
            ));
        }
        if self.num_samples == 0 {
            return Err(JobError::InvalidParams(
                "num_samples must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Checks that `asset` exists and has a supported extension.
///
/// The format is checked first so an unknown file type is reported as such
/// even when the path is also missing.
pub fn check_asset(asset: &Path) -> Result<AssetFormat, JobError> {
    let format = AssetFormat::from_path(asset)
        .ok_or_else(|| JobError::UnsupportedFormat(asset.display().to_string()))?;
    if !asset.is_file() {
        return Err(JobError::MissingAsset(asset.display().to_string()));
    }
    Ok(format)
}

/// One view as the renderer script reads it from `--views`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewDescriptor {
    pub yaw: f64,
    pub pitch: f64,
    pub radius: f64,
    pub fov: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub center: Option<[f64; 3]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pos_perturbation: Option<[f64; 3]>,
}

/// A fully prepared rendering job for one asset.
#[derive(Debug, Clone)]
pub struct RenderJob {
    /// Absolute path of the input asset.
    pub asset: PathBuf,
    pub format: AssetFormat,
    /// Absolute path of the output directory, created by [`RenderJob::build`].
    pub output_dir: PathBuf,
    pub views: ViewSet,
    pub params: RenderParams,
}

impl RenderJob {
    /// Builds a job, creating `output_dir` and its parents if needed.
    ///
    /// # Errors
    ///
    /// * [`JobError::InvalidParams`] if `params` fail validation.
    /// * [`JobError::UnsupportedFormat`] if the asset extension is unknown.
    /// * [`JobError::MissingAsset`] if the asset does not exist.
    /// * [`JobError::Io`] if the output directory cannot be created.
    ///
    /// Nothing is written to disk unless all checks above pass.
    pub fn build(
        asset: &Path,
        output_dir: &Path,
        views: ViewSet,
        params: RenderParams,
    ) -> Result<Self, JobError> {
        params.validate()?;
        let format = check_asset(asset)?;

        fs::create_dir_all(output_dir).map_err(|e| {
            JobError::Io(format!(
                "Failed to create output directory {}: {e}",
                output_dir.display()
            ))
        })?;

        Ok(RenderJob {
            asset: asset.canonicalize()?,
            format,
            output_dir: output_dir.canonicalize()?,
            views,
            params,
        })
    }

    pub fn view_descriptors(&self) -> Vec<ViewDescriptor> {
        let jitter = self.views.has_jitter();
        self.views
            .iter()
            .map(|pose| ViewDescriptor {
                yaw: pose.yaw,
                pitch: pose.pitch,
                radius: pose.radius,
                fov: pose.fov,
                center: jitter.then(|| pose.center_jitter.into()),
                pos_perturbation: jitter.then(|| pose.position_jitter.into()),
            })
            .collect()
    }

    /// Serializes the views to the JSON array passed with `--views`.
    pub fn views_json(&self) -> Result<String, JobError> {
        serde_json::to_string(&self.view_descriptors())
            .map_err(|e| JobError::InvalidParams(format!("Failed to serialize views: {e}")))
    }
}
