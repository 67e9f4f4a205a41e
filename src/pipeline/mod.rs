//! The single-asset path: sample views, build the job, render.

use log::info;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::camera::{CameraError, ViewSampler, ViewSamplingConfig};
use crate::job::{check_asset, JobError, RenderJob, RenderParams};
use crate::renderer::{Renderer, RendererError};

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Job(#[from] JobError),
    #[error(transparent)]
    Renderer(#[from] RendererError),
    #[error("Failed to load YAML: {0}")]
    YamlError(String),
    #[error("IO Error: {0}")]
    IOError(String),
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::IOError(err.to_string())
    }
}

impl From<serde_yaml::Error> for PipelineError {
    fn from(err: serde_yaml::Error) -> Self {
        PipelineError::YamlError(err.to_string())
    }
}

/// Everything needed to turn one asset into a render job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    pub sampling: ViewSamplingConfig,
    pub render: RenderParams,
}

impl RenderOptions {
    /// Validates both parameter groups without touching the filesystem.
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.sampling.validate()?;
        self.render.validate()?;
        Ok(())
    }

    /// Loads options from a YAML file. Missing keys keep their defaults.
    ///
    /// ```yaml
    /// sampling:
    ///   num_views: 24
    ///   fov_min: 30
    ///   pose_jitter: 0.08
    /// render:
    ///   resolution: 512
    /// ```
    pub fn load_from_yaml(path: &Path) -> Result<Self, PipelineError> {
        let contents = fs::read_to_string(path)?;
        let options: RenderOptions = serde_yaml::from_str(&contents)?;
        options.validate()?;
        Ok(options)
    }

    pub fn save_to_yaml(&self, path: &Path) -> Result<(), PipelineError> {
        let yaml_string = serde_yaml::to_string(self)?;
        let mut file = fs::File::create(path)?;
        file.write_all(yaml_string.as_bytes())?;
        Ok(())
    }
}

/// Samples the views for `asset` and builds its [`RenderJob`].
///
/// All parameters and the asset itself are checked before the first random
/// draw, and the output directory is only created once they pass.
pub fn prepare_job<R: Rng + ?Sized>(
    asset: &Path,
    output_dir: &Path,
    options: &RenderOptions,
    rng: &mut R,
) -> Result<RenderJob, PipelineError> {
    let sampler = ViewSampler::new(options.sampling.clone())?;
    options.render.validate()?;
    check_asset(asset)?;

    let views = sampler.sample(rng);
    Ok(RenderJob::build(
        asset,
        output_dir,
        views,
        options.render.clone(),
    )?)
}

/// Renders a single asset, returning the job that was executed.
///
/// Errors propagate to the caller unchanged; there is no retry.
pub fn render_asset<R: Rng + ?Sized>(
    asset: &Path,
    output_dir: &Path,
    options: &RenderOptions,
    rng: &mut R,
    renderer: &dyn Renderer,
) -> Result<RenderJob, PipelineError> {
    let job = prepare_job(asset, output_dir, options, rng)?;
    renderer.render(&job)?;
    info!("Rendered {}", asset.display());
    Ok(job)
}
