//! The boundary to the external renderer process.
//!
//! The [`Renderer`] trait is the seam between job preparation and the actual
//! rendering. [`BlenderRenderer`] implements it by running Blender in
//! background mode with a render script, blocking until the process exits.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::job::{AssetFormat, RenderJob};

pub mod provision;

#[derive(thiserror::Error, Debug)]
pub enum RendererError {
    #[error("Failed to launch renderer {binary}: {reason}")]
    Launch { binary: String, reason: String },
    #[error("Renderer exited with {0}")]
    NonZeroExit(String),
    #[error("Renderer timed out after {0:?}")]
    Timeout(Duration),
    #[error("Renderer binary not found: {0}")]
    MissingRenderer(String),
    #[error("IO Error: {0}")]
    Io(String),
}

impl From<std::io::Error> for RendererError {
    fn from(err: std::io::Error) -> Self {
        RendererError::Io(err.to_string())
    }
}

/// Trait for anything able to execute a prepared [`RenderJob`].
///
/// Implementations must block until the job has finished and are shared
/// between batch workers.
pub trait Renderer: Send + Sync {
    /// Renders every view of `job` into `job.output_dir`.
    fn render(&self, job: &RenderJob) -> Result<(), RendererError>;
}

/// Location of the renderer and how it is run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Path to the Blender executable.
    pub binary: PathBuf,
    /// Python script Blender runs for each job.
    pub script: PathBuf,
    /// Forward the renderer's stdout instead of discarding it.
    pub verbose: bool,
    /// Kill the renderer and fail the job after this many seconds.
    pub timeout_secs: Option<u64>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from(provision::DEFAULT_BLENDER_PATH),
            script: PathBuf::from("blender_script/render.py"),
            verbose: false,
            timeout_secs: None,
        }
    }
}

impl RendererConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs jobs through Blender.
#[derive(Debug, Clone)]
pub struct BlenderRenderer {
    config: RendererConfig,
    timeout: Option<Duration>,
}

impl BlenderRenderer {
    pub fn new(config: RendererConfig) -> Self {
        let timeout = config.timeout();
        Self { config, timeout }
    }

    /// Overrides the configured timeout, e.g. for sub-second limits.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Builds the argument list passed to the renderer binary.
    ///
    /// A `.blend` asset is also given as the first positional argument, so
    /// Blender opens it as the scene before running the script.
    pub fn command_args(&self, job: &RenderJob) -> Result<Vec<OsString>, RendererError> {
        let views = job
            .views_json()
            .map_err(|e| RendererError::Io(e.to_string()))?;

        let mut args: Vec<OsString> = Vec::new();
        if job.format == AssetFormat::Blend {
            args.push(job.asset.clone().into());
        }
        args.push("-b".into());
        args.push("-P".into());
        args.push(self.config.script.clone().into());
        args.push("--".into());
        args.push("--views".into());
        args.push(views.into());
        args.push("--object".into());
        args.push(job.asset.clone().into());
        args.push("--output_folder".into());
        args.push(job.output_dir.clone().into());
        args.push("--resolution".into());
        args.push(job.params.resolution.to_string().into());
        args.push("--num_samples".into());
        args.push(job.params.num_samples.to_string().into());
        if let Some(seed) = job.params.light_seed {
            args.push("--seed".into());
            args.push(seed.to_string().into());
        }
        if job.params.save_mesh {
            args.push("--save_mesh".into());
        }
        Ok(args)
    }

    fn wait(&self, child: &mut Child) -> Result<ExitStatus, RendererError> {
        let Some(timeout) = self.timeout else {
            return Ok(child.wait()?);
        };

        let start = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if start.elapsed() >= timeout {
                // The child may exit between try_wait and kill.
                let _ = child.kill();
                let _ = child.wait();
                return Err(RendererError::Timeout(timeout));
            }
            thread::sleep(POLL_INTERVAL.min(timeout));
        }
    }
}

impl Renderer for BlenderRenderer {
    fn render(&self, job: &RenderJob) -> Result<(), RendererError> {
        let args = self.command_args(job)?;
        debug!("Running {} {:?}", self.config.binary.display(), args);
        info!(
            "Rendering {} views of {} into {}",
            job.views.len(),
            job.asset.display(),
            job.output_dir.display()
        );

        let stdout = if self.config.verbose {
            Stdio::inherit()
        } else {
            Stdio::null()
        };
        let mut child = Command::new(&self.config.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .spawn()
            .map_err(|e| RendererError::Launch {
                binary: self.config.binary.display().to_string(),
                reason: e.to_string(),
            })?;

        let status = self.wait(&mut child)?;
        if status.success() {
            Ok(())
        } else {
            Err(RendererError::NonZeroExit(status.to_string()))
        }
    }
}
