//! Multiview Render Library
//!
//! Prepares multi-view rendering jobs for 3D assets and dispatches them to an
//! external renderer. The library provides:
//! - A low-discrepancy sphere sampler (Hammersley sequence)
//! - A camera pose generator coupling field of view and distance
//! - Render job descriptors and the Blender invocation adapter
//! - A batch dispatcher rendering whole asset folders on a worker pool
//!
//! The single-asset path lives in [`pipeline`], the multi-asset path in
//! [`batch`].

pub mod batch;
pub mod camera;
pub mod geometry;
pub mod job;
pub mod pipeline;
pub mod renderer;

// Re-export commonly used types
pub use camera::{CameraError, CameraPose, ViewSampler, ViewSamplingConfig, ViewSet};

pub use job::{AssetFormat, JobError, RenderJob, RenderParams};

pub use renderer::{BlenderRenderer, Renderer, RendererConfig, RendererError};

pub use pipeline::{render_asset, PipelineError, RenderOptions};

pub use batch::{run_batch, BatchConfig, BatchError, BatchResult, Outcome};
