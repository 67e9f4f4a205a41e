//! Multi-view rendering tool
//!
//! Renders one asset, or every asset below a folder, from views sampled
//! around the object.
//!
//! Usage:
//! ```bash
//! multiview-render render assets/chair.glb --output-dir renders/chair --num-views 24
//! multiview-render batch assets/ --output-dir renders/ --num-workers 16 --seed 0
//! ```

use clap::{Args, Parser, Subcommand};
use flexi_logger::{colored_detailed_format, detailed_format, Duplicate, FileSpec, Logger};
use log::{error, info};
use multiview_render::batch::{self, BatchConfig};
use multiview_render::camera::ViewSamplingConfig;
use multiview_render::job::RenderParams;
use multiview_render::pipeline::{self, RenderOptions};
use multiview_render::renderer::provision::{self, InstallSpec};
use multiview_render::renderer::{BlenderRenderer, RendererConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;

/// Multi-view rendering tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level filter (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Also write logs into this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a single asset
    Render {
        /// Asset to render (.ply, .glb, .obj or .blend)
        asset: PathBuf,

        /// Output directory for this asset
        #[arg(short = 'o', long)]
        output_dir: PathBuf,

        #[command(flatten)]
        common: CommonArgs,
    },
    /// Render every asset below a folder
    Batch {
        /// Folder searched recursively for assets
        folder: PathBuf,

        /// Output root; each asset gets a sub-directory mirroring its path
        #[arg(short = 'o', long)]
        output_dir: PathBuf,

        /// Number of assets rendered concurrently
        #[arg(short = 'w', long, default_value = "32")]
        num_workers: usize,

        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// YAML file with sampling and render options; replaces the option flags below
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Number of views per asset
    #[arg(short = 'n', long, default_value = "150")]
    num_views: usize,

    /// Samples per pixel
    #[arg(long, default_value = "32")]
    num_samples: u32,

    /// Output image resolution
    #[arg(long, default_value = "518")]
    resolution: u32,

    /// Narrowest field of view in degrees
    #[arg(long, default_value = "10")]
    fov_min: f64,

    /// Widest field of view in degrees
    #[arg(long, default_value = "90")]
    fov_max: f64,

    /// Lower bound of the base framing radius
    #[arg(long, default_value = "0.35")]
    radius_min: f64,

    /// Upper bound of the base framing radius
    #[arg(long, default_value = "0.6")]
    radius_max: f64,

    /// Minimum pitch in radians; lower views are folded above it
    #[arg(long, default_value = "0.0", allow_negative_numbers = true)]
    min_pitch: f64,

    /// Keep the raw pitch distribution (ignores --min-pitch)
    #[arg(long)]
    no_min_pitch: bool,

    /// Standard deviation of the log-normal radius factor (mean 1)
    #[arg(long)]
    radius_jitter: Option<f64>,

    /// Standard deviation of the camera center and position jitter
    #[arg(long)]
    pose_jitter: Option<f64>,

    /// Seed for view sampling
    #[arg(long)]
    seed: Option<u64>,

    /// Seed for the renderer's lighting
    #[arg(long)]
    light_seed: Option<u64>,

    /// Export the mesh alongside the renders
    #[arg(long)]
    save_mesh: bool,

    /// Path to the Blender executable
    #[arg(long, default_value = provision::DEFAULT_BLENDER_PATH)]
    blender: PathBuf,

    /// Render script run by Blender
    #[arg(long, default_value = "blender_script/render.py")]
    script: PathBuf,

    /// Download and unpack Blender if it is missing
    #[arg(long)]
    install: bool,

    /// Kill a render after this many seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Show the renderer's output
    #[arg(short = 'v', long)]
    verbose: bool,
}

impl CommonArgs {
    fn render_options(&self) -> Result<RenderOptions, Box<dyn std::error::Error>> {
        if let Some(path) = &self.config {
            info!("Loading render options from {}", path.display());
            return Ok(RenderOptions::load_from_yaml(path)?);
        }
        let options = RenderOptions {
            sampling: ViewSamplingConfig {
                num_views: self.num_views,
                fov_min: self.fov_min,
                fov_max: self.fov_max,
                radius_min: self.radius_min,
                radius_max: self.radius_max,
                min_pitch: (!self.no_min_pitch).then_some(self.min_pitch),
                radius_jitter: self.radius_jitter,
                pose_jitter: self.pose_jitter,
            },
            render: RenderParams {
                num_samples: self.num_samples,
                resolution: self.resolution,
                light_seed: self.light_seed,
                save_mesh: self.save_mesh,
            },
        };
        options.validate()?;
        Ok(options)
    }

    fn renderer_config(&self) -> RendererConfig {
        RendererConfig {
            binary: self.blender.clone(),
            script: self.script.clone(),
            verbose: self.verbose,
            timeout_secs: self.timeout,
        }
    }

    fn provision(&self, config: &RendererConfig) -> Result<(), Box<dyn std::error::Error>> {
        let install = self
            .install
            .then(|| InstallSpec::for_binary(&config.binary));
        provision::ensure_renderer(config, install.as_ref())?;
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut logger = Logger::try_with_str(&cli.log_level)?;
    if let Some(dir) = &cli.log_dir {
        logger = logger
            .log_to_file(
                FileSpec::default()
                    .directory(dir)
                    .suppress_timestamp()
                    .suffix("log"),
            )
            .duplicate_to_stdout(Duplicate::All)
            .format_for_files(detailed_format);
    } else {
        logger = logger.log_to_stdout();
    }
    let _logger = logger
        .format_for_stdout(colored_detailed_format)
        .set_palette("196;208;76;39;178".to_string())
        .start()?;

    match cli.command {
        Command::Render {
            asset,
            output_dir,
            common,
        } => {
            let options = common.render_options()?;
            let renderer_config = common.renderer_config();
            common.provision(&renderer_config)?;

            let mut rng = match common.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            let renderer = BlenderRenderer::new(renderer_config);
            let job = pipeline::render_asset(&asset, &output_dir, &options, &mut rng, &renderer)?;
            println!(
                "Rendered {} views of {} into {}",
                job.views.len(),
                job.asset.display(),
                job.output_dir.display()
            );
        }
        Command::Batch {
            folder,
            output_dir,
            num_workers,
            common,
        } => {
            let config = BatchConfig {
                num_workers,
                seed: common.seed,
                options: common.render_options()?,
                ..BatchConfig::new(folder, output_dir)
            };
            let renderer_config = common.renderer_config();
            common.provision(&renderer_config)?;

            let renderer = BlenderRenderer::new(renderer_config);
            let result = batch::run_batch(&config, &renderer, |p| {
                println!("[{}/{}] {}", p.completed, p.total, p.asset.display());
            })?;

            println!(
                "\nRendered {} / {} objects",
                result.succeeded(),
                result.total()
            );
            let failed: Vec<_> = result.failed().collect();
            if !failed.is_empty() {
                println!("Failed objects:");
                for (asset, reason) in &failed {
                    println!("  {}: {}", asset.display(), reason);
                }
                error!("{} objects failed to render", failed.len());
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
