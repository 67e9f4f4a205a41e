//! Renders every asset below a root folder on a bounded worker pool.
//!
//! Each discovered asset becomes an [`AssetJob`]. Workers pull jobs from a
//! shared queue, run the single-asset pipeline ([`crate::pipeline`]) and send
//! back a tagged [`Outcome`]. A failing asset, whether it returns an error or
//! panics, only produces a failed outcome; its siblings keep rendering.

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{BTreeMap, HashSet};
use std::ffi::OsString;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::thread;
use walkdir::WalkDir;

use crate::job::AssetFormat;
use crate::pipeline::{self, RenderOptions};
use crate::renderer::Renderer;

#[derive(thiserror::Error, Debug)]
pub enum BatchError {
    #[error("Invalid batch parameters: {0}")]
    InvalidParams(String),
    #[error("Asset discovery failed: {0}")]
    Discovery(String),
}

/// Settings for one batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Folder searched recursively for assets.
    pub root: PathBuf,
    /// Folder receiving one sub-directory per asset.
    pub output_root: PathBuf,
    /// Number of assets rendered concurrently.
    pub num_workers: usize,
    /// Global seed. Each asset derives its own seed from it and its index.
    pub seed: Option<u64>,
    pub options: RenderOptions,
}

impl BatchConfig {
    pub fn new(root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            output_root: output_root.into(),
            num_workers: 32,
            seed: None,
            options: RenderOptions::default(),
        }
    }

    pub fn validate(&self) -> Result<(), BatchError> {
        if self.num_workers == 0 {
            return Err(BatchError::InvalidParams(
                "num_workers must be greater than zero".to_string(),
            ));
        }
        self.options
            .validate()
            .map_err(|e| BatchError::InvalidParams(e.to_string()))
    }
}

/// One unit of dispatch work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetJob {
    /// Position in discovery order, used to derive the per-asset seed.
    pub index: usize,
    pub asset: PathBuf,
    pub output_dir: PathBuf,
}

/// Terminal state of an [`AssetJob`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Success,
    Failed { reason: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

/// Per-asset outcomes of a finished batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub outcomes: BTreeMap<PathBuf, Outcome>,
}

impl BatchResult {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = (&PathBuf, &str)> {
        self.outcomes.iter().filter_map(|(path, outcome)| match outcome {
            Outcome::Failed { reason } => Some((path, reason.as_str())),
            Outcome::Success => None,
        })
    }

    pub fn is_complete_success(&self) -> bool {
        self.outcomes.values().all(Outcome::is_success)
    }
}

/// Reported once per finished job, in completion order.
#[derive(Debug)]
pub struct Progress<'a> {
    pub completed: usize,
    pub total: usize,
    pub asset: &'a Path,
    pub outcome: &'a Outcome,
}

/// Finds all supported assets below `root`, sorted by path.
///
/// Unreadable entries below the root are skipped with a warning.
pub fn discover_assets(root: &Path) -> Result<Vec<PathBuf>, BatchError> {
    if !root.is_dir() {
        return Err(BatchError::Discovery(format!(
            "{} is not a directory",
            root.display()
        )));
    }

    let mut assets = Vec::new();
    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {e}");
                continue;
            }
        };
        if entry.file_type().is_file() && AssetFormat::from_path(entry.path()).is_some() {
            assets.push(entry.into_path());
        }
    }
    Ok(assets)
}

/// Maps an asset below `root` to its output directory below `output_root`.
///
/// The relative directory structure is kept and the extension dropped, e.g.
/// `root/cat/obj.glb` becomes `output_root/cat/obj`.
pub fn output_dir_for(
    root: &Path,
    asset: &Path,
    output_root: &Path,
) -> Result<PathBuf, BatchError> {
    let relative = asset.strip_prefix(root).map_err(|_| {
        BatchError::InvalidParams(format!(
            "{} is not inside {}",
            asset.display(),
            root.display()
        ))
    })?;
    Ok(output_root.join(relative.with_extension("")))
}

/// Derives the seed of the asset at `index` from a batch seed (SplitMix64).
pub fn derive_seed(seed: u64, index: usize) -> u64 {
    let step = (index as u64).wrapping_add(1);
    let mut z = seed.wrapping_add(step.wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// A fresh generator for one asset, independent of every other asset.
pub fn asset_rng(seed: Option<u64>, index: usize) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(derive_seed(seed, index)),
        None => StdRng::from_entropy(),
    }
}

/// Builds the job list for `assets` discovered below `config.root`.
///
/// Assets that only differ by extension (`a/x.glb`, `a/x.obj`) map to the
/// same output directory. The first one in discovery order keeps it; later
/// ones get the lowercase extension appended (`a/x_obj`).
pub fn plan_jobs(
    config: &BatchConfig,
    assets: Vec<PathBuf>,
) -> Result<Vec<AssetJob>, BatchError> {
    let mut claimed = HashSet::new();
    let mut jobs = Vec::with_capacity(assets.len());
    for (index, asset) in assets.into_iter().enumerate() {
        let mapped = output_dir_for(&config.root, &asset, &config.output_root)?;
        let output_dir = if claimed.contains(&mapped) {
            let dir = disambiguate(&mapped, &asset, &claimed);
            warn!(
                "Output directory {} is already used, rendering {} into {}",
                mapped.display(),
                asset.display(),
                dir.display()
            );
            dir
        } else {
            mapped
        };
        claimed.insert(output_dir.clone());
        jobs.push(AssetJob {
            index,
            asset,
            output_dir,
        });
    }
    Ok(jobs)
}

fn with_suffix(dir: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(dir.as_os_str());
    name.push("_");
    name.push(suffix);
    PathBuf::from(name)
}

/// First free `<dir>_<ext>`, then `<dir>_<ext>_2`, `<dir>_<ext>_3`, ...
fn disambiguate(dir: &Path, asset: &Path, claimed: &HashSet<PathBuf>) -> PathBuf {
    let ext = asset
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let mut candidate = with_suffix(dir, &ext);
    let mut n = 2;
    while claimed.contains(&candidate) {
        candidate = with_suffix(dir, &format!("{ext}_{n}"));
        n += 1;
    }
    candidate
}

fn panic_reason(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panicked: {msg}")
    } else {
        "panicked".to_string()
    }
}

/// Runs one job to a terminal outcome. Never fails, never unwinds.
fn process(job: &AssetJob, config: &BatchConfig, renderer: &dyn Renderer) -> Outcome {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut rng = asset_rng(config.seed, job.index);
        pipeline::render_asset(
            &job.asset,
            &job.output_dir,
            &config.options,
            &mut rng,
            renderer,
        )
    }));

    match result {
        Ok(Ok(_)) => Outcome::Success,
        Ok(Err(e)) => Outcome::Failed {
            reason: e.to_string(),
        },
        Err(payload) => Outcome::Failed {
            reason: panic_reason(payload),
        },
    }
}

fn worker(
    jobs: Receiver<AssetJob>,
    results: Sender<(AssetJob, Outcome)>,
    config: &BatchConfig,
    renderer: &dyn Renderer,
) {
    for job in jobs.iter() {
        let outcome = process(&job, config, renderer);
        if results.send((job, outcome)).is_err() {
            break;
        }
    }
}

/// Discovers the assets below `config.root` and renders all of them.
///
/// Returns once every asset has a terminal outcome. `on_progress` is called
/// on the calling thread each time a job finishes.
///
/// # Errors
///
/// Only problems that prevent the batch from starting are errors: invalid
/// options, zero workers, or an unreadable root. Per-asset failures end up
/// in the returned [`BatchResult`].
pub fn run_batch<F>(
    config: &BatchConfig,
    renderer: &dyn Renderer,
    on_progress: F,
) -> Result<BatchResult, BatchError>
where
    F: FnMut(&Progress<'_>),
{
    config.validate()?;
    let assets = discover_assets(&config.root)?;
    info!("Found {} objects", assets.len());
    let jobs = plan_jobs(config, assets)?;
    Ok(dispatch(config, jobs, renderer, on_progress))
}

/// Runs already planned jobs on `config.num_workers` threads.
pub fn dispatch<F>(
    config: &BatchConfig,
    jobs: Vec<AssetJob>,
    renderer: &dyn Renderer,
    mut on_progress: F,
) -> BatchResult
where
    F: FnMut(&Progress<'_>),
{
    let total = jobs.len();
    let mut result = BatchResult::default();
    if total == 0 {
        return result;
    }

    let (job_tx, job_rx) = unbounded::<AssetJob>();
    let (result_tx, result_rx) = unbounded::<(AssetJob, Outcome)>();
    for job in jobs {
        // The receiver is alive until the end of this function.
        let _ = job_tx.send(job);
    }
    drop(job_tx);

    let num_workers = config.num_workers.clamp(1, total);
    info!("Rendering {total} objects with {num_workers} workers");

    thread::scope(|scope| {
        for _ in 0..num_workers {
            let jobs = job_rx.clone();
            let results = result_tx.clone();
            scope.spawn(move || worker(jobs, results, config, renderer));
        }
        drop(result_tx);

        for (completed, (job, outcome)) in result_rx.iter().enumerate() {
            let completed = completed + 1;
            match &outcome {
                Outcome::Success => {
                    info!("[{completed}/{total}] Rendered {}", job.asset.display())
                }
                Outcome::Failed { reason } => error!(
                    "[{completed}/{total}] Error rendering {}: {reason}",
                    job.asset.display()
                ),
            }
            on_progress(&Progress {
                completed,
                total,
                asset: &job.asset,
                outcome: &outcome,
            });
            result.outcomes.insert(job.asset, outcome);
        }
    });

    info!(
        "Batch finished: {} succeeded, {} failed",
        result.succeeded(),
        result.total() - result.succeeded()
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_output_dir_mapping() {
        let out = output_dir_for(
            Path::new("/data/root"),
            Path::new("/data/root/cat/obj.glb"),
            Path::new("/renders"),
        )
        .unwrap();
        assert_eq!(out, PathBuf::from("/renders/cat/obj"));

        let top = output_dir_for(
            Path::new("root"),
            Path::new("root/bad.ply"),
            Path::new("out"),
        )
        .unwrap();
        assert_eq!(top, PathBuf::from("out/bad"));

        assert!(output_dir_for(
            Path::new("/data/root"),
            Path::new("/elsewhere/obj.glb"),
            Path::new("/renders"),
        )
        .is_err());
    }

    #[test]
    fn test_plan_jobs_keeps_output_dirs_distinct() {
        let config = BatchConfig::new("/data/root", "/renders");
        let assets = ["a/x.glb", "a/x.obj", "a/x.PLY", "a/x_obj.blend", "b/x.obj"]
            .iter()
            .map(|rel| Path::new("/data/root").join(rel))
            .collect();
        let jobs = plan_jobs(&config, assets).unwrap();

        let dirs: Vec<PathBuf> = jobs.iter().map(|j| j.output_dir.clone()).collect();
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("/renders/a/x"),
                PathBuf::from("/renders/a/x_obj"),
                PathBuf::from("/renders/a/x_ply"),
                PathBuf::from("/renders/a/x_obj_blend"),
                PathBuf::from("/renders/b/x"),
            ]
        );
        let indices: Vec<usize> = jobs.iter().map(|j| j.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_disambiguate_skips_taken_names() {
        let claimed: HashSet<PathBuf> = ["out/x", "out/x_obj", "out/x_obj_2"]
            .iter()
            .map(PathBuf::from)
            .collect();
        assert_eq!(
            disambiguate(Path::new("out/x"), Path::new("in/x.obj"), &claimed),
            PathBuf::from("out/x_obj_3")
        );
    }

    #[test]
    fn test_discover_assets_filters_and_sorts() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        for rel in ["b/y.obj", "a/x.glb", "a/notes.txt", "c/d/scene.blend", "z.PLY"] {
            let path = root.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, "").unwrap();
        }

        let found: Vec<PathBuf> = discover_assets(root)
            .unwrap()
            .into_iter()
            .map(|p| p.strip_prefix(root).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            found,
            vec![
                PathBuf::from("a/x.glb"),
                PathBuf::from("b/y.obj"),
                PathBuf::from("c/d/scene.blend"),
                PathBuf::from("z.PLY"),
            ]
        );
    }

    #[test]
    fn test_discover_missing_root() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            discover_assets(&tmp.path().join("nope")),
            Err(BatchError::Discovery(_))
        ));
    }

    #[test]
    fn test_derived_seeds_are_stable_and_distinct() {
        assert_eq!(derive_seed(7, 3), derive_seed(7, 3));
        let seeds: std::collections::HashSet<u64> = (0..1000).map(|i| derive_seed(7, i)).collect();
        assert_eq!(seeds.len(), 1000);
        assert_ne!(derive_seed(7, 0), derive_seed(8, 0));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = BatchConfig::new("root", "out");
        config.num_workers = 0;
        assert!(matches!(
            config.validate(),
            Err(BatchError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_panic_reason() {
        assert_eq!(panic_reason(Box::new("boom")), "panicked: boom");
        assert_eq!(
            panic_reason(Box::new(String::from("bang"))),
            "panicked: bang"
        );
        assert_eq!(panic_reason(Box::new(3_u8)), "panicked");
    }
}
