//! One-time provisioning of the renderer binary.
//!
//! [`ensure_renderer`] is idempotent: when the binary is already present it
//! returns immediately, so it can run before every batch.

use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::renderer::{RendererConfig, RendererError};

pub const BLENDER_ARCHIVE_URL: &str =
    "https://download.blender.org/release/Blender3.0/blender-3.0.1-linux-x64.tar.xz";
pub const DEFAULT_BLENDER_PATH: &str = "blender-3.0.1-linux-x64/blender";

/// Where to fetch the renderer from when it is missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallSpec {
    /// URL of a `.tar.*` release archive.
    pub archive_url: String,
    /// Directory the archive is downloaded to and unpacked in.
    pub install_dir: PathBuf,
}

impl Default for InstallSpec {
    fn default() -> Self {
        Self {
            archive_url: BLENDER_ARCHIVE_URL.to_string(),
            install_dir: PathBuf::from("."),
        }
    }
}

impl InstallSpec {
    /// Default archive unpacked so that it provides `binary`.
    ///
    /// Release archives hold a single top-level folder containing the
    /// executable, so the install directory is the parent of that folder.
    pub fn for_binary(binary: &Path) -> Self {
        let install_dir = binary
            .parent()
            .and_then(Path::parent)
            .filter(|p| !p.as_os_str().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            install_dir,
            ..Default::default()
        }
    }

    /// The install directory, with an empty path read as the current one.
    pub fn install_dir(&self) -> &Path {
        if self.install_dir.as_os_str().is_empty() {
            Path::new(".")
        } else {
            &self.install_dir
        }
    }

    pub fn archive_path(&self) -> PathBuf {
        let name = self
            .archive_url
            .rsplit('/')
            .next()
            .filter(|n| !n.is_empty())
            .unwrap_or("renderer.tar.xz");
        self.install_dir().join(name)
    }
}

fn run(command: &mut Command) -> Result<(), RendererError> {
    let program = command.get_program().to_string_lossy().into_owned();
    let status = command.status().map_err(|e| RendererError::Launch {
        binary: program.clone(),
        reason: e.to_string(),
    })?;
    if !status.success() {
        return Err(RendererError::NonZeroExit(format!("{program}: {status}")));
    }
    Ok(())
}

fn is_present(binary: &Path) -> bool {
    binary.is_file()
}

/// Makes sure the renderer binary configured in `config` exists.
///
/// # Errors
///
/// * [`RendererError::MissingRenderer`] if the binary is absent and no
///   `install` spec is given, or it is still absent after installing.
/// * [`RendererError::Launch`] / [`RendererError::NonZeroExit`] if the
///   download or unpacking step fails.
pub fn ensure_renderer(
    config: &RendererConfig,
    install: Option<&InstallSpec>,
) -> Result<(), RendererError> {
    info!("Checking renderer at {}", config.binary.display());
    if is_present(&config.binary) {
        return Ok(());
    }
    let Some(install) = install else {
        return Err(RendererError::MissingRenderer(
            config.binary.display().to_string(),
        ));
    };

    let install_dir = install.install_dir();
    info!(
        "Installing renderer from {} into {}",
        install.archive_url,
        install_dir.display()
    );
    fs::create_dir_all(install_dir)?;
    let archive = install.archive_path();
    if !archive.is_file() {
        run(Command::new("wget")
            .arg(&install.archive_url)
            .arg("-O")
            .arg(&archive))?;
    }
    run(Command::new("tar")
        .arg("-xf")
        .arg(&archive)
        .arg("-C")
        .arg(install_dir))?;

    if is_present(&config.binary) {
        Ok(())
    } else {
        Err(RendererError::MissingRenderer(
            config.binary.display().to_string(),
        ))
    }
}
