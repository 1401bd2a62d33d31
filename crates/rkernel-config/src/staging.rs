//! Kernel spec staging helpers.
//!
//! Used when building kernel directories for deployment: a scratch staging
//! directory is created, launcher files for the target backend are copied in,
//! and the result is moved into a kernel directory by the caller.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::debug;
use walkdir::WalkDir;

use crate::error::ConfigError;

/// Launcher file sets that can be staged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LauncherType {
    Python,
    R,
    Scala,
    Kubernetes,
    Docker,
}

impl LauncherType {
    /// Sub-directory of the launchers root holding this launcher's files.
    pub fn dir_name(self) -> &'static str {
        match self {
            LauncherType::Python => "python",
            LauncherType::R => "R",
            LauncherType::Scala => "scala",
            LauncherType::Kubernetes => "kubernetes",
            LauncherType::Docker => "docker",
        }
    }
}

impl FromStr for LauncherType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "python" => Ok(LauncherType::Python),
            "r" => Ok(LauncherType::R),
            "scala" => Ok(LauncherType::Scala),
            "kubernetes" => Ok(LauncherType::Kubernetes),
            "docker" => Ok(LauncherType::Docker),
            _ => Err(ConfigError::InvalidLauncherType(s.to_string())),
        }
    }
}

/// Create a staging directory (`staging_*`) under `parent`, or under the
/// platform temp directory when `parent` is `None`.
///
/// The directory is not removed automatically; see [`delete_staging_directory`].
pub fn create_staging_directory(parent: Option<&Path>) -> Result<PathBuf, ConfigError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("staging_");
    let dir = match parent {
        Some(parent) => builder.tempdir_in(parent)?,
        None => builder.tempdir()?,
    };
    Ok(dir.keep())
}

/// Remove a staging directory and everything in it.
pub fn delete_staging_directory(dir: &Path) -> Result<(), ConfigError> {
    fs::remove_dir_all(dir)?;
    Ok(())
}

/// Copy the launcher files of `launcher_type` from `launchers_root` into `dest`.
///
/// Returns the number of files copied.
pub fn copy_launcher_files(
    launchers_root: &Path,
    launcher_type: LauncherType,
    dest: &Path,
) -> Result<usize, ConfigError> {
    let src = launchers_root.join(launcher_type.dir_name());
    if !src.is_dir() {
        return Err(ConfigError::NotFound(src.display().to_string()));
    }

    let mut copied = 0;
    for entry in WalkDir::new(&src) {
        let entry = entry.map_err(std::io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(&src)
            .map_err(|e| ConfigError::invalid("launchers_root", e.to_string()))?;
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }

    debug!(
        "Copied {} {} launcher files to {}",
        copied,
        launcher_type.dir_name(),
        dest.display()
    );
    Ok(copied)
}
