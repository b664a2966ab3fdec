//! Toolchain location
//!
//! Picks the manywheel script directory for a package version. Releases at
//! or above the configured threshold ship the scripts in-tree; older ones
//! need a builder checkout on the matching release branch. Either way the
//! scripts are made executable before use.

pub mod fetch;
pub mod types;

pub use types::{ToolchainLocation, ToolchainVariant};

use crate::config::ToolchainConfig;
use crate::error::BuildError;
use crate::request::PackageVersion;
use colored::*;
use std::path::Path;
use walkdir::WalkDir;

pub struct Locator<'a> {
    config: &'a ToolchainConfig,
}

impl<'a> Locator<'a> {
    pub fn new(config: &'a ToolchainConfig) -> Self {
        Self { config }
    }

    /// Threshold `major.minor` parsed from config
    fn threshold(&self) -> Result<PackageVersion, BuildError> {
        PackageVersion::parse(&self.config.builtin_min_version).map_err(|_| {
            BuildError::config(format!(
                "toolchain.builtin_min_version '{}' is not a major.minor version",
                self.config.builtin_min_version
            ))
        })
    }

    /// Decide the location for a version string without side effects.
    pub fn resolve(&self, version: &str) -> Result<ToolchainLocation, BuildError> {
        let version = PackageVersion::parse(version)?;
        let threshold = self.threshold()?;

        if version.line_version() >= threshold.line_version() {
            return Ok(ToolchainLocation::builtin(&self.config.builtin_dir));
        }

        let branch = render_branch(&self.config.fallback_branch, &version);
        Ok(ToolchainLocation::provisioned(
            self.config
                .fallback_checkout
                .join(&self.config.fallback_subdir),
            branch,
        ))
    }

    /// Resolve, provision and grant permissions.
    pub fn locate(&self, version: &str) -> Result<ToolchainLocation, BuildError> {
        let location = self.resolve(version)?;

        match location.branch() {
            None => println!(
                "{} PyTorch {}: using built-in toolchain at {}",
                "🔧".cyan(),
                version.trim(),
                location.dir().display()
            ),
            Some(branch) => {
                println!(
                    "{} PyTorch {}: using builder toolchain from branch {}",
                    "🔧".cyan(),
                    version.trim(),
                    branch
                );
                self.warn_if_pinned();
            }
        }

        if let Some(branch) = location.branch() {
            fetch::ensure_checkout(
                &self.config.fallback_repo,
                branch,
                &self.config.fallback_checkout,
            )?;
        }

        if !location.dir().is_dir() {
            return Err(BuildError::config(format!(
                "toolchain directory {} does not exist",
                location.dir().display()
            )));
        }

        let granted = grant_executable(location.dir())?;
        if granted > 0 {
            println!(
                "   {} Added executable permission to {} script(s)",
                "✓".green(),
                granted
            );
        }

        Ok(location)
    }

    /// A pinned fallback branch disagrees with the requested version; say so every time.
    pub fn warn_if_pinned(&self) {
        if branch_is_pinned(&self.config.fallback_branch) {
            eprintln!(
                "   {} toolchain.fallback_branch '{}' ignores the requested version",
                "!".yellow(),
                self.config.fallback_branch
            );
        }
    }
}

/// Substitute `{major}` and `{minor}` into a branch template.
pub fn render_branch(template: &str, version: &PackageVersion) -> String {
    template
        .replace("{major}", &version.major.to_string())
        .replace("{minor}", &version.minor.to_string())
}

/// A template without both placeholders names the same branch for every version.
pub fn branch_is_pinned(template: &str) -> bool {
    !(template.contains("{major}") && template.contains("{minor}"))
}

/// Add the execute bits to every `*.sh` under `dir`, keeping the other mode bits.
///
/// Returns how many files changed; files that are already executable are left alone.
pub fn grant_executable(dir: &Path) -> Result<usize, BuildError> {
    let mut changed = 0;

    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            BuildError::Permission {
                path,
                source: e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("filesystem loop")),
            }
        })?;

        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().is_none_or(|ext| ext != "sh") {
            continue;
        }

        if make_executable(path)? {
            changed += 1;
        }
    }

    Ok(changed)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<bool, BuildError> {
    use std::os::unix::fs::PermissionsExt;

    let permission_error = |source| BuildError::Permission {
        path: path.to_path_buf(),
        source,
    };

    let mut perms = std::fs::metadata(path)
        .map_err(permission_error)?
        .permissions();
    let mode = perms.mode();
    if mode & 0o111 == 0o111 {
        return Ok(false);
    }
    perms.set_mode(mode | 0o111);
    std::fs::set_permissions(path, perms).map_err(permission_error)?;
    Ok(true)
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<bool, BuildError> {
    Ok(false)
}
