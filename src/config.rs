//! Configuration file parsing (`cuwheel.toml`).
//!
//! Every section is optional; a missing file means the built-in defaults,
//! which match the CUDA 11.8 manywheel container layout.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "cuwheel.toml";

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub package: PackageConfig,
    pub accelerator: AcceleratorConfig,
    pub toolchain: ToolchainConfig,
    pub deps: DepsConfig,
    pub output: OutputConfig,
    pub build: BuildConfig,
    /// Scalar overrides applied after every computed key
    pub env: BTreeMap<String, String>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct PackageConfig {
    /// Name substring used by the last-resort artifact search
    pub name: String,
    pub build_number: String,
    pub source_root: PathBuf,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            name: "torch".to_string(),
            build_number: "1".to_string(),
            source_root: PathBuf::from("/pytorch"),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct AcceleratorConfig {
    pub version: String,
    pub lib_dir: PathBuf,
}

impl Default for AcceleratorConfig {
    fn default() -> Self {
        Self {
            version: "11.8".to_string(),
            lib_dir: PathBuf::from("/usr/local/cuda/lib64"),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct ToolchainConfig {
    /// First `major.minor` that ships the toolchain inside the source tree
    pub builtin_min_version: String,
    pub builtin_dir: PathBuf,
    pub fallback_checkout: PathBuf,
    pub fallback_subdir: String,
    pub fallback_repo: String,
    /// Branch template; `{major}` and `{minor}` are substituted
    pub fallback_branch: String,
    pub entry_point: String,
    pub script_path: PathBuf,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            builtin_min_version: "2.6".to_string(),
            builtin_dir: PathBuf::from("/pytorch/.ci/manywheel"),
            fallback_checkout: PathBuf::from("/pytorch_builder"),
            fallback_subdir: "manywheel".to_string(),
            fallback_repo: "https://github.com/pytorch/builder.git".to_string(),
            fallback_branch: "release/{major}.{minor}".to_string(),
            entry_point: "build_common.sh".to_string(),
            script_path: PathBuf::from("/tmp/cuwheel_build.sh"),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct PinnedLibrary {
    pub path: String,
    pub soname: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct DepsConfig {
    /// Overrides the `NAME=` value read from /etc/os-release
    pub os_name: Option<String>,
    pub default_gomp_path: String,
    pub cusparselt: bool,
    /// Replaces the built-in CUDA 11.8 library list when set
    pub pinned: Option<Vec<PinnedLibrary>>,
}

impl Default for DepsConfig {
    fn default() -> Self {
        Self {
            os_name: None,
            default_gomp_path: "/usr/lib64/libgomp.so.1".to_string(),
            cusparselt: true,
            pinned: None,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub staging_root: PathBuf,
    pub wheelhouse_dir: String,
    pub libtorch_house_dir: String,
    pub dist_dir: PathBuf,
    pub final_dir: PathBuf,
    pub extensions: Vec<String>,
    pub search_root: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            staging_root: PathBuf::from("/"),
            wheelhouse_dir: "wheelhouse118".to_string(),
            libtorch_house_dir: "libtorch_house118".to_string(),
            dist_dir: PathBuf::from("/pytorch/dist"),
            final_dir: PathBuf::from("/remote/wheelhouse118"),
            extensions: vec!["whl".to_string()],
            search_root: PathBuf::from("/"),
        }
    }
}

impl OutputConfig {
    /// Internal staging directory the toolchain writes wheels to
    pub fn wheelhouse_path(&self) -> PathBuf {
        self.staging_root.join(&self.wheelhouse_dir)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct BuildConfig {
    pub max_jobs: u32,
    pub use_ccache: bool,
    pub arch_list: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            max_jobs: 2,
            use_ccache: true,
            arch_list: "3.5;3.7".to_string(),
        }
    }
}

impl Settings {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .context("Failed to parse config - check for syntax errors (missing quotes, brackets)")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("Invalid config {}", path.display()))
    }
}

/// Config lookup order: explicit path, `./cuwheel.toml`, `~/.cuwheel/config.toml`.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from(CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }
    dirs::home_dir()
        .map(|home| home.join(".cuwheel").join("config.toml"))
        .filter(|p| p.exists())
}

pub fn load_settings(explicit: Option<&Path>) -> Result<(Settings, Option<PathBuf>)> {
    match find_config(explicit) {
        Some(path) => {
            if !path.exists() {
                return Err(anyhow::anyhow!(
                    "Config file {} not found.",
                    path.display()
                ));
            }
            Ok((Settings::from_file(&path)?, Some(path)))
        }
        None => Ok((Settings::default(), None)),
    }
}
