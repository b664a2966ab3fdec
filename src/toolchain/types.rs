use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Which on-disk layout of the manywheel scripts is in use
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ToolchainVariant {
    /// Shipped inside the source tree (`.ci/manywheel`)
    Builtin,
    /// Separate builder checkout on a release branch
    Provisioned { branch: String },
}

impl fmt::Display for ToolchainVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolchainVariant::Builtin => f.write_str("built-in"),
            ToolchainVariant::Provisioned { branch } => write!(f, "builder@{}", branch),
        }
    }
}

/// Resolved toolchain directory, chosen once per request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolchainLocation {
    pub dir: PathBuf,
    pub variant: ToolchainVariant,
}

impl ToolchainLocation {
    pub fn builtin(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            variant: ToolchainVariant::Builtin,
        }
    }

    pub fn provisioned(dir: impl Into<PathBuf>, branch: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            variant: ToolchainVariant::Provisioned {
                branch: branch.into(),
            },
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Release branch for provisioned checkouts
    pub fn branch(&self) -> Option<&str> {
        match &self.variant {
            ToolchainVariant::Provisioned { branch } => Some(branch),
            ToolchainVariant::Builtin => None,
        }
    }

    pub fn entry_point(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}
