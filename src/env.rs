//! Environment compilation.
//!
//! Turns static flags, the dependency manifest and the request into a
//! [`ConfigMap`]. The map is the only description of the toolchain's
//! environment; this process's own environment is never touched.

use crate::config::Settings;
use crate::deps::DependencyEntry;
use crate::error::BuildError;
use crate::request::{BuildRequest, RuntimeVersion};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;

/// Library paths, paired by index with [`DEPS_SONAME`].
pub const DEPS_LIST: &str = "DEPS_LIST";
/// Sonames, paired by index with [`DEPS_LIST`].
pub const DEPS_SONAME: &str = "DEPS_SONAME";
/// Keys that are emitted as shell arrays.
pub const LIST_KEYS: [&str; 2] = [DEPS_LIST, DEPS_SONAME];

/// Separator used when a list has to travel as a single string.
pub const LIST_DELIMITER: char = ';';

const SHELL_NAME_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

/// Reject keys that bash cannot `export` as a variable name.
pub fn validate_key(key: &str) -> Result<(), BuildError> {
    let re = Regex::new(SHELL_NAME_PATTERN)
        .map_err(|e| BuildError::config(format!("invalid key pattern: {}", e)))?;
    if !re.is_match(key) {
        return Err(BuildError::config(format!(
            "environment key '{}' is not a valid shell variable name",
            key
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Scalar(String),
    List(Vec<String>),
}

impl ConfigValue {
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            ConfigValue::Scalar(s) => Some(s),
            ConfigValue::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            ConfigValue::List(items) => Some(items),
            ConfigValue::Scalar(_) => None,
        }
    }
}

/// Join list elements with [`LIST_DELIMITER`].
///
/// Fails if any element contains the delimiter or is empty, since neither could be split back.
pub fn flatten_list(items: &[String]) -> Result<String, BuildError> {
    if items.iter().any(|item| item.is_empty()) {
        return Err(BuildError::config("list elements must not be empty"));
    }
    if let Some(bad) = items.iter().find(|item| item.contains(LIST_DELIMITER)) {
        return Err(BuildError::config(format!(
            "list element '{}' contains the list delimiter '{}'",
            bad, LIST_DELIMITER
        )));
    }
    Ok(items.join(&LIST_DELIMITER.to_string()))
}

/// Inverse of [`flatten_list`]. An empty string is an empty list.
pub fn expand_list(flat: &str) -> Vec<String> {
    if flat.is_empty() {
        return Vec::new();
    }
    flat.split(LIST_DELIMITER).map(str::to_string).collect()
}

/// Key -> value environment for one toolchain invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ConfigMap {
    entries: BTreeMap<String, ConfigValue>,
}

impl ConfigMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries
            .insert(key.into(), ConfigValue::Scalar(value.into()));
    }

    pub fn set_list(&mut self, key: impl Into<String>, items: Vec<String>) {
        self.entries.insert(key.into(), ConfigValue::List(items));
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.entries.get(key)
    }

    pub fn scalar(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(ConfigValue::as_scalar)
    }

    pub fn list(&self, key: &str) -> Option<&[String]> {
        self.get(key).and_then(ConfigValue::as_list)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Flat `KEY -> string` view with lists joined by [`LIST_DELIMITER`].
    pub fn to_flat_env(&self) -> Result<BTreeMap<String, String>, BuildError> {
        self.entries
            .iter()
            .map(|(key, value)| {
                let flat = match value {
                    ConfigValue::Scalar(s) => s.clone(),
                    ConfigValue::List(items) => flatten_list(items)?,
                };
                Ok((key.clone(), flat))
            })
            .collect()
    }

    /// Rebuild a map from its flat view; only [`LIST_KEYS`] are expanded.
    pub fn from_flat_env(flat: &BTreeMap<String, String>) -> Self {
        let mut map = Self::new();
        for (key, value) in flat {
            if LIST_KEYS.contains(&key.as_str()) {
                map.set_list(key.clone(), expand_list(value));
            } else {
                map.set(key.clone(), value.clone());
            }
        }
        map
    }
}

fn flag(enabled: bool) -> &'static str {
    if enabled { "1" } else { "0" }
}

/// Builds one [`ConfigMap`] per runtime version from a fixed base.
pub struct EnvironmentCompiler {
    base: ConfigMap,
}

impl EnvironmentCompiler {
    /// Fails on `[env]` keys that are not shell variable names.
    pub fn new(
        settings: &Settings,
        request: &BuildRequest,
        manifest: &[DependencyEntry],
    ) -> Result<Self, BuildError> {
        let mut base = ConfigMap::new();

        // Deployment constants
        base.set("TZ", "UTC");
        base.set("TORCH_NVCC_FLAGS", "-Xfatbin -compress-all --threads 2");
        base.set("NCCL_ROOT_DIR", "/usr/local/cuda");
        base.set("TH_BINARY_BUILD", "1");
        base.set("USE_STATIC_CUDNN", "0");
        base.set("USE_STATIC_NCCL", "1");
        base.set("ATEN_STATIC_CUDA", "1");
        base.set("USE_CUDA_STATIC_LINK", "1");
        base.set("INSTALL_TEST", "0");
        base.set("USE_CUPTI_SO", "0");
        base.set("USE_CUSPARSELT", flag(settings.deps.cusparselt));
        base.set("USE_CUFILE", "0");
        base.set("BUILD_BUNDLE_PTXAS", "1");
        base.set("TORCH_CUDA_ARCH_LIST", settings.build.arch_list.clone());
        base.set("USE_CUDA", "1");
        base.set("USE_CUDNN", "1");
        base.set("USE_MKLDNN", "1");
        base.set("BUILD_TEST", "0");
        base.set("USE_FBGEMM", "1");
        base.set("BUILD_SPLIT_CUDA", "ON");
        base.set("MAX_JOBS", settings.build.max_jobs.to_string());
        base.set("SKIP_ALL_TESTS", "1");
        base.set("USE_CCACHE", flag(settings.build.use_ccache));

        // Output locations
        base.set("WHEELHOUSE_DIR", settings.output.wheelhouse_dir.clone());
        base.set(
            "LIBTORCH_HOUSE_DIR",
            settings.output.libtorch_house_dir.clone(),
        );
        base.set(
            "PYTORCH_FINAL_PACKAGE_DIR",
            settings.output.final_dir.to_string_lossy(),
        );

        // Request values
        base.set("CUDA_VERSION", request.accelerator.as_str());
        base.set("DESIRED_CUDA", request.accelerator.nodot());
        base.set("PYTORCH_BUILD_VERSION", request.package_version.as_str());
        base.set("PYTORCH_BUILD_NUMBER", settings.package.build_number.clone());
        base.set("OVERRIDE_PACKAGE_VERSION", request.override_version());

        // Paired lists, split in a single pass
        let (paths, sonames): (Vec<String>, Vec<String>) = manifest
            .iter()
            .map(|entry| (entry.path.clone(), entry.soname.clone()))
            .unzip();
        base.set_list(DEPS_LIST, paths);
        base.set_list(DEPS_SONAME, sonames);

        for (key, value) in &settings.env {
            validate_key(key)?;
            if LIST_KEYS.contains(&key.as_str()) {
                continue;
            }
            base.set(key.clone(), value.clone());
        }

        Ok(Self { base })
    }

    /// Environment for one runtime version; only `DESIRED_PYTHON` varies.
    pub fn compile(&self, runtime: &RuntimeVersion) -> ConfigMap {
        let mut map = self.base.clone();
        map.set("DESIRED_PYTHON", runtime.to_string());
        map
    }
}
