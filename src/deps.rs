//! Shared-library bundle resolution.
//!
//! Produces the ordered `(path, soname)` manifest that the toolchain copies
//! into the wheel. Nothing here touches the filesystem except
//! [`OsIdentity::detect`]; whether a library actually exists is the
//! toolchain's problem.

use crate::config::{DepsConfig, PinnedLibrary};
use serde::Serialize;
use std::fs;
use std::path::Path;

const OS_RELEASE: &str = "/etc/os-release";

/// A library to bundle: where it lives on the build host and the soname it is stored under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyEntry {
    pub path: String,
    pub soname: String,
}

impl DependencyEntry {
    pub fn new(path: impl Into<String>, soname: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            soname: soname.into(),
        }
    }
}

impl From<&PinnedLibrary> for DependencyEntry {
    fn from(lib: &PinnedLibrary) -> Self {
        DependencyEntry::new(lib.path.clone(), lib.soname.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    CentOs,
    Ubuntu,
    Other,
}

/// Host OS identity, the `NAME=` value of os-release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsIdentity {
    pub name: String,
}

impl OsIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Read the identity of the running host, honoring a config override.
    pub fn detect(config: &DepsConfig) -> Self {
        if let Some(name) = &config.os_name {
            return Self::new(name.clone());
        }
        let name = fs::read_to_string(Path::new(OS_RELEASE))
            .ok()
            .and_then(|content| parse_os_release_name(&content))
            .unwrap_or_default();
        Self::new(name)
    }

    pub fn family(&self) -> OsFamily {
        if self.name.contains("CentOS Linux") {
            OsFamily::CentOs
        } else if self.name.contains("Ubuntu") {
            OsFamily::Ubuntu
        } else {
            OsFamily::Other
        }
    }
}

fn parse_os_release_name(content: &str) -> Option<String> {
    content
        .lines()
        .find_map(|line| line.strip_prefix("NAME="))
        .map(|value| value.trim().trim_matches('"').to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    pub cusparselt: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self { cusparselt: true }
    }
}

impl From<&DepsConfig> for FeatureFlags {
    fn from(config: &DepsConfig) -> Self {
        Self {
            cusparselt: config.cusparselt,
        }
    }
}

/// CUDA 11.8 / cuDNN 8 runtime libraries, in bundle order.
const CUDA_118_LIBS: &[&str] = &[
    "libcudnn_adv_infer.so.8",
    "libcudnn_adv_train.so.8",
    "libcudnn_cnn_infer.so.8",
    "libcudnn_cnn_train.so.8",
    "libcudnn_ops_infer.so.8",
    "libcudnn_ops_train.so.8",
    "libcudnn.so.8",
    "libcublas.so.11",
    "libcublasLt.so.11",
    "libcudart.so.11.0",
    "libnvToolsExt.so.1",
    "libnvrtc.so.11.2",
    "libnvrtc-builtins.so.11.8",
];

fn gomp_path<'a>(os: &OsIdentity, config: &'a DepsConfig) -> &'a str {
    match os.family() {
        OsFamily::CentOs => "/usr/lib64/libgomp.so.1",
        OsFamily::Ubuntu => "/usr/lib/x86_64-linux-gnu/libgomp.so.1",
        OsFamily::Other => &config.default_gomp_path,
    }
}

/// Resolve the bundle manifest for a host.
///
/// Order: OpenMP runtime, optional cuSPARSELt, then the pinned CUDA list.
pub fn resolve(
    os: &OsIdentity,
    flags: FeatureFlags,
    config: &DepsConfig,
    cuda_lib_dir: &Path,
) -> Vec<DependencyEntry> {
    let lib = |soname: &str| cuda_lib_dir.join(soname).to_string_lossy().into_owned();

    let mut entries = vec![DependencyEntry::new(
        gomp_path(os, config),
        "libgomp.so.1",
    )];

    if flags.cusparselt {
        entries.push(DependencyEntry::new(
            lib("libcusparseLt.so.0"),
            "libcusparseLt.so.0",
        ));
    }

    match &config.pinned {
        Some(pinned) => entries.extend(pinned.iter().map(DependencyEntry::from)),
        None => entries.extend(
            CUDA_118_LIBS
                .iter()
                .map(|soname| DependencyEntry::new(lib(soname), *soname)),
        ),
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cuda_dir() -> &'static Path {
        Path::new("/usr/local/cuda/lib64")
    }

    #[test]
    fn test_gomp_path_per_os_family() {
        let config = DepsConfig::default();
        let flags = FeatureFlags::default();

        let centos = resolve(&OsIdentity::new("CentOS Linux"), flags, &config, cuda_dir());
        assert_eq!(centos[0].path, "/usr/lib64/libgomp.so.1");

        let ubuntu = resolve(&OsIdentity::new("Ubuntu"), flags, &config, cuda_dir());
        assert_eq!(ubuntu[0].path, "/usr/lib/x86_64-linux-gnu/libgomp.so.1");

        let custom = DepsConfig {
            default_gomp_path: "/opt/gomp/libgomp.so.1".to_string(),
            ..DepsConfig::default()
        };
        let alma = resolve(&OsIdentity::new("AlmaLinux"), flags, &custom, cuda_dir());
        assert_eq!(alma[0].path, "/opt/gomp/libgomp.so.1");
        assert!(alma.iter().all(|e| !e.soname.is_empty() && !e.path.is_empty()));
    }

    #[test]
    fn test_cusparselt_flag_controls_entry() {
        let config = DepsConfig::default();
        let os = OsIdentity::new("Ubuntu");

        let with = resolve(&os, FeatureFlags { cusparselt: true }, &config, cuda_dir());
        let without = resolve(&os, FeatureFlags { cusparselt: false }, &config, cuda_dir());

        assert_eq!(with.len(), without.len() + 1);
        assert_eq!(with[1].soname, "libcusparseLt.so.0");
        assert_eq!(with[1].path, "/usr/local/cuda/lib64/libcusparseLt.so.0");
        assert!(without.iter().all(|e| e.soname != "libcusparseLt.so.0"));
    }

    #[test]
    fn test_pinned_list_order_and_pairing() {
        let entries = resolve(
            &OsIdentity::new("CentOS Linux"),
            FeatureFlags::default(),
            &DepsConfig::default(),
            cuda_dir(),
        );
        let sonames: Vec<&str> = entries.iter().skip(2).map(|e| e.soname.as_str()).collect();
        assert_eq!(sonames, CUDA_118_LIBS);
        for entry in &entries {
            assert!(
                entry.path.ends_with(&entry.soname),
                "{} does not end with {}",
                entry.path,
                entry.soname
            );
        }
    }

    #[test]
    fn test_config_pinned_list_replaces_builtin() {
        let config = DepsConfig {
            pinned: Some(vec![PinnedLibrary {
                path: "/opt/cuda/libcudart.so.12".to_string(),
                soname: "libcudart.so.12".to_string(),
            }]),
            cusparselt: false,
            ..DepsConfig::default()
        };
        let entries = resolve(
            &OsIdentity::new("Ubuntu"),
            FeatureFlags::from(&config),
            &config,
            cuda_dir(),
        );
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1], DependencyEntry::new("/opt/cuda/libcudart.so.12", "libcudart.so.12"));
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let os = OsIdentity::new("Ubuntu 22.04");
        let config = DepsConfig::default();
        let a = resolve(&os, FeatureFlags::default(), &config, cuda_dir());
        let b = resolve(&os, FeatureFlags::default(), &config, cuda_dir());
        assert_eq!(a, b);
    }

    #[test]
    fn test_parse_os_release_name() {
        let content = "PRETTY_NAME=\"Ubuntu 22.04.3 LTS\"\nNAME=\"Ubuntu\"\nVERSION_ID=\"22.04\"\n";
        assert_eq!(parse_os_release_name(content).as_deref(), Some("Ubuntu"));
        assert_eq!(parse_os_release_name("ID=alpine\n"), None);
    }

    #[test]
    fn test_detect_prefers_override() {
        let config = DepsConfig {
            os_name: Some("CentOS Linux".to_string()),
            ..DepsConfig::default()
        };
        assert_eq!(OsIdentity::detect(&config).family(), OsFamily::CentOs);
    }
}
