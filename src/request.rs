//! Build request model.
//!
//! A request is parsed once from CLI input and never mutated afterwards.

use crate::error::BuildError;
use regex::Regex;
use semver::Version;
use serde::Serialize;
use std::fmt;

const PACKAGE_VERSION_PATTERN: &str = r"^(\d+)\.(\d+)(?:\.(\d+))?$";
const RUNTIME_VERSION_PATTERN: &str = r"^(\d+)\.(\d+)(t?)$";

fn pattern(re: &str) -> Result<Regex, BuildError> {
    Regex::new(re).map_err(|e| BuildError::config(format!("invalid version pattern: {}", e)))
}

fn number(text: &str, what: &str) -> Result<u64, BuildError> {
    text.parse::<u64>()
        .map_err(|_| BuildError::config(format!("{} component '{}' is out of range", what, text)))
}

/// Target package version, `major.minor[.patch]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: Option<u64>,
    raw: String,
}

impl PackageVersion {
    pub fn parse(text: &str) -> Result<Self, BuildError> {
        let raw = text.trim();
        let caps = pattern(PACKAGE_VERSION_PATTERN)?
            .captures(raw)
            .ok_or_else(|| {
                BuildError::config(format!(
                    "'{}' is not a version of the form major.minor[.patch]",
                    text
                ))
            })?;

        let major = number(&caps[1], "major")?;
        let minor = number(&caps[2], "minor")?;
        let patch = match caps.get(3) {
            Some(m) => Some(number(m.as_str(), "patch")?),
            None => None,
        };

        Ok(Self {
            major,
            minor,
            patch,
            raw: raw.to_string(),
        })
    }

    /// Version exactly as supplied (trimmed)
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The `major.minor` release line, e.g. `2.4`
    pub fn release_line(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }

    /// Only `major.minor` takes part in toolchain layout decisions.
    pub fn line_version(&self) -> Version {
        Version::new(self.major, self.minor, 0)
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Target interpreter version, e.g. `3.10` or `3.13t`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeVersion {
    major: u64,
    minor: u64,
    free_threaded: bool,
}

impl RuntimeVersion {
    pub fn parse(text: &str) -> Result<Self, BuildError> {
        let trimmed = text.trim();
        let caps = pattern(RUNTIME_VERSION_PATTERN)?
            .captures(trimmed)
            .ok_or_else(|| {
                BuildError::config(format!(
                    "'{}' is not a Python version of the form major.minor",
                    text
                ))
            })?;

        Ok(Self {
            major: number(&caps[1], "major")?,
            minor: number(&caps[2], "minor")?,
            free_threaded: &caps[3] == "t",
        })
    }

    /// Interpreter tag used in wheel file names (`cp310`)
    pub fn python_tag(&self) -> String {
        format!("cp{}{}", self.major, self.minor)
    }

    /// ABI tag; free-threaded builds carry a `t` suffix (`cp313t`)
    pub fn abi_tag(&self) -> String {
        if self.free_threaded {
            format!("{}t", self.python_tag())
        } else {
            self.python_tag()
        }
    }

    /// Whether a wheel file name was built for this interpreter
    pub fn matches_artifact(&self, file_name: &str) -> bool {
        WheelName::parse(file_name)
            .is_some_and(|w| w.python_tag == self.python_tag() && w.abi_tag == self.abi_tag())
    }
}

/// Fields of a wheel file name:
/// `{distribution}-{version}(-{build})?-{python}-{abi}-{platform}.whl`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WheelName<'a> {
    pub distribution: &'a str,
    pub version: &'a str,
    pub python_tag: &'a str,
    pub abi_tag: &'a str,
    pub platform_tag: &'a str,
}

impl<'a> WheelName<'a> {
    pub fn parse(file_name: &'a str) -> Option<Self> {
        let stem = file_name.strip_suffix(".whl")?;
        let parts: Vec<&str> = stem.split('-').collect();
        if !(parts.len() == 5 || parts.len() == 6) || parts.iter().any(|p| p.is_empty()) {
            return None;
        }
        let n = parts.len();
        Some(Self {
            distribution: parts[0],
            version: parts[1],
            python_tag: parts[n - 3],
            abi_tag: parts[n - 2],
            platform_tag: parts[n - 1],
        })
    }
}

impl fmt::Display for RuntimeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)?;
        if self.free_threaded {
            f.write_str("t")?;
        }
        Ok(())
    }
}

/// Accelerator toolkit version, fixed per deployment (e.g. `11.8`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcceleratorVersion {
    raw: String,
}

impl AcceleratorVersion {
    pub fn parse(text: &str) -> Result<Self, BuildError> {
        let raw = text.trim();
        let valid = raw.split('.').count() >= 2
            && raw
                .split('.')
                .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()));
        if !valid {
            return Err(BuildError::config(format!(
                "'{}' is not a CUDA version of the form major.minor",
                text
            )));
        }
        Ok(Self {
            raw: raw.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// `11.8` -> `118`
    pub fn nodot(&self) -> String {
        self.raw.replace('.', "")
    }
}

impl fmt::Display for AcceleratorVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildRequest {
    pub package_version: PackageVersion,
    pub runtime_versions: Vec<RuntimeVersion>,
    pub accelerator: AcceleratorVersion,
}

impl BuildRequest {
    pub fn new<S: AsRef<str>>(
        package_version: &str,
        runtime_versions: &[S],
        accelerator: &str,
    ) -> Result<Self, BuildError> {
        let package_version = PackageVersion::parse(package_version)?;
        let runtime_versions = runtime_versions
            .iter()
            .map(|v| v.as_ref())
            .filter(|v| !v.trim().is_empty())
            .map(RuntimeVersion::parse)
            .collect::<Result<Vec<_>, _>>()?;
        if runtime_versions.is_empty() {
            return Err(BuildError::config("at least one Python version is required"));
        }
        let accelerator = AcceleratorVersion::parse(accelerator)?;

        Ok(Self {
            package_version,
            runtime_versions,
            accelerator,
        })
    }

    /// Parse a comma-separated list such as `3.9,3.10, 3.11`.
    pub fn from_csv(
        package_version: &str,
        runtime_csv: &str,
        accelerator: &str,
    ) -> Result<Self, BuildError> {
        let parts: Vec<&str> = runtime_csv.split(',').collect();
        Self::new(package_version, &parts, accelerator)
    }

    /// `2.4.1+cu118`
    pub fn override_version(&self) -> String {
        format!("{}+cu{}", self.package_version, self.accelerator.nodot())
    }

    /// Whether `file_name` is a `package` wheel of this request's version for `runtime`.
    ///
    /// The version must be the override version or the bare package version;
    /// wheels of other releases sharing the interpreter tag do not count.
    pub fn owns_artifact(&self, package: &str, runtime: &RuntimeVersion, file_name: &str) -> bool {
        let Some(wheel) = WheelName::parse(file_name) else {
            return false;
        };
        let package = package.replace('-', "_");
        wheel.distribution.replace('-', "_") == package
            && (wheel.version == self.override_version()
                || wheel.version == self.package_version.as_str())
            && runtime.matches_artifact(file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_version_with_and_without_patch() {
        let v = PackageVersion::parse("2.4.1").unwrap();
        assert_eq!((v.major, v.minor, v.patch), (2, 4, Some(1)));
        assert_eq!(v.release_line(), "2.4");

        let v = PackageVersion::parse(" 2.7 ").unwrap();
        assert_eq!(v.patch, None);
        assert_eq!(v.as_str(), "2.7");
    }

    #[test]
    fn test_package_version_rejects_garbage() {
        for bad in ["", "2", "two.four", "2.4.1.9", "2.4-rc1", "v2.4"] {
            let err = PackageVersion::parse(bad).unwrap_err();
            assert!(matches!(err, BuildError::Configuration(_)), "{}", bad);
        }
    }

    #[test]
    fn test_package_version_overflow_is_configuration_error() {
        let err = PackageVersion::parse("99999999999999999999999.1").unwrap_err();
        assert!(matches!(err, BuildError::Configuration(_)));
    }

    #[test]
    fn test_runtime_version_abi_tag() {
        let v = RuntimeVersion::parse("3.10").unwrap();
        assert_eq!(v.abi_tag(), "cp310");
        assert_eq!(v.to_string(), "3.10");
        assert!(v.matches_artifact("torch-2.4.1+cu118-cp310-cp310-linux_x86_64.whl"));
        assert!(!v.matches_artifact("torch-2.4.1+cu118-cp311-cp311-linux_x86_64.whl"));

        let ft = RuntimeVersion::parse("3.13t").unwrap();
        assert_eq!(ft.to_string(), "3.13t");
        assert_eq!(ft.python_tag(), "cp313");
        assert_eq!(ft.abi_tag(), "cp313t");
    }

    #[test]
    fn test_free_threaded_wheels_are_kept_apart() {
        let regular = RuntimeVersion::parse("3.13").unwrap();
        let ft = RuntimeVersion::parse("3.13t").unwrap();
        let regular_wheel = "torch-2.7.0+cu118-cp313-cp313-linux_x86_64.whl";
        let ft_wheel = "torch-2.7.0+cu118-cp313-cp313t-linux_x86_64.whl";

        assert!(regular.matches_artifact(regular_wheel));
        assert!(!regular.matches_artifact(ft_wheel));
        assert!(ft.matches_artifact(ft_wheel));
        assert!(!ft.matches_artifact(regular_wheel));
    }

    #[test]
    fn test_wheel_name_fields() {
        let w = WheelName::parse("torch-2.7.0+cu118-1-cp310-cp310-linux_x86_64.whl").unwrap();
        assert_eq!(w.distribution, "torch");
        assert_eq!(w.version, "2.7.0+cu118");
        assert_eq!(w.python_tag, "cp310");
        assert_eq!(w.abi_tag, "cp310");
        assert_eq!(w.platform_tag, "linux_x86_64");

        assert!(WheelName::parse("torch-2.7.0.tar.gz").is_none());
        assert!(WheelName::parse("torch-cp310-linux.whl").is_none());
    }

    #[test]
    fn test_request_owns_only_its_own_release() {
        let request = BuildRequest::from_csv("2.7.0", "3.10", "11.8").unwrap();
        let py310 = &request.runtime_versions[0];

        assert!(request.owns_artifact("torch", py310, "torch-2.7.0+cu118-cp310-cp310-linux_x86_64.whl"));
        assert!(request.owns_artifact("torch", py310, "torch-2.7.0-cp310-cp310-linux_x86_64.whl"));
        assert!(!request.owns_artifact("torch", py310, "torch-2.5.0+cu118-cp310-cp310-linux_x86_64.whl"));
        assert!(!request.owns_artifact("torch", py310, "torch-2.7.0+cu121-cp310-cp310-linux_x86_64.whl"));
        assert!(!request.owns_artifact("torch", py310, "torchvision-2.7.0+cu118-cp310-cp310-linux_x86_64.whl"));
        assert!(!request.owns_artifact("torch", py310, "torch-2.7.0+cu118-cp311-cp311-linux_x86_64.whl"));
    }

    #[test]
    fn test_request_from_csv_keeps_order() {
        let req = BuildRequest::from_csv("2.4.1", "3.11, 3.9,3.10,", "11.8").unwrap();
        let versions: Vec<String> = req.runtime_versions.iter().map(|v| v.to_string()).collect();
        assert_eq!(versions, vec!["3.11", "3.9", "3.10"]);
        assert_eq!(req.override_version(), "2.4.1+cu118");
    }

    #[test]
    fn test_request_requires_runtime_version() {
        let err = BuildRequest::from_csv("2.4.1", " , ", "11.8").unwrap_err();
        assert!(matches!(err, BuildError::Configuration(_)));
    }

    #[test]
    fn test_accelerator_version() {
        assert_eq!(AcceleratorVersion::parse("12.4").unwrap().nodot(), "124");
        assert!(AcceleratorVersion::parse("12").is_err());
        assert!(AcceleratorVersion::parse("12.x").is_err());
    }
}
