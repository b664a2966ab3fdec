//! Execution script generation.
//!
//! The generated bash script is the only place the toolchain environment is
//! materialized: scalars become `export KEY='value'`, the dependency lists
//! become arrays with one quoted element per line, and the toolchain entry
//! point is sourced last so it sees both.

use crate::env::{ConfigMap, ConfigValue};
use crate::error::BuildError;
use crate::toolchain::ToolchainLocation;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// Single-quote a value for POSIX shells. Embedded quotes become `'\''`.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Render the script for one toolchain invocation.
pub fn generate(
    config: &ConfigMap,
    location: &ToolchainLocation,
    entry_point: &str,
    source_root: &Path,
) -> String {
    let mut out = String::new();
    out.push_str("#!/usr/bin/env bash\n");
    out.push_str("set -ex\n\n");

    for (key, value) in config.iter() {
        if let ConfigValue::Scalar(s) = value {
            let _ = writeln!(out, "export {}={}", key, shell_quote(s));
        }
    }

    for (key, value) in config.iter() {
        if let ConfigValue::List(items) = value {
            out.push('\n');
            let _ = writeln!(out, "{}=(", key);
            for item in items {
                let _ = writeln!(out, "    {}", shell_quote(item));
            }
            out.push_str(")\n");
        }
    }

    out.push('\n');
    let _ = writeln!(
        out,
        "cd {}",
        shell_quote(&source_root.to_string_lossy())
    );
    let _ = writeln!(
        out,
        "source {}",
        shell_quote(&location.entry_point(entry_point).to_string_lossy())
    );
    out
}

/// Write the script to `path` and make it executable.
pub fn write_script(content: &str, path: &Path) -> Result<PathBuf, BuildError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| {
            BuildError::io(format!("Failed to create {}", parent.display()), e)
        })?;
    }
    fs::write(path, content)
        .map_err(|e| BuildError::io(format!("Failed to write {}", path.display()), e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(|source| {
            BuildError::Permission {
                path: path.to_path_buf(),
                source,
            }
        })?;
    }

    Ok(path.to_path_buf())
}
