//! Doctor command handler
//!
//! Handles `cuwheel doctor`: host identity, required tools and the
//! effective configuration source. Tools are only checked for, never
//! installed.

use anyhow::Result;
use colored::*;
use std::path::Path;
use std::process::Command;

use crate::config::Settings;
use crate::deps::{OsFamily, OsIdentity};
use crate::ui;

/// Tools the build container is expected to provide
const TOOLS: &[(&str, &str, bool)] = &[
    ("bash", "Runs the generated build script", true),
    ("git", "Fetches the builder repository for old releases", false),
    ("ccache", "Compiler cache", false),
    ("nvcc", "CUDA compiler", true),
];

fn tool_version(bin: &str) -> Option<String> {
    let output = Command::new(bin).arg("--version").output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Some(
        stdout
            .lines()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("Detected")
            .trim()
            .to_string(),
    )
}

/// Run the `cuwheel doctor` command
pub fn run_doctor(settings: &Settings, config_path: Option<&Path>) -> Result<()> {
    println!("{} Running Build Host Doctor...", "🚑".red());
    println!("-------------------------------");

    let os = OsIdentity::detect(&settings.deps);
    let family = match os.family() {
        OsFamily::CentOs => "CentOS family",
        OsFamily::Ubuntu => "Ubuntu family",
        OsFamily::Other => "default layout",
    };
    print!("Checking OS... ");
    if os.name.is_empty() {
        println!("{} ({})", "unknown".yellow(), family);
    } else {
        println!("{} ({})", os.name.green(), family.cyan());
    }

    print!("Checking config... ");
    match config_path {
        Some(path) => println!("{}", path.display().to_string().green()),
        None => println!("{}", "built-in defaults".cyan()),
    }

    let mut missing_required = false;
    let mut table = ui::Table::new(&["Status", "Tool", "Purpose", "Version"]);
    for (bin, purpose, required) in TOOLS {
        let (status, version) = match tool_version(bin) {
            Some(v) => ("✓".green().to_string(), v),
            None if *required => {
                missing_required = true;
                ("x".red().to_string(), "Not Found".red().to_string())
            }
            None => ("!".yellow().to_string(), "Not Found (Optional)".dimmed().to_string()),
        };
        table.add_row(vec![status, bin.to_string(), purpose.to_string(), version]);
    }
    table.print();

    for (label, path) in [
        ("Source root", &settings.package.source_root),
        ("Built-in toolchain", &settings.toolchain.builtin_dir),
        ("CUDA libraries", &settings.accelerator.lib_dir),
    ] {
        let state = if path.exists() {
            "present".green()
        } else {
            "missing".yellow()
        };
        println!("  {}: {} ({})", label.bold(), path.display(), state);
    }

    if missing_required {
        println!("{} Required tools are missing; builds will fail.", "x".red());
    } else {
        println!("{} Host looks ready.", "✓".green());
    }
    Ok(())
}
