//! # cuwheel CLI Entry Point
//!
//! Parses CLI arguments using clap and routes commands to the handlers:
//! - `build`: run the toolchain for every requested Python version
//! - `plan`: print the script/environment a build would use
//! - `doctor`: check the build host

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;

use cuwheel::build;
use cuwheel::commands;
use cuwheel::config;
use cuwheel::request::{BuildRequest, RuntimeVersion};

#[derive(Parser)]
#[command(name = "cuwheel")]
#[command(about = "Builds CUDA PyTorch wheels through the manywheel toolchain", version = env!("CARGO_PKG_VERSION"))]
#[command(propagate_version = true)]
struct Cli {
    /// Config file (defaults to ./cuwheel.toml, then ~/.cuwheel/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Show detailed decisions
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build wheels for one or more Python versions
    Build {
        /// PyTorch version to build (major.minor[.patch])
        #[arg(long)]
        package_version: String,
        /// Comma-separated list of Python versions
        #[arg(long, default_value = "3.9,3.10,3.11,3.12")]
        runtime_versions: String,
    },
    /// Print what a build would run, without running it
    Plan {
        /// PyTorch version to plan for
        #[arg(long)]
        package_version: String,
        /// Python version (defaults to the first of --runtime-versions)
        #[arg(long)]
        runtime_version: Option<String>,
        /// Comma-separated list of Python versions
        #[arg(long, default_value = "3.9,3.10,3.11,3.12")]
        runtime_versions: String,
        /// Output format
        #[arg(long, value_enum, default_value = "script")]
        format: build::PlanFormat,
    },
    /// Check the build host for required tools and paths
    Doctor,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let (settings, config_path) = config::load_settings(cli.config.as_deref())?;
    if cli.verbose
        && let Some(path) = &config_path
    {
        println!("   {} Using config {}", "ℹ".blue(), path.display());
    }

    match cli.command {
        Commands::Build {
            package_version,
            runtime_versions,
        } => {
            let request = BuildRequest::from_csv(
                &package_version,
                &runtime_versions,
                &settings.accelerator.version,
            )
            .context("Invalid build request")?;

            let options = build::BuildOptions {
                verbose: cli.verbose,
            };
            let report = build::build_request(&settings, &request, &options)
                .context("Build aborted")?;
            build::print_summary(&report);

            if report.exit_code() != 0 {
                std::process::exit(report.exit_code());
            }
            Ok(())
        }

        Commands::Plan {
            package_version,
            runtime_version,
            runtime_versions,
            format,
        } => {
            let request = BuildRequest::from_csv(
                &package_version,
                &runtime_versions,
                &settings.accelerator.version,
            )
            .context("Invalid build request")?;
            let runtime = runtime_version
                .as_deref()
                .map(RuntimeVersion::parse)
                .transpose()
                .context("Invalid --runtime-version")?;

            let plan = build::plan(&settings, &request, runtime.as_ref())?;
            print!("{}", plan.render(&settings, format)?);
            Ok(())
        }

        Commands::Doctor => commands::doctor::run_doctor(&settings, config_path.as_deref()),
    }
}
