//! # cuwheel - CUDA wheel build driver
//!
//! cuwheel turns a build request (PyTorch version, Python versions, CUDA
//! version) into a resolved manywheel environment, runs the toolchain once
//! per Python version and collects whatever wheels it produced, even when
//! some of those runs fail.
//!
//! ## Quick Start
//!
//! ```bash
//! # Show the script that would run for Python 3.11
//! cuwheel plan --package-version 2.4.1 --runtime-version 3.11
//!
//! # Build wheels for several interpreters
//! cuwheel build --package-version 2.4.1 --runtime-versions 3.10,3.11
//! ```
//!
//! ## Module Organization
//!
//! - [`toolchain`] - Version-dependent toolchain location
//! - [`deps`] - Shared-library bundle manifest
//! - [`env`] - Environment compilation
//! - [`script`] - Build script generation
//! - [`recovery`] - Wheel recovery after each run
//! - [`build`] - The per-request pipeline

/// Request pipeline, dry-run planning and the summary.
pub mod build;

/// CLI command handlers extracted from main.
pub mod commands;

/// Configuration file parsing (`cuwheel.toml`).
pub mod config;

/// Shared-library bundle resolution.
pub mod deps;

/// Environment compilation into a typed configuration map.
pub mod env;

/// Error taxonomy for request processing.
pub mod error;

/// Wheel recovery passes.
pub mod recovery;

/// Build request parsing.
pub mod request;

/// Bash script generation.
pub mod script;

/// Toolchain location and provisioning.
pub mod toolchain;

/// Terminal UI utilities (tables, colors).
pub mod ui;
