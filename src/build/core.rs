use crate::config::Settings;
use crate::deps::{self, FeatureFlags, OsIdentity};
use crate::env::EnvironmentCompiler;
use crate::error::BuildError;
use crate::recovery::{RecoveryReport, Scanner};
use crate::request::{BuildRequest, RuntimeVersion};
use crate::script;
use crate::toolchain::{Locator, ToolchainLocation};
use colored::*;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use std::process::Command;
use std::time::Instant;

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RuntimeStatus {
    Built,
    /// Toolchain failed but a wheel for this interpreter was recovered
    FailedSalvaged,
    Failed,
}

impl RuntimeStatus {
    pub fn label(&self) -> &'static str {
        match self {
            RuntimeStatus::Built => "built",
            RuntimeStatus::FailedSalvaged => "failed (salvaged)",
            RuntimeStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RuntimeOutcome {
    pub runtime: RuntimeVersion,
    pub status: RuntimeStatus,
    pub error: Option<String>,
    /// Wheels recovered by this request for this interpreter
    pub artifacts: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub location: ToolchainLocation,
    pub outcomes: Vec<RuntimeOutcome>,
    pub recovery: RecoveryReport,
}

impl BuildReport {
    /// A failed interpreter with nothing salvaged
    pub fn has_unrecovered_failures(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| o.status == RuntimeStatus::Failed)
    }

    pub fn exit_code(&self) -> i32 {
        if self.has_unrecovered_failures() { 1 } else { 0 }
    }
}

/// Run the generated script with bash from `source_root`.
pub fn run_script(
    script_path: &Path,
    source_root: &Path,
    runtime: &RuntimeVersion,
) -> Result<(), BuildError> {
    let status = Command::new("bash")
        .arg(script_path)
        .current_dir(source_root)
        .status()
        .map_err(|e| {
            BuildError::io(
                format!(
                    "Failed to run {} in {}",
                    script_path.display(),
                    source_root.display()
                ),
                e,
            )
        })?;

    if !status.success() {
        return Err(BuildError::ToolchainExecution {
            runtime: runtime.to_string(),
            code: status.code(),
        });
    }
    Ok(())
}

/// Build every requested interpreter in order.
///
/// Configuration and permission problems abort immediately. A toolchain
/// failure only marks that interpreter; recovery still runs and the next
/// interpreter is attempted.
pub fn build_request(
    settings: &Settings,
    request: &BuildRequest,
    options: &BuildOptions,
) -> Result<BuildReport, BuildError> {
    let start_time = Instant::now();

    let os = OsIdentity::detect(&settings.deps);
    let manifest = deps::resolve(
        &os,
        FeatureFlags::from(&settings.deps),
        &settings.deps,
        &settings.accelerator.lib_dir,
    );
    if options.verbose {
        println!(
            "   {} OS '{}' -> {} bundled libraries",
            "ℹ".blue(),
            os.name,
            manifest.len()
        );
    }

    let compiler = EnvironmentCompiler::new(settings, request, &manifest)?;
    let location = Locator::new(&settings.toolchain).locate(request.package_version.as_str())?;
    let scanner = Scanner::from_settings(settings);
    let wheelhouse = settings.output.wheelhouse_path();
    let dist_dir = &settings.output.dist_dir;
    let final_dir = &settings.output.final_dir;

    let mut errors: Vec<(RuntimeVersion, Option<String>)> = Vec::new();
    // Only wheels this request copied or confirmed count towards salvage;
    // the output directory may hold wheels from earlier builds.
    let mut recovered: BTreeSet<String> = BTreeSet::new();

    for runtime in &request.runtime_versions {
        println!(
            "\n{} Building for Python {} ({})",
            "🚀".cyan(),
            runtime,
            request.override_version()
        );

        let config = compiler.compile(runtime);
        let text = script::generate(
            &config,
            &location,
            &settings.toolchain.entry_point,
            &settings.package.source_root,
        );
        let script_path = script::write_script(&text, &settings.toolchain.script_path)?;
        if options.verbose {
            println!(
                "   {} Wrote {} ({} keys)",
                "ℹ".blue(),
                script_path.display(),
                config.len()
            );
        }

        let error = match run_script(&script_path, &settings.package.source_root, runtime) {
            Ok(()) => {
                println!("{} Toolchain finished for Python {}", "✓".green(), runtime);
                None
            }
            Err(e @ (BuildError::ToolchainExecution { .. } | BuildError::Io { .. })) => {
                println!("{} {}", "x".red(), e);
                Some(e.to_string())
            }
            Err(e) => return Err(e),
        };

        let pass_report = scanner.recover(&wheelhouse, dist_dir, final_dir);
        recovered.extend(pass_report.recovered().map(str::to_string));
        errors.push((runtime.clone(), error));
    }

    println!("\n{} Final artifact recovery", "📦".blue());
    let recovery = scanner.recover(&wheelhouse, dist_dir, final_dir);
    recovered.extend(recovery.recovered().map(str::to_string));
    if recovery.is_empty() {
        eprintln!(
            "{} No wheels were recovered into {}",
            "!".yellow(),
            final_dir.display()
        );
    }

    let outcomes = errors
        .into_iter()
        .map(|(runtime, error)| {
            let artifacts: Vec<String> = recovery
                .artifacts
                .iter()
                .filter(|a| recovered.contains(&a.file_name))
                .filter(|a| request.owns_artifact(&settings.package.name, &runtime, &a.file_name))
                .map(|a| a.file_name.clone())
                .collect();
            let status = match (&error, artifacts.is_empty()) {
                (None, _) => RuntimeStatus::Built,
                (Some(_), false) => RuntimeStatus::FailedSalvaged,
                (Some(_), true) => RuntimeStatus::Failed,
            };
            RuntimeOutcome {
                runtime,
                status,
                error,
                artifacts,
            }
        })
        .collect();

    let report = BuildReport {
        location,
        outcomes,
        recovery,
    };

    if options.verbose {
        println!(
            "   {} Finished in {:.1}s",
            "⏱".dimmed(),
            start_time.elapsed().as_secs_f64()
        );
    }

    Ok(report)
}
