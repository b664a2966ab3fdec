//! Dry-run rendering of what `build` would hand to the toolchain.

use crate::config::Settings;
use crate::deps::{self, FeatureFlags, OsIdentity};
use crate::env::{ConfigMap, EnvironmentCompiler};
use crate::error::BuildError;
use crate::request::{BuildRequest, RuntimeVersion};
use crate::script;
use crate::toolchain::{Locator, ToolchainLocation};
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PlanFormat {
    /// The generated bash script
    Script,
    /// Flat KEY=value lines, lists joined with ';'
    Env,
    /// The configuration map as JSON
    Json,
}

pub struct Plan {
    pub location: ToolchainLocation,
    pub runtime: RuntimeVersion,
    pub config: ConfigMap,
}

/// Resolve everything for one interpreter without cloning, chmod-ing or running anything.
pub fn plan(
    settings: &Settings,
    request: &BuildRequest,
    runtime: Option<&RuntimeVersion>,
) -> Result<Plan, BuildError> {
    let locator = Locator::new(&settings.toolchain);
    let location = locator.resolve(request.package_version.as_str())?;
    if location.branch().is_some() {
        locator.warn_if_pinned();
    }
    let manifest = deps::resolve(
        &OsIdentity::detect(&settings.deps),
        FeatureFlags::from(&settings.deps),
        &settings.deps,
        &settings.accelerator.lib_dir,
    );
    let runtime = runtime
        .or_else(|| request.runtime_versions.first())
        .cloned()
        .ok_or_else(|| BuildError::config("no Python version to plan for"))?;
    let config = EnvironmentCompiler::new(settings, request, &manifest)?.compile(&runtime);

    Ok(Plan {
        location,
        runtime,
        config,
    })
}

impl Plan {
    pub fn render(&self, settings: &Settings, format: PlanFormat) -> Result<String, BuildError> {
        match format {
            PlanFormat::Script => Ok(script::generate(
                &self.config,
                &self.location,
                &settings.toolchain.entry_point,
                &settings.package.source_root,
            )),
            PlanFormat::Env => {
                let mut out = String::new();
                for (key, value) in self.config.to_flat_env()? {
                    let _ = writeln!(out, "{}={}", key, value);
                }
                Ok(out)
            }
            PlanFormat::Json => {
                let doc = serde_json::json!({
                    "toolchain": self.location,
                    "python": self.runtime.to_string(),
                    "env": self.config,
                });
                serde_json::to_string_pretty(&doc)
                    .map_err(|e| BuildError::config(format!("cannot encode plan: {}", e)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{DEPS_LIST, DEPS_SONAME};

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.deps.os_name = Some("Ubuntu".to_string());
        settings
    }

    #[test]
    fn test_plan_picks_requested_runtime() {
        let settings = settings();
        let request = BuildRequest::from_csv("2.4.1", "3.10,3.11", "11.8").unwrap();
        let wanted = RuntimeVersion::parse("3.11").unwrap();
        let plan = plan(&settings, &request, Some(&wanted)).unwrap();
        assert_eq!(plan.config.scalar("DESIRED_PYTHON"), Some("3.11"));
        assert_eq!(plan.location.branch(), Some("release/2.4"));

        let first = super::plan(&settings, &request, None).unwrap();
        assert_eq!(first.runtime.to_string(), "3.10");
    }

    #[test]
    fn test_env_format_flattens_lists() {
        let settings = settings();
        let request = BuildRequest::from_csv("2.7.0", "3.12", "11.8").unwrap();
        let plan = plan(&settings, &request, None).unwrap();
        let text = plan.render(&settings, PlanFormat::Env).unwrap();

        let deps_line = text
            .lines()
            .find(|l| l.starts_with("DEPS_LIST="))
            .unwrap();
        assert!(deps_line.starts_with("DEPS_LIST=/usr/lib/x86_64-linux-gnu/libgomp.so.1;"));
        assert!(text.contains("TORCH_CUDA_ARCH_LIST=3.5;3.7\n"));
    }

    #[test]
    fn test_json_format_keeps_list_order() {
        let settings = settings();
        let request = BuildRequest::from_csv("2.7.0", "3.12", "11.8").unwrap();
        let plan = plan(&settings, &request, None).unwrap();
        let text = plan.render(&settings, PlanFormat::Json).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&text).unwrap();

        let sonames = doc["env"][DEPS_SONAME].as_array().unwrap();
        assert_eq!(sonames[0], "libgomp.so.1");
        assert_eq!(sonames.len(), doc["env"][DEPS_LIST].as_array().unwrap().len());
        assert_eq!(doc["toolchain"]["variant"], "Builtin");
    }

    #[test]
    fn test_script_format_ends_with_entry_point() {
        let settings = settings();
        let request = BuildRequest::from_csv("2.7.0", "3.12", "11.8").unwrap();
        let text = plan(&settings, &request, None)
            .unwrap()
            .render(&settings, PlanFormat::Script)
            .unwrap();
        assert!(text.trim_end().ends_with("source '/pytorch/.ci/manywheel/build_common.sh'"));
    }
}
