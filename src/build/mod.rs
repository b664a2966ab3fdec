mod core;
mod plan;
mod summary;

pub use core::{
    BuildOptions, BuildReport, RuntimeOutcome, RuntimeStatus, build_request, run_script,
};
pub use plan::{Plan, PlanFormat, plan};
pub use summary::print_summary;
