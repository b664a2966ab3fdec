use super::core::{BuildReport, RuntimeStatus};
use crate::ui::Table;
use colored::*;

pub fn print_summary(report: &BuildReport) {
    println!("\n{}", "Build Summary:".bold());
    println!(
        "  {}: {} ({})",
        "Toolchain".bold(),
        report.location.dir.display(),
        report.location.variant
    );

    let mut table = Table::new(&["Python", "Status", "Wheels"]);
    for outcome in &report.outcomes {
        let status = match outcome.status {
            RuntimeStatus::Built => outcome.status.label().green().to_string(),
            RuntimeStatus::FailedSalvaged => outcome.status.label().yellow().to_string(),
            RuntimeStatus::Failed => outcome.status.label().red().to_string(),
        };
        let wheels = if outcome.artifacts.is_empty() {
            "-".dimmed().to_string()
        } else {
            outcome.artifacts.join(", ")
        };
        table.add_row(vec![outcome.runtime.to_string(), status, wheels]);
    }
    table.print();

    println!(
        "  {}: {} ({} wheel(s))",
        "Output".bold(),
        report.recovery.output_dir.display(),
        report.recovery.artifacts.len()
    );

    if report.recovery.is_empty() {
        println!("{} No wheels are available.", "!".yellow());
    } else if report.has_unrecovered_failures() {
        println!(
            "{} Some Python versions failed and nothing was salvaged for them.",
            "x".red()
        );
    } else {
        println!("{} Build completed.", "✓".green());
    }
}
