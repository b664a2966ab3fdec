//! Artifact recovery.
//!
//! After every toolchain run, successful or not, wheels are collected into
//! the final output directory from a fixed sequence of places:
//!
//! 1. the internal wheelhouse staging directory
//! 2. the toolchain's own `dist` directory
//! 3. the output directory itself (re-scan)
//! 4. if still empty, a filesystem-wide search for names containing the package name
//!
//! Nothing in here returns an error. Each pass records what it copied,
//! skipped and failed, and the caller decides what to warn about.

use crate::config::Settings;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use walkdir::WalkDir;

/// Pseudo filesystems never worth walking
const PRUNED_ROOTS: &[&str] = &["/proc", "/sys", "/dev", "/run"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactRecord {
    pub path: PathBuf,
    pub file_name: String,
}

impl ArtifactRecord {
    fn from_path(path: &Path) -> Option<Self> {
        let file_name = path.file_name()?.to_string_lossy().into_owned();
        Some(Self {
            path: path.to_path_buf(),
            file_name,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecoveryPass {
    Staging,
    ToolchainDist,
    OutputRescan,
    FilesystemSearch,
}

impl RecoveryPass {
    pub fn label(&self) -> &'static str {
        match self {
            RecoveryPass::Staging => "wheelhouse staging",
            RecoveryPass::ToolchainDist => "toolchain dist",
            RecoveryPass::OutputRescan => "output directory",
            RecoveryPass::FilesystemSearch => "filesystem search",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyOutcome {
    Copied,
    /// Destination already holds identical bytes
    AlreadyPresent,
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct PassOutcome {
    pub pass: RecoveryPass,
    pub found: Vec<ArtifactRecord>,
    pub copied: usize,
    pub already_present: usize,
    pub failures: Vec<(PathBuf, String)>,
    /// Why the pass did not run (missing directory, not needed)
    pub skipped: Option<String>,
}

impl PassOutcome {
    fn new(pass: RecoveryPass) -> Self {
        Self {
            pass,
            found: Vec::new(),
            copied: 0,
            already_present: 0,
            failures: Vec::new(),
            skipped: None,
        }
    }

    fn skipped(pass: RecoveryPass, reason: impl Into<String>) -> Self {
        Self {
            skipped: Some(reason.into()),
            ..Self::new(pass)
        }
    }

    fn record(&mut self, artifact: ArtifactRecord, outcome: CopyOutcome) {
        match outcome {
            CopyOutcome::Copied => self.copied += 1,
            CopyOutcome::AlreadyPresent => self.already_present += 1,
            CopyOutcome::Failed(reason) => self.failures.push((artifact.path.clone(), reason)),
        }
        self.found.push(artifact);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecoveryReport {
    pub output_dir: PathBuf,
    pub passes: Vec<PassOutcome>,
    /// Artifacts in the output directory after all passes
    pub artifacts: Vec<ArtifactRecord>,
}

impl RecoveryReport {
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn pass(&self, pass: RecoveryPass) -> Option<&PassOutcome> {
        self.passes.iter().find(|p| p.pass == pass)
    }

    pub fn used_fallback(&self) -> bool {
        self.pass(RecoveryPass::FilesystemSearch)
            .is_some_and(|p| p.skipped.is_none())
    }

    /// File names this run copied or confirmed from a source location.
    ///
    /// The output re-scan is left out: it only lists what was already there.
    pub fn recovered(&self) -> impl Iterator<Item = &str> {
        self.passes
            .iter()
            .filter(|p| p.pass != RecoveryPass::OutputRescan)
            .flat_map(|p| {
                p.found
                    .iter()
                    .filter(move |a| !p.failures.iter().any(|(path, _)| *path == a.path))
                    .map(|a| a.file_name.as_str())
            })
    }
}

pub struct Scanner {
    extensions: Vec<String>,
    name_filter: String,
    search_root: PathBuf,
}

impl Scanner {
    pub fn new(extensions: Vec<String>, name_filter: impl Into<String>, search_root: impl Into<PathBuf>) -> Self {
        Self {
            extensions,
            name_filter: name_filter.into(),
            search_root: search_root.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.output.extensions.clone(),
            settings.package.name.clone(),
            settings.output.search_root.clone(),
        )
    }

    fn is_artifact(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy())
            .is_some_and(|ext| self.extensions.iter().any(|e| *e == *ext))
    }

    /// Run all passes. Never fails; problems end up in the report.
    pub fn recover(&self, internal_dir: &Path, dist_dir: &Path, output_dir: &Path) -> RecoveryReport {
        let mut passes = Vec::with_capacity(4);

        passes.push(self.collect_from(RecoveryPass::Staging, internal_dir, output_dir));
        passes.push(self.collect_from(RecoveryPass::ToolchainDist, dist_dir, output_dir));

        let mut rescan = PassOutcome::new(RecoveryPass::OutputRescan);
        rescan.found = self.list_output(output_dir);
        let have_artifacts = !rescan.found.is_empty();
        passes.push(rescan);

        if have_artifacts {
            passes.push(PassOutcome::skipped(
                RecoveryPass::FilesystemSearch,
                "output directory already has artifacts",
            ));
        } else {
            passes.push(self.search_filesystem(output_dir));
        }

        for pass in &passes {
            for (path, reason) in &pass.failures {
                println!(
                    "   {} Could not copy {}: {}",
                    "!".yellow(),
                    path.display(),
                    reason
                );
            }
        }

        let artifacts = self.list_output(output_dir);
        if artifacts.is_empty() {
            println!(
                "{} No wheels found in {} or anywhere under {}",
                "!".yellow(),
                output_dir.display(),
                self.search_root.display()
            );
        } else {
            println!(
                "{} {} wheel(s) in {}",
                "✓".green(),
                artifacts.len(),
                output_dir.display()
            );
            for artifact in &artifacts {
                println!("   {} {}", "+".green(), artifact.file_name);
            }
        }

        RecoveryReport {
            output_dir: output_dir.to_path_buf(),
            passes,
            artifacts,
        }
    }

    fn collect_from(&self, pass: RecoveryPass, source_dir: &Path, output_dir: &Path) -> PassOutcome {
        if !source_dir.is_dir() {
            return PassOutcome::skipped(pass, format!("{} not found", source_dir.display()));
        }

        println!(
            "{} Checking {} ({})",
            "🔍".blue(),
            source_dir.display(),
            pass.label()
        );

        let mut outcome = PassOutcome::new(pass);
        let found: Vec<ArtifactRecord> = WalkDir::new(source_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && self.is_artifact(e.path()))
            .filter_map(|e| ArtifactRecord::from_path(e.path()))
            .collect();

        for artifact in found {
            let result = copy_artifact(&artifact.path, output_dir);
            outcome.record(artifact, result);
        }
        outcome
    }

    fn search_filesystem(&self, output_dir: &Path) -> PassOutcome {
        let mut outcome = PassOutcome::new(RecoveryPass::FilesystemSearch);
        println!(
            "{} No wheels in expected locations; searching {} for '*{}*'",
            "!".yellow(),
            self.search_root.display(),
            self.name_filter
        );

        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            spinner.set_style(style);
        }
        spinner.set_message(format!("Searching {}...", self.search_root.display()));
        spinner.enable_steady_tick(Duration::from_millis(120));

        let search_root = self
            .search_root
            .canonicalize()
            .unwrap_or_else(|_| self.search_root.clone());
        let pruned_output = output_dir
            .canonicalize()
            .unwrap_or_else(|_| output_dir.to_path_buf());

        let matches: Vec<ArtifactRecord> = WalkDir::new(&search_root)
            .into_iter()
            .filter_entry(|e| !is_pruned(e.path(), &pruned_output))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && self.is_artifact(e.path()))
            .filter(|e| e.file_name().to_string_lossy().contains(&self.name_filter))
            .filter_map(|e| ArtifactRecord::from_path(e.path()))
            .collect();

        spinner.finish_and_clear();

        for artifact in matches {
            println!("   {} Found {}", "🔍".blue(), artifact.path.display());
            let result = copy_artifact(&artifact.path, output_dir);
            outcome.record(artifact, result);
        }
        outcome
    }

    fn list_output(&self, output_dir: &Path) -> Vec<ArtifactRecord> {
        let Ok(entries) = fs::read_dir(output_dir) else {
            return Vec::new();
        };
        let mut artifacts: Vec<ArtifactRecord> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && self.is_artifact(path))
            .filter_map(|path| ArtifactRecord::from_path(&path))
            .collect();
        artifacts.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        artifacts
    }
}

fn is_pruned(path: &Path, output_dir: &Path) -> bool {
    path == output_dir || PRUNED_ROOTS.iter().any(|root| path == Path::new(root))
}

fn sha256_file(path: &Path) -> io::Result<Vec<u8>> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize().to_vec())
}

fn same_contents(a: &Path, b: &Path) -> io::Result<bool> {
    if fs::metadata(a)?.len() != fs::metadata(b)?.len() {
        return Ok(false);
    }
    Ok(sha256_file(a)? == sha256_file(b)?)
}

/// Copy one artifact into `output_dir`, creating it if needed.
///
/// Re-copying identical bytes is reported as [`CopyOutcome::AlreadyPresent`].
pub fn copy_artifact(source: &Path, output_dir: &Path) -> CopyOutcome {
    let Some(file_name) = source.file_name() else {
        return CopyOutcome::Failed("no file name".to_string());
    };
    if let Err(e) = fs::create_dir_all(output_dir) {
        return CopyOutcome::Failed(format!("cannot create {}: {}", output_dir.display(), e));
    }
    let dest = output_dir.join(file_name);

    if let (Ok(src), Ok(dst)) = (source.canonicalize(), dest.canonicalize())
        && src == dst
    {
        return CopyOutcome::AlreadyPresent;
    }

    if dest.exists() {
        match same_contents(source, &dest) {
            Ok(true) => return CopyOutcome::AlreadyPresent,
            Ok(false) => {}
            Err(e) => return CopyOutcome::Failed(e.to_string()),
        }
    }

    match fs::copy(source, &dest) {
        Ok(_) => CopyOutcome::Copied,
        Err(e) => CopyOutcome::Failed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Layout {
        _root: TempDir,
        staging: PathBuf,
        dist: PathBuf,
        output: PathBuf,
        search: PathBuf,
    }

    fn layout() -> Layout {
        let root = tempfile::tempdir().unwrap();
        let base = root.path().to_path_buf();
        let staging = base.join("wheelhouse118");
        let dist = base.join("pytorch").join("dist");
        let output = base.join("remote").join("wheelhouse118");
        let search = base.join("search");
        fs::create_dir_all(&search).unwrap();
        Layout {
            _root: root,
            staging,
            dist,
            output,
            search,
        }
    }

    fn scanner(l: &Layout) -> Scanner {
        Scanner::new(vec!["whl".to_string()], "torch", &l.search)
    }

    fn touch(dir: &Path, name: &str, content: &str) -> PathBuf {
        fs::create_dir_all(dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn names(report: &RecoveryReport) -> Vec<String> {
        report.artifacts.iter().map(|a| a.file_name.clone()).collect()
    }

    #[test]
    fn test_collects_from_staging_and_dist() {
        let l = layout();
        touch(&l.staging, "torch-2.4.1+cu118-cp310-cp310-linux_x86_64.whl", "a");
        touch(&l.staging, "build.log", "ignored");
        touch(&l.dist.join("nested"), "torch-2.4.1+cu118-cp311-cp311-linux_x86_64.whl", "b");

        let report = scanner(&l).recover(&l.staging, &l.dist, &l.output);

        assert_eq!(
            names(&report),
            vec![
                "torch-2.4.1+cu118-cp310-cp310-linux_x86_64.whl",
                "torch-2.4.1+cu118-cp311-cp311-linux_x86_64.whl",
            ]
        );
        assert_eq!(report.pass(RecoveryPass::Staging).unwrap().copied, 1);
        assert_eq!(report.pass(RecoveryPass::ToolchainDist).unwrap().copied, 1);
        assert!(!report.used_fallback());
    }

    #[test]
    fn test_missing_directories_are_skipped() {
        let l = layout();
        touch(&l.dist, "torch-2.4.1-cp39-cp39-linux_x86_64.whl", "x");

        let report = scanner(&l).recover(&l.staging, &l.dist, &l.output);

        assert!(report.pass(RecoveryPass::Staging).unwrap().skipped.is_some());
        assert_eq!(report.artifacts.len(), 1);
    }

    #[test]
    fn test_recovery_is_idempotent() {
        let l = layout();
        touch(&l.staging, "torch-2.4.1-cp310-cp310-linux_x86_64.whl", "wheel bytes");

        let first = scanner(&l).recover(&l.staging, &l.dist, &l.output);
        let second = scanner(&l).recover(&l.staging, &l.dist, &l.output);

        assert_eq!(names(&first), names(&second));
        let staging = second.pass(RecoveryPass::Staging).unwrap();
        assert_eq!(staging.copied, 0);
        assert_eq!(staging.already_present, 1);
        assert!(staging.failures.is_empty());
        assert_eq!(fs::read_dir(&l.output).unwrap().count(), 1);
    }

    #[test]
    fn test_changed_artifact_is_recopied() {
        let l = layout();
        let src = touch(&l.staging, "torch-2.4.1-cp310-cp310-linux_x86_64.whl", "old");
        scanner(&l).recover(&l.staging, &l.dist, &l.output);

        fs::write(&src, "newer bytes").unwrap();
        let report = scanner(&l).recover(&l.staging, &l.dist, &l.output);

        assert_eq!(report.pass(RecoveryPass::Staging).unwrap().copied, 1);
        let copied = l.output.join("torch-2.4.1-cp310-cp310-linux_x86_64.whl");
        assert_eq!(fs::read_to_string(copied).unwrap(), "newer bytes");
    }

    #[test]
    fn test_falls_back_to_filesystem_search() {
        let l = layout();
        touch(&l.search.join("tmp").join("pip-build"), "torch-2.4.1-cp310-cp310-linux_x86_64.whl", "w");
        touch(&l.search.join("other"), "numpy-1.26-cp310-cp310-linux_x86_64.whl", "n");
        touch(&l.search, "torch-notes.txt", "t");

        let report = scanner(&l).recover(&l.staging, &l.dist, &l.output);

        assert!(report.used_fallback());
        assert_eq!(names(&report), vec!["torch-2.4.1-cp310-cp310-linux_x86_64.whl"]);
    }

    #[test]
    fn test_fallback_skipped_when_output_has_artifacts() {
        let l = layout();
        touch(&l.output, "torch-2.4.1-cp312-cp312-linux_x86_64.whl", "prior");
        touch(&l.search, "torch-2.4.1-cp39-cp39-linux_x86_64.whl", "stray");

        let report = scanner(&l).recover(&l.staging, &l.dist, &l.output);

        assert!(!report.used_fallback());
        assert_eq!(names(&report), vec!["torch-2.4.1-cp312-cp312-linux_x86_64.whl"]);
    }

    #[test]
    fn test_recovered_leaves_out_prior_output() {
        let l = layout();
        touch(&l.output, "torch-2.5.0-cp310-cp310-linux_x86_64.whl", "prior");
        touch(&l.staging, "torch-2.7.0-cp311-cp311-linux_x86_64.whl", "new");

        let report = scanner(&l).recover(&l.staging, &l.dist, &l.output);

        assert_eq!(report.artifacts.len(), 2);
        let recovered: Vec<&str> = report.recovered().collect();
        assert_eq!(recovered, vec!["torch-2.7.0-cp311-cp311-linux_x86_64.whl"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_search_skips_output_reached_through_symlink() {
        let l = layout();
        let real_output = l.search.join("real_out");
        touch(&real_output.join("archive"), "torch-2.0.0-cp38-cp38-linux_x86_64.whl", "old");
        let link = l.search.join("out_link");
        std::os::unix::fs::symlink(&real_output, &link).unwrap();

        let report = scanner(&l).recover(&l.staging, &l.dist, &link);

        assert!(report.used_fallback());
        let search = report.pass(RecoveryPass::FilesystemSearch).unwrap();
        assert!(search.found.is_empty());
        assert!(report.is_empty());
    }

    #[test]
    fn test_nothing_found_anywhere() {
        let l = layout();
        let report = scanner(&l).recover(&l.staging, &l.dist, &l.output);
        assert!(report.is_empty());
        assert!(report.used_fallback());
        assert!(report.passes.iter().all(|p| p.failures.is_empty()));
    }

    #[test]
    fn test_copy_of_missing_source_fails_softly() {
        let l = layout();
        let outcome = copy_artifact(&l.search.join("gone.whl"), &l.output);
        assert!(matches!(outcome, CopyOutcome::Failed(_)));
    }

    #[test]
    fn test_copy_onto_itself_is_noop() {
        let l = layout();
        let path = touch(&l.output, "torch-2.4.1-cp310-cp310-linux_x86_64.whl", "same");
        assert_eq!(copy_artifact(&path, &l.output), CopyOutcome::AlreadyPresent);
        assert_eq!(fs::read_to_string(&path).unwrap(), "same");
    }
}
