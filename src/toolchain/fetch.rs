//! Builder repository checkout for toolchains older than the built-in layout.

use crate::error::BuildError;
use colored::*;
use git2::build::RepoBuilder;
use git2::{FetchOptions, Repository};
use std::io;
use std::path::Path;

/// Only the branch tip is fetched
pub const CLONE_DEPTH: i32 = 1;

fn shallow_fetch_options<'cb>() -> FetchOptions<'cb> {
    let mut options = FetchOptions::new();
    options.depth(CLONE_DEPTH);
    options
}

fn git_error(context: String, e: git2::Error) -> BuildError {
    BuildError::io(context, io::Error::other(e.message().to_string()))
}

/// Clone `url` at `branch` into `checkout`, unless something is already mounted there.
///
/// Returns `true` when a clone actually happened.
pub fn ensure_checkout(url: &str, branch: &str, checkout: &Path) -> Result<bool, BuildError> {
    if checkout.exists() {
        if let Some(head) = head_branch(checkout)
            && head != branch
        {
            println!(
                "   {} {} is on '{}', expected '{}'; using it as mounted",
                "!".yellow(),
                checkout.display(),
                head,
                branch
            );
        }
        return Ok(false);
    }

    println!(
        "   {} Cloning {} ({}) into {}",
        "⬇".cyan(),
        url,
        branch,
        checkout.display()
    );
    RepoBuilder::new()
        .branch(branch)
        .fetch_options(shallow_fetch_options())
        .clone(url, checkout)
        .map_err(|e| git_error(format!("Failed to clone {} at {}", url, branch), e))?;
    Ok(true)
}

/// Short name of the checked-out branch, if the directory is a git repository.
pub fn head_branch(checkout: &Path) -> Option<String> {
    let repo = Repository::open(checkout).ok()?;
    let head = repo.head().ok()?;
    if !head.is_branch() {
        return None;
    }
    head.shorthand().map(str::to_string)
}
