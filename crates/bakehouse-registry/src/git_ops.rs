use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};

fn base_git_command() -> Command {
    let mut command = Command::new("git");
    command
        .arg("-c")
        .arg("core.autocrlf=false")
        .arg("-c")
        .arg("core.eol=lf");
    command
}

pub fn clone_repo(location: &str, destination: &Path, branch: Option<&str>) -> Result<()> {
    let mut command = base_git_command();
    command.arg("clone");
    if let Some(branch) = branch {
        command.arg("--branch").arg(branch);
    }
    command.arg("--").arg(location).arg(destination);

    let output = command
        .output()
        .with_context(|| format!("failed launching git clone for {location}"))?;
    if !output.status.success() {
        anyhow::bail!(
            "git clone of {} failed: {}",
            location,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

pub fn update_repo(repo_root: &Path) -> Result<()> {
    run_git_command(repo_root, &["fetch", "--prune", "origin"])?;
    run_git_command(repo_root, &["reset", "--hard", "FETCH_HEAD"])
}

/// Fetch-or-update a working copy: clone when the directory does not exist
/// yet, hard-sync to the remote head otherwise.
pub fn clone_or_update(location: &str, destination: &Path, branch: Option<&str>) -> Result<()> {
    if destination.join(".git").exists() {
        update_repo(destination)
    } else {
        clone_repo(location, destination, branch)
    }
}

fn run_git_command(repo_root: &Path, args: &[&str]) -> Result<()> {
    let output = base_git_command()
        .args(args)
        .current_dir(repo_root)
        .output()
        .with_context(|| format!("failed launching git {}", args.join(" ")))?;
    if !output.status.success() {
        anyhow::bail!(
            "git {} failed in {}: {}",
            args.join(" "),
            repo_root.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}
