use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{anyhow, Context, Result};

/// Synchronous subprocess collaborator. Scripts inherit the environment
/// and the standard streams.
pub trait ProcessRunner {
    fn run(&self, argv: &[String], cwd: &Path) -> Result<i32>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessRunner;

impl ProcessRunner for SystemProcessRunner {
    fn run(&self, argv: &[String], cwd: &Path) -> Result<i32> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("cannot run an empty command"))?;

        let status = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .status()
            .with_context(|| format!("failed to start '{program}'"))?;

        Ok(status.code().unwrap_or(-1))
    }
}

/// Search-path lookup collaborator.
pub trait PathProbe {
    fn resolve(&self, executable: &str) -> Option<PathBuf>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPathProbe;

impl PathProbe for SystemPathProbe {
    fn resolve(&self, executable: &str) -> Option<PathBuf> {
        let path = std::env::var_os("PATH")?;
        for dir in std::env::split_paths(&path) {
            let candidate = dir.join(executable);
            if is_executable_file(&candidate) {
                return Some(candidate);
            }
        }
        None
    }
}

#[cfg(unix)]
fn is_executable_file(candidate: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(candidate)
        .map(|metadata| metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable_file(candidate: &Path) -> bool {
    candidate.is_file()
}
