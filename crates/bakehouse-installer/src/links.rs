use std::fs;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::layout::PrefixLayout;
use crate::system::PathProbe;

/// Aggregated result of a publish pass. Skipped names collided with an
/// executable already resolvable on the search path; the caller reports
/// them once instead of failing the operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkReport {
    pub linked: Vec<String>,
    pub skipped: Vec<String>,
}

/// Link every file under the package's link directories into the shared
/// bin directory.
pub fn publish(
    link_dirs: &[String],
    package_dir: &Path,
    layout: &PrefixLayout,
    probe: &dyn PathProbe,
    force: bool,
) -> Result<LinkReport> {
    let mut report = LinkReport::default();
    fs::create_dir_all(layout.bin_dir())
        .with_context(|| format!("failed to create {}", layout.bin_dir().display()))?;

    for link_dir in link_dirs {
        let dir = package_dir.join(link_dir);
        if !dir.is_dir() {
            continue;
        }

        for entry in
            fs::read_dir(&dir).with_context(|| format!("failed reading {}", dir.display()))?
        {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let link_path = layout.bin_dir().join(&name);

            if force {
                if fs::symlink_metadata(&link_path).is_ok() {
                    fs::remove_file(&link_path).with_context(|| {
                        format!("failed to remove existing link: {}", link_path.display())
                    })?;
                }
            } else if probe.resolve(&name).is_some() {
                report.skipped.push(name);
                continue;
            }

            match std::os::unix::fs::symlink(entry.path(), &link_path) {
                Ok(()) => report.linked.push(name),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    report.skipped.push(name);
                }
                Err(err) => {
                    return Err(err).with_context(|| {
                        format!("failed to link {}", link_path.display())
                    });
                }
            }
        }
    }

    Ok(report)
}

/// Remove the shared-bin links for the same link-dir resolution,
/// unconditionally.
pub fn retract(link_dirs: &[String], package_dir: &Path, layout: &PrefixLayout) -> Result<()> {
    for link_dir in link_dirs {
        let dir = package_dir.join(link_dir);
        if !dir.is_dir() {
            continue;
        }

        for entry in
            fs::read_dir(&dir).with_context(|| format!("failed reading {}", dir.display()))?
        {
            let entry = entry?;
            let link_path = layout.bin_dir().join(entry.file_name());
            if fs::symlink_metadata(&link_path).is_ok() {
                fs::remove_file(&link_path).with_context(|| {
                    format!("failed to remove link: {}", link_path.display())
                })?;
            }
        }
    }

    Ok(())
}

/// Dangling-link garbage collection over the shared bin directory.
/// Returns the names that were removed.
pub fn sweep(layout: &PrefixLayout) -> Result<Vec<String>> {
    let bin_dir = layout.bin_dir();
    if !bin_dir.exists() {
        return Ok(Vec::new());
    }

    let mut removed = Vec::new();
    for entry in
        fs::read_dir(&bin_dir).with_context(|| format!("failed reading {}", bin_dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        let metadata = fs::symlink_metadata(&path)
            .with_context(|| format!("failed to stat {}", path.display()))?;
        if !metadata.file_type().is_symlink() {
            continue;
        }

        let target = fs::read_link(&path)
            .with_context(|| format!("failed to read link {}", path.display()))?;
        let resolved = if target.is_absolute() {
            target
        } else {
            bin_dir.join(target)
        };

        if !resolved.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("failed to remove dangling link {}", path.display()))?;
            removed.push(entry.file_name().to_string_lossy().to_string());
        }
    }

    if !removed.is_empty() {
        debug!(count = removed.len(), "pruned dangling links");
    }
    Ok(removed)
}
