use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use bakehouse_core::{ArchiveKind, BakehouseError};
use flate2::read::GzDecoder;
use xz2::read::XzDecoder;

/// Unpack an archive into `dest_dir`, dropping `strip_components` leading
/// path segments from every member.
///
/// Extraction is two-pass: every member path is validated before anything
/// is written, so a traversal attempt leaves the destination untouched.
pub fn extract_archive(
    kind: ArchiveKind,
    archive_path: &Path,
    dest_dir: &Path,
    strip_components: usize,
) -> Result<()> {
    match kind {
        ArchiveKind::Zip => extract_zip(archive_path, dest_dir, strip_components),
        _ => extract_tar(kind, archive_path, dest_dir, strip_components),
    }
}

fn open_tar(kind: ArchiveKind, path: &Path) -> Result<tar::Archive<Box<dyn Read>>> {
    let file =
        File::open(path).with_context(|| format!("failed to open archive: {}", path.display()))?;

    let reader: Box<dyn Read> = match kind {
        ArchiveKind::Tar => Box::new(file),
        ArchiveKind::TarGz => Box::new(GzDecoder::new(file)),
        ArchiveKind::TarXz => Box::new(XzDecoder::new(file)),
        ArchiveKind::Zip => unreachable!("zip archives take the zip path"),
    };

    Ok(tar::Archive::new(reader))
}

fn extract_tar(
    kind: ArchiveKind,
    archive_path: &Path,
    dest_dir: &Path,
    strip_components: usize,
) -> Result<()> {
    // Validation pass over every member; the stream is reopened for the
    // write pass afterwards.
    let mut archive = open_tar(kind, archive_path)?;
    for entry in archive
        .entries()
        .context("failed to read archive entries")?
    {
        let entry = entry.context("failed to read archive entry")?;
        let raw = entry
            .path()
            .context("failed to read archive member path")?
            .into_owned();
        let _ = checked_member_path(&raw, strip_components)?;
    }

    fs::create_dir_all(dest_dir)
        .with_context(|| format!("failed to create {}", dest_dir.display()))?;

    let mut archive = open_tar(kind, archive_path)?;
    for entry in archive
        .entries()
        .context("failed to read archive entries")?
    {
        let mut entry = entry.context("failed to read archive entry")?;
        let raw = entry
            .path()
            .context("failed to read archive member path")?
            .into_owned();
        let Some(relative) = checked_member_path(&raw, strip_components)? else {
            continue;
        };

        let target = dest_dir.join(relative);
        if entry.header().entry_type().is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("failed to create {}", target.display()))?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        entry
            .unpack(&target)
            .with_context(|| format!("failed to unpack {}", target.display()))?;
    }

    Ok(())
}

fn extract_zip(archive_path: &Path, dest_dir: &Path, strip_components: usize) -> Result<()> {
    let file = File::open(archive_path)
        .with_context(|| format!("failed to open archive: {}", archive_path.display()))?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("failed to read zip archive: {}", archive_path.display()))?;

    let mut targets: Vec<Option<PathBuf>> = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .context("failed to read zip entry")?;
        let Some(enclosed) = entry.enclosed_name() else {
            return Err(BakehouseError::PathTraversal(entry.name().to_string()).into());
        };
        targets.push(checked_member_path(&enclosed, strip_components)?);
    }

    fs::create_dir_all(dest_dir)
        .with_context(|| format!("failed to create {}", dest_dir.display()))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .context("failed to read zip entry")?;
        let Some(relative) = &targets[index] else {
            continue;
        };

        let target = dest_dir.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("failed to create {}", target.display()))?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut out = File::create(&target)
            .with_context(|| format!("failed to create {}", target.display()))?;
        io::copy(&mut entry, &mut out)
            .with_context(|| format!("failed to write {}", target.display()))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&target, fs::Permissions::from_mode(mode))
                .with_context(|| format!("failed to set mode on {}", target.display()))?;
        }
    }

    Ok(())
}

/// Strip the leading segments from a member path, then require what is
/// left to stay inside the destination: no parent references, no absolute
/// components. `None` means the path was fully consumed by stripping.
fn checked_member_path(raw: &Path, strip_components: usize) -> Result<Option<PathBuf>> {
    let parts: Vec<Component<'_>> = raw
        .components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect();

    let mut relative = PathBuf::new();
    let mut any = false;
    for component in parts.into_iter().skip(strip_components) {
        match component {
            Component::Normal(part) => {
                relative.push(part);
                any = true;
            }
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(BakehouseError::PathTraversal(raw.display().to_string()).into());
            }
            Component::CurDir => {}
        }
    }

    Ok(any.then_some(relative))
}
