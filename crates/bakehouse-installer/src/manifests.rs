use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use bakehouse_core::{BakehouseError, HostPlatform, Manifest};
use bakehouse_registry::{resolve_owner, RegistryStore};
use tracing::warn;

use crate::layout::PrefixLayout;

/// Load a package's manifest: the installed copy when preferred and
/// present, the owning bakery's working copy as fallback.
pub fn load_manifest(
    layout: &PrefixLayout,
    store: &RegistryStore,
    package: &str,
    prefer_installed: bool,
    fallback_to_bakery: bool,
) -> Result<Manifest> {
    if prefer_installed {
        let installed = layout.package_data_path(package);
        if installed.exists() {
            return Manifest::from_path(&installed);
        }
    }

    if fallback_to_bakery {
        let registry = store.snapshot()?;
        if let Some(owner) = resolve_owner(&registry, package) {
            let path = store.bakery_manifest_path(owner, package);
            if path.exists() {
                return Manifest::from_path(&path);
            }
        }
    }

    Err(BakehouseError::not_found(package).into())
}

/// Persist the manifest into the installed-metadata store so uninstall and
/// info keep working even if the bakery disappears or the build fails.
pub fn persist_manifest_copy(layout: &PrefixLayout, source: &Path, package: &str) -> Result<()> {
    fs::create_dir_all(layout.package_data_dir()).with_context(|| {
        format!("failed to create {}", layout.package_data_dir().display())
    })?;
    let destination = layout.package_data_path(package);
    fs::copy(source, &destination).with_context(|| {
        format!(
            "failed to copy manifest {} -> {}",
            source.display(),
            destination.display()
        )
    })?;
    Ok(())
}

/// Names of every package with an installed-metadata copy.
pub fn installed_manifest_names(layout: &PrefixLayout) -> Result<Vec<String>> {
    let dir = layout.package_data_dir();
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut names = Vec::new();
    for entry in
        fs::read_dir(&dir).with_context(|| format!("failed reading {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|v| v.to_str()) != Some("toml") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|v| v.to_str()) {
            names.push(stem.to_string());
        }
    }

    names.sort();
    Ok(names)
}

/// Installed packages whose dependency list names `package`. Version
/// suffixes (`dep>=1.2`) are stripped before comparison.
pub fn dependants_of(
    layout: &PrefixLayout,
    host: HostPlatform,
    package: &str,
) -> Result<Vec<String>> {
    let mut dependants = Vec::new();

    for name in installed_manifest_names(layout)? {
        if name == package {
            continue;
        }

        let path = layout.package_data_path(&name);
        let manifest = match Manifest::from_path(&path) {
            Ok(manifest) => manifest,
            Err(err) => {
                warn!(package = %name, error = %err, "skipping unreadable installed manifest");
                continue;
            }
        };

        if manifest
            .dependencies(host)
            .iter()
            .any(|dependency| dependency_name(dependency) == package)
        {
            dependants.push(name);
        }
    }

    Ok(dependants)
}

pub(crate) fn dependency_name(entry: &str) -> &str {
    entry.split(">=").next().unwrap_or(entry).trim()
}
