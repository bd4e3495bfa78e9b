use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bakehouse_core::InstallKind;

/// Every path the tool touches derives from a single injected prefix, so
/// tests run against a temporary root and nothing consults process-global
/// state after startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixLayout {
    prefix: PathBuf,
}

impl PrefixLayout {
    pub fn new(prefix: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    pub fn packages_dir(&self) -> PathBuf {
        self.prefix.join("packages")
    }

    pub fn binaries_dir(&self) -> PathBuf {
        self.prefix.join("binaries")
    }

    pub fn apps_dir(&self) -> PathBuf {
        self.prefix.join("apps")
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.prefix.join("bin")
    }

    pub fn package_data_dir(&self) -> PathBuf {
        self.prefix.join("package_data")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.prefix.join(".cache")
    }

    pub fn package_data_path(&self, package: &str) -> PathBuf {
        self.package_data_dir().join(format!("{package}.toml"))
    }

    /// The root a freshly installed package of `kind` lands in.
    pub fn package_root(&self, kind: InstallKind) -> PathBuf {
        match kind {
            InstallKind::Binary => self.binaries_dir(),
            InstallKind::Build => self.packages_dir(),
        }
    }

    /// Where an installed package lives, probing every package root in
    /// order and returning the first that exists.
    pub fn installed_package_dir(&self, package: &str) -> Option<PathBuf> {
        [self.packages_dir(), self.binaries_dir(), self.apps_dir()]
            .into_iter()
            .map(|root| root.join(package))
            .find(|candidate| candidate.exists())
    }

    /// Names of all installed packages across the three package roots.
    pub fn installed_package_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for root in [self.packages_dir(), self.binaries_dir(), self.apps_dir()] {
            if !root.exists() {
                continue;
            }
            for entry in fs::read_dir(&root)
                .with_context(|| format!("failed reading {}", root.display()))?
            {
                let entry = entry?;
                if entry.file_type()?.is_dir() {
                    names.push(entry.file_name().to_string_lossy().to_string());
                }
            }
        }

        names.sort();
        names.dedup();
        Ok(names)
    }

    pub fn ensure_base_dirs(&self) -> Result<()> {
        for dir in [
            self.packages_dir(),
            self.binaries_dir(),
            self.apps_dir(),
            self.bin_dir(),
            self.package_data_dir(),
            self.cache_dir(),
        ] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }
}

pub fn default_user_prefix() -> Result<PathBuf> {
    if let Some(home) = std::env::var_os("BAKEHOUSE_HOME") {
        return Ok(PathBuf::from(home));
    }

    let home = std::env::var("HOME").context("HOME is not set; cannot resolve user prefix")?;
    Ok(PathBuf::from(home).join(".bakehouse"))
}
