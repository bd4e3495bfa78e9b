use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use bakehouse_core::BakehouseError;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::git_ops;
use crate::lock::RegistryLock;

/// Bakery-level descriptor file at the root of every working copy.
pub const BAKERY_DESCRIPTOR: &str = "_bakery.toml";

const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BakeryEntry {
    pub repo: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub maintainer: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub packages: Vec<String>,
    #[serde(default)]
    pub position: u32,
}

impl BakeryEntry {
    fn new(repo: impl Into<String>, position: u32) -> Self {
        Self {
            repo: repo.into(),
            name: String::new(),
            maintainer: String::new(),
            description: String::new(),
            packages: Vec::new(),
            position,
        }
    }
}

pub type Registry = BTreeMap<String, BakeryEntry>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowedPackage {
    pub package: String,
    pub winner: String,
    pub shadowed_in: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshOutcome {
    pub bakeries: Vec<String>,
    pub shadowed: Vec<ShadowedPackage>,
}

/// The bakery database: a single JSON file guarded by an advisory lock,
/// plus the bakery working copies next to it.
#[derive(Debug, Clone)]
pub struct RegistryStore {
    root: PathBuf,
    lock_wait: Duration,
}

impl RegistryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock_wait: DEFAULT_LOCK_WAIT,
        }
    }

    pub fn with_lock_wait(root: impl Into<PathBuf>, lock_wait: Duration) -> Self {
        Self {
            root: root.into(),
            lock_wait,
        }
    }

    pub fn registry_path(&self) -> PathBuf {
        self.root.join("bakery.json")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join("bakery.json.lock")
    }

    pub fn bakeries_dir(&self) -> PathBuf {
        self.root.join("bakery")
    }

    pub fn bakery_dir(&self, bakery: &str) -> PathBuf {
        self.bakeries_dir().join(bakery)
    }

    pub fn bakery_manifest_path(&self, bakery: &str, package: &str) -> PathBuf {
        self.bakery_dir(bakery)
            .join(package)
            .join(format!("{package}.toml"))
    }

    /// Acquire the lock and read the database. The returned handle holds
    /// the lock until it is saved or dropped.
    pub fn open(&self) -> Result<RegistryHandle> {
        let lock = RegistryLock::acquire(&self.lock_path(), self.lock_wait)?;
        let path = self.registry_path();

        let registry = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed reading bakery database: {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("failed parsing bakery database: {}", path.display()))?
        } else {
            Registry::new()
        };

        Ok(RegistryHandle {
            registry,
            path,
            _lock: lock,
        })
    }

    /// Read-only copy of the database; the lock is held only for the read.
    pub fn snapshot(&self) -> Result<Registry> {
        Ok(self.open()?.into_registry())
    }

    pub fn add_bakery(&self, name: &str, location: &str) -> Result<()> {
        let mut handle = self.open()?;

        let position = match handle.registry().get(name) {
            Some(existing) => {
                warn!(bakery = name, "bakery already exists, re-adding");
                existing.position
            }
            None => next_position(handle.registry()),
        };
        handle
            .registry_mut()
            .insert(name.to_string(), BakeryEntry::new(location, position));
        handle.save()
    }

    pub fn remove_bakery(&self, name: &str) -> Result<()> {
        let mut handle = self.open()?;
        if handle.registry_mut().remove(name).is_none() {
            return Err(BakehouseError::not_found(name).into());
        }
        handle.save()
    }

    /// Fetch-or-update every bakery working copy and re-derive the cached
    /// display fields and package lists, in registration order.
    pub fn refresh(&self) -> Result<RefreshOutcome> {
        self.refresh_with(|location, destination| {
            git_ops::clone_or_update(location, destination, None)
        })
    }

    pub fn refresh_with(
        &self,
        mut sync: impl FnMut(&str, &Path) -> Result<()>,
    ) -> Result<RefreshOutcome> {
        let mut handle = self.open()?;

        let order: Vec<String> = ordered_bakeries(handle.registry())
            .into_iter()
            .map(|(name, _)| name.to_string())
            .collect();

        for bakery in &order {
            let repo_dir = self.bakery_dir(bakery);
            let location = handle.registry()[bakery].repo.clone();
            sync(&location, &repo_dir)
                .with_context(|| format!("failed to sync bakery '{bakery}'"))?;

            let descriptor = read_descriptor(&repo_dir.join(BAKERY_DESCRIPTOR))?;
            let packages = list_package_dirs(&repo_dir)?;
            debug!(bakery = %bakery, packages = packages.len(), "refreshed bakery");

            if let Some(entry) = handle.registry_mut().get_mut(bakery) {
                entry.name = descriptor.name;
                entry.maintainer = descriptor.maintainer;
                entry.description = descriptor.description;
                entry.packages = packages;
            }
        }

        let shadowed = shadowed_packages(handle.registry());
        for entry in &shadowed {
            warn!(
                package = %entry.package,
                winner = %entry.winner,
                shadowed_in = %entry.shadowed_in,
                "package name exists in multiple bakeries; the first-registered bakery wins"
            );
        }

        handle.save()?;
        Ok(RefreshOutcome {
            bakeries: order,
            shadowed,
        })
    }
}

/// Scoped access to the database: owns the advisory lock, which is
/// released on save or on drop.
#[derive(Debug)]
pub struct RegistryHandle {
    registry: Registry,
    path: PathBuf,
    _lock: RegistryLock,
}

impl RegistryHandle {
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn into_registry(self) -> Registry {
        self.registry
    }

    /// Write-temp-then-rename so a concurrent reader never observes a
    /// partially written database.
    pub fn save(self) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.registry)
            .context("failed serializing bakery database")?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .with_context(|| format!("failed writing bakery database: {}", tmp.display()))?;
        fs::rename(&tmp, &self.path).with_context(|| {
            format!("failed replacing bakery database: {}", self.path.display())
        })
    }
}

/// Bakeries in registration order (position, then name for entries that
/// predate position tracking).
fn ordered_bakeries(registry: &Registry) -> Vec<(&str, &BakeryEntry)> {
    let mut bakeries: Vec<(&str, &BakeryEntry)> = registry
        .iter()
        .map(|(name, entry)| (name.as_str(), entry))
        .collect();
    bakeries.sort_by(|left, right| {
        left.1
            .position
            .cmp(&right.1.position)
            .then_with(|| left.0.cmp(right.0))
    });
    bakeries
}

pub fn all_packages(registry: &Registry) -> BTreeMap<String, Vec<String>> {
    registry
        .iter()
        .map(|(name, entry)| (name.clone(), entry.packages.clone()))
        .collect()
}

/// The bakery owning `package`. First-registered wins when several
/// bakeries carry the same name.
pub fn resolve_owner<'a>(registry: &'a Registry, package: &str) -> Option<&'a str> {
    ordered_bakeries(registry)
        .into_iter()
        .find(|(_, entry)| entry.packages.iter().any(|candidate| candidate == package))
        .map(|(name, _)| name)
}

fn next_position(registry: &Registry) -> u32 {
    registry
        .values()
        .map(|entry| entry.position)
        .max()
        .map_or(0, |max| max + 1)
}

fn shadowed_packages(registry: &Registry) -> Vec<ShadowedPackage> {
    let mut shadowed = Vec::new();
    let mut first_owner: BTreeMap<&str, &str> = BTreeMap::new();

    for (bakery, entry) in ordered_bakeries(registry) {
        for package in &entry.packages {
            match first_owner.get(package.as_str()) {
                None => {
                    first_owner.insert(package.as_str(), bakery);
                }
                Some(winner) => shadowed.push(ShadowedPackage {
                    package: package.clone(),
                    winner: (*winner).to_string(),
                    shadowed_in: bakery.to_string(),
                }),
            }
        }
    }

    shadowed
}

#[derive(Debug, Default, Deserialize)]
struct BakeryDescriptor {
    #[serde(default)]
    name: String,
    #[serde(default)]
    maintainer: String,
    #[serde(default)]
    description: String,
}

fn read_descriptor(path: &Path) -> Result<BakeryDescriptor> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed reading bakery descriptor: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("failed parsing bakery descriptor: {}", path.display()))
}

/// Top-level non-hidden subdirectories of a working copy.
fn list_package_dirs(repo_dir: &Path) -> Result<Vec<String>> {
    let mut packages = Vec::new();
    for entry in fs::read_dir(repo_dir)
        .with_context(|| format!("failed reading bakery directory: {}", repo_dir.display()))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        packages.push(name);
    }

    packages.sort();
    Ok(packages)
}
