use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use bakehouse_core::{
    parse_loose_version, ArchiveKind, BakehouseError, HostPlatform, InstallKind, Manifest,
    ManifestSection,
};
use bakehouse_registry::{resolve_owner, RegistryStore};
use tracing::{debug, info};

use crate::extract::extract_archive;
use crate::fetch::RemoteFetch;
use crate::layout::PrefixLayout;
use crate::links::{publish, retract, sweep, LinkReport};
use crate::manifests::{
    dependants_of, load_manifest, persist_manifest_copy,
};
use crate::scripts::{run_scripts, ScriptOutcome};
use crate::system::{PathProbe, ProcessRunner};

#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions {
    pub ignore_dependencies: bool,
    pub force_links: bool,
}

/// What one lifecycle operation did, for the driver to render. Script
/// failures live here instead of in the error channel.
#[derive(Debug, Default)]
pub struct OperationReport {
    pub package: String,
    pub scripts: Vec<ScriptOutcome>,
    pub links: LinkReport,
}

#[derive(Debug)]
pub struct UpdateOutcome {
    pub package: String,
    pub result: Result<OperationReport>,
}

/// The install/update/remove state machine. Every collaborator is
/// injected, so the engine runs identically against a temporary prefix
/// with fake fetch/process/path implementations.
pub struct Lifecycle<'a> {
    layout: &'a PrefixLayout,
    store: &'a RegistryStore,
    host: HostPlatform,
    fetch: &'a dyn RemoteFetch,
    runner: &'a dyn ProcessRunner,
    probe: &'a dyn PathProbe,
}

impl<'a> Lifecycle<'a> {
    pub fn new(
        layout: &'a PrefixLayout,
        store: &'a RegistryStore,
        host: HostPlatform,
        fetch: &'a dyn RemoteFetch,
        runner: &'a dyn ProcessRunner,
        probe: &'a dyn PathProbe,
    ) -> Self {
        Self {
            layout,
            store,
            host,
            fetch,
            runner,
            probe,
        }
    }

    /// Install a package. `spec` is a bare name or `name>=minver`.
    pub fn install(&self, spec: &str, options: InstallOptions) -> Result<OperationReport> {
        self.layout.ensure_base_dirs()?;

        let (package, min_version) = split_install_spec(spec);
        let registry = self.store.snapshot()?;
        let owner = resolve_owner(&registry, package)
            .ok_or_else(|| BakehouseError::not_found(package))?;

        let bakery_manifest = self.store.bakery_manifest_path(owner, package);
        if !bakery_manifest.exists() {
            return Err(BakehouseError::not_found(package).into());
        }
        let manifest = Manifest::from_path(&bakery_manifest)?;

        if let Some(required) = min_version {
            if !meets_minimum_version(&manifest, required) {
                return Err(BakehouseError::NotFound(format!(
                    "could not meet minimum version requirement {required} for {package}"
                ))
                .into());
            }
        }

        // The metadata copy lands before any filesystem mutation so
        // uninstall and info survive a failed build.
        persist_manifest_copy(self.layout, &bakery_manifest, package)?;

        if !options.ignore_dependencies {
            self.install_dependencies(&manifest.dependencies(self.host))?;
        }

        for tool in manifest.required_tools(self.host) {
            if self.probe.resolve(&tool).is_none() {
                return Err(BakehouseError::UseNotFound(tool).into());
            }
        }

        match manifest.install_kind() {
            Some(InstallKind::Binary) => self.install_binary(package, &manifest, options),
            Some(InstallKind::Build) => self.install_build(package, &manifest, options, false),
            None => Err(unsupported_type(package, &manifest).into()),
        }
    }

    fn install_dependencies(&self, dependencies: &[String]) -> Result<()> {
        for dependency in dependencies {
            info!(dependency = %dependency, "installing dependency");
            match self.install(dependency, InstallOptions::default()) {
                Ok(_) => {}
                Err(err)
                    if matches!(
                        error_kind(&err),
                        Some(BakehouseError::AlreadyInstalled(_))
                    ) =>
                {
                    debug!(dependency = %dependency, "dependency already installed, skipping");
                }
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("failed installing dependency '{dependency}'"));
                }
            }
        }
        Ok(())
    }

    fn install_binary(
        &self,
        package: &str,
        manifest: &Manifest,
        options: InstallOptions,
    ) -> Result<OperationReport> {
        let section = manifest
            .section(InstallKind::Binary)
            .ok_or_else(|| anyhow!("package '{package}' has no [binary] table"))?;

        let package_dir = self.layout.binaries_dir().join(package);
        if package_dir.exists() {
            return Err(BakehouseError::already_installed(package).into());
        }

        let url = section
            .url(self.host)
            .ok_or_else(|| BakehouseError::SourceUnavailable(package.to_string()))?;
        let kind = self.section_archive_kind(package, &section)?;

        let archive = self.cached_download(&url, Some(package))?;
        if let Some(expected) = section.sha256(self.host) {
            self.verify_download(&archive, &expected)?;
        }

        fs::create_dir_all(&package_dir)
            .with_context(|| format!("failed to create {}", package_dir.display()))?;
        if let Err(err) = extract_archive(kind, &archive, &package_dir, tar_strip(kind)) {
            let _ = fs::remove_dir_all(&package_dir);
            return Err(err);
        }

        let format_prefix = section.format_scripts(self.host).then(|| package_dir.clone());
        let scripts = run_scripts(
            self.runner,
            &section.scripts(self.host),
            &package_dir,
            format_prefix.as_deref(),
        );

        let links = publish(
            &section.link_dirs(self.host),
            &package_dir,
            self.layout,
            self.probe,
            options.force_links,
        )?;

        Ok(OperationReport {
            package: package.to_string(),
            scripts,
            links,
        })
    }

    fn install_build(
        &self,
        package: &str,
        manifest: &Manifest,
        options: InstallOptions,
        update: bool,
    ) -> Result<OperationReport> {
        let section = manifest
            .section(InstallKind::Build)
            .ok_or_else(|| anyhow!("package '{package}' has no [build] table"))?;

        let package_dir = self.layout.packages_dir().join(package);
        if !update && package_dir.exists() {
            return Err(BakehouseError::already_installed(package).into());
        }

        let workspace = self.acquire_build_source(package, &section)?;

        if update && package_dir.exists() {
            // Old install goes first so a failed build never leaves a
            // half-replaced directory behind.
            fs::remove_dir_all(&package_dir).with_context(|| {
                format!("failed to remove old install: {}", package_dir.display())
            })?;
        }
        fs::create_dir_all(package_dir.join("bin"))
            .with_context(|| format!("failed to create {}", package_dir.display()))?;

        let format_prefix = section.format_scripts(self.host).then(|| package_dir.clone());
        let mut scripts = run_scripts(
            self.runner,
            &section.scripts(self.host),
            &workspace,
            format_prefix.as_deref(),
        );

        let _ = fs::remove_dir_all(&workspace);

        scripts.extend(run_scripts(
            self.runner,
            &section.post_scripts(self.host),
            &package_dir,
            format_prefix.as_deref(),
        ));

        let links = publish(
            &section.link_dirs(self.host),
            &package_dir,
            self.layout,
            self.probe,
            options.force_links,
        )?;

        Ok(OperationReport {
            package: package.to_string(),
            scripts,
            links,
        })
    }

    /// Source for a build: a repository clone when `repo` is declared, a
    /// downloaded-and-extracted archive when `url` is, otherwise nothing
    /// to build from.
    fn acquire_build_source(
        &self,
        package: &str,
        section: &ManifestSection<'_>,
    ) -> Result<PathBuf> {
        if let Some(repo) = section.repo(self.host) {
            let workspace = self.layout.cache_dir().join(package);
            if workspace.exists() {
                fs::remove_dir_all(&workspace).with_context(|| {
                    format!("failed to clear build workspace: {}", workspace.display())
                })?;
            }
            let branch = section.branch(self.host);
            self.fetch
                .clone_or_update(&repo, &workspace, Some(branch.as_deref().unwrap_or("master")))
                .with_context(|| format!("failed to fetch source for '{package}'"))?;
            return Ok(workspace);
        }

        if let Some(url) = section.url(self.host) {
            let kind = self.section_archive_kind(package, section)?;
            let archive = self.cached_download(&url, None)?;
            if let Some(expected) = section.sha256(self.host) {
                self.verify_download(&archive, &expected)?;
            }

            let file_name = remote_file_name(&url);
            let workspace = self.layout.cache_dir().join(format!("extracted-{file_name}"));
            if workspace.exists() {
                fs::remove_dir_all(&workspace).with_context(|| {
                    format!("failed to clear build workspace: {}", workspace.display())
                })?;
            }
            extract_archive(kind, &archive, &workspace, tar_strip(kind))?;
            return Ok(workspace);
        }

        Err(BakehouseError::SourceUnavailable(package.to_string()).into())
    }

    /// Download into the cache unless the archive is already there. Binary
    /// installs cache under a per-package directory; build archives land
    /// in the cache root, both keyed by the remote file name.
    fn cached_download(&self, url: &str, package: Option<&str>) -> Result<PathBuf> {
        let cache_dir = match package {
            Some(package) => self.layout.cache_dir().join(package),
            None => self.layout.cache_dir(),
        };
        fs::create_dir_all(&cache_dir)
            .with_context(|| format!("failed to create {}", cache_dir.display()))?;

        let destination = cache_dir.join(remote_file_name(url));
        if destination.exists() {
            debug!(url, "using cached archive");
            return Ok(destination);
        }

        self.fetch.download(url, &destination, &mut |_event| {})?;
        Ok(destination)
    }

    fn verify_download(&self, archive: &Path, expected: &str) -> Result<()> {
        if !crate::fetch::verify_sha256(archive, expected)? {
            let _ = fs::remove_file(archive);
            anyhow::bail!(
                "checksum mismatch for {}; the cached file was discarded",
                archive.display()
            );
        }
        Ok(())
    }

    fn section_archive_kind(
        &self,
        package: &str,
        section: &ManifestSection<'_>,
    ) -> Result<ArchiveKind> {
        let name = section
            .archive_kind_name(self.host)
            .ok_or_else(|| anyhow!("package '{package}' does not declare an archive type"))?;
        Ok(ArchiveKind::parse(&name)?)
    }

    /// Update an installed package to the bakery's current manifest.
    pub fn update(&self, package: &str) -> Result<OperationReport> {
        self.layout.ensure_base_dirs()?;

        let registry = self.store.snapshot()?;
        let owner = resolve_owner(&registry, package)
            .ok_or_else(|| BakehouseError::not_found(package))?;
        let bakery_manifest = self.store.bakery_manifest_path(owner, package);
        if !bakery_manifest.exists() {
            return Err(BakehouseError::not_found(package).into());
        }

        let installed_path = self.layout.package_data_path(package);
        if !installed_path.exists() {
            return Err(BakehouseError::not_found(package).into());
        }

        let manifest = Manifest::from_path(&bakery_manifest)?;
        let installed = Manifest::from_path(&installed_path)?;

        // Idempotence check: equal versions mean there is nothing to do.
        if installed.version() == manifest.version() {
            return Err(BakehouseError::already_installed(package).into());
        }

        if !manifest.has_type(InstallKind::Build) {
            if manifest.has_type(InstallKind::Binary) {
                return Err(BakehouseError::UnsupportedPackageType(format!(
                    "binary packages cannot be updated in place; remove and reinstall '{package}'"
                ))
                .into());
            }
            return Err(unsupported_type(package, &manifest).into());
        }

        let package_dir = self.layout.packages_dir().join(package);
        if !package_dir.exists() {
            return Err(BakehouseError::not_found(package).into());
        }

        let section = manifest
            .section(InstallKind::Build)
            .ok_or_else(|| anyhow!("package '{package}' has no [build] table"))?;
        if section.repo(self.host).is_none() {
            return Err(BakehouseError::SourceUnavailable(package.to_string()).into());
        }

        persist_manifest_copy(self.layout, &bakery_manifest, package)?;
        let report = self.install_build(package, &manifest, InstallOptions::default(), true)?;
        sweep(self.layout)?;
        Ok(report)
    }

    /// Update every installed package; one failure never aborts the rest
    /// of the batch.
    pub fn update_all(&self) -> Result<Vec<UpdateOutcome>> {
        let mut outcomes = Vec::new();
        for package in self.layout.installed_package_names()? {
            let result = self.update(&package);
            outcomes.push(UpdateOutcome { package, result });
        }
        Ok(outcomes)
    }

    /// Remove an installed package unless something still depends on it.
    pub fn remove(&self, package: &str) -> Result<OperationReport> {
        let package_dir = self
            .layout
            .installed_package_dir(package)
            .ok_or_else(|| BakehouseError::not_found(package))?;

        let data_path = self.layout.package_data_path(package);
        if !data_path.exists() {
            return Err(BakehouseError::not_found(package).into());
        }
        let manifest = Manifest::from_path(&data_path)?;

        let dependants = dependants_of(self.layout, self.host, package)?;
        if !dependants.is_empty() {
            return Err(BakehouseError::DependedOn {
                package: package.to_string(),
                dependants,
            }
            .into());
        }

        let mut scripts = Vec::new();
        if let Some(section) = manifest
            .install_kind()
            .and_then(|kind| manifest.section(kind))
        {
            if let Some(uninstall) = section.uninstall() {
                scripts = run_scripts(
                    self.runner,
                    &uninstall.scripts(self.host),
                    &package_dir,
                    None,
                );
                scripts.extend(run_scripts(
                    self.runner,
                    &uninstall.post_scripts(self.host),
                    &package_dir,
                    None,
                ));
            }
        }

        fs::remove_dir_all(&package_dir)
            .with_context(|| format!("failed to remove {}", package_dir.display()))?;
        fs::remove_file(&data_path)
            .with_context(|| format!("failed to remove {}", data_path.display()))?;
        sweep(self.layout)?;

        Ok(OperationReport {
            package: package.to_string(),
            scripts,
            links: LinkReport::default(),
        })
    }

    /// The manifest for display: installed copy preferred, bakery
    /// fallback.
    pub fn get_info(&self, package: &str) -> Result<Manifest> {
        load_manifest(self.layout, self.store, package, true, true)
    }

    /// Re-publish an installed package's links.
    pub fn link(&self, package: &str, force: bool) -> Result<LinkReport> {
        let manifest = load_manifest(self.layout, self.store, package, true, false)?;
        let package_dir = self
            .layout
            .installed_package_dir(package)
            .ok_or_else(|| BakehouseError::not_found(package))?;
        publish(
            &manifest.link_dirs(self.host),
            &package_dir,
            self.layout,
            self.probe,
            force,
        )
    }

    /// Retract an installed package's links.
    pub fn unlink(&self, package: &str) -> Result<()> {
        let manifest = load_manifest(self.layout, self.store, package, true, false)?;
        let package_dir = self
            .layout
            .installed_package_dir(package)
            .ok_or_else(|| BakehouseError::not_found(package))?;
        retract(&manifest.link_dirs(self.host), &package_dir, self.layout)
    }
}

/// The typed kind anywhere in an error chain, if any.
pub fn error_kind(err: &anyhow::Error) -> Option<&BakehouseError> {
    err.chain().find_map(|cause| cause.downcast_ref())
}

fn unsupported_type(package: &str, manifest: &Manifest) -> BakehouseError {
    BakehouseError::UnsupportedPackageType(format!(
        "package '{package}' declares no supported install type (types = {:?})",
        manifest.types()
    ))
}

/// Tar payloads conventionally wrap everything in a top-level directory;
/// zip payloads do not.
fn tar_strip(kind: ArchiveKind) -> usize {
    if kind.is_tar_family() {
        1
    } else {
        0
    }
}

fn split_install_spec(spec: &str) -> (&str, Option<&str>) {
    match spec.split_once(">=") {
        Some((name, version)) => (name.trim(), Some(version.trim())),
        None => (spec.trim(), None),
    }
}

fn meets_minimum_version(manifest: &Manifest, required: &str) -> bool {
    let Some(actual) = manifest.version() else {
        return false;
    };
    match (parse_loose_version(required), parse_loose_version(&actual)) {
        (Some(required), Some(actual)) => actual >= required,
        _ => actual.as_str() >= required,
    }
}

fn remote_file_name(url: &str) -> String {
    url.rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("download")
        .to_string()
}
