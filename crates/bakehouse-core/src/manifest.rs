use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use toml::value::Table;
use toml::Value;

use crate::platform::{resolve_append, resolve_scalar, HostPlatform};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallKind {
    Binary,
    Build,
}

impl InstallKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::Build => "build",
        }
    }
}

/// A parsed package descriptor. Platform overlays make the table shape
/// open-ended, so the manifest stays a thin wrapper over the raw TOML
/// table with resolved accessors instead of a fixed serde struct.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    raw: Table,
}

impl Manifest {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let raw: Table = toml::from_str(input).context("failed to parse package manifest")?;

        let types = raw
            .get("types")
            .ok_or_else(|| anyhow!("manifest is missing the 'types' array"))?;
        let declared = types
            .as_array()
            .ok_or_else(|| anyhow!("manifest 'types' must be an array of strings"))?;
        if declared.is_empty() {
            return Err(anyhow!("manifest 'types' must not be empty"));
        }
        if declared.iter().any(|value| value.as_str().is_none()) {
            return Err(anyhow!("manifest 'types' must be an array of strings"));
        }

        Ok(Self { raw })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed reading manifest: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("failed parsing manifest: {}", path.display()))
    }

    pub fn raw(&self) -> &Table {
        &self.raw
    }

    pub fn types(&self) -> Vec<&str> {
        self.raw
            .get("types")
            .and_then(Value::as_array)
            .map(|values| values.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    pub fn has_type(&self, kind: InstallKind) -> bool {
        self.types().contains(&kind.as_str())
    }

    /// The kind an operation dispatches on; binary takes precedence over
    /// build when a manifest declares both.
    pub fn install_kind(&self) -> Option<InstallKind> {
        if self.has_type(InstallKind::Binary) {
            Some(InstallKind::Binary)
        } else if self.has_type(InstallKind::Build) {
            Some(InstallKind::Build)
        } else {
            None
        }
    }

    pub fn version(&self) -> Option<String> {
        scalar_to_string(self.raw.get("version")?)
    }

    pub fn display_name(&self) -> Option<&str> {
        self.raw.get("name").and_then(Value::as_str)
    }

    pub fn description(&self) -> Option<&str> {
        self.raw.get("desc").and_then(Value::as_str)
    }

    pub fn homepage(&self) -> Option<&str> {
        self.raw.get("homepage").and_then(Value::as_str)
    }

    pub fn license(&self) -> Option<&str> {
        self.raw.get("license").and_then(Value::as_str)
    }

    pub fn version_type(&self) -> Option<&str> {
        self.raw.get("version_type").and_then(Value::as_str)
    }

    pub fn architectures(&self, host: HostPlatform) -> Vec<String> {
        let key = match host.family {
            crate::platform::OsFamily::Darwin => "archs",
            crate::platform::OsFamily::Linux => "linux_archs",
        };
        self.raw
            .get(key)
            .and_then(Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn dependencies(&self, host: HostPlatform) -> Vec<String> {
        string_list(resolve_append(&self.raw, "dependencies", host))
    }

    pub fn required_tools(&self, host: HostPlatform) -> Vec<String> {
        string_list(resolve_append(&self.raw, "use", host))
    }

    /// Top-level link dirs, used by the standalone link/unlink operations.
    pub fn link_dirs(&self, host: HostPlatform) -> Vec<String> {
        link_dirs_or_default(&self.raw, host)
    }

    pub fn section(&self, kind: InstallKind) -> Option<ManifestSection<'_>> {
        let table = self.raw.get(kind.as_str())?.as_table()?;
        Some(ManifestSection { table })
    }
}

/// One install-type sub-table (`binary`, `build`, or a nested `uninstall`),
/// every accessor platform-resolved.
#[derive(Debug, Clone, Copy)]
pub struct ManifestSection<'a> {
    table: &'a Table,
}

impl<'a> ManifestSection<'a> {
    pub fn url(&self, host: HostPlatform) -> Option<String> {
        self.string("url", host)
    }

    pub fn repo(&self, host: HostPlatform) -> Option<String> {
        self.string("repo", host)
    }

    pub fn branch(&self, host: HostPlatform) -> Option<String> {
        self.string("branch", host)
    }

    pub fn sha256(&self, host: HostPlatform) -> Option<String> {
        self.string("sha256", host)
    }

    pub fn archive_kind_name(&self, host: HostPlatform) -> Option<String> {
        self.string("type", host)
    }

    pub fn format_scripts(&self, host: HostPlatform) -> bool {
        match resolve_scalar(self.table, "format_scripts", host) {
            Some(Value::Boolean(flag)) => flag,
            Some(_) => true,
            None => false,
        }
    }

    pub fn scripts(&self, host: HostPlatform) -> Vec<Vec<String>> {
        argv_list(resolve_append(self.table, "scripts", host))
    }

    pub fn post_scripts(&self, host: HostPlatform) -> Vec<Vec<String>> {
        argv_list(resolve_append(self.table, "post_scripts", host))
    }

    pub fn link_dirs(&self, host: HostPlatform) -> Vec<String> {
        link_dirs_or_default(self.table, host)
    }

    pub fn uninstall(&self) -> Option<ManifestSection<'a>> {
        let table = self.table.get("uninstall")?.as_table()?;
        Some(ManifestSection { table })
    }

    fn string(&self, key: &str, host: HostPlatform) -> Option<String> {
        resolve_scalar(self.table, key, host).and_then(|value| scalar_to_string(&value))
    }
}

fn link_dirs_or_default(table: &Table, host: HostPlatform) -> Vec<String> {
    let resolved = string_list(resolve_append(table, "link_dirs", host));
    if resolved.is_empty() {
        vec!["bin".to_string()]
    } else {
        resolved
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Integer(n) => Some(n.to_string()),
        Value::Float(n) => Some(n.to_string()),
        _ => None,
    }
}

fn string_list(values: Vec<Value>) -> Vec<String> {
    values
        .into_iter()
        .filter_map(|value| value.as_str().map(str::to_string))
        .collect()
}

/// Scripts are arrays of argv arrays; a bare string is tolerated as a
/// single-word command.
fn argv_list(values: Vec<Value>) -> Vec<Vec<String>> {
    values
        .into_iter()
        .filter_map(|value| match value {
            Value::Array(words) => Some(
                words
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
            ),
            Value::String(word) => Some(vec![word]),
            _ => None,
        })
        .filter(|argv: &Vec<String>| !argv.is_empty())
        .collect()
}
