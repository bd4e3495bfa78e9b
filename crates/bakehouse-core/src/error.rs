use thiserror::Error;

/// Failure kinds surfaced to the driver. Everything else travels as plain
/// `anyhow` context on the way up.
#[derive(Debug, Error)]
pub enum BakehouseError {
    #[error("'{0}' was not found")]
    NotFound(String),

    #[error("'{0}' is already installed")]
    AlreadyInstalled(String),

    #[error("'{package}' is depended on by {} package(s): {}", dependants.len(), dependants.join(", "))]
    DependedOn {
        package: String,
        dependants: Vec<String>,
    },

    #[error("required external tool '{0}' was not found on the search path")]
    UseNotFound(String),

    #[error("{0}")]
    UnsupportedPackageType(String),

    #[error("unknown archive kind: '{0}'")]
    UnsupportedArchive(String),

    #[error("archive member '{0}' escapes the extraction directory")]
    PathTraversal(String),

    #[error("the bakery database is locked by another bakehouse process")]
    Locked,

    #[error("package '{0}' declares neither a repository nor an archive url")]
    SourceUnavailable(String),
}

impl BakehouseError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn already_installed(name: impl Into<String>) -> Self {
        Self::AlreadyInstalled(name.into())
    }
}
