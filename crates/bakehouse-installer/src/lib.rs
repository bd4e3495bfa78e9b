mod extract;
mod fetch;
mod layout;
mod lifecycle;
mod links;
mod manifests;
mod scripts;
mod system;

pub use extract::extract_archive;
pub use fetch::{verify_sha256, FetchEvent, HttpGitFetch, RemoteFetch};
pub use layout::{default_user_prefix, PrefixLayout};
pub use lifecycle::{error_kind, InstallOptions, Lifecycle, OperationReport, UpdateOutcome};
pub use links::{publish, retract, sweep, LinkReport};
pub use manifests::{dependants_of, installed_manifest_names, load_manifest, persist_manifest_copy};
pub use scripts::{run_scripts, ScriptOutcome};
pub use system::{PathProbe, ProcessRunner, SystemPathProbe, SystemProcessRunner};
