mod git_ops;
mod lock;
mod store;

pub use git_ops::{clone_or_update, clone_repo, update_repo};
pub use lock::RegistryLock;
pub use store::{
    all_packages, resolve_owner, BakeryEntry, RefreshOutcome, Registry, RegistryHandle,
    RegistryStore, ShadowedPackage, BAKERY_DESCRIPTOR,
};
