//! Provisioning sync daemon.
//!
//! Waits for the target server to become healthy, resolves a dedicated
//! service credential, then watches the provisioning tree and triggers
//! debounced dashboard/datasource reloads through the admin API.

pub mod classify;
pub mod debounce;
pub mod dispatcher;
pub mod health;
pub mod identity;
pub mod lifecycle;
pub mod watcher;

pub use classify::PathClassifier;
pub use dispatcher::ReloadDispatcher;
pub use health::{HealthError, HealthGate};
pub use identity::{CredentialStore, IdentityError, IdentityProvisioner};
pub use lifecycle::{Daemon, Phase, StartupError};
pub use watcher::{ChangeEvent, ChangeKind, ChangeWatcher, WatchError};

#[cfg(test)]
mod testing;
