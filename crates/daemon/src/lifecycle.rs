//! Startup state machine.
//!
//! `Idle → AwaitingHealth → ProvisioningIdentity → Watching → ShuttingDown`.
//! Phases run strictly in order; each failure surfaces as a [`StartupError`]
//! variant naming the phase that failed.

use std::future::Future;
use std::sync::{Arc, OnceLock};

use tokio::sync::mpsc;
use tracing::info;

use provsync_api::AdminApi;
use provsync_core::{Config, ServiceCredential};

use crate::classify::PathClassifier;
use crate::dispatcher::ReloadDispatcher;
use crate::health::{HealthError, HealthGate};
use crate::identity::{CredentialStore, IdentityError, IdentityProvisioner};
use crate::watcher::{ChangeWatcher, WatchError};

/// Capacity of the watcher → dispatcher channel.
const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingHealth,
    ProvisioningIdentity,
    Watching,
    ShuttingDown,
}

/// Fatal startup failures. The binary maps every variant to exit code 1.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("health gate failed: {0}")]
    Health(#[from] HealthError),

    #[error("identity provisioning failed: {0}")]
    Identity(#[from] IdentityError),

    #[error("invalid provisioning path pattern: {0}")]
    Pattern(#[from] globset::Error),

    #[error("cannot watch provisioning directory: {0}")]
    Watch(#[from] WatchError),
}

/// Owns the process-wide config and the write-once service credential.
pub struct Daemon<A: ?Sized> {
    config: Config,
    api: Arc<A>,
    phase: Phase,
    credential: OnceLock<ServiceCredential>,
}

impl<A> Daemon<A>
where
    A: AdminApi + ?Sized + 'static,
{
    pub fn new(config: Config, api: Arc<A>) -> Self {
        Self {
            config,
            api,
            phase: Phase::Idle,
            credential: OnceLock::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The resolved credential, once the identity phase has completed.
    pub fn credential(&self) -> Option<&ServiceCredential> {
        self.credential.get()
    }

    /// Run the startup chain and then watch until `shutdown` resolves.
    ///
    /// Returns `Ok` on shutdown. In-flight reloads and pending debounce
    /// timers are abandoned, not drained.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<(), StartupError>
    where
        F: Future<Output = ()>,
    {
        let result = tokio::select! {
            result = self.start() => result,
            _ = shutdown => Ok(()),
        };
        self.transition(Phase::ShuttingDown);
        result
    }

    async fn start(&mut self) -> Result<(), StartupError> {
        self.transition(Phase::AwaitingHealth);
        HealthGate::new(&*self.api, &self.config.health).await_ready().await?;

        self.transition(Phase::ProvisioningIdentity);
        let store = CredentialStore::new(self.config.paths.credential_file());
        let resolved = IdentityProvisioner::new(&*self.api, store).resolve_credential().await?;
        let credential = self.credential.get_or_init(|| resolved);
        info!(login = %credential.login, "using service account");

        let dispatcher = ReloadDispatcher::new(
            Arc::clone(&self.api),
            credential,
            PathClassifier::new()?,
            &self.config.reload,
        );

        self.transition(Phase::Watching);
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let _watcher = ChangeWatcher::start(&self.config.paths.provisioning, tx)?;
        dispatcher.run(rx).await;
        Ok(())
    }

    fn transition(&mut self, next: Phase) {
        info!(from = ?self.phase, to = ?next, "lifecycle transition");
        self.phase = next;
    }
}
