//! Turns raw change events into debounced, authenticated reload calls.
//!
//! Dashboards and datasources debounce independently. Each firing runs as
//! its own task so a slow reload of one target never delays the other, but a
//! target never has two reload calls in flight: a firing that comes due while
//! the previous call is still running waits for it and then goes out with the
//! latest trigger. Reload failures are logged and swallowed; the next
//! qualifying change retries implicitly.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use provsync_api::{AdminApi, BasicAuth};
use provsync_core::config::ReloadConfig;
use provsync_core::{ReloadTarget, ServiceCredential};

use crate::classify::PathClassifier;
use crate::debounce::Debouncer;
use crate::watcher::ChangeEvent;

/// What caused a reload call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Synthetic startup reload, independent of any filesystem change.
    Warm,
    Change(ChangeEvent),
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Warm => f.write_str("warm"),
            Trigger::Change(e) => write!(f, "{} {}", e.kind, e.path.display()),
        }
    }
}

/// Reports a finished reload call when dropped, even if the task panicked.
struct InFlight {
    target: ReloadTarget,
    done: mpsc::UnboundedSender<ReloadTarget>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        // Receiver only disappears with the dispatcher.
        let _ = self.done.send(self.target);
    }
}

pub struct ReloadDispatcher<A: ?Sized> {
    api: Arc<A>,
    /// Service credential header; never the bootstrap admin.
    auth: BasicAuth,
    classifier: PathClassifier,
    debouncer: Debouncer<ChangeEvent>,
    in_flight: BTreeSet<ReloadTarget>,
    /// Firings held back until the target's running call finishes.
    deferred: BTreeMap<ReloadTarget, Trigger>,
    done_tx: mpsc::UnboundedSender<ReloadTarget>,
    done_rx: mpsc::UnboundedReceiver<ReloadTarget>,
}

impl<A> ReloadDispatcher<A>
where
    A: AdminApi + ?Sized + 'static,
{
    pub fn new(
        api: Arc<A>,
        credential: &ServiceCredential,
        classifier: PathClassifier,
        config: &ReloadConfig,
    ) -> Self {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        Self {
            api,
            auth: BasicAuth::new(&credential.login, &credential.password),
            classifier,
            debouncer: Debouncer::new(config.debounce(), config.trigger),
            in_flight: BTreeSet::new(),
            deferred: BTreeMap::new(),
            done_tx,
            done_rx,
        }
    }

    /// Issue the warm reload, then process events until the stream closes.
    ///
    /// Pending debounce entries are dropped on close; in-flight calls are not awaited.
    pub async fn run(mut self, mut events: mpsc::Receiver<ChangeEvent>) {
        info!(user = %self.auth.user(), "dispatcher armed, issuing warm reload");
        for target in ReloadTarget::ALL {
            self.fire(target, Trigger::Warm);
        }

        loop {
            let deadline = self.debouncer.next_deadline();
            tokio::select! {
                received = events.recv() => match received {
                    Some(event) => self.on_event(event),
                    None => {
                        debug!("change stream closed, dispatcher stopping");
                        break;
                    }
                },
                _ = sleep_until(deadline) => {
                    for (target, event) in self.debouncer.take_due(Instant::now()) {
                        self.fire(target, Trigger::Change(event));
                    }
                }
                Some(target) = self.done_rx.recv() => self.on_finished(target),
            }
        }
    }

    /// Classify one raw event and schedule (or immediately fire) its targets.
    pub fn on_event(&mut self, event: ChangeEvent) {
        let targets = self.classifier.classify(&event.path);
        if targets.is_empty() {
            trace!(kind = %event.kind, path = %event.path.display(), "ignoring change");
            return;
        }

        let now = Instant::now();
        for target in targets {
            if let Some(event) = self.debouncer.offer(target, event.clone(), now) {
                self.fire(target, Trigger::Change(event));
            } else {
                debug!(%target, window_ms = self.debouncer.window().as_millis() as u64, "reload debounced");
            }
        }
    }

    fn on_finished(&mut self, target: ReloadTarget) {
        self.in_flight.remove(&target);
        if let Some(trigger) = self.deferred.remove(&target) {
            self.fire(target, trigger);
        }
    }

    fn fire(&mut self, target: ReloadTarget, trigger: Trigger) {
        if self.in_flight.contains(&target) {
            debug!(%target, trigger = %trigger, "reload still in flight, deferring");
            self.deferred.insert(target, trigger);
            return;
        }
        self.in_flight.insert(target);

        let api = Arc::clone(&self.api);
        let auth = self.auth.clone();
        let guard = InFlight {
            target,
            done: self.done_tx.clone(),
        };
        tokio::spawn(async move {
            let _guard = guard;
            match api.reload(target, &auth).await {
                Ok(message) => info!(%target, msg = %message, trigger = %trigger, "provisioning reloaded"),
                Err(e) => warn!(%target, error = %e, trigger = %trigger, "provisioning reload failed"),
            }
        });
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
