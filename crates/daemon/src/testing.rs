//! In-memory `AdminApi` used by the unit tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use provsync_api::{AdminApi, ApiError, BasicAuth, CreatedUser, HealthProbe, NewUser};
use provsync_core::ReloadTarget;

/// A recorded reload call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ReloadCall {
    pub target: ReloadTarget,
    pub user: String,
}

/// Healthy server that records every admin call.
pub(crate) struct FakeAdmin {
    user_id: i64,
    fail_create: bool,
    fail_grant: bool,
    fail_reloads: AtomicBool,
    reload_latency: Duration,
    /// Per target: (currently running, highest ever running).
    reload_concurrency: Mutex<BTreeMap<ReloadTarget, (usize, usize)>>,
    health_calls: AtomicUsize,
    created: Mutex<Vec<NewUser>>,
    granted: Mutex<Vec<i64>>,
    reloads: Mutex<Vec<ReloadCall>>,
}

impl Default for FakeAdmin {
    fn default() -> Self {
        Self {
            user_id: 1,
            fail_create: false,
            fail_grant: false,
            fail_reloads: AtomicBool::new(false),
            reload_latency: Duration::ZERO,
            reload_concurrency: Mutex::new(BTreeMap::new()),
            health_calls: AtomicUsize::new(0),
            created: Mutex::new(Vec::new()),
            granted: Mutex::new(Vec::new()),
            reloads: Mutex::new(Vec::new()),
        }
    }
}

impl FakeAdmin {
    pub fn with_user_id(mut self, id: i64) -> Self {
        self.user_id = id;
        self
    }

    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn failing_grant(mut self) -> Self {
        self.fail_grant = true;
        self
    }

    /// Every reload call takes `latency` (on the tokio clock) before answering.
    pub fn with_reload_latency(mut self, latency: Duration) -> Self {
        self.reload_latency = latency;
        self
    }

    /// Highest number of reload calls for `target` that were running at once.
    pub fn max_concurrent_reloads(&self, target: ReloadTarget) -> usize {
        self.reload_concurrency
            .lock()
            .unwrap()
            .get(&target)
            .map_or(0, |(_, max)| *max)
    }

    pub fn set_fail_reloads(&self, fail: bool) {
        self.fail_reloads.store(fail, Ordering::SeqCst);
    }

    pub fn created(&self) -> Vec<NewUser> {
        self.created.lock().unwrap().clone()
    }

    pub fn granted(&self) -> Vec<i64> {
        self.granted.lock().unwrap().clone()
    }

    pub fn reloads(&self) -> Vec<ReloadCall> {
        self.reloads.lock().unwrap().clone()
    }

    pub fn reloads_of(&self, target: ReloadTarget) -> usize {
        self.reloads().iter().filter(|c| c.target == target).count()
    }

    pub fn total_calls(&self) -> usize {
        self.health_calls.load(Ordering::SeqCst)
            + self.created.lock().unwrap().len()
            + self.granted.lock().unwrap().len()
            + self.reloads.lock().unwrap().len()
    }
}

fn status(status: u16, message: &str) -> ApiError {
    ApiError::Status {
        status,
        message: message.to_string(),
    }
}

#[async_trait::async_trait]
impl AdminApi for FakeAdmin {
    async fn health(&self) -> Result<HealthProbe, ApiError> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        Ok(HealthProbe {
            http_status: 200,
            database: Some("ok".to_string()),
        })
    }

    async fn create_user(&self, user: &NewUser) -> Result<CreatedUser, ApiError> {
        self.created.lock().unwrap().push(user.clone());
        if self.fail_create {
            return Err(status(412, "User with same login already exists"));
        }
        Ok(CreatedUser {
            id: self.user_id,
            message: Some("User created".to_string()),
        })
    }

    async fn grant_server_admin(&self, user_id: i64) -> Result<(), ApiError> {
        self.granted.lock().unwrap().push(user_id);
        if self.fail_grant {
            return Err(status(403, "Permission denied"));
        }
        Ok(())
    }

    async fn reload(&self, target: ReloadTarget, auth: &BasicAuth) -> Result<String, ApiError> {
        self.reloads.lock().unwrap().push(ReloadCall {
            target,
            user: auth.user().to_string(),
        });
        if !self.reload_latency.is_zero() {
            {
                let mut running = self.reload_concurrency.lock().unwrap();
                let (now, max) = running.entry(target).or_insert((0, 0));
                *now += 1;
                *max = (*max).max(*now);
            }
            tokio::time::sleep(self.reload_latency).await;
            if let Some((now, _)) = self.reload_concurrency.lock().unwrap().get_mut(&target) {
                *now -= 1;
            }
        }
        if self.fail_reloads.load(Ordering::SeqCst) {
            return Err(status(500, "Internal Server Error"));
        }
        Ok(format!("{target} config reloaded"))
    }
}
