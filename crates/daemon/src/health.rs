//! Startup gate: block until the target server reports itself healthy.

use provsync_api::AdminApi;
use provsync_core::config::HealthConfig;
use tracing::{debug, info, warn};

/// Reasons the gate gives up.
#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    /// The server reported a broken database. Not retried.
    #[error("server database is unavailable (status {status}, database {database:?})")]
    DatabaseUnavailable { status: u16, database: String },

    #[error("server not healthy after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

/// Polls `GET /api/health` with a bounded, exponentially backed-off retry budget.
pub struct HealthGate<'a, A: ?Sized> {
    api: &'a A,
    config: &'a HealthConfig,
}

impl<'a, A> HealthGate<'a, A>
where
    A: AdminApi + ?Sized,
{
    pub fn new(api: &'a A, config: &'a HealthConfig) -> Self {
        Self { api, config }
    }

    /// Return once a probe answers 200 with a healthy database.
    pub async fn await_ready(&self) -> Result<(), HealthError> {
        let delay = self.config.startup_delay();
        if !delay.is_zero() {
            debug!(delay_ms = delay.as_millis() as u64, "waiting before first health probe");
            tokio::time::sleep(delay).await;
        }

        let attempts = self.config.retries.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.api.health().await {
                Ok(probe) if !probe.database_ok() => {
                    return Err(HealthError::DatabaseUnavailable {
                        status: probe.http_status,
                        database: probe.database.unwrap_or_default(),
                    });
                }
                Ok(probe) if probe.http_status == 200 => {
                    info!(attempt, "server is healthy");
                    return Ok(());
                }
                Ok(probe) => {
                    last_error = format!("health check returned status {}", probe.http_status);
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }

            let remaining = attempts - attempt;
            warn!(attempt, remaining, error = %last_error, "health check failed");
            if remaining > 0 {
                tokio::time::sleep(self.config.backoff(attempt)).await;
            }
        }

        Err(HealthError::Exhausted { attempts, last_error })
    }
}
