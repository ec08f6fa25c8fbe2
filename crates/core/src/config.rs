use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Reads keys through a lookup function so tests never touch the process env.
struct Source<F> {
    lookup: F,
}

impl<F> Source<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// First non-empty value among `keys`.
    fn first(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .filter_map(|k| (self.lookup)(*k))
            .find(|v| !v.is_empty())
    }

    fn or(&self, keys: &[&str], default: &str) -> String {
        self.first(keys).unwrap_or_else(|| default.to_string())
    }

    fn u16(&self, keys: &[&str], default: u16) -> u16 {
        self.first(keys)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn u32(&self, keys: &[&str], default: u32) -> u32 {
        self.first(keys)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn u64(&self, keys: &[&str], default: u64) -> u64 {
        self.first(keys)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub paths: PathsConfig,
    pub health: HealthConfig,
    pub reload: ReloadConfig,
    /// Filter directive for the log subscriber (`RUST_LOG` overrides it).
    pub log_level: String,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    ///
    /// Every server/path key also accepts Grafana's own `GF_*` name so the
    /// sidecar can share the server container's environment.
    pub fn from_env() -> Self {
        Self::from_lookup(env_opt)
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let src = Source { lookup };
        Self {
            server: ServerConfig::from_source(&src),
            paths: PathsConfig::from_source(&src),
            health: HealthConfig::from_source(&src),
            reload: ReloadConfig::from_source(&src),
            log_level: src.or(&["LOG_LEVEL"], "info"),
        }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("config loaded:");
        tracing::info!("  server:      url={}, admin_user={}", self.server.base_url(), self.server.admin_user);
        tracing::info!("  paths:       provisioning={}, data_dir={}", self.paths.provisioning.display(), self.paths.data_dir.display());
        tracing::info!(
            "  health:      delay={}ms, retries={}, backoff={}..{}ms",
            self.health.startup_delay_ms,
            self.health.retries,
            self.health.backoff_ms,
            self.health.backoff_max_ms
        );
        tracing::info!("  reload:      debounce={}ms, trigger={}", self.reload.debounce_ms, self.reload.trigger);
        tracing::info!("  log_level:   {}", self.log_level);
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub protocol: String,
    pub domain: String,
    pub http_port: u16,
    /// Bootstrap credential, only used to create the service account.
    pub admin_user: String,
    pub admin_password: String,
}

impl ServerConfig {
    fn from_source<F: Fn(&str) -> Option<String>>(src: &Source<F>) -> Self {
        Self {
            protocol: src.or(&["SERVER_PROTOCOL", "GF_SERVER_PROTOCOL"], "http"),
            domain: src.or(&["SERVER_DOMAIN", "GF_SERVER_DOMAIN"], "localhost"),
            http_port: src.u16(&["SERVER_HTTP_PORT", "GF_SERVER_HTTP_PORT"], 3000),
            admin_user: src.or(&["SERVER_ADMIN_USER", "GF_SECURITY_ADMIN_USER"], "grafana"),
            admin_password: src.or(&["SERVER_ADMIN_PASSWORD", "GF_SECURITY_ADMIN_PASSWORD"], "grafana"),
        }
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.domain, self.http_port)
    }
}

// ── Paths ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of the watched provisioning tree.
    pub provisioning: PathBuf,
    pub data_dir: PathBuf,
}

impl PathsConfig {
    fn from_source<F: Fn(&str) -> Option<String>>(src: &Source<F>) -> Self {
        Self {
            provisioning: PathBuf::from(src.or(
                &["PROVISIONING_PATH", "GF_PATHS_PROVISIONING"],
                "/etc/grafana/provisioning",
            )),
            data_dir: PathBuf::from(src.or(&["DATA_DIR", "GRAFANA_PROVISIONING_CONFIG_RELOADER_DATA_DIR"], "/data")),
        }
    }

    pub fn credential_file(&self) -> PathBuf {
        self.data_dir.join("serviceaccount.json")
    }
}

// ── Health gate ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Fixed sleep before the first probe.
    pub startup_delay_ms: u64,
    /// Total probe attempts before giving up.
    pub retries: u32,
    /// Delay after the first failure; doubles per failure.
    pub backoff_ms: u64,
    pub backoff_max_ms: u64,
}

impl HealthConfig {
    fn from_source<F: Fn(&str) -> Option<String>>(src: &Source<F>) -> Self {
        Self {
            startup_delay_ms: src.u64(&["HEALTH_STARTUP_DELAY_MS"], 5_000),
            retries: src.u32(&["HEALTH_RETRIES"], 5).max(1),
            backoff_ms: src.u64(&["HEALTH_BACKOFF_MS"], 1_000),
            backoff_max_ms: src.u64(&["HEALTH_BACKOFF_MAX_MS"], 30_000),
        }
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    /// Backoff after the `failures`-th consecutive failure (1-based).
    pub fn backoff(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(16);
        let millis = self.backoff_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(millis.min(self.backoff_max_ms))
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            startup_delay_ms: 5_000,
            retries: 5,
            backoff_ms: 1_000,
            backoff_max_ms: 30_000,
        }
    }
}

// ── Reload dispatch ───────────────────────────────────────────

/// When a debounced burst produces its reload call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerPolicy {
    /// Fire once the window elapses with no further events, carrying the latest event.
    #[default]
    Trailing,
    /// Fire on the first event of a burst; suppress the rest until the window is quiet.
    Immediate,
}

impl std::fmt::Display for TriggerPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerPolicy::Trailing => f.write_str("trailing"),
            TriggerPolicy::Immediate => f.write_str("immediate"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadConfig {
    pub debounce_ms: u64,
    pub trigger: TriggerPolicy,
}

impl ReloadConfig {
    fn from_source<F: Fn(&str) -> Option<String>>(src: &Source<F>) -> Self {
        let trigger = match src.or(&["RELOAD_TRIGGER"], "trailing").to_lowercase().as_str() {
            "immediate" | "leading" => TriggerPolicy::Immediate,
            _ => TriggerPolicy::Trailing,
        };
        Self {
            debounce_ms: src.u64(&["RELOAD_DEBOUNCE_MS"], 2_000),
            trigger,
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 2_000,
            trigger: TriggerPolicy::Trailing,
        }
    }
}
