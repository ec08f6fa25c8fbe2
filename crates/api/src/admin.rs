//! Typed admin calls made by the daemon, behind the [`AdminApi`] seam.

use serde::{Deserialize, Serialize};

use provsync_core::{ReloadTarget, ServiceCredential};

use crate::client::{ApiClient, BasicAuth};
use crate::error::ApiError;

/// One reading of `GET /api/health`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthProbe {
    pub http_status: u16,
    /// The `database` field of the body, when the body was JSON and carried one.
    pub database: Option<String>,
}

impl HealthProbe {
    pub(crate) fn from_body(http_status: u16, body: &[u8]) -> Self {
        #[derive(Deserialize)]
        struct HealthBody {
            database: Option<String>,
        }

        let database = serde_json::from_slice::<HealthBody>(body)
            .ok()
            .and_then(|b| b.database);
        Self { http_status, database }
    }

    /// `false` only when the server explicitly reported a database status other than `ok`.
    pub fn database_ok(&self) -> bool {
        self.database.as_deref().map_or(true, |d| d == "ok")
    }

    pub fn is_ready(&self) -> bool {
        self.http_status == 200 && self.database_ok()
    }
}

/// Body of `POST /api/admin/users`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub login: String,
    pub password: String,
}

impl From<&ServiceCredential> for NewUser {
    fn from(cred: &ServiceCredential) -> Self {
        Self {
            name: cred.login.clone(),
            email: cred.email.clone(),
            login: cred.login.clone(),
            password: cred.password.clone(),
        }
    }
}

/// Response of `POST /api/admin/users`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedUser {
    /// Server-assigned account id.
    pub id: i64,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PermissionsRequest {
    is_grafana_admin: bool,
}

/// API path (below `/api/`) of the reload endpoint for `target`.
pub fn reload_path(target: ReloadTarget) -> String {
    format!("admin/provisioning/{}/reload", target.as_str())
}

/// Admin operations the daemon needs from the target server.
#[async_trait::async_trait]
pub trait AdminApi: Send + Sync {
    /// Unauthenticated readiness probe.
    async fn health(&self) -> Result<HealthProbe, ApiError>;

    /// Create an account using the bootstrap credential.
    async fn create_user(&self, user: &NewUser) -> Result<CreatedUser, ApiError>;

    /// Elevate account `user_id` to full server administrator.
    async fn grant_server_admin(&self, user_id: i64) -> Result<(), ApiError>;

    /// Trigger a provisioning reload, authenticated as `auth`. Returns the server message.
    async fn reload(&self, target: ReloadTarget, auth: &BasicAuth) -> Result<String, ApiError>;
}

#[async_trait::async_trait]
impl AdminApi for ApiClient {
    async fn health(&self) -> Result<HealthProbe, ApiError> {
        ApiClient::health(self).await
    }

    async fn create_user(&self, user: &NewUser) -> Result<CreatedUser, ApiError> {
        self.write_json("admin/users", user, &[]).await
    }

    async fn grant_server_admin(&self, user_id: i64) -> Result<(), ApiError> {
        let path = format!("admin/users/{user_id}/permissions");
        let _: MessageResponse = self
            .update_json(&path, &PermissionsRequest { is_grafana_admin: true }, &[])
            .await?;
        Ok(())
    }

    async fn reload(&self, target: ReloadTarget, auth: &BasicAuth) -> Result<String, ApiError> {
        let response: MessageResponse = self
            .write_json(&reload_path(target), &serde_json::json!({}), &[auth.header()])
            .await?;
        Ok(response.message.unwrap_or_default())
    }
}
