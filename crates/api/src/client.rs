//! Authenticated JSON request helper against the server's `/api` surface.
//!
//! No retries happen here; callers that need a retry policy own it.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;

use provsync_core::config::ServerConfig;

use crate::admin::HealthProbe;
use crate::error::ApiError;

const AUTHORIZATION: &str = "Authorization";
const CONTENT_TYPE: &str = "Content-Type";

/// A precomputed `Authorization: Basic ...` header value.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    user: String,
    value: String,
}

impl BasicAuth {
    pub fn new(user: &str, password: &str) -> Self {
        let token = STANDARD.encode(format!("{user}:{password}"));
        Self {
            user: user.to_string(),
            value: format!("Basic {token}"),
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// Header pair suitable for the `headers` argument of [`ApiClient::call`].
    pub fn header(&self) -> (&'static str, &str) {
        (AUTHORIZATION, &self.value)
    }
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("user", &self.user)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// Client for the admin API of a single target server.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    /// Bootstrap credential, applied when a call supplies no `Authorization`.
    admin: BasicAuth,
    /// Shared HTTP client (connection pooling).
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str, admin_user: &str, admin_password: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            admin: BasicAuth::new(admin_user, admin_password),
            http: reqwest::Client::new(),
        }
    }

    pub fn from_config(server: &ServerConfig) -> Self {
        Self::new(&server.base_url(), &server.admin_user, &server.admin_password)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Send a request to `{base}/api/{path}` and return the raw response.
    ///
    /// `Content-Type: application/json` and the bootstrap Basic credential are
    /// added unless `headers` already carries them (matched case-insensitively).
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        headers: &[(&str, &str)],
    ) -> Result<reqwest::Response, ApiError> {
        let has = |name: &str| headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name));

        let mut request = self.http.request(method.clone(), self.url(path));
        if !has(CONTENT_TYPE) {
            request = request.header(CONTENT_TYPE, "application/json");
        }
        if !has(AUTHORIZATION) {
            let (name, value) = self.admin.header();
            request = request.header(name, value);
        }
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        if let Some(body) = body {
            request = request.body(serde_json::to_vec(body)?);
        }

        tracing::debug!(%method, path, "admin api request");
        Ok(request.send().await?)
    }

    /// POST `body` as JSON and decode the JSON response.
    pub async fn write_json<B, T>(&self, path: &str, body: &B, headers: &[(&str, &str)]) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(Method::POST, path, body, headers).await
    }

    /// PUT `body` as JSON and decode the JSON response.
    pub async fn update_json<B, T>(&self, path: &str, body: &B, headers: &[(&str, &str)]) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(Method::PUT, path, body, headers).await
    }

    async fn send_json<B, T>(&self, method: Method, path: &str, body: &B, headers: &[(&str, &str)]) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        let response = self.call(method, path, Some(&body), headers).await?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await?;

        if status != 200 {
            return Err(ApiError::Status {
                status,
                message: error_message(&bytes, status),
            });
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Unauthenticated `GET /api/health`.
    ///
    /// Any HTTP status is returned as a probe; only transport failures are errors.
    pub async fn health(&self) -> Result<HealthProbe, ApiError> {
        let response = self.http.get(self.url("health")).send().await?;
        let http_status = response.status().as_u16();
        let bytes = response.bytes().await?;
        Ok(HealthProbe::from_body(http_status, &bytes))
    }
}

/// Server-reported `message` field, falling back to the raw body or the status reason.
pub(crate) fn error_message(body: &[u8], status: u16) -> String {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        message: Option<String>,
    }

    if let Ok(ErrorBody { message: Some(message) }) = serde_json::from_slice::<ErrorBody>(body) {
        return message;
    }
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if !text.is_empty() {
        return text.to_string();
    }
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("unknown error")
        .to_string()
}
