// Token refresh call against the authentication backend

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use super::types::{error_detail, RefreshRequest, RefreshResponse, Token};
use crate::error::AuthError;

/// Path of the refresh endpoint, relative to the API base URL
pub const REFRESH_PATH: &str = "auth/token/refresh/";

/// The one backend call the refresh coordinator makes
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Exchange a refresh token for a new access token (and possibly a
    /// rotated refresh token). Never retried by the caller.
    async fn refresh(&self, refresh: &Token) -> Result<RefreshResponse, AuthError>;
}

/// Refresh over HTTP. Bypasses the request/response interceptors.
pub struct HttpAuthBackend {
    client: Client,
    url: String,
}

impl HttpAuthBackend {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            url: refresh_url(base_url),
        }
    }
}

fn refresh_url(base_url: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), REFRESH_PATH)
}

#[async_trait]
impl AuthBackend for HttpAuthBackend {
    async fn refresh(&self, refresh: &Token) -> Result<RefreshResponse, AuthError> {
        tracing::info!("Refreshing access token...");

        let response = self
            .client
            .post(&self.url)
            .json(&RefreshRequest { refresh })
            .send()
            .await
            .map_err(|e| {
                let kind = if e.is_timeout() {
                    "timeout"
                } else if e.is_connect() {
                    "connection_failed"
                } else {
                    "request_error"
                };
                tracing::error!(error_kind = kind, error = %e, "Token refresh request failed");
                AuthError::RefreshTransport(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let detail = error_detail(&error_text);
            tracing::error!(
                status = status.as_u16(),
                detail = detail.as_deref().unwrap_or(""),
                "Token refresh rejected"
            );
            return Err(AuthError::RefreshRejected {
                status: status.as_u16(),
                detail,
            });
        }

        let data: RefreshResponse = response.json().await.map_err(|e| {
            AuthError::RefreshTransport(format!("Failed to parse refresh response: {}", e))
        })?;

        if data.access.is_empty() {
            return Err(AuthError::RefreshRejected {
                status: StatusCode::OK.as_u16(),
                detail: None,
            });
        }

        tracing::info!(
            rotated = data.refresh.is_some(),
            "Access token refreshed"
        );
        Ok(data)
    }
}
