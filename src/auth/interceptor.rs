// Request/response interceptors around every outbound API call

use chrono::Utc;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Request, Response, StatusCode};
use std::sync::Arc;

use super::credentials::CredentialStore;
use super::manager::RefreshCoordinator;
use super::redirect::RedirectGate;
use super::types::error_detail;
use crate::error::{ApiError, AuthError, SessionEnded};

/// Attaches `Authorization: Bearer <access>` to outbound requests
pub struct RequestInterceptor {
    store: Arc<dyn CredentialStore>,
    coordinator: Arc<RefreshCoordinator>,
}

impl RequestInterceptor {
    pub fn new(store: Arc<dyn CredentialStore>, coordinator: Arc<RefreshCoordinator>) -> Self {
        Self { store, coordinator }
    }

    /// Authorize `request`, waiting for a refresh if one is needed.
    ///
    /// Without stored credentials the request goes out unauthenticated. If
    /// the session ends while waiting the request is not sent.
    pub async fn intercept(&self, mut request: Request) -> Result<Request, ApiError> {
        let Some(credentials) = self.store.get().map_err(ApiError::Store)? else {
            tracing::debug!(url = %request.url(), "No stored credentials, sending unauthenticated");
            return Ok(request);
        };

        let token = self
            .coordinator
            .ensure_valid_access(&credentials, Utc::now())
            .await?;

        let value = HeaderValue::from_str(&token.bearer())
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("Invalid access token: {}", e)))?;
        request.headers_mut().insert(AUTHORIZATION, value);
        Ok(request)
    }
}

/// Ends the session on any `401 Unauthorized` response
pub struct ResponseInterceptor {
    store: Arc<dyn CredentialStore>,
    redirect: Arc<RedirectGate>,
}

impl ResponseInterceptor {
    pub fn new(store: Arc<dyn CredentialStore>, redirect: Arc<RedirectGate>) -> Self {
        Self { store, redirect }
    }

    /// Pass non-401 responses through; turn a 401 into a session end.
    ///
    /// Runs even right after a successful refresh: the server may reject a
    /// token the client considers valid (revocation, clock skew).
    pub async fn intercept(&self, response: Response) -> Result<Response, ApiError> {
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let url = response.url().clone();
        let body = response.text().await.unwrap_or_default();
        let ended = self.unauthorized(error_detail(&body));
        tracing::warn!(url = %url, reason = %ended.reason, "Request rejected as unauthenticated");
        Err(ended.into())
    }

    /// Clear the session and redirect, using the server's detail when present
    pub fn unauthorized(&self, detail: Option<String>) -> SessionEnded {
        if let Err(e) = self.store.clear() {
            tracing::error!("Failed to clear credentials: {:#}", e);
        }
        let ended = AuthError::Unauthorized { detail }.into_session_ended();
        self.redirect.trigger(&ended.reason);
        ended
    }
}
