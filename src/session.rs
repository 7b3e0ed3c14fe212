// Session facade
// Wires the credential store, refresh coordinator and interceptors together
// and exposes the authentication endpoints

use anyhow::Context;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::sync::Arc;

use crate::auth::{
    error_detail, token_expiry, AuthBackend, CredentialPair, CredentialStore, ExpiryOracle,
    HttpAuthBackend, LoginRedirect, RedirectGate, RefreshCoordinator, RequestInterceptor,
    ResponseInterceptor, SqliteCredentialStore, UserProfile,
};
use crate::config::Config;
use crate::error::{ApiError, Result};
use crate::http_client::{build_http_client, ApiClient};
use crate::models::auth::{
    AuthPayload, CompleteOAuthRequest, DetailResponse, EmailRequest, GoogleAuthUrl,
    GoogleLoginRequest, LoginRequest, LogoutRequest, OAuthStateInfo, RegisterRequest,
    SetNewPasswordRequest, StateTokenRequest, UpdateUserRequest, VerifyEmailRequest,
};

const LOGOUT_PATH: &str = "auth/logout/";

/// Where the stored session stands at a given instant
#[derive(Debug, Clone, PartialEq)]
pub enum SessionStatus {
    LoggedOut,
    /// Access token usable as is
    Active {
        access_expires_at: Option<DateTime<Utc>>,
        refresh_expires_at: Option<DateTime<Utc>>,
    },
    /// Access token expired, next request will refresh
    Refreshable {
        refresh_expires_at: Option<DateTime<Utc>>,
    },
    /// Both tokens expired, next request will end the session
    Expired,
}

pub struct Session {
    store: Arc<dyn CredentialStore>,
    redirect: Arc<RedirectGate>,
    coordinator: Arc<RefreshCoordinator>,
    api: ApiClient,
}

impl Session {
    /// Build a session persisted in the configured SQLite database
    pub fn from_config(config: &Config, redirect: Arc<dyn LoginRedirect>) -> anyhow::Result<Self> {
        let store = Arc::new(
            SqliteCredentialStore::open(&config.session_db_file)
                .context("Failed to open session database")?,
        );
        let client = build_http_client(
            config.http_max_connections,
            config.http_connect_timeout,
            config.http_request_timeout,
        )?;
        let backend = Arc::new(HttpAuthBackend::new(client.clone(), &config.api_base_url));

        Ok(Self::new(
            client,
            &config.api_base_url,
            store,
            backend,
            ExpiryOracle::new(config.token_expiry_leeway),
            redirect,
            config.http_max_retries,
        ))
    }

    pub fn new(
        client: Client,
        base_url: &str,
        store: Arc<dyn CredentialStore>,
        backend: Arc<dyn AuthBackend>,
        oracle: ExpiryOracle,
        redirect: Arc<dyn LoginRedirect>,
        max_retries: u32,
    ) -> Self {
        let redirect = Arc::new(RedirectGate::new(redirect));
        let coordinator = Arc::new(RefreshCoordinator::new(
            store.clone(),
            backend,
            oracle,
            redirect.clone(),
        ));
        let api = ApiClient::new(
            client,
            base_url,
            RequestInterceptor::new(store.clone(), coordinator.clone()),
            ResponseInterceptor::new(store.clone(), redirect.clone()),
            max_retries,
        );

        Self {
            store,
            redirect,
            coordinator,
            api,
        }
    }

    /// Authenticated client for arbitrary API calls
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub fn is_authenticated(&self) -> Result<bool> {
        Ok(self.store.get().map_err(ApiError::Store)?.is_some())
    }

    pub fn status(&self, now: DateTime<Utc>) -> Result<SessionStatus> {
        let Some(pair) = self.store.get().map_err(ApiError::Store)? else {
            return Ok(SessionStatus::LoggedOut);
        };

        let oracle = self.coordinator.oracle();
        let status = if !oracle.is_expired(&pair.access, now) {
            SessionStatus::Active {
                access_expires_at: token_expiry(&pair.access),
                refresh_expires_at: token_expiry(&pair.refresh),
            }
        } else if !oracle.is_expired(&pair.refresh, now) {
            SessionStatus::Refreshable {
                refresh_expires_at: token_expiry(&pair.refresh),
            }
        } else {
            SessionStatus::Expired
        };
        Ok(status)
    }

    /// Persist whatever session material an endpoint returned.
    ///
    /// Returns `true` when a credential pair was stored.
    pub fn store_auth_payload(&self, payload: &AuthPayload) -> Result<bool> {
        let stored = match payload.credentials() {
            Some(pair) => {
                self.store.set(&pair).map_err(ApiError::Store)?;
                self.redirect.reset();
                true
            }
            None => false,
        };

        if let Some(ref user) = payload.user {
            self.store.set_user(user).map_err(ApiError::Store)?;
        }

        if stored {
            tracing::info!(
                user = payload.user.as_ref().map(|u| u.email.as_str()).unwrap_or(""),
                "Session established"
            );
        }
        Ok(stored)
    }

    async fn authenticate<B: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<AuthPayload> {
        let payload: AuthPayload = self.api.post_public_json(path, body).await?;
        self.store_auth_payload(&payload)?;
        Ok(payload)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthPayload> {
        self.authenticate(
            "auth/login/",
            &LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            },
        )
        .await
    }

    /// Register a new account. Tokens come back only when email
    /// verification is not mandatory.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        first_name: &str,
    ) -> Result<AuthPayload> {
        self.authenticate(
            "auth/registration/",
            &RegisterRequest {
                email: email.to_string(),
                password1: password.to_string(),
                password2: password.to_string(),
                first_name: first_name.to_string(),
            },
        )
        .await
    }

    pub async fn verify_email(&self, uid: &str, token: &str) -> Result<AuthPayload> {
        self.authenticate(
            "auth/verify-email/",
            &VerifyEmailRequest {
                uid: uid.to_string(),
                token: token.to_string(),
            },
        )
        .await
    }

    pub async fn resend_verification(&self, email: &str) -> Result<DetailResponse> {
        self.api
            .post_public_json(
                "auth/resend-verification/",
                &EmailRequest {
                    email: email.to_string(),
                },
            )
            .await
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<DetailResponse> {
        self.api
            .post_public_json(
                "auth/password-reset-request/",
                &EmailRequest {
                    email: email.to_string(),
                },
            )
            .await
    }

    pub async fn set_new_password(&self, request: &SetNewPasswordRequest) -> Result<AuthPayload> {
        self.authenticate("auth/set-new-password/", request).await
    }

    pub async fn google_auth_url(&self) -> Result<GoogleAuthUrl> {
        self.api.get_public_json("auth/social/google/url/").await
    }

    pub async fn google_login(&self, code: &str, state: &str) -> Result<AuthPayload> {
        self.authenticate(
            "auth/social/google/",
            &GoogleLoginRequest {
                code: code.to_string(),
                state: state.to_string(),
            },
        )
        .await
    }

    pub async fn complete_oauth_registration(
        &self,
        state_token: &str,
        terms_accepted: bool,
    ) -> Result<AuthPayload> {
        self.authenticate(
            "auth/social/google/complete/",
            &CompleteOAuthRequest {
                state_token: state_token.to_string(),
                terms_accepted,
            },
        )
        .await
    }

    pub async fn decode_oauth_state(&self, state_token: &str) -> Result<OAuthStateInfo> {
        self.api
            .post_public_json(
                "auth/social/google/decode-state/",
                &StateTokenRequest {
                    state_token: state_token.to_string(),
                },
            )
            .await
    }

    /// Fetch the signed-in user and refresh the cached copy
    pub async fn fetch_user(&self) -> Result<UserProfile> {
        let user: UserProfile = self.api.get_json("auth/user/").await?;
        self.store.set_user(&user).map_err(ApiError::Store)?;
        Ok(user)
    }

    /// Cached user, fetched on first use
    pub async fn current_user(&self) -> Result<UserProfile> {
        if let Some(user) = self.store.user().map_err(ApiError::Store)? {
            return Ok(user);
        }
        self.fetch_user().await
    }

    pub async fn update_user(&self, update: &UpdateUserRequest) -> Result<UserProfile> {
        let user: UserProfile = self.api.patch_json("auth/user/", update).await?;
        self.store.set_user(&user).map_err(ApiError::Store)?;
        Ok(user)
    }

    /// Blacklist the refresh token server-side (best effort) and forget the
    /// session locally. Explicit logout does not redirect.
    pub async fn logout(&self) -> Result<()> {
        if let Some(pair) = self.store.get().map_err(ApiError::Store)? {
            self.redirect.suppress();
            if self.coordinator.oracle().is_expired(&pair.refresh, Utc::now()) {
                tracing::debug!("Refresh token already expired, nothing to revoke");
            } else {
                match self.revoke(&pair).await {
                    Ok(()) => tracing::debug!("Refresh token revoked"),
                    Err(e) => tracing::warn!("Logout request failed, clearing locally: {}", e),
                }
            }
        }

        self.store.clear().map_err(ApiError::Store)?;
        tracing::info!("Logged out");
        Ok(())
    }

    /// Post the current refresh token to the logout endpoint, bypassing the
    /// response interceptor
    async fn revoke(&self, pair: &CredentialPair) -> Result<()> {
        let access = self.coordinator.ensure_valid_access(pair, Utc::now()).await?;

        // Authorizing may have rotated the refresh token
        let refresh = match self.store.get().map_err(ApiError::Store)? {
            Some(latest) => latest.refresh,
            None => pair.refresh.clone(),
        };

        let response = self
            .api
            .client()
            .post(self.api.url(LOGOUT_PATH))
            .bearer_auth(access.as_str())
            .json(&LogoutRequest { refresh })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Api {
                status: status.as_u16(),
                message: error_detail(&body).unwrap_or(body),
            });
        }
        Ok(())
    }
}
