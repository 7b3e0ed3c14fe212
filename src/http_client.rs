use anyhow::{Context, Result};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Method, Request, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use crate::auth::{error_detail, RequestInterceptor, ResponseInterceptor};
use crate::error::ApiError;

/// HTTP client for the backend API
///
/// Every call runs request interceptor → transport → response interceptor.
pub struct ApiClient {
    /// Shared HTTP client with connection pooling
    client: Client,

    /// API root, e.g. `http://localhost:8000/api/v1`
    base_url: String,

    requests: RequestInterceptor,
    responses: ResponseInterceptor,

    /// Maximum number of retries for 429, and for 5xx and network errors on
    /// idempotent methods
    max_retries: u32,

    /// Base delay for exponential backoff (milliseconds)
    base_delay_ms: u64,
}

/// Build the pooled reqwest client shared by the API client and the
/// refresh backend
pub fn build_http_client(
    max_connections: usize,
    connect_timeout: u64,
    request_timeout: u64,
) -> Result<Client> {
    Client::builder()
        .pool_max_idle_per_host(max_connections)
        .connect_timeout(Duration::from_secs(connect_timeout))
        .timeout(Duration::from_secs(request_timeout))
        .build()
        .context("Failed to create HTTP client")
}

impl ApiClient {
    pub fn new(
        client: Client,
        base_url: &str,
        requests: RequestInterceptor,
        responses: ResponseInterceptor,
        max_retries: u32,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            requests,
            responses,
            max_retries,
            base_delay_ms: 1000, // 1 second base delay
        }
    }

    /// Override the backoff base delay
    pub fn with_base_delay(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for an API path such as `auth/user/`
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Start a request against an API path
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.url(path))
    }

    /// Execute a request through the interceptors
    ///
    /// Returns successful responses; a 401 to an authorized request ends the
    /// session, other error statuses become `ApiError::Api`. 429 is retried
    /// with exponential backoff, 5xx and network errors only when resending
    /// cannot repeat a side effect.
    pub async fn execute(&self, request: Request) -> Result<Response, ApiError> {
        self.send(request, true).await
    }

    /// Execute without credentials, for endpoints that authenticate the
    /// caller by other means (login, registration, reset links)
    pub async fn execute_public(&self, request: Request) -> Result<Response, ApiError> {
        self.send(request, false).await
    }

    async fn send(&self, request: Request, authorize: bool) -> Result<Response, ApiError> {
        let request_id = uuid::Uuid::new_v4().to_string()[..8].to_string();
        let method = request.method().clone();
        let url = request.url().clone();
        let idempotent = method.is_idempotent();
        tracing::debug!(
            request_id = %request_id,
            method = %method,
            url = %url,
            "Sending API request"
        );

        let mut attempt = 0;
        loop {
            let req = request.try_clone().ok_or_else(|| {
                ApiError::Internal(anyhow::anyhow!("Request body is not cloneable"))
            })?;

            // Authorize each attempt separately so retries pick up a
            // refreshed token
            let req = if authorize {
                self.requests.intercept(req).await?
            } else {
                req
            };
            let authorized = req.headers().contains_key(AUTHORIZATION);

            match self.client.execute(req).await {
                Ok(response) => {
                    let status = response.status();
                    tracing::debug!(request_id = %request_id, status = %status, "Received API response");

                    // A 401 without credentials is a plain failure (e.g. a
                    // wrong password), not the end of a session
                    if status.is_success() || (status == StatusCode::UNAUTHORIZED && authorized) {
                        return self.responses.intercept(response).await;
                    }

                    let retryable = status == StatusCode::TOO_MANY_REQUESTS
                        || (status.is_server_error() && idempotent);
                    if retryable && attempt < self.max_retries {
                        let delay = self.calculate_backoff_delay(attempt);
                        tracing::warn!(
                            "[{}] Received {}, retrying after {}ms (attempt {}/{})",
                            request_id,
                            status,
                            delay,
                            attempt + 1,
                            self.max_retries
                        );
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        attempt += 1;
                        continue;
                    }

                    let error_text = response.text().await.unwrap_or_default();
                    tracing::error!(
                        request_id = %request_id,
                        status = status.as_u16(),
                        url = %url,
                        response_body = %error_text,
                        attempt = attempt + 1,
                        "API request failed with error response"
                    );
                    return Err(ApiError::Api {
                        status: status.as_u16(),
                        message: error_detail(&error_text).unwrap_or(error_text),
                    });
                }

                Err(e) => {
                    let error_kind = if e.is_timeout() {
                        "timeout"
                    } else if e.is_connect() {
                        "connection_failed"
                    } else if e.is_request() {
                        "request_error"
                    } else if e.is_body() {
                        "body_error"
                    } else {
                        "unknown"
                    };

                    // Refused connections never reached the server
                    if (idempotent || e.is_connect()) && attempt < self.max_retries {
                        let delay = self.calculate_backoff_delay(attempt);
                        tracing::warn!(
                            error_kind = error_kind,
                            error = %e,
                            "[{}] Request failed, retrying after {}ms (attempt {}/{})",
                            request_id,
                            delay,
                            attempt + 1,
                            self.max_retries
                        );
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        attempt += 1;
                        continue;
                    }

                    tracing::error!(
                        request_id = %request_id,
                        error_kind = error_kind,
                        error = %e,
                        url = %url,
                        total_attempts = attempt + 1,
                        "API request failed after all retries"
                    );
                    return Err(ApiError::Transport(e));
                }
            }
        }
    }

    /// Execute and decode a JSON body
    pub async fn execute_json<T: DeserializeOwned>(&self, request: Request) -> Result<T, ApiError> {
        let response = self.execute(request).await?;
        Ok(response.json().await?)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let request = self.request(Method::GET, path).build()?;
        self.execute_json(request).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.request(Method::POST, path).json(body).build()?;
        self.execute_json(request).await
    }

    pub async fn get_public_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let request = self.request(Method::GET, path).build()?;
        let response = self.execute_public(request).await?;
        Ok(response.json().await?)
    }

    pub async fn post_public_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.request(Method::POST, path).json(body).build()?;
        let response = self.execute_public(request).await?;
        Ok(response.json().await?)
    }

    pub async fn patch_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.request(Method::PATCH, path).json(body).build()?;
        self.execute_json(request).await
    }

    /// Calculate exponential backoff delay
    fn calculate_backoff_delay(&self, attempt: u32) -> u64 {
        // Exponential backoff: base_delay * 2^attempt
        // With jitter to avoid thundering herd
        let delay = self.base_delay_ms * 2_u64.pow(attempt);
        let jitter = (delay as f64 * 0.1 * rand::random::<f64>()) as u64;
        delay + jitter
    }

    /// Get the underlying HTTP client
    pub fn client(&self) -> &Client {
        &self.client
    }
}
