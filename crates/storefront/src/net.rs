//! Outbound HTTP helper for the checkout API.
//!
//! Every request carries an explicit time budget. Responses are classified
//! into [`NetworkError`] variants so callers can decide what is worth retrying
//! without looking at raw status codes.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::instrument;
use url::Url;

use crate::config::ApiConfig;

/// How much of an error body ends up in logs.
const LOGGED_BODY_CHARS: usize = 500;

/// Errors that can occur when calling the checkout API.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// The request did not complete within its budget.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection, TLS or protocol failure before a response arrived.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The endpoint is not deployed.
    #[error("Endpoint not found")]
    NotFound,

    /// Rate limited by the API.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// 5xx response.
    #[error("Server error {status}")]
    Server { status: u16, body: String },

    /// 4xx response other than 404 and 429.
    #[error("Client error {status}")]
    Client { status: u16, body: String },

    /// Response body was not the expected JSON.
    #[error("Invalid response body: {0}")]
    Decode(String),

    /// Path could not be joined onto the base URL.
    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl NetworkError {
    /// Whether repeating the same request may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Transport(_) | Self::RateLimited(_) | Self::Server { .. }
        )
    }

    fn from_reqwest(err: &reqwest::Error, budget: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(budget)
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// JSON client bound to the checkout API base URL.
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<HttpClientInner>,
}

struct HttpClientInner {
    client: reqwest::Client,
    base_url: Url,
    token: Option<SecretString>,
}

impl HttpClient {
    /// Create a client for the configured API.
    #[must_use]
    pub fn new(config: &ApiConfig) -> Self {
        Self::with_base_url(config.base_url.clone(), config.token.clone())
    }

    /// Create a client for an explicit base URL.
    #[must_use]
    pub fn with_base_url(base_url: Url, token: Option<SecretString>) -> Self {
        Self {
            inner: Arc::new(HttpClientInner {
                client: reqwest::Client::new(),
                base_url,
                token,
            }),
        }
    }

    /// Base URL requests are resolved against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    fn request(
        &self,
        method: reqwest::Method,
        path: &str,
    ) -> Result<reqwest::RequestBuilder, NetworkError> {
        let url = self.inner.base_url.join(path)?;
        let builder = self
            .inner
            .client
            .request(method, url)
            .header("Accept", "application/json");
        Ok(match &self.inner.token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        })
    }

    /// POST a JSON body and decode the JSON response.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError` classifying the failure.
    #[instrument(skip(self, body))]
    pub async fn post_json<B, R>(
        &self,
        path: &str,
        body: &B,
        budget: Duration,
    ) -> Result<R, NetworkError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let request = self.request(reqwest::Method::POST, path)?.json(body);

        let text = with_budget(budget, async move {
            let response = request
                .send()
                .await
                .map_err(|e| NetworkError::from_reqwest(&e, budget))?;
            let status = response.status();
            let retry_after = retry_after(&response);
            let text = response
                .text()
                .await
                .map_err(|e| NetworkError::from_reqwest(&e, budget))?;
            classify(status, retry_after, text)
        })
        .await?;

        serde_json::from_str(&text).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %truncate(&text),
                "Checkout API returned an unexpected body"
            );
            NetworkError::Decode(e.to_string())
        })
    }

    /// Check whether an endpoint is deployed with a GET.
    ///
    /// Only a 404 counts as absent. Any other response, including errors,
    /// means something is listening.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError::NotFound` for a 404, or the transport failure.
    #[instrument(skip(self))]
    pub async fn probe(&self, path: &str, budget: Duration) -> Result<StatusCode, NetworkError> {
        let request = self.request(reqwest::Method::GET, path)?;

        let status = with_budget(budget, async move {
            request
                .send()
                .await
                .map(|response| response.status())
                .map_err(|e| NetworkError::from_reqwest(&e, budget))
        })
        .await?;

        if status == StatusCode::NOT_FOUND {
            return Err(NetworkError::NotFound);
        }
        tracing::debug!(status = %status, "Endpoint probe answered");
        Ok(status)
    }
}

async fn with_budget<T>(
    budget: Duration,
    fut: impl Future<Output = Result<T, NetworkError>>,
) -> Result<T, NetworkError> {
    tokio::time::timeout(budget, fut)
        .await
        .map_err(|_| NetworkError::Timeout(budget))?
}

fn retry_after(response: &reqwest::Response) -> u64 {
    response
        .headers()
        .get("Retry-After")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(1)
}

fn classify(status: StatusCode, retry_after: u64, body: String) -> Result<String, NetworkError> {
    if status.is_success() {
        return Ok(body);
    }

    if status == StatusCode::NOT_FOUND {
        return Err(NetworkError::NotFound);
    }

    // Check for rate limiting
    if status == StatusCode::TOO_MANY_REQUESTS {
        tracing::warn!(retry_after, "Checkout API rate limited the request");
        return Err(NetworkError::RateLimited(retry_after));
    }

    tracing::error!(
        status = %status,
        body = %truncate(&body),
        "Checkout API returned non-success status"
    );

    // A 4xx with a JSON body may still carry a business verdict.
    if status.is_client_error() {
        return Err(NetworkError::Client {
            status: status.as_u16(),
            body,
        });
    }
    Err(NetworkError::Server {
        status: status.as_u16(),
        body,
    })
}

fn truncate(body: &str) -> String {
    body.chars().take(LOGGED_BODY_CHARS).collect()
}
