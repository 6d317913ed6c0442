//! Shared HTTP plumbing for the REST connectors.
//!
//! Every connector talks JSON over `reqwest` with either basic or token
//! auth. Writes are paced by an [`AdaptiveDelay`] that grows when the
//! server throttles; a throttled request is retried once after the server's
//! `Retry-After` (or a fixed pause) before surfacing as `RateLimit`.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::ConnectorError;

/// Pause between writes at start.
pub const INITIAL_DELAY: Duration = Duration::from_millis(100);
/// Upper bound for the pause between writes.
pub const MAX_DELAY: Duration = Duration::from_secs(1);
/// Growth factor applied on every throttled response.
pub const BACKOFF_FACTOR: f64 = 1.5;
/// Wait before retrying a throttled request without `Retry-After`.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(2);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Write pacing that backs off when the server throttles.
#[derive(Debug)]
pub struct AdaptiveDelay {
    current: Mutex<Duration>,
    max: Duration,
    factor: f64,
}

impl Default for AdaptiveDelay {
    fn default() -> Self {
        Self::new(INITIAL_DELAY, MAX_DELAY, BACKOFF_FACTOR)
    }
}

impl AdaptiveDelay {
    #[must_use]
    pub fn new(initial: Duration, max: Duration, factor: f64) -> Self {
        Self {
            current: Mutex::new(initial.min(max)),
            max,
            factor,
        }
    }

    #[must_use]
    pub fn current(&self) -> Duration {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Grow the delay after a throttled response.
    pub fn on_rate_limited(&self) -> Duration {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        *current = current.mul_f64(self.factor).min(self.max);
        *current
    }

    /// Sleep for the current delay.
    pub async fn pace(&self) {
        let delay = self.current();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// How requests authenticate.
#[derive(Clone)]
pub enum Auth {
    Basic { user: String, password: String },
    /// Raw `Authorization` header value, e.g. `Token id:secret`.
    Header(String),
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Basic { user, .. } => f.debug_struct("Basic").field("user", user).finish_non_exhaustive(),
            Self::Header(_) => f.write_str("Header(..)"),
        }
    }
}

/// Add `https://` when the host has no scheme and drop trailing slashes.
#[must_use]
pub fn normalize_base_url(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

/// JSON client bound to one service.
#[derive(Debug)]
pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    auth: Auth,
    delay: AdaptiveDelay,
}

impl HttpClient {
    /// Build a client for `base_url` (scheme optional).
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new(base_url: &str, auth: Auth) -> Result<Self, ConnectorError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("stackbridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConnectorError::unknown(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: normalize_base_url(base_url),
            auth,
            delay: AdaptiveDelay::default(),
        })
    }

    #[must_use]
    pub fn with_delay(mut self, delay: AdaptiveDelay) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for an API path. Absolute URLs pass through unchanged.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.auth {
            Auth::Basic { user, password } => builder.basic_auth(user, Some(password)),
            Auth::Header(value) => builder.header(reqwest::header::AUTHORIZATION, value),
        }
    }

    /// GET a JSON document.
    ///
    /// # Errors
    ///
    /// Returns a classified [`ConnectorError`] on transport failure, a
    /// non-success status, or an undecodable body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T, ConnectorError> {
        let response = self
            .send(false, || self.request(Method::GET, path).query(query))
            .await?;
        decode(response).await
    }

    /// Send a JSON body and decode the JSON reply.
    ///
    /// # Errors
    ///
    /// See [`HttpClient::get_json`].
    pub async fn send_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, ConnectorError> {
        let write = method != Method::GET;
        let response = self
            .send(write, || self.request(method.clone(), path).json(body))
            .await?;
        decode(response).await
    }

    /// DELETE a resource.
    ///
    /// # Errors
    ///
    /// See [`HttpClient::get_json`].
    pub async fn delete(&self, path: &str) -> Result<(), ConnectorError> {
        self.send(true, || self.request(Method::DELETE, path)).await?;
        Ok(())
    }

    /// Send with pacing (writes only) and one retry on 429.
    async fn send(&self, write: bool, build: impl Fn() -> RequestBuilder) -> Result<Response, ConnectorError> {
        if write {
            self.delay.pace().await;
        }

        let mut response = build().send().await?;
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let wait = retry_after(&response).unwrap_or(DEFAULT_RETRY_AFTER);
            let next_delay = self.delay.on_rate_limited();
            warn!(
                url = %response.url(),
                wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                delay_ms = u64::try_from(next_delay.as_millis()).unwrap_or(u64::MAX),
                "Rate limited; backing off and retrying once"
            );
            tokio::time::sleep(wait).await;
            response = build().send().await?;
            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                self.delay.on_rate_limited();
            }
        }

        let status = response.status();
        if status.is_success() {
            debug!(url = %response.url(), status = status.as_u16(), "HTTP ok");
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ConnectorError::from_status(status.as_u16(), &body))
    }
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ConnectorError> {
    let url = response.url().to_string();
    let bytes = response.bytes().await?;
    // Some endpoints answer 204 on writes; decode that as JSON null.
    let slice: &[u8] = if bytes.is_empty() { b"null" } else { &bytes };
    serde_json::from_slice(slice).map_err(|e| ConnectorError::unknown(format!("unexpected response from {url}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url("acme.atlassian.net"), "https://acme.atlassian.net");
        assert_eq!(normalize_base_url("http://localhost:8080/"), "http://localhost:8080");
    }

    #[test]
    fn test_adaptive_delay_growth_is_capped() {
        let delay = AdaptiveDelay::default();
        assert_eq!(delay.current(), INITIAL_DELAY);
        assert_eq!(delay.on_rate_limited(), Duration::from_millis(150));
        for _ in 0..20 {
            delay.on_rate_limited();
        }
        assert_eq!(delay.current(), MAX_DELAY);
    }

    fn client(server: &MockServer) -> HttpClient {
        HttpClient::new(&server.uri(), Auth::Header("Token a:b".into()))
            .unwrap()
            .with_delay(AdaptiveDelay::new(Duration::ZERO, Duration::ZERO, 1.0))
    }

    #[tokio::test]
    async fn test_retries_once_after_429() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/thing"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/thing"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let value: serde_json::Value = client(&server).get_json("/api/thing", &[]).await.unwrap();
        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn test_persistent_429_is_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .mount(&server)
            .await;
        let err = client(&server)
            .get_json::<serde_json::Value>("/api/thing", &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ConnectorErrorKind::RateLimit);
    }

    #[tokio::test]
    async fn test_status_classification() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
            .mount(&server)
            .await;
        let err = client(&server)
            .get_json::<serde_json::Value>("/api/thing", &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ConnectorErrorKind::Auth);
        assert!(err.message.contains("bad token"));
    }
}
