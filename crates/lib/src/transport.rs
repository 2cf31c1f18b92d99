//! HTTP transport: base-address resolution, bearer injection, bounded
//! timeouts, and a closed failure classification.
//!
//! Every classified failure is also pushed to the alert channel (opt-out per
//! call site with [`RequestOptions::local_only`], e.g. for login screens that
//! render their own inline error). A 401 outside the auth endpoints tears the
//! session down before the error is returned.

use crate::alerts::{self, Alerts};
use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::endpoints::is_auth_path;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Transport failure classification. `Http` carries the raw status and body
/// for callers that want to inspect them (e.g. login 401s).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),
    #[error("session expired")]
    SessionExpired,
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("unexpected transport failure: {0}")]
    Unexpected(String),
}

impl TransportError {
    /// Stable key for the alert channel; translated downstream.
    pub fn alert_key(&self) -> &'static str {
        match self {
            TransportError::Timeout => "error.network.timeout",
            TransportError::NetworkUnavailable(_) => "error.network.unavailable",
            TransportError::SessionExpired => alerts::SESSION_EXPIRED,
            TransportError::Http { .. } => "error.server",
            TransportError::Unexpected(_) => "error.unexpected",
        }
    }
}

/// Request body variants the core needs.
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    /// Multipart keeps its own content-type framing; the bearer header is
    /// still attached.
    Multipart(reqwest::multipart::Form),
}

/// Per-request options. `timeout` of None uses the transport default.
pub struct RequestOptions {
    pub method: Method,
    pub body: RequestBody,
    pub timeout: Option<Duration>,
    /// When false, a classified failure is returned to the caller only and
    /// not pushed to the alert channel.
    pub notify_global: bool,
}

impl RequestOptions {
    pub fn get() -> Self {
        Self {
            method: Method::GET,
            body: RequestBody::Empty,
            timeout: None,
            notify_global: true,
        }
    }

    pub fn post_json(body: serde_json::Value) -> Self {
        Self {
            method: Method::POST,
            body: RequestBody::Json(body),
            ..Self::get()
        }
    }

    pub fn post_multipart(form: reqwest::multipart::Form) -> Self {
        Self {
            method: Method::POST,
            body: RequestBody::Multipart(form),
            ..Self::get()
        }
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout = Some(Duration::from_millis(ms));
        self
    }

    /// Suppress the alert-channel push for this call; the caller handles the
    /// failure itself.
    pub fn local_only(mut self) -> Self {
        self.notify_global = false;
        self
    }
}

/// HTTP client bound to the API base address, credential store, and alert
/// channel.
#[derive(Clone)]
pub struct Transport {
    client: reqwest::Client,
    base_url: String,
    default_timeout: Duration,
    credentials: CredentialStore,
    alerts: Alerts,
    wire_log: bool,
}

impl Transport {
    pub fn new(config: &Config, credentials: CredentialStore, alerts: Alerts) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: crate::config::resolve_base_url(config)
                .trim_end_matches('/')
                .to_string(),
            default_timeout: Duration::from_millis(config.request_timeout_ms),
            credentials,
            alerts,
            wire_log: config.wire_log,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue a request and classify the outcome. Success is any 2xx response,
    /// returned raw so callers can pick the body shape themselves.
    pub async fn request(
        &self,
        path: &str,
        opts: RequestOptions,
    ) -> Result<reqwest::Response, TransportError> {
        let url = format!("{}{}", self.base_url, path);
        let timeout = opts.timeout.unwrap_or(self.default_timeout);

        let mut req = self
            .client
            .request(opts.method.clone(), &url)
            .timeout(timeout);
        if !is_auth_path(path) {
            if let Some(token) = self.credentials.token().await {
                req = req.bearer_auth(token);
            }
        }
        req = match opts.body {
            RequestBody::Empty => req,
            RequestBody::Json(v) => req.json(&v),
            RequestBody::Multipart(form) => req.multipart(form),
        };

        if self.wire_log {
            log::debug!("-> {} {}", opts.method, url);
        }

        let res = match req.send().await {
            Ok(res) => res,
            Err(e) => {
                return Err(self.classified(classify_send_error(e), path, opts.notify_global))
            }
        };

        let status = res.status();
        if self.wire_log {
            log::debug!("<- {} {}", status, url);
        }

        if status == StatusCode::UNAUTHORIZED && !is_auth_path(path) {
            self.teardown_session().await;
            return Err(self.classified(TransportError::SessionExpired, path, false));
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(self.classified(
                TransportError::Http {
                    status: status.as_u16(),
                    body,
                },
                path,
                opts.notify_global,
            ));
        }
        Ok(res)
    }

    /// GET `path` and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, TransportError> {
        let res = self.request(path, RequestOptions::get()).await?;
        decode_json(path, res).await
    }

    /// POST a JSON body to `path` and decode the JSON response.
    pub async fn post_json<B: serde::Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, TransportError> {
        let v = serde_json::to_value(body)
            .map_err(|e| TransportError::Unexpected(format!("encoding {} request: {}", path, e)))?;
        let res = self.request(path, RequestOptions::post_json(v)).await?;
        decode_json(path, res).await
    }

    /// Clear persisted credentials and announce the expired session. A
    /// request already in flight when this runs may still complete; its
    /// response is unreliable and callers must not act on it.
    async fn teardown_session(&self) {
        log::warn!("session rejected by server, clearing credentials");
        self.credentials.clear().await;
        self.alerts.notify(alerts::SESSION_EXPIRED);
    }

    fn classified(&self, err: TransportError, path: &str, notify: bool) -> TransportError {
        if self.wire_log {
            log::warn!("request to {} failed: {}", path, err);
        }
        if notify {
            self.alerts.notify(err.alert_key());
        }
        err
    }
}

fn classify_send_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() {
        TransportError::NetworkUnavailable(e.to_string())
    } else {
        TransportError::Unexpected(e.to_string())
    }
}

async fn decode_json<T: DeserializeOwned>(
    path: &str,
    res: reqwest::Response,
) -> Result<T, TransportError> {
    res.json::<T>()
        .await
        .map_err(|e| TransportError::Unexpected(format!("decoding {} response: {}", path, e)))
}
