// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport with TLS verification modes and long-poll support.

use std::future::Future;
use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde_json::Value as Json;
use tokio_util::sync::CancellationToken;

use crate::config::TlsVerifyMode;
use crate::error::AgentError;

/// Basic-auth or bearer credentials for a single request.
#[derive(Debug, Clone)]
pub enum Auth {
    None,
    Bearer(String),
    Basic { user: String, password: String },
}

/// Parameters for one request.
#[derive(Debug, Clone)]
pub struct HttpRequestParams {
    pub method: Method,
    /// Full URL; host/port/scheme already resolved (scheme defaults to
    /// HTTPS when the caller didn't specify one — see [`HttpClient::base_url`]).
    pub url: String,
    pub auth: Auth,
    pub body: Option<Json>,
}

impl HttpRequestParams {
    pub fn get(url: impl Into<String>) -> Self {
        Self { method: Method::GET, url: url.into(), auth: Auth::None, body: None }
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self { method: Method::POST, url: url.into(), auth: Auth::None, body: None }
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.auth = Auth::Bearer(token.into());
        self
    }

    pub fn with_basic(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = Auth::Basic { user: user.into(), password: password.into() };
        self
    }

    pub fn with_body(mut self, body: Json) -> Self {
        self.body = Some(body);
        self
    }
}

/// A completed response: status code and raw JSON body (empty object if
/// the body was empty or not JSON).
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: Json,
}

/// Thin wrapper over `reqwest::Client`. Bounds one in-flight request per
/// caller task by convention; callers achieve that by holding their own
/// `HttpClient` rather than sharing a `Semaphore` here.
pub struct HttpClient {
    client: reqwest::Client,
    request_timeout: Duration,
}

impl HttpClient {
    pub fn new(verify: TlsVerifyMode, request_timeout: Duration) -> Result<Self, AgentError> {
        let builder = reqwest::Client::builder().timeout(request_timeout);
        let builder = match verify {
            TlsVerifyMode::Full => builder,
            // Chain verification only: skip the hostname check but still
            // validate the certificate chain.
            TlsVerifyMode::Certificate => builder.danger_accept_invalid_hostnames(true),
        };
        let client = builder
            .build()
            .map_err(|e| AgentError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self { client, request_timeout })
    }

    /// Synchronous-style single request, used by registration.
    pub async fn request(&self, params: &HttpRequestParams) -> Result<HttpResponse, AgentError> {
        self.co_request(params).await
    }

    /// Cooperative single request, bound by the client-wide `request_timeout`.
    pub async fn co_request(&self, params: &HttpRequestParams) -> Result<HttpResponse, AgentError> {
        self.co_request_with_timeout(params, None).await
    }

    /// Like [`Self::co_request`] but overrides the deadline for this one
    /// request, so long-running request shapes (long-poll) aren't bound by
    /// the deadline sized for ordinary calls.
    async fn co_request_with_timeout(
        &self,
        params: &HttpRequestParams,
        timeout: Option<Duration>,
    ) -> Result<HttpResponse, AgentError> {
        let mut req = self.client.request(params.method.clone(), &params.url);
        if let Some(timeout) = timeout {
            req = req.timeout(timeout);
        }
        req = match &params.auth {
            Auth::None => req,
            Auth::Bearer(token) => req.bearer_auth(token),
            Auth::Basic { user, password } => req.basic_auth(user, Some(password)),
        };
        if let Some(body) = &params.body {
            req = req.json(body);
        }

        let response = req.send().await.map_err(classify_transport_error)?;
        let status = response.status();
        let body = response.json::<Json>().await.unwrap_or(Json::Null);
        Ok(HttpResponse { status, body })
    }

    /// Long-poll outer loop: while `should_continue` holds, issue a
    /// request, feed the body to `on_batch`. On 401, call `on_unauthorized`
    /// and break. On transport failure, sleep `retry_interval` with
    /// exponential backoff capped at 5 minutes. `request_timeout` overrides
    /// the client-wide deadline for each poll request, since a caller-chosen
    /// server-side wait can legitimately run longer than an ordinary call.
    pub async fn co_long_poll<OnBatch, OnBatchFut, ShouldContinue, OnUnauthorized>(
        &self,
        params_for: impl Fn() -> HttpRequestParams,
        mut on_batch: OnBatch,
        should_continue: ShouldContinue,
        retry_interval: Duration,
        request_timeout: Duration,
        mut on_unauthorized: OnUnauthorized,
        cancel: &CancellationToken,
    ) -> Result<(), AgentError>
    where
        OnBatch: FnMut(Json) -> OnBatchFut,
        OnBatchFut: Future<Output = ()>,
        ShouldContinue: Fn() -> bool,
        OnUnauthorized: FnMut(),
    {
        let mut backoff = retry_interval;
        let cap = Duration::from_secs(5 * 60);

        while should_continue() {
            let params = params_for();
            let outcome = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.co_request_with_timeout(&params, Some(request_timeout)) => result,
            };

            match outcome {
                Ok(response) if response.status == StatusCode::UNAUTHORIZED => {
                    on_unauthorized();
                    break;
                }
                Ok(response) if response.status.is_success() => {
                    on_batch(response.body).await;
                    backoff = retry_interval;
                }
                Ok(_) | Err(_) => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(cap);
                }
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

fn classify_transport_error(e: reqwest::Error) -> AgentError {
    AgentError::NetworkTransient(e.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_builders_set_auth() {
        let p = HttpRequestParams::get("https://mgr/commands").with_bearer("tok");
        assert!(matches!(p.auth, Auth::Bearer(ref t) if t == "tok"));
    }

    #[test]
    fn certificate_mode_client_builds() {
        assert!(HttpClient::new(TlsVerifyMode::Certificate, Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn full_mode_client_builds() {
        assert!(HttpClient::new(TlsVerifyMode::Full, Duration::from_secs(5)).is_ok());
    }
}
