// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token lifecycle plus the three long-lived cooperative tasks that talk to
//! the manager.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::{json, Value as Json};
use tokio::sync::{Notify, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent_info::AgentInfo;
use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::http_client::{HttpClient, HttpRequestParams};
use crate::message::Channel;
use crate::queue::MultiTypeQueue;
use crate::token::Token;

/// Shared token cell: read-mostly lock, rare writer (T1). Readers copy the
/// value and never hold the lock across I/O.
pub struct TokenCell {
    inner: RwLock<Option<Token>>,
    updated: Notify,
    auth_lost: AtomicBool,
    /// Woken by T2/T3 when the manager rejects a token with 401 before its
    /// natural expiry, so T1 re-authenticates immediately instead of
    /// waiting out its scheduled sleep.
    refresh_requested: Notify,
}

impl TokenCell {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(None),
            updated: Notify::new(),
            auth_lost: AtomicBool::new(false),
            refresh_requested: Notify::new(),
        }
    }

    pub async fn current(&self) -> Option<Token> {
        self.inner.read().await.clone()
    }

    async fn set(&self, token: Token) {
        *self.inner.write().await = Some(token);
        self.updated.notify_waiters();
    }

    pub fn auth_lost(&self) -> bool {
        self.auth_lost.load(Ordering::SeqCst)
    }

    fn mark_auth_lost(&self) {
        self.auth_lost.store(true, Ordering::SeqCst);
    }

    /// Drops the current token (if any) and wakes T1's refresh loop early.
    /// Uses `try_write` rather than the async path since callers are
    /// synchronous `FnMut` callbacks.
    pub fn invalidate(&self) {
        if let Ok(mut guard) = self.inner.try_write() {
            *guard = None;
        }
        self.refresh_requested.notify_waiters();
    }

    /// Waits until a valid token is available, or returns `None` if auth has
    /// been permanently lost.
    pub async fn wait_for_valid(&self, safety_skew: Duration) -> Option<Token> {
        loop {
            if self.auth_lost() {
                return None;
            }
            if let Some(token) = self.current().await {
                if token.is_valid(safety_skew) {
                    return Some(token);
                }
            }
            self.updated.notified().await;
        }
    }
}

impl Default for TokenCell {
    fn default() -> Self {
        Self::new()
    }
}

fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// Owns the three long-lived tasks: token refresh, command long-poll, and
/// message upload. Cheaply cloneable: every field is an `Arc`, so each
/// task can hold its own handle instead of borrowing a shared reference
/// across an `.await`.
#[derive(Clone)]
pub struct Communicator {
    http: Arc<HttpClient>,
    base_url: String,
    agent_info: Arc<AgentInfo>,
    queue: Arc<MultiTypeQueue>,
    token: Arc<TokenCell>,
    config: Arc<AgentConfig>,
    /// Consecutive non-retryable rejections per channel's current batch
    /// head, counted toward `poison_retry_limit`.
    poison_strikes: Arc<HashMap<&'static str, AtomicU32>>,
}

impl Communicator {
    pub fn new(
        http: Arc<HttpClient>,
        base_url: String,
        agent_info: Arc<AgentInfo>,
        queue: Arc<MultiTypeQueue>,
        config: Arc<AgentConfig>,
    ) -> Self {
        let mut poison_strikes = HashMap::new();
        for channel in [Channel::Stateless, Channel::Stateful] {
            poison_strikes.insert(channel.as_str(), AtomicU32::new(0));
        }
        Self {
            http,
            base_url,
            agent_info,
            queue,
            token: Arc::new(TokenCell::new()),
            config,
            poison_strikes: Arc::new(poison_strikes),
        }
    }

    pub fn token_cell(&self) -> Arc<TokenCell> {
        self.token.clone()
    }

    /// T1: token refresh.
    pub async fn run_token_refresh(&self, cancel: CancellationToken) {
        let mut backoff = self.config.retry_interval();
        let cap = self.config.max_backoff();

        loop {
            if cancel.is_cancelled() {
                return;
            }

            match self.authenticate().await {
                Ok(token) => {
                    backoff = self.config.retry_interval();
                    let sleep_for = token
                        .refresh_at(self.config.safety_skew())
                        .saturating_sub(now_unix());
                    self.token.set(token).await;
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(Duration::from_secs(sleep_for.max(1))) => {}
                        _ = self.token.refresh_requested.notified() => {}
                    }
                }
                Err(AgentError::AuthLost) => {
                    warn!("token refresh got 401; suspending background traffic");
                    self.token.mark_auth_lost();
                    return;
                }
                Err(e) => {
                    debug!(error = %e, backoff_secs = backoff.as_secs(), "token refresh failed, retrying");
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(cap);
                }
            }
        }
    }

    async fn authenticate(&self) -> Result<Token, AgentError> {
        let identity = self.agent_info.load_or_init("agent").await?;
        let url = format!("{}/security/user/authenticate", self.base_url);
        let params = HttpRequestParams::post(url).with_basic(identity.uuid, identity.key);
        let response = self.http.request(&params).await?;
        if response.status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(AgentError::AuthLost);
        }
        if !response.status.is_success() {
            return Err(AgentError::NetworkTransient(anyhow::anyhow!(
                "authenticate returned {}",
                response.status
            )));
        }
        let value = response
            .body
            .get("token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AgentError::NetworkPermanent(anyhow::anyhow!("authenticate response missing token")))?
            .to_string();
        let expires_at = response
            .body
            .get("expiresAt")
            .and_then(|v| v.as_u64())
            .unwrap_or_else(|| now_unix() + 900);
        info!("obtained new manager token");
        Ok(Token::new(value, expires_at))
    }

    /// T2: command long-poll, built on [`HttpClient::co_long_poll`]. Each
    /// outer iteration waits for a valid token, then runs the poll loop
    /// until it hits a 401, at which point it waits for T1 to publish a
    /// fresh token before resuming.
    pub async fn run_command_poll(&self, cancel: CancellationToken) {
        let wait_secs = self.config.long_poll_wait().as_secs();
        loop {
            if cancel.is_cancelled() {
                return;
            }
            let Some(token) = self.token.wait_for_valid(self.config.safety_skew()).await else {
                return;
            };
            let base_url = self.base_url.clone();
            let token_value = token.value.clone();
            let queue = self.queue.clone();
            let token_cell = self.token.clone();

            let _ = self
                .http
                .co_long_poll(
                    move || {
                        HttpRequestParams::get(format!("{base_url}/commands?wait={wait_secs}"))
                            .with_bearer(token_value.clone())
                    },
                    move |body| {
                        let queue = queue.clone();
                        async move {
                            if let Err(e) = enqueue_commands(&queue, body).await {
                                warn!(error = %e, "failed to enqueue commands from manager");
                            }
                        }
                    },
                    || !cancel.is_cancelled(),
                    self.config.retry_interval(),
                    self.config.long_poll_request_timeout(),
                    move || {
                        debug!("command poll got 401, triggering re-auth");
                        token_cell.invalidate();
                    },
                    &cancel,
                )
                .await;

            // co_long_poll only returns here on cancellation or a 401; either
            // way a short pause avoids a hot loop while waiting for T1 to
            // either cancel everything or publish a fresh token.
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.config.retry_interval()) => {}
            }
        }
    }

    /// T3: message upload, weighted round-robin biased toward the stateful
    /// (command-result) channel so replies aren't starved by telemetry.
    pub async fn run_message_upload(&self, cancel: CancellationToken) {
        const SCHEDULE: [Channel; 3] = [Channel::Stateful, Channel::Stateless, Channel::Stateful];
        let mut turn = 0usize;

        while !cancel.is_cancelled() {
            let Some(token) = self.token.wait_for_valid(self.config.safety_skew()).await else {
                return;
            };
            let channel = SCHEDULE[turn % SCHEDULE.len()];
            turn += 1;

            match self.upload_one_batch(channel, &token.value).await {
                Ok(true) => {}
                Ok(false) => {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(Duration::from_millis(200)) => {}
                    }
                }
                Err(e) => {
                    debug!(error = %e, ?channel, "upload failed, retrying after backoff");
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(self.config.retry_interval()) => {}
                    }
                }
            }
        }
    }

    /// Uploads at most one batch from `channel`. Returns `Ok(true)` if a
    /// non-empty batch was shipped and acknowledged.
    async fn upload_one_batch(&self, channel: Channel, token: &str) -> Result<bool, AgentError> {
        let Some(endpoint) = channel.upload_endpoint() else { return Ok(false) };
        let batch = self
            .queue
            .get_batch(channel, self.config.batch_count, self.config.batch_bytes)
            .await?;
        if batch.is_empty() {
            return Ok(false);
        }

        let wire: Vec<Json> = batch
            .iter()
            .map(|m| {
                json!({
                    "type": m.message.kind.as_str(),
                    "module_name": m.message.module_name,
                    "module_type": m.message.module_type,
                    "metadata": m.message.metadata,
                    "payload": m.message.payload,
                    "sequence": m.sequence,
                })
            })
            .collect();

        let url = format!("{}{}", self.base_url, endpoint);
        let params = HttpRequestParams::post(url).with_bearer(token).with_body(Json::Array(wire));
        let response = self.http.co_request(&params).await?;

        let Some(last_seq) = batch.last().map(|m| m.sequence) else {
            return Ok(true);
        };

        if response.status.is_success() {
            self.queue.remove(channel, last_seq).await?;
            self.poison_strikes[channel.as_str()].store(0, Ordering::SeqCst);
            Ok(true)
        } else if response.status == reqwest::StatusCode::UNAUTHORIZED {
            // Leave the batch in place, no message is dropped, and kick T1
            // awake rather than waiting out its scheduled sleep.
            self.token.invalidate();
            Err(AgentError::NetworkTransient(anyhow::anyhow!("upload got 401")))
        } else {
            let strikes = self.poison_strikes[channel.as_str()].fetch_add(1, Ordering::SeqCst) + 1;
            if strikes >= self.config.poison_retry_limit {
                warn!(
                    ?channel,
                    status = %response.status,
                    dropped = batch.len(),
                    "batch rejected by manager {strikes} times in a row, dropping as poison",
                );
                self.queue.remove(channel, last_seq).await?;
                self.poison_strikes[channel.as_str()].store(0, Ordering::SeqCst);
                Ok(true)
            } else {
                Err(AgentError::NetworkPermanent(anyhow::anyhow!("upload rejected: {}", response.status)))
            }
        }
    }
}

/// Pushes each command in a `/commands` long-poll response body onto the
/// command channel; deduplicating on `id` is the command handler's job,
/// this only needs to get them into the queue.
async fn enqueue_commands(queue: &MultiTypeQueue, body: Json) -> Result<(), AgentError> {
    let Json::Array(commands) = body else { return Ok(()) };
    for command in commands {
        let module = command.get("module").and_then(|v| v.as_str()).unwrap_or("unknown");
        queue.push(Channel::Command, &command, module, "command", None).await?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
