// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Consumes the command channel, dispatches to the owning module, and
//! writes results back.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::command::{CommandEntry, CommandStatus, CommandStore, ExecutionResult};
use crate::message::Channel;
use crate::module::ModuleRegistry;
use crate::queue::MultiTypeQueue;

pub struct CommandHandler {
    queue: Arc<MultiTypeQueue>,
    store: Arc<CommandStore>,
    registry: Arc<ModuleRegistry>,
    idle_backoff: Duration,
    default_timeout: Duration,
}

impl CommandHandler {
    pub fn new(
        queue: Arc<MultiTypeQueue>,
        store: Arc<CommandStore>,
        registry: Arc<ModuleRegistry>,
        idle_backoff: Duration,
        default_timeout: Duration,
    ) -> Self {
        Self { queue, store, registry, idle_backoff, default_timeout }
    }

    /// Main loop. Scans for crash-recovery rows before taking new commands
    /// off the channel.
    pub async fn run(&self, cancel: CancellationToken) {
        self.reconcile_in_progress().await;

        while !cancel.is_cancelled() {
            let batch = match self.queue.get_batch(Channel::Command, 1, usize::MAX).await {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(error = %e, "failed to read command channel");
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(self.idle_backoff) => {}
                    }
                    continue;
                }
            };

            let Some(queued) = batch.into_iter().next() else {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(self.idle_backoff) => {}
                }
                continue;
            };

            // Only drop the command off its own queue once the result has
            // been durably handed to the stateful channel; otherwise a
            // crash here would lose the result with no way to redeliver it.
            if self.handle_one(&queued.message.payload).await {
                if let Err(e) = self.queue.remove(Channel::Command, queued.sequence).await {
                    warn!(error = %e, "failed to acknowledge dispatched command");
                }
            } else {
                debug!("leaving command queued for retry after failed result delivery");
            }
        }
    }

    /// On startup, `InProgress` rows are either re-dispatched (module known
    /// and opted into `idempotent_restart`) or marked `Failure("interrupted")`.
    async fn reconcile_in_progress(&self) {
        let pending = match self.store.in_progress().await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(error = %e, "failed to scan in-progress commands at startup");
                return;
            }
        };

        for entry in pending {
            match self.registry.get(&entry.module) {
                Some(module) if module.idempotent_restart() => {
                    debug!(id = %entry.id, module = %entry.module, "re-dispatching interrupted command");
                    self.dispatch(entry).await;
                }
                _ => {
                    if self.push_result(&entry.id, CommandStatus::Failure, "interrupted").await.is_ok() {
                        let _ = self
                            .store
                            .record_result(&entry.id, ExecutionResult::new(CommandStatus::Failure, "interrupted"))
                            .await;
                    }
                }
            }
        }
    }

    /// Handles one command off the channel. Returns whether it is safe to
    /// pop the command off its queue: `true` once the result has been
    /// durably enqueued on the stateful channel (or there was never a
    /// result to deliver), `false` if delivery failed and the command
    /// should be retried on the next pass.
    async fn handle_one(&self, payload: &serde_json::Value) -> bool {
        let Some(id) = payload.get("id").and_then(|v| v.as_str()) else {
            warn!("dropping command with no id");
            return true;
        };
        let module = payload.get("module").and_then(|v| v.as_str()).unwrap_or("").to_string();
        let command = payload.get("command").and_then(|v| v.as_str()).unwrap_or("").to_string();
        let parameters = payload.get("parameters").cloned().unwrap_or(json!({}));
        let time = payload.get("time").and_then(|v| v.as_f64()).unwrap_or(0.0);

        match self.store.get(id).await {
            Ok(Some(existing)) if existing.execution_result.status.is_terminal() => {
                // Already resolved. Re-push the stored result rather than
                // silently dropping: if a prior crash landed between
                // marking the command terminal and enqueuing its result,
                // this is the only remaining chance to redeliver it.
                debug!(id, "re-delivering result for already-terminal command (dedup)");
                self.push_result(id, existing.execution_result.status, &existing.execution_result.message)
                    .await
                    .is_ok()
            }
            Ok(Some(existing)) => {
                // Present but InProgress: a crash recovery path handled at
                // startup already covers this; mid-run it means the manager
                // re-sent a command we're actively working. Re-dispatch.
                self.dispatch(existing).await
            }
            Ok(None) => match self.store.insert_in_progress(id, &module, &command, parameters, time).await {
                Ok(entry) => self.dispatch(entry).await,
                Err(e) => {
                    warn!(id, error = %e, "failed to persist new command");
                    false
                }
            },
            Err(e) => {
                warn!(id, error = %e, "failed to look up command in store");
                false
            }
        }
    }

    /// Executes the command and hands its result to the stateful channel.
    /// The push happens before the store is marked terminal: if the
    /// process dies in between, the command is still `InProgress` on
    /// restart and gets re-dispatched rather than the result being lost
    /// with no record of it ever having been produced. Returns whether the
    /// push succeeded.
    async fn dispatch(&self, entry: CommandEntry) -> bool {
        let timeout = per_command_timeout(&entry.parameters).unwrap_or(self.default_timeout);

        let result = match self.registry.get(&entry.module) {
            None => ExecutionResult::new(CommandStatus::Failure, "unknown module"),
            Some(module) => {
                match tokio::time::timeout(timeout, module.execute_command(&entry.command, &entry.parameters)).await
                {
                    Ok(result) => result,
                    Err(_) => ExecutionResult::new(CommandStatus::Timeout, "command execution timed out"),
                }
            }
        };

        let pushed = match self.push_result(&entry.id, result.status, &result.message).await {
            Ok(()) => true,
            Err(e) => {
                warn!(id = %entry.id, error = %e, "failed to enqueue command result message");
                false
            }
        };
        if pushed {
            if let Err(e) = self.store.record_result(&entry.id, result.clone()).await {
                warn!(id = %entry.id, error = %e, "failed to persist command result");
            }
        }
        pushed
    }

    async fn push_result(
        &self,
        id: &str,
        status: CommandStatus,
        message: &str,
    ) -> Result<(), crate::error::AgentError> {
        let payload = json!({ "id": id, "status": status.as_str(), "message": message });
        self.queue.push(Channel::Stateful, &payload, "command_handler", "command_result", None).await?;
        Ok(())
    }
}

fn per_command_timeout(parameters: &serde_json::Value) -> Option<Duration> {
    parameters.get("timeout_secs").and_then(|v| v.as_u64()).map(Duration::from_secs)
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
