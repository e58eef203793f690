// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable command lifecycle log. Thin, transition-aware wrapper over
//! [`Persistence`]'s command_store operations.

use std::sync::Arc;

use crate::command::{CommandEntry, CommandStatus, ExecutionResult};
use crate::error::PersistenceError;
use crate::persistence::Persistence;

pub struct CommandStore {
    persistence: Arc<dyn Persistence>,
}

impl CommandStore {
    pub fn new(persistence: Arc<dyn Persistence>) -> Self {
        Self { persistence }
    }

    pub async fn get(&self, id: &str) -> Result<Option<CommandEntry>, PersistenceError> {
        self.persistence.get_command(id).await
    }

    pub async fn in_progress(&self) -> Result<Vec<CommandEntry>, PersistenceError> {
        self.persistence.get_commands_by_status(CommandStatus::InProgress).await
    }

    pub async fn insert_in_progress(
        &self,
        id: &str,
        module: &str,
        command: &str,
        parameters: serde_json::Value,
        time: f64,
    ) -> Result<CommandEntry, PersistenceError> {
        let mut entry = CommandEntry::new(id, module, command, parameters, time);
        entry.execution_result = ExecutionResult::new(CommandStatus::InProgress, "");
        self.persistence.upsert_command(&entry).await?;
        Ok(entry)
    }

    /// Writes a terminal (or `InProgress`) result for `id`. Terminal states
    /// are sticky: once an id reaches `Success`/`Failure`/`Timeout`, further
    /// calls are no-ops.
    pub async fn record_result(&self, id: &str, result: ExecutionResult) -> Result<(), PersistenceError> {
        if let Some(existing) = self.get(id).await? {
            if existing.execution_result.status.is_terminal() {
                return Ok(());
            }
            let mut updated = existing;
            updated.execution_result = result;
            self.persistence.upsert_command(&updated).await?;
        }
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<(), PersistenceError> {
        self.persistence.delete_command(id).await
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
