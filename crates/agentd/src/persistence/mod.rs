// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable local storage.
//!
//! Backed by `sqlx`/SQLite in WAL mode. The `Persistence` trait is the
//! narrow interface the queue and command store consume; `AgentInfo` talks
//! to the same pool directly for the `agent_info`/`agent_groups` tables,
//! which sit outside this trait's surface.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use serde_json::Value as Json;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::command::{CommandEntry, CommandStatus, ExecutionResult};
use crate::error::PersistenceError;
use crate::message::{Channel, Message, QueuedMessage};

/// Opens (creating if absent) the sqlite database at `path`, enables WAL,
/// and creates every table the core needs if it doesn't exist yet.
pub async fn open(path: &Path) -> Result<SqlitePool, PersistenceError> {
    let opts = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))
        .map_err(|_| PersistenceError::Unavailable)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(opts)
        .await
        .map_err(|_| PersistenceError::Unavailable)?;

    run_migrations(&pool).await?;
    Ok(pool)
}

async fn run_migrations(pool: &SqlitePool) -> Result<(), PersistenceError> {
    for stmt in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        sqlx::query(stmt)
            .execute(pool)
            .await
            .map_err(|_| PersistenceError::Corrupt)?;
    }
    Ok(())
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS agent_info (
    id INTEGER PRIMARY KEY CHECK (id = 0),
    name TEXT NOT NULL,
    uuid TEXT NOT NULL,
    key TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS agent_groups (
    group_name TEXT PRIMARY KEY,
    position INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS stateless (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    module TEXT NOT NULL,
    module_type TEXT NOT NULL,
    metadata TEXT,
    message TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS stateful (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    module TEXT NOT NULL,
    module_type TEXT NOT NULL,
    metadata TEXT,
    message TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS command (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    module TEXT NOT NULL,
    module_type TEXT NOT NULL,
    metadata TEXT,
    message TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS command_store (
    id TEXT PRIMARY KEY,
    module TEXT NOT NULL,
    command TEXT NOT NULL,
    parameters TEXT NOT NULL,
    status INTEGER NOT NULL,
    result TEXT NOT NULL,
    time REAL NOT NULL
)
"#;

/// The narrow storage interface the queue and command store consume.
/// Object-safe via `async-trait` so the queue can hold a `dyn Persistence`
/// without a generic parameter.
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn store(
        &self,
        channel: Channel,
        payload: &Json,
        module: &str,
        module_type: &str,
        metadata: Option<&str>,
    ) -> Result<i64, PersistenceError>;

    async fn retrieve_multiple(
        &self,
        channel: Channel,
        max_count: usize,
        max_bytes: usize,
    ) -> Result<Vec<QueuedMessage>, PersistenceError>;

    async fn remove(&self, channel: Channel, up_to_sequence: i64) -> Result<(), PersistenceError>;

    async fn count(&self, channel: Channel) -> Result<usize, PersistenceError>;

    async fn bytes(&self, channel: Channel) -> Result<usize, PersistenceError>;

    async fn upsert_command(&self, entry: &CommandEntry) -> Result<(), PersistenceError>;

    async fn get_command(&self, id: &str) -> Result<Option<CommandEntry>, PersistenceError>;

    async fn get_commands_by_status(
        &self,
        status: CommandStatus,
    ) -> Result<Vec<CommandEntry>, PersistenceError>;

    async fn delete_command(&self, id: &str) -> Result<(), PersistenceError>;
}

/// `sqlx`-backed implementation of [`Persistence`].
pub struct SqlitePersistence {
    pool: SqlitePool,
}

impl SqlitePersistence {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn open(path: &Path) -> Result<Self, PersistenceError> {
        Ok(Self::new(open(path).await?))
    }

    /// Exposes the underlying pool for `AgentInfo`, which owns tables
    /// outside the `Persistence` trait's surface.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Persistence for SqlitePersistence {
    async fn store(
        &self,
        channel: Channel,
        payload: &Json,
        module: &str,
        module_type: &str,
        metadata: Option<&str>,
    ) -> Result<i64, PersistenceError> {
        let message = serde_json::to_string(payload).map_err(|_| PersistenceError::Corrupt)?;
        let table = channel.table_name();
        let sql = format!(
            "INSERT INTO {table} (module, module_type, metadata, message) VALUES (?, ?, ?, ?)"
        );
        let result = sqlx::query(&sql)
            .bind(module)
            .bind(module_type)
            .bind(metadata)
            .bind(message)
            .execute(&self.pool)
            .await
            .map_err(classify_write_error)?;
        Ok(result.last_insert_rowid())
    }

    async fn retrieve_multiple(
        &self,
        channel: Channel,
        max_count: usize,
        max_bytes: usize,
    ) -> Result<Vec<QueuedMessage>, PersistenceError> {
        let table = channel.table_name();
        let sql = format!(
            "SELECT seq, module, module_type, metadata, message FROM {table} ORDER BY seq ASC LIMIT ?"
        );
        let rows = sqlx::query(&sql)
            .bind(max_count as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|_| PersistenceError::Unavailable)?;

        let mut out = Vec::new();
        let mut total_bytes = 0usize;
        for row in rows {
            let message_text: String = row.try_get("message").map_err(|_| PersistenceError::Corrupt)?;
            let size = message_text.len();
            if !out.is_empty() && total_bytes + size > max_bytes {
                break;
            }
            let payload: Json = serde_json::from_str(&message_text).map_err(|_| PersistenceError::Corrupt)?;
            let module: String = row.try_get("module").map_err(|_| PersistenceError::Corrupt)?;
            let module_type: String = row.try_get("module_type").map_err(|_| PersistenceError::Corrupt)?;
            let metadata: Option<String> = row.try_get("metadata").map_err(|_| PersistenceError::Corrupt)?;
            let sequence: i64 = row.try_get("seq").map_err(|_| PersistenceError::Corrupt)?;

            let mut message = Message::new(channel, payload, module, module_type);
            if let Some(metadata) = metadata {
                message = message.with_metadata(metadata);
            }
            total_bytes += size;
            out.push(QueuedMessage { sequence, message, persisted_size: size });
        }
        Ok(out)
    }

    async fn remove(&self, channel: Channel, up_to_sequence: i64) -> Result<(), PersistenceError> {
        let table = channel.table_name();
        let sql = format!("DELETE FROM {table} WHERE seq <= ?");
        sqlx::query(&sql)
            .bind(up_to_sequence)
            .execute(&self.pool)
            .await
            .map_err(|_| PersistenceError::Unavailable)?;
        Ok(())
    }

    async fn count(&self, channel: Channel) -> Result<usize, PersistenceError> {
        let table = channel.table_name();
        let sql = format!("SELECT COUNT(*) as n FROM {table}");
        let row = sqlx::query(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|_| PersistenceError::Unavailable)?;
        let n: i64 = row.try_get("n").map_err(|_| PersistenceError::Corrupt)?;
        Ok(n as usize)
    }

    async fn bytes(&self, channel: Channel) -> Result<usize, PersistenceError> {
        let table = channel.table_name();
        let sql = format!("SELECT COALESCE(SUM(LENGTH(message)), 0) as n FROM {table}");
        let row = sqlx::query(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|_| PersistenceError::Unavailable)?;
        let n: i64 = row.try_get("n").map_err(|_| PersistenceError::Corrupt)?;
        Ok(n as usize)
    }

    async fn upsert_command(&self, entry: &CommandEntry) -> Result<(), PersistenceError> {
        let parameters = serde_json::to_string(&entry.parameters).map_err(|_| PersistenceError::Corrupt)?;
        sqlx::query(
            "INSERT INTO command_store (id, module, command, parameters, status, result, time)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                result = excluded.result",
        )
        .bind(&entry.id)
        .bind(&entry.module)
        .bind(&entry.command)
        .bind(parameters)
        .bind(entry.execution_result.status.as_i64())
        .bind(&entry.execution_result.message)
        .bind(entry.time)
        .execute(&self.pool)
        .await
        .map_err(classify_write_error)?;
        Ok(())
    }

    async fn get_command(&self, id: &str) -> Result<Option<CommandEntry>, PersistenceError> {
        let row = sqlx::query(
            "SELECT id, module, command, parameters, status, result, time FROM command_store WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|_| PersistenceError::Unavailable)?;
        row.map(row_to_command_entry).transpose()
    }

    async fn get_commands_by_status(
        &self,
        status: CommandStatus,
    ) -> Result<Vec<CommandEntry>, PersistenceError> {
        let rows = sqlx::query(
            "SELECT id, module, command, parameters, status, result, time FROM command_store WHERE status = ?",
        )
        .bind(status.as_i64())
        .fetch_all(&self.pool)
        .await
        .map_err(|_| PersistenceError::Unavailable)?;
        rows.into_iter().map(row_to_command_entry).collect()
    }

    async fn delete_command(&self, id: &str) -> Result<(), PersistenceError> {
        sqlx::query("DELETE FROM command_store WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|_| PersistenceError::Unavailable)?;
        Ok(())
    }
}

fn row_to_command_entry(row: sqlx::sqlite::SqliteRow) -> Result<CommandEntry, PersistenceError> {
    let id: String = row.try_get("id").map_err(|_| PersistenceError::Corrupt)?;
    let module: String = row.try_get("module").map_err(|_| PersistenceError::Corrupt)?;
    let command: String = row.try_get("command").map_err(|_| PersistenceError::Corrupt)?;
    let parameters: String = row.try_get("parameters").map_err(|_| PersistenceError::Corrupt)?;
    let status: i64 = row.try_get("status").map_err(|_| PersistenceError::Corrupt)?;
    let result: String = row.try_get("result").map_err(|_| PersistenceError::Corrupt)?;
    let time: f64 = row.try_get("time").map_err(|_| PersistenceError::Corrupt)?;

    let parameters = serde_json::from_str(&parameters).map_err(|_| PersistenceError::Corrupt)?;
    Ok(CommandEntry {
        id,
        module,
        command,
        parameters,
        time,
        execution_result: ExecutionResult::new(CommandStatus::from_i64(status), result),
    })
}

fn classify_write_error(e: sqlx::Error) -> PersistenceError {
    match &e {
        sqlx::Error::Database(db) if db.message().contains("disk") || db.message().contains("full") => {
            PersistenceError::Full
        }
        _ => PersistenceError::Unavailable,
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
