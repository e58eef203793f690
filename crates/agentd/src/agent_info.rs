// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent agent identity: name, UUID, registration key, group list.

use rand::Rng;
use sqlx::{Row, SqlitePool};

use crate::error::PersistenceError;

const KEY_LEN: usize = 32;

/// `key` is exactly 32 `[A-Za-z0-9]` characters, full stop. Callers that
/// violate this never get a mutated store back.
pub(crate) fn is_valid_key(key: &str) -> bool {
    key.len() == KEY_LEN && key.chars().all(|c| c.is_ascii_alphanumeric())
}

fn generate_key() -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..KEY_LEN)
        .map(|_| {
            let idx = rng.random_range(0..ALPHABET.len());
            ALPHABET[idx] as char
        })
        .collect()
}

/// Process-wide identity, backed by the `agent_info`/`agent_groups` tables
/// in the same database file as the queue and command store.
pub struct AgentInfo {
    pool: SqlitePool,
}

impl AgentInfo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Loads the single `agent_info` row, creating it with a fresh UUID and
    /// an auto-generated key if it doesn't exist yet.
    pub async fn load_or_init(&self, default_name: &str) -> Result<AgentIdentity, PersistenceError> {
        if let Some(identity) = self.try_load().await? {
            return Ok(identity);
        }
        let identity = AgentIdentity {
            name: default_name.to_string(),
            uuid: uuid::Uuid::new_v4().to_string(),
            key: generate_key(),
            groups: Vec::new(),
        };
        self.persist_identity(&identity).await?;
        Ok(identity)
    }

    async fn try_load(&self) -> Result<Option<AgentIdentity>, PersistenceError> {
        let row = sqlx::query("SELECT name, uuid, key FROM agent_info WHERE id = 0")
            .fetch_optional(&self.pool)
            .await
            .map_err(|_| PersistenceError::Unavailable)?;
        let Some(row) = row else { return Ok(None) };
        let name: String = row.try_get("name").map_err(|_| PersistenceError::Corrupt)?;
        let uuid: String = row.try_get("uuid").map_err(|_| PersistenceError::Corrupt)?;
        let key: String = row.try_get("key").map_err(|_| PersistenceError::Corrupt)?;
        let groups = self.groups().await?;
        Ok(Some(AgentIdentity { name, uuid, key, groups }))
    }

    async fn persist_identity(&self, identity: &AgentIdentity) -> Result<(), PersistenceError> {
        sqlx::query(
            "INSERT INTO agent_info (id, name, uuid, key) VALUES (0, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, uuid = excluded.uuid, key = excluded.key",
        )
        .bind(&identity.name)
        .bind(&identity.uuid)
        .bind(&identity.key)
        .execute(&self.pool)
        .await
        .map_err(|_| PersistenceError::Unavailable)?;
        Ok(())
    }

    /// Registration overwrites `uuid` and `key` atomically — both persist
    /// or neither does.
    pub async fn set_registration(&self, name: &str, uuid: &str, key: &str) -> Result<(), PersistenceError> {
        if !is_valid_key(key) {
            return Err(PersistenceError::Corrupt);
        }
        let mut tx = self.pool.begin().await.map_err(|_| PersistenceError::Unavailable)?;
        sqlx::query(
            "INSERT INTO agent_info (id, name, uuid, key) VALUES (0, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, uuid = excluded.uuid, key = excluded.key",
        )
        .bind(name)
        .bind(uuid)
        .bind(key)
        .execute(&mut *tx)
        .await
        .map_err(|_| PersistenceError::Unavailable)?;
        tx.commit().await.map_err(|_| PersistenceError::Unavailable)?;
        Ok(())
    }

    /// Validates and stores a new `key` in place. Returns `false` (and
    /// leaves the stored key untouched) for anything other than exactly 32
    /// alphanumeric characters.
    pub async fn set_key(&self, key: &str) -> Result<bool, PersistenceError> {
        if !is_valid_key(key) {
            return Ok(false);
        }
        sqlx::query("UPDATE agent_info SET key = ? WHERE id = 0")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|_| PersistenceError::Unavailable)?;
        Ok(true)
    }

    pub async fn groups(&self) -> Result<Vec<String>, PersistenceError> {
        let rows = sqlx::query("SELECT group_name FROM agent_groups ORDER BY position ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|_| PersistenceError::Unavailable)?;
        rows.iter()
            .map(|r| r.try_get::<String, _>("group_name").map_err(|_| PersistenceError::Corrupt))
            .collect()
    }

    /// Replaces the group list. Duplicates are rejected.
    pub async fn set_groups(&self, groups: &[String]) -> Result<(), PersistenceError> {
        let mut seen = std::collections::HashSet::new();
        for g in groups {
            if !seen.insert(g.as_str()) {
                return Err(PersistenceError::Corrupt);
            }
        }
        let mut tx = self.pool.begin().await.map_err(|_| PersistenceError::Unavailable)?;
        sqlx::query("DELETE FROM agent_groups")
            .execute(&mut *tx)
            .await
            .map_err(|_| PersistenceError::Unavailable)?;
        for (position, group) in groups.iter().enumerate() {
            sqlx::query("INSERT INTO agent_groups (group_name, position) VALUES (?, ?)")
                .bind(group)
                .bind(position as i64)
                .execute(&mut *tx)
                .await
                .map_err(|_| PersistenceError::Unavailable)?;
        }
        tx.commit().await.map_err(|_| PersistenceError::Unavailable)?;
        Ok(())
    }

    /// Explicit reset-to-default, the only sanctioned way to destroy
    /// identity.
    pub async fn reset(&self) -> Result<(), PersistenceError> {
        let mut tx = self.pool.begin().await.map_err(|_| PersistenceError::Unavailable)?;
        sqlx::query("DELETE FROM agent_info")
            .execute(&mut *tx)
            .await
            .map_err(|_| PersistenceError::Unavailable)?;
        sqlx::query("DELETE FROM agent_groups")
            .execute(&mut *tx)
            .await
            .map_err(|_| PersistenceError::Unavailable)?;
        tx.commit().await.map_err(|_| PersistenceError::Unavailable)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdentity {
    pub name: String,
    pub uuid: String,
    pub key: String,
    pub groups: Vec<String>,
}

#[cfg(test)]
#[path = "agent_info_tests.rs"]
mod tests;
