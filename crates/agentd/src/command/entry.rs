// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `CommandEntry` and its lifecycle.

use serde::{Deserialize, Serialize};

/// Terminal-state-aware command status. No transition out of a terminal
/// state (`Success`/`Failure`/`Timeout`); no transition from a terminal
/// state back to `Unknown`/`InProgress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Unknown,
    InProgress,
    Success,
    Failure,
    Timeout,
}

impl CommandStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Timeout)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::InProgress => "in_progress",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Timeout => "timeout",
        }
    }

    /// Stable integer encoding for the `status` column.
    pub fn as_i64(&self) -> i64 {
        match self {
            Self::Unknown => 0,
            Self::InProgress => 1,
            Self::Success => 2,
            Self::Failure => 3,
            Self::Timeout => 4,
        }
    }

    pub fn from_i64(v: i64) -> Self {
        match v {
            1 => Self::InProgress,
            2 => Self::Success,
            3 => Self::Failure,
            4 => Self::Timeout,
            _ => Self::Unknown,
        }
    }
}

/// Result of a command execution attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: CommandStatus,
    pub message: String,
}

impl ExecutionResult {
    pub fn new(status: CommandStatus, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    pub fn unknown() -> Self {
        Self { status: CommandStatus::Unknown, message: String::new() }
    }
}

/// A manager-issued command, as stored in the command store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEntry {
    pub id: String,
    pub module: String,
    pub command: String,
    pub parameters: serde_json::Value,
    /// Unix seconds of creation.
    pub time: f64,
    pub execution_result: ExecutionResult,
}

impl CommandEntry {
    pub fn new(
        id: impl Into<String>,
        module: impl Into<String>,
        command: impl Into<String>,
        parameters: serde_json::Value,
        time: f64,
    ) -> Self {
        Self {
            id: id.into(),
            module: module.into(),
            command: command.into(),
            parameters,
            time,
            execution_result: ExecutionResult::unknown(),
        }
    }
}
