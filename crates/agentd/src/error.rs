// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crate-wide error taxonomy.
//!
//! Component boundaries that callers must match on (persistence, channel
//! back-pressure) get dedicated enums; everything above that orchestration
//! level uses `anyhow::Result` the way the rest of the crate does.

use std::fmt;

/// Persistence-layer failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceError {
    /// The backing store is corrupt (unreadable WAL, schema mismatch).
    Corrupt,
    /// A write was rejected because the store is out of space.
    Full,
    /// The store could not be reached (locked, missing, permission denied).
    Unavailable,
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Corrupt => "storage corrupt",
            Self::Full => "storage full",
            Self::Unavailable => "storage unavailable",
        };
        f.write_str(s)
    }
}

impl std::error::Error for PersistenceError {}

/// Per-channel back-pressure failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelFull;

impl fmt::Display for ChannelFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("channel full")
    }
}

impl std::error::Error for ChannelFull {}

/// Top-level taxonomy used by orchestration code that needs to branch on
/// error *kind* rather than just propagate.
#[derive(Debug)]
pub enum AgentError {
    /// Invalid URL, missing required config key. Fatal at startup/registration.
    Config(String),
    Persistence(PersistenceError),
    /// A channel's count or byte cap would be exceeded by the push.
    ChannelFull,
    /// DNS, connect refused, 5xx, timeout — retried with backoff by the caller.
    NetworkTransient(anyhow::Error),
    /// TLS verification failure, 4xx other than 401 — not retried.
    NetworkPermanent(anyhow::Error),
    /// The token-refresh task itself got a 401. Background traffic suspends.
    AuthLost,
    /// A module reported `Failure`/`Timeout` executing a command.
    CommandExec(String),
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config error: {msg}"),
            Self::Persistence(e) => write!(f, "persistence error: {e}"),
            Self::ChannelFull => write!(f, "{ChannelFull}"),
            Self::NetworkTransient(e) => write!(f, "transient network error: {e}"),
            Self::NetworkPermanent(e) => write!(f, "permanent network error: {e}"),
            Self::AuthLost => f.write_str("authentication lost, re-run registration or check credentials"),
            Self::CommandExec(msg) => write!(f, "command execution failed: {msg}"),
        }
    }
}

impl std::error::Error for AgentError {}

impl From<PersistenceError> for AgentError {
    fn from(e: PersistenceError) -> Self {
        Self::Persistence(e)
    }
}

impl From<ChannelFull> for AgentError {
    fn from(_: ChannelFull) -> Self {
        Self::ChannelFull
    }
}
