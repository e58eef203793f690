// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent configuration. File-loading is out of scope here; what the core
//! consumes is this flat, validated struct, populated from CLI flags and
//! `WARDEN_*` environment variables the way the teacher's config does.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TlsVerifyMode {
    /// Chain verification only.
    Certificate,
    /// Chain + hostname per RFC 2818.
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Compact,
    Json,
}

/// Flat, validated agent configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "wardend", about = "Warden endpoint agent core")]
pub struct AgentConfig {
    /// Base URL of the manager, e.g. `https://mgr.example.com:55000`.
    #[arg(long, env = "WARDEN_MANAGER_URL")]
    pub manager_url: String,

    /// Path to the sqlite database file backing Persistence.
    #[arg(long, env = "WARDEN_DB_PATH", default_value = "agent_info.db")]
    pub db_path: PathBuf,

    /// Unix domain socket path for the InstanceCommunicator (ignored on
    /// Windows, where a fixed named pipe is used instead).
    #[arg(long, env = "WARDEN_SOCKET_PATH", default_value = "warden-agent.sock")]
    pub socket_path: PathBuf,

    /// Worker threads for the TaskManager's thread pool. 0 means "number
    /// of hardware threads".
    #[arg(long, env = "WARDEN_WORKER_THREADS", default_value_t = 0)]
    pub worker_threads: usize,

    /// Max messages per upload batch.
    #[arg(long, env = "WARDEN_BATCH_COUNT", default_value_t = 100)]
    pub batch_count: usize,

    /// Max bytes per upload batch.
    #[arg(long, env = "WARDEN_BATCH_BYTES", default_value_t = 1 << 20)]
    pub batch_bytes: usize,

    /// Max messages in a channel before `push` returns `ChannelFull`.
    #[arg(long, env = "WARDEN_CHANNEL_MAX_COUNT", default_value_t = 10_000)]
    pub channel_max_count: usize,

    /// Max bytes in a channel before `push` returns `ChannelFull`.
    #[arg(long, env = "WARDEN_CHANNEL_MAX_BYTES", default_value_t = 64 << 20)]
    pub channel_max_bytes: usize,

    /// Safety skew subtracted from a token's `expiresAt` to force early
    /// refresh (default 60s).
    #[arg(long, env = "WARDEN_SAFETY_SKEW_SECS", default_value_t = 60)]
    pub safety_skew_secs: u64,

    /// Server-side long-poll wait requested on `GET /commands?wait=`.
    #[arg(long, env = "WARDEN_LONG_POLL_SECS", default_value_t = 30)]
    pub long_poll_secs: u64,

    /// Client-side deadline for the long-poll request itself. Must stay
    /// comfortably above `long_poll_secs` so a larger configured wait isn't
    /// cut off before the manager has a chance to respond.
    #[arg(long, env = "WARDEN_LONG_POLL_TIMEOUT_SECS", default_value_t = 120)]
    pub long_poll_timeout_secs: u64,

    /// Retry interval on transport failure before the first backoff step.
    #[arg(long, env = "WARDEN_RETRY_INTERVAL_SECS", default_value_t = 1)]
    pub retry_interval_secs: u64,

    /// Cap for exponential backoff (1s -> 5m).
    #[arg(long, env = "WARDEN_MAX_BACKOFF_SECS", default_value_t = 300)]
    pub max_backoff_secs: u64,

    /// CommandHandler idle sleep when the command channel is empty
    /// (default 1s).
    #[arg(long, env = "WARDEN_IDLE_BACKOFF_MS", default_value_t = 1_000)]
    pub idle_backoff_ms: u64,

    /// Default per-command execution timeout (default 5min).
    #[arg(long, env = "WARDEN_COMMAND_TIMEOUT_SECS", default_value_t = 300)]
    pub command_timeout_secs: u64,

    /// Default outbound network call deadline (default 60s).
    #[arg(long, env = "WARDEN_REQUEST_TIMEOUT_SECS", default_value_t = 60)]
    pub request_timeout_secs: u64,

    /// Consecutive rejections before a batch is dropped as poison (default 5).
    #[arg(long, env = "WARDEN_POISON_RETRY_LIMIT", default_value_t = 5)]
    pub poison_retry_limit: u32,

    #[arg(long, env = "WARDEN_TLS_VERIFY", value_enum, default_value_t = TlsVerifyMode::Full)]
    pub tls_verify: TlsVerifyMode,

    #[arg(long, env = "WARDEN_LOG_FORMAT", value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,

    /// `tracing_subscriber::EnvFilter` directive, e.g. `warden_core=debug`.
    #[arg(long, env = "WARDEN_LOG_FILTER", default_value = "info")]
    pub log_filter: String,
}

impl AgentConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if reqwest::Url::parse(&self.manager_url).is_err() {
            anyhow::bail!("invalid manager url: {}", self.manager_url);
        }
        if self.batch_count == 0 {
            anyhow::bail!("batch_count must be > 0");
        }
        if self.channel_max_count == 0 || self.channel_max_bytes == 0 {
            anyhow::bail!("channel capacity must be > 0");
        }
        Ok(())
    }

    pub fn safety_skew(&self) -> Duration {
        Duration::from_secs(self.safety_skew_secs)
    }

    pub fn long_poll_wait(&self) -> Duration {
        Duration::from_secs(self.long_poll_secs)
    }

    pub fn long_poll_request_timeout(&self) -> Duration {
        Duration::from_secs(self.long_poll_timeout_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
