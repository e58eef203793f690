// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local IPC listener used by the sibling CLI to signal a reload. Kept
//! behind a trait with one implementation per platform; the loop above it
//! is platform-agnostic.

#[cfg(unix)]
pub mod unix;
#[cfg(windows)]
pub mod windows;

use std::future::Future;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncRead};
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub const MAX_LINE_BYTES: usize = 4 * 1024;

/// Accepts exactly one connection, reads one line, and closes.
#[async_trait]
pub trait LocalListener: Send + Sync {
    async fn accept_line(&self) -> std::io::Result<String>;
}

#[async_trait]
impl LocalListener for Box<dyn LocalListener> {
    async fn accept_line(&self) -> std::io::Result<String> {
        (**self).accept_line().await
    }
}

/// A recognized control message. Anything else is logged and dropped by
/// the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadSignal {
    All,
    Module(String),
}

fn parse_signal(line: &str) -> Option<ReloadSignal> {
    let line = line.trim();
    if line == "RELOAD" {
        Some(ReloadSignal::All)
    } else if let Some(name) = line.strip_prefix("RELOAD-MODULE:") {
        Some(ReloadSignal::Module(name.to_string()))
    } else {
        None
    }
}

/// Reads until `\n` or EOF, capped at [`MAX_LINE_BYTES`]. A read that
/// exceeds the budget without a newline is rejected.
pub async fn read_line_capped<R: AsyncRead + Unpin>(mut reader: R) -> std::io::Result<String> {
    let mut buf = Vec::with_capacity(256);
    let mut byte = [0u8; 1];
    loop {
        if buf.len() >= MAX_LINE_BYTES {
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "line exceeds 4 KiB budget"));
        }
        let n = reader.read(&mut byte).await?;
        if n == 0 {
            break;
        }
        if byte[0] == b'\n' {
            break;
        }
        buf.push(byte[0]);
    }
    String::from_utf8(buf).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

/// Platform-agnostic accept loop over a [`LocalListener`].
pub struct InstanceCommunicator<L: LocalListener> {
    listener: L,
}

impl<L: LocalListener> InstanceCommunicator<L> {
    pub fn new(listener: L) -> Self {
        Self { listener }
    }

    pub async fn run<ReloadAll, ReloadAllFut, ReloadModule, ReloadModuleFut>(
        &self,
        cancel: CancellationToken,
        mut reload_all: ReloadAll,
        mut reload_module: ReloadModule,
    ) where
        ReloadAll: FnMut() -> ReloadAllFut,
        ReloadAllFut: Future<Output = ()>,
        ReloadModule: FnMut(String) -> ReloadModuleFut,
        ReloadModuleFut: Future<Output = ()>,
    {
        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => return,
                result = self.listener.accept_line() => result,
            };

            match line {
                Ok(line) => match parse_signal(&line) {
                    Some(ReloadSignal::All) => reload_all().await,
                    Some(ReloadSignal::Module(name)) => reload_module(name).await,
                    None => warn!(message = %line, "unrecognized instance-communicator message"),
                },
                Err(e) => warn!(error = %e, "instance communicator accept/read failed"),
            }
        }
    }
}
