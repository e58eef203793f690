// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Windows implementation: the well-known named pipe `\\.\pipe\agent-pipe`.

use async_trait::async_trait;
use tokio::net::windows::named_pipe::{NamedPipeServer, ServerOptions};

use super::{read_line_capped, LocalListener};

pub const PIPE_NAME: &str = r"\\.\pipe\agent-pipe";

pub struct NamedPipeListener {
    name: String,
    /// The next server instance to accept on; re-created after each
    /// connection closes, matching the "one connection at a time" model.
    next: tokio::sync::Mutex<Option<NamedPipeServer>>,
}

impl NamedPipeListener {
    pub fn new() -> std::io::Result<Self> {
        Self::with_name(PIPE_NAME)
    }

    pub fn with_name(name: impl Into<String>) -> std::io::Result<Self> {
        let name = name.into();
        let server = ServerOptions::new().first_pipe_instance(true).create(&name)?;
        Ok(Self { name, next: tokio::sync::Mutex::new(Some(server)) })
    }
}

#[async_trait]
impl LocalListener for NamedPipeListener {
    async fn accept_line(&self) -> std::io::Result<String> {
        let server = {
            let mut slot = self.next.lock().await;
            match slot.take() {
                Some(server) => server,
                None => ServerOptions::new().create(&self.name)?,
            }
        };
        server.connect().await?;
        let line = read_line_capped(&server).await;

        let rearmed = ServerOptions::new().create(&self.name)?;
        *self.next.lock().await = Some(rearmed);
        line
    }
}
