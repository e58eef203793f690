// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! POSIX implementation: a Unix domain socket under the agent run
//! directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::net::UnixListener;

use super::{read_line_capped, LocalListener};

pub struct UnixSocketListener {
    listener: UnixListener,
    path: PathBuf,
}

impl UnixSocketListener {
    /// Binds `path`, removing a stale socket file left behind by a prior
    /// crashed process first.
    pub fn bind(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        let listener = UnixListener::bind(&path)?;
        Ok(Self { listener, path })
    }
}

#[async_trait]
impl LocalListener for UnixSocketListener {
    async fn accept_line(&self) -> std::io::Result<String> {
        let (stream, _addr) = self.listener.accept().await?;
        read_line_capped(stream).await
    }
}

impl Drop for UnixSocketListener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
