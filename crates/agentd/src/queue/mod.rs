// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Three independent, bounded FIFO channels over [`Persistence`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value as Json;
use tokio::sync::Notify;

use crate::error::{AgentError, ChannelFull};
use crate::message::{Channel, QueuedMessage};
use crate::persistence::Persistence;

/// Per-channel capacity: a max message count and a max total byte size.
#[derive(Debug, Clone, Copy)]
pub struct ChannelLimits {
    pub max_count: usize,
    pub max_bytes: usize,
}

const ALL_CHANNELS: [Channel; 3] = [Channel::Stateless, Channel::Stateful, Channel::Command];

pub struct MultiTypeQueue {
    persistence: Arc<dyn Persistence>,
    limits: HashMap<&'static str, ChannelLimits>,
    /// Woken whenever a `remove` frees space in the corresponding channel,
    /// so `push_or_wait` doesn't have to poll.
    space_freed: HashMap<&'static str, Notify>,
}

impl MultiTypeQueue {
    pub fn new(persistence: Arc<dyn Persistence>, limits: ChannelLimits) -> Self {
        let mut per_channel = HashMap::new();
        let mut notifiers = HashMap::new();
        for channel in ALL_CHANNELS {
            per_channel.insert(channel.as_str(), limits);
            notifiers.insert(channel.as_str(), Notify::new());
        }
        Self { persistence, limits: per_channel, space_freed: notifiers }
    }

    fn limits_for(&self, channel: Channel) -> ChannelLimits {
        self.limits[channel.as_str()]
    }

    /// The backing store, shared with [`crate::command::CommandStore`]
    /// since both live in the same database file.
    pub fn persistence(&self) -> Arc<dyn Persistence> {
        self.persistence.clone()
    }

    /// Non-blocking push. Fails with `ChannelFull` when either the count or
    /// byte cap would be exceeded; the persisted state is left untouched.
    pub async fn push(
        &self,
        channel: Channel,
        payload: &Json,
        module: &str,
        module_type: &str,
        metadata: Option<&str>,
    ) -> Result<i64, AgentError> {
        let limits = self.limits_for(channel);
        let count = self.persistence.count(channel).await?;
        let bytes = self.persistence.bytes(channel).await?;
        if count >= limits.max_count || bytes >= limits.max_bytes {
            return Err(ChannelFull.into());
        }
        let seq = self.persistence.store(channel, payload, module, module_type, metadata).await?;
        Ok(seq)
    }

    /// Cooperative suspension until space frees or `deadline` elapses.
    pub async fn push_or_wait(
        &self,
        channel: Channel,
        payload: &Json,
        module: &str,
        module_type: &str,
        metadata: Option<&str>,
        deadline: Instant,
    ) -> Result<i64, AgentError> {
        loop {
            match self.push(channel, payload, module, module_type, metadata).await {
                Ok(seq) => return Ok(seq),
                Err(AgentError::ChannelFull) => {}
                Err(other) => return Err(other),
            }
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return Err(ChannelFull.into());
            };
            let notified = self.space_freed[channel.as_str()].notified();
            if tokio::time::timeout(remaining, notified).await.is_err() {
                return Err(ChannelFull.into());
            }
        }
    }

    /// Returns a contiguous FIFO prefix. Callers acknowledge success with
    /// [`Self::remove`]; an unacknowledged batch has no effect.
    pub async fn get_batch(
        &self,
        channel: Channel,
        max_count: usize,
        max_bytes: usize,
    ) -> Result<Vec<QueuedMessage>, AgentError> {
        Ok(self.persistence.retrieve_multiple(channel, max_count, max_bytes).await?)
    }

    pub async fn remove(&self, channel: Channel, up_to_sequence: i64) -> Result<(), AgentError> {
        self.persistence.remove(channel, up_to_sequence).await?;
        self.space_freed[channel.as_str()].notify_waiters();
        Ok(())
    }

    pub async fn count(&self, channel: Channel) -> Result<usize, AgentError> {
        Ok(self.persistence.count(channel).await?)
    }

    pub async fn bytes(&self, channel: Channel) -> Result<usize, AgentError> {
        Ok(self.persistence.bytes(channel).await?)
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
