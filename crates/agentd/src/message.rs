// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message and queued-message types shared by the queue, communicator, and
//! command handler.

use serde::{Deserialize, Serialize};

/// Which of the three disjoint channels a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Stateless,
    Stateful,
    Command,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stateless => "stateless",
            Self::Stateful => "stateful",
            Self::Command => "command",
        }
    }

    /// Table name backing this channel in the persistence layer.
    pub fn table_name(&self) -> &'static str {
        self.as_str()
    }

    /// Manager upload endpoint for this channel. `Command` has no upload
    /// endpoint — commands arrive via long-poll, they are never uploaded.
    pub fn upload_endpoint(&self) -> Option<&'static str> {
        match self {
            Self::Stateless => Some("/events/stateless"),
            Self::Stateful => Some("/events/stateful"),
            Self::Command => None,
        }
    }
}

/// A record produced by a module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: Channel,
    pub payload: serde_json::Value,
    pub module_name: String,
    pub module_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

impl Message {
    pub fn new(
        kind: Channel,
        payload: serde_json::Value,
        module_name: impl Into<String>,
        module_type: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            payload,
            module_name: module_name.into(),
            module_type: module_type.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }
}

/// A [`Message`] plus the sequence number and persisted byte size assigned
/// by the channel it lives in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMessage {
    pub sequence: i64,
    pub message: Message,
    pub persisted_size: usize,
}
