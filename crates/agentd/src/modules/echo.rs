// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Trivial reference module exercising the registry contract end to end.
//! Not a stand-in for the real collector modules (inventory, log
//! collection, SCA), which remain out of scope here.

use async_trait::async_trait;
use serde_json::json;

use crate::command::{CommandStatus, ExecutionResult};
use crate::module::Module;

pub struct EchoModule {
    name: String,
}

impl EchoModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Module for EchoModule {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn execute_command(&self, command: &str, parameters: &serde_json::Value) -> ExecutionResult {
        match command {
            "reload" => ExecutionResult::new(CommandStatus::Success, "ok"),
            "echo" => ExecutionResult::new(
                CommandStatus::Success,
                json!({ "echo": parameters }).to_string(),
            ),
            other => ExecutionResult::new(CommandStatus::Failure, format!("unknown command: {other}")),
        }
    }

    fn idempotent_restart(&self) -> bool {
        true
    }
}
