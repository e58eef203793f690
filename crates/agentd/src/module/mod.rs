// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The module contract and the registry that owns them.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::command::ExecutionResult;

/// Capability set every collector/responder module implements. Modules are
/// registered at build time; no runtime loading.
#[async_trait]
pub trait Module: Send + Sync {
    fn name(&self) -> &str;

    async fn setup(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn start(&self) -> anyhow::Result<()>;

    async fn stop(&self) -> anyhow::Result<()>;

    async fn execute_command(&self, command: &str, parameters: &serde_json::Value) -> ExecutionResult;

    /// Whether an `InProgress` command targeting this module is safe to
    /// re-dispatch after a crash restart. Defaults to `false`: modules opt
    /// in explicitly.
    fn idempotent_restart(&self) -> bool {
        false
    }
}

/// Name-keyed set of modules, populated once at startup; mutation
/// thereafter is forbidden.
pub struct ModuleRegistry {
    modules: Vec<Box<dyn Module>>,
    index: HashMap<String, usize>,
}

impl ModuleRegistry {
    pub fn builder() -> ModuleRegistryBuilder {
        ModuleRegistryBuilder { modules: Vec::new() }
    }

    pub fn get(&self, name: &str) -> Option<&dyn Module> {
        self.index.get(name).map(|&i| self.modules[i].as_ref())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(|m| m.name())
    }

    /// `Start` is invoked once per module, in registration order.
    pub async fn start_all(&self) -> anyhow::Result<()> {
        for module in &self.modules {
            module.setup().await?;
            module.start().await?;
        }
        Ok(())
    }

    /// `Stop` is invoked in reverse registration order at shutdown, with a
    /// bounded join timeout per module.
    pub async fn stop_all(&self, timeout: std::time::Duration) {
        for module in self.modules.iter().rev() {
            match tokio::time::timeout(timeout, module.stop()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(module = module.name(), error = %e, "module stop returned an error"),
                Err(_) => tracing::warn!(module = module.name(), "module stop timed out, abandoning"),
            }
        }
    }
}

pub struct ModuleRegistryBuilder {
    modules: Vec<Box<dyn Module>>,
}

impl ModuleRegistryBuilder {
    pub fn register(mut self, module: Box<dyn Module>) -> Self {
        self.modules.push(module);
        self
    }

    pub fn build(self) -> ModuleRegistry {
        let mut index = HashMap::new();
        for (i, module) in self.modules.iter().enumerate() {
            index.insert(module.name().to_string(), i);
        }
        ModuleRegistry { modules: self.modules, index }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
