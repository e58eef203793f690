// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level wiring: Persistence -> {MultiTypeQueue, CommandStore,
//! AgentInfo} -> HttpClient -> Communicator -> CommandHandler ->
//! ModuleRegistry -> TaskManager orchestrates all.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::agent_info::{is_valid_key, AgentInfo};
use crate::command::{CommandHandler, CommandStore};
use crate::communicator::Communicator;
use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::http_client::HttpClient;
use crate::instance_communicator::{InstanceCommunicator, LocalListener};
use crate::module::ModuleRegistry;
use crate::persistence::{Persistence, SqlitePersistence};
use crate::queue::{ChannelLimits, MultiTypeQueue};
use crate::task_manager::TaskManager;

pub struct Agent {
    config: Arc<AgentConfig>,
    queue: Arc<MultiTypeQueue>,
    agent_info: Arc<AgentInfo>,
    registry: Arc<ModuleRegistry>,
    tasks: TaskManager,
}

impl Agent {
    pub async fn bootstrap(config: AgentConfig, registry: ModuleRegistry) -> Result<Self, AgentError> {
        config.validate().map_err(|e| AgentError::Config(e.to_string()))?;
        let config = Arc::new(config);

        let persistence = SqlitePersistence::open(&config.db_path).await?;
        let pool = persistence.pool().clone();
        let persistence: Arc<dyn Persistence> = Arc::new(persistence);

        let limits = ChannelLimits { max_count: config.channel_max_count, max_bytes: config.channel_max_bytes };
        let queue = Arc::new(MultiTypeQueue::new(persistence, limits));
        let agent_info = Arc::new(AgentInfo::new(pool));
        let registry = Arc::new(registry);

        Ok(Self { config, queue, agent_info, registry, tasks: TaskManager::new() })
    }

    /// Runs every long-lived task until cancellation, then shuts down in
    /// dependency order.
    pub async fn run(&self) -> Result<(), AgentError> {
        let identity = self.agent_info.load_or_init("agent").await?;
        if !is_valid_key(&identity.key) {
            return Err(AgentError::Config("stored agent key is not 32 alphanumeric characters".to_string()));
        }

        let http = Arc::new(HttpClient::new(self.config.tls_verify, self.config.request_timeout())?);
        let communicator = Arc::new(Communicator::new(
            http,
            self.config.manager_url.clone(),
            self.agent_info.clone(),
            self.queue.clone(),
            self.config.clone(),
        ));

        let command_store = Arc::new(CommandStore::new(self.queue.persistence()));
        let handler = Arc::new(CommandHandler::new(
            self.queue.clone(),
            command_store,
            self.registry.clone(),
            self.config.idle_backoff(),
            self.config.command_timeout(),
        ));

        self.registry.start_all().await.map_err(|e| AgentError::Config(e.to_string()))?;

        let cancel = self.tasks.cancellation_token();

        {
            let communicator = communicator.clone();
            let cancel = cancel.clone();
            self.tasks.enqueue_task("token-refresh", async move { communicator.run_token_refresh(cancel).await }).await;
        }
        {
            let communicator = communicator.clone();
            let cancel = cancel.clone();
            self.tasks.enqueue_task("command-poll", async move { communicator.run_command_poll(cancel).await }).await;
        }
        {
            let communicator = communicator.clone();
            let cancel = cancel.clone();
            self.tasks.enqueue_task("message-upload", async move { communicator.run_message_upload(cancel).await }).await;
        }
        {
            let cancel = cancel.clone();
            self.tasks.enqueue_task("command-handler", async move { handler.run(cancel).await }).await;
        }

        if let Some(listener) = bind_local_listener(&self.config) {
            let instance_comm = Arc::new(InstanceCommunicator::new(listener));
            let cancel = cancel.clone();
            let registry = self.registry.clone();
            self.tasks
                .enqueue_task("instance-communicator", async move {
                    instance_comm
                        .run(
                            cancel,
                            || async { info!("reload-all requested over local ipc") },
                            move |name| {
                                let registry = registry.clone();
                                async move {
                                    if registry.get(&name).is_some() {
                                        info!(module = %name, "reload-module requested over local ipc");
                                    } else {
                                        tracing::warn!(module = %name, "reload-module requested for unknown module");
                                    }
                                }
                            },
                        )
                        .await
                })
                .await;
        }

        cancel.cancelled().await;
        self.shutdown().await;
        Ok(())
    }

    async fn shutdown(&self) {
        self.tasks.stop(Duration::from_secs(10)).await;
        self.registry.stop_all(Duration::from_secs(10)).await;
    }

    pub fn cancellation_token(&self) -> tokio_util::sync::CancellationToken {
        self.tasks.cancellation_token()
    }
}

/// Binds the per-platform local IPC endpoint. Boxed so `Agent::run` doesn't
/// need a platform-specific generic parameter.
#[cfg(unix)]
fn bind_local_listener(config: &AgentConfig) -> Option<Box<dyn LocalListener>> {
    use crate::instance_communicator::unix::UnixSocketListener;
    match UnixSocketListener::bind(&config.socket_path) {
        Ok(listener) => Some(Box::new(listener)),
        Err(e) => {
            tracing::warn!(error = %e, "failed to bind instance communicator unix socket");
            None
        }
    }
}

#[cfg(windows)]
fn bind_local_listener(_config: &AgentConfig) -> Option<Box<dyn LocalListener>> {
    use crate::instance_communicator::windows::NamedPipeListener;
    match NamedPipeListener::new() {
        Ok(listener) => Some(Box::new(listener)),
        Err(e) => {
            tracing::warn!(error = %e, "failed to bind instance communicator named pipe");
            None
        }
    }
}
