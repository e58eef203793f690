// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `wardend` — the agent service binary. CLI parsing, service lifecycle
//! (install/remove/start/status), and signal trapping are collaborators
//! out of scope here beyond the one mode this binary actually runs:
//! foreground execution of the core.

use clap::Parser;
use warden_core::config::AgentConfig;
use warden_core::module::ModuleRegistry;
use warden_core::modules::echo::EchoModule;
use warden_core::Agent;

fn init_logging(config: &AgentConfig) {
    let filter = tracing_subscriber::EnvFilter::try_new(&config.log_filter)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match config.log_format {
        warden_core::config::LogFormat::Json => subscriber.json().init(),
        warden_core::config::LogFormat::Compact => subscriber.compact().init(),
    }
}

fn main() -> std::process::ExitCode {
    let config = AgentConfig::parse();
    init_logging(&config);

    let runtime = match warden_core::task_manager::build_runtime(
        warden_core::task_manager::ExecutorMode::ThreadPool(config.worker_threads),
    ) {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to build runtime: {e}");
            return std::process::ExitCode::from(1);
        }
    };

    runtime.block_on(run(config))
}

async fn run(config: AgentConfig) -> std::process::ExitCode {
    // Real collector/responder modules (inventory, log collection, SCA)
    // stay out of scope; `EchoModule` exercises the registry contract.
    let registry = ModuleRegistry::builder().register(Box::new(EchoModule::new("echo"))).build();

    let agent = match Agent::bootstrap(config, registry).await {
        Ok(agent) => agent,
        Err(e) => {
            tracing::error!(error = %e, "agent failed to start");
            return std::process::ExitCode::from(1);
        }
    };

    let cancel = agent.cancellation_token();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received shutdown signal");
        cancel.cancel();
    });

    match agent.run().await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "agent exited with error");
            std::process::ExitCode::from(1)
        }
    }
}
