// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `wardenctl` — sibling CLI collaborator. Implements the slice of the
//! documented CLI surface that exercises the core: registration, local
//! reload signaling, and status. Full OS service lifecycle
//! (install/remove/start/stop/restart) is out of scope; those flags exist
//! for surface completeness and return `unimplemented`.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::AsyncWriteExt;
use warden_core::agent_info::AgentInfo;
use warden_core::config::TlsVerifyMode;
use warden_core::http_client::HttpClient;
use warden_core::message::Channel;
use warden_core::persistence::{self, Persistence};
use warden_core::registration::{self, RegistrationRequest};

#[derive(Parser)]
#[command(name = "wardenctl", about = "Sibling CLI for the warden endpoint agent")]
struct Cli {
    /// Local IPC endpoint the running agent listens on.
    #[arg(long, env = "WARDEN_SOCKET_PATH", default_value = "warden-agent.sock", global = true)]
    socket_path: PathBuf,

    /// Shared sqlite database file.
    #[arg(long, env = "WARDEN_DB_PATH", default_value = "agent_info.db", global = true)]
    db_path: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Enroll with the manager.
    Register {
        #[arg(long)]
        manager_url: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        ip: Option<String>,
    },
    /// Signal the running agent to reload every module.
    Reload,
    /// Signal the running agent to reload a single module.
    ReloadModule { name: String },
    /// Print identity and queue depth for the running agent.
    Status,
    Start,
    Stop,
    Restart,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Register { manager_url, user, password, name, ip } => {
            do_register(&cli.db_path, &manager_url, user, password, name, ip).await
        }
        Command::Reload => send_signal(&cli.socket_path, "RELOAD\n").await,
        Command::ReloadModule { name } => {
            send_signal(&cli.socket_path, &format!("RELOAD-MODULE:{name}\n")).await
        }
        Command::Status => do_status(&cli.db_path).await,
        Command::Start | Command::Stop | Command::Restart => {
            eprintln!("service lifecycle management is not implemented by this binary");
            return std::process::ExitCode::from(1);
        }
    };

    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::ExitCode::from(1)
        }
    }
}

async fn do_register(
    db_path: &PathBuf,
    manager_url: &str,
    user: String,
    password: String,
    name: Option<String>,
    ip: Option<String>,
) -> anyhow::Result<()> {
    let pool = persistence::open(db_path).await?;
    let agent_info = AgentInfo::new(pool);
    let http = HttpClient::new(TlsVerifyMode::Full, Duration::from_secs(30))?;

    let identity = registration::register(
        &http,
        manager_url,
        &agent_info,
        RegistrationRequest { user, password, name, ip },
    )
    .await?;

    println!("registered: uuid={} key={}", identity.uuid, identity.key);
    Ok(())
}

#[cfg(unix)]
async fn send_signal(socket_path: &PathBuf, line: &str) -> anyhow::Result<()> {
    let mut stream = tokio::net::UnixStream::connect(socket_path).await?;
    stream.write_all(line.as_bytes()).await?;
    Ok(())
}

#[cfg(windows)]
async fn send_signal(_socket_path: &PathBuf, line: &str) -> anyhow::Result<()> {
    use tokio::net::windows::named_pipe::ClientOptions;
    let mut client = ClientOptions::new().open(warden_core::instance_communicator::windows::PIPE_NAME)?;
    client.write_all(line.as_bytes()).await?;
    Ok(())
}

async fn do_status(db_path: &PathBuf) -> anyhow::Result<()> {
    let pool = persistence::open(db_path).await?;
    let agent_info = AgentInfo::new(pool.clone());
    let identity = agent_info.load_or_init("agent").await?;
    let store = persistence::SqlitePersistence::new(pool);

    println!("name:   {}", identity.name);
    println!("uuid:   {}", identity.uuid);
    println!("groups: {}", identity.groups.join(","));
    for channel in [Channel::Stateless, Channel::Stateful, Channel::Command] {
        let count = store.count(channel).await?;
        let bytes = store.bytes(channel).await?;
        println!("{:<10} count={count} bytes={bytes}", channel.as_str());
    }
    Ok(())
}
