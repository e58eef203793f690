use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::command::CommandStore;
use crate::module::ModuleRegistry;
use crate::modules::echo::EchoModule;
use crate::persistence::SqlitePersistence;
use crate::queue::{ChannelLimits, MultiTypeQueue};

async fn harness() -> (tempfile::TempDir, Arc<MultiTypeQueue>, Arc<CommandStore>, CommandHandler) {
    let dir = tempfile::tempdir().unwrap();
    let persistence: Arc<dyn crate::persistence::Persistence> =
        Arc::new(SqlitePersistence::open(&dir.path().join("agent_info.db")).await.unwrap());
    let queue = Arc::new(MultiTypeQueue::new(
        persistence.clone(),
        ChannelLimits { max_count: 100, max_bytes: 1 << 20 },
    ));
    let store = Arc::new(CommandStore::new(persistence));
    let registry = Arc::new(
        ModuleRegistry::builder().register(Box::new(EchoModule::new("logcollector"))).build(),
    );
    let handler = CommandHandler::new(
        queue.clone(),
        store.clone(),
        registry,
        Duration::from_millis(10),
        Duration::from_secs(5),
    );
    (dir, queue, store, handler)
}

#[tokio::test]
async fn command_dispatch_records_result_and_enqueues_stateful_message() {
    let (_dir, queue, store, handler) = harness().await;
    let command = json!({"id": "c1", "module": "logcollector", "command": "reload", "parameters": {}});
    queue.push(Channel::Command, &command, "logcollector", "command", None).await.unwrap();

    let cancel = CancellationToken::new();
    let run = {
        let cancel = cancel.clone();
        tokio::spawn(async move { handler.run(cancel).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();
    let _ = run.await;

    let entry = store.get("c1").await.unwrap().unwrap();
    assert_eq!(entry.execution_result.status, CommandStatus::Success);

    let stateful = queue.get_batch(Channel::Stateful, 10, 1 << 20).await.unwrap();
    assert_eq!(stateful.len(), 1);
    assert_eq!(stateful[0].message.payload["id"], "c1");
    assert_eq!(stateful[0].message.payload["status"], "success");
}

#[tokio::test]
async fn terminal_command_seen_again_redelivers_result_without_re_executing() {
    let (_dir, queue, store, handler) = harness().await;
    store
        .insert_in_progress("c1", "logcollector", "reload", json!({}), 0.0)
        .await
        .unwrap();
    store
        .record_result("c1", ExecutionResult::new(CommandStatus::Success, "ok"))
        .await
        .unwrap();

    let command = json!({"id": "c1", "module": "logcollector", "command": "reload", "parameters": {}});
    queue.push(Channel::Command, &command, "logcollector", "command", None).await.unwrap();

    let cancel = CancellationToken::new();
    let run = {
        let cancel = cancel.clone();
        tokio::spawn(async move { handler.run(cancel).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();
    let _ = run.await;

    // The stored result is untouched (not re-executed), but it is re-pushed
    // onto the stateful channel so delivery survives a crash that happened
    // before the first push landed.
    let entry = store.get("c1").await.unwrap().unwrap();
    assert_eq!(entry.execution_result.message, "ok");

    let stateful = queue.get_batch(Channel::Stateful, 10, 1 << 20).await.unwrap();
    assert_eq!(stateful.len(), 1);
    assert_eq!(stateful[0].message.payload["id"], "c1");
    assert_eq!(stateful[0].message.payload["message"], "ok");
}

#[tokio::test]
async fn unknown_module_fails_cleanly() {
    let (_dir, queue, store, handler) = harness().await;
    let command = json!({"id": "c1", "module": "nonexistent", "command": "reload", "parameters": {}});
    queue.push(Channel::Command, &command, "nonexistent", "command", None).await.unwrap();

    let cancel = CancellationToken::new();
    let run = {
        let cancel = cancel.clone();
        tokio::spawn(async move { handler.run(cancel).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();
    let _ = run.await;

    let entry = store.get("c1").await.unwrap().unwrap();
    assert_eq!(entry.execution_result.status, CommandStatus::Failure);
}
