use serde_json::json;

use super::*;
use crate::command::CommandStatus;
use crate::modules::echo::EchoModule;

#[tokio::test]
async fn registry_looks_up_by_name() {
    let registry = ModuleRegistry::builder()
        .register(Box::new(EchoModule::new("echo-a")))
        .register(Box::new(EchoModule::new("echo-b")))
        .build();

    assert!(registry.get("echo-a").is_some());
    assert!(registry.get("missing").is_none());
    assert_eq!(registry.names().collect::<Vec<_>>(), vec!["echo-a", "echo-b"]);
}

#[tokio::test]
async fn start_all_and_stop_all_run_without_error() {
    let registry = ModuleRegistry::builder()
        .register(Box::new(EchoModule::new("echo-a")))
        .build();
    assert!(registry.start_all().await.is_ok());
    registry.stop_all(std::time::Duration::from_secs(1)).await;
}

#[tokio::test]
async fn dispatch_reaches_the_named_module() {
    let registry = ModuleRegistry::builder()
        .register(Box::new(EchoModule::new("echo-a")))
        .build();
    let module = registry.get("echo-a").unwrap();
    let result = module.execute_command("reload", &json!({})).await;
    assert_eq!(result.status, CommandStatus::Success);
}

#[tokio::test]
async fn unknown_commands_fail_without_panicking() {
    let registry = ModuleRegistry::builder()
        .register(Box::new(EchoModule::new("echo-a")))
        .build();
    let module = registry.get("echo-a").unwrap();
    let result = module.execute_command("bogus", &json!({})).await;
    assert_eq!(result.status, CommandStatus::Failure);
}
