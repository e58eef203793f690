use super::*;
use crate::persistence;

async fn open_temp_pool() -> (tempfile::TempDir, SqlitePool) {
    let dir = tempfile::tempdir().unwrap();
    let pool = persistence::open(&dir.path().join("agent_info.db")).await.unwrap();
    (dir, pool)
}

#[tokio::test]
async fn load_or_init_generates_a_valid_key_on_first_run() {
    let (_dir, pool) = open_temp_pool().await;
    let info = AgentInfo::new(pool);
    let identity = info.load_or_init("hostA").await.unwrap();
    assert!(is_valid_key(&identity.key));
    assert_eq!(identity.name, "hostA");
}

#[tokio::test]
async fn load_or_init_is_idempotent_across_calls() {
    let (_dir, pool) = open_temp_pool().await;
    let info = AgentInfo::new(pool);
    let first = info.load_or_init("hostA").await.unwrap();
    let second = info.load_or_init("hostB").await.unwrap();
    assert_eq!(first.uuid, second.uuid);
    assert_eq!(first.key, second.key);
    assert_eq!(second.name, "hostA");
}

#[tokio::test]
async fn set_key_rejects_anything_but_32_alphanumeric_chars() {
    let (_dir, pool) = open_temp_pool().await;
    let info = AgentInfo::new(pool);
    let identity = info.load_or_init("hostA").await.unwrap();

    assert!(!info.set_key("too-short").await.unwrap());
    assert!(!info.set_key(&"x".repeat(31)).await.unwrap());
    assert!(!info.set_key(&"!".repeat(32)).await.unwrap());

    let unchanged = info.try_load().await.unwrap().unwrap();
    assert_eq!(unchanged.key, identity.key);

    let good = "A1B2C3D4E5F6G7H8I9J0K1L2M3N4O5P6";
    assert!(info.set_key(good).await.unwrap());
    let changed = info.try_load().await.unwrap().unwrap();
    assert_eq!(changed.key, good);
}

#[tokio::test]
async fn set_groups_rejects_duplicates() {
    let (_dir, pool) = open_temp_pool().await;
    let info = AgentInfo::new(pool);
    info.load_or_init("hostA").await.unwrap();

    assert!(info.set_groups(&["a".into(), "b".into()]).await.is_ok());
    assert_eq!(info.groups().await.unwrap(), vec!["a".to_string(), "b".to_string()]);

    assert!(info.set_groups(&["a".into(), "a".into()]).await.is_err());
}

#[tokio::test]
async fn reset_clears_identity_and_groups() {
    let (_dir, pool) = open_temp_pool().await;
    let info = AgentInfo::new(pool);
    info.load_or_init("hostA").await.unwrap();
    info.set_groups(&["a".into()]).await.unwrap();

    info.reset().await.unwrap();
    assert!(info.try_load().await.unwrap().is_none());
    assert!(info.groups().await.unwrap().is_empty());
}
