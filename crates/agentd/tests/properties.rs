// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Property-based suite covering queue ordering, durability across a
//! simulated crash, back-pressure, and key validation.

use std::sync::Arc;

use proptest::prelude::*;
use serde_json::json;
use warden_core::agent_info::AgentInfo;
use warden_core::message::Channel;
use warden_core::persistence::{self, Persistence, SqlitePersistence};
use warden_core::queue::{ChannelLimits, MultiTypeQueue};

fn rt() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Whatever order messages are pushed into one channel, repeated
    /// getBatch -> remove returns exactly that order.
    #[test]
    fn queue_ordering_matches_push_order(values in proptest::collection::vec(0i64..1000, 1..50)) {
        rt().block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let store = SqlitePersistence::open(&dir.path().join("agent_info.db")).await.unwrap();
            let queue = MultiTypeQueue::new(
                Arc::new(store),
                ChannelLimits { max_count: 10_000, max_bytes: 64 << 20 },
            );

            for v in &values {
                queue.push(Channel::Stateless, &json!({"v": v}), "m", "t", None).await.unwrap();
            }

            let mut observed = Vec::new();
            loop {
                let batch = queue.get_batch(Channel::Stateless, 7, 1 << 20).await.unwrap();
                if batch.is_empty() {
                    break;
                }
                let upto = batch.last().unwrap().sequence;
                for m in &batch {
                    observed.push(m.message.payload["v"].as_i64().unwrap());
                }
                queue.remove(Channel::Stateless, upto).await.unwrap();
            }

            prop_assert_eq!(observed, values);
            Ok(())
        })?;
    }

    /// After a simulated crash (no remove ever called), every persisted
    /// message is observable on a fresh connection to the same database
    /// file.
    #[test]
    fn durability_survives_simulated_crash(values in proptest::collection::vec(0i64..1000, 1..30)) {
        rt().block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("agent_info.db");
            {
                let store = SqlitePersistence::open(&path).await.unwrap();
                for v in &values {
                    store.store(Channel::Stateless, &json!({"v": v}), "m", "t", None).await.unwrap();
                }
                // no remove: simulates a hard kill before acknowledgment
            }

            let reopened = SqlitePersistence::open(&path).await.unwrap();
            let batch = reopened.retrieve_multiple(Channel::Stateless, values.len(), 64 << 20).await.unwrap();
            let observed: Vec<i64> = batch.iter().map(|m| m.message.payload["v"].as_i64().unwrap()).collect();
            prop_assert_eq!(observed, values);
            Ok(())
        })?;
    }

    /// Pushing past either cap returns `ChannelFull` without mutating
    /// persisted state.
    #[test]
    fn backpressure_never_mutates_state_on_rejection(cap in 1usize..20, extra in 1usize..10) {
        rt().block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let store = SqlitePersistence::open(&dir.path().join("agent_info.db")).await.unwrap();
            let queue = MultiTypeQueue::new(
                Arc::new(store),
                ChannelLimits { max_count: cap, max_bytes: 64 << 20 },
            );

            for _ in 0..cap {
                queue.push(Channel::Stateless, &json!({}), "m", "t", None).await.unwrap();
            }
            let before = queue.count(Channel::Stateless).await.unwrap();

            for _ in 0..extra {
                let result = queue.push(Channel::Stateless, &json!({}), "m", "t", None).await;
                prop_assert!(result.is_err());
            }

            let after = queue.count(Channel::Stateless).await.unwrap();
            prop_assert_eq!(before, after);
            prop_assert_eq!(after, cap);
            Ok(())
        })?;
    }

    /// `setKey` accepts exactly 32 `[A-Za-z0-9]` characters; every other
    /// input leaves the stored key unchanged and reports failure.
    #[test]
    fn set_key_accepts_only_32_alphanumeric_chars(candidate in "[ -~]{0,40}") {
        rt().block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let pool = persistence::open(&dir.path().join("agent_info.db")).await.unwrap();
            let agent_info = AgentInfo::new(pool);
            let original = agent_info.load_or_init("host").await.unwrap();

            let should_accept = candidate.len() == 32 && candidate.chars().all(|c| c.is_ascii_alphanumeric());
            let accepted = agent_info.set_key(&candidate).await.unwrap();
            prop_assert_eq!(accepted, should_accept);

            let stored = agent_info.load_or_init("host").await.unwrap();
            if should_accept {
                prop_assert_eq!(stored.key, candidate);
            } else {
                prop_assert_eq!(stored.key, original.key);
            }
            Ok(())
        })?;
    }
}
