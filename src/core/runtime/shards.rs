// Copyright (c) 2026 Amunchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Per-shard serialization of protocol runs.
//!
//! A run holds the locks of every shard it touches for its whole duration.
//! Locks are always taken in ascending key order, so two runs sharing
//! several shards cannot deadlock.

use crate::core::{
    protocol::ProtocolParams,
    security::xkey::{ExtendedPublicKey, KeyError},
    types::{Address, NetworkContext, H256},
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Unit of serialization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShardKey {
    /// A channel.
    Channel(Address),
    /// An app.
    App(H256),
}

/// Shards a run started by `params` occupies on the node of `me`.
pub fn shard_keys(
    network: &NetworkContext,
    params: &ProtocolParams,
    me: &ExtendedPublicKey,
) -> Result<Vec<ShardKey>, KeyError> {
    let mut keys: Vec<ShardKey> = params
        .channel_addresses(network, me)?
        .into_iter()
        .map(ShardKey::Channel)
        .collect();
    if let Some(app) = params.app_identity_hash() {
        keys.push(ShardKey::App(app));
    }
    keys.sort();
    keys.dedup();
    Ok(keys)
}

/// Held locks of one run; released on drop.
pub struct ShardGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

/// Lock table.
#[derive(Default)]
pub struct ShardLocks {
    locks: Mutex<HashMap<ShardKey, Arc<AsyncMutex<()>>>>,
}

impl ShardLocks {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, key: ShardKey) -> Arc<AsyncMutex<()>> {
        let mut map = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(key).or_default().clone()
    }

    /// Wait for every shard in `keys`, in ascending order.
    pub async fn acquire(&self, keys: &[ShardKey]) -> ShardGuard {
        let mut sorted = keys.to_vec();
        sorted.sort();
        sorted.dedup();
        let mut guards = Vec::with_capacity(sorted.len());
        for key in sorted {
            guards.push(self.handle(key).lock_owned().await);
        }
        ShardGuard { _guards: guards }
    }

    /// Whether some run currently holds `key`.
    pub fn is_held(&self, key: &ShardKey) -> bool {
        let map = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        map.get(key).is_some_and(|m| m.try_lock().is_err())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_shard_serializes() {
        let locks = Arc::new(ShardLocks::new());
        let k = ShardKey::Channel(Address::repeat_byte(1));
        let g = locks.acquire(&[k]).await;
        assert!(locks.is_held(&k));

        let l2 = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = l2.acquire(&[k]).await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(g);
        tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn distinct_shards_proceed() {
        let locks = ShardLocks::new();
        let _a = locks.acquire(&[ShardKey::Channel(Address::repeat_byte(1))]).await;
        let b = tokio::time::timeout(
            Duration::from_millis(100),
            locks.acquire(&[ShardKey::App(H256::repeat_byte(2))]),
        )
        .await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn overlapping_sets_in_any_order_do_not_deadlock() {
        let locks = Arc::new(ShardLocks::new());
        let a = ShardKey::Channel(Address::repeat_byte(1));
        let b = ShardKey::Channel(Address::repeat_byte(2));
        let mut tasks = Vec::new();
        for i in 0..16 {
            let l = locks.clone();
            let keys = if i % 2 == 0 { vec![a, b] } else { vec![b, a] };
            tasks.push(tokio::spawn(async move {
                let _g = l.acquire(&keys).await;
                tokio::task::yield_now().await;
            }));
        }
        let all = futures::future::join_all(tasks);
        let done = tokio::time::timeout(Duration::from_secs(2), all).await.unwrap();
        assert!(done.into_iter().all(|r| r.is_ok()));
    }
}
