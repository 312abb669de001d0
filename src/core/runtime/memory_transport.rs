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

//! In-process transport connecting several runners.
//!
//! Every message goes through the wire codec and is delivered on its own
//! task, so runners interact exactly as they would over a network.
//! Participants can be disconnected to simulate an unreachable peer.

use super::{driver::ProtocolRunner, Transport, TransportError};
use crate::core::{
    protocol::{message::encode_message, ProtocolMessage},
    security::xkey::ExtendedPublicKey,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Message switch between registered runners.
#[derive(Default)]
pub struct MemoryHub {
    peers: Mutex<HashMap<String, ProtocolRunner>>,
    disconnected: Mutex<HashSet<String>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MemoryHub {
    /// Empty hub.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Transport handle sending through this hub.
    pub fn transport(self: &Arc<Self>) -> Arc<dyn Transport> {
        Arc::new(HubTransport { hub: Arc::downgrade(self) })
    }

    /// Make `runner` reachable under its xpub.
    pub fn register(&self, runner: ProtocolRunner) {
        let key = runner.xpub().to_string();
        self.peers.lock().unwrap_or_else(|e| e.into_inner()).insert(key, runner);
    }

    /// Silently drop every message addressed to `xpub` from now on.
    pub fn disconnect(&self, xpub: &ExtendedPublicKey) {
        self.disconnected
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(xpub.to_string());
    }

    /// Undo [`MemoryHub::disconnect`].
    pub fn reconnect(&self, xpub: &ExtendedPublicKey) {
        self.disconnected
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&xpub.to_string());
    }

    /// Wait until every delivery, including ones spawned meanwhile, is done.
    pub async fn settle(&self) {
        loop {
            let handles = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|e| e.into_inner()));
            if handles.is_empty() {
                return;
            }
            for h in handles {
                if let Err(e) = h.await {
                    warn!(error = %e, "delivery task failed");
                }
            }
        }
    }

    fn deliver(&self, msg: ProtocolMessage) -> Result<(), TransportError> {
        let key = msg.to_xpub.to_string();
        if self
            .disconnected
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&key)
        {
            debug!(execution_id = %msg.protocol_execution_id, "peer disconnected; message dropped");
            return Ok(());
        }
        let runner = self
            .peers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
            .cloned()
            .ok_or(TransportError::UnknownPeer(key))?;
        let bytes = encode_message(&msg)?;
        let handle = tokio::spawn(async move {
            if let Err(e) = runner.on_bytes(&bytes).await {
                warn!(error = %e, "delivered message failed");
            }
        });
        self.tasks.lock().unwrap_or_else(|e| e.into_inner()).push(handle);
        Ok(())
    }
}

struct HubTransport {
    hub: Weak<MemoryHub>,
}

#[async_trait]
impl Transport for HubTransport {
    async fn send(&self, msg: ProtocolMessage) -> Result<(), TransportError> {
        let hub = self.hub.upgrade().ok_or(TransportError::Closed)?;
        hub.deliver(msg)
    }
}
