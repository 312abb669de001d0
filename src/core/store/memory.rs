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

//! In-memory [`Store`] for tests and ephemeral participants.

use super::{ExecutionRecord, Store, StoreError};
use crate::core::{
    commitments::SignedCommitment,
    model::StateChannel,
    protocol::{CommitmentKey, Protocol, ProtocolMessage, Resume},
    types::{Address, CanonicalMap},
};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Tables {
    channels: CanonicalMap<Address, StateChannel>,
    commitments: CanonicalMap<(Protocol, CommitmentKey), SignedCommitment>,
    open: CanonicalMap<String, ExecutionRecord>,
    done: BTreeSet<String>,
    sent: CanonicalMap<String, Vec<ProtocolMessage>>,
}

/// Store holding everything behind one lock.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables.lock().map_err(|_| StoreError::DbIo)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_state_channel(&self, multisig: &Address) -> Result<Option<StateChannel>, StoreError> {
        Ok(self.lock()?.channels.get(multisig).cloned())
    }

    async fn get_all_state_channels(&self) -> Result<Vec<StateChannel>, StoreError> {
        Ok(self.lock()?.channels.values().cloned().collect())
    }

    async fn save_state_channels(&self, channels: &[StateChannel]) -> Result<(), StoreError> {
        let mut t = self.lock()?;
        for ch in channels {
            t.channels.insert(ch.multisig_address, ch.clone());
        }
        Ok(())
    }

    async fn save_commitment(
        &self,
        protocol: Protocol,
        key: &CommitmentKey,
        commitment: &SignedCommitment,
    ) -> Result<(), StoreError> {
        self.lock()?
            .commitments
            .insert((protocol, key.clone()), commitment.clone());
        Ok(())
    }

    async fn get_commitment(
        &self,
        protocol: Protocol,
        key: &CommitmentKey,
    ) -> Result<Option<SignedCommitment>, StoreError> {
        Ok(self.lock()?.commitments.get(&(protocol, key.clone())).cloned())
    }

    async fn begin_execution(&self, record: &ExecutionRecord) -> Result<(), StoreError> {
        self.lock()?
            .open
            .insert(record.execution_id().to_string(), record.clone());
        Ok(())
    }

    async fn append_step(&self, execution_id: &str, step: &Resume) -> Result<(), StoreError> {
        let mut t = self.lock()?;
        let record = t
            .open
            .get_mut(execution_id)
            .ok_or_else(|| StoreError::UnknownExecution(execution_id.to_string()))?;
        record.steps.push(step.clone());
        Ok(())
    }

    async fn finish_execution(&self, execution_id: &str) -> Result<(), StoreError> {
        let mut t = self.lock()?;
        t.open.remove(execution_id);
        t.done.insert(execution_id.to_string());
        Ok(())
    }

    async fn has_execution(&self, execution_id: &str) -> Result<bool, StoreError> {
        let t = self.lock()?;
        Ok(t.open.contains_key(execution_id) || t.done.contains(execution_id))
    }

    async fn unfinished_executions(&self) -> Result<Vec<ExecutionRecord>, StoreError> {
        Ok(self.lock()?.open.values().cloned().collect())
    }

    async fn record_outgoing(&self, msg: &ProtocolMessage) -> Result<(), StoreError> {
        let mut t = self.lock()?;
        let sent = t.sent.entry(msg.protocol_execution_id.clone()).or_default();
        if !sent.contains(msg) {
            sent.push(msg.clone());
        }
        Ok(())
    }

    async fn outgoing(&self, execution_id: &str) -> Result<Vec<ProtocolMessage>, StoreError> {
        Ok(self.lock()?.sent.get(execution_id).cloned().unwrap_or_default())
    }
}
