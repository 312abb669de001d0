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

//! Durable state: channel snapshots, signed commitments, the execution
//! log that makes crash-resume possible, and each run's sent messages.
//!
//! Every call is atomic: a batch of channels lands together or not at all.

pub mod memory;
pub mod sled_store;

use crate::core::{
    commitments::SignedCommitment,
    model::StateChannel,
    protocol::{CommitmentKey, Protocol, ProtocolMessage, Resume},
    types::{Address, CodecError},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::MemoryStore;
pub use sled_store::SledStore;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database could not be opened.
    #[error("db open")]
    DbOpen,
    /// Read or write failed.
    #[error("db io")]
    DbIo,
    /// Concurrent transaction conflict.
    #[error("tx conflict")]
    TxConflict,
    /// Stored bytes undecodable.
    #[error("codec: {0}")]
    Codec(#[from] CodecError),
    /// Step appended to an execution that was never begun.
    #[error("unknown execution: {0}")]
    UnknownExecution(String),
}

/// Log entry of one protocol run on this node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Message that started the run here (own proposal for the initiator).
    pub start: ProtocolMessage,
    /// Implicated channels as they were when the run started.
    pub channels_at_start: Vec<StateChannel>,
    /// Results of the instructions completed so far, in order.
    pub steps: Vec<Resume>,
}

impl ExecutionRecord {
    /// Execution id of the run.
    pub fn execution_id(&self) -> &str {
        &self.start.protocol_execution_id
    }
}

/// Persistence collaborator of the driver.
#[async_trait]
pub trait Store: Send + Sync {
    /// Latest snapshot of a channel.
    async fn get_state_channel(&self, multisig: &Address) -> Result<Option<StateChannel>, StoreError>;

    /// Every stored channel, ascending by multisig.
    async fn get_all_state_channels(&self) -> Result<Vec<StateChannel>, StoreError>;

    /// Replace the snapshots of `channels` in one atomic write.
    async fn save_state_channels(&self, channels: &[StateChannel]) -> Result<(), StoreError>;

    /// Persist a finished commitment under (protocol, key), replacing any previous one.
    async fn save_commitment(
        &self,
        protocol: Protocol,
        key: &CommitmentKey,
        commitment: &SignedCommitment,
    ) -> Result<(), StoreError>;

    /// Commitment stored under (protocol, key).
    async fn get_commitment(
        &self,
        protocol: Protocol,
        key: &CommitmentKey,
    ) -> Result<Option<SignedCommitment>, StoreError>;

    /// Open a log entry for a new run.
    async fn begin_execution(&self, record: &ExecutionRecord) -> Result<(), StoreError>;

    /// Record the result of the run's next instruction.
    async fn append_step(&self, execution_id: &str, step: &Resume) -> Result<(), StoreError>;

    /// Close a log entry; the run will not be resumed.
    async fn finish_execution(&self, execution_id: &str) -> Result<(), StoreError>;

    /// Execution known to the log, finished or not.
    async fn has_execution(&self, execution_id: &str) -> Result<bool, StoreError>;

    /// Runs begun and never finished, ascending by execution id.
    async fn unfinished_executions(&self) -> Result<Vec<ExecutionRecord>, StoreError>;

    /// Remember a message sent during its run. Kept after the run finishes;
    /// a message already recorded is not added twice.
    async fn record_outgoing(&self, msg: &ProtocolMessage) -> Result<(), StoreError>;

    /// Messages sent during `execution_id`, in send order.
    async fn outgoing(&self, execution_id: &str) -> Result<Vec<ProtocolMessage>, StoreError>;
}
