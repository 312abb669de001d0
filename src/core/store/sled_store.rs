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

//! sled-backed [`Store`].
//!
//! Key layout (one tree):
//! - `chan/` ‖ multisig (20 bytes) → channel snapshot
//! - `commit/` ‖ protocol ‖ `/` ‖ canonical key bytes → signed commitment
//! - `exec/` ‖ execution id → open execution record
//! - `done/` ‖ execution id → empty marker of a finished run
//! - `sent/` ‖ execution id → messages the run sent, in order

use super::{ExecutionRecord, Store, StoreError};
use crate::core::{
    commitments::SignedCommitment,
    model::{state_channel::MAX_SNAPSHOT_BYTES, StateChannel},
    protocol::{CommitmentKey, Protocol, ProtocolMessage, Resume},
    types::{decode_canonical_limited, encode_canonical, Address},
};
use async_trait::async_trait;
use sled::transaction::ConflictableTransactionError;
use tracing::debug;

const CHANNEL_PREFIX: &[u8] = b"chan/";
const COMMITMENT_PREFIX: &[u8] = b"commit/";
const EXECUTION_PREFIX: &[u8] = b"exec/";
const DONE_PREFIX: &[u8] = b"done/";
const SENT_PREFIX: &[u8] = b"sent/";

/// Upper bound on any stored value.
const MAX_VALUE_BYTES: usize = MAX_SNAPSHOT_BYTES * 4;

/// One write inside an atomic batch.
#[derive(Clone, Debug)]
pub enum KvOp {
    /// Put key/value.
    Put {
        /// Key.
        key: Vec<u8>,
        /// Value.
        value: Vec<u8>,
    },
    /// Delete key.
    Del {
        /// Key.
        key: Vec<u8>,
    },
}

/// Durable store on a sled database.
#[derive(Clone)]
pub struct SledStore {
    db: sled::Db,
}

fn prefixed(prefix: &[u8], rest: &[u8]) -> Vec<u8> {
    let mut k = Vec::with_capacity(prefix.len() + rest.len());
    k.extend_from_slice(prefix);
    k.extend_from_slice(rest);
    k
}

fn channel_key(multisig: &Address) -> Vec<u8> {
    prefixed(CHANNEL_PREFIX, multisig.as_bytes())
}

fn commitment_key(protocol: Protocol, key: &CommitmentKey) -> Result<Vec<u8>, StoreError> {
    let mut k = prefixed(COMMITMENT_PREFIX, protocol.as_str().as_bytes());
    k.push(b'/');
    k.extend_from_slice(&encode_canonical(key)?);
    Ok(k)
}

impl SledStore {
    /// Open (or create) the database in directory `path`.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(|_| StoreError::DbOpen)?;
        Ok(Self { db })
    }

    /// Temporary database removed on drop.
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|_| StoreError::DbOpen)?;
        Ok(Self { db })
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let v = self.db.get(key).map_err(|_| StoreError::DbIo)?;
        Ok(v.map(|iv| iv.to_vec()))
    }

    fn scan(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>, StoreError> {
        let mut out = Vec::new();
        for item in self.db.scan_prefix(prefix) {
            let (_, v) = item.map_err(|_| StoreError::DbIo)?;
            out.push(v.to_vec());
        }
        Ok(out)
    }

    /// Apply `ops` in one sled transaction, then flush.
    pub fn commit_atomic(&self, ops: Vec<KvOp>) -> Result<(), StoreError> {
        let tree = &self.db;
        let res: Result<(), ConflictableTransactionError<StoreError>> = (|| {
            tree.transaction(|t| {
                for op in ops.iter() {
                    match op {
                        KvOp::Put { key, value } => {
                            t.insert(key.as_slice(), value.as_slice()).map_err(|_| {
                                ConflictableTransactionError::Abort(StoreError::DbIo)
                            })?;
                        }
                        KvOp::Del { key } => {
                            t.remove(key.as_slice()).map_err(|_| {
                                ConflictableTransactionError::Abort(StoreError::DbIo)
                            })?;
                        }
                    }
                }
                Ok(())
            })
            .map_err(|e| match e {
                sled::transaction::TransactionError::Abort(se) => {
                    ConflictableTransactionError::Abort(se)
                }
                sled::transaction::TransactionError::Storage(_) => {
                    ConflictableTransactionError::Abort(StoreError::DbIo)
                }
            })
        })();

        match res {
            Ok(()) => {}
            Err(ConflictableTransactionError::Abort(e)) => return Err(e),
            Err(ConflictableTransactionError::Conflict) => return Err(StoreError::TxConflict),
            Err(ConflictableTransactionError::Storage(_)) => return Err(StoreError::DbIo),
        }
        self.db.flush().map_err(|_| StoreError::DbIo)?;
        Ok(())
    }

    fn get_record(&self, execution_id: &str) -> Result<Option<ExecutionRecord>, StoreError> {
        match self.get(&prefixed(EXECUTION_PREFIX, execution_id.as_bytes()))? {
            Some(bytes) => Ok(Some(decode_canonical_limited(&bytes, MAX_VALUE_BYTES)?)),
            None => Ok(None),
        }
    }

    fn put_record(&self, record: &ExecutionRecord) -> Result<(), StoreError> {
        self.commit_atomic(vec![KvOp::Put {
            key: prefixed(EXECUTION_PREFIX, record.execution_id().as_bytes()),
            value: encode_canonical(record)?,
        }])
    }
}

#[async_trait]
impl Store for SledStore {
    async fn get_state_channel(&self, multisig: &Address) -> Result<Option<StateChannel>, StoreError> {
        match self.get(&channel_key(multisig))? {
            Some(bytes) => Ok(Some(StateChannel::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn get_all_state_channels(&self) -> Result<Vec<StateChannel>, StoreError> {
        self.scan(CHANNEL_PREFIX)?
            .iter()
            .map(|b| StateChannel::from_bytes(b).map_err(StoreError::from))
            .collect()
    }

    async fn save_state_channels(&self, channels: &[StateChannel]) -> Result<(), StoreError> {
        let mut ops = Vec::with_capacity(channels.len());
        for ch in channels {
            ops.push(KvOp::Put { key: channel_key(&ch.multisig_address), value: ch.to_bytes()? });
        }
        self.commit_atomic(ops)?;
        debug!(count = channels.len(), "channels saved");
        Ok(())
    }

    async fn save_commitment(
        &self,
        protocol: Protocol,
        key: &CommitmentKey,
        commitment: &SignedCommitment,
    ) -> Result<(), StoreError> {
        self.commit_atomic(vec![KvOp::Put {
            key: commitment_key(protocol, key)?,
            value: encode_canonical(commitment)?,
        }])?;
        debug!(%protocol, kind = commitment.commitment.kind(), "commitment saved");
        Ok(())
    }

    async fn get_commitment(
        &self,
        protocol: Protocol,
        key: &CommitmentKey,
    ) -> Result<Option<SignedCommitment>, StoreError> {
        match self.get(&commitment_key(protocol, key)?)? {
            Some(bytes) => Ok(Some(decode_canonical_limited(&bytes, MAX_VALUE_BYTES)?)),
            None => Ok(None),
        }
    }

    async fn begin_execution(&self, record: &ExecutionRecord) -> Result<(), StoreError> {
        self.put_record(record)
    }

    async fn append_step(&self, execution_id: &str, step: &Resume) -> Result<(), StoreError> {
        let mut record = self
            .get_record(execution_id)?
            .ok_or_else(|| StoreError::UnknownExecution(execution_id.to_string()))?;
        record.steps.push(step.clone());
        self.put_record(&record)
    }

    async fn finish_execution(&self, execution_id: &str) -> Result<(), StoreError> {
        self.commit_atomic(vec![
            KvOp::Del { key: prefixed(EXECUTION_PREFIX, execution_id.as_bytes()) },
            KvOp::Put { key: prefixed(DONE_PREFIX, execution_id.as_bytes()), value: Vec::new() },
        ])
    }

    async fn has_execution(&self, execution_id: &str) -> Result<bool, StoreError> {
        Ok(self.get(&prefixed(EXECUTION_PREFIX, execution_id.as_bytes()))?.is_some()
            || self.get(&prefixed(DONE_PREFIX, execution_id.as_bytes()))?.is_some())
    }

    async fn unfinished_executions(&self) -> Result<Vec<ExecutionRecord>, StoreError> {
        self.scan(EXECUTION_PREFIX)?
            .iter()
            .map(|b| decode_canonical_limited(b, MAX_VALUE_BYTES).map_err(StoreError::from))
            .collect()
    }

    async fn record_outgoing(&self, msg: &ProtocolMessage) -> Result<(), StoreError> {
        let mut sent = self.outgoing(&msg.protocol_execution_id).await?;
        if sent.contains(msg) {
            return Ok(());
        }
        sent.push(msg.clone());
        self.commit_atomic(vec![KvOp::Put {
            key: prefixed(SENT_PREFIX, msg.protocol_execution_id.as_bytes()),
            value: encode_canonical(&sent)?,
        }])
    }

    async fn outgoing(&self, execution_id: &str) -> Result<Vec<ProtocolMessage>, StoreError> {
        match self.get(&prefixed(SENT_PREFIX, execution_id.as_bytes()))? {
            Some(bytes) => Ok(decode_canonical_limited(&bytes, MAX_VALUE_BYTES)?),
            None => Ok(Vec::new()),
        }
    }
}
