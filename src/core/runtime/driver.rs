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

//! Protocol runner wiring for one participant.
//!
//! The runner starts runs for local callers, routes inbound messages either
//! to the waiting run (replies) or to a new responder run (flow starts),
//! and interprets every yielded instruction against the injected signer,
//! transport and store. A repeated flow start is answered with the messages
//! the earlier run sent back to its sender. Runs touching the same channel or app are
//! serialized through [`ShardLocks`].

use super::{
    replay::{Effects, ReplayingYield},
    shards::{shard_keys, ShardLocks},
    Transport, TransportError,
};
use crate::core::{
    protocol::{
        message::{decode_message, new_execution_id, DEFAULT_MAX_MESSAGE_BYTES},
        oracle::AppOracle,
        run_protocol, Context, Instruction, ProtocolError, ProtocolMessage, ProtocolParams, Resume,
    },
    security::{keystore::Signer, xkey::ExtendedPublicKey},
    store::{ExecutionRecord, Store},
    types::{CanonicalMap, NetworkContext},
};
use crate::monitoring::metrics::Metrics;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

/// Default wait budget of one `SendAndWait`.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(60);

/// Runner settings.
#[derive(Clone, Debug)]
pub struct RunnerConfig {
    /// Wait budget of one `SendAndWait`.
    pub io_timeout: Duration,
    /// Cap on an inbound encoded message.
    pub max_message_bytes: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self { io_timeout: DEFAULT_IO_TIMEOUT, max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES }
    }
}

struct Inner {
    network: NetworkContext,
    signer: Arc<dyn Signer>,
    transport: Arc<dyn Transport>,
    store: Arc<dyn Store>,
    oracle: Arc<dyn AppOracle>,
    config: RunnerConfig,
    shards: ShardLocks,
    pending: Mutex<HashMap<String, oneshot::Sender<ProtocolMessage>>>,
    metrics: Option<Arc<Metrics>>,
}

/// One participant's protocol runner. Cheap to clone.
#[derive(Clone)]
pub struct ProtocolRunner {
    inner: Arc<Inner>,
}

impl ProtocolRunner {
    /// Runner over the given collaborators.
    pub fn new(
        network: NetworkContext,
        signer: Arc<dyn Signer>,
        transport: Arc<dyn Transport>,
        store: Arc<dyn Store>,
        oracle: Arc<dyn AppOracle>,
        config: RunnerConfig,
    ) -> Self {
        Self::build(network, signer, transport, store, oracle, config, None)
    }

    /// Runner reporting into `metrics`.
    #[allow(clippy::too_many_arguments)]
    pub fn with_metrics(
        network: NetworkContext,
        signer: Arc<dyn Signer>,
        transport: Arc<dyn Transport>,
        store: Arc<dyn Store>,
        oracle: Arc<dyn AppOracle>,
        config: RunnerConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self::build(network, signer, transport, store, oracle, config, Some(metrics))
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        network: NetworkContext,
        signer: Arc<dyn Signer>,
        transport: Arc<dyn Transport>,
        store: Arc<dyn Store>,
        oracle: Arc<dyn AppOracle>,
        config: RunnerConfig,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                network,
                signer,
                transport,
                store,
                oracle,
                config,
                shards: ShardLocks::new(),
                pending: Mutex::new(HashMap::new()),
                metrics,
            }),
        }
    }

    /// Local participant.
    pub fn xpub(&self) -> &ExtendedPublicKey {
        self.inner.signer.extended_public_key()
    }

    /// Backing store.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.inner.store
    }

    /// Run `params` as initiator to completion. Returns the execution id.
    pub async fn initiate(&self, params: ProtocolParams) -> Result<String, ProtocolError> {
        let roles = params.roles();
        if roles[0] != self.xpub() {
            return Err(ProtocolError::UnexpectedMessage("local participant is not the initiator".into()));
        }
        let start = ProtocolMessage {
            protocol_execution_id: new_execution_id()?,
            protocol: params.protocol(),
            seq: 0,
            from_xpub: self.xpub().clone(),
            to_xpub: roles[1].clone(),
            params,
            signature: None,
            signature2: None,
            signature3: None,
        };
        let id = start.protocol_execution_id.clone();
        self.inner.execute(start, None).await?;
        Ok(id)
    }

    /// Handle one inbound message.
    pub async fn on_message(&self, msg: ProtocolMessage) -> Result<(), ProtocolError> {
        if &msg.to_xpub != self.xpub() {
            return Err(ProtocolError::UnexpectedMessage("addressed to another participant".into()));
        }
        if !msg.is_flow_start() {
            self.inner.deliver_reply(msg).await;
            return Ok(());
        }
        if msg.seq == 0 {
            return Err(ProtocolError::UnexpectedMessage("initiator role cannot be delivered".into()));
        }
        self.inner.execute(msg, None).await
    }

    /// Decode and handle one inbound wire message.
    pub async fn on_bytes(&self, bytes: &[u8]) -> Result<(), ProtocolError> {
        let msg = match decode_message(bytes, self.inner.config.max_message_bytes) {
            Ok(m) => m,
            Err(e) => {
                if let Some(m) = &self.inner.metrics {
                    m.invalid_msg_total.inc();
                }
                return Err(e.into());
            }
        };
        self.on_message(msg).await
    }

    /// Resume every run the store holds as unfinished, one after another.
    ///
    /// Returns the number of runs resumed. Failures of individual runs are
    /// logged and do not stop the others.
    pub async fn resume_unfinished(&self) -> Result<usize, ProtocolError> {
        let records = self.inner.store.unfinished_executions().await?;
        let count = records.len();
        for record in records {
            let id = record.execution_id().to_string();
            let start = record.start.clone();
            if let Err(e) = self.inner.execute(start, Some(record)).await {
                warn!(execution_id = %id, error = %e, "resumed run aborted");
            }
        }
        Ok(count)
    }
}

impl Inner {
    async fn deliver_reply(&self, msg: ProtocolMessage) {
        let waiter = self.pending.lock().await.remove(&msg.protocol_execution_id);
        match waiter {
            Some(tx) => {
                if tx.send(msg).is_err() {
                    debug!("reply waiter already gone");
                }
            }
            None => {
                if let Some(m) = &self.metrics {
                    m.orphan_replies_total.inc();
                }
                warn!(
                    execution_id = %msg.protocol_execution_id,
                    protocol = %msg.protocol,
                    "reply without waiting run dropped"
                );
            }
        }
    }

    async fn execute(&self, start: ProtocolMessage, resumed: Option<ExecutionRecord>) -> Result<(), ProtocolError> {
        let me = self.signer.extended_public_key().clone();
        let id = start.protocol_execution_id.clone();
        let protocol = start.protocol;

        let keys = shard_keys(&self.network, &start.params, &me)?;
        let _guard = self.shards.acquire(&keys).await;

        let record = match resumed {
            Some(r) => r,
            None => {
                if self.store.has_execution(&id).await? {
                    return self.answer_duplicate(&start).await;
                }
                let mut channels = Vec::new();
                for addr in start.params.channel_addresses(&self.network, &me)? {
                    if let Some(ch) = self.store.get_state_channel(&addr).await? {
                        channels.push(ch);
                    }
                }
                let record = ExecutionRecord { start, channels_at_start: channels, steps: Vec::new() };
                self.store.begin_execution(&record).await?;
                record
            }
        };

        let mut state_channels = CanonicalMap::new();
        for ch in &record.channels_at_start {
            state_channels.insert(ch.multisig_address, ch.clone());
        }
        let ctx = Context {
            network: self.network.clone(),
            state_channels,
            message: record.start,
            oracle: self.oracle.clone(),
        };

        if let Some(m) = &self.metrics {
            m.runs_started_total.with_label_values(&[protocol.as_str()]).inc();
            m.active_executions.inc();
        }
        info!(execution_id = %id, %protocol, seq = ctx.message.seq, "run started");

        let mut y = ReplayingYield::new(self, self.store.as_ref(), id.clone(), record.steps);
        let result = run_protocol(&ctx, &mut y).await;
        if y.replayed() > 0 {
            debug!(execution_id = %id, replayed = y.replayed(), "run resumed from log");
        }
        let finished = self.store.finish_execution(&id).await;

        if let Some(m) = &self.metrics {
            m.active_executions.dec();
            match &result {
                Ok(()) => m.runs_completed_total.with_label_values(&[protocol.as_str()]).inc(),
                Err(e) => {
                    if matches!(e, ProtocolError::ProtocolTimeout(_)) {
                        m.runs_timed_out_total.inc();
                    }
                    m.runs_failed_total.with_label_values(&[protocol.as_str(), e.kind()]).inc();
                }
            }
        }
        match &result {
            Ok(()) => info!(execution_id = %id, %protocol, "run completed"),
            Err(e) => warn!(execution_id = %id, %protocol, error = %e, "run aborted"),
        }
        result?;
        finished?;
        Ok(())
    }

    /// Flow start of a run already in the log: re-send what that run sent
    /// to the same sender.
    async fn answer_duplicate(&self, start: &ProtocolMessage) -> Result<(), ProtocolError> {
        let replies: Vec<_> = self
            .store
            .outgoing(&start.protocol_execution_id)
            .await?
            .into_iter()
            .filter(|m| m.to_xpub == start.from_xpub)
            .collect();
        debug!(
            execution_id = %start.protocol_execution_id,
            protocol = %start.protocol,
            resent = replies.len(),
            "duplicate flow start"
        );
        for msg in replies {
            self.transport.send(msg).await?;
        }
        Ok(())
    }

    async fn send(&self, msg: ProtocolMessage) -> Result<(), ProtocolError> {
        self.store.record_outgoing(&msg).await?;
        self.transport.send(msg).await?;
        Ok(())
    }

    async fn send_and_wait(&self, msg: ProtocolMessage) -> Result<ProtocolMessage, ProtocolError> {
        let id = msg.protocol_execution_id.clone();
        self.store.record_outgoing(&msg).await?;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        if let Err(e) = self.transport.send(msg).await {
            self.pending.lock().await.remove(&id);
            return Err(e.into());
        }

        match tokio::time::timeout(self.config.io_timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(TransportError::Closed.into()),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(ProtocolError::ProtocolTimeout(id))
            }
        }
    }
}

impl Effects for Inner {
    async fn execute(&self, execution_id: &str, instruction: Instruction) -> Result<Resume, ProtocolError> {
        debug!(execution_id, op = instruction.opcode(), "step");
        match instruction {
            Instruction::Sign { commitment, key_index } => {
                let digest = commitment.hash_to_sign();
                Ok(Resume::Signature(self.signer.sign_digest(&digest, key_index)?))
            }
            Instruction::SignAsIntermediary { commitment, key_index } => {
                let digest = commitment.hash_to_sign_as_intermediary().ok_or_else(|| {
                    ProtocolError::UnexpectedMessage(format!(
                        "{} has no intermediary digest",
                        commitment.kind()
                    ))
                })?;
                Ok(Resume::Signature(self.signer.sign_digest(&digest, key_index)?))
            }
            Instruction::Send(msg) => {
                self.send(msg).await?;
                Ok(Resume::Sent)
            }
            Instruction::SendAndWait(msg) => Ok(Resume::Reply(self.send_and_wait(msg).await?)),
            Instruction::WriteCommitment { protocol, key, commitment } => {
                self.store.save_commitment(protocol, &key, &commitment).await?;
                if let Some(m) = &self.metrics {
                    m.commitments_written_total.inc();
                }
                Ok(Resume::Written)
            }
            Instruction::PersistStateChannel(channels) => {
                self.store.save_state_channels(&channels).await?;
                Ok(Resume::Persisted)
            }
        }
    }
}
