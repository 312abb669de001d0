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

mod common;

use async_trait::async_trait;
use common::*;
use statechannels::core::{
    commitments::SignedCommitment,
    model::StateChannel,
    protocol::{
        params::SetupParams, CommitmentKey, Protocol, ProtocolError, ProtocolMessage, ProtocolParams,
        Resume,
    },
    runtime::MemoryHub,
    store::{ExecutionRecord, MemoryStore, SledStore, Store, StoreError},
    types::Address,
};
use std::sync::Arc;
use std::time::Duration;

fn sled_at(dir: &tempfile::TempDir, name: &str) -> Arc<dyn Store> {
    let path = dir.path().join(name);
    Arc::new(SledStore::open(path.to_str().unwrap()).unwrap())
}

fn setup_start(from: &Node, to: &Node, id: &str) -> ProtocolMessage {
    ProtocolMessage {
        protocol_execution_id: id.to_string(),
        protocol: Protocol::Setup,
        seq: 0,
        from_xpub: from.xpub.clone(),
        to_xpub: to.xpub.clone(),
        params: ProtocolParams::Setup(SetupParams {
            initiator_xpub: from.xpub.clone(),
            responder_xpub: to.xpub.clone(),
            multisig_address: multisig_of(from, to),
        }),
        signature: None,
        signature2: None,
        signature3: None,
    }
}

#[tokio::test]
async fn channels_and_commitments_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let (multisig, channel, commitment) = {
        let hub = MemoryHub::new();
        let a = node_with(&hub, 1, sled_at(&dir, "a"), Duration::from_secs(5));
        let b = node_with(&hub, 2, sled_at(&dir, "b"), Duration::from_secs(5));
        let multisig = setup(&hub, &a, &b).await;
        deposit(&[&a, &b], &multisig, &[(a.address(), 4), (b.address(), 6)]).await;
        let channel = a.channel(&multisig).await;
        let commitment = a
            .store
            .get_commitment(Protocol::Setup, &CommitmentKey::Multisig(multisig))
            .await
            .unwrap()
            .expect("setup commitment");
        (multisig, channel, commitment)
    };

    let reopened = sled_at(&dir, "a");
    assert_eq!(reopened.get_state_channel(&multisig).await.unwrap(), Some(channel.clone()));
    assert_eq!(reopened.get_all_state_channels().await.unwrap(), vec![channel]);
    let again = reopened
        .get_commitment(Protocol::Setup, &CommitmentKey::Multisig(multisig))
        .await
        .unwrap();
    assert_eq!(again, Some(commitment));
    assert!(reopened
        .get_commitment(Protocol::Install, &CommitmentKey::Multisig(multisig))
        .await
        .unwrap()
        .is_none());
    assert!(reopened.unfinished_executions().await.unwrap().is_empty());
}

#[tokio::test]
async fn execution_log_tracks_progress() {
    let dir = tempfile::tempdir().unwrap();
    let hub = MemoryHub::new();
    let a = node(&hub, 1);
    let b = node(&hub, 2);
    let store = sled_at(&dir, "log");

    let record = ExecutionRecord {
        start: setup_start(&a, &b, "run-1"),
        channels_at_start: vec![],
        steps: vec![],
    };
    assert!(!store.has_execution("run-1").await.unwrap());
    store.begin_execution(&record).await.unwrap();
    store.append_step("run-1", &Resume::Sent).await.unwrap();
    store.append_step("run-1", &Resume::Written).await.unwrap();

    let unfinished = store.unfinished_executions().await.unwrap();
    assert_eq!(unfinished.len(), 1);
    assert_eq!(unfinished[0].execution_id(), "run-1");
    assert_eq!(unfinished[0].steps, vec![Resume::Sent, Resume::Written]);

    store.finish_execution("run-1").await.unwrap();
    assert!(store.has_execution("run-1").await.unwrap());
    assert!(store.unfinished_executions().await.unwrap().is_empty());
    assert!(store.append_step("missing", &Resume::Sent).await.is_err());
}

#[tokio::test]
async fn interrupted_run_is_resumed_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let hub = MemoryHub::new();
    let b = node(&hub, 2);

    // A node that logged a run start, then went down before doing anything.
    {
        let store = sled_at(&dir, "a");
        let proto = node(&MemoryHub::new(), 1);
        let record = ExecutionRecord {
            start: setup_start(&proto, &b, "crashed"),
            channels_at_start: vec![],
            steps: vec![],
        };
        store.begin_execution(&record).await.unwrap();
    }

    let a = node_with(&hub, 1, sled_at(&dir, "a"), Duration::from_secs(5));
    assert_eq!(a.runner.resume_unfinished().await.unwrap(), 1);
    hub.settle().await;

    let multisig = multisig_of(&a, &b);
    assert_eq!(a.channel(&multisig).await, b.channel(&multisig).await);
    assert!(a.store.has_execution("crashed").await.unwrap());
    assert!(a.store.unfinished_executions().await.unwrap().is_empty());
    assert_eq!(a.runner.resume_unfinished().await.unwrap(), 0);
}

/// Store whose runs are never closed, as on a node that died mid-run.
struct NeverFinishes(Arc<dyn Store>);

#[async_trait]
impl Store for NeverFinishes {
    async fn get_state_channel(&self, multisig: &Address) -> Result<Option<StateChannel>, StoreError> {
        self.0.get_state_channel(multisig).await
    }

    async fn get_all_state_channels(&self) -> Result<Vec<StateChannel>, StoreError> {
        self.0.get_all_state_channels().await
    }

    async fn save_state_channels(&self, channels: &[StateChannel]) -> Result<(), StoreError> {
        self.0.save_state_channels(channels).await
    }

    async fn save_commitment(
        &self,
        protocol: Protocol,
        key: &CommitmentKey,
        commitment: &SignedCommitment,
    ) -> Result<(), StoreError> {
        self.0.save_commitment(protocol, key, commitment).await
    }

    async fn get_commitment(
        &self,
        protocol: Protocol,
        key: &CommitmentKey,
    ) -> Result<Option<SignedCommitment>, StoreError> {
        self.0.get_commitment(protocol, key).await
    }

    async fn begin_execution(&self, record: &ExecutionRecord) -> Result<(), StoreError> {
        self.0.begin_execution(record).await
    }

    async fn append_step(&self, execution_id: &str, step: &Resume) -> Result<(), StoreError> {
        self.0.append_step(execution_id, step).await
    }

    async fn finish_execution(&self, _execution_id: &str) -> Result<(), StoreError> {
        Ok(())
    }

    async fn has_execution(&self, execution_id: &str) -> Result<bool, StoreError> {
        self.0.has_execution(execution_id).await
    }

    async fn unfinished_executions(&self) -> Result<Vec<ExecutionRecord>, StoreError> {
        self.0.unfinished_executions().await
    }

    async fn record_outgoing(&self, msg: &ProtocolMessage) -> Result<(), StoreError> {
        self.0.record_outgoing(msg).await
    }

    async fn outgoing(&self, execution_id: &str) -> Result<Vec<ProtocolMessage>, StoreError> {
        self.0.outgoing(execution_id).await
    }
}

#[tokio::test]
async fn resumed_initiator_gets_the_reply_it_missed() {
    let hub = MemoryHub::new();
    let b = node(&hub, 2);
    let disk: Arc<dyn Store> = Arc::new(MemoryStore::new());

    // First life: the proposal goes out, the reply is lost, the node dies
    // with its signature logged and the run still open.
    let first = node_with(&hub, 1, Arc::new(NeverFinishes(disk.clone())), Duration::from_millis(200));
    let multisig = multisig_of(&first, &b);
    hub.disconnect(&first.xpub);
    let err = first
        .runner
        .initiate(ProtocolParams::Setup(SetupParams {
            initiator_xpub: first.xpub.clone(),
            responder_xpub: b.xpub.clone(),
            multisig_address: multisig,
        }))
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::ProtocolTimeout(_)));
    hub.settle().await;
    assert!(b.store.get_state_channel(&multisig).await.unwrap().is_some());

    let open = disk.unfinished_executions().await.unwrap();
    assert_eq!(open.len(), 1);
    assert!(matches!(open[0].steps.as_slice(), [Resume::Signature(_)]));
    let id = open[0].execution_id().to_string();
    assert!(disk.get_state_channel(&multisig).await.unwrap().is_none());

    // Second life over the same log. Re-sending the proposal makes the
    // responder answer again from its finished run.
    hub.reconnect(&first.xpub);
    let a = node_with(&hub, 1, disk.clone(), Duration::from_secs(5));
    assert_eq!(a.runner.resume_unfinished().await.unwrap(), 1);
    hub.settle().await;

    assert_eq!(a.channel(&multisig).await, b.channel(&multisig).await);
    assert!(disk.unfinished_executions().await.unwrap().is_empty());
    let signed = disk
        .get_commitment(Protocol::Setup, &CommitmentKey::Multisig(multisig))
        .await
        .unwrap()
        .expect("setup commitment");
    assert_eq!(signed.signatures.len(), 2);
    let replies = b.store.outgoing(&id).await.unwrap();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].to_xpub, a.xpub);
}
