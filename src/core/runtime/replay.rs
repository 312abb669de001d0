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

//! Recording and replaying [`Yield`] handle.
//!
//! Live instructions are executed by an [`Effects`] implementation and their
//! results appended to the execution log. On resume, the recorded results
//! answer the flow's first instructions without touching the outside world
//! again; execution turns live at the first unrecorded step.

use crate::core::{
    protocol::{Instruction, ProtocolError, Resume, Yield},
    store::Store,
};
use std::collections::VecDeque;
use std::future::Future;
use tracing::debug;

/// Executes one instruction against the outside world.
pub trait Effects: Send + Sync {
    /// Run `instruction` for execution `execution_id`.
    fn execute(
        &self,
        execution_id: &str,
        instruction: Instruction,
    ) -> impl Future<Output = Result<Resume, ProtocolError>> + Send;
}

/// Whether `resume` is a result `instruction` can produce.
pub fn answers(instruction: &Instruction, resume: &Resume) -> bool {
    matches!(
        (instruction, resume),
        (Instruction::Sign { .. } | Instruction::SignAsIntermediary { .. }, Resume::Signature(_))
            | (Instruction::Send(_), Resume::Sent)
            | (Instruction::SendAndWait(_), Resume::Reply(_))
            | (Instruction::WriteCommitment { .. }, Resume::Written)
            | (Instruction::PersistStateChannel(_), Resume::Persisted)
    )
}

/// Yield handle of one run.
pub struct ReplayingYield<'a, E: Effects> {
    effects: &'a E,
    store: &'a dyn Store,
    execution_id: String,
    recorded: VecDeque<Resume>,
    replayed: usize,
}

impl<'a, E: Effects> ReplayingYield<'a, E> {
    /// Handle answering from `recorded` first, then live.
    pub fn new(effects: &'a E, store: &'a dyn Store, execution_id: String, recorded: Vec<Resume>) -> Self {
        Self { effects, store, execution_id, recorded: recorded.into(), replayed: 0 }
    }

    /// Steps answered from the log so far.
    pub fn replayed(&self) -> usize {
        self.replayed
    }
}

impl<E: Effects> Yield for ReplayingYield<'_, E> {
    fn step(&mut self, instruction: Instruction) -> impl Future<Output = Result<Resume, ProtocolError>> + Send {
        async move {
            if let Some(recorded) = self.recorded.pop_front() {
                if !answers(&instruction, &recorded) {
                    return Err(ProtocolError::UnexpectedResume(recorded.opcode()));
                }
                self.replayed += 1;
                debug!(execution_id = %self.execution_id, op = instruction.opcode(), "replayed step");
                return Ok(recorded);
            }
            let resume = self.effects.execute(&self.execution_id, instruction).await?;
            self.store.append_step(&self.execution_id, &resume).await?;
            Ok(resume)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        commitments::{Commitment, SetupCommitment},
        protocol::{
            instruction::{persist, sign},
            params::SetupParams,
            Protocol, ProtocolMessage, ProtocolParams,
        },
        security::xkey::ExtendedPrivateKey,
        store::{ExecutionRecord, MemoryStore},
        types::{Address, NetworkContext, Signature, H256},
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        live: AtomicUsize,
    }

    impl Effects for Counting {
        async fn execute(&self, _id: &str, instruction: Instruction) -> Result<Resume, ProtocolError> {
            self.live.fetch_add(1, Ordering::SeqCst);
            Ok(match instruction {
                Instruction::Sign { .. } | Instruction::SignAsIntermediary { .. } => {
                    Resume::Signature(Signature(vec![7; 65]))
                }
                Instruction::Send(_) => Resume::Sent,
                Instruction::SendAndWait(m) => Resume::Reply(m),
                Instruction::WriteCommitment { .. } => Resume::Written,
                Instruction::PersistStateChannel(_) => Resume::Persisted,
            })
        }
    }

    fn setup_commitment() -> Commitment {
        Commitment::Setup(SetupCommitment::new(
            &NetworkContext::default(),
            Address::repeat_byte(1),
            vec![Address::repeat_byte(2)],
            H256::repeat_byte(3),
        ))
    }

    fn start_message(id: &str) -> ProtocolMessage {
        let a = ExtendedPrivateKey::from_seed(&[1u8; 32]).unwrap().neuter();
        let b = ExtendedPrivateKey::from_seed(&[2u8; 32]).unwrap().neuter();
        ProtocolMessage {
            protocol_execution_id: id.into(),
            protocol: Protocol::Setup,
            seq: 0,
            from_xpub: a.clone(),
            to_xpub: b.clone(),
            params: ProtocolParams::Setup(SetupParams {
                initiator_xpub: a,
                responder_xpub: b,
                multisig_address: Address::zero(),
            }),
            signature: None,
            signature2: None,
            signature3: None,
        }
    }

    async fn store_with(id: &str) -> MemoryStore {
        let store = MemoryStore::new();
        let start = start_message(id);
        store
            .begin_execution(&ExecutionRecord { start, channels_at_start: vec![], steps: vec![] })
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn recorded_steps_are_not_executed_again() {
        let store = store_with("e1").await;
        let effects = Counting::default();
        let recorded = vec![Resume::Signature(Signature(vec![1; 65]))];
        let mut y = ReplayingYield::new(&effects, &store, "e1".into(), recorded);

        let s = sign(&mut y, &setup_commitment(), 0).await.unwrap();
        assert_eq!(s.0, vec![1; 65]);
        assert_eq!(effects.live.load(Ordering::SeqCst), 0);

        persist(&mut y, vec![]).await.unwrap();
        assert_eq!(effects.live.load(Ordering::SeqCst), 1);
        assert_eq!(y.replayed(), 1);

        let rec = store.unfinished_executions().await.unwrap();
        assert_eq!(rec[0].steps, vec![Resume::Persisted]);
    }

    #[tokio::test]
    async fn diverging_replay_is_rejected() {
        let store = store_with("e2").await;
        let effects = Counting::default();
        let mut y = ReplayingYield::new(&effects, &store, "e2".into(), vec![Resume::Written]);
        let err = sign(&mut y, &setup_commitment(), 0).await.unwrap_err();
        assert!(matches!(err, ProtocolError::UnexpectedResume("write_commitment")));
    }
}
