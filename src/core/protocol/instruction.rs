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

//! Instructions a flow yields to the driver, and what it gets back.
//!
//! A flow never touches a signer, transport or store directly. It hands an
//! [`Instruction`] to its [`Yield`] handle and continues with the [`Resume`].
//! Because every effect passes through this seam, a driver can record the
//! results and replay them after a restart.

use super::{message::ProtocolMessage, Protocol, ProtocolError};
use crate::core::{
    commitments::{Commitment, SignedCommitment},
    model::StateChannel,
    types::{Address, Signature, H256},
};
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Storage key of a finished commitment (together with its protocol).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CommitmentKey {
    /// Channel-level (Setup).
    Multisig(Address),
    /// App-level.
    App(H256),
    /// A leg's lock-up agreement for a virtual app.
    Agreement {
        /// Leg multisig.
        multisig: Address,
        /// Target virtual app.
        target: H256,
    },
}

/// One effect requested by a flow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    /// Sign `hash_to_sign()` with child key `key_index`.
    Sign {
        /// Commitment.
        commitment: Commitment,
        /// Child key index.
        key_index: u64,
    },
    /// Sign `hash_to_sign_as_intermediary()` with child key `key_index`.
    SignAsIntermediary {
        /// Commitment.
        commitment: Commitment,
        /// Child key index.
        key_index: u64,
    },
    /// One-way send.
    Send(ProtocolMessage),
    /// Send, then wait for the correlated reply.
    SendAndWait(ProtocolMessage),
    /// Persist a fully signed commitment.
    WriteCommitment {
        /// Producing protocol.
        protocol: Protocol,
        /// Key within the protocol.
        key: CommitmentKey,
        /// The commitment.
        commitment: SignedCommitment,
    },
    /// Persist post-run channel snapshots atomically.
    PersistStateChannel(Vec<StateChannel>),
}

impl Instruction {
    /// Short name for logs and replay checks.
    pub fn opcode(&self) -> &'static str {
        match self {
            Instruction::Sign { .. } => "sign",
            Instruction::SignAsIntermediary { .. } => "sign_as_intermediary",
            Instruction::Send(_) => "send",
            Instruction::SendAndWait(_) => "send_and_wait",
            Instruction::WriteCommitment { .. } => "write_commitment",
            Instruction::PersistStateChannel(_) => "persist_state_channel",
        }
    }
}

/// Result of an instruction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resume {
    /// Signature from `Sign`/`SignAsIntermediary`.
    Signature(Signature),
    /// `Send` accepted by the transport.
    Sent,
    /// Reply to `SendAndWait`.
    Reply(ProtocolMessage),
    /// `WriteCommitment` durable.
    Written,
    /// `PersistStateChannel` durable.
    Persisted,
}

impl Resume {
    /// Opcode this result answers.
    pub fn opcode(&self) -> &'static str {
        match self {
            Resume::Signature(_) => "sign",
            Resume::Sent => "send",
            Resume::Reply(_) => "send_and_wait",
            Resume::Written => "write_commitment",
            Resume::Persisted => "persist_state_channel",
        }
    }
}

/// Driver handle a flow suspends on.
pub trait Yield: Send {
    /// Execute `instruction` and resume with its result.
    fn step(&mut self, instruction: Instruction) -> impl Future<Output = Result<Resume, ProtocolError>> + Send;
}

/// `Sign`.
pub async fn sign<Y: Yield>(y: &mut Y, commitment: &Commitment, key_index: u64) -> Result<Signature, ProtocolError> {
    match y.step(Instruction::Sign { commitment: commitment.clone(), key_index }).await? {
        Resume::Signature(s) => Ok(s),
        other => Err(ProtocolError::UnexpectedResume(other.opcode())),
    }
}

/// `SignAsIntermediary`.
pub async fn sign_as_intermediary<Y: Yield>(
    y: &mut Y,
    commitment: &Commitment,
    key_index: u64,
) -> Result<Signature, ProtocolError> {
    match y
        .step(Instruction::SignAsIntermediary { commitment: commitment.clone(), key_index })
        .await?
    {
        Resume::Signature(s) => Ok(s),
        other => Err(ProtocolError::UnexpectedResume(other.opcode())),
    }
}

/// `Send`.
pub async fn send<Y: Yield>(y: &mut Y, msg: ProtocolMessage) -> Result<(), ProtocolError> {
    match y.step(Instruction::Send(msg)).await? {
        Resume::Sent => Ok(()),
        other => Err(ProtocolError::UnexpectedResume(other.opcode())),
    }
}

/// `SendAndWait`.
pub async fn send_and_wait<Y: Yield>(y: &mut Y, msg: ProtocolMessage) -> Result<ProtocolMessage, ProtocolError> {
    match y.step(Instruction::SendAndWait(msg)).await? {
        Resume::Reply(m) => Ok(m),
        other => Err(ProtocolError::UnexpectedResume(other.opcode())),
    }
}

/// `WriteCommitment`.
pub async fn write_commitment<Y: Yield>(
    y: &mut Y,
    protocol: Protocol,
    key: CommitmentKey,
    commitment: SignedCommitment,
) -> Result<(), ProtocolError> {
    match y.step(Instruction::WriteCommitment { protocol, key, commitment }).await? {
        Resume::Written => Ok(()),
        other => Err(ProtocolError::UnexpectedResume(other.opcode())),
    }
}

/// `PersistStateChannel`.
pub async fn persist<Y: Yield>(y: &mut Y, channels: Vec<StateChannel>) -> Result<(), ProtocolError> {
    match y.step(Instruction::PersistStateChannel(channels)).await? {
        Resume::Persisted => Ok(()),
        other => Err(ProtocolError::UnexpectedResume(other.opcode())),
    }
}
