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

//! Protocol flows.
//!
//! One async function per protocol and role. A flow computes against its
//! [`Context`], suspends only on [`instruction::Yield::step`], and changes
//! nothing durable except through `WriteCommitment` and
//! `PersistStateChannel`, both issued after every counterparty signature
//! the step depends on has been validated.

pub mod context;
pub mod install;
pub mod install_virtual_app;
pub mod instruction;
pub mod message;
pub mod oracle;
pub mod params;
pub mod setup;
pub mod take_action;
pub mod uninstall;
pub mod uninstall_virtual_app;
pub mod update;

use crate::core::{
    model::ChannelError,
    runtime::TransportError,
    security::{keystore::KeystoreError, signatures::SignatureError, xkey::KeyError},
    store::StoreError,
    types::{Address, CodecError},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use context::Context;
pub use instruction::{CommitmentKey, Instruction, Resume, Yield};
pub use message::{ProtocolMessage, UNASSIGNED_SEQ_NO};
pub use params::ProtocolParams;

/// Every protocol the engine runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Protocol {
    /// Create the free balance of a new channel.
    Setup,
    /// Install a two-party app.
    Install,
    /// Propose a new app state.
    Update,
    /// Apply an action through the app definition.
    TakeAction,
    /// Remove an app, crediting its outcome.
    Uninstall,
    /// Install an app funded through an intermediary.
    InstallVirtualApp,
    /// Tear down a virtual app.
    UninstallVirtualApp,
}

impl Protocol {
    /// Every protocol, in declaration order.
    pub const ALL: [Protocol; 7] = [
        Protocol::Setup,
        Protocol::Install,
        Protocol::Update,
        Protocol::TakeAction,
        Protocol::Uninstall,
        Protocol::InstallVirtualApp,
        Protocol::UninstallVirtualApp,
    ];

    /// Number of roles.
    pub fn role_count(&self) -> usize {
        match self {
            Protocol::Setup
            | Protocol::Install
            | Protocol::Update
            | Protocol::TakeAction
            | Protocol::Uninstall => 2,
            Protocol::InstallVirtualApp | Protocol::UninstallVirtualApp => 3,
        }
    }

    /// Stable label for logs, metrics and storage keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Setup => "setup",
            Protocol::Install => "install",
            Protocol::Update => "update",
            Protocol::TakeAction => "take_action",
            Protocol::Uninstall => "uninstall",
            Protocol::InstallVirtualApp => "install_virtual_app",
            Protocol::UninstallVirtualApp => "uninstall_virtual_app",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol errors. Each aborts the run it occurs in and nothing else.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Model rejected a transition.
    #[error("channel: {0}")]
    Channel(#[from] ChannelError),
    /// Counterparty signature failed validation.
    #[error("signature: {0}")]
    Signature(#[from] SignatureError),
    /// Key derivation failed.
    #[error("key: {0}")]
    Key(#[from] KeyError),
    /// Local signer failed.
    #[error("signer: {0}")]
    Signer(#[from] KeystoreError),
    /// Persistence failed.
    #[error("store: {0}")]
    Store(#[from] StoreError),
    /// Transport failed.
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
    /// Encoding failed.
    #[error("codec: {0}")]
    Codec(#[from] CodecError),
    /// No reply within the wait budget.
    #[error("protocol timeout: execution {0}")]
    ProtocolTimeout(String),
    /// Oracle rejected the action.
    #[error("invalid action: {0}")]
    InvalidAction(String),
    /// Oracle could not produce a usable outcome.
    #[error("invalid outcome: {0}")]
    InvalidOutcome(String),
    /// Recomputed outcome differs from the proposed one.
    #[error("outcome mismatch")]
    OutcomeMismatch,
    /// Final state claims an agreed version but differs from the stored state.
    #[error("final state at version {0} differs from the agreed one")]
    StaleState(u64),
    /// Setup against an existing channel.
    #[error("channel already exists: {0:?}")]
    ChannelAlreadyExists(Address),
    /// Channel not known locally.
    #[error("no such channel: {0:?}")]
    NoSuchChannel(Address),
    /// Proposed multisig differs from the derived one.
    #[error("multisig mismatch: expected {expected:?}, got {got:?}")]
    MultisigMismatch {
        /// Derived.
        expected: Address,
        /// Proposed.
        got: Address,
    },
    /// Message does not fit the run being executed.
    #[error("unexpected message: {0}")]
    UnexpectedMessage(String),
    /// Driver answered with the wrong result kind.
    #[error("unexpected resume: {0}")]
    UnexpectedResume(&'static str),
    /// Random number generator failed.
    #[error("rng")]
    Rng,
}

impl ProtocolError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolError::Channel(_) => "channel",
            ProtocolError::Signature(_) => "signature",
            ProtocolError::Key(_) => "key",
            ProtocolError::Signer(_) => "signer",
            ProtocolError::Store(_) => "store",
            ProtocolError::Transport(_) => "transport",
            ProtocolError::Codec(_) => "codec",
            ProtocolError::ProtocolTimeout(_) => "timeout",
            ProtocolError::InvalidAction(_) => "invalid_action",
            ProtocolError::InvalidOutcome(_) => "invalid_outcome",
            ProtocolError::OutcomeMismatch => "outcome_mismatch",
            ProtocolError::StaleState(_) => "stale_state",
            ProtocolError::ChannelAlreadyExists(_) => "channel_exists",
            ProtocolError::NoSuchChannel(_) => "no_channel",
            ProtocolError::MultisigMismatch { .. } => "multisig_mismatch",
            ProtocolError::UnexpectedMessage(_) => "unexpected_message",
            ProtocolError::UnexpectedResume(_) => "unexpected_resume",
            ProtocolError::Rng => "rng",
        }
    }
}

/// Run the role of `ctx.message` to completion.
///
/// The starting message names the role: `seq` 0 is the initiator, and a
/// delivered flow-starting message carries the receiving role's index.
pub async fn run_protocol<Y: Yield>(ctx: &Context, y: &mut Y) -> Result<(), ProtocolError> {
    let msg = &ctx.message;
    if msg.params.protocol() != msg.protocol {
        return Err(ProtocolError::UnexpectedMessage("params of another protocol".into()));
    }
    let role = usize::try_from(msg.seq)
        .ok()
        .filter(|r| *r < msg.protocol.role_count())
        .ok_or_else(|| ProtocolError::UnexpectedMessage(format!("no role for seq {}", msg.seq)))?;
    let expected = msg.params.roles()[role];
    if ctx.me() != expected {
        return Err(ProtocolError::UnexpectedMessage("addressed to the wrong role".into()));
    }
    match (msg.protocol, role) {
        (Protocol::Setup, 0) => setup::initiate(ctx, y).await,
        (Protocol::Setup, _) => setup::respond(ctx, y).await,
        (Protocol::Install, 0) => install::initiate(ctx, y).await,
        (Protocol::Install, _) => install::respond(ctx, y).await,
        (Protocol::Update, 0) => update::initiate(ctx, y).await,
        (Protocol::Update, _) => update::respond(ctx, y).await,
        (Protocol::TakeAction, 0) => take_action::initiate(ctx, y).await,
        (Protocol::TakeAction, _) => take_action::respond(ctx, y).await,
        (Protocol::Uninstall, 0) => uninstall::initiate(ctx, y).await,
        (Protocol::Uninstall, _) => uninstall::respond(ctx, y).await,
        (Protocol::InstallVirtualApp, 0) => install_virtual_app::initiate(ctx, y).await,
        (Protocol::InstallVirtualApp, 1) => install_virtual_app::intermediate(ctx, y).await,
        (Protocol::InstallVirtualApp, _) => install_virtual_app::respond(ctx, y).await,
        (Protocol::UninstallVirtualApp, 0) => uninstall_virtual_app::initiate(ctx, y).await,
        (Protocol::UninstallVirtualApp, 1) => uninstall_virtual_app::intermediate(ctx, y).await,
        (Protocol::UninstallVirtualApp, _) => uninstall_virtual_app::respond(ctx, y).await,
    }
}
