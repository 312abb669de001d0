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

//! Typed protocol parameters carried by every message of a run.

use super::Protocol;
use crate::core::{
    abi::Token,
    model::{derive_multisig_address, AppInterface, InterpreterParams},
    security::xkey::{xkeys_to_sorted_kth_addresses, ExtendedPublicKey, KeyError},
    types::{Address, NetworkContext, H256, U256},
};
use serde::{Deserialize, Serialize};

/// Setup parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupParams {
    /// Proposer.
    pub initiator_xpub: ExtendedPublicKey,
    /// Counterparty.
    pub responder_xpub: ExtendedPublicKey,
    /// Expected multisig; checked against the derived address.
    pub multisig_address: Address,
}

/// Install parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallParams {
    /// Proposer.
    pub initiator_xpub: ExtendedPublicKey,
    /// Counterparty.
    pub responder_xpub: ExtendedPublicKey,
    /// Channel.
    pub multisig_address: Address,
    /// App definition and encodings.
    pub app_interface: AppInterface,
    /// State at version 0.
    pub initial_state: Token,
    /// Default challenge timeout.
    pub default_timeout: u64,
    /// Initiator's deposit into the app.
    pub initiator_balance_decrement: U256,
    /// Responder's deposit into the app.
    pub responder_balance_decrement: U256,
    /// Token of the initiator's deposit.
    pub initiator_deposit_token_address: Address,
    /// Token of the responder's deposit.
    pub responder_deposit_token_address: Address,
    /// Outcome interpreter parameters.
    pub interpreter_params: InterpreterParams,
}

/// Update parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateParams {
    /// Proposer.
    pub initiator_xpub: ExtendedPublicKey,
    /// Counterparty.
    pub responder_xpub: ExtendedPublicKey,
    /// Channel.
    pub multisig_address: Address,
    /// App.
    pub app_identity_hash: H256,
    /// Proposed state.
    pub new_state: Token,
    /// Timeout override for the new state.
    pub timeout: Option<u64>,
}

/// TakeAction parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TakeActionParams {
    /// Proposer.
    pub initiator_xpub: ExtendedPublicKey,
    /// Counterparty.
    pub responder_xpub: ExtendedPublicKey,
    /// Channel.
    pub multisig_address: Address,
    /// App.
    pub app_identity_hash: H256,
    /// Action under the app's action encoding.
    pub action: Token,
}

/// Uninstall parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UninstallParams {
    /// Proposer.
    pub initiator_xpub: ExtendedPublicKey,
    /// Counterparty.
    pub responder_xpub: ExtendedPublicKey,
    /// Channel.
    pub multisig_address: Address,
    /// App.
    pub app_identity_hash: H256,
}

/// InstallVirtualApp parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallVirtualAppParams {
    /// End user proposing.
    pub initiator_xpub: ExtendedPublicKey,
    /// Hub channeled with both end users.
    pub intermediary_xpub: ExtendedPublicKey,
    /// Other end user.
    pub responder_xpub: ExtendedPublicKey,
    /// App definition and encodings.
    pub app_interface: AppInterface,
    /// State at version 0.
    pub initial_state: Token,
    /// Default challenge timeout.
    pub default_timeout: u64,
    /// Initiator's stake (ETH).
    pub initiator_balance_decrement: U256,
    /// Responder's stake (ETH).
    pub responder_balance_decrement: U256,
    /// Sequence number on the end users' virtual channel.
    pub app_seq_no: u64,
    /// Block after which the lock-up agreements lapse.
    pub expiry_block: u64,
}

/// UninstallVirtualApp parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UninstallVirtualAppParams {
    /// End user proposing.
    pub initiator_xpub: ExtendedPublicKey,
    /// Hub.
    pub intermediary_xpub: ExtendedPublicKey,
    /// Other end user.
    pub responder_xpub: ExtendedPublicKey,
    /// Target virtual app.
    pub target_app_identity_hash: H256,
    /// Target's definition and encodings.
    pub app_interface: AppInterface,
    /// Target's sequence number on the virtual channel.
    pub app_seq_no: u64,
    /// Target's default timeout.
    pub default_timeout: u64,
    /// State being locked.
    pub final_state: Token,
    /// Version being locked.
    pub final_version_number: u64,
    /// Outcome the initiator computed for `final_state`.
    pub outcome: Vec<u8>,
}

/// Parameters of any protocol.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolParams {
    /// Setup.
    Setup(SetupParams),
    /// Install.
    Install(InstallParams),
    /// Update.
    Update(UpdateParams),
    /// TakeAction.
    TakeAction(TakeActionParams),
    /// Uninstall.
    Uninstall(UninstallParams),
    /// InstallVirtualApp.
    InstallVirtualApp(InstallVirtualAppParams),
    /// UninstallVirtualApp.
    UninstallVirtualApp(UninstallVirtualAppParams),
}

/// Channel between two participants.
pub fn channel_address(network: &NetworkContext, a: &ExtendedPublicKey, b: &ExtendedPublicKey) -> Result<Address, KeyError> {
    let owners = xkeys_to_sorted_kth_addresses(&[a.clone(), b.clone()], 0)?;
    Ok(derive_multisig_address(network, &owners))
}

impl ProtocolParams {
    /// Protocol these parameters belong to.
    pub fn protocol(&self) -> Protocol {
        match self {
            ProtocolParams::Setup(_) => Protocol::Setup,
            ProtocolParams::Install(_) => Protocol::Install,
            ProtocolParams::Update(_) => Protocol::Update,
            ProtocolParams::TakeAction(_) => Protocol::TakeAction,
            ProtocolParams::Uninstall(_) => Protocol::Uninstall,
            ProtocolParams::InstallVirtualApp(_) => Protocol::InstallVirtualApp,
            ProtocolParams::UninstallVirtualApp(_) => Protocol::UninstallVirtualApp,
        }
    }

    /// Participants in role order (initiator first).
    pub fn roles(&self) -> Vec<&ExtendedPublicKey> {
        match self {
            ProtocolParams::Setup(p) => vec![&p.initiator_xpub, &p.responder_xpub],
            ProtocolParams::Install(p) => vec![&p.initiator_xpub, &p.responder_xpub],
            ProtocolParams::Update(p) => vec![&p.initiator_xpub, &p.responder_xpub],
            ProtocolParams::TakeAction(p) => vec![&p.initiator_xpub, &p.responder_xpub],
            ProtocolParams::Uninstall(p) => vec![&p.initiator_xpub, &p.responder_xpub],
            ProtocolParams::InstallVirtualApp(p) => {
                vec![&p.initiator_xpub, &p.intermediary_xpub, &p.responder_xpub]
            }
            ProtocolParams::UninstallVirtualApp(p) => {
                vec![&p.initiator_xpub, &p.intermediary_xpub, &p.responder_xpub]
            }
        }
    }

    /// Channels the run reads or writes that `me` is a party to, ascending.
    pub fn channel_addresses(
        &self,
        network: &NetworkContext,
        me: &ExtendedPublicKey,
    ) -> Result<Vec<Address>, KeyError> {
        let mut out = match self {
            ProtocolParams::Setup(p) => vec![p.multisig_address],
            ProtocolParams::Install(p) => vec![p.multisig_address],
            ProtocolParams::Update(p) => vec![p.multisig_address],
            ProtocolParams::TakeAction(p) => vec![p.multisig_address],
            ProtocolParams::Uninstall(p) => vec![p.multisig_address],
            ProtocolParams::InstallVirtualApp(_) | ProtocolParams::UninstallVirtualApp(_) => {
                let roles = self.roles();
                let (i, h, r) = (roles[0], roles[1], roles[2]);
                let mut v = Vec::new();
                for (a, b) in [(i, h), (h, r), (i, r)] {
                    if a == me || b == me {
                        v.push(channel_address(network, a, b)?);
                    }
                }
                v
            }
        };
        out.sort();
        out.dedup();
        Ok(out)
    }

    /// App the run touches, for app-level sharding.
    pub fn app_identity_hash(&self) -> Option<H256> {
        match self {
            ProtocolParams::Update(p) => Some(p.app_identity_hash),
            ProtocolParams::TakeAction(p) => Some(p.app_identity_hash),
            ProtocolParams::Uninstall(p) => Some(p.app_identity_hash),
            ProtocolParams::UninstallVirtualApp(p) => Some(p.target_app_identity_hash),
            _ => None,
        }
    }
}
