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

//! Execution context of one run.

use super::{
    message::ProtocolMessage, oracle::AppOracle, params::channel_address, ProtocolError,
};
use crate::core::{
    abi::{decode_single, parse_param_type, Token},
    commitments::SetStateCommitment,
    model::{AppInstance, ChannelError, StateChannel},
    security::{
        signatures::{assert_is_valid_signature, SignatureError},
        xkey::{xkey_kth_address, ExtendedPublicKey},
    },
    types::{Address, CanonicalMap, NetworkContext, Signature, H256, U256},
};
use std::sync::Arc;

/// What a flow sees: the network, the channel snapshots at run start, the
/// message that started the run here, and the app oracle.
#[derive(Clone)]
pub struct Context {
    /// Address table.
    pub network: NetworkContext,
    /// Implicated channels by multisig address.
    pub state_channels: CanonicalMap<Address, StateChannel>,
    /// Starting message (for the initiator: its own proposal).
    pub message: ProtocolMessage,
    /// App-definition oracle.
    pub oracle: Arc<dyn AppOracle>,
}

impl Context {
    /// Channel snapshot by multisig address.
    pub fn channel(&self, multisig: &Address) -> Result<&StateChannel, ProtocolError> {
        self.state_channels
            .get(multisig)
            .ok_or(ProtocolError::NoSuchChannel(*multisig))
    }

    /// Channel between two participants, if known.
    pub fn channel_between(
        &self,
        a: &ExtendedPublicKey,
        b: &ExtendedPublicKey,
    ) -> Result<Option<&StateChannel>, ProtocolError> {
        let addr = channel_address(&self.network, a, b)?;
        Ok(self.state_channels.get(&addr))
    }

    /// Funded channel between two participants.
    pub fn require_channel_between(
        &self,
        a: &ExtendedPublicKey,
        b: &ExtendedPublicKey,
    ) -> Result<&StateChannel, ProtocolError> {
        let addr = channel_address(&self.network, a, b)?;
        self.channel(&addr)
    }

    /// Local participant.
    pub fn me(&self) -> &ExtendedPublicKey {
        if self.message.seq == 0 {
            &self.message.from_xpub
        } else {
            &self.message.to_xpub
        }
    }
}

/// Address of `xpub` at key index `k`.
pub fn kth_address(xpub: &ExtendedPublicKey, k: u64) -> Result<Address, ProtocolError> {
    Ok(xkey_kth_address(xpub, k)?)
}

/// Validate a counterparty signature and take ownership of it.
pub fn validated(expected: Address, digest: &H256, sig: Option<&Signature>) -> Result<Signature, ProtocolError> {
    assert_is_valid_signature(expected, digest, sig)?;
    sig.cloned().ok_or(ProtocolError::Signature(SignatureError::Missing))
}

/// SetState commitment for `app` at its latest version.
pub fn set_state_commitment(network: &NetworkContext, app: &AppInstance) -> Result<SetStateCommitment, ProtocolError> {
    Ok(SetStateCommitment::new(
        network,
        app.identity.clone(),
        app.hash_of_latest_state()?,
        U256::from(app.latest_version_number),
        U256::from(app.latest_timeout),
    ))
}

/// SetState commitment for the free balance of `channel`.
pub fn free_balance_commitment(
    network: &NetworkContext,
    channel: &StateChannel,
) -> Result<SetStateCommitment, ProtocolError> {
    set_state_commitment(network, channel.free_balance()?)
}

/// Next state of `app` under `action`, as computed by the oracle.
pub async fn compute_next_state(
    oracle: &dyn AppOracle,
    app: &AppInstance,
    action: &Token,
) -> Result<Token, ProtocolError> {
    let action_type = app
        .action_type()
        .ok_or_else(|| ProtocolError::InvalidAction("app takes no actions".into()))?
        .map_err(|e| ProtocolError::InvalidAction(e.to_string()))?;
    if !action.type_check(&action_type) {
        return Err(ProtocolError::InvalidAction("action does not match encoding".into()));
    }
    let encoded_state = app.encoded_latest_state()?;
    let encoded_action = crate::core::abi::encode(std::slice::from_ref(action));
    let next = oracle
        .compute_state_transition(&app.app_interface, &encoded_state, &encoded_action)
        .await
        .map_err(|e| ProtocolError::InvalidAction(e.to_string()))?;
    let state_type = parse_param_type(&app.app_interface.state_encoding)
        .map_err(|e| ProtocolError::InvalidAction(e.to_string()))?;
    decode_single(&state_type, &next).map_err(|e| ProtocolError::InvalidAction(e.to_string()))
}

/// Outcome of `app` at `state`, as computed by the oracle.
pub async fn compute_outcome(
    oracle: &dyn AppOracle,
    app: &AppInstance,
    state: &Token,
) -> Result<Vec<u8>, ProtocolError> {
    let encoded = app.encode_state(state)?;
    oracle
        .compute_outcome(&app.app_interface, &encoded)
        .await
        .map_err(|e| ProtocolError::InvalidOutcome(e.to_string()))
}

/// Outcome interpretation failures surface as `InvalidOutcome`.
pub fn outcome_error(e: ChannelError) -> ProtocolError {
    match e {
        ChannelError::InvalidOutcome(msg) => ProtocolError::InvalidOutcome(msg),
        other => other.into(),
    }
}
