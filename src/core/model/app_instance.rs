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

//! App instances.

use super::ChannelError;
use crate::core::{
    abi::{encode_typed, keccak256, parse_param_type, Token},
    commitments::AppIdentity,
    types::{Address, NetworkContext, H256, U256},
};
use serde::{Deserialize, Serialize};

/// App definition contract and its ABI type strings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInterface {
    /// App definition contract.
    pub addr: Address,
    /// Type string of the state.
    pub state_encoding: String,
    /// Type string of actions, for apps that take them.
    pub action_encoding: Option<String>,
}

/// Outcome kind an app resolves to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeType {
    /// `uint256` in {0: first, 1: second, 2: split}.
    TwoPartyFixedOutcome,
    /// `tuple(address to, uint256 amount)[][]`, one list per token.
    MultiAssetMultiPartyCoinTransfer,
    /// `tuple(address to, uint256 amount)[2]` in one token.
    SingleAssetTwoPartyCoinTransfer,
}

/// Outcome interpreter parameters; one variant per [`OutcomeType`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterpreterParams {
    /// Fixed outcome between two players.
    TwoPartyFixedOutcome {
        /// Payees, in outcome order.
        player_addrs: [Address; 2],
        /// Total paid.
        amount: U256,
        /// Token paid in.
        token_address: Address,
    },
    /// Coin transfers across several tokens.
    MultiAssetMultiPartyCoinTransfer {
        /// Per-token cap, parallel to `token_addresses`.
        limit: Vec<U256>,
        /// Tokens covered.
        token_addresses: Vec<Address>,
    },
    /// Coin transfer in one token between two parties.
    SingleAssetTwoPartyCoinTransfer {
        /// Cap on the total transferred.
        limit: U256,
        /// Token transferred.
        token_address: Address,
    },
}

impl InterpreterParams {
    /// Outcome type these parameters interpret.
    pub fn outcome_type(&self) -> OutcomeType {
        match self {
            InterpreterParams::TwoPartyFixedOutcome { .. } => OutcomeType::TwoPartyFixedOutcome,
            InterpreterParams::MultiAssetMultiPartyCoinTransfer { .. } => {
                OutcomeType::MultiAssetMultiPartyCoinTransfer
            }
            InterpreterParams::SingleAssetTwoPartyCoinTransfer { .. } => {
                OutcomeType::SingleAssetTwoPartyCoinTransfer
            }
        }
    }

    /// Interpreter contract for the outcome type.
    pub fn interpreter(&self, network: &NetworkContext) -> Address {
        match self.outcome_type() {
            OutcomeType::TwoPartyFixedOutcome => network.two_party_fixed_outcome_interpreter,
            OutcomeType::MultiAssetMultiPartyCoinTransfer => {
                network.multi_asset_multi_party_coin_transfer_interpreter
            }
            OutcomeType::SingleAssetTwoPartyCoinTransfer => {
                network.single_asset_two_party_coin_transfer_interpreter
            }
        }
    }

    /// ABI encoding passed to the interpreter.
    pub fn encode(&self) -> Vec<u8> {
        let token = match self {
            InterpreterParams::TwoPartyFixedOutcome { player_addrs, amount, token_address } => {
                Token::Tuple(vec![
                    Token::FixedArray(player_addrs.iter().copied().map(Token::Address).collect()),
                    Token::Uint(*amount),
                    Token::Address(*token_address),
                ])
            }
            InterpreterParams::MultiAssetMultiPartyCoinTransfer { limit, token_addresses } => {
                Token::Tuple(vec![
                    Token::Array(limit.iter().copied().map(Token::Uint).collect()),
                    Token::Array(token_addresses.iter().copied().map(Token::Address).collect()),
                ])
            }
            InterpreterParams::SingleAssetTwoPartyCoinTransfer { limit, token_address } => {
                Token::Tuple(vec![Token::Uint(*limit), Token::Address(*token_address)])
            }
        };
        crate::core::abi::encode(&[token])
    }
}

/// One app's state inside a channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInstance {
    /// Immutable identity.
    pub identity: AppIdentity,
    /// Definition contract and encodings.
    pub app_interface: AppInterface,
    /// Sequence number; also the signing-key index.
    pub app_seq_no: u64,
    /// Latest agreed state.
    pub latest_state: Token,
    /// Version of `latest_state`.
    pub latest_version_number: u64,
    /// Challenge timeout of `latest_state`.
    pub latest_timeout: u64,
    /// Outcome interpreter parameters.
    pub interpreter_params: InterpreterParams,
    /// Hosted through an intermediary.
    pub is_virtual_app: bool,
    /// State frozen for teardown.
    pub is_locked: bool,
}

impl AppInstance {
    /// New instance at version 0. Fails if `initial_state` does not fit the state encoding.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        owner: Address,
        signing_keys: Vec<Address>,
        default_timeout: u64,
        app_interface: AppInterface,
        app_seq_no: u64,
        initial_state: Token,
        interpreter_params: InterpreterParams,
        is_virtual_app: bool,
    ) -> Result<Self, ChannelError> {
        let mut signing_keys = signing_keys;
        signing_keys.sort();
        let app = Self {
            identity: AppIdentity {
                owner,
                signing_keys,
                app_definition: app_interface.addr,
                default_timeout: U256::from(default_timeout),
            },
            app_interface,
            app_seq_no,
            latest_state: initial_state,
            latest_version_number: 0,
            latest_timeout: default_timeout,
            interpreter_params,
            is_virtual_app,
            is_locked: false,
        };
        app.encoded_latest_state()?;
        Ok(app)
    }

    /// Primary key.
    pub fn identity_hash(&self) -> H256 {
        self.identity.identity_hash()
    }

    /// Default challenge timeout.
    pub fn default_timeout(&self) -> u64 {
        self.identity.default_timeout.low_u64()
    }

    /// `abi.encode(latest_state)` under the declared encoding.
    pub fn encoded_latest_state(&self) -> Result<Vec<u8>, ChannelError> {
        self.encode_state(&self.latest_state)
    }

    /// Encode any candidate state under the declared encoding.
    pub fn encode_state(&self, state: &Token) -> Result<Vec<u8>, ChannelError> {
        encode_typed(&self.app_interface.state_encoding, state).map_err(ChannelError::StateNotEncodable)
    }

    /// `keccak256(abi.encode(latest_state))`.
    pub fn hash_of_latest_state(&self) -> Result<H256, ChannelError> {
        Ok(keccak256(&self.encoded_latest_state()?))
    }

    /// Copy with `new_state` at the next version.
    pub fn set_state(&self, new_state: Token, timeout: Option<u64>) -> Result<Self, ChannelError> {
        if self.is_locked {
            return Err(ChannelError::AppLocked(self.identity_hash()));
        }
        self.encode_state(&new_state)?;
        let latest_version_number = self
            .latest_version_number
            .checked_add(1)
            .ok_or(ChannelError::VersionOverflow)?;
        Ok(Self {
            latest_state: new_state,
            latest_version_number,
            latest_timeout: timeout.unwrap_or(self.latest_timeout),
            ..self.clone()
        })
    }

    /// Copy frozen at `version_number`, which must not precede the current version.
    pub fn lock_state(&self, version_number: u64) -> Result<Self, ChannelError> {
        if version_number < self.latest_version_number {
            return Err(ChannelError::StaleVersion {
                current: self.latest_version_number,
                requested: version_number,
            });
        }
        Ok(Self { latest_version_number: version_number, is_locked: true, ..self.clone() })
    }

    /// Parsed action type, when the app takes actions.
    pub fn action_type(&self) -> Option<Result<crate::core::abi::ParamType, ChannelError>> {
        self.app_interface
            .action_encoding
            .as_deref()
            .map(|e| parse_param_type(e).map_err(ChannelError::StateNotEncodable))
    }
}
