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

//! Channel and app-instance model.
//!
//! Values only: every mutator borrows the current snapshot and returns a new
//! one, or an error with the original untouched.

pub mod agreement;
pub mod app_instance;
pub mod free_balance;
pub mod outcome;
pub mod state_channel;

use crate::core::{
    abi::{encode, encode_call, keccak256, AbiError, Packed, Token},
    security::xkey::KeyError,
    types::{Address, NetworkContext, H256, U256},
};
use thiserror::Error;

pub use agreement::SingleAssetTwoPartyIntermediaryAgreement;
pub use app_instance::{AppInstance, AppInterface, InterpreterParams, OutcomeType};
pub use free_balance::FreeBalanceState;
pub use outcome::{compute_token_indexed_increments, decode_two_party_coin_transfers};
pub use state_channel::StateChannel;

/// Model errors.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Identity hash already present.
    #[error("app already installed: {0:?}")]
    AppAlreadyInstalled(H256),
    /// Identity hash absent.
    #[error("app already uninstalled: {0:?}")]
    AppAlreadyUninstalled(H256),
    /// No such app in the channel.
    #[error("no such app: {0:?}")]
    NoSuchApp(H256),
    /// Removing the free balance is never allowed.
    #[error("free balance cannot be removed")]
    FreeBalanceRemoval,
    /// Balance would go negative.
    #[error("underflow: token {token:?}, beneficiary {beneficiary:?}")]
    Underflow {
        /// Token.
        token: Address,
        /// Beneficiary.
        beneficiary: Address,
    },
    /// Balance would exceed 2^256.
    #[error("overflow")]
    Overflow,
    /// Increment for an address without a free-balance entry.
    #[error("unknown beneficiary: {0:?}")]
    UnknownBeneficiary(Address),
    /// State does not fit the declared encoding.
    #[error("state not encodable: {0}")]
    StateNotEncodable(AbiError),
    /// Outcome unusable for the interpreter parameters.
    #[error("invalid outcome: {0}")]
    InvalidOutcome(String),
    /// Channel has no free balance yet.
    #[error("channel not set up")]
    NotSetUp,
    /// Channel already has a free balance.
    #[error("channel already set up")]
    AlreadySetUp,
    /// Free-balance state does not decode.
    #[error("free balance state corrupt")]
    FreeBalanceCorrupt,
    /// App frozen for teardown.
    #[error("app locked: {0:?}")]
    AppLocked(H256),
    /// Lock requested below the current version.
    #[error("stale version: current {current}, requested {requested}")]
    StaleVersion {
        /// Current version.
        current: u64,
        /// Requested version.
        requested: u64,
    },
    /// Version counter exhausted.
    #[error("version overflow")]
    VersionOverflow,
    /// App sequence number differs from the channel counter.
    #[error("app seq no {got} != channel counter {expected}")]
    SeqNoMismatch {
        /// Channel counter.
        expected: u64,
        /// App's number.
        got: u64,
    },
    /// App owned by a different multisig.
    #[error("app owner mismatch")]
    OwnerMismatch,
    /// Agreement already recorded for the target.
    #[error("agreement exists: {0:?}")]
    AgreementExists(H256),
    /// No agreement recorded for the target.
    #[error("no such agreement: {0:?}")]
    NoSuchAgreement(H256),
    /// Participant key derivation failed.
    #[error("key: {0}")]
    Key(KeyError),
}

impl From<KeyError> for ChannelError {
    fn from(e: KeyError) -> Self {
        ChannelError::Key(e)
    }
}

/// CREATE2 address of the multisig proxy for `owners` (ascending).
///
/// `keccak256(0xff || proxy_factory || salt || keccak256(proxy_creation_code || pad32(mastercopy)))[12..]`
/// with `salt = keccak256(keccak256(setup(owners)) || uint256(0))`.
pub fn derive_multisig_address(network: &NetworkContext, owners: &[Address]) -> Address {
    let initializer = encode_call(
        "setup(address[])",
        &[Token::Array(owners.iter().copied().map(Token::Address).collect())],
    );
    let salt = Packed::new()
        .bytes32(&keccak256(&initializer))
        .uint256(&U256::zero())
        .keccak();
    let mut init_code = network.proxy_creation_code.clone();
    init_code.extend_from_slice(&encode(&[Token::Address(network.minimum_viable_multisig)]));
    let h = Packed::new()
        .byte(0xff)
        .address(&network.proxy_factory)
        .bytes32(&salt)
        .bytes32(&keccak256(&init_code))
        .keccak();
    Address::from_slice(&h.as_bytes()[12..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multisig_address_depends_on_owner_order_and_factory() {
        let a = Address::repeat_byte(1);
        let b = Address::repeat_byte(2);
        let mut network = NetworkContext { proxy_factory: Address::repeat_byte(7), ..Default::default() };
        let ab = derive_multisig_address(&network, &[a, b]);
        assert_eq!(ab, derive_multisig_address(&network, &[a, b]));
        assert_ne!(ab, derive_multisig_address(&network, &[b, a]));
        network.proxy_factory = Address::repeat_byte(8);
        assert_ne!(ab, derive_multisig_address(&network, &[a, b]));
    }
}
