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

//! Commitments: pure descriptions of on-chain effects.
//!
//! Every builder takes the network table plus the handful of fields that
//! identify the effect, never a whole channel. The digest and call data are
//! functions of those fields only, so a restarted node re-derives them
//! byte-for-byte from persisted state.

pub mod conditional_transaction;
pub mod multi_send;
pub mod multisig;
pub mod set_state;
pub mod setup;
pub mod two_party_virtual_eth_as_lump;
pub mod uninstall;
pub mod virtual_app_set_state;

use crate::core::{
    abi::{encode, keccak256, Token},
    security::signatures::SignatureError,
    types::{Address, Signature, H256, U256},
};
use serde::{Deserialize, Serialize};

pub use conditional_transaction::ConditionalTransactionCommitment;
pub use set_state::SetStateCommitment;
pub use setup::SetupCommitment;
pub use two_party_virtual_eth_as_lump::TwoPartyVirtualEthAsLumpCommitment;
pub use uninstall::UninstallCommitment;
pub use virtual_app_set_state::VirtualAppSetStateCommitment;

/// Ready-to-broadcast transaction payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Destination contract.
    pub to: Address,
    /// Wei attached.
    pub value: U256,
    /// Call data.
    pub data: Vec<u8>,
}

/// Multisig call kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MultisigOperation {
    /// Plain call.
    Call = 0,
    /// Delegatecall (runs in the multisig's storage context).
    DelegateCall = 1,
}

/// Immutable identity of an app instance; its hash is the app's primary key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppIdentity {
    /// Owning multisig.
    pub owner: Address,
    /// Signing keys, ascending.
    pub signing_keys: Vec<Address>,
    /// App definition contract.
    pub app_definition: Address,
    /// Default challenge timeout.
    pub default_timeout: U256,
}

impl AppIdentity {
    /// `tuple(address owner, address[] signingKeys, address appDefinition, uint256 defaultTimeout)`.
    pub fn to_token(&self) -> Token {
        Token::Tuple(vec![
            Token::Address(self.owner),
            Token::Array(self.signing_keys.iter().copied().map(Token::Address).collect()),
            Token::Address(self.app_definition),
            Token::Uint(self.default_timeout),
        ])
    }

    /// `keccak256(abi.encode(identity))`.
    pub fn identity_hash(&self) -> H256 {
        keccak256(&encode(&[self.to_token()]))
    }
}

/// Any commitment a protocol can produce.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Commitment {
    /// Setup.
    Setup(SetupCommitment),
    /// Install.
    ConditionalTransaction(ConditionalTransactionCommitment),
    /// App or free-balance state.
    SetState(SetStateCommitment),
    /// Uninstall batch.
    Uninstall(UninstallCommitment),
    /// Virtual app state.
    VirtualAppSetState(VirtualAppSetStateCommitment),
    /// Virtual-app capital lock-up on a leg.
    TwoPartyVirtualEthAsLump(TwoPartyVirtualEthAsLumpCommitment),
}

impl Commitment {
    /// Digest the required signers sign.
    pub fn hash_to_sign(&self) -> H256 {
        match self {
            Commitment::Setup(c) => c.hash_to_sign(),
            Commitment::ConditionalTransaction(c) => c.hash_to_sign(),
            Commitment::SetState(c) => c.hash_to_sign(),
            Commitment::Uninstall(c) => c.hash_to_sign(),
            Commitment::VirtualAppSetState(c) => c.hash_to_sign(),
            Commitment::TwoPartyVirtualEthAsLump(c) => c.hash_to_sign(),
        }
    }

    /// Intermediary digest; only virtual app states have one.
    pub fn hash_to_sign_as_intermediary(&self) -> Option<H256> {
        match self {
            Commitment::VirtualAppSetState(c) => Some(c.hash_to_sign_as_intermediary()),
            _ => None,
        }
    }

    /// Transaction payload given the collected signatures.
    pub fn signed_transaction(
        &self,
        sigs: &[Signature],
        intermediary: Option<&Signature>,
    ) -> Result<Transaction, SignatureError> {
        match self {
            Commitment::Setup(c) => c.signed_transaction(sigs),
            Commitment::ConditionalTransaction(c) => c.signed_transaction(sigs),
            Commitment::SetState(c) => c.signed_transaction(sigs),
            Commitment::Uninstall(c) => c.signed_transaction(sigs),
            Commitment::VirtualAppSetState(c) => c.signed_transaction(sigs, intermediary),
            Commitment::TwoPartyVirtualEthAsLump(c) => c.signed_transaction(sigs),
        }
    }

    /// Short variant name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Commitment::Setup(_) => "setup",
            Commitment::ConditionalTransaction(_) => "conditional_transaction",
            Commitment::SetState(_) => "set_state",
            Commitment::Uninstall(_) => "uninstall",
            Commitment::VirtualAppSetState(_) => "virtual_app_set_state",
            Commitment::TwoPartyVirtualEthAsLump(_) => "two_party_virtual_eth_as_lump",
        }
    }
}

/// A commitment together with every signature it needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedCommitment {
    /// The commitment.
    pub commitment: Commitment,
    /// Signing-key signatures, any order.
    pub signatures: Vec<Signature>,
    /// Intermediary pass-through signature (virtual app states).
    pub intermediary_signature: Option<Signature>,
}

impl SignedCommitment {
    /// Transaction ready for submission.
    pub fn transaction(&self) -> Result<Transaction, SignatureError> {
        self.commitment
            .signed_transaction(&self.signatures, self.intermediary_signature.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        abi::selector,
        security::{signatures::sign_digest, xkey::ExtendedPrivateKey},
        types::NetworkContext,
    };

    fn network() -> NetworkContext {
        NetworkContext {
            challenge_registry: Address::repeat_byte(1),
            multi_send: Address::repeat_byte(2),
            conditional_transaction_delegate_target: Address::repeat_byte(3),
            two_party_virtual_eth_as_lump: Address::repeat_byte(4),
            ..NetworkContext::default()
        }
    }

    fn identity() -> AppIdentity {
        AppIdentity {
            owner: Address::repeat_byte(9),
            signing_keys: vec![Address::repeat_byte(5), Address::repeat_byte(6)],
            app_definition: Address::repeat_byte(7),
            default_timeout: U256::from(10),
        }
    }

    #[test]
    fn intermediary_digest_differs_from_plain() {
        let c = VirtualAppSetStateCommitment::new(
            &network(),
            identity(),
            keccak256(b"state"),
            U256::one(),
            U256::zero(),
            U256::from(1u64 << 40),
        );
        assert_ne!(c.hash_to_sign(), c.hash_to_sign_as_intermediary());
        let wrapped = Commitment::VirtualAppSetState(c);
        assert!(wrapped.signed_transaction(&[], None).is_err());
    }

    #[test]
    fn set_state_targets_registry() {
        let sk = *ExtendedPrivateKey::from_seed(&[2u8; 32]).unwrap().secret_key();
        let c = SetStateCommitment::new(&network(), identity(), H256::zero(), U256::one(), U256::zero());
        let sig = sign_digest(&sk, &c.hash_to_sign());
        let tx = c.signed_transaction(&[sig]).unwrap();
        assert_eq!(tx.to, Address::repeat_byte(1));
        assert_eq!(
            &tx.data[..4],
            &selector("setState((address,address[],address,uint256),(bytes32,uint256,uint256,bytes[]))")
        );
    }

    #[test]
    fn identity_hash_depends_on_every_field() {
        let base = identity();
        let mut other = base.clone();
        other.default_timeout = U256::from(11);
        assert_ne!(base.identity_hash(), other.identity_hash());
        assert_eq!(base.identity_hash(), identity().identity_hash());
    }
}
