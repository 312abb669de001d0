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

//! Lump-sum ETH lock-up on one leg of a virtual app.
//!
//! The batch records the leg's reduced free balance and installs the
//! agreement that pays the locked capital to the beneficiaries according to
//! the target app's outcome once it resolves on-chain.

use super::{
    multi_send::{multi_send_call_data, MultiSendTx},
    multisig::MultisigTransaction,
    set_state::SetStateCommitment,
    MultisigOperation, Transaction,
};
use crate::core::{
    abi::{encode_call, Token},
    security::signatures::SignatureError,
    types::{Address, NetworkContext, Signature, H256, U256},
};
use serde::{Deserialize, Serialize};

const DELEGATE_TARGET: &str = "delegateTarget((address,bytes32,uint256,uint256,address[2]))";

/// Commitment locking capital on a leg for a virtual app.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwoPartyVirtualEthAsLumpCommitment {
    /// Leg multisig.
    pub multisig: Address,
    /// Leg owners, ascending.
    pub owners: Vec<Address>,
    /// Leg free balance after the change.
    pub free_balance: SetStateCommitment,
    /// Virtual app whose outcome decides the payout.
    pub target_identity_hash: H256,
    /// Wei locked.
    pub capital_provided: U256,
    /// Block after which the agreement can no longer be triggered.
    pub expiry_block: U256,
    /// Payout recipients, in outcome order.
    pub beneficiaries: [Address; 2],
    challenge_registry: Address,
    delegate_target: Address,
    multi_send: Address,
}

impl TwoPartyVirtualEthAsLumpCommitment {
    /// Build from the leg free balance and the agreement terms.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        network: &NetworkContext,
        multisig: Address,
        owners: Vec<Address>,
        free_balance: SetStateCommitment,
        target_identity_hash: H256,
        capital_provided: U256,
        expiry_block: U256,
        beneficiaries: [Address; 2],
    ) -> Self {
        Self {
            multisig,
            owners,
            free_balance,
            target_identity_hash,
            capital_provided,
            expiry_block,
            beneficiaries,
            challenge_registry: network.challenge_registry,
            delegate_target: network.two_party_virtual_eth_as_lump,
            multi_send: network.multi_send,
        }
    }

    fn agreement_call(&self) -> MultiSendTx {
        MultiSendTx {
            operation: MultisigOperation::DelegateCall,
            to: self.delegate_target,
            value: U256::zero(),
            data: encode_call(
                DELEGATE_TARGET,
                &[Token::Tuple(vec![
                    Token::Address(self.challenge_registry),
                    Token::bytes32(&self.target_identity_hash),
                    Token::Uint(self.expiry_block),
                    Token::Uint(self.capital_provided),
                    Token::FixedArray(self.beneficiaries.iter().copied().map(Token::Address).collect()),
                ])],
            ),
        }
    }

    fn multisig_transaction(&self) -> MultisigTransaction {
        MultisigTransaction {
            multisig: self.multisig,
            owners: self.owners.clone(),
            to: self.multi_send,
            value: U256::zero(),
            data: multi_send_call_data(&[self.free_balance.owner_call(), self.agreement_call()]),
            operation: MultisigOperation::DelegateCall,
        }
    }

    /// Digest both leg owners sign.
    pub fn hash_to_sign(&self) -> H256 {
        self.multisig_transaction().hash_to_sign()
    }

    /// Multisig `execTransaction` into MultiSend.
    pub fn signed_transaction(&self, sigs: &[Signature]) -> Result<Transaction, SignatureError> {
        self.multisig_transaction().signed_transaction(sigs)
    }
}
