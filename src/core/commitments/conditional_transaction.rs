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

//! Install: pay out an app's interpreted outcome, conditional on the app
//! still being active in the free balance when the multisig executes it.

use super::{multisig::MultisigTransaction, MultisigOperation, Transaction};
use crate::core::{
    abi::{encode_call, Token},
    security::signatures::SignatureError,
    types::{Address, NetworkContext, Signature, H256, U256},
};
use serde::{Deserialize, Serialize};

/// Commitment produced by the Install protocol.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionalTransactionCommitment {
    /// Channel multisig.
    pub multisig: Address,
    /// Owners, ascending.
    pub owners: Vec<Address>,
    /// Free-balance app identity hash.
    pub free_balance_identity_hash: H256,
    /// Installed app identity hash.
    pub app_identity_hash: H256,
    /// Outcome interpreter for the app.
    pub interpreter: Address,
    /// ABI-encoded interpreter parameters.
    pub interpreter_params: Vec<u8>,
    challenge_registry: Address,
    delegate_target: Address,
}

impl ConditionalTransactionCommitment {
    /// Build from the network table and the installed app's outcome wiring.
    pub fn new(
        network: &NetworkContext,
        multisig: Address,
        owners: Vec<Address>,
        free_balance_identity_hash: H256,
        app_identity_hash: H256,
        interpreter: Address,
        interpreter_params: Vec<u8>,
    ) -> Self {
        Self {
            multisig,
            owners,
            free_balance_identity_hash,
            app_identity_hash,
            interpreter,
            interpreter_params,
            challenge_registry: network.challenge_registry,
            delegate_target: network.conditional_transaction_delegate_target,
        }
    }

    fn multisig_transaction(&self) -> MultisigTransaction {
        MultisigTransaction {
            multisig: self.multisig,
            owners: self.owners.clone(),
            to: self.delegate_target,
            value: U256::zero(),
            data: encode_call(
                "executeEffectOfInterpretedAppOutcome(address,bytes32,bytes32,address,bytes)",
                &[
                    Token::Address(self.challenge_registry),
                    Token::bytes32(&self.free_balance_identity_hash),
                    Token::bytes32(&self.app_identity_hash),
                    Token::Address(self.interpreter),
                    Token::Bytes(self.interpreter_params.clone()),
                ],
            ),
            operation: MultisigOperation::DelegateCall,
        }
    }

    /// Digest every owner signs.
    pub fn hash_to_sign(&self) -> H256 {
        self.multisig_transaction().hash_to_sign()
    }

    /// Multisig `execTransaction`.
    pub fn signed_transaction(&self, sigs: &[Signature]) -> Result<Transaction, SignatureError> {
        self.multisig_transaction().signed_transaction(sigs)
    }
}
