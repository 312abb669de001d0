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

//! Uninstall: one multisig batch that records the credited free balance and
//! spends the removed app's next version, so none of its older signed states
//! can be replayed on-chain.

use super::{
    multi_send::multi_send_call_data, multisig::MultisigTransaction, set_state::SetStateCommitment,
    MultisigOperation, Transaction,
};
use crate::core::{
    security::signatures::SignatureError,
    types::{Address, NetworkContext, Signature, H256, U256},
};
use serde::{Deserialize, Serialize};

/// Commitment produced by the Uninstall protocol.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UninstallCommitment {
    /// Channel multisig.
    pub multisig: Address,
    /// Owners, ascending.
    pub owners: Vec<Address>,
    /// Free balance after crediting the outcome.
    pub free_balance: SetStateCommitment,
    /// Removed app at `latest_version + 1`, timeout 0.
    pub app_spend: SetStateCommitment,
    multi_send: Address,
}

impl UninstallCommitment {
    /// Build from the two owner `setState` calls.
    pub fn new(
        network: &NetworkContext,
        multisig: Address,
        owners: Vec<Address>,
        free_balance: SetStateCommitment,
        app_spend: SetStateCommitment,
    ) -> Self {
        Self { multisig, owners, free_balance, app_spend, multi_send: network.multi_send }
    }

    fn multisig_transaction(&self) -> MultisigTransaction {
        MultisigTransaction {
            multisig: self.multisig,
            owners: self.owners.clone(),
            to: self.multi_send,
            value: U256::zero(),
            data: multi_send_call_data(&[self.free_balance.owner_call(), self.app_spend.owner_call()]),
            operation: MultisigOperation::DelegateCall,
        }
    }

    /// Digest every owner signs.
    pub fn hash_to_sign(&self) -> H256 {
        self.multisig_transaction().hash_to_sign()
    }

    /// Multisig `execTransaction` into MultiSend.
    pub fn signed_transaction(&self, sigs: &[Signature]) -> Result<Transaction, SignatureError> {
        self.multisig_transaction().signed_transaction(sigs)
    }
}
