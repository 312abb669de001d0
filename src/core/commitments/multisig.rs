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

//! Transactions executed by the channel multisig.

use super::{MultisigOperation, Transaction};
use crate::core::{
    abi::{encode_call, keccak256, Packed, Token},
    security::signatures::{sort_signatures_by_signer, SignatureError},
    types::{Address, Signature, H256, U256},
};

const EXEC_TRANSACTION: &str = "execTransaction(address,uint256,bytes,uint8,bytes[])";

/// A call the multisig makes once every owner has signed it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultisigTransaction {
    /// Multisig proxy executing the call.
    pub multisig: Address,
    /// Owner addresses, ascending.
    pub owners: Vec<Address>,
    /// Callee.
    pub to: Address,
    /// Wei forwarded.
    pub value: U256,
    /// Call data.
    pub data: Vec<u8>,
    /// Call or delegatecall.
    pub operation: MultisigOperation,
}

impl MultisigTransaction {
    /// `keccak256(0x19 || owners || to || value || keccak256(data) || operation)`.
    pub fn hash_to_sign(&self) -> H256 {
        Packed::new()
            .byte(0x19)
            .address_array(&self.owners)
            .address(&self.to)
            .uint256(&self.value)
            .bytes32(&keccak256(&self.data))
            .byte(self.operation as u8)
            .keccak()
    }

    /// `execTransaction` on the multisig with owner signatures in signer order.
    pub fn signed_transaction(&self, sigs: &[Signature]) -> Result<Transaction, SignatureError> {
        let sorted = sort_signatures_by_signer(&self.hash_to_sign(), sigs)?;
        let data = encode_call(
            EXEC_TRANSACTION,
            &[
                Token::Address(self.to),
                Token::Uint(self.value),
                Token::Bytes(self.data.clone()),
                Token::uint(self.operation as u64),
                Token::Array(sorted.into_iter().map(|s| Token::Bytes(s.0)).collect()),
            ],
        );
        Ok(Transaction { to: self.multisig, value: U256::zero(), data })
    }
}
