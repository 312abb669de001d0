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

//! MultiSend batch packing.
//!
//! Each inner call is packed as
//! `uint8 operation || address to || uint256 value || uint256 len || data`
//! and the concatenation is passed to `multiSend(bytes)`.

use super::MultisigOperation;
use crate::core::{
    abi::{encode_call, Packed, Token},
    types::{Address, U256},
};

/// One call inside a MultiSend batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultiSendTx {
    /// Call or delegatecall.
    pub operation: MultisigOperation,
    /// Callee.
    pub to: Address,
    /// Wei forwarded.
    pub value: U256,
    /// Call data.
    pub data: Vec<u8>,
}

/// Packed transaction list.
pub fn pack_transactions(txs: &[MultiSendTx]) -> Vec<u8> {
    txs.iter()
        .fold(Packed::new(), |p, tx| {
            p.byte(tx.operation as u8)
                .address(&tx.to)
                .uint256(&tx.value)
                .uint256(&U256::from(tx.data.len()))
                .bytes(&tx.data)
        })
        .finish()
}

/// `multiSend(bytes)` call data for the batch.
pub fn multi_send_call_data(txs: &[MultiSendTx]) -> Vec<u8> {
    encode_call("multiSend(bytes)", &[Token::Bytes(pack_transactions(txs))])
}
