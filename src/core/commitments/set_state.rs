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

//! SetState: a signed app state the challenge registry accepts as latest.

use super::{multi_send::MultiSendTx, AppIdentity, MultisigOperation, Transaction};
use crate::core::{
    abi::{encode_call, Packed, Token},
    security::signatures::{sort_signatures_by_signer, SignatureError},
    types::{Address, NetworkContext, Signature, H256, U256},
};
use serde::{Deserialize, Serialize};

const SET_STATE: &str =
    "setState((address,address[],address,uint256),(bytes32,uint256,uint256,bytes[]))";

/// Commitment to one app state at one version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetStateCommitment {
    /// Identity of the app.
    pub app_identity: AppIdentity,
    /// keccak256 of the encoded state.
    pub app_state_hash: H256,
    /// Version being committed.
    pub version_number: U256,
    /// Challenge timeout in blocks.
    pub timeout: U256,
    challenge_registry: Address,
}

impl SetStateCommitment {
    /// Build from the network table and the state fields.
    pub fn new(
        network: &NetworkContext,
        app_identity: AppIdentity,
        app_state_hash: H256,
        version_number: U256,
        timeout: U256,
    ) -> Self {
        Self {
            app_identity,
            app_state_hash,
            version_number,
            timeout,
            challenge_registry: network.challenge_registry,
        }
    }

    /// `keccak256(0x19 || identityHash || version || timeout || stateHash)`.
    pub fn hash_to_sign(&self) -> H256 {
        Packed::new()
            .byte(0x19)
            .bytes32(&self.app_identity.identity_hash())
            .uint256(&self.version_number)
            .uint256(&self.timeout)
            .bytes32(&self.app_state_hash)
            .keccak()
    }

    fn call_data(&self, sigs: Vec<Signature>) -> Vec<u8> {
        encode_call(
            SET_STATE,
            &[
                self.app_identity.to_token(),
                Token::Tuple(vec![
                    Token::bytes32(&self.app_state_hash),
                    Token::Uint(self.version_number),
                    Token::Uint(self.timeout),
                    Token::Array(sigs.into_iter().map(|s| Token::Bytes(s.0)).collect()),
                ]),
            ],
        )
    }

    /// Registry `setState` carrying the signing keys' signatures.
    pub fn signed_transaction(&self, sigs: &[Signature]) -> Result<Transaction, SignatureError> {
        let sorted = sort_signatures_by_signer(&self.hash_to_sign(), sigs)?;
        Ok(Transaction {
            to: self.challenge_registry,
            value: U256::zero(),
            data: self.call_data(sorted),
        })
    }

    /// Unsigned `setState` issued by the owning multisig inside a batch.
    pub(crate) fn owner_call(&self) -> MultiSendTx {
        MultiSendTx {
            operation: MultisigOperation::Call,
            to: self.challenge_registry,
            value: U256::zero(),
            data: self.call_data(Vec::new()),
        }
    }
}
