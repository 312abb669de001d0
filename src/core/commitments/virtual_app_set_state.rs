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

//! VirtualAppSetState: a virtual app state signed by both end users and
//! pass-through authorized by the intermediary.
//!
//! The intermediary never signs a concrete state. It signs
//! `keccak256(0x19 || identityHash || versionNumberExpiry || timeout || 0x01)`,
//! accepting any end-user-signed state below the expiry version.

use super::{AppIdentity, Transaction};
use crate::core::{
    abi::{encode_call, Packed, Token},
    security::signatures::{sort_signatures_by_signer, SignatureError},
    types::{Address, NetworkContext, Signature, H256, U256},
};
use serde::{Deserialize, Serialize};

const VIRTUAL_APP_SET_STATE: &str = "virtualAppSetState((address,address[],address,uint256),(bytes32,uint256,uint256,uint256,bytes[],bytes))";

/// Commitment to a virtual app state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualAppSetStateCommitment {
    /// Identity of the virtual app.
    pub app_identity: AppIdentity,
    /// keccak256 of the encoded state.
    pub app_state_hash: H256,
    /// Version being committed.
    pub version_number: U256,
    /// Challenge timeout.
    pub timeout: U256,
    /// Versions at or above this are not covered by the intermediary.
    pub version_number_expiry: U256,
    challenge_registry: Address,
}

impl VirtualAppSetStateCommitment {
    /// Build from the network table and the target's state fields.
    pub fn new(
        network: &NetworkContext,
        app_identity: AppIdentity,
        app_state_hash: H256,
        version_number: U256,
        timeout: U256,
        version_number_expiry: U256,
    ) -> Self {
        Self {
            app_identity,
            app_state_hash,
            version_number,
            timeout,
            version_number_expiry,
            challenge_registry: network.challenge_registry,
        }
    }

    /// End-user digest; identical layout to a plain SetState.
    pub fn hash_to_sign(&self) -> H256 {
        Packed::new()
            .byte(0x19)
            .bytes32(&self.app_identity.identity_hash())
            .uint256(&self.version_number)
            .uint256(&self.timeout)
            .bytes32(&self.app_state_hash)
            .keccak()
    }

    /// Intermediary digest.
    pub fn hash_to_sign_as_intermediary(&self) -> H256 {
        Packed::new()
            .byte(0x19)
            .bytes32(&self.app_identity.identity_hash())
            .uint256(&self.version_number_expiry)
            .uint256(&self.timeout)
            .byte(0x01)
            .keccak()
    }

    /// Registry `virtualAppSetState`.
    pub fn signed_transaction(
        &self,
        sigs: &[Signature],
        intermediary: Option<&Signature>,
    ) -> Result<Transaction, SignatureError> {
        let intermediary = intermediary.ok_or(SignatureError::Missing)?;
        let sorted = sort_signatures_by_signer(&self.hash_to_sign(), sigs)?;
        let data = encode_call(
            VIRTUAL_APP_SET_STATE,
            &[
                self.app_identity.to_token(),
                Token::Tuple(vec![
                    Token::bytes32(&self.app_state_hash),
                    Token::Uint(self.version_number),
                    Token::Uint(self.timeout),
                    Token::Uint(self.version_number_expiry),
                    Token::Array(sorted.into_iter().map(|s| Token::Bytes(s.0)).collect()),
                    Token::Bytes(intermediary.0.clone()),
                ]),
            ],
        );
        Ok(Transaction { to: self.challenge_registry, value: U256::zero(), data })
    }
}
