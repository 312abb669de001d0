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

//! Deterministic core types and canonical encoding helpers.

use bincode::Options;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub use ethereum_types::{Address, H256, U256};

/// Canonical serialization error.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Value could not be serialized.
    #[error("serialization")]
    Serialize,
    /// Bytes could not be deserialized.
    #[error("deserialization")]
    Deserialize,
    /// Input exceeds the size cap.
    #[error("size limit exceeded")]
    TooLarge,
}

/// Canonical bincode options (deterministic).
fn bincode_opts() -> impl Options {
    // Fixint encoding provides a stable integer representation.
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

/// Encode with deterministic rules. Requires deterministic container ordering (use BTreeMap/BTreeSet).
pub fn encode_canonical<T: Serialize>(v: &T) -> Result<Vec<u8>, CodecError> {
    bincode_opts()
        .serialize(v)
        .map_err(|_| CodecError::Serialize)
}

/// Decode with a hard size cap.
pub fn decode_canonical_limited<T: DeserializeOwned>(
    bytes: &[u8],
    max: usize,
) -> Result<T, CodecError> {
    if bytes.len() > max {
        return Err(CodecError::TooLarge);
    }
    // The deserializer limit also bounds container preallocation.
    bincode_opts()
        .with_limit(max as u64)
        .deserialize(bytes)
        .map_err(|_| CodecError::Deserialize)
}

/// Recoverable ECDSA signature bytes (expected 65: r || s || v).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Signature(pub Vec<u8>);

impl Signature {
    /// Hex form with `0x` prefix.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.0))
    }
}

/// Canonical map type alias.
pub type CanonicalMap<K, V> = BTreeMap<K, V>;

/// Balances keyed by token address, then by beneficiary address.
pub type TokenIndexedCoinTransferMap = CanonicalMap<Address, CanonicalMap<Address, U256>>;

/// Address used to denote ETH in token-indexed balance maps.
pub const CONVENTION_FOR_ETH_TOKEN_ADDRESS: Address = Address::zero();

/// Contract address table of one deployment. Supplied once, never mutated.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkContext {
    /// ChallengeRegistry: records disputed app states on-chain.
    pub challenge_registry: Address,
    /// MinimumViableMultisig mastercopy the proxies delegate to.
    pub minimum_viable_multisig: Address,
    /// ProxyFactory used for CREATE2 multisig deployment.
    pub proxy_factory: Address,
    /// MultiSend batching contract.
    pub multi_send: Address,
    /// Delegate target executing interpreted app outcomes.
    pub conditional_transaction_delegate_target: Address,
    /// Interpreter for two-party fixed outcomes.
    pub two_party_fixed_outcome_interpreter: Address,
    /// Interpreter for multi-asset coin-transfer outcomes (free balance).
    pub multi_asset_multi_party_coin_transfer_interpreter: Address,
    /// Interpreter for single-asset two-party coin transfers.
    pub single_asset_two_party_coin_transfer_interpreter: Address,
    /// Lump-sum virtual agreement delegate target.
    pub two_party_virtual_eth_as_lump: Address,
    /// Identity app (state is its own outcome).
    pub identity_app: Address,
    /// Free balance app definition.
    pub free_balance_app: Address,
    /// Creation code of the multisig proxy (CREATE2 init code prefix).
    #[serde(default, with = "hex_bytes")]
    pub proxy_creation_code: Vec<u8>,
}

/// Serde helper: bytes as `0x`-prefixed hex strings.
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize as hex.
    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    /// Deserialize from hex, with or without `0x`.
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}

/// Big-endian 32-byte form of a U256.
pub fn u256_to_bytes(v: &U256) -> [u8; 32] {
    let mut out = [0u8; 32];
    v.to_big_endian(&mut out);
    out
}

/// Left-pad an address to a 32-byte word.
pub fn address_to_word(a: &Address) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[12..].copy_from_slice(a.as_bytes());
    out
}

/// Interpret a 32-byte word as an address.
pub fn word_to_address(w: &H256) -> Address {
    Address::from_slice(&w.as_bytes()[12..])
}

/// Lowercase `0x`-prefixed hex for logs.
pub fn short_hex(h: &H256) -> String {
    let s = hex::encode(h.as_bytes());
    format!("0x{}", &s[..12])
}
