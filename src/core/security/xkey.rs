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
#![deny(missing_docs)]

//! Extended keys and per-app signing addresses.
//!
//! A participant is identified by an extended public key. The key used for
//! the app with sequence number `k` is the non-hardened child `k` of that
//! key, so a counterparty can compute every expected signer address from the
//! shared public identity alone.
//!
//! Serialized form is the BIP32 layout under base58check:
//! `version(4) || depth(1) || parent_fingerprint(4) || child(4) || chain_code(32) || key(33)`.

use crate::core::{abi::keccak256, types::Address};
use ring::hmac;
use secp256k1::{All, PublicKey, Scalar, Secp256k1, SecretKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{cmp::Ordering, fmt, str::FromStr, sync::OnceLock};
use thiserror::Error;
use zeroize::Zeroizing;

const XPUB_VERSION: [u8; 4] = [0x04, 0x88, 0xb2, 0x1e];
const XPRV_VERSION: [u8; 4] = [0x04, 0x88, 0xad, 0xe4];
const SERIALIZED_LEN: usize = 78;
const HARDENED_OFFSET: u32 = 0x8000_0000;
const MASTER_HMAC_KEY: &[u8] = b"Bitcoin seed";

/// Key errors.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    /// Not a well-formed extended key string.
    #[error("invalid extended key encoding")]
    Encoding,
    /// Key material outside the curve order.
    #[error("invalid key material")]
    InvalidKey,
    /// Derived child is invalid (negligible probability).
    #[error("invalid child derivation")]
    InvalidChild,
    /// Hardened derivation requested from a public key.
    #[error("hardened index from public key")]
    Hardened,
}

pub(crate) fn secp() -> &'static Secp256k1<All> {
    static CTX: OnceLock<Secp256k1<All>> = OnceLock::new();
    CTX.get_or_init(Secp256k1::new)
}

fn hmac_sha512(key: &[u8], data: &[u8]) -> Zeroizing<[u8; 64]> {
    let k = hmac::Key::new(hmac::HMAC_SHA512, key);
    let tag = hmac::sign(&k, data);
    let mut out = Zeroizing::new([0u8; 64]);
    out.copy_from_slice(tag.as_ref());
    out
}

fn split(i: &[u8; 64]) -> ([u8; 32], [u8; 32]) {
    let mut l = [0u8; 32];
    let mut r = [0u8; 32];
    l.copy_from_slice(&i[..32]);
    r.copy_from_slice(&i[32..]);
    (l, r)
}

fn fingerprint(pk: &PublicKey) -> [u8; 4] {
    let h = keccak256(&pk.serialize());
    let mut out = [0u8; 4];
    out.copy_from_slice(&h.as_bytes()[..4]);
    out
}

/// Ethereum address of a public key.
pub fn address_from_public_key(pk: &PublicKey) -> Address {
    let uncompressed = pk.serialize_uncompressed();
    let h = keccak256(&uncompressed[1..]);
    Address::from_slice(&h.as_bytes()[12..])
}

/// Extended private key.
#[derive(Clone)]
pub struct ExtendedPrivateKey {
    secret: SecretKey,
    chain_code: [u8; 32],
    depth: u8,
    parent_fingerprint: [u8; 4],
    child_number: u32,
}

impl fmt::Debug for ExtendedPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtendedPrivateKey")
            .field("depth", &self.depth)
            .field("child_number", &self.child_number)
            .finish_non_exhaustive()
    }
}

impl ExtendedPrivateKey {
    /// Master key from a seed (16..=64 bytes recommended).
    pub fn from_seed(seed: &[u8]) -> Result<Self, KeyError> {
        let i = hmac_sha512(MASTER_HMAC_KEY, seed);
        let (il, ir) = split(&i);
        let secret = SecretKey::from_slice(&il).map_err(|_| KeyError::InvalidKey)?;
        Ok(Self {
            secret,
            chain_code: ir,
            depth: 0,
            parent_fingerprint: [0u8; 4],
            child_number: 0,
        })
    }

    /// Child key at `index` (hardened when `index >= 2^31`).
    pub fn derive_child(&self, index: u32) -> Result<Self, KeyError> {
        let parent_pk = PublicKey::from_secret_key(secp(), &self.secret);
        let mut data = Zeroizing::new(Vec::with_capacity(37));
        if index >= HARDENED_OFFSET {
            data.push(0u8);
            data.extend_from_slice(&self.secret.secret_bytes());
        } else {
            data.extend_from_slice(&parent_pk.serialize());
        }
        data.extend_from_slice(&index.to_be_bytes());
        let i = hmac_sha512(&self.chain_code, &data);
        let (il, ir) = split(&i);
        let tweak = Scalar::from_be_bytes(il).map_err(|_| KeyError::InvalidChild)?;
        let secret = self.secret.add_tweak(&tweak).map_err(|_| KeyError::InvalidChild)?;
        Ok(Self {
            secret,
            chain_code: ir,
            depth: self.depth.saturating_add(1),
            parent_fingerprint: fingerprint(&parent_pk),
            child_number: index,
        })
    }

    /// Raw secret key.
    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }

    /// Public (neutered) counterpart.
    pub fn neuter(&self) -> ExtendedPublicKey {
        ExtendedPublicKey {
            public_key: PublicKey::from_secret_key(secp(), &self.secret),
            chain_code: self.chain_code,
            depth: self.depth,
            parent_fingerprint: self.parent_fingerprint,
            child_number: self.child_number,
        }
    }

    /// Base58check `xprv` string.
    pub fn to_xprv_string(&self) -> Zeroizing<String> {
        let mut key = [0u8; 33];
        key[1..].copy_from_slice(&self.secret.secret_bytes());
        let bytes = Zeroizing::new(serialize(
            XPRV_VERSION,
            self.depth,
            self.parent_fingerprint,
            self.child_number,
            &self.chain_code,
            &key,
        ));
        Zeroizing::new(bs58::encode(bytes.as_slice()).with_check().into_string())
    }

    /// Parse a base58check `xprv` string.
    pub fn from_xprv_string(s: &str) -> Result<Self, KeyError> {
        let raw = Zeroizing::new(
            bs58::decode(s)
                .with_check(None)
                .into_vec()
                .map_err(|_| KeyError::Encoding)?,
        );
        let (version, depth, parent_fingerprint, child_number, chain_code, key) = deserialize(&raw)?;
        if version != XPRV_VERSION || key[0] != 0 {
            return Err(KeyError::Encoding);
        }
        let secret = SecretKey::from_slice(&key[1..]).map_err(|_| KeyError::InvalidKey)?;
        Ok(Self { secret, chain_code, depth, parent_fingerprint, child_number })
    }
}

/// Extended public key: a participant's public identity.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ExtendedPublicKey {
    public_key: PublicKey,
    chain_code: [u8; 32],
    depth: u8,
    parent_fingerprint: [u8; 4],
    child_number: u32,
}

impl ExtendedPublicKey {
    /// Non-hardened child public key at `index`.
    pub fn derive_child(&self, index: u32) -> Result<Self, KeyError> {
        if index >= HARDENED_OFFSET {
            return Err(KeyError::Hardened);
        }
        let mut data = Vec::with_capacity(37);
        data.extend_from_slice(&self.public_key.serialize());
        data.extend_from_slice(&index.to_be_bytes());
        let i = hmac_sha512(&self.chain_code, &data);
        let (il, ir) = split(&i);
        let tweak = Scalar::from_be_bytes(il).map_err(|_| KeyError::InvalidChild)?;
        let public_key = self
            .public_key
            .add_exp_tweak(secp(), &tweak)
            .map_err(|_| KeyError::InvalidChild)?;
        Ok(Self {
            public_key,
            chain_code: ir,
            depth: self.depth.saturating_add(1),
            parent_fingerprint: fingerprint(&self.public_key),
            child_number: index,
        })
    }

    /// Raw public key.
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Address of this key itself.
    pub fn address(&self) -> Address {
        address_from_public_key(&self.public_key)
    }
}

fn serialize(
    version: [u8; 4],
    depth: u8,
    parent_fingerprint: [u8; 4],
    child_number: u32,
    chain_code: &[u8; 32],
    key: &[u8; 33],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(SERIALIZED_LEN);
    out.extend_from_slice(&version);
    out.push(depth);
    out.extend_from_slice(&parent_fingerprint);
    out.extend_from_slice(&child_number.to_be_bytes());
    out.extend_from_slice(chain_code);
    out.extend_from_slice(key);
    out
}

type RawExtendedKey = ([u8; 4], u8, [u8; 4], u32, [u8; 32], [u8; 33]);

fn deserialize(raw: &[u8]) -> Result<RawExtendedKey, KeyError> {
    if raw.len() != SERIALIZED_LEN {
        return Err(KeyError::Encoding);
    }
    let mut version = [0u8; 4];
    version.copy_from_slice(&raw[0..4]);
    let depth = raw[4];
    let mut parent_fingerprint = [0u8; 4];
    parent_fingerprint.copy_from_slice(&raw[5..9]);
    let mut child = [0u8; 4];
    child.copy_from_slice(&raw[9..13]);
    let mut chain_code = [0u8; 32];
    chain_code.copy_from_slice(&raw[13..45]);
    let mut key = [0u8; 33];
    key.copy_from_slice(&raw[45..78]);
    Ok((version, depth, parent_fingerprint, u32::from_be_bytes(child), chain_code, key))
}

impl fmt::Display for ExtendedPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = serialize(
            XPUB_VERSION,
            self.depth,
            self.parent_fingerprint,
            self.child_number,
            &self.chain_code,
            &self.public_key.serialize(),
        );
        f.write_str(&bs58::encode(bytes).with_check().into_string())
    }
}

impl fmt::Debug for ExtendedPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExtendedPublicKey({self})")
    }
}

impl FromStr for ExtendedPublicKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = bs58::decode(s)
            .with_check(None)
            .into_vec()
            .map_err(|_| KeyError::Encoding)?;
        let (version, depth, parent_fingerprint, child_number, chain_code, key) = deserialize(&raw)?;
        if version != XPUB_VERSION {
            return Err(KeyError::Encoding);
        }
        let public_key = PublicKey::from_slice(&key).map_err(|_| KeyError::InvalidKey)?;
        Ok(Self { public_key, chain_code, depth, parent_fingerprint, child_number })
    }
}

impl Ord for ExtendedPublicKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_string().cmp(&other.to_string())
    }
}

impl PartialOrd for ExtendedPublicKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for ExtendedPublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ExtendedPublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

fn key_index(k: u64) -> Result<u32, KeyError> {
    u32::try_from(k)
        .ok()
        .filter(|i| *i < HARDENED_OFFSET)
        .ok_or(KeyError::Hardened)
}

/// Signing address of `xpub` for the app with sequence number `k`.
pub fn xkey_kth_address(xpub: &ExtendedPublicKey, k: u64) -> Result<Address, KeyError> {
    Ok(xpub.derive_child(key_index(k)?)?.address())
}

/// Private signing key of `xprv` for the app with sequence number `k`.
pub fn xkey_kth_secret(xprv: &ExtendedPrivateKey, k: u64) -> Result<SecretKey, KeyError> {
    Ok(*xprv.derive_child(key_index(k)?)?.secret_key())
}

/// Kth addresses of every key, sorted ascending.
pub fn xkeys_to_sorted_kth_addresses(
    xpubs: &[ExtendedPublicKey],
    k: u64,
) -> Result<Vec<Address>, KeyError> {
    let mut out = xpubs
        .iter()
        .map(|x| xkey_kth_address(x, k))
        .collect::<Result<Vec<_>, _>>()?;
    out.sort();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_and_private_derivation_agree() {
        let root = ExtendedPrivateKey::from_seed(&[7u8; 32]).unwrap();
        let xpub = root.neuter();
        for k in [0u64, 1, 2, 41] {
            let sk = xkey_kth_secret(&root, k).unwrap();
            let pk = PublicKey::from_secret_key(secp(), &sk);
            assert_eq!(address_from_public_key(&pk), xkey_kth_address(&xpub, k).unwrap());
        }
    }

    #[test]
    fn xpub_string_round_trips() {
        let xpub = ExtendedPrivateKey::from_seed(b"participant seed material").unwrap().neuter();
        let s = xpub.to_string();
        assert!(s.starts_with("xpub"));
        assert_eq!(s.parse::<ExtendedPublicKey>().unwrap(), xpub);
        assert_eq!("xpubnotakey".parse::<ExtendedPublicKey>(), Err(KeyError::Encoding));
    }

    #[test]
    fn xprv_string_round_trips() {
        let xprv = ExtendedPrivateKey::from_seed(&[3u8; 32]).unwrap();
        let parsed = ExtendedPrivateKey::from_xprv_string(&xprv.to_xprv_string()).unwrap();
        assert_eq!(parsed.neuter(), xprv.neuter());
    }

    #[test]
    fn hardened_public_derivation_is_rejected() {
        let xpub = ExtendedPrivateKey::from_seed(&[1u8; 32]).unwrap().neuter();
        assert_eq!(xkey_kth_address(&xpub, u64::from(HARDENED_OFFSET)), Err(KeyError::Hardened));
    }
}
