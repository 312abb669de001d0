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

//! Recoverable ECDSA over raw 32-byte digests.
//!
//! Signatures are 65 bytes `r || s || v` with `v = 27 + recovery_id`. The
//! digest is signed as-is (no message prefix), matching what the on-chain
//! contracts recover with `ecrecover`.

use crate::core::{
    security::xkey::{address_from_public_key, secp},
    types::{Address, Signature, H256},
};
use secp256k1::{
    ecdsa::{RecoverableSignature, RecoveryId},
    Message, SecretKey,
};
use thiserror::Error;

/// Signature length in bytes.
pub const SIGNATURE_LEN: usize = 65;

/// Signature errors.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    /// Not 65 bytes or not a valid curve signature.
    #[error("malformed signature")]
    Malformed,
    /// A required signature slot was empty.
    #[error("missing signature")]
    Missing,
    /// Recovered signer differs from the expected one.
    #[error("invalid signature: expected {expected:?}, recovered {recovered:?}")]
    InvalidSignature {
        /// Address the commitment requires.
        expected: Address,
        /// Address recovered from the signature.
        recovered: Address,
    },
}

/// Sign `digest` with `sk`.
pub fn sign_digest(sk: &SecretKey, digest: &H256) -> Signature {
    let msg = Message::from_digest(digest.0);
    let (rec_id, compact) = secp().sign_ecdsa_recoverable(&msg, sk).serialize_compact();
    let mut out = Vec::with_capacity(SIGNATURE_LEN);
    out.extend_from_slice(&compact);
    // recovery ids are 0..=3
    out.push(27 + rec_id.to_i32() as u8);
    Signature(out)
}

/// Address that produced `sig` over `digest`.
pub fn recover_address(digest: &H256, sig: &Signature) -> Result<Address, SignatureError> {
    if sig.0.len() != SIGNATURE_LEN {
        return Err(SignatureError::Malformed);
    }
    let v = i32::from(sig.0[64]);
    let v = if v >= 27 { v - 27 } else { v };
    let rec_id = RecoveryId::from_i32(v).map_err(|_| SignatureError::Malformed)?;
    let rs = RecoverableSignature::from_compact(&sig.0[..64], rec_id)
        .map_err(|_| SignatureError::Malformed)?;
    let msg = Message::from_digest(digest.0);
    let pk = secp()
        .recover_ecdsa(&msg, &rs)
        .map_err(|_| SignatureError::Malformed)?;
    Ok(address_from_public_key(&pk))
}

/// Fail unless `sig` over `digest` recovers to `expected`.
pub fn assert_is_valid_signature(
    expected: Address,
    digest: &H256,
    sig: Option<&Signature>,
) -> Result<(), SignatureError> {
    let sig = sig.ok_or(SignatureError::Missing)?;
    let recovered = recover_address(digest, sig)?;
    if recovered != expected {
        return Err(SignatureError::InvalidSignature { expected, recovered });
    }
    Ok(())
}

/// Order signatures by recovered signer address, ascending.
pub fn sort_signatures_by_signer(
    digest: &H256,
    sigs: &[Signature],
) -> Result<Vec<Signature>, SignatureError> {
    let mut keyed = sigs
        .iter()
        .map(|s| recover_address(digest, s).map(|a| (a, s.clone())))
        .collect::<Result<Vec<_>, _>>()?;
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(keyed.into_iter().map(|(_, s)| s).collect())
}

/// Concatenated `r || s || v` bytes, in the given order.
pub fn signatures_to_bytes(sigs: &[Signature]) -> Vec<u8> {
    sigs.iter().flat_map(|s| s.0.iter().copied()).collect()
}
