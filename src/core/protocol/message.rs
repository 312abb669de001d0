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

//! Wire envelope of one protocol step.

use super::{params::ProtocolParams, Protocol, ProtocolError};
use crate::core::{
    security::xkey::ExtendedPublicKey,
    types::{decode_canonical_limited, encode_canonical, CodecError, Signature},
};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};

/// `seq` of replies and terminal one-way sends.
pub const UNASSIGNED_SEQ_NO: i32 = -1;

/// Default cap on an encoded message.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 1024 * 1024;

/// One exchange step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolMessage {
    /// Correlates every message of one run.
    pub protocol_execution_id: String,
    /// Protocol being run.
    pub protocol: Protocol,
    /// Receiving role for flow-starting messages, else [`UNASSIGNED_SEQ_NO`].
    pub seq: i32,
    /// Sender.
    pub from_xpub: ExtendedPublicKey,
    /// Recipient.
    pub to_xpub: ExtendedPublicKey,
    /// Run parameters.
    pub params: ProtocolParams,
    /// First signature slot.
    pub signature: Option<Signature>,
    /// Second signature slot.
    pub signature2: Option<Signature>,
    /// Third signature slot (relayed signatures).
    pub signature3: Option<Signature>,
}

impl ProtocolMessage {
    /// Unsigned message of the same run from `from` to `to`.
    pub fn next(&self, seq: i32, from: &ExtendedPublicKey, to: &ExtendedPublicKey) -> Self {
        Self {
            protocol_execution_id: self.protocol_execution_id.clone(),
            protocol: self.protocol,
            seq,
            from_xpub: from.clone(),
            to_xpub: to.clone(),
            params: self.params.clone(),
            signature: None,
            signature2: None,
            signature3: None,
        }
    }

    /// Fill the signature slots in order.
    pub fn with_signatures(
        mut self,
        s1: Option<Signature>,
        s2: Option<Signature>,
        s3: Option<Signature>,
    ) -> Self {
        self.signature = s1;
        self.signature2 = s2;
        self.signature3 = s3;
        self
    }

    /// Whether this message starts a role's flow.
    pub fn is_flow_start(&self) -> bool {
        self.seq != UNASSIGNED_SEQ_NO
    }
}

/// Fresh execution id: 16 random bytes, hex.
pub fn new_execution_id() -> Result<String, ProtocolError> {
    let mut id = [0u8; 16];
    SystemRandom::new()
        .fill(&mut id)
        .map_err(|_| ProtocolError::Rng)?;
    Ok(hex::encode(id))
}

/// Canonical wire bytes.
pub fn encode_message(msg: &ProtocolMessage) -> Result<Vec<u8>, CodecError> {
    encode_canonical(msg)
}

/// Decode wire bytes no longer than `max`.
pub fn decode_message(bytes: &[u8], max: usize) -> Result<ProtocolMessage, CodecError> {
    decode_canonical_limited(bytes, max)
}
