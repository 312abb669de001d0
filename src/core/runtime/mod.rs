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

//! Instruction interpreter: runs flows against the injected signer,
//! transport and store.

pub mod driver;
pub mod memory_transport;
pub mod replay;
pub mod shards;

use crate::core::{protocol::ProtocolMessage, types::CodecError};
use async_trait::async_trait;
use thiserror::Error;

pub use crate::core::security::keystore::Signer;
pub use driver::{ProtocolRunner, RunnerConfig};
pub use memory_transport::MemoryHub;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Recipient not reachable through this transport.
    #[error("unknown peer: {0}")]
    UnknownPeer(String),
    /// Transport shut down.
    #[error("closed")]
    Closed,
    /// Message could not be put on the wire.
    #[error("encode: {0}")]
    Encode(#[from] CodecError),
}

/// Delivery of protocol messages to their `to_xpub`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Hand `msg` to the transport. Returns once the transport has accepted it.
    async fn send(&self, msg: ProtocolMessage) -> Result<(), TransportError>;
}
