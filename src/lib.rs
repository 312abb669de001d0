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

//! Statechannels - off-chain protocol engine for Ethereum state channels.
//!
//! This crate provides:
//! - Solidity ABI encoding and the on-chain commitment digests
//! - An immutable channel and app-instance model with free-balance accounting
//! - Setup, install, update, take-action and uninstall flows, plus virtual apps through an intermediary
//! - A replaying instruction interpreter with per-channel serialization and a sled-backed store
//! - Monitoring via Prometheus metrics and structured logging

/// Core protocol primitives (codecs, commitments, model, flows, runtime, storage).
pub mod core;
/// Observability (metrics).
pub mod monitoring;
