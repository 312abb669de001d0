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

//! App-definition oracle: the read-only on-chain evaluator of app logic.

use crate::core::model::AppInterface;
use async_trait::async_trait;
use thiserror::Error;

/// Oracle errors.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum OracleError {
    /// App logic rejected the input.
    #[error("rejected: {0}")]
    Rejected(String),
    /// Oracle could not be reached.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

/// Side-effect-free evaluator of an app definition.
#[async_trait]
pub trait AppOracle: Send + Sync {
    /// `applyAction(state, action)`: next encoded state.
    async fn compute_state_transition(
        &self,
        app: &AppInterface,
        encoded_state: &[u8],
        encoded_action: &[u8],
    ) -> Result<Vec<u8>, OracleError>;

    /// `computeOutcome(state)`: encoded outcome.
    async fn compute_outcome(&self, app: &AppInterface, encoded_state: &[u8]) -> Result<Vec<u8>, OracleError>;
}
