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

use super::ChannelError;
use crate::core::types::{Address, TokenIndexedCoinTransferMap, H256, U256};
use serde::{Deserialize, Serialize};

/// Capital locked on one leg on behalf of a virtual app.
///
/// `beneficiaries[k]` staked `stakes[k]` and receives the `k`-th transfer of
/// the target app's two-party outcome when the agreement unwinds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingleAssetTwoPartyIntermediaryAgreement {
    /// Virtual app funded by this agreement.
    pub target_identity_hash: H256,
    /// Token locked.
    pub token_address: Address,
    /// Leg free-balance addresses, in outcome order.
    pub beneficiaries: [Address; 2],
    /// Amount each beneficiary locked.
    pub stakes: [U256; 2],
    /// Block after which the agreement can no longer be triggered.
    pub expiry_block: u64,
}

impl SingleAssetTwoPartyIntermediaryAgreement {
    /// Total locked.
    pub fn capital_provided(&self) -> Result<U256, ChannelError> {
        self.stakes[0].checked_add(self.stakes[1]).ok_or(ChannelError::Overflow)
    }

    /// Free-balance decrements for locking the stakes.
    pub fn decrements(&self) -> TokenIndexedCoinTransferMap {
        self.per_beneficiary(self.stakes)
    }

    /// Free-balance increments for paying out `payouts`, which must sum to the capital.
    pub fn increments(&self, payouts: [U256; 2]) -> Result<TokenIndexedCoinTransferMap, ChannelError> {
        let total = payouts[0].checked_add(payouts[1]).ok_or(ChannelError::Overflow)?;
        if total != self.capital_provided()? {
            return Err(ChannelError::InvalidOutcome("payout differs from locked capital".into()));
        }
        Ok(self.per_beneficiary(payouts))
    }

    fn per_beneficiary(&self, amounts: [U256; 2]) -> TokenIndexedCoinTransferMap {
        let mut out = TokenIndexedCoinTransferMap::new();
        let inner = out.entry(self.token_address).or_default();
        for (b, a) in self.beneficiaries.iter().zip(amounts) {
            let slot = inner.entry(*b).or_insert_with(U256::zero);
            *slot = slot.saturating_add(a);
        }
        out
    }
}
