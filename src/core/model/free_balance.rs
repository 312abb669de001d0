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

//! Free balance: the reserved app holding uncommitted collateral.
//!
//! State encoding:
//! `tuple(address[] tokenAddresses, tuple(address to, uint256 amount)[][] balances, bytes32[] activeApps)`.
//! Tokens and beneficiaries are emitted in ascending address order, so the
//! encoding is a function of the balances alone.

use super::{
    app_instance::{AppInstance, AppInterface, InterpreterParams},
    ChannelError,
};
use crate::core::{
    abi::Token,
    types::{
        Address, CanonicalMap, NetworkContext, TokenIndexedCoinTransferMap, H256, U256,
        CONVENTION_FOR_ETH_TOKEN_ADDRESS,
    },
};
use std::collections::BTreeSet;

/// State encoding of the free-balance app.
pub const FREE_BALANCE_STATE_ENCODING: &str = "tuple(address[] tokenAddresses, tuple(address to, uint256 amount)[][] balances, bytes32[] activeApps)";

/// Default challenge timeout of the free balance, in blocks.
pub const FREE_BALANCE_DEFAULT_TIMEOUT: u64 = 172_800;

/// Decoded free-balance state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FreeBalanceState {
    /// token → beneficiary → amount.
    pub balances: TokenIndexedCoinTransferMap,
    /// Apps currently funded from this free balance.
    pub active_apps: BTreeSet<H256>,
}

impl FreeBalanceState {
    /// Zero ETH balance for every beneficiary.
    pub fn new(beneficiaries: &[Address]) -> Self {
        let eth = beneficiaries.iter().map(|b| (*b, U256::zero())).collect();
        let mut balances = CanonicalMap::new();
        balances.insert(CONVENTION_FOR_ETH_TOKEN_ADDRESS, eth);
        Self { balances, active_apps: BTreeSet::new() }
    }

    /// Beneficiaries of the ETH entry (every participant).
    pub fn beneficiaries(&self) -> Vec<Address> {
        self.balances
            .get(&CONVENTION_FOR_ETH_TOKEN_ADDRESS)
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Balance of `beneficiary` in `token` (zero when absent).
    pub fn balance_of(&self, token: &Address, beneficiary: &Address) -> U256 {
        self.balances
            .get(token)
            .and_then(|m| m.get(beneficiary))
            .copied()
            .unwrap_or_default()
    }

    /// Subtract every amount; nothing changes if any would go negative.
    pub fn apply_decrements(&self, decrements: &TokenIndexedCoinTransferMap) -> Result<Self, ChannelError> {
        let mut next = self.clone();
        for (token, per_party) in decrements {
            for (party, amount) in per_party {
                if amount.is_zero() {
                    continue;
                }
                let entry = next
                    .balances
                    .get_mut(token)
                    .and_then(|m| m.get_mut(party))
                    .ok_or(ChannelError::Underflow { token: *token, beneficiary: *party })?;
                *entry = entry
                    .checked_sub(*amount)
                    .ok_or(ChannelError::Underflow { token: *token, beneficiary: *party })?;
            }
        }
        Ok(next)
    }

    /// Add every amount. Beneficiaries must already hold a balance entry.
    pub fn apply_increments(&self, increments: &TokenIndexedCoinTransferMap) -> Result<Self, ChannelError> {
        let beneficiaries = self.beneficiaries();
        let mut next = self.clone();
        for (token, per_party) in increments {
            let balances = next
                .balances
                .entry(*token)
                .or_insert_with(|| beneficiaries.iter().map(|b| (*b, U256::zero())).collect());
            for (party, amount) in per_party {
                let entry = balances
                    .get_mut(party)
                    .ok_or(ChannelError::UnknownBeneficiary(*party))?;
                *entry = entry.checked_add(*amount).ok_or(ChannelError::Overflow)?;
            }
        }
        Ok(next)
    }

    /// ABI value under [`FREE_BALANCE_STATE_ENCODING`].
    pub fn to_token(&self) -> Token {
        let tokens = self.balances.keys().copied().map(Token::Address).collect();
        let balances = self
            .balances
            .values()
            .map(|per_party| {
                Token::Array(
                    per_party
                        .iter()
                        .map(|(to, amount)| Token::Tuple(vec![Token::Address(*to), Token::Uint(*amount)]))
                        .collect(),
                )
            })
            .collect();
        let active = self.active_apps.iter().map(Token::bytes32).collect();
        Token::Tuple(vec![Token::Array(tokens), Token::Array(balances), Token::Array(active)])
    }

    /// Inverse of [`FreeBalanceState::to_token`].
    pub fn from_token(token: &Token) -> Result<Self, ChannelError> {
        let bad = || ChannelError::FreeBalanceCorrupt;
        let [tokens, balances, active] = token.as_sequence().ok_or_else(bad)? else {
            return Err(bad());
        };
        let tokens = tokens.as_sequence().ok_or_else(bad)?;
        let balances = balances.as_sequence().ok_or_else(bad)?;
        if tokens.len() != balances.len() {
            return Err(bad());
        }
        let mut out = TokenIndexedCoinTransferMap::new();
        for (t, per_party) in tokens.iter().zip(balances) {
            let t = t.as_address().ok_or_else(bad)?;
            let mut m = CanonicalMap::new();
            for pair in per_party.as_sequence().ok_or_else(bad)? {
                let [to, amount] = pair.as_sequence().ok_or_else(bad)? else {
                    return Err(bad());
                };
                m.insert(to.as_address().ok_or_else(bad)?, amount.as_uint().ok_or_else(bad)?);
            }
            out.insert(t, m);
        }
        let mut active_apps = BTreeSet::new();
        for h in active.as_sequence().ok_or_else(bad)? {
            match h {
                Token::FixedBytes(b) if b.len() == 32 => {
                    active_apps.insert(H256::from_slice(b));
                }
                _ => return Err(bad()),
            }
        }
        Ok(Self { balances: out, active_apps })
    }
}

/// The free-balance app of a freshly set-up channel.
pub fn create_free_balance(
    network: &NetworkContext,
    multisig: Address,
    owners: Vec<Address>,
) -> Result<AppInstance, ChannelError> {
    let state = FreeBalanceState::new(&owners);
    AppInstance::new(
        multisig,
        owners,
        FREE_BALANCE_DEFAULT_TIMEOUT,
        AppInterface {
            addr: network.free_balance_app,
            state_encoding: FREE_BALANCE_STATE_ENCODING.to_string(),
            action_encoding: None,
        },
        0,
        state.to_token(),
        InterpreterParams::MultiAssetMultiPartyCoinTransfer { limit: Vec::new(), token_addresses: Vec::new() },
        false,
    )
}
