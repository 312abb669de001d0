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

//! Interpreting an app outcome into free-balance increments.

use super::{app_instance::InterpreterParams, ChannelError};
use crate::core::{
    abi::{decode_single, parse_param_type, Token},
    types::{Address, CanonicalMap, TokenIndexedCoinTransferMap, U256},
};

const TWO_PARTY_FIXED_OUTCOME: &str = "uint256";
const SINGLE_ASSET_TWO_PARTY_TRANSFERS: &str = "tuple(address to, uint256 amount)[2]";
const MULTI_ASSET_TRANSFERS: &str = "tuple(address to, uint256 amount)[][]";

/// Fixed outcome values.
pub mod fixed_outcome {
    /// Whole amount to the first player.
    pub const SEND_TO_ADDR_ONE: u64 = 0;
    /// Whole amount to the second player.
    pub const SEND_TO_ADDR_TWO: u64 = 1;
    /// Half each; the odd unit goes to the first player.
    pub const SPLIT_AND_SEND_TO_BOTH_ADDRS: u64 = 2;
}

fn invalid(msg: &str) -> ChannelError {
    ChannelError::InvalidOutcome(msg.to_string())
}

fn decode(encoding: &str, outcome: &[u8]) -> Result<Token, ChannelError> {
    let ty = parse_param_type(encoding).map_err(|_| invalid("outcome type"))?;
    decode_single(&ty, outcome).map_err(|_| invalid("outcome does not decode"))
}

fn transfers(list: &Token) -> Result<Vec<(Address, U256)>, ChannelError> {
    list.as_sequence()
        .ok_or_else(|| invalid("transfer list"))?
        .iter()
        .map(|t| match t.as_sequence() {
            Some([to, amount]) => Ok((
                to.as_address().ok_or_else(|| invalid("transfer recipient"))?,
                amount.as_uint().ok_or_else(|| invalid("transfer amount"))?,
            )),
            _ => Err(invalid("transfer entry")),
        })
        .collect()
}

/// Decode a `tuple(address to, uint256 amount)[2]` outcome.
pub fn decode_two_party_coin_transfers(outcome: &[u8]) -> Result<[(Address, U256); 2], ChannelError> {
    let list = transfers(&decode(SINGLE_ASSET_TWO_PARTY_TRANSFERS, outcome)?)?;
    match list.as_slice() {
        [a, b] => Ok([*a, *b]),
        _ => Err(invalid("expected two transfers")),
    }
}

fn credit(
    out: &mut TokenIndexedCoinTransferMap,
    token: Address,
    to: Address,
    amount: U256,
    participants: &[Address],
) -> Result<(), ChannelError> {
    if !participants.contains(&to) {
        return Err(invalid("recipient is not a participant"));
    }
    let slot = out.entry(token).or_default().entry(to).or_insert_with(U256::zero);
    *slot = slot.checked_add(amount).ok_or(ChannelError::Overflow)?;
    Ok(())
}

fn checked_total(list: &[(Address, U256)]) -> Result<U256, ChannelError> {
    list.iter()
        .try_fold(U256::zero(), |acc, (_, a)| acc.checked_add(*a))
        .ok_or(ChannelError::Overflow)
}

/// Increments owed to `participants` when an app with `params` resolves to `outcome`.
pub fn compute_token_indexed_increments(
    outcome: &[u8],
    params: &InterpreterParams,
    participants: &[Address],
) -> Result<TokenIndexedCoinTransferMap, ChannelError> {
    let mut out = TokenIndexedCoinTransferMap::new();
    match params {
        InterpreterParams::TwoPartyFixedOutcome { player_addrs, amount, token_address } => {
            let v = decode(TWO_PARTY_FIXED_OUTCOME, outcome)?
                .as_uint()
                .ok_or_else(|| invalid("fixed outcome"))?;
            if v > U256::from(u64::MAX) {
                return Err(invalid("unknown fixed outcome"));
            }
            let half = *amount / U256::from(2u64);
            let shares = match v.low_u64() {
                fixed_outcome::SEND_TO_ADDR_ONE => [*amount, U256::zero()],
                fixed_outcome::SEND_TO_ADDR_TWO => [U256::zero(), *amount],
                fixed_outcome::SPLIT_AND_SEND_TO_BOTH_ADDRS => [*amount - half, half],
                _ => return Err(invalid("unknown fixed outcome")),
            };
            for (to, share) in player_addrs.iter().zip(shares) {
                credit(&mut out, *token_address, *to, share, participants)?;
            }
        }
        InterpreterParams::SingleAssetTwoPartyCoinTransfer { limit, token_address } => {
            let list = decode_two_party_coin_transfers(outcome)?;
            if checked_total(&list)? > *limit {
                return Err(invalid("transfers exceed limit"));
            }
            for (to, amount) in list {
                credit(&mut out, *token_address, to, amount, participants)?;
            }
        }
        InterpreterParams::MultiAssetMultiPartyCoinTransfer { limit, token_addresses } => {
            let decoded = decode(MULTI_ASSET_TRANSFERS, outcome)?;
            let per_token = decoded.as_sequence().ok_or_else(|| invalid("per-token lists"))?;
            if per_token.len() != token_addresses.len() || limit.len() != token_addresses.len() {
                return Err(invalid("token count mismatch"));
            }
            for ((list, token), cap) in per_token.iter().zip(token_addresses).zip(limit) {
                let list = transfers(list)?;
                if checked_total(&list)? > *cap {
                    return Err(invalid("transfers exceed limit"));
                }
                for (to, amount) in list {
                    credit(&mut out, *token, to, amount, participants)?;
                }
            }
        }
    }
    // Zero entries keep every participant visible in the increments map.
    for per_party in out.values_mut() {
        for p in participants {
            per_party.entry(*p).or_insert_with(U256::zero);
        }
    }
    Ok(out)
}

/// Decrements for an install where each party deposits one amount in one token.
pub fn deposits(token: Address, amounts: &[(Address, U256)]) -> TokenIndexedCoinTransferMap {
    let mut inner = CanonicalMap::new();
    for (party, amount) in amounts {
        let slot = inner.entry(*party).or_insert_with(U256::zero);
        *slot = slot.saturating_add(*amount);
    }
    let mut out = TokenIndexedCoinTransferMap::new();
    out.insert(token, inner);
    out
}
