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

//! One multisig channel's off-chain state.
//!
//! ## Invariants
//! - participant keys are sorted and fixed at creation;
//! - `app_instances` keys are identity hashes, unique;
//! - the free balance, once set up, is only ever replaced, never removed;
//! - `num_installed_apps` only grows; an app's `app_seq_no` is the counter
//!   value at its install;
//! - per token, collateral = free balance + app deposits + agreement stakes.

use super::{
    agreement::SingleAssetTwoPartyIntermediaryAgreement,
    app_instance::AppInstance,
    derive_multisig_address,
    free_balance::{create_free_balance, FreeBalanceState},
    ChannelError,
};
use crate::core::{
    abi::Token,
    security::xkey::{xkey_kth_address, xkeys_to_sorted_kth_addresses, ExtendedPublicKey},
    types::{
        decode_canonical_limited, encode_canonical, Address, CanonicalMap, CodecError,
        NetworkContext, TokenIndexedCoinTransferMap, H256, U256, CONVENTION_FOR_ETH_TOKEN_ADDRESS,
    },
};
use serde::{Deserialize, Serialize};

/// Snapshot layout version.
pub const STATE_CHANNEL_SCHEMA_VERSION: u32 = 1;

/// Upper bound on an encoded snapshot.
pub const MAX_SNAPSHOT_BYTES: usize = 16 * 1024 * 1024;

/// Key index of a participant's channel identity (free balance, multisig ownership).
pub const CHANNEL_KEY_INDEX: u64 = 0;

/// Off-chain state of one channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChannel {
    /// Snapshot layout version.
    pub schema_version: u32,
    /// Channel multisig.
    pub multisig_address: Address,
    /// Participants, ascending by xpub string.
    pub user_xpubs: Vec<ExtendedPublicKey>,
    /// Apps by identity hash, free balance included.
    pub app_instances: CanonicalMap<H256, AppInstance>,
    /// Identity hash of the free balance once set up.
    pub free_balance_app_identity_hash: Option<H256>,
    /// Lock-up agreements by target virtual app.
    pub single_asset_two_party_intermediary_agreements:
        CanonicalMap<H256, SingleAssetTwoPartyIntermediaryAgreement>,
    /// Installs so far.
    pub num_installed_apps: u64,
    /// Channel between end users of virtual apps; never funded.
    pub is_virtual: bool,
}

impl StateChannel {
    /// Empty channel for `user_xpubs`; multisig derived from the owners.
    pub fn new(network: &NetworkContext, user_xpubs: Vec<ExtendedPublicKey>) -> Result<Self, ChannelError> {
        let mut user_xpubs = user_xpubs;
        user_xpubs.sort();
        user_xpubs.dedup();
        let owners = xkeys_to_sorted_kth_addresses(&user_xpubs, CHANNEL_KEY_INDEX)?;
        Ok(Self {
            schema_version: STATE_CHANNEL_SCHEMA_VERSION,
            multisig_address: derive_multisig_address(network, &owners),
            user_xpubs,
            app_instances: CanonicalMap::new(),
            free_balance_app_identity_hash: None,
            single_asset_two_party_intermediary_agreements: CanonicalMap::new(),
            num_installed_apps: 0,
            is_virtual: false,
        })
    }

    /// Unfunded channel between the end users of a virtual app.
    ///
    /// Key index 0 stays reserved, so the first virtual app gets seq no 1.
    pub fn new_virtual(network: &NetworkContext, user_xpubs: Vec<ExtendedPublicKey>) -> Result<Self, ChannelError> {
        let mut ch = Self::new(network, user_xpubs)?;
        ch.is_virtual = true;
        ch.num_installed_apps = 1;
        Ok(ch)
    }

    /// Owner addresses (index-0 keys), ascending.
    pub fn multisig_owners(&self) -> Result<Vec<Address>, ChannelError> {
        Ok(xkeys_to_sorted_kth_addresses(&self.user_xpubs, CHANNEL_KEY_INDEX)?)
    }

    /// Signing keys for the app with sequence number `app_seq_no`.
    pub fn signing_keys_for(&self, app_seq_no: u64) -> Result<Vec<Address>, ChannelError> {
        Ok(xkeys_to_sorted_kth_addresses(&self.user_xpubs, app_seq_no)?)
    }

    /// Free-balance address of one participant.
    pub fn free_balance_address_of(&self, xpub: &ExtendedPublicKey) -> Result<Address, ChannelError> {
        Ok(xkey_kth_address(xpub, CHANNEL_KEY_INDEX)?)
    }

    /// Whether `xpub` is a participant.
    pub fn has_participant(&self, xpub: &ExtendedPublicKey) -> bool {
        self.user_xpubs.contains(xpub)
    }

    /// Setup has run.
    pub fn is_set_up(&self) -> bool {
        self.free_balance_app_identity_hash.is_some()
    }

    /// Free-balance app.
    pub fn free_balance(&self) -> Result<&AppInstance, ChannelError> {
        let h = self.free_balance_app_identity_hash.ok_or(ChannelError::NotSetUp)?;
        self.app_instances.get(&h).ok_or(ChannelError::NotSetUp)
    }

    /// Decoded free-balance state.
    pub fn free_balance_state(&self) -> Result<FreeBalanceState, ChannelError> {
        FreeBalanceState::from_token(&self.free_balance()?.latest_state)
    }

    /// App by identity hash.
    pub fn get_app_instance(&self, identity_hash: &H256) -> Result<&AppInstance, ChannelError> {
        self.app_instances
            .get(identity_hash)
            .ok_or(ChannelError::NoSuchApp(*identity_hash))
    }

    /// Installed apps other than the free balance.
    pub fn non_free_balance_apps(&self) -> impl Iterator<Item = &AppInstance> {
        let fb = self.free_balance_app_identity_hash;
        self.app_instances
            .iter()
            .filter(move |(h, _)| Some(**h) != fb)
            .map(|(_, a)| a)
    }

    /// Lock-up agreement for a virtual app.
    pub fn get_intermediary_agreement(
        &self,
        target_identity_hash: &H256,
    ) -> Result<&SingleAssetTwoPartyIntermediaryAgreement, ChannelError> {
        self.single_asset_two_party_intermediary_agreements
            .get(target_identity_hash)
            .ok_or(ChannelError::NoSuchAgreement(*target_identity_hash))
    }

    fn with_free_balance(&self, state: &FreeBalanceState) -> Result<Self, ChannelError> {
        let fb = self.free_balance()?;
        let next_fb = fb.set_state(state.to_token(), Some(fb.default_timeout()))?;
        let mut next = self.clone();
        next.app_instances.insert(next_fb.identity_hash(), next_fb);
        Ok(next)
    }

    /// Install the free balance with zero ETH balances.
    pub fn setup(&self, network: &NetworkContext) -> Result<Self, ChannelError> {
        if self.is_set_up() {
            return Err(ChannelError::AlreadySetUp);
        }
        let fb = create_free_balance(network, self.multisig_address, self.multisig_owners()?)?;
        let hash = fb.identity_hash();
        let mut next = self.clone();
        next.app_instances.insert(hash, fb);
        next.free_balance_app_identity_hash = Some(hash);
        next.num_installed_apps = self.num_installed_apps.checked_add(1).ok_or(ChannelError::Overflow)?;
        Ok(next)
    }

    /// Credit collateral observed in the multisig to the free balance.
    ///
    /// The next free-balance commitment of any protocol carries the credit.
    pub fn apply_deposit(&self, increments: &TokenIndexedCoinTransferMap) -> Result<Self, ChannelError> {
        let fb = self.free_balance_state()?.apply_increments(increments)?;
        self.with_free_balance(&fb)
    }

    /// Install `app`, funding it by `decrements` from the free balance.
    pub fn install_app(
        &self,
        app: AppInstance,
        decrements: &TokenIndexedCoinTransferMap,
    ) -> Result<Self, ChannelError> {
        let hash = app.identity_hash();
        if self.app_instances.contains_key(&hash) {
            return Err(ChannelError::AppAlreadyInstalled(hash));
        }
        if app.app_seq_no != self.num_installed_apps {
            return Err(ChannelError::SeqNoMismatch { expected: self.num_installed_apps, got: app.app_seq_no });
        }
        if app.identity.owner != self.multisig_address {
            return Err(ChannelError::OwnerMismatch);
        }
        let mut fb = self.free_balance_state()?.apply_decrements(decrements)?;
        fb.active_apps.insert(hash);
        let mut next = self.with_free_balance(&fb)?;
        next.app_instances.insert(hash, app);
        next.num_installed_apps = self.num_installed_apps.checked_add(1).ok_or(ChannelError::Overflow)?;
        Ok(next)
    }

    /// Remove an app, crediting `increments` to the free balance.
    pub fn uninstall_app(
        &self,
        identity_hash: &H256,
        increments: &TokenIndexedCoinTransferMap,
    ) -> Result<Self, ChannelError> {
        if Some(*identity_hash) == self.free_balance_app_identity_hash {
            return Err(ChannelError::FreeBalanceRemoval);
        }
        if !self.app_instances.contains_key(identity_hash) {
            return Err(ChannelError::AppAlreadyUninstalled(*identity_hash));
        }
        let mut fb = self.free_balance_state()?.apply_increments(increments)?;
        fb.active_apps.remove(identity_hash);
        let mut next = self.with_free_balance(&fb)?;
        next.app_instances.remove(identity_hash);
        Ok(next)
    }

    /// Advance an app to `new_state` at the next version.
    pub fn set_state(
        &self,
        identity_hash: &H256,
        new_state: Token,
        timeout: Option<u64>,
    ) -> Result<Self, ChannelError> {
        let app = self.get_app_instance(identity_hash)?.set_state(new_state, timeout)?;
        let mut next = self.clone();
        next.app_instances.insert(*identity_hash, app);
        Ok(next)
    }

    /// Freeze an app at `version_number`.
    pub fn lock_app_state(&self, identity_hash: &H256, version_number: u64) -> Result<Self, ChannelError> {
        let app = self.get_app_instance(identity_hash)?.lock_state(version_number)?;
        let mut next = self.clone();
        next.app_instances.insert(*identity_hash, app);
        Ok(next)
    }

    /// Record a virtual app on the end users' channel.
    pub fn add_virtual_app_instance(&self, app: AppInstance) -> Result<Self, ChannelError> {
        let hash = app.identity_hash();
        if self.app_instances.contains_key(&hash) {
            return Err(ChannelError::AppAlreadyInstalled(hash));
        }
        if app.app_seq_no != self.num_installed_apps {
            return Err(ChannelError::SeqNoMismatch { expected: self.num_installed_apps, got: app.app_seq_no });
        }
        let mut next = self.clone();
        next.app_instances.insert(hash, app);
        next.num_installed_apps = self.num_installed_apps.checked_add(1).ok_or(ChannelError::Overflow)?;
        Ok(next)
    }

    /// Drop a virtual app from the end users' channel.
    pub fn remove_virtual_app_instance(&self, identity_hash: &H256) -> Result<Self, ChannelError> {
        if !self.app_instances.contains_key(identity_hash) {
            return Err(ChannelError::AppAlreadyUninstalled(*identity_hash));
        }
        let mut next = self.clone();
        next.app_instances.remove(identity_hash);
        Ok(next)
    }

    /// Lock the agreement's stakes out of this leg's free balance.
    pub fn add_single_asset_two_party_intermediary_agreement(
        &self,
        agreement: SingleAssetTwoPartyIntermediaryAgreement,
    ) -> Result<Self, ChannelError> {
        let target = agreement.target_identity_hash;
        if self.single_asset_two_party_intermediary_agreements.contains_key(&target) {
            return Err(ChannelError::AgreementExists(target));
        }
        agreement.capital_provided()?;
        let fb = self.free_balance_state()?.apply_decrements(&agreement.decrements())?;
        let mut next = self.with_free_balance(&fb)?;
        next.single_asset_two_party_intermediary_agreements.insert(target, agreement);
        Ok(next)
    }

    /// ETH lump-sum lock-up for a virtual app on this leg.
    pub fn install_two_party_virtual_eth_as_lump_instances(
        &self,
        target_identity_hash: H256,
        beneficiaries: [Address; 2],
        stakes: [U256; 2],
        expiry_block: u64,
    ) -> Result<Self, ChannelError> {
        self.add_single_asset_two_party_intermediary_agreement(SingleAssetTwoPartyIntermediaryAgreement {
            target_identity_hash,
            token_address: CONVENTION_FOR_ETH_TOKEN_ADDRESS,
            beneficiaries,
            stakes,
            expiry_block,
        })
    }

    /// Unwind an agreement, paying `payouts` to its beneficiaries.
    pub fn remove_single_asset_two_party_intermediary_agreement(
        &self,
        target_identity_hash: &H256,
        payouts: [U256; 2],
    ) -> Result<Self, ChannelError> {
        let agreement = self.get_intermediary_agreement(target_identity_hash)?;
        let fb = self.free_balance_state()?.apply_increments(&agreement.increments(payouts)?)?;
        let mut next = self.with_free_balance(&fb)?;
        next.single_asset_two_party_intermediary_agreements.remove(target_identity_hash);
        Ok(next)
    }

    /// Canonical snapshot bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        encode_canonical(self)
    }

    /// Decode a snapshot.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        decode_canonical_limited(bytes, MAX_SNAPSHOT_BYTES)
    }
}
