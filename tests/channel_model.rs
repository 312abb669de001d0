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

mod common;

use common::{counter_app, game_state, network};
use statechannels::core::{
    model::{outcome::deposits, AppInstance, ChannelError, InterpreterParams, StateChannel},
    security::xkey::{xkey_kth_address, ExtendedPrivateKey, ExtendedPublicKey},
    types::{Address, H256, U256, CONVENTION_FOR_ETH_TOKEN_ADDRESS},
};

fn xpub(seed: u8) -> ExtendedPublicKey {
    ExtendedPrivateKey::from_seed(&[seed; 32]).unwrap().neuter()
}

fn addr(x: &ExtendedPublicKey) -> Address {
    xkey_kth_address(x, 0).unwrap()
}

/// Set-up channel holding 10 ETH for each party.
fn funded() -> (StateChannel, ExtendedPublicKey, ExtendedPublicKey) {
    let (a, b) = (xpub(1), xpub(2));
    let ch = StateChannel::new(&network(), vec![a.clone(), b.clone()])
        .unwrap()
        .setup(&network())
        .unwrap();
    let ch = ch
        .apply_deposit(&deposits(
            CONVENTION_FOR_ETH_TOKEN_ADDRESS,
            &[(addr(&a), U256::from(10)), (addr(&b), U256::from(10))],
        ))
        .unwrap();
    (ch, a, b)
}

fn app_for(ch: &StateChannel, seq: u64, a: &ExtendedPublicKey, b: &ExtendedPublicKey) -> AppInstance {
    AppInstance::new(
        ch.multisig_address,
        ch.signing_keys_for(seq).unwrap(),
        100,
        counter_app(),
        seq,
        game_state([(addr(a), 3), (addr(b), 2)], 0),
        InterpreterParams::SingleAssetTwoPartyCoinTransfer {
            limit: U256::from(5),
            token_address: CONVENTION_FOR_ETH_TOKEN_ADDRESS,
        },
        false,
    )
    .unwrap()
}

fn stakes(a: &ExtendedPublicKey, b: &ExtendedPublicKey, sa: u64, sb: u64) -> statechannels::core::types::TokenIndexedCoinTransferMap {
    deposits(CONVENTION_FOR_ETH_TOKEN_ADDRESS, &[(addr(a), U256::from(sa)), (addr(b), U256::from(sb))])
}

fn eth(ch: &StateChannel, who: &ExtendedPublicKey) -> U256 {
    ch.free_balance_state().unwrap().balance_of(&CONVENTION_FOR_ETH_TOKEN_ADDRESS, &addr(who))
}

#[test]
fn setup_is_once_only() {
    let (ch, _, _) = funded();
    assert!(ch.is_set_up());
    assert!(matches!(ch.setup(&network()), Err(ChannelError::AlreadySetUp)));
    assert_eq!(ch.num_installed_apps, 1);
    assert_eq!(ch.non_free_balance_apps().count(), 0);
}

#[test]
fn uninstall_undoes_install() {
    let (ch, a, b) = funded();
    let app = app_for(&ch, 1, &a, &b);
    let hash = app.identity_hash();
    let installed = ch.install_app(app, &stakes(&a, &b, 3, 2)).unwrap();
    assert_eq!(eth(&installed, &a), U256::from(7));
    assert_eq!(eth(&installed, &b), U256::from(8));
    assert!(installed.free_balance_state().unwrap().active_apps.contains(&hash));

    let removed = installed.uninstall_app(&hash, &stakes(&a, &b, 3, 2)).unwrap();
    assert_eq!(removed.free_balance_state().unwrap(), ch.free_balance_state().unwrap());
    assert!(removed.get_app_instance(&hash).is_err());
    assert_eq!(removed.num_installed_apps, 2);
}

#[test]
fn underfunded_install_leaves_snapshot_untouched() {
    let (ch, a, b) = funded();
    let before = ch.clone();
    let err = ch.install_app(app_for(&ch, 1, &a, &b), &stakes(&a, &b, 11, 0)).unwrap_err();
    assert!(matches!(err, ChannelError::Underflow { .. }));
    assert_eq!(ch, before);
}

#[test]
fn install_checks_sequence_and_duplicates() {
    let (ch, a, b) = funded();
    let err = ch.install_app(app_for(&ch, 2, &a, &b), &stakes(&a, &b, 0, 0)).unwrap_err();
    assert!(matches!(err, ChannelError::SeqNoMismatch { expected: 1, got: 2 }));

    let app = app_for(&ch, 1, &a, &b);
    let once = ch.install_app(app.clone(), &stakes(&a, &b, 0, 0)).unwrap();
    let err = once.install_app(app, &stakes(&a, &b, 0, 0)).unwrap_err();
    assert!(matches!(err, ChannelError::AppAlreadyInstalled(_)));
}

#[test]
fn free_balance_cannot_be_uninstalled() {
    let (ch, a, b) = funded();
    let fb = ch.free_balance_app_identity_hash.unwrap();
    let err = ch.uninstall_app(&fb, &stakes(&a, &b, 0, 0)).unwrap_err();
    assert!(matches!(err, ChannelError::FreeBalanceRemoval));
    let err = ch.uninstall_app(&H256::repeat_byte(9), &stakes(&a, &b, 0, 0)).unwrap_err();
    assert!(matches!(err, ChannelError::AppAlreadyUninstalled(_)));
}

#[test]
fn locked_app_refuses_new_states() {
    let (ch, a, b) = funded();
    let app = app_for(&ch, 1, &a, &b);
    let hash = app.identity_hash();
    let ch = ch.install_app(app, &stakes(&a, &b, 3, 2)).unwrap();
    let ch = ch.set_state(&hash, game_state([(addr(&a), 1), (addr(&b), 4)], 1), None).unwrap();
    assert_eq!(ch.get_app_instance(&hash).unwrap().latest_version_number, 1);

    assert!(matches!(
        ch.lock_app_state(&hash, 0),
        Err(ChannelError::StaleVersion { current: 1, requested: 0 })
    ));
    let locked = ch.lock_app_state(&hash, 1).unwrap();
    assert!(matches!(
        locked.set_state(&hash, game_state([(addr(&a), 0), (addr(&b), 5)], 2), None),
        Err(ChannelError::AppLocked(_))
    ));
}

#[test]
fn agreement_locks_and_releases_stakes() {
    let (ch, a, b) = funded();
    let target = H256::repeat_byte(0x77);
    let locked = ch
        .install_two_party_virtual_eth_as_lump_instances(
            target,
            [addr(&a), addr(&b)],
            [U256::from(3), U256::from(2)],
            1_000,
        )
        .unwrap();
    assert_eq!(eth(&locked, &a), U256::from(7));
    assert_eq!(eth(&locked, &b), U256::from(8));
    assert!(matches!(
        locked.install_two_party_virtual_eth_as_lump_instances(
            target,
            [addr(&a), addr(&b)],
            [U256::one(), U256::one()],
            1_000
        ),
        Err(ChannelError::AgreementExists(_))
    ));

    let released = locked
        .remove_single_asset_two_party_intermediary_agreement(&target, [U256::from(1), U256::from(4)])
        .unwrap();
    assert_eq!(eth(&released, &a), U256::from(8));
    assert_eq!(eth(&released, &b), U256::from(12));
    assert!(released.get_intermediary_agreement(&target).is_err());
}

#[test]
fn snapshot_bytes_are_canonical() {
    let (ch, a, b) = funded();
    let ch = ch.install_app(app_for(&ch, 1, &a, &b), &stakes(&a, &b, 3, 2)).unwrap();
    let bytes = ch.to_bytes().unwrap();
    let back = StateChannel::from_bytes(&bytes).unwrap();
    assert_eq!(back, ch);
    assert_eq!(back.to_bytes().unwrap(), bytes);
    assert!(StateChannel::from_bytes(&bytes[..bytes.len() / 2]).is_err());
}
