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

use proptest::prelude::*;
use statechannels::core::{
    abi::{decode_single, parse_param_type},
    commitments::{AppIdentity, SetStateCommitment},
    model::{outcome::deposits, StateChannel},
    security::{
        signatures::sign_digest,
        xkey::{xkey_kth_address, xkey_kth_secret, ExtendedPrivateKey},
    },
    types::{Address, H256, U256, CONVENTION_FOR_ETH_TOKEN_ADDRESS},
};

fn commitment(version: u64, timeout: u64, state: [u8; 32]) -> SetStateCommitment {
    let identity = AppIdentity {
        owner: Address::repeat_byte(0xaa),
        signing_keys: vec![Address::repeat_byte(0x01), Address::repeat_byte(0x02)],
        app_definition: Address::repeat_byte(0xc0),
        default_timeout: U256::from(100),
    };
    SetStateCommitment::new(
        &common::network(),
        identity,
        H256::from(state),
        U256::from(version),
        U256::from(timeout),
    )
}

proptest! {
    #[test]
    fn prop_set_state_digest_tracks_version(
        version in 0u64..u64::MAX,
        timeout in any::<u64>(),
        state in any::<[u8; 32]>(),
    ) {
        let c = commitment(version, timeout, state);
        prop_assert_eq!(c.hash_to_sign(), commitment(version, timeout, state).hash_to_sign());
        prop_assert_ne!(c.hash_to_sign(), commitment(version + 1, timeout, state).hash_to_sign());
    }

    #[test]
    fn prop_transaction_ignores_signature_order(
        seed_a in 1u8..=127,
        seed_b in 128u8..=255,
        state in any::<[u8; 32]>(),
    ) {
        let c = commitment(1, 100, state);
        let digest = c.hash_to_sign();
        let sigs: Vec<_> = [seed_a, seed_b]
            .iter()
            .map(|s| {
                let xprv = ExtendedPrivateKey::from_seed(&[*s; 32]).unwrap();
                sign_digest(&xkey_kth_secret(&xprv, 1).unwrap(), &digest)
            })
            .collect();
        let reversed: Vec<_> = sigs.iter().rev().cloned().collect();
        prop_assert_eq!(c.signed_transaction(&sigs).unwrap(), c.signed_transaction(&reversed).unwrap());
    }

    #[test]
    fn prop_snapshot_bytes_ignore_deposit_order(amounts in prop::collection::vec(0u64..1_000_000, 2)) {
        let xpubs: Vec<_> = [1u8, 2]
            .iter()
            .map(|s| ExtendedPrivateKey::from_seed(&[*s; 32]).unwrap().neuter())
            .collect();
        let network = common::network();
        let base = StateChannel::new(&network, xpubs.clone()).unwrap().setup(&network).unwrap();
        let credits: Vec<_> = xpubs
            .iter()
            .zip(&amounts)
            .map(|(x, amt)| (xkey_kth_address(x, 0).unwrap(), U256::from(*amt)))
            .collect();
        let reversed: Vec<_> = credits.iter().rev().cloned().collect();

        let one = base.apply_deposit(&deposits(CONVENTION_FOR_ETH_TOKEN_ADDRESS, &credits)).unwrap();
        let two = base.apply_deposit(&deposits(CONVENTION_FOR_ETH_TOKEN_ADDRESS, &reversed)).unwrap();
        prop_assert_eq!(one.to_bytes().unwrap(), two.to_bytes().unwrap());
    }

    #[test]
    fn prop_state_decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let ty = parse_param_type(common::STATE_ENCODING).unwrap();
        let _ = decode_single(&ty, &bytes);
    }
}
