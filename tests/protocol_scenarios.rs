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

use common::*;
use statechannels::core::{
    protocol::{
        params::{
            InstallVirtualAppParams, SetupParams, TakeActionParams, UninstallParams,
            UninstallVirtualAppParams, UpdateParams,
        },
        CommitmentKey, Protocol, ProtocolError, ProtocolParams,
    },
    runtime::{MemoryHub, ProtocolRunner, RunnerConfig},
    security::{
        keystore::{Keystore, Signer},
        signatures::recover_address,
        xkey::xkey_kth_address,
    },
    store::{MemoryStore, Store},
    types::U256,
};
use statechannels::monitoring::metrics::Metrics;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn setup_gives_both_sides_the_same_channel() {
    let hub = MemoryHub::new();
    let a = node(&hub, 1);
    let b = node(&hub, 2);
    let multisig = setup(&hub, &a, &b).await;

    let ca = a.channel(&multisig).await;
    let cb = b.channel(&multisig).await;
    assert_eq!(ca, cb);
    assert!(ca.is_set_up());
    assert_eq!(ca.num_installed_apps, 1);
    assert_eq!(a.eth_balance(&multisig, &a.address()).await, U256::zero());
    assert_eq!(a.eth_balance(&multisig, &b.address()).await, U256::zero());

    for n in [&a, &b] {
        let signed = n
            .store
            .get_commitment(Protocol::Setup, &CommitmentKey::Multisig(multisig))
            .await
            .unwrap()
            .expect("setup commitment");
        assert_eq!(signed.signatures.len(), 2);
        let tx = signed.transaction().unwrap();
        assert_eq!(tx.to, multisig);
    }
}

#[tokio::test]
async fn runner_reports_into_metrics() {
    let hub = MemoryHub::new();
    let metrics = Arc::new(Metrics::new().unwrap());
    let signer: Arc<dyn Signer> = Arc::new(Keystore::from_seed(&[1; 32]).unwrap());
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let runner = ProtocolRunner::with_metrics(
        network(),
        signer,
        hub.transport(),
        store.clone(),
        Arc::new(CounterOracle),
        RunnerConfig::default(),
        metrics.clone(),
    );
    hub.register(runner.clone());
    let a = Node { xpub: runner.xpub().clone(), runner, store };
    let b = node(&hub, 2);
    setup(&hub, &a, &b).await;

    let setup_label = [Protocol::Setup.as_str()];
    assert_eq!(metrics.runs_started_total.with_label_values(&setup_label).get(), 1);
    assert_eq!(metrics.runs_completed_total.with_label_values(&setup_label).get(), 1);
    assert!(metrics.commitments_written_total.get() >= 1);
    assert_eq!(metrics.active_executions.get(), 0);

    assert!(a.runner.on_bytes(&[0xff, 0x00, 0x13]).await.is_err());
    assert_eq!(metrics.invalid_msg_total.get(), 1);
}

#[tokio::test]
async fn second_setup_of_a_channel_is_refused() {
    let hub = MemoryHub::new();
    let a = node(&hub, 1);
    let b = node(&hub, 2);
    let multisig = setup(&hub, &a, &b).await;
    let err = a
        .runner
        .initiate(ProtocolParams::Setup(SetupParams {
            initiator_xpub: a.xpub.clone(),
            responder_xpub: b.xpub.clone(),
            multisig_address: multisig,
        }))
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::ChannelAlreadyExists(m) if m == multisig));
}

#[tokio::test]
async fn install_then_uninstall_restores_free_balance() {
    let hub = MemoryHub::new();
    let a = node(&hub, 1);
    let b = node(&hub, 2);
    let multisig = setup(&hub, &a, &b).await;
    deposit(&[&a, &b], &multisig, &[(a.address(), 10), (b.address(), 10)]).await;
    let before = a.channel(&multisig).await.free_balance_state().unwrap().balances;

    a.runner
        .initiate(ProtocolParams::Install(install_params(&a, &b, multisig, [3, 2])))
        .await
        .unwrap();
    hub.settle().await;

    assert_eq!(a.channel(&multisig).await, b.channel(&multisig).await);
    assert_eq!(a.eth_balance(&multisig, &a.address()).await, U256::from(7));
    assert_eq!(a.eth_balance(&multisig, &b.address()).await, U256::from(8));
    let app = app_at(&a, &multisig, 1).await;
    let fb = a.channel(&multisig).await.free_balance_state().unwrap();
    assert!(fb.active_apps.contains(&app));
    for n in [&a, &b] {
        let cond = n.store.get_commitment(Protocol::Install, &CommitmentKey::App(app)).await.unwrap();
        assert_eq!(cond.unwrap().signatures.len(), 2);
    }

    a.runner
        .initiate(ProtocolParams::Uninstall(UninstallParams {
            initiator_xpub: a.xpub.clone(),
            responder_xpub: b.xpub.clone(),
            multisig_address: multisig,
            app_identity_hash: app,
        }))
        .await
        .unwrap();
    hub.settle().await;

    let ca = a.channel(&multisig).await;
    assert_eq!(ca, b.channel(&multisig).await);
    assert!(ca.get_app_instance(&app).is_err());
    let after = ca.free_balance_state().unwrap();
    assert_eq!(after.balances, before);
    assert!(after.active_apps.is_empty());
    assert_eq!(ca.num_installed_apps, 2);
    for n in [&a, &b] {
        assert!(n
            .store
            .get_commitment(Protocol::Uninstall, &CommitmentKey::App(app))
            .await
            .unwrap()
            .is_some());
    }
}

#[tokio::test]
async fn install_beyond_free_balance_is_rejected_locally() {
    let hub = MemoryHub::new();
    let a = node(&hub, 1);
    let b = node(&hub, 2);
    let multisig = setup(&hub, &a, &b).await;
    deposit(&[&a, &b], &multisig, &[(a.address(), 1), (b.address(), 1)]).await;
    let before = a.channel(&multisig).await;

    let err = a
        .runner
        .initiate(ProtocolParams::Install(install_params(&a, &b, multisig, [3, 0])))
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::Channel(_)));
    hub.settle().await;
    assert_eq!(a.channel(&multisig).await, before);
    assert_eq!(b.channel(&multisig).await, before);
}

#[tokio::test]
async fn update_then_uninstall_pays_the_new_outcome() {
    let hub = MemoryHub::new();
    let a = node(&hub, 1);
    let b = node(&hub, 2);
    let multisig = setup(&hub, &a, &b).await;
    deposit(&[&a, &b], &multisig, &[(a.address(), 10), (b.address(), 10)]).await;
    a.runner
        .initiate(ProtocolParams::Install(install_params(&a, &b, multisig, [3, 2])))
        .await
        .unwrap();
    hub.settle().await;
    let app = app_at(&a, &multisig, 1).await;

    let new_state = game_state([(a.address(), 0), (b.address(), 5)], 7);
    a.runner
        .initiate(ProtocolParams::Update(UpdateParams {
            initiator_xpub: a.xpub.clone(),
            responder_xpub: b.xpub.clone(),
            multisig_address: multisig,
            app_identity_hash: app,
            new_state: new_state.clone(),
            timeout: Some(50),
        }))
        .await
        .unwrap();
    hub.settle().await;

    for n in [&a, &b] {
        let ch = n.channel(&multisig).await;
        let inst = ch.get_app_instance(&app).unwrap();
        assert_eq!(inst.latest_state, new_state);
        assert_eq!(inst.latest_version_number, 1);
        assert_eq!(inst.latest_timeout, 50);
        let signed = n
            .store
            .get_commitment(Protocol::Update, &CommitmentKey::App(app))
            .await
            .unwrap()
            .expect("set-state commitment");
        assert_eq!(signed.signatures.len(), 2);
    }

    // The responder switches roles for the teardown.
    b.runner
        .initiate(ProtocolParams::Uninstall(UninstallParams {
            initiator_xpub: b.xpub.clone(),
            responder_xpub: a.xpub.clone(),
            multisig_address: multisig,
            app_identity_hash: app,
        }))
        .await
        .unwrap();
    hub.settle().await;

    assert_eq!(a.eth_balance(&multisig, &a.address()).await, U256::from(7));
    assert_eq!(a.eth_balance(&multisig, &b.address()).await, U256::from(13));
    assert_eq!(a.channel(&multisig).await, b.channel(&multisig).await);
}

#[tokio::test]
async fn take_action_runs_through_the_oracle() {
    let hub = MemoryHub::new();
    let a = node(&hub, 1);
    let b = node(&hub, 2);
    let multisig = setup(&hub, &a, &b).await;
    deposit(&[&a, &b], &multisig, &[(a.address(), 10), (b.address(), 10)]).await;
    a.runner
        .initiate(ProtocolParams::Install(install_params(&a, &b, multisig, [3, 2])))
        .await
        .unwrap();
    hub.settle().await;
    let app = app_at(&a, &multisig, 1).await;

    let action = |by| {
        ProtocolParams::TakeAction(TakeActionParams {
            initiator_xpub: a.xpub.clone(),
            responder_xpub: b.xpub.clone(),
            multisig_address: multisig,
            app_identity_hash: app,
            action: increment(by),
        })
    };
    a.runner.initiate(action(4)).await.unwrap();
    hub.settle().await;

    let expected = game_state([(a.address(), 3), (b.address(), 2)], 4);
    for n in [&a, &b] {
        let inst = n.channel(&multisig).await.get_app_instance(&app).unwrap().clone();
        assert_eq!(inst.latest_state, expected);
        assert_eq!(inst.latest_version_number, 1);
        assert!(n
            .store
            .get_commitment(Protocol::TakeAction, &CommitmentKey::App(app))
            .await
            .unwrap()
            .is_some());
    }

    let err = a.runner.initiate(action(0)).await.unwrap_err();
    assert!(matches!(err, ProtocolError::InvalidAction(_)));
    hub.settle().await;
    let inst = b.channel(&multisig).await.get_app_instance(&app).unwrap().clone();
    assert_eq!(inst.latest_version_number, 1);
}

#[tokio::test]
async fn concurrent_actions_on_one_app_are_serialized() {
    let hub = MemoryHub::new();
    let a = node(&hub, 1);
    let b = node(&hub, 2);
    let multisig = setup(&hub, &a, &b).await;
    deposit(&[&a, &b], &multisig, &[(a.address(), 10), (b.address(), 10)]).await;
    a.runner
        .initiate(ProtocolParams::Install(install_params(&a, &b, multisig, [3, 2])))
        .await
        .unwrap();
    hub.settle().await;
    let app = app_at(&a, &multisig, 1).await;

    let action = |by| {
        ProtocolParams::TakeAction(TakeActionParams {
            initiator_xpub: a.xpub.clone(),
            responder_xpub: b.xpub.clone(),
            multisig_address: multisig,
            app_identity_hash: app,
            action: increment(by),
        })
    };
    let (r1, r2) = futures::join!(a.runner.initiate(action(3)), a.runner.initiate(action(4)));
    r1.unwrap();
    r2.unwrap();
    hub.settle().await;

    for n in [&a, &b] {
        let inst = n.channel(&multisig).await.get_app_instance(&app).unwrap().clone();
        assert_eq!(inst.latest_version_number, 2);
        assert_eq!(inst.latest_state, game_state([(a.address(), 3), (b.address(), 2)], 7));
    }
}

#[tokio::test]
async fn unanswered_install_times_out_and_changes_nothing() {
    let hub = MemoryHub::new();
    let a = node_with(&hub, 1, Arc::new(MemoryStore::new()), Duration::from_millis(200));
    let b = node(&hub, 2);
    let multisig = setup(&hub, &a, &b).await;
    deposit(&[&a, &b], &multisig, &[(a.address(), 10), (b.address(), 10)]).await;
    let before = a.channel(&multisig).await;

    hub.disconnect(&b.xpub);
    let err = a
        .runner
        .initiate(ProtocolParams::Install(install_params(&a, &b, multisig, [3, 2])))
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::ProtocolTimeout(_)));
    hub.settle().await;

    assert_eq!(a.channel(&multisig).await, before);
    assert!(a.store.unfinished_executions().await.unwrap().is_empty());

    // The channel stays usable once the peer is back.
    hub.reconnect(&b.xpub);
    a.runner
        .initiate(ProtocolParams::Install(install_params(&a, &b, multisig, [3, 2])))
        .await
        .unwrap();
    hub.settle().await;
    assert_eq!(a.channel(&multisig).await, b.channel(&multisig).await);
}

#[tokio::test]
async fn only_the_initiator_can_start_a_run() {
    let hub = MemoryHub::new();
    let a = node(&hub, 1);
    let b = node(&hub, 2);
    let multisig = multisig_of(&a, &b);
    let err = b
        .runner
        .initiate(ProtocolParams::Setup(SetupParams {
            initiator_xpub: a.xpub.clone(),
            responder_xpub: b.xpub.clone(),
            multisig_address: multisig,
        }))
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::UnexpectedMessage(_)));
}

struct Triangle {
    hub: Arc<MemoryHub>,
    i: Node,
    h: Node,
    r: Node,
    ih: statechannels::core::types::Address,
    hr: statechannels::core::types::Address,
}

async fn triangle() -> Triangle {
    let hub = MemoryHub::new();
    let i = node(&hub, 1);
    let h = node(&hub, 2);
    let r = node(&hub, 3);
    let ih = setup(&hub, &i, &h).await;
    let hr = setup(&hub, &h, &r).await;
    deposit(&[&i, &h], &ih, &[(i.address(), 10), (h.address(), 10)]).await;
    deposit(&[&h, &r], &hr, &[(h.address(), 10), (r.address(), 10)]).await;
    Triangle { hub, i, h, r, ih, hr }
}

fn virtual_install(t: &Triangle) -> InstallVirtualAppParams {
    InstallVirtualAppParams {
        initiator_xpub: t.i.xpub.clone(),
        intermediary_xpub: t.h.xpub.clone(),
        responder_xpub: t.r.xpub.clone(),
        app_interface: counter_app(),
        initial_state: game_state([(t.i.address(), 3), (t.r.address(), 2)], 0),
        default_timeout: 100,
        initiator_balance_decrement: U256::from(3),
        responder_balance_decrement: U256::from(2),
        app_seq_no: 1,
        expiry_block: 1_000,
    }
}

#[tokio::test]
async fn virtual_app_installs_and_uninstalls_through_the_hub() {
    let t = triangle().await;
    t.i.runner
        .initiate(ProtocolParams::InstallVirtualApp(virtual_install(&t)))
        .await
        .unwrap();
    t.hub.settle().await;

    // Capital is locked on both legs.
    assert_eq!(t.i.eth_balance(&t.ih, &t.i.address()).await, U256::from(7));
    assert_eq!(t.h.eth_balance(&t.ih, &t.h.address()).await, U256::from(8));
    assert_eq!(t.h.eth_balance(&t.hr, &t.h.address()).await, U256::from(7));
    assert_eq!(t.r.eth_balance(&t.hr, &t.r.address()).await, U256::from(8));
    assert_eq!(t.i.channel(&t.ih).await, t.h.channel(&t.ih).await);
    assert_eq!(t.h.channel(&t.hr).await, t.r.channel(&t.hr).await);

    // Only the end users hold the virtual channel.
    let vc_addr = multisig_of(&t.i, &t.r);
    let vc = t.i.channel(&vc_addr).await;
    assert!(vc.is_virtual);
    assert_eq!(vc, t.r.channel(&vc_addr).await);
    assert!(t.h.store.get_state_channel(&vc_addr).await.unwrap().is_none());
    let target = app_at(&t.i, &vc_addr, 1).await;
    assert!(t.i.channel(&t.ih).await.get_intermediary_agreement(&target).is_ok());
    assert!(t.r.channel(&t.hr).await.get_intermediary_agreement(&target).is_ok());

    let final_state = game_state([(t.i.address(), 1), (t.r.address(), 4)], 9);
    t.i.runner
        .initiate(ProtocolParams::UninstallVirtualApp(UninstallVirtualAppParams {
            initiator_xpub: t.i.xpub.clone(),
            intermediary_xpub: t.h.xpub.clone(),
            responder_xpub: t.r.xpub.clone(),
            target_app_identity_hash: target,
            app_interface: counter_app(),
            app_seq_no: 1,
            default_timeout: 100,
            final_state: final_state.clone(),
            final_version_number: 1,
            outcome: outcome_of(&final_state),
        }))
        .await
        .unwrap();
    t.hub.settle().await;

    // Payouts [1, 4] flow along both legs; each leg conserves its total.
    assert_eq!(t.i.eth_balance(&t.ih, &t.i.address()).await, U256::from(8));
    assert_eq!(t.i.eth_balance(&t.ih, &t.h.address()).await, U256::from(12));
    assert_eq!(t.h.eth_balance(&t.hr, &t.h.address()).await, U256::from(8));
    assert_eq!(t.h.eth_balance(&t.hr, &t.r.address()).await, U256::from(12));
    assert_eq!(t.i.channel(&t.ih).await, t.h.channel(&t.ih).await);
    assert_eq!(t.h.channel(&t.hr).await, t.r.channel(&t.hr).await);
    for n in [&t.i, &t.r] {
        let vc = n.channel(&vc_addr).await;
        assert!(vc.get_app_instance(&target).is_err());
        assert!(n
            .store
            .get_commitment(Protocol::UninstallVirtualApp, &CommitmentKey::App(target))
            .await
            .unwrap()
            .is_some());
    }
    assert!(t.i.channel(&t.ih).await.get_intermediary_agreement(&target).is_err());
}

#[tokio::test]
async fn intermediary_signature_covers_only_its_own_digest() {
    let t = triangle().await;
    t.i.runner
        .initiate(ProtocolParams::InstallVirtualApp(virtual_install(&t)))
        .await
        .unwrap();
    t.hub.settle().await;

    let vc_addr = multisig_of(&t.i, &t.r);
    let target = app_at(&t.i, &vc_addr, 1).await;
    let hub_address = xkey_kth_address(&t.h.xpub, 0).unwrap();
    for n in [&t.i, &t.r] {
        let signed = n
            .store
            .get_commitment(Protocol::InstallVirtualApp, &CommitmentKey::App(target))
            .await
            .unwrap()
            .expect("target commitment");
        let int = signed.intermediary_signature.clone().expect("intermediary signature");
        let int_digest = signed.commitment.hash_to_sign_as_intermediary().unwrap();
        assert_eq!(recover_address(&int_digest, &int).unwrap(), hub_address);
        assert_ne!(recover_address(&signed.commitment.hash_to_sign(), &int).unwrap(), hub_address);

        let signers: Vec<_> = signed
            .signatures
            .iter()
            .map(|s| recover_address(&signed.commitment.hash_to_sign(), s).unwrap())
            .collect();
        assert!(signers.contains(&xkey_kth_address(&t.i.xpub, 1).unwrap()));
        assert!(signers.contains(&xkey_kth_address(&t.r.xpub, 1).unwrap()));
        assert!(signed.transaction().is_ok());
    }
    assert!(t
        .h
        .store
        .get_commitment(Protocol::InstallVirtualApp, &CommitmentKey::App(target))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn virtual_uninstall_with_wrong_outcome_is_refused() {
    let t = triangle().await;
    t.i.runner
        .initiate(ProtocolParams::InstallVirtualApp(virtual_install(&t)))
        .await
        .unwrap();
    t.hub.settle().await;
    let vc_addr = multisig_of(&t.i, &t.r);
    let target = app_at(&t.i, &vc_addr, 1).await;
    let before = t.i.channel(&t.ih).await;

    let final_state = game_state([(t.i.address(), 1), (t.r.address(), 4)], 9);
    let claimed = game_state([(t.i.address(), 5), (t.r.address(), 0)], 9);
    let err = t
        .i
        .runner
        .initiate(ProtocolParams::UninstallVirtualApp(UninstallVirtualAppParams {
            initiator_xpub: t.i.xpub.clone(),
            intermediary_xpub: t.h.xpub.clone(),
            responder_xpub: t.r.xpub.clone(),
            target_app_identity_hash: target,
            app_interface: counter_app(),
            app_seq_no: 1,
            default_timeout: 100,
            final_state,
            final_version_number: 1,
            outcome: outcome_of(&claimed),
        }))
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::OutcomeMismatch));
    t.hub.settle().await;
    assert_eq!(t.i.channel(&t.ih).await, before);
    assert_eq!(t.h.channel(&t.ih).await, before);
}

#[tokio::test]
async fn virtual_uninstall_cannot_rewrite_an_agreed_version() {
    let t = triangle().await;
    t.i.runner
        .initiate(ProtocolParams::InstallVirtualApp(virtual_install(&t)))
        .await
        .unwrap();
    t.hub.settle().await;
    let vc_addr = multisig_of(&t.i, &t.r);
    let target = app_at(&t.i, &vc_addr, 1).await;
    let (ih_before, hr_before) = (t.i.channel(&t.ih).await, t.r.channel(&t.hr).await);

    // Version 0 was agreed as 3/2; claim it said 5/0.
    let forged = game_state([(t.i.address(), 5), (t.r.address(), 0)], 0);
    let err = t
        .i
        .runner
        .initiate(ProtocolParams::UninstallVirtualApp(UninstallVirtualAppParams {
            initiator_xpub: t.i.xpub.clone(),
            intermediary_xpub: t.h.xpub.clone(),
            responder_xpub: t.r.xpub.clone(),
            target_app_identity_hash: target,
            app_interface: counter_app(),
            app_seq_no: 1,
            default_timeout: 100,
            final_state: forged.clone(),
            final_version_number: 0,
            outcome: outcome_of(&forged),
        }))
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::StaleState(0)));
    assert_eq!(err.kind(), "stale_state");
    t.hub.settle().await;

    assert_eq!(t.i.channel(&t.ih).await, ih_before);
    assert_eq!(t.h.channel(&t.ih).await, ih_before);
    assert_eq!(t.r.channel(&t.hr).await, hr_before);
    assert!(t.i.channel(&vc_addr).await.get_app_instance(&target).is_ok());
    assert!(t
        .i
        .store
        .get_commitment(Protocol::UninstallVirtualApp, &CommitmentKey::App(target))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn uninstall_of_an_outcome_over_the_limit_is_an_invalid_outcome() {
    let hub = MemoryHub::new();
    let a = node(&hub, 1);
    let b = node(&hub, 2);
    let multisig = setup(&hub, &a, &b).await;
    deposit(&[&a, &b], &multisig, &[(a.address(), 10), (b.address(), 10)]).await;
    a.runner
        .initiate(ProtocolParams::Install(install_params(&a, &b, multisig, [3, 2])))
        .await
        .unwrap();
    hub.settle().await;
    let app = app_at(&a, &multisig, 1).await;

    // Updates are not outcome-checked, so an over-limit state can be agreed.
    a.runner
        .initiate(ProtocolParams::Update(UpdateParams {
            initiator_xpub: a.xpub.clone(),
            responder_xpub: b.xpub.clone(),
            multisig_address: multisig,
            app_identity_hash: app,
            new_state: game_state([(a.address(), 10), (b.address(), 10)], 1),
            timeout: None,
        }))
        .await
        .unwrap();
    hub.settle().await;
    let before = a.channel(&multisig).await;

    let err = a
        .runner
        .initiate(ProtocolParams::Uninstall(UninstallParams {
            initiator_xpub: a.xpub.clone(),
            responder_xpub: b.xpub.clone(),
            multisig_address: multisig,
            app_identity_hash: app,
        }))
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::InvalidOutcome(_)), "{err}");
    assert_eq!(err.kind(), "invalid_outcome");
    hub.settle().await;
    assert_eq!(a.channel(&multisig).await, before);
    assert_eq!(b.channel(&multisig).await, before);
}
