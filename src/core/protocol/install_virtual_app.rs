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

//! InstallVirtualApp: an app between two end users who only share channels
//! with a common hub.
//!
//! ```text
//! I -> H  (seq 1)  sig_I(leg IH), sig_I(target)
//! H -> R  (seq 2)  sig_H(leg HR), sig_I(target), sigAsIntermediary_H(target)
//! R -> H  (reply)  sig_R(leg HR), sig_R(target)
//! H -> I  (reply)  sig_H(leg IH), sig_R(target), sigAsIntermediary_H(target)
//! ```
//!
//! Each leg locks the virtual app's capital in a lump-sum agreement signed
//! by that leg's two parties. The target app lives on the end users'
//! virtual channel and is signed by both end users plus the hub's
//! intermediary signature. Every relayed signature is checked by the party
//! relaying it.

use super::{
    context::{free_balance_commitment, kth_address, validated, Context},
    instruction::{
        persist, send, send_and_wait, sign, sign_as_intermediary, write_commitment, CommitmentKey,
        Yield,
    },
    params::{InstallVirtualAppParams, ProtocolParams},
    Protocol, ProtocolError, UNASSIGNED_SEQ_NO,
};
use crate::core::{
    commitments::{
        Commitment, SignedCommitment, TwoPartyVirtualEthAsLumpCommitment,
        VirtualAppSetStateCommitment,
    },
    model::{
        state_channel::CHANNEL_KEY_INDEX, AppInstance, ChannelError, InterpreterParams, StateChannel,
    },
    security::xkey::ExtendedPublicKey,
    types::{Address, H256, U256, CONVENTION_FOR_ETH_TOKEN_ADDRESS},
};
use tracing::debug;

/// Versions below this are covered by the intermediary's signature on a
/// freshly installed virtual app.
pub const DEFAULT_VERSION_NUMBER_EXPIRY: u64 = 1 << 48;

fn params(ctx: &Context) -> Result<&InstallVirtualAppParams, ProtocolError> {
    match &ctx.message.params {
        ProtocolParams::InstallVirtualApp(p) => Ok(p),
        _ => Err(ProtocolError::UnexpectedMessage("expected install-virtual-app params".into())),
    }
}

/// Virtual channel between the end users, created on first use.
fn virtual_channel(
    ctx: &Context,
    initiator: &ExtendedPublicKey,
    responder: &ExtendedPublicKey,
) -> Result<StateChannel, ProtocolError> {
    match ctx.channel_between(initiator, responder)? {
        Some(ch) if ch.is_virtual => Ok(ch.clone()),
        Some(ch) => Err(ProtocolError::UnexpectedMessage(format!(
            "end users share a funded channel {:?}",
            ch.multisig_address
        ))),
        None => Ok(StateChannel::new_virtual(
            &ctx.network,
            vec![initiator.clone(), responder.clone()],
        )?),
    }
}

struct Target {
    app: AppInstance,
    hash: H256,
    commitment: Commitment,
}

fn target(ctx: &Context, p: &InstallVirtualAppParams, vc: &StateChannel) -> Result<Target, ProtocolError> {
    let limit = p
        .initiator_balance_decrement
        .checked_add(p.responder_balance_decrement)
        .ok_or(ChannelError::Overflow)?;
    let app = AppInstance::new(
        vc.multisig_address,
        vc.signing_keys_for(p.app_seq_no)?,
        p.default_timeout,
        p.app_interface.clone(),
        p.app_seq_no,
        p.initial_state.clone(),
        InterpreterParams::SingleAssetTwoPartyCoinTransfer {
            limit,
            token_address: CONVENTION_FOR_ETH_TOKEN_ADDRESS,
        },
        true,
    )?;
    let commitment = Commitment::VirtualAppSetState(VirtualAppSetStateCommitment::new(
        &ctx.network,
        app.identity.clone(),
        app.hash_of_latest_state()?,
        U256::from(app.latest_version_number),
        U256::from(app.latest_timeout),
        U256::from(DEFAULT_VERSION_NUMBER_EXPIRY),
    ));
    Ok(Target { hash: app.identity_hash(), app, commitment })
}

struct Leg {
    post: StateChannel,
    commitment: Commitment,
}

/// Lock-up on the leg between `near` (towards the initiator) and `far`.
fn leg(
    ctx: &Context,
    p: &InstallVirtualAppParams,
    near: &ExtendedPublicKey,
    far: &ExtendedPublicKey,
    target_hash: H256,
) -> Result<Leg, ProtocolError> {
    let channel = ctx.require_channel_between(near, far)?;
    let beneficiaries: [Address; 2] = [
        kth_address(near, CHANNEL_KEY_INDEX)?,
        kth_address(far, CHANNEL_KEY_INDEX)?,
    ];
    let stakes = [p.initiator_balance_decrement, p.responder_balance_decrement];
    let post = channel.install_two_party_virtual_eth_as_lump_instances(
        target_hash,
        beneficiaries,
        stakes,
        p.expiry_block,
    )?;
    let capital = post.get_intermediary_agreement(&target_hash)?.capital_provided()?;
    let commitment = Commitment::TwoPartyVirtualEthAsLump(TwoPartyVirtualEthAsLumpCommitment::new(
        &ctx.network,
        post.multisig_address,
        post.multisig_owners()?,
        free_balance_commitment(&ctx.network, &post)?,
        target_hash,
        capital,
        U256::from(p.expiry_block),
        beneficiaries,
    ));
    Ok(Leg { post, commitment })
}

fn intermediary_digest(t: &Target) -> Result<H256, ProtocolError> {
    t.commitment
        .hash_to_sign_as_intermediary()
        .ok_or(ProtocolError::UnexpectedMessage("target has no intermediary digest".into()))
}

fn agreement_key(leg: &Leg, target: H256) -> CommitmentKey {
    CommitmentKey::Agreement { multisig: leg.post.multisig_address, target }
}

/// Role 0.
pub async fn initiate<Y: Yield>(ctx: &Context, y: &mut Y) -> Result<(), ProtocolError> {
    let p = params(ctx)?;
    let vc = virtual_channel(ctx, &p.initiator_xpub, &p.responder_xpub)?;
    let t = target(ctx, p, &vc)?;
    let post_vc = vc.add_virtual_app_instance(t.app.clone())?;
    let ih = leg(ctx, p, &p.initiator_xpub, &p.intermediary_xpub, t.hash)?;

    let my_leg = sign(y, &ih.commitment, CHANNEL_KEY_INDEX).await?;
    let my_target = sign(y, &t.commitment, p.app_seq_no).await?;
    let m1 = ctx
        .message
        .next(1, &p.initiator_xpub, &p.intermediary_xpub)
        .with_signatures(Some(my_leg.clone()), Some(my_target.clone()), None);
    let reply = send_and_wait(y, m1).await?;

    let hub_leg = validated(
        kth_address(&p.intermediary_xpub, CHANNEL_KEY_INDEX)?,
        &ih.commitment.hash_to_sign(),
        reply.signature.as_ref(),
    )?;
    let their_target = validated(
        kth_address(&p.responder_xpub, p.app_seq_no)?,
        &t.commitment.hash_to_sign(),
        reply.signature2.as_ref(),
    )?;
    let hub_int = validated(
        kth_address(&p.intermediary_xpub, CHANNEL_KEY_INDEX)?,
        &intermediary_digest(&t)?,
        reply.signature3.as_ref(),
    )?;

    write_commitment(
        y,
        Protocol::InstallVirtualApp,
        agreement_key(&ih, t.hash),
        SignedCommitment {
            commitment: ih.commitment,
            signatures: vec![my_leg, hub_leg],
            intermediary_signature: None,
        },
    )
    .await?;
    write_commitment(
        y,
        Protocol::InstallVirtualApp,
        CommitmentKey::App(t.hash),
        SignedCommitment {
            commitment: t.commitment,
            signatures: vec![my_target, their_target],
            intermediary_signature: Some(hub_int),
        },
    )
    .await?;
    debug!(app = ?t.hash, "install virtual app: initiator committed");
    persist(y, vec![ih.post, post_vc]).await
}

/// Role 1: the hub.
pub async fn intermediate<Y: Yield>(ctx: &Context, y: &mut Y) -> Result<(), ProtocolError> {
    let p = params(ctx)?;
    // The hub never holds the virtual channel; it derives the target alone.
    let vc = StateChannel::new_virtual(
        &ctx.network,
        vec![p.initiator_xpub.clone(), p.responder_xpub.clone()],
    )?;
    let t = target(ctx, p, &vc)?;
    let ih = leg(ctx, p, &p.initiator_xpub, &p.intermediary_xpub, t.hash)?;
    let hr = leg(ctx, p, &p.intermediary_xpub, &p.responder_xpub, t.hash)?;

    let initiator_leg = validated(
        kth_address(&p.initiator_xpub, CHANNEL_KEY_INDEX)?,
        &ih.commitment.hash_to_sign(),
        ctx.message.signature.as_ref(),
    )?;
    let initiator_target = validated(
        kth_address(&p.initiator_xpub, p.app_seq_no)?,
        &t.commitment.hash_to_sign(),
        ctx.message.signature2.as_ref(),
    )?;

    let my_hr = sign(y, &hr.commitment, CHANNEL_KEY_INDEX).await?;
    let my_int = sign_as_intermediary(y, &t.commitment, CHANNEL_KEY_INDEX).await?;
    let m2 = ctx
        .message
        .next(2, &p.intermediary_xpub, &p.responder_xpub)
        .with_signatures(Some(my_hr.clone()), Some(initiator_target), Some(my_int.clone()));
    let reply = send_and_wait(y, m2).await?;

    let responder_leg = validated(
        kth_address(&p.responder_xpub, CHANNEL_KEY_INDEX)?,
        &hr.commitment.hash_to_sign(),
        reply.signature.as_ref(),
    )?;
    let responder_target = validated(
        kth_address(&p.responder_xpub, p.app_seq_no)?,
        &t.commitment.hash_to_sign(),
        reply.signature2.as_ref(),
    )?;

    write_commitment(
        y,
        Protocol::InstallVirtualApp,
        agreement_key(&hr, t.hash),
        SignedCommitment {
            commitment: hr.commitment,
            signatures: vec![my_hr, responder_leg],
            intermediary_signature: None,
        },
    )
    .await?;
    let my_ih = sign(y, &ih.commitment, CHANNEL_KEY_INDEX).await?;
    write_commitment(
        y,
        Protocol::InstallVirtualApp,
        agreement_key(&ih, t.hash),
        SignedCommitment {
            commitment: ih.commitment,
            signatures: vec![initiator_leg, my_ih.clone()],
            intermediary_signature: None,
        },
    )
    .await?;
    persist(y, vec![ih.post, hr.post]).await?;
    debug!(app = ?t.hash, "install virtual app: intermediary committed");

    let m4 = ctx
        .message
        .next(UNASSIGNED_SEQ_NO, &p.intermediary_xpub, &p.initiator_xpub)
        .with_signatures(Some(my_ih), Some(responder_target), Some(my_int));
    send(y, m4).await
}

/// Role 2.
pub async fn respond<Y: Yield>(ctx: &Context, y: &mut Y) -> Result<(), ProtocolError> {
    let p = params(ctx)?;
    let vc = virtual_channel(ctx, &p.initiator_xpub, &p.responder_xpub)?;
    let t = target(ctx, p, &vc)?;
    let post_vc = vc.add_virtual_app_instance(t.app.clone())?;
    let hr = leg(ctx, p, &p.intermediary_xpub, &p.responder_xpub, t.hash)?;

    let hub_leg = validated(
        kth_address(&p.intermediary_xpub, CHANNEL_KEY_INDEX)?,
        &hr.commitment.hash_to_sign(),
        ctx.message.signature.as_ref(),
    )?;
    let initiator_target = validated(
        kth_address(&p.initiator_xpub, p.app_seq_no)?,
        &t.commitment.hash_to_sign(),
        ctx.message.signature2.as_ref(),
    )?;
    let hub_int = validated(
        kth_address(&p.intermediary_xpub, CHANNEL_KEY_INDEX)?,
        &intermediary_digest(&t)?,
        ctx.message.signature3.as_ref(),
    )?;

    let my_leg = sign(y, &hr.commitment, CHANNEL_KEY_INDEX).await?;
    let my_target = sign(y, &t.commitment, p.app_seq_no).await?;
    write_commitment(
        y,
        Protocol::InstallVirtualApp,
        agreement_key(&hr, t.hash),
        SignedCommitment {
            commitment: hr.commitment,
            signatures: vec![hub_leg, my_leg.clone()],
            intermediary_signature: None,
        },
    )
    .await?;
    write_commitment(
        y,
        Protocol::InstallVirtualApp,
        CommitmentKey::App(t.hash),
        SignedCommitment {
            commitment: t.commitment,
            signatures: vec![initiator_target, my_target.clone()],
            intermediary_signature: Some(hub_int),
        },
    )
    .await?;
    persist(y, vec![hr.post, post_vc]).await?;
    debug!(app = ?t.hash, "install virtual app: responder committed");

    let m3 = ctx
        .message
        .next(UNASSIGNED_SEQ_NO, &p.responder_xpub, &p.intermediary_xpub)
        .with_signatures(Some(my_leg), Some(my_target), None);
    send(y, m3).await
}
