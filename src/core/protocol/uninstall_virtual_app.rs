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

//! UninstallVirtualApp: lock the target's final state and pay its outcome
//! out of both lock-up agreements.
//!
//! ```text
//! I -> H  (seq 1)  sig_I(lock), sig_I(fb IH)
//! H -> R  (seq 2)  sig_I(lock), sigAsIntermediary_H(lock), sig_H(fb HR)
//! R -> H  (reply)  sig_R(lock), sig_R(fb HR)
//! H -> I  (reply)  sig_R(lock), sigAsIntermediary_H(lock), sig_H(fb IH)
//! ```
//!
//! `lock` is the target at the final version with timeout 0; the
//! intermediary covers exactly that version. Every party recomputes the
//! outcome through the oracle before signing anything.

use super::{
    context::{free_balance_commitment, kth_address, outcome_error, validated, Context},
    instruction::{
        persist, send, send_and_wait, sign, sign_as_intermediary, write_commitment, CommitmentKey,
        Yield,
    },
    params::{channel_address, ProtocolParams, UninstallVirtualAppParams},
    Protocol, ProtocolError, UNASSIGNED_SEQ_NO,
};
use crate::core::{
    abi::{encode_typed, keccak256},
    commitments::{AppIdentity, Commitment, SignedCommitment, VirtualAppSetStateCommitment},
    model::{
        decode_two_party_coin_transfers, state_channel::CHANNEL_KEY_INDEX, ChannelError, StateChannel,
    },
    security::xkey::{xkeys_to_sorted_kth_addresses, ExtendedPublicKey},
    types::{Signature, H256, U256},
};
use tracing::debug;

fn params(ctx: &Context) -> Result<&UninstallVirtualAppParams, ProtocolError> {
    match &ctx.message.params {
        ProtocolParams::UninstallVirtualApp(p) => Ok(p),
        _ => Err(ProtocolError::UnexpectedMessage("expected uninstall-virtual-app params".into())),
    }
}

struct Lock {
    commitment: Commitment,
    payouts: [U256; 2],
}

/// Rebuild the target's identity from the parameters, check the outcome,
/// and derive the lock commitment.
async fn lock(ctx: &Context, p: &UninstallVirtualAppParams) -> Result<Lock, ProtocolError> {
    let end_users = [p.initiator_xpub.clone(), p.responder_xpub.clone()];
    let owner = channel_address(&ctx.network, &end_users[0], &end_users[1])?;
    let identity = AppIdentity {
        owner,
        signing_keys: xkeys_to_sorted_kth_addresses(&end_users, p.app_seq_no)?,
        app_definition: p.app_interface.addr,
        default_timeout: U256::from(p.default_timeout),
    };
    if identity.identity_hash() != p.target_app_identity_hash {
        return Err(ProtocolError::UnexpectedMessage("parameters do not describe the target".into()));
    }

    let encoded = encode_typed(&p.app_interface.state_encoding, &p.final_state)
        .map_err(ChannelError::StateNotEncodable)?;
    let outcome = ctx
        .oracle
        .compute_outcome(&p.app_interface, &encoded)
        .await
        .map_err(|e| ProtocolError::InvalidOutcome(e.to_string()))?;
    if outcome != p.outcome {
        return Err(ProtocolError::OutcomeMismatch);
    }
    let transfers = decode_two_party_coin_transfers(&outcome).map_err(outcome_error)?;

    let expiry = p
        .final_version_number
        .checked_add(1)
        .ok_or(ChannelError::VersionOverflow)?;
    let commitment = Commitment::VirtualAppSetState(VirtualAppSetStateCommitment::new(
        &ctx.network,
        identity,
        keccak256(&encoded),
        U256::from(p.final_version_number),
        U256::zero(),
        U256::from(expiry),
    ));
    Ok(Lock { commitment, payouts: [transfers[0].1, transfers[1].1] })
}

fn intermediary_digest(l: &Lock) -> Result<H256, ProtocolError> {
    l.commitment
        .hash_to_sign_as_intermediary()
        .ok_or(ProtocolError::UnexpectedMessage("lock has no intermediary digest".into()))
}

/// End users' channel with the target locked and then dropped.
fn virtual_post(ctx: &Context, p: &UninstallVirtualAppParams) -> Result<StateChannel, ProtocolError> {
    let vc = ctx.require_channel_between(&p.initiator_xpub, &p.responder_xpub)?;
    let app = vc.get_app_instance(&p.target_app_identity_hash)?;
    if !app.is_virtual_app {
        return Err(ProtocolError::UnexpectedMessage("target is not a virtual app".into()));
    }
    // Only a newer version may carry a state we have not seen.
    if p.final_version_number < app.latest_version_number {
        return Err(ChannelError::StaleVersion {
            current: app.latest_version_number,
            requested: p.final_version_number,
        }
        .into());
    }
    if p.final_version_number == app.latest_version_number
        && keccak256(&app.encode_state(&p.final_state)?) != app.hash_of_latest_state()?
    {
        return Err(ProtocolError::StaleState(p.final_version_number));
    }
    let locked = vc.lock_app_state(&p.target_app_identity_hash, p.final_version_number)?;
    Ok(locked.remove_virtual_app_instance(&p.target_app_identity_hash)?)
}

struct Leg {
    post: StateChannel,
    fb_hash: H256,
    commitment: Commitment,
}

fn leg(
    ctx: &Context,
    p: &UninstallVirtualAppParams,
    a: &ExtendedPublicKey,
    b: &ExtendedPublicKey,
    payouts: [U256; 2],
) -> Result<Leg, ProtocolError> {
    let channel = ctx.require_channel_between(a, b)?;
    let post = channel
        .remove_single_asset_two_party_intermediary_agreement(&p.target_app_identity_hash, payouts)?;
    let commitment = Commitment::SetState(free_balance_commitment(&ctx.network, &post)?);
    Ok(Leg { fb_hash: post.free_balance()?.identity_hash(), post, commitment })
}

async fn write_free_balance<Y: Yield>(
    y: &mut Y,
    leg: Leg,
    signatures: Vec<Signature>,
) -> Result<StateChannel, ProtocolError> {
    write_commitment(
        y,
        Protocol::Update,
        CommitmentKey::App(leg.fb_hash),
        SignedCommitment { commitment: leg.commitment, signatures, intermediary_signature: None },
    )
    .await?;
    Ok(leg.post)
}

/// Role 0.
pub async fn initiate<Y: Yield>(ctx: &Context, y: &mut Y) -> Result<(), ProtocolError> {
    let p = params(ctx)?;
    let l = lock(ctx, p).await?;
    let post_vc = virtual_post(ctx, p)?;
    let ih = leg(ctx, p, &p.initiator_xpub, &p.intermediary_xpub, l.payouts)?;

    let my_lock = sign(y, &l.commitment, p.app_seq_no).await?;
    let my_fb = sign(y, &ih.commitment, CHANNEL_KEY_INDEX).await?;
    let m1 = ctx
        .message
        .next(1, &p.initiator_xpub, &p.intermediary_xpub)
        .with_signatures(Some(my_lock.clone()), Some(my_fb.clone()), None);
    let reply = send_and_wait(y, m1).await?;

    let their_lock = validated(
        kth_address(&p.responder_xpub, p.app_seq_no)?,
        &l.commitment.hash_to_sign(),
        reply.signature.as_ref(),
    )?;
    let hub_int = validated(
        kth_address(&p.intermediary_xpub, CHANNEL_KEY_INDEX)?,
        &intermediary_digest(&l)?,
        reply.signature2.as_ref(),
    )?;
    let hub_fb = validated(
        kth_address(&p.intermediary_xpub, CHANNEL_KEY_INDEX)?,
        &ih.commitment.hash_to_sign(),
        reply.signature3.as_ref(),
    )?;

    write_commitment(
        y,
        Protocol::UninstallVirtualApp,
        CommitmentKey::App(p.target_app_identity_hash),
        SignedCommitment {
            commitment: l.commitment,
            signatures: vec![my_lock, their_lock],
            intermediary_signature: Some(hub_int),
        },
    )
    .await?;
    let post_ih = write_free_balance(y, ih, vec![my_fb, hub_fb]).await?;
    debug!(app = ?p.target_app_identity_hash, "uninstall virtual app: initiator committed");
    persist(y, vec![post_ih, post_vc]).await
}

/// Role 1: the hub.
pub async fn intermediate<Y: Yield>(ctx: &Context, y: &mut Y) -> Result<(), ProtocolError> {
    let p = params(ctx)?;
    let l = lock(ctx, p).await?;
    let ih = leg(ctx, p, &p.initiator_xpub, &p.intermediary_xpub, l.payouts)?;
    let hr = leg(ctx, p, &p.intermediary_xpub, &p.responder_xpub, l.payouts)?;

    let initiator_lock = validated(
        kth_address(&p.initiator_xpub, p.app_seq_no)?,
        &l.commitment.hash_to_sign(),
        ctx.message.signature.as_ref(),
    )?;
    let initiator_fb = validated(
        kth_address(&p.initiator_xpub, CHANNEL_KEY_INDEX)?,
        &ih.commitment.hash_to_sign(),
        ctx.message.signature2.as_ref(),
    )?;

    let my_int = sign_as_intermediary(y, &l.commitment, CHANNEL_KEY_INDEX).await?;
    let my_hr = sign(y, &hr.commitment, CHANNEL_KEY_INDEX).await?;
    let m2 = ctx
        .message
        .next(2, &p.intermediary_xpub, &p.responder_xpub)
        .with_signatures(Some(initiator_lock), Some(my_int.clone()), Some(my_hr.clone()));
    let reply = send_and_wait(y, m2).await?;

    let responder_lock = validated(
        kth_address(&p.responder_xpub, p.app_seq_no)?,
        &l.commitment.hash_to_sign(),
        reply.signature.as_ref(),
    )?;
    let responder_fb = validated(
        kth_address(&p.responder_xpub, CHANNEL_KEY_INDEX)?,
        &hr.commitment.hash_to_sign(),
        reply.signature2.as_ref(),
    )?;

    let post_hr = write_free_balance(y, hr, vec![my_hr, responder_fb]).await?;
    let my_ih = sign(y, &ih.commitment, CHANNEL_KEY_INDEX).await?;
    let post_ih = write_free_balance(y, ih, vec![initiator_fb, my_ih.clone()]).await?;
    persist(y, vec![post_ih, post_hr]).await?;
    debug!(app = ?p.target_app_identity_hash, "uninstall virtual app: intermediary committed");

    let m4 = ctx
        .message
        .next(UNASSIGNED_SEQ_NO, &p.intermediary_xpub, &p.initiator_xpub)
        .with_signatures(Some(responder_lock), Some(my_int), Some(my_ih));
    send(y, m4).await
}

/// Role 2.
pub async fn respond<Y: Yield>(ctx: &Context, y: &mut Y) -> Result<(), ProtocolError> {
    let p = params(ctx)?;
    let l = lock(ctx, p).await?;
    let post_vc = virtual_post(ctx, p)?;
    let hr = leg(ctx, p, &p.intermediary_xpub, &p.responder_xpub, l.payouts)?;

    let initiator_lock = validated(
        kth_address(&p.initiator_xpub, p.app_seq_no)?,
        &l.commitment.hash_to_sign(),
        ctx.message.signature.as_ref(),
    )?;
    let hub_int = validated(
        kth_address(&p.intermediary_xpub, CHANNEL_KEY_INDEX)?,
        &intermediary_digest(&l)?,
        ctx.message.signature2.as_ref(),
    )?;
    let hub_fb = validated(
        kth_address(&p.intermediary_xpub, CHANNEL_KEY_INDEX)?,
        &hr.commitment.hash_to_sign(),
        ctx.message.signature3.as_ref(),
    )?;

    let my_lock = sign(y, &l.commitment, p.app_seq_no).await?;
    let my_fb = sign(y, &hr.commitment, CHANNEL_KEY_INDEX).await?;
    write_commitment(
        y,
        Protocol::UninstallVirtualApp,
        CommitmentKey::App(p.target_app_identity_hash),
        SignedCommitment {
            commitment: l.commitment,
            signatures: vec![initiator_lock, my_lock.clone()],
            intermediary_signature: Some(hub_int),
        },
    )
    .await?;
    let post_hr = write_free_balance(y, hr, vec![hub_fb, my_fb.clone()]).await?;
    persist(y, vec![post_hr, post_vc]).await?;
    debug!(app = ?p.target_app_identity_hash, "uninstall virtual app: responder committed");

    let m3 = ctx
        .message
        .next(UNASSIGNED_SEQ_NO, &p.responder_xpub, &p.intermediary_xpub)
        .with_signatures(Some(my_lock), Some(my_fb), None);
    send(y, m3).await
}
