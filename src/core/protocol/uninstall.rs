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

//! Uninstall: credit the app's outcome back to the free balance.
//!
//! ```text
//! I -> R  (seq 1)  sig(uninstall)
//! R -> I  (reply)  sig(uninstall), sig(fb)
//! I -> R  (reply)  sig(fb)
//! ```
//!
//! The uninstall commitment batches the new free-balance state with a
//! timeout-0 state of the app one version ahead, which finalizes the app
//! on chain so the old conditional transaction can no longer be replayed
//! against a newer state.

use super::{
    context::{compute_outcome, free_balance_commitment, kth_address, outcome_error, validated, Context},
    instruction::{persist, send, send_and_wait, sign, write_commitment, CommitmentKey, Yield},
    params::{ProtocolParams, UninstallParams},
    Protocol, ProtocolError, UNASSIGNED_SEQ_NO,
};
use crate::core::{
    commitments::{Commitment, SetStateCommitment, SignedCommitment, UninstallCommitment},
    model::{
        compute_token_indexed_increments, state_channel::CHANNEL_KEY_INDEX, ChannelError,
        StateChannel,
    },
    types::{H256, U256},
};
use tracing::debug;

fn params(ctx: &Context) -> Result<&UninstallParams, ProtocolError> {
    match &ctx.message.params {
        ProtocolParams::Uninstall(p) => Ok(p),
        _ => Err(ProtocolError::UnexpectedMessage("expected uninstall params".into())),
    }
}

struct Proposal {
    post: StateChannel,
    fb_hash: H256,
    uninstall: Commitment,
    free_balance: Commitment,
}

async fn propose(ctx: &Context, p: &UninstallParams) -> Result<Proposal, ProtocolError> {
    let channel = ctx.channel(&p.multisig_address)?;
    if channel.free_balance_app_identity_hash == Some(p.app_identity_hash) {
        return Err(ChannelError::FreeBalanceRemoval.into());
    }
    let app = channel.get_app_instance(&p.app_identity_hash)?;
    let outcome = compute_outcome(ctx.oracle.as_ref(), app, &app.latest_state).await?;
    let increments =
        compute_token_indexed_increments(&outcome, &app.interpreter_params, &channel.multisig_owners()?)
            .map_err(outcome_error)?;
    let post = channel.uninstall_app(&p.app_identity_hash, &increments)?;

    let final_version = app
        .latest_version_number
        .checked_add(1)
        .ok_or(ChannelError::VersionOverflow)?;
    let app_spend = SetStateCommitment::new(
        &ctx.network,
        app.identity.clone(),
        app.hash_of_latest_state()?,
        U256::from(final_version),
        U256::zero(),
    );
    let fb_commitment = free_balance_commitment(&ctx.network, &post)?;
    let uninstall = Commitment::Uninstall(UninstallCommitment::new(
        &ctx.network,
        post.multisig_address,
        post.multisig_owners()?,
        fb_commitment.clone(),
        app_spend,
    ));
    Ok(Proposal {
        fb_hash: post.free_balance()?.identity_hash(),
        post,
        uninstall,
        free_balance: Commitment::SetState(fb_commitment),
    })
}

/// Role 0.
pub async fn initiate<Y: Yield>(ctx: &Context, y: &mut Y) -> Result<(), ProtocolError> {
    let p = params(ctx)?;
    let prop = propose(ctx, p).await?;
    let responder = kth_address(&p.responder_xpub, CHANNEL_KEY_INDEX)?;

    let my_uninstall = sign(y, &prop.uninstall, CHANNEL_KEY_INDEX).await?;
    let m1 = ctx
        .message
        .next(1, &p.initiator_xpub, &p.responder_xpub)
        .with_signatures(Some(my_uninstall.clone()), None, None);
    let reply = send_and_wait(y, m1).await?;

    let their_uninstall = validated(responder, &prop.uninstall.hash_to_sign(), reply.signature.as_ref())?;
    write_commitment(
        y,
        Protocol::Uninstall,
        CommitmentKey::App(p.app_identity_hash),
        SignedCommitment {
            commitment: prop.uninstall,
            signatures: vec![my_uninstall, their_uninstall],
            intermediary_signature: None,
        },
    )
    .await?;

    let their_fb = validated(responder, &prop.free_balance.hash_to_sign(), reply.signature2.as_ref())?;
    let my_fb = sign(y, &prop.free_balance, CHANNEL_KEY_INDEX).await?;
    write_commitment(
        y,
        Protocol::Update,
        CommitmentKey::App(prop.fb_hash),
        SignedCommitment {
            commitment: prop.free_balance,
            signatures: vec![my_fb.clone(), their_fb],
            intermediary_signature: None,
        },
    )
    .await?;
    persist(y, vec![prop.post]).await?;
    debug!(app = ?p.app_identity_hash, "uninstall: initiator committed");

    let m3 = ctx
        .message
        .next(UNASSIGNED_SEQ_NO, &p.initiator_xpub, &p.responder_xpub)
        .with_signatures(Some(my_fb), None, None);
    send(y, m3).await
}

/// Role 1.
pub async fn respond<Y: Yield>(ctx: &Context, y: &mut Y) -> Result<(), ProtocolError> {
    let p = params(ctx)?;
    let prop = propose(ctx, p).await?;
    let initiator = kth_address(&p.initiator_xpub, CHANNEL_KEY_INDEX)?;

    let their_uninstall = validated(
        initiator,
        &prop.uninstall.hash_to_sign(),
        ctx.message.signature.as_ref(),
    )?;
    let my_uninstall = sign(y, &prop.uninstall, CHANNEL_KEY_INDEX).await?;
    let my_fb = sign(y, &prop.free_balance, CHANNEL_KEY_INDEX).await?;
    write_commitment(
        y,
        Protocol::Uninstall,
        CommitmentKey::App(p.app_identity_hash),
        SignedCommitment {
            commitment: prop.uninstall,
            signatures: vec![their_uninstall, my_uninstall.clone()],
            intermediary_signature: None,
        },
    )
    .await?;

    let m2 = ctx
        .message
        .next(UNASSIGNED_SEQ_NO, &p.responder_xpub, &p.initiator_xpub)
        .with_signatures(Some(my_uninstall), Some(my_fb.clone()), None);
    let reply = send_and_wait(y, m2).await?;

    let their_fb = validated(initiator, &prop.free_balance.hash_to_sign(), reply.signature.as_ref())?;
    write_commitment(
        y,
        Protocol::Update,
        CommitmentKey::App(prop.fb_hash),
        SignedCommitment {
            commitment: prop.free_balance,
            signatures: vec![their_fb, my_fb],
            intermediary_signature: None,
        },
    )
    .await?;
    debug!(app = ?p.app_identity_hash, "uninstall: responder committed");
    persist(y, vec![prop.post]).await
}
