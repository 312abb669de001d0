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

//! Install: fund a new app out of the free balance.
//!
//! ```text
//! I -> R  (seq 1)  sig(cond)
//! R -> I  (reply)  sig(cond), sig(fb)
//! I -> R  (reply)  sig(fb)
//! ```
//!
//! `cond` is the conditional transaction paying out the app's outcome;
//! `fb` is the free-balance state with the deposits removed.

use super::{
    context::{free_balance_commitment, kth_address, validated, Context},
    instruction::{persist, send, send_and_wait, sign, write_commitment, CommitmentKey, Yield},
    params::{InstallParams, ProtocolParams},
    Protocol, ProtocolError, UNASSIGNED_SEQ_NO,
};
use crate::core::{
    commitments::{Commitment, ConditionalTransactionCommitment, SignedCommitment},
    model::{state_channel::CHANNEL_KEY_INDEX, AppInstance, ChannelError, StateChannel},
    types::{TokenIndexedCoinTransferMap, H256, U256},
};
use tracing::debug;

fn params(ctx: &Context) -> Result<&InstallParams, ProtocolError> {
    match &ctx.message.params {
        ProtocolParams::Install(p) => Ok(p),
        _ => Err(ProtocolError::UnexpectedMessage("expected install params".into())),
    }
}

struct Proposal {
    post: StateChannel,
    app_hash: H256,
    fb_hash: H256,
    conditional: Commitment,
    free_balance: Commitment,
}

fn decrements(p: &InstallParams) -> Result<TokenIndexedCoinTransferMap, ProtocolError> {
    let mut out = TokenIndexedCoinTransferMap::new();
    for (xpub, token, amount) in [
        (&p.initiator_xpub, p.initiator_deposit_token_address, p.initiator_balance_decrement),
        (&p.responder_xpub, p.responder_deposit_token_address, p.responder_balance_decrement),
    ] {
        let slot = out
            .entry(token)
            .or_default()
            .entry(kth_address(xpub, CHANNEL_KEY_INDEX)?)
            .or_insert_with(U256::zero);
        *slot = slot.checked_add(amount).ok_or(ChannelError::Overflow)?;
    }
    Ok(out)
}

fn propose(ctx: &Context, p: &InstallParams) -> Result<Proposal, ProtocolError> {
    let channel = ctx.channel(&p.multisig_address)?;
    if !channel.has_participant(&p.initiator_xpub) || !channel.has_participant(&p.responder_xpub) {
        return Err(ProtocolError::UnexpectedMessage("install between non-participants".into()));
    }
    let seq = channel.num_installed_apps;
    let app = AppInstance::new(
        channel.multisig_address,
        channel.signing_keys_for(seq)?,
        p.default_timeout,
        p.app_interface.clone(),
        seq,
        p.initial_state.clone(),
        p.interpreter_params.clone(),
        false,
    )?;
    let app_hash = app.identity_hash();
    let post = channel.install_app(app, &decrements(p)?)?;
    let fb = post.free_balance()?;
    let fb_hash = fb.identity_hash();
    let conditional = Commitment::ConditionalTransaction(ConditionalTransactionCommitment::new(
        &ctx.network,
        post.multisig_address,
        post.multisig_owners()?,
        fb_hash,
        app_hash,
        p.interpreter_params.interpreter(&ctx.network),
        p.interpreter_params.encode(),
    ));
    let free_balance = Commitment::SetState(free_balance_commitment(&ctx.network, &post)?);
    Ok(Proposal { post, app_hash, fb_hash, conditional, free_balance })
}

/// Role 0.
pub async fn initiate<Y: Yield>(ctx: &Context, y: &mut Y) -> Result<(), ProtocolError> {
    let p = params(ctx)?;
    let prop = propose(ctx, p)?;
    let responder = kth_address(&p.responder_xpub, CHANNEL_KEY_INDEX)?;

    let my_cond = sign(y, &prop.conditional, CHANNEL_KEY_INDEX).await?;
    let m1 = ctx
        .message
        .next(1, &p.initiator_xpub, &p.responder_xpub)
        .with_signatures(Some(my_cond.clone()), None, None);
    let reply = send_and_wait(y, m1).await?;

    let their_cond = validated(responder, &prop.conditional.hash_to_sign(), reply.signature.as_ref())?;
    write_commitment(
        y,
        Protocol::Install,
        CommitmentKey::App(prop.app_hash),
        SignedCommitment {
            commitment: prop.conditional,
            signatures: vec![my_cond, their_cond],
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
    debug!(app = ?prop.app_hash, "install: initiator committed");

    let m3 = ctx
        .message
        .next(UNASSIGNED_SEQ_NO, &p.initiator_xpub, &p.responder_xpub)
        .with_signatures(Some(my_fb), None, None);
    send(y, m3).await
}

/// Role 1.
pub async fn respond<Y: Yield>(ctx: &Context, y: &mut Y) -> Result<(), ProtocolError> {
    let p = params(ctx)?;
    let prop = propose(ctx, p)?;
    let initiator = kth_address(&p.initiator_xpub, CHANNEL_KEY_INDEX)?;

    let their_cond = validated(initiator, &prop.conditional.hash_to_sign(), ctx.message.signature.as_ref())?;
    let my_cond = sign(y, &prop.conditional, CHANNEL_KEY_INDEX).await?;
    let my_fb = sign(y, &prop.free_balance, CHANNEL_KEY_INDEX).await?;
    write_commitment(
        y,
        Protocol::Install,
        CommitmentKey::App(prop.app_hash),
        SignedCommitment {
            commitment: prop.conditional,
            signatures: vec![their_cond, my_cond.clone()],
            intermediary_signature: None,
        },
    )
    .await?;

    let m2 = ctx
        .message
        .next(UNASSIGNED_SEQ_NO, &p.responder_xpub, &p.initiator_xpub)
        .with_signatures(Some(my_cond), Some(my_fb.clone()), None);
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
    debug!(app = ?prop.app_hash, "install: responder committed");
    persist(y, vec![prop.post]).await
}
