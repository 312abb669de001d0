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

//! Update: both parties sign the app at its next version.
//!
//! ```text
//! I -> R  (seq 1)  sig(setState)
//! R -> I  (reply)  sig(setState)
//! ```
//!
//! TakeAction shares the exchange; only the way the new state is obtained
//! differs.

use super::{
    context::{kth_address, set_state_commitment, validated, Context},
    instruction::{persist, send, send_and_wait, sign, write_commitment, CommitmentKey, Yield},
    params::{ProtocolParams, UpdateParams},
    Protocol, ProtocolError, UNASSIGNED_SEQ_NO,
};
use crate::core::{
    commitments::{Commitment, SignedCommitment},
    model::StateChannel,
    security::xkey::ExtendedPublicKey,
    types::H256,
};
use tracing::debug;

fn params(ctx: &Context) -> Result<&UpdateParams, ProtocolError> {
    match &ctx.message.params {
        ProtocolParams::Update(p) => Ok(p),
        _ => Err(ProtocolError::UnexpectedMessage("expected update params".into())),
    }
}

/// Post-run channel of a state advance, plus what the exchange signs.
pub(super) struct StateAdvance<'a> {
    pub protocol: Protocol,
    pub initiator: &'a ExtendedPublicKey,
    pub responder: &'a ExtendedPublicKey,
    pub app_hash: H256,
    pub post: StateChannel,
}

impl StateAdvance<'_> {
    fn commitment(&self, ctx: &Context) -> Result<(Commitment, u64), ProtocolError> {
        let app = self.post.get_app_instance(&self.app_hash)?;
        Ok((Commitment::SetState(set_state_commitment(&ctx.network, app)?), app.app_seq_no))
    }
}

pub(super) async fn initiate_advance<Y: Yield>(
    ctx: &Context,
    y: &mut Y,
    adv: StateAdvance<'_>,
) -> Result<(), ProtocolError> {
    let (commitment, key_index) = adv.commitment(ctx)?;
    let digest = commitment.hash_to_sign();

    let mine = sign(y, &commitment, key_index).await?;
    let m1 = ctx
        .message
        .next(1, adv.initiator, adv.responder)
        .with_signatures(Some(mine.clone()), None, None);
    let reply = send_and_wait(y, m1).await?;

    let theirs = validated(kth_address(adv.responder, key_index)?, &digest, reply.signature.as_ref())?;
    write_commitment(
        y,
        adv.protocol,
        CommitmentKey::App(adv.app_hash),
        SignedCommitment { commitment, signatures: vec![mine, theirs], intermediary_signature: None },
    )
    .await?;
    debug!(protocol = %adv.protocol, app = ?adv.app_hash, "initiator committed new state");
    persist(y, vec![adv.post]).await
}

pub(super) async fn respond_advance<Y: Yield>(
    ctx: &Context,
    y: &mut Y,
    adv: StateAdvance<'_>,
) -> Result<(), ProtocolError> {
    let (commitment, key_index) = adv.commitment(ctx)?;
    let digest = commitment.hash_to_sign();

    let theirs = validated(
        kth_address(adv.initiator, key_index)?,
        &digest,
        ctx.message.signature.as_ref(),
    )?;
    let mine = sign(y, &commitment, key_index).await?;
    write_commitment(
        y,
        adv.protocol,
        CommitmentKey::App(adv.app_hash),
        SignedCommitment {
            commitment,
            signatures: vec![theirs, mine.clone()],
            intermediary_signature: None,
        },
    )
    .await?;
    persist(y, vec![adv.post]).await?;
    debug!(protocol = %adv.protocol, app = ?adv.app_hash, "responder committed new state");

    let m2 = ctx
        .message
        .next(UNASSIGNED_SEQ_NO, adv.responder, adv.initiator)
        .with_signatures(Some(mine), None, None);
    send(y, m2).await
}

fn propose<'a>(ctx: &Context, p: &'a UpdateParams) -> Result<StateAdvance<'a>, ProtocolError> {
    let channel = ctx.channel(&p.multisig_address)?;
    if channel.free_balance_app_identity_hash == Some(p.app_identity_hash) {
        return Err(ProtocolError::UnexpectedMessage("free balance moves only with installs".into()));
    }
    Ok(StateAdvance {
        protocol: Protocol::Update,
        initiator: &p.initiator_xpub,
        responder: &p.responder_xpub,
        app_hash: p.app_identity_hash,
        post: channel.set_state(&p.app_identity_hash, p.new_state.clone(), p.timeout)?,
    })
}

/// Role 0.
pub async fn initiate<Y: Yield>(ctx: &Context, y: &mut Y) -> Result<(), ProtocolError> {
    let adv = propose(ctx, params(ctx)?)?;
    initiate_advance(ctx, y, adv).await
}

/// Role 1.
pub async fn respond<Y: Yield>(ctx: &Context, y: &mut Y) -> Result<(), ProtocolError> {
    let adv = propose(ctx, params(ctx)?)?;
    respond_advance(ctx, y, adv).await
}
