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

//! Setup: one round establishing the free balance at zero.
//!
//! ```text
//! I -> R  (seq 1)  sig(setup)
//! R -> I  (reply)  sig(setup)
//! ```

use super::{
    context::{kth_address, validated, Context},
    instruction::{persist, send, send_and_wait, sign, write_commitment, CommitmentKey, Yield},
    params::{ProtocolParams, SetupParams},
    Protocol, ProtocolError, UNASSIGNED_SEQ_NO,
};
use crate::core::{
    commitments::{Commitment, SetupCommitment, SignedCommitment},
    model::{state_channel::CHANNEL_KEY_INDEX, StateChannel},
};
use tracing::debug;

fn params(ctx: &Context) -> Result<&SetupParams, ProtocolError> {
    match &ctx.message.params {
        ProtocolParams::Setup(p) => Ok(p),
        _ => Err(ProtocolError::UnexpectedMessage("expected setup params".into())),
    }
}

/// Post-setup channel and its commitment.
fn propose(ctx: &Context, p: &SetupParams) -> Result<(StateChannel, Commitment), ProtocolError> {
    if let Some(existing) = ctx.state_channels.get(&p.multisig_address) {
        if existing.is_set_up() {
            return Err(ProtocolError::ChannelAlreadyExists(p.multisig_address));
        }
    }
    let channel = StateChannel::new(
        &ctx.network,
        vec![p.initiator_xpub.clone(), p.responder_xpub.clone()],
    )?;
    if channel.multisig_address != p.multisig_address {
        return Err(ProtocolError::MultisigMismatch {
            expected: channel.multisig_address,
            got: p.multisig_address,
        });
    }
    let post = channel.setup(&ctx.network)?;
    let fb_hash = post.free_balance()?.identity_hash();
    let commitment = Commitment::Setup(SetupCommitment::new(
        &ctx.network,
        post.multisig_address,
        post.multisig_owners()?,
        fb_hash,
    ));
    Ok((post, commitment))
}

/// Role 0.
pub async fn initiate<Y: Yield>(ctx: &Context, y: &mut Y) -> Result<(), ProtocolError> {
    let p = params(ctx)?;
    let (post, commitment) = propose(ctx, p)?;
    let digest = commitment.hash_to_sign();

    let mine = sign(y, &commitment, CHANNEL_KEY_INDEX).await?;
    let m1 = ctx
        .message
        .next(1, &p.initiator_xpub, &p.responder_xpub)
        .with_signatures(Some(mine.clone()), None, None);
    let reply = send_and_wait(y, m1).await?;

    let theirs = validated(
        kth_address(&p.responder_xpub, CHANNEL_KEY_INDEX)?,
        &digest,
        reply.signature.as_ref(),
    )?;
    let signed = SignedCommitment {
        commitment,
        signatures: vec![mine, theirs],
        intermediary_signature: None,
    };
    write_commitment(y, Protocol::Setup, CommitmentKey::Multisig(post.multisig_address), signed).await?;
    debug!(multisig = ?post.multisig_address, "setup: initiator committed");
    persist(y, vec![post]).await
}

/// Role 1.
pub async fn respond<Y: Yield>(ctx: &Context, y: &mut Y) -> Result<(), ProtocolError> {
    let p = params(ctx)?;
    let (post, commitment) = propose(ctx, p)?;
    let digest = commitment.hash_to_sign();

    let theirs = validated(
        kth_address(&p.initiator_xpub, CHANNEL_KEY_INDEX)?,
        &digest,
        ctx.message.signature.as_ref(),
    )?;
    let mine = sign(y, &commitment, CHANNEL_KEY_INDEX).await?;
    let signed = SignedCommitment {
        commitment,
        signatures: vec![theirs, mine.clone()],
        intermediary_signature: None,
    };
    write_commitment(y, Protocol::Setup, CommitmentKey::Multisig(post.multisig_address), signed).await?;
    persist(y, vec![post]).await?;
    debug!(multisig = ?p.multisig_address, "setup: responder committed");

    let m2 = ctx
        .message
        .next(UNASSIGNED_SEQ_NO, &p.responder_xpub, &p.initiator_xpub)
        .with_signatures(Some(mine), None, None);
    send(y, m2).await
}
