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

//! TakeAction: each party runs the action through the app definition and
//! signs the resulting state. A party whose oracle disagrees sees a
//! different digest and rejects the counterparty signature.

use super::{
    context::{compute_next_state, Context},
    instruction::Yield,
    params::{ProtocolParams, TakeActionParams},
    update::{initiate_advance, respond_advance, StateAdvance},
    Protocol, ProtocolError,
};

fn params(ctx: &Context) -> Result<&TakeActionParams, ProtocolError> {
    match &ctx.message.params {
        ProtocolParams::TakeAction(p) => Ok(p),
        _ => Err(ProtocolError::UnexpectedMessage("expected take-action params".into())),
    }
}

async fn propose<'a>(ctx: &Context, p: &'a TakeActionParams) -> Result<StateAdvance<'a>, ProtocolError> {
    let channel = ctx.channel(&p.multisig_address)?;
    let app = channel.get_app_instance(&p.app_identity_hash)?;
    let next = compute_next_state(ctx.oracle.as_ref(), app, &p.action).await?;
    Ok(StateAdvance {
        protocol: Protocol::TakeAction,
        initiator: &p.initiator_xpub,
        responder: &p.responder_xpub,
        app_hash: p.app_identity_hash,
        post: channel.set_state(&p.app_identity_hash, next, None)?,
    })
}

/// Role 0.
pub async fn initiate<Y: Yield>(ctx: &Context, y: &mut Y) -> Result<(), ProtocolError> {
    let adv = propose(ctx, params(ctx)?).await?;
    initiate_advance(ctx, y, adv).await
}

/// Role 1.
pub async fn respond<Y: Yield>(ctx: &Context, y: &mut Y) -> Result<(), ProtocolError> {
    let adv = propose(ctx, params(ctx)?).await?;
    respond_advance(ctx, y, adv).await
}
