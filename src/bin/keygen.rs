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

//! Create (or load) a participant seed and print its extended public key.
//!
//! Usage: `keygen [data_dir | config.toml]`. Set `STATECHANNELS_KEY_PASSPHRASE`
//! to keep the seed encrypted at rest.

use anyhow::{Context, Result};
use statechannels::core::{
    config::EngineConfig,
    security::keystore::{Keystore, Signer},
    security::xkey::xkey_kth_address,
};
use tracing::info;

fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .compact()
        .try_init();

    let arg = std::env::args().nth(1).unwrap_or_else(|| "data".to_string());
    let data_dir = if arg.ends_with(".toml") {
        EngineConfig::load(&arg)
            .with_context(|| format!("loading {arg}"))?
            .engine
            .data_dir
    } else {
        arg
    };
    std::fs::create_dir_all(&data_dir).with_context(|| format!("creating {data_dir}"))?;

    let keystore = Keystore::open(&data_dir).context("opening keystore")?;
    let xpub = keystore.extended_public_key();
    let free_balance_address = xkey_kth_address(xpub, 0)?;
    info!(data_dir = %data_dir, address = ?free_balance_address, "participant key ready");
    println!("{xpub}");
    Ok(())
}
