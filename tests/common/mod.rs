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

#![allow(dead_code)]

//! Shared fixtures: a deployment, a counter app oracle, and participants
//! wired through the in-memory hub.

use async_trait::async_trait;
use statechannels::core::{
    abi::{decode_single, encode_typed, parse_param_type, Token},
    model::{AppInterface, InterpreterParams, StateChannel},
    protocol::{
        oracle::{AppOracle, OracleError},
        params::{channel_address, InstallParams, SetupParams},
        ProtocolParams,
    },
    runtime::{MemoryHub, ProtocolRunner, RunnerConfig},
    security::{
        keystore::{Keystore, Signer},
        xkey::{xkey_kth_address, ExtendedPublicKey},
    },
    store::{MemoryStore, Store},
    types::{Address, NetworkContext, TokenIndexedCoinTransferMap, H256, U256, CONVENTION_FOR_ETH_TOKEN_ADDRESS},
};
use std::sync::Arc;
use std::time::Duration;

pub const STATE_ENCODING: &str =
    "tuple(tuple(address to, uint256 amount)[2] transfers, uint256 counter)";
pub const ACTION_ENCODING: &str = "tuple(uint256 increment)";
const TRANSFERS_ENCODING: &str = "tuple(address to, uint256 amount)[2]";

pub fn network() -> NetworkContext {
    NetworkContext {
        challenge_registry: Address::repeat_byte(0x01),
        minimum_viable_multisig: Address::repeat_byte(0x02),
        proxy_factory: Address::repeat_byte(0x03),
        multi_send: Address::repeat_byte(0x04),
        conditional_transaction_delegate_target: Address::repeat_byte(0x05),
        two_party_fixed_outcome_interpreter: Address::repeat_byte(0x06),
        multi_asset_multi_party_coin_transfer_interpreter: Address::repeat_byte(0x07),
        single_asset_two_party_coin_transfer_interpreter: Address::repeat_byte(0x08),
        two_party_virtual_eth_as_lump: Address::repeat_byte(0x09),
        identity_app: Address::repeat_byte(0x0a),
        free_balance_app: Address::repeat_byte(0x0b),
        proxy_creation_code: vec![0x60, 0x80, 0x60, 0x40, 0x52],
    }
}

pub fn counter_app() -> AppInterface {
    AppInterface {
        addr: Address::repeat_byte(0xc0),
        state_encoding: STATE_ENCODING.into(),
        action_encoding: Some(ACTION_ENCODING.into()),
    }
}

pub fn game_state(transfers: [(Address, u64); 2], counter: u64) -> Token {
    Token::Tuple(vec![
        Token::FixedArray(
            transfers
                .iter()
                .map(|(to, amount)| Token::Tuple(vec![Token::Address(*to), Token::uint(*amount)]))
                .collect(),
        ),
        Token::uint(counter),
    ])
}

pub fn increment(by: u64) -> Token {
    Token::Tuple(vec![Token::uint(by)])
}

/// Outcome bytes of a counter-app state: its transfer list.
pub fn outcome_of(state: &Token) -> Vec<u8> {
    match state {
        Token::Tuple(fields) => encode_typed(TRANSFERS_ENCODING, &fields[0]).unwrap(),
        _ => panic!("not a counter state"),
    }
}

/// Stand-in for the counter app's definition contract.
pub struct CounterOracle;

fn rejected(msg: &str) -> OracleError {
    OracleError::Rejected(msg.to_string())
}

fn decode_state(encoded: &[u8]) -> Result<Vec<Token>, OracleError> {
    let ty = parse_param_type(STATE_ENCODING).map_err(|e| rejected(&e.to_string()))?;
    match decode_single(&ty, encoded).map_err(|e| rejected(&e.to_string()))? {
        Token::Tuple(fields) if fields.len() == 2 => Ok(fields),
        _ => Err(rejected("state shape")),
    }
}

#[async_trait]
impl AppOracle for CounterOracle {
    async fn compute_state_transition(
        &self,
        _app: &AppInterface,
        encoded_state: &[u8],
        encoded_action: &[u8],
    ) -> Result<Vec<u8>, OracleError> {
        let mut fields = decode_state(encoded_state)?;
        let ty = parse_param_type(ACTION_ENCODING).map_err(|e| rejected(&e.to_string()))?;
        let by = match decode_single(&ty, encoded_action).map_err(|e| rejected(&e.to_string()))? {
            Token::Tuple(a) => a.first().and_then(Token::as_uint).ok_or_else(|| rejected("action shape"))?,
            _ => return Err(rejected("action shape")),
        };
        if by.is_zero() {
            return Err(rejected("zero increment"));
        }
        let counter = fields[1].as_uint().ok_or_else(|| rejected("counter"))?;
        fields[1] = Token::Uint(counter + by);
        encode_typed(STATE_ENCODING, &Token::Tuple(fields)).map_err(|e| rejected(&e.to_string()))
    }

    async fn compute_outcome(&self, _app: &AppInterface, encoded_state: &[u8]) -> Result<Vec<u8>, OracleError> {
        let fields = decode_state(encoded_state)?;
        encode_typed(TRANSFERS_ENCODING, &fields[0]).map_err(|e| rejected(&e.to_string()))
    }
}

pub struct Node {
    pub runner: ProtocolRunner,
    pub store: Arc<dyn Store>,
    pub xpub: ExtendedPublicKey,
}

impl Node {
    /// Index-0 (free-balance) address.
    pub fn address(&self) -> Address {
        xkey_kth_address(&self.xpub, 0).unwrap()
    }

    pub async fn channel(&self, multisig: &Address) -> StateChannel {
        self.store.get_state_channel(multisig).await.unwrap().expect("channel stored")
    }

    pub async fn eth_balance(&self, multisig: &Address, who: &Address) -> U256 {
        self.channel(multisig)
            .await
            .free_balance_state()
            .unwrap()
            .balance_of(&CONVENTION_FOR_ETH_TOKEN_ADDRESS, who)
    }
}

pub fn node_with(hub: &Arc<MemoryHub>, seed: u8, store: Arc<dyn Store>, io_timeout: Duration) -> Node {
    let signer: Arc<dyn Signer> = Arc::new(Keystore::from_seed(&[seed; 32]).unwrap());
    let xpub = signer.extended_public_key().clone();
    let runner = ProtocolRunner::new(
        network(),
        signer,
        hub.transport(),
        store.clone(),
        Arc::new(CounterOracle),
        RunnerConfig { io_timeout, ..RunnerConfig::default() },
    );
    hub.register(runner.clone());
    Node { runner, store, xpub }
}

pub fn node(hub: &Arc<MemoryHub>, seed: u8) -> Node {
    node_with(hub, seed, Arc::new(MemoryStore::new()), Duration::from_secs(5))
}

pub fn multisig_of(a: &Node, b: &Node) -> Address {
    channel_address(&network(), &a.xpub, &b.xpub).unwrap()
}

pub async fn setup(hub: &MemoryHub, a: &Node, b: &Node) -> Address {
    let multisig = multisig_of(a, b);
    a.runner
        .initiate(ProtocolParams::Setup(SetupParams {
            initiator_xpub: a.xpub.clone(),
            responder_xpub: b.xpub.clone(),
            multisig_address: multisig,
        }))
        .await
        .unwrap();
    hub.settle().await;
    multisig
}

/// Credit an observed on-chain ETH deposit on every listed participant.
pub async fn deposit(nodes: &[&Node], multisig: &Address, amounts: &[(Address, u64)]) {
    let mut increments = TokenIndexedCoinTransferMap::new();
    let eth = increments.entry(CONVENTION_FOR_ETH_TOKEN_ADDRESS).or_default();
    for (who, amount) in amounts {
        eth.insert(*who, U256::from(*amount));
    }
    for n in nodes {
        let next = n.channel(multisig).await.apply_deposit(&increments).unwrap();
        n.store.save_state_channels(&[next]).await.unwrap();
    }
}

pub fn install_params(a: &Node, b: &Node, multisig: Address, stakes: [u64; 2]) -> InstallParams {
    InstallParams {
        initiator_xpub: a.xpub.clone(),
        responder_xpub: b.xpub.clone(),
        multisig_address: multisig,
        app_interface: counter_app(),
        initial_state: game_state([(a.address(), stakes[0]), (b.address(), stakes[1])], 0),
        default_timeout: 100,
        initiator_balance_decrement: U256::from(stakes[0]),
        responder_balance_decrement: U256::from(stakes[1]),
        initiator_deposit_token_address: CONVENTION_FOR_ETH_TOKEN_ADDRESS,
        responder_deposit_token_address: CONVENTION_FOR_ETH_TOKEN_ADDRESS,
        interpreter_params: InterpreterParams::SingleAssetTwoPartyCoinTransfer {
            limit: U256::from(stakes[0] + stakes[1]),
            token_address: CONVENTION_FOR_ETH_TOKEN_ADDRESS,
        },
    }
}

/// Identity hash of the app installed with sequence number `seq`.
pub async fn app_at(node: &Node, multisig: &Address, seq: u64) -> H256 {
    node.channel(multisig)
        .await
        .non_free_balance_apps()
        .find(|a| a.app_seq_no == seq)
        .map(|a| a.identity_hash())
        .expect("app installed")
}
