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

//! Engine configuration file.
//!
//! ```text
//! [engine]
//! io_timeout_ms = 60000
//! max_message_bytes = 1048576
//! data_dir = "./data"
//!
//! [network]
//! challenge_registry = "0x..."
//! proxy_factory = "0x..."
//! proxy_creation_code = "0x..."
//! # remaining contract roles
//! ```

use crate::core::{
    protocol::message::DEFAULT_MAX_MESSAGE_BYTES,
    runtime::RunnerConfig,
    types::NetworkContext,
};
use serde::Deserialize;
use std::fs;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read.
    #[error("read")]
    Read,
    /// Not valid TOML or wrong schema.
    #[error("parse: {0}")]
    Parse(String),
    /// Value out of range.
    #[error("invalid: {0}")]
    Invalid(&'static str),
}

fn default_io_timeout_ms() -> u64 {
    60_000
}

fn default_max_message_bytes() -> usize {
    DEFAULT_MAX_MESSAGE_BYTES
}

fn default_data_dir() -> String {
    "./data".to_string()
}

/// `[engine]` table.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSettings {
    /// Wait budget of one `SendAndWait`, milliseconds.
    #[serde(default = "default_io_timeout_ms")]
    pub io_timeout_ms: u64,
    /// Cap on an inbound encoded message.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
    /// Directory holding the seed, audit log and database.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            io_timeout_ms: default_io_timeout_ms(),
            max_message_bytes: default_max_message_bytes(),
            data_dir: default_data_dir(),
        }
    }
}

/// Whole configuration file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// Engine settings.
    #[serde(default)]
    pub engine: EngineSettings,
    /// Deployed contract addresses.
    #[serde(default)]
    pub network: NetworkContext,
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let cfg: EngineConfig = toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        if cfg.engine.io_timeout_ms == 0 {
            return Err(ConfigError::Invalid("io_timeout_ms must be positive"));
        }
        if cfg.engine.max_message_bytes == 0 {
            return Err(ConfigError::Invalid("max_message_bytes must be positive"));
        }
        Ok(cfg)
    }

    /// Read and parse `path`.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|_| ConfigError::Read)?;
        Self::from_toml_str(&raw)
    }

    /// Runner settings derived from `[engine]`.
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            io_timeout: Duration::from_millis(self.engine.io_timeout_ms),
            max_message_bytes: self.engine.max_message_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Address;

    #[test]
    fn empty_document_takes_defaults() {
        let cfg = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.engine, EngineSettings::default());
        assert_eq!(cfg.runner_config().io_timeout, Duration::from_secs(60));
        assert_eq!(cfg.network, NetworkContext::default());
    }

    #[test]
    fn network_table_is_read() {
        let raw = r#"
            [engine]
            io_timeout_ms = 250

            [network]
            proxy_factory = "0x1111111111111111111111111111111111111111"
            proxy_creation_code = "0x6080"
        "#;
        let cfg = EngineConfig::from_toml_str(raw).unwrap();
        assert_eq!(cfg.engine.io_timeout_ms, 250);
        assert_eq!(cfg.network.proxy_factory, Address::repeat_byte(0x11));
        assert_eq!(cfg.network.proxy_creation_code, vec![0x60, 0x80]);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = EngineConfig::from_toml_str("[engine]\nio_timeout_ms = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn unknown_engine_key_is_rejected() {
        let err = EngineConfig::from_toml_str("[engine]\nbogus = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
