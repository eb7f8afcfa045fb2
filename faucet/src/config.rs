// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::crypto::{load_ed25519_private_keys_from_env, FaucetSigner, FAUCET_KEY_ENV};
use crate::faucet::FaucetOptions;
use crate::node_bridge::NodeBridge;
use anyhow::{anyhow, Context};
use faucet_types::{BaseToken, Ed25519Address, Mana, ProtocolParameters};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct NodeConfig {
    // Rest API url of the node the faucet is attached to.
    pub rest_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct FaucetConfig {
    #[serde(default = "default_token_name")]
    pub token_name: String,
    // Amount of funds the requester receives.
    #[serde(default = "default_base_token_amount")]
    pub base_token_amount: BaseToken,
    // Amount the requester receives if the target address already has funds.
    #[serde(default = "default_base_token_amount_small")]
    pub base_token_amount_small: BaseToken,
    // Maximum allowed amount of funds on the target address.
    #[serde(default = "default_base_token_amount_max_target")]
    pub base_token_amount_max_target: BaseToken,
    // Amount of mana attached to each payout output.
    #[serde(default = "default_mana_amount")]
    pub mana_amount: Mana,
    // Minimum amount of mana the faucet holds before payouts are halted.
    #[serde(default = "default_mana_amount_min_faucet")]
    pub mana_amount_min_faucet: Mana,
    #[serde(default = "default_tag_message")]
    pub tag_message: String,
    // Maximum duration for collecting faucet batches.
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
    #[serde(default = "default_pow_worker_count")]
    pub pow_worker_count: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_token_name() -> String {
    "TestToken".to_string()
}

fn default_base_token_amount() -> BaseToken {
    10_000_000
}

fn default_base_token_amount_small() -> BaseToken {
    1_000_000
}

fn default_base_token_amount_max_target() -> BaseToken {
    20_000_000
}

fn default_mana_amount() -> Mana {
    1_000
}

fn default_mana_amount_min_faucet() -> Mana {
    1_000_000
}

fn default_tag_message() -> String {
    "FAUCET".to_string()
}

fn default_batch_timeout_ms() -> u64 {
    2_000
}

fn default_pow_worker_count() -> usize {
    1
}

fn default_queue_capacity() -> usize {
    5_000
}

impl Default for FaucetConfig {
    fn default() -> Self {
        // serde_yaml on an empty mapping yields all the field defaults
        serde_yaml::from_str("{}").expect("defaults must deserialize")
    }
}

impl From<&FaucetConfig> for FaucetOptions {
    fn from(config: &FaucetConfig) -> Self {
        Self {
            token_name: config.token_name.clone(),
            base_token_amount: config.base_token_amount,
            base_token_amount_small: config.base_token_amount_small,
            base_token_amount_max_target: config.base_token_amount_max_target,
            mana_amount: config.mana_amount,
            mana_amount_min_faucet: config.mana_amount_min_faucet,
            tag_message: config.tag_message.clone().into_bytes(),
            batch_timeout: Duration::from_millis(config.batch_timeout_ms),
            pow_worker_count: config.pow_worker_count,
            queue_capacity: config.queue_capacity,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct FaucetNodeConfig {
    // The port that the faucet API listens on.
    pub server_listen_port: u16,
    // The port for the metrics server.
    pub metrics_port: u16,
    // Node connection settings.
    pub node: NodeConfig,
    #[serde(default)]
    pub faucet: FaucetConfig,
}

impl FaucetNodeConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read config file {:?}", path.as_ref()))?;
        serde_yaml::from_str(&content).context("failed to parse config file")
    }

    /// Connects to the node, loads the signing key from the environment and
    /// produces the runtime wiring. Any failure here is fatal for startup.
    pub async fn validate(&self) -> anyhow::Result<FaucetServerConfig> {
        info!("starting config validation");

        let mut private_keys = load_ed25519_private_keys_from_env(FAUCET_KEY_ENV)
            .context("loading faucet private key failed")?;
        if private_keys.is_empty() {
            return Err(anyhow!("loading faucet private key failed: no private keys given"));
        }
        if private_keys.len() > 1 {
            return Err(anyhow!(
                "loading faucet private key failed: too many private keys given"
            ));
        }
        let signer = FaucetSigner::new(private_keys.remove(0));
        let faucet_address = signer.address();

        let node_bridge = Arc::new(NodeBridge::new(
            &self.node.rest_url,
            Duration::from_millis(self.node.request_timeout_ms),
            signer,
        )?);

        let protocol_parameters = node_bridge
            .fetch_protocol_parameters()
            .await
            .context("failed to fetch protocol parameters from the node")?;

        info!(
            "config validation complete, faucet address: {}",
            faucet_address.to_bech32(&protocol_parameters.bech32_hrp)
        );

        Ok(FaucetServerConfig {
            node_bridge,
            faucet_address,
            protocol_parameters,
            options: FaucetOptions::from(&self.faucet),
        })
    }
}

/// Validated runtime configuration of the faucet node.
pub struct FaucetServerConfig {
    pub node_bridge: Arc<NodeBridge>,
    pub faucet_address: Ed25519Address,
    pub protocol_parameters: ProtocolParameters,
    pub options: FaucetOptions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config: FaucetNodeConfig = serde_yaml::from_str(
            r#"
server-listen-port: 8091
metrics-port: 9312
node:
  rest-url: "http://localhost:14265"
"#,
        )
        .unwrap();

        assert_eq!(config.server_listen_port, 8091);
        assert_eq!(config.node.request_timeout_ms, 10_000);
        assert_eq!(config.faucet.base_token_amount, 10_000_000);
        assert_eq!(config.faucet.base_token_amount_small, 1_000_000);
        assert_eq!(config.faucet.base_token_amount_max_target, 20_000_000);
        assert_eq!(config.faucet.mana_amount, 1_000);
        assert_eq!(config.faucet.mana_amount_min_faucet, 1_000_000);
        assert_eq!(config.faucet.tag_message, "FAUCET");
        assert_eq!(config.faucet.batch_timeout_ms, 2_000);
        assert_eq!(config.faucet.queue_capacity, 5_000);
    }

    #[test]
    fn test_kebab_case_overrides() {
        let config: FaucetNodeConfig = serde_yaml::from_str(
            r#"
server-listen-port: 8091
metrics-port: 9312
node:
  rest-url: "http://localhost:14265"
  request-timeout-ms: 500
faucet:
  token-name: "Shimmer"
  base-token-amount: 42
  batch-timeout-ms: 100
"#,
        )
        .unwrap();

        assert_eq!(config.node.request_timeout_ms, 500);
        assert_eq!(config.faucet.token_name, "Shimmer");
        assert_eq!(config.faucet.base_token_amount, 42);

        let options = FaucetOptions::from(&config.faucet);
        assert_eq!(options.batch_timeout, Duration::from_millis(100));
        assert_eq!(options.tag_message, b"FAUCET".to_vec());
    }
}
