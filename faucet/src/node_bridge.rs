// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! REST implementation of the ledger-client capability set, talking to the
//! node the faucet is attached to. Owns the faucet signer: transactions are
//! signed right before submission.

use crate::crypto::FaucetSigner;
use crate::error::{FaucetError, FaucetResult};
use crate::ledger_client::LedgerClient;
use crate::transaction_builder::TransactionBuilder;
use async_trait::async_trait;
use faucet_types::{
    BaseToken, BasicOutput, BlockId, Ed25519Address, LedgerUpdate, OutputId, ProtocolParameters,
    SignedTransaction, SlotIndex, TransactionId, TransactionMetadata, UnspentOutput,
};
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const LEDGER_UPDATE_CHANNEL_CAPACITY: usize = 64;
const LEDGER_UPDATE_POLL_TIMEOUT: Duration = Duration::from_secs(30);
const LEDGER_UPDATE_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeInfoResponse {
    status: NodeStatus,
    protocol_parameters: ProtocolParameters,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeStatus {
    is_healthy: bool,
    latest_slot: SlotIndex,
}

#[derive(Debug, Deserialize)]
struct OutputIdsResponse {
    items: Vec<OutputId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitBlockResponse {
    block_id: BlockId,
}

pub struct NodeBridge {
    http_client: reqwest::Client,
    rest_url: String,
    signer: FaucetSigner,
    faucet_address: Ed25519Address,
    protocol_parameters: OnceLock<ProtocolParameters>,
}

impl NodeBridge {
    pub fn new(
        rest_url: &str,
        request_timeout: Duration,
        signer: FaucetSigner,
    ) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        let faucet_address = signer.address();
        Ok(Self {
            http_client,
            rest_url: rest_url.trim_end_matches('/').to_string(),
            signer,
            faucet_address,
            protocol_parameters: OnceLock::new(),
        })
    }

    /// Fetches and caches the protocol parameters. Called once at startup
    /// before any other request is issued.
    pub async fn fetch_protocol_parameters(&self) -> FaucetResult<ProtocolParameters> {
        let info = self.node_info().await?;
        let _ = self.protocol_parameters.set(info.protocol_parameters.clone());
        Ok(info.protocol_parameters)
    }

    fn bech32_hrp(&self) -> FaucetResult<&str> {
        self.protocol_parameters
            .get()
            .map(|params| params.bech32_hrp.as_str())
            .ok_or_else(|| {
                FaucetError::Internal("protocol parameters not fetched yet".to_string())
            })
    }

    async fn node_info(&self) -> FaucetResult<NodeInfoResponse> {
        self.get_json(&format!("{}/api/core/v1/info", self.rest_url))
            .await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> FaucetResult<T> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(transport_error)?;
        let response = response.error_for_status().map_err(transport_error)?;
        response.json().await.map_err(transport_error)
    }

    /// All basic outputs of the given address that are free of timelock,
    /// expiration and storage-deposit-return conditions.
    async fn collect_basic_outputs(
        &self,
        address: &Ed25519Address,
    ) -> FaucetResult<Vec<UnspentOutput>> {
        let bech32_address = address.to_bech32(self.bech32_hrp()?);
        let url = format!(
            "{}/api/indexer/v1/outputs/basic?address={}&hasTimelock=false&hasExpiration=false&hasStorageDepositReturn=false",
            self.rest_url, bech32_address
        );
        let output_ids: OutputIdsResponse = self.get_json(&url).await?;

        let mut outputs = Vec::with_capacity(output_ids.items.len());
        for output_id in output_ids.items {
            let output: BasicOutput = self
                .get_json(&format!(
                    "{}/api/core/v1/outputs/{}",
                    self.rest_url,
                    output_id.to_hex()
                ))
                .await?;
            outputs.push(UnspentOutput { output_id, output });
        }
        Ok(outputs)
    }
}

fn transport_error(err: reqwest::Error) -> FaucetError {
    FaucetError::LedgerClient(err.to_string())
}

#[async_trait]
impl LedgerClient for NodeBridge {
    async fn is_node_healthy(&self) -> bool {
        match self.node_info().await {
            Ok(info) => info.status.is_healthy,
            Err(_) => false,
        }
    }

    async fn fetch_transaction_metadata(
        &self,
        transaction_id: TransactionId,
    ) -> FaucetResult<Option<TransactionMetadata>> {
        let url = format!(
            "{}/api/core/v1/transactions/{}/metadata",
            self.rest_url,
            transaction_id.to_hex()
        );
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(transport_error)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response.error_for_status().map_err(transport_error)?;
        Ok(Some(response.json().await.map_err(transport_error)?))
    }

    async fn collect_unlockable_outputs(&self) -> FaucetResult<Vec<UnspentOutput>> {
        self.collect_basic_outputs(&self.faucet_address).await
    }

    async fn compute_unlockable_address_balance(
        &self,
        address: &Ed25519Address,
    ) -> FaucetResult<BaseToken> {
        let outputs = self.collect_basic_outputs(address).await?;
        Ok(outputs
            .iter()
            .fold(0u64, |sum, unspent| {
                sum.saturating_add(unspent.output.amount)
            }))
    }

    async fn latest_slot(&self) -> SlotIndex {
        match self.node_info().await {
            Ok(info) => info.status.latest_slot,
            Err(err) => {
                debug!("failed to fetch the latest slot: {err}");
                0
            }
        }
    }

    async fn submit_transaction_payload(
        &self,
        builder: TransactionBuilder,
        remainder_output_index: Option<usize>,
        pow_workers: usize,
    ) -> FaucetResult<(SignedTransaction, BlockId)> {
        if !self.is_node_healthy().await {
            return Err(FaucetError::LedgerClient("node is not synced".to_string()));
        }

        let latest_slot = self.latest_slot().await;
        let transaction = builder.finish(latest_slot, remainder_output_index)?;
        let signed_transaction = self.signer.sign_transaction(transaction);

        let body = serde_json::json!({
            "payload": {
                "type": "signedTransaction",
                "transaction": format!("0x{}", hex::encode(signed_transaction.transaction.to_bytes())),
                "publicKey": format!("0x{}", hex::encode(signed_transaction.public_key.as_bytes())),
                "signature": format!("0x{}", hex::encode(signed_transaction.signature.to_bytes())),
            },
            "powWorkers": pow_workers,
        });

        let response = self
            .http_client
            .post(format!("{}/api/core/v1/blocks", self.rest_url))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?
            .error_for_status()
            .map_err(transport_error)?;
        let submitted: SubmitBlockResponse = response.json().await.map_err(transport_error)?;

        Ok((signed_transaction, submitted.block_id))
    }

    async fn subscribe_ledger_updates(&self) -> FaucetResult<mpsc::Receiver<LedgerUpdate>> {
        // fail fast while the caller can still treat it as fatal
        self.node_info().await?;

        let (tx, rx) = mpsc::channel(LEDGER_UPDATE_CHANNEL_CAPACITY);
        let http_client = self.http_client.clone();
        let rest_url = self.rest_url.clone();
        tokio::spawn(async move {
            let bridge = PollLoop {
                http_client,
                rest_url,
            };
            loop {
                match bridge.poll_once().await {
                    Ok(update) => {
                        if tx.send(update).await.is_err() {
                            // receiver gone, the faucet is shutting down
                            return;
                        }
                    }
                    Err(err) => {
                        warn!("ledger update poll failed: {err}");
                        tokio::time::sleep(LEDGER_UPDATE_RETRY_DELAY).await;
                    }
                }
            }
        });
        Ok(rx)
    }
}

struct PollLoop {
    http_client: reqwest::Client,
    rest_url: String,
}

impl PollLoop {
    async fn poll_once(&self) -> FaucetResult<LedgerUpdate> {
        let url = format!(
            "{}/api/core/v1/ledger/updates?timeoutMs={}",
            self.rest_url,
            LEDGER_UPDATE_POLL_TIMEOUT.as_millis()
        );
        let response = self
            .http_client
            .get(&url)
            .timeout(LEDGER_UPDATE_POLL_TIMEOUT + Duration::from_secs(10))
            .send()
            .await
            .map_err(transport_error)?
            .error_for_status()
            .map_err(transport_error)?;
        response.json().await.map_err(transport_error)
    }
}
