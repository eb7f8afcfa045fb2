// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Request-batching and transaction-lifecycle engine.
//!
//! Maintains:
//! - a bounded FIFO of admitted requests plus an address index enforcing
//!   one outstanding request per address
//! - a conservative projection of the faucet balance (unspent outputs minus
//!   the reserved storage deposit minus all queued commitments)
//! - the single pending-transaction slot resolved by the lifecycle checks
//!
//! All mutable state lives behind one readers-writer lock; helpers suffixed
//! `_without_locking` expect the caller to hold the write lock.

mod batcher;
mod lifecycle;

use crate::error::{FaucetError, FaucetResult};
use crate::events::FaucetEvents;
use crate::ledger_client::LedgerClient;
use crate::metrics::FaucetMetrics;
use faucet_types::{
    BaseToken, BasicOutput, BlockId, Ed25519Address, Mana, OutputId, ProtocolParameters,
    TransactionId, UnspentOutput,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::warn;

/// Options of the faucet.
#[derive(Clone, Debug)]
pub struct FaucetOptions {
    /// The name of the dispensed token.
    pub token_name: String,
    /// Amount of funds the requester receives.
    pub base_token_amount: BaseToken,
    /// Amount the requester receives if the target address already holds
    /// more than `base_token_amount` and less than the maximum.
    pub base_token_amount_small: BaseToken,
    /// Maximum allowed amount of funds on the target address; requests for
    /// richer addresses are rejected.
    pub base_token_amount_max_target: BaseToken,
    /// Amount of mana attached to each payout output.
    pub mana_amount: Mana,
    /// Minimum amount of mana the faucet keeps before payouts are halted.
    pub mana_amount_min_faucet: Mana,
    /// Tag of the tagged-data payload attached to faucet transactions.
    pub tag_message: Vec<u8>,
    /// Maximum duration for collecting a batch of requests.
    pub batch_timeout: Duration,
    /// Workers used for proof of work when issuing blocks.
    pub pow_worker_count: usize,
    /// Capacity of the request queue.
    pub queue_capacity: usize,
}

impl Default for FaucetOptions {
    fn default() -> Self {
        Self {
            token_name: "TestToken".to_string(),
            base_token_amount: 10_000_000,
            base_token_amount_small: 1_000_000,
            base_token_amount_max_target: 20_000_000,
            mana_amount: 1_000,
            mana_amount_min_faucet: 1_000_000,
            tag_message: b"FAUCET".to_vec(),
            batch_timeout: Duration::from_secs(2),
            pow_worker_count: 1,
            queue_capacity: 5_000,
        }
    }
}

/// An admitted faucet request.
#[derive(Debug, PartialEq, Eq)]
pub struct QueuedRequest {
    /// The address in its human-readable form, key of the address index.
    pub bech32: String,
    pub address: Ed25519Address,
    /// The committed amount, already subtracted from the balance projection.
    pub amount: BaseToken,
}

/// Info about a sent transaction that is still pending.
#[derive(Clone, Debug)]
pub(crate) struct PendingTransaction {
    pub(crate) block_id: BlockId,
    pub(crate) transaction_id: TransactionId,
    pub(crate) consumed_inputs: Vec<OutputId>,
    pub(crate) batched_requests: Vec<Arc<QueuedRequest>>,
}

/// State guarded by the faucet's readers-writer lock.
pub(crate) struct FaucetState {
    /// Remaining balance of the faucet if all queued requests were paid out.
    pub(crate) faucet_balance: BaseToken,
    /// All queued or in-flight requests per bech32 address.
    pub(crate) queue_map: HashMap<String, Arc<QueuedRequest>>,
    /// The currently sent transaction that is still pending.
    pub(crate) pending_transaction: Option<PendingTransaction>,
}

/// Defines the response of a GET /info REST API call.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse {
    /// Whether the faucet is healthy.
    pub is_healthy: bool,
    /// The bech32 address of the faucet.
    pub address: String,
    /// The remaining balance of the faucet.
    pub balance: BaseToken,
    /// The name of the token of the faucet.
    pub token_name: String,
    /// The bech32 human readable part of the faucet.
    pub bech32_hrp: String,
}

/// Defines the response of a POST /enqueue REST API call.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueResponse {
    /// The bech32 address.
    pub address: String,
    /// The number of waiting requests in the queue.
    pub waiting_requests: usize,
}

/// Issues transactions to users that requested funds via the REST endpoint.
pub struct Faucet {
    ledger: Arc<dyn LedgerClient>,
    address: Ed25519Address,
    protocol_parameters: ProtocolParameters,
    options: FaucetOptions,
    events: FaucetEvents,
    metrics: Arc<FaucetMetrics>,

    state: RwLock<FaucetState>,
    queue_tx: mpsc::Sender<Arc<QueuedRequest>>,
    // only the batcher receives; the mutex makes that exclusivity explicit
    queue_rx: Mutex<mpsc::Receiver<Arc<QueuedRequest>>>,
    flush_tx: mpsc::Sender<()>,
    flush_rx: Mutex<mpsc::Receiver<()>>,
}

impl Faucet {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        address: Ed25519Address,
        protocol_parameters: ProtocolParameters,
        options: FaucetOptions,
        metrics: Arc<FaucetMetrics>,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(options.queue_capacity);
        let (flush_tx, flush_rx) = mpsc::channel(1);
        Self {
            ledger,
            address,
            protocol_parameters,
            options,
            events: FaucetEvents::new(),
            metrics,
            state: RwLock::new(FaucetState {
                faucet_balance: 0,
                queue_map: HashMap::new(),
                pending_transaction: None,
            }),
            queue_tx,
            queue_rx: Mutex::new(queue_rx),
            flush_tx,
            flush_rx: Mutex::new(flush_rx),
        }
    }

    /// The canonical empty basic output used to size the storage deposit
    /// reserved for the future remainder output.
    pub(crate) fn empty_remainder_output() -> BasicOutput {
        BasicOutput::default()
    }

    /// Returns the health status of the faucet.
    pub async fn is_healthy(&self) -> bool {
        self.ledger.is_node_healthy().await
    }

    /// The deposit address of the faucet.
    pub fn address(&self) -> &Ed25519Address {
        &self.address
    }

    pub fn events(&self) -> &FaucetEvents {
        &self.events
    }

    /// Returns the used faucet address and remaining balance.
    pub async fn info(&self) -> InfoResponse {
        let balance = self.state.read().await.faucet_balance;
        InfoResponse {
            is_healthy: self.ledger.is_node_healthy().await,
            address: self.address.to_bech32(&self.protocol_parameters.bech32_hrp),
            balance,
            token_name: self.options.token_name.clone(),
            bech32_hrp: self.protocol_parameters.bech32_hrp.clone(),
        }
    }

    /// Adds a new faucet request to the queue.
    pub async fn enqueue(&self, bech32_address: &str) -> FaucetResult<EnqueueResponse> {
        let address = self.parse_bech32_address(bech32_address)?;

        if !self.ledger.is_node_healthy().await {
            return Err(FaucetError::NodeUnhealthy);
        }

        if self.is_already_in_queue(bech32_address).await {
            return Err(FaucetError::AlreadyInQueue);
        }

        let mut base_token_amount = self.options.base_token_amount;
        // a failing balance query is not fatal for admission, the standard
        // amount is used in that case
        if let Ok(balance) = self
            .ledger
            .compute_unlockable_address_balance(&address)
            .await
        {
            if balance >= self.options.base_token_amount {
                base_token_amount = self.options.base_token_amount_small;

                if balance >= self.options.base_token_amount_max_target {
                    return Err(FaucetError::EnoughFundsOnAddress);
                }
            }
        }

        // we already need to lock here to read the correct faucet balance
        // and to add the request to the queue map
        let mut state = self.state.write().await;

        // the read-locked check above can race with a concurrent admission
        // of the same address, the write lock settles it
        if state.queue_map.contains_key(bech32_address) {
            return Err(FaucetError::AlreadyInQueue);
        }

        if base_token_amount > state.faucet_balance {
            return Err(FaucetError::InsufficientFaucetFunds);
        }

        let request = Arc::new(QueuedRequest {
            bech32: bech32_address.to_string(),
            address,
            amount: base_token_amount,
        });

        match self.queue_tx.try_send(request.clone()) {
            Ok(()) => {
                state.faucet_balance -= base_token_amount;
                state
                    .queue_map
                    .insert(bech32_address.to_string(), request);
                self.metrics.faucet_balance.set(state.faucet_balance as i64);
                self.metrics.queued_requests.set(state.queue_map.len() as i64);

                Ok(EnqueueResponse {
                    address: bech32_address.to_string(),
                    waiting_requests: state.queue_map.len(),
                })
            }
            Err(_) => Err(FaucetError::QueueFull),
        }
    }

    /// Stops the current batching of faucet requests.
    pub fn flush_requests(&self) {
        // a single token is enough, an already-signaled flush is a no-op
        let _ = self.flush_tx.try_send(());
    }

    /// The number of queued or in-flight requests.
    pub async fn queue_depth(&self) -> usize {
        self.state.read().await.queue_map.len()
    }

    pub(crate) fn log_soft_error(&self, err: FaucetError) {
        warn!("{err}");
        self.metrics.soft_errors.inc();
        self.events.emit_soft_error(err.to_string());
    }

    fn parse_bech32_address(&self, bech32_address: &str) -> FaucetResult<Ed25519Address> {
        let (hrp, address) = Ed25519Address::from_bech32(bech32_address)
            .map_err(|e| FaucetError::InvalidAddress(e.to_string()))?;
        if hrp != self.protocol_parameters.bech32_hrp {
            return Err(FaucetError::InvalidAddress(format!(
                "address does not start with \"{}\"",
                self.protocol_parameters.bech32_hrp
            )));
        }
        Ok(address)
    }

    async fn is_already_in_queue(&self, bech32_address: &str) -> bool {
        self.state.read().await.queue_map.contains_key(bech32_address)
    }

    /// Collects the faucet's unspent outputs and computes the spendable
    /// balance: the raw sum minus the storage deposit reserved for the
    /// remainder output minus all currently queued commitments.
    ///
    /// The caller must hold the write lock: the queue map is read here and
    /// the result is published to shared state without interleaving.
    pub(crate) async fn collect_outputs_and_balance_without_locking(
        &self,
        state: &FaucetState,
    ) -> FaucetResult<(Vec<UnspentOutput>, BaseToken)> {
        let unspent_outputs = self.ledger.collect_unlockable_outputs().await?;

        let mut balance: BaseToken = 0;
        for unspent_output in &unspent_outputs {
            balance = balance.saturating_add(unspent_output.output.amount);
        }

        let queued_balance: BaseToken = state
            .queue_map
            .values()
            .map(|request| request.amount)
            .sum();

        // reserve the storage deposit for a simple basic output, which
        // simplifies the remainder handling
        let min_storage_deposit = self
            .protocol_parameters
            .min_storage_deposit(&Self::empty_remainder_output());

        balance = balance.saturating_sub(min_storage_deposit);
        balance = balance.saturating_sub(queued_balance);

        Ok((unspent_outputs, balance))
    }

    /// Computes the initial faucet balance. A failure here is fatal.
    pub(crate) async fn compute_and_set_initial_balance(&self) -> FaucetResult<()> {
        let mut state = self.state.write().await;
        let (_, balance) = self
            .collect_outputs_and_balance_without_locking(&state)
            .await?;
        state.faucet_balance = balance;
        self.metrics.faucet_balance.set(balance as i64);
        Ok(())
    }

    /// Clears a request from the address index so the address can request
    /// funds again. Write lock must be held by the caller.
    pub(crate) fn clear_request_without_locking(
        &self,
        state: &mut FaucetState,
        request: &QueuedRequest,
    ) {
        state.queue_map.remove(&request.bech32);
        self.metrics.queued_requests.set(state.queue_map.len() as i64);
    }

    /// Adds requests back to the queue. If the queue is full the request is
    /// dropped from the address index so the user can request again.
    /// Write lock must be held by the caller.
    pub(crate) fn readd_requests_without_locking(
        &self,
        state: &mut FaucetState,
        requests: Vec<Arc<QueuedRequest>>,
    ) {
        for request in requests {
            if let Err(mpsc::error::TrySendError::Full(request)) =
                self.queue_tx.try_send(request)
            {
                warn!(
                    "queue full, dropping request for {} instead of re-adding it",
                    request.bech32
                );
                self.clear_request_without_locking(state, &request);
            }
        }
    }

    /// Drops the batched requests of the pending transaction and frees the
    /// pending slot. Write lock must be held by the caller.
    pub(crate) fn clear_pending_requests_without_locking(&self, state: &mut FaucetState) {
        if let Some(pending) = state.pending_transaction.take() {
            for request in &pending.batched_requests {
                self.clear_request_without_locking(state, request);
            }
        }
    }

    /// Returns the batched requests of the pending transaction to the queue
    /// and frees the pending slot. Write lock must be held by the caller.
    pub(crate) fn readd_pending_requests_without_locking(&self, state: &mut FaucetState) {
        if let Some(pending) = state.pending_transaction.take() {
            self.readd_requests_without_locking(state, pending.batched_requests);
        }
    }
}

pub(crate) fn same_pending_transaction(
    a: &Option<PendingTransaction>,
    b: &Option<PendingTransaction>,
) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.transaction_id == b.transaction_id,
        (None, None) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_ledger_client::MockLedgerClient;
    use crate::test_utils::{
        new_test_faucet, test_address, test_bech32, test_faucet_with_options, test_options,
        test_protocol_parameters, unspent_output,
    };

    #[tokio::test]
    async fn test_enqueue_commits_amount_and_depth() {
        let mock = Arc::new(MockLedgerClient::default());
        mock.set_unspent_outputs(vec![unspent_output(1, 100_000_000, 0)]);
        let faucet = new_test_faucet(mock).await;
        let initial_balance = faucet.state.read().await.faucet_balance;

        let response = faucet.enqueue(&test_bech32(1)).await.unwrap();
        assert_eq!(response.address, test_bech32(1));
        assert_eq!(response.waiting_requests, 1);

        let state = faucet.state.read().await;
        assert_eq!(
            state.faucet_balance,
            initial_balance - test_options().base_token_amount
        );
        assert!(state.queue_map.contains_key(&test_bech32(1)));
    }

    #[tokio::test]
    async fn test_enqueue_rejects_duplicate_address() {
        let mock = Arc::new(MockLedgerClient::default());
        mock.set_unspent_outputs(vec![unspent_output(1, 100_000_000, 0)]);
        let faucet = new_test_faucet(mock).await;

        faucet.enqueue(&test_bech32(1)).await.unwrap();
        assert_eq!(
            faucet.enqueue(&test_bech32(1)).await.unwrap_err(),
            FaucetError::AlreadyInQueue
        );
    }

    #[tokio::test]
    async fn test_concurrent_admissions_of_same_address_admit_once() {
        let mock = Arc::new(MockLedgerClient::default());
        mock.set_unspent_outputs(vec![unspent_output(1, 1_000_000_000, 0)]);
        let faucet = new_test_faucet(mock).await;

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let faucet = faucet.clone();
                tokio::spawn(async move { faucet.enqueue(&test_bech32(1)).await })
            })
            .collect();

        let mut successes = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(faucet.queue_depth().await, 1);
    }

    #[tokio::test]
    async fn test_enqueue_rejects_invalid_address() {
        let mock = Arc::new(MockLedgerClient::default());
        let faucet = new_test_faucet(mock).await;

        assert!(matches!(
            faucet.enqueue("garbage").await.unwrap_err(),
            FaucetError::InvalidAddress(_)
        ));
    }

    #[tokio::test]
    async fn test_enqueue_rejects_wrong_network_prefix() {
        let mock = Arc::new(MockLedgerClient::default());
        let faucet = new_test_faucet(mock).await;

        let foreign = test_address(1).to_bech32("other");
        assert!(matches!(
            faucet.enqueue(&foreign).await.unwrap_err(),
            FaucetError::InvalidAddress(_)
        ));
    }

    #[tokio::test]
    async fn test_enqueue_rejects_when_node_unhealthy() {
        let mock = Arc::new(MockLedgerClient::default());
        mock.set_healthy(false);
        let faucet = new_test_faucet(mock).await;

        assert_eq!(
            faucet.enqueue(&test_bech32(1)).await.unwrap_err(),
            FaucetError::NodeUnhealthy
        );
    }

    #[tokio::test]
    async fn test_enqueue_uses_small_amount_for_funded_target() {
        let options = test_options();
        let mock = Arc::new(MockLedgerClient::default());
        mock.set_unspent_outputs(vec![unspent_output(1, 100_000_000, 0)]);
        // between the standard amount and the maximum
        mock.set_address_balance(test_address(2), 15_000_000);
        let faucet = new_test_faucet(mock).await;

        faucet.enqueue(&test_bech32(2)).await.unwrap();
        let state = faucet.state.read().await;
        assert_eq!(
            state.queue_map[&test_bech32(2)].amount,
            options.base_token_amount_small
        );
    }

    #[tokio::test]
    async fn test_enqueue_rejects_rich_target() {
        let mock = Arc::new(MockLedgerClient::default());
        mock.set_unspent_outputs(vec![unspent_output(1, 100_000_000, 0)]);
        mock.set_address_balance(test_address(3), 25_000_000);
        let faucet = new_test_faucet(mock).await;

        assert_eq!(
            faucet.enqueue(&test_bech32(3)).await.unwrap_err(),
            FaucetError::EnoughFundsOnAddress
        );
    }

    #[tokio::test]
    async fn test_enqueue_falls_back_to_standard_amount_on_balance_error() {
        let options = test_options();
        let mock = Arc::new(MockLedgerClient::default());
        mock.set_unspent_outputs(vec![unspent_output(1, 100_000_000, 0)]);
        mock.fail_address_balance_queries();
        let faucet = new_test_faucet(mock).await;

        faucet.enqueue(&test_bech32(4)).await.unwrap();
        let state = faucet.state.read().await;
        assert_eq!(
            state.queue_map[&test_bech32(4)].amount,
            options.base_token_amount
        );
    }

    #[tokio::test]
    async fn test_enqueue_rejects_when_faucet_is_broke() {
        let mock = Arc::new(MockLedgerClient::default());
        // barely above the reserved storage deposit
        mock.set_unspent_outputs(vec![unspent_output(1, 10_000, 0)]);
        let faucet = new_test_faucet(mock).await;

        assert_eq!(
            faucet.enqueue(&test_bech32(1)).await.unwrap_err(),
            FaucetError::InsufficientFaucetFunds
        );
    }

    #[tokio::test]
    async fn test_enqueue_rejects_when_queue_is_full() {
        let mut options = test_options();
        options.queue_capacity = 2;
        let mock = Arc::new(MockLedgerClient::default());
        mock.set_unspent_outputs(vec![unspent_output(1, 1_000_000_000, 0)]);
        let faucet = test_faucet_with_options(mock, options).await;

        faucet.enqueue(&test_bech32(1)).await.unwrap();
        faucet.enqueue(&test_bech32(2)).await.unwrap();
        assert_eq!(
            faucet.enqueue(&test_bech32(3)).await.unwrap_err(),
            FaucetError::QueueFull
        );

        // the failed admission must not leak into the address index
        let state = faucet.state.read().await;
        assert!(!state.queue_map.contains_key(&test_bech32(3)));
    }

    #[tokio::test]
    async fn test_balance_projection_subtracts_deposit_and_queue() {
        let params = test_protocol_parameters();
        let reserved = params.min_storage_deposit(&Faucet::empty_remainder_output());
        let mock = Arc::new(MockLedgerClient::default());
        mock.set_unspent_outputs(vec![
            unspent_output(1, 60_000_000, 0),
            unspent_output(2, 40_000_000, 0),
        ]);
        let faucet = new_test_faucet(mock).await;

        faucet.enqueue(&test_bech32(1)).await.unwrap();

        let state = faucet.state.write().await;
        let (outputs, balance) = faucet
            .collect_outputs_and_balance_without_locking(&state)
            .await
            .unwrap();
        assert_eq!(outputs.len(), 2);
        assert_eq!(
            balance,
            100_000_000 - reserved - test_options().base_token_amount
        );
    }

    #[tokio::test]
    async fn test_balance_projection_never_goes_negative() {
        let mock = Arc::new(MockLedgerClient::default());
        mock.set_unspent_outputs(vec![unspent_output(1, 10, 0)]);
        let faucet = new_test_faucet(mock).await;

        let state = faucet.state.write().await;
        let (_, balance) = faucet
            .collect_outputs_and_balance_without_locking(&state)
            .await
            .unwrap();
        assert_eq!(balance, 0);
    }

    #[tokio::test]
    async fn test_info_reports_projection_and_hrp() {
        let params = test_protocol_parameters();
        let mock = Arc::new(MockLedgerClient::default());
        mock.set_unspent_outputs(vec![unspent_output(1, 100_000_000, 0)]);
        let faucet = new_test_faucet(mock).await;

        let info = faucet.info().await;
        assert!(info.is_healthy);
        assert_eq!(info.bech32_hrp, params.bech32_hrp);
        assert_eq!(info.token_name, test_options().token_name);
        assert!(info.address.starts_with(&params.bech32_hrp));
        assert!(info.balance > 0);
    }

    #[tokio::test]
    async fn test_initial_balance_failure_is_reported() {
        let mock = Arc::new(MockLedgerClient::default());
        mock.fail_output_queries();
        let faucet = test_faucet_with_options(mock, test_options()).await;

        assert!(faucet.compute_and_set_initial_balance().await.is_err());
    }

    #[tokio::test]
    async fn test_readd_drops_requests_when_queue_is_full() {
        let mut options = test_options();
        options.queue_capacity = 1;
        let mock = Arc::new(MockLedgerClient::default());
        mock.set_unspent_outputs(vec![unspent_output(1, 1_000_000_000, 0)]);
        let faucet = test_faucet_with_options(mock, options).await;

        faucet.enqueue(&test_bech32(1)).await.unwrap();

        let overflow = Arc::new(QueuedRequest {
            bech32: test_bech32(9),
            address: test_address(9),
            amount: 1,
        });
        let mut state = faucet.state.write().await;
        state.queue_map.insert(test_bech32(9), overflow.clone());
        faucet.readd_requests_without_locking(&mut state, vec![overflow]);

        // dropped from the index so the user can request again
        assert!(!state.queue_map.contains_key(&test_bech32(9)));
        assert!(state.queue_map.contains_key(&test_bech32(1)));
    }
}
