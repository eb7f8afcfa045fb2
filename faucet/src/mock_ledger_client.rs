// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! A mock implementation of the ledger-client capability set.

use crate::crypto::FaucetSigner;
use crate::error::{FaucetError, FaucetResult};
use crate::ledger_client::LedgerClient;
use crate::transaction_builder::TransactionBuilder;
use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use faucet_types::{
    BaseToken, BlockId, Ed25519Address, LedgerUpdate, SignedTransaction, SlotIndex, Transaction,
    TransactionId, TransactionMetadata, TransactionState, UnspentOutput,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// A transaction the mock accepted for submission.
#[derive(Clone, Debug)]
pub struct SubmittedTransaction {
    pub transaction: Transaction,
    pub remainder_output_index: Option<usize>,
    pub pow_workers: usize,
}

// Mock client used in test environments.
pub struct MockLedgerClient {
    signer: FaucetSigner,
    healthy: AtomicBool,
    latest_slot: AtomicU32,
    block_counter: AtomicU64,

    unspent_outputs: Mutex<Vec<UnspentOutput>>,
    outputs_fail: AtomicBool,
    address_balances: Mutex<HashMap<Ed25519Address, BaseToken>>,
    address_balances_fail: AtomicBool,
    transaction_metadata: Mutex<HashMap<TransactionId, Option<TransactionMetadata>>>,
    metadata_fail: AtomicBool,
    // scripted failures for the next submissions, drained in order
    submission_failures: Mutex<VecDeque<FaucetError>>,
    submitted: Mutex<Vec<SubmittedTransaction>>,

    ledger_updates_tx: Mutex<Option<mpsc::Sender<LedgerUpdate>>>,
}

impl Default for MockLedgerClient {
    fn default() -> Self {
        Self {
            signer: FaucetSigner::new(SigningKey::from_bytes(&[0xfa; 32])),
            healthy: AtomicBool::new(true),
            latest_slot: AtomicU32::new(1),
            block_counter: AtomicU64::new(0),
            unspent_outputs: Mutex::new(Vec::new()),
            outputs_fail: AtomicBool::new(false),
            address_balances: Mutex::new(HashMap::new()),
            address_balances_fail: AtomicBool::new(false),
            transaction_metadata: Mutex::new(HashMap::new()),
            metadata_fail: AtomicBool::new(false),
            submission_failures: Mutex::new(VecDeque::new()),
            submitted: Mutex::new(Vec::new()),
            ledger_updates_tx: Mutex::new(None),
        }
    }
}

impl MockLedgerClient {
    /// The address the faucet under test must be created with, so the
    /// remainder output targets it.
    pub fn faucet_address(&self) -> Ed25519Address {
        self.signer.address()
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Relaxed);
    }

    pub fn set_latest_slot(&self, slot: SlotIndex) {
        self.latest_slot.store(slot, Ordering::Relaxed);
    }

    pub fn set_unspent_outputs(&self, outputs: Vec<UnspentOutput>) {
        *self.unspent_outputs.lock().unwrap() = outputs;
    }

    pub fn fail_output_queries(&self) {
        self.outputs_fail.store(true, Ordering::Relaxed);
    }

    pub fn set_address_balance(&self, address: Ed25519Address, balance: BaseToken) {
        self.address_balances.lock().unwrap().insert(address, balance);
    }

    pub fn fail_address_balance_queries(&self) {
        self.address_balances_fail.store(true, Ordering::Relaxed);
    }

    pub fn set_transaction_metadata(
        &self,
        transaction_id: TransactionId,
        metadata: Option<TransactionMetadata>,
    ) {
        self.transaction_metadata
            .lock()
            .unwrap()
            .insert(transaction_id, metadata);
    }

    pub fn fail_metadata_queries(&self) {
        self.metadata_fail.store(true, Ordering::Relaxed);
    }

    pub fn fail_next_submission(&self, reason: &str) {
        self.submission_failures
            .lock()
            .unwrap()
            .push_back(FaucetError::LedgerClient(reason.to_string()));
    }

    pub fn fail_next_submission_critically(&self, reason: &str) {
        self.submission_failures
            .lock()
            .unwrap()
            .push_back(FaucetError::LedgerClient(reason.to_string()).critical());
    }

    pub fn submitted_transactions(&self) -> Vec<SubmittedTransaction> {
        self.submitted.lock().unwrap().clone()
    }

    pub async fn send_ledger_update(&self, update: LedgerUpdate) {
        let tx = self
            .ledger_updates_tx
            .lock()
            .unwrap()
            .clone()
            .expect("nobody subscribed to ledger updates");
        tx.send(update).await.expect("subscriber went away");
    }
}

#[async_trait]
impl LedgerClient for MockLedgerClient {
    async fn is_node_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    async fn fetch_transaction_metadata(
        &self,
        transaction_id: TransactionId,
    ) -> FaucetResult<Option<TransactionMetadata>> {
        if self.metadata_fail.load(Ordering::Relaxed) {
            return Err(FaucetError::LedgerClient("metadata query failed".to_string()));
        }
        let scripted = self
            .transaction_metadata
            .lock()
            .unwrap()
            .get(&transaction_id)
            .cloned();
        match scripted {
            Some(metadata) => Ok(metadata),
            // unscripted transactions count as still pending
            None => Ok(Some(TransactionMetadata {
                state: TransactionState::Pending,
                failure_reason: None,
            })),
        }
    }

    async fn collect_unlockable_outputs(&self) -> FaucetResult<Vec<UnspentOutput>> {
        if self.outputs_fail.load(Ordering::Relaxed) {
            return Err(FaucetError::LedgerClient("output query failed".to_string()));
        }
        Ok(self.unspent_outputs.lock().unwrap().clone())
    }

    async fn compute_unlockable_address_balance(
        &self,
        address: &Ed25519Address,
    ) -> FaucetResult<BaseToken> {
        if self.address_balances_fail.load(Ordering::Relaxed) {
            return Err(FaucetError::LedgerClient("balance query failed".to_string()));
        }
        Ok(self
            .address_balances
            .lock()
            .unwrap()
            .get(address)
            .copied()
            .unwrap_or(0))
    }

    async fn latest_slot(&self) -> SlotIndex {
        self.latest_slot.load(Ordering::Relaxed)
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
        if let Some(failure) = self.submission_failures.lock().unwrap().pop_front() {
            return Err(failure);
        }

        let latest_slot = self.latest_slot.load(Ordering::Relaxed);
        let transaction = builder.finish(latest_slot, remainder_output_index)?;
        let signed_transaction = self.signer.sign_transaction(transaction.clone());

        self.submitted.lock().unwrap().push(SubmittedTransaction {
            transaction,
            remainder_output_index,
            pow_workers,
        });

        let block_number = self.block_counter.fetch_add(1, Ordering::Relaxed) + 1;
        let mut block_bytes = [0u8; 32];
        block_bytes[..8].copy_from_slice(&block_number.to_le_bytes());
        Ok((signed_transaction, BlockId::new(block_bytes)))
    }

    async fn subscribe_ledger_updates(&self) -> FaucetResult<mpsc::Receiver<LedgerUpdate>> {
        let (tx, rx) = mpsc::channel(16);
        *self.ledger_updates_tx.lock().unwrap() = Some(tx);
        Ok(rx)
    }
}
