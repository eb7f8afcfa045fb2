// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Lifecycle resolution of the pending transaction.
//!
//! Two independent sources of truth resolve the same pending slot: the
//! periodic transaction-metadata poll and the pushed ledger updates. Both
//! compute a verdict from a read-lock snapshot and re-check the slot after
//! acquiring the write lock, so exactly one terminal decision is applied
//! per pending transaction.

use super::{same_pending_transaction, Faucet, FaucetState, PendingTransaction};
use crate::error::FaucetError;
use faucet_types::{LedgerUpdate, OutputId, TransactionState};
use tracing::debug;

/// Terminal decision for a pending transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Verdict {
    /// Transaction settled: drop the batched requests, free the slot.
    Clear,
    /// Transaction failed, orphaned or conflicting: requeue the batched
    /// requests, free the slot.
    Readd,
    /// Still undecided, leave the slot armed.
    Keep,
}

#[derive(Debug)]
pub(crate) struct Resolution {
    pub(crate) verdict: Verdict,
    pub(crate) log_message: Option<String>,
    pub(crate) soft_error: Option<FaucetError>,
}

impl Resolution {
    fn keep(log_message: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Keep,
            log_message: Some(log_message.into()),
            soft_error: None,
        }
    }

    fn clear(log_message: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Clear,
            log_message: Some(log_message.into()),
            soft_error: None,
        }
    }

    fn readd(soft_error: FaucetError) -> Self {
        Self {
            verdict: Verdict::Readd,
            log_message: None,
            soft_error: Some(soft_error),
        }
    }
}

impl Faucet {
    /// Checks whether the pending transaction was accepted, orphaned or
    /// failed, driven by the periodic ticker. On a problem the batched
    /// requests are re-added to the queue.
    pub async fn check_pending_transaction_state(&self) {
        let snapshot = self.state.read().await.pending_transaction.clone();
        let Some(pending) = snapshot else {
            debug!("no pending transaction found");
            return;
        };

        let resolution = self.resolve_by_metadata(&pending).await;
        if resolution.verdict == Verdict::Keep {
            self.report_resolution(&resolution);
            return;
        }

        // the verdict came from a read-lock snapshot; re-check under the
        // write lock and decide again if the slot changed in between
        let mut state = self.state.write().await;
        let resolution =
            if !same_pending_transaction(&state.pending_transaction, &Some(pending)) {
                match state.pending_transaction.clone() {
                    None => {
                        debug!("pending transaction already resolved");
                        return;
                    }
                    Some(current) => self.resolve_by_metadata(&current).await,
                }
            } else {
                resolution
            };

        self.apply_resolution_without_locking(&mut state, resolution);
    }

    /// Applies a pushed ledger update to the pending transaction. Presence
    /// of the transaction's output 0 among the created outputs witnesses
    /// success (transactions create all or none of their outputs);
    /// consumption of any declared input without that witness means a
    /// conflicting transaction spent the faucet's inputs.
    pub async fn apply_ledger_update(&self, update: &LedgerUpdate) {
        let snapshot = self.state.read().await.pending_transaction.clone();
        let Some(pending) = snapshot else {
            return;
        };

        let resolution = resolve_by_ledger_update(&pending, update);
        if resolution.verdict == Verdict::Keep {
            self.report_resolution(&resolution);
            return;
        }

        let mut state = self.state.write().await;
        let resolution =
            if !same_pending_transaction(&state.pending_transaction, &Some(pending)) {
                match state.pending_transaction.clone() {
                    None => return,
                    Some(current) => resolve_by_ledger_update(&current, update),
                }
            } else {
                resolution
            };

        self.apply_resolution_without_locking(&mut state, resolution);
    }

    async fn resolve_by_metadata(&self, pending: &PendingTransaction) -> Resolution {
        let metadata = match self
            .ledger
            .fetch_transaction_metadata(pending.transaction_id)
            .await
        {
            Ok(metadata) => metadata,
            Err(_) => {
                return Resolution::readd(FaucetError::LedgerClient(format!(
                    "failed to fetch metadata of the pending transaction, blockID: {}, txID: {}",
                    pending.block_id, pending.transaction_id
                )));
            }
        };

        let Some(metadata) = metadata else {
            // metadata unknown, this can only happen if the block was orphaned
            return Resolution::readd(FaucetError::LedgerClient(format!(
                "metadata of the pending transaction is unknown, blockID: {}, txID: {}",
                pending.block_id, pending.transaction_id
            )));
        };

        match metadata.state {
            TransactionState::Unknown => {
                // the transaction is not known, so the block must have been
                // filtered by the node
                Resolution::readd(FaucetError::LedgerClient(format!(
                    "pending transaction is not recognized as a transaction, blockID: {}, txID: {}",
                    pending.block_id, pending.transaction_id
                )))
            }
            TransactionState::Pending => Resolution::keep(format!(
                "transaction still pending, blockID: {}, txID: {}",
                pending.block_id, pending.transaction_id
            )),
            TransactionState::Accepted
            | TransactionState::Committed
            | TransactionState::Finalized => Resolution::clear(format!(
                "transaction successful, blockID: {}, txID: {}",
                pending.block_id, pending.transaction_id
            )),
            TransactionState::Failed => Resolution::readd(FaucetError::LedgerClient(format!(
                "transaction failed, blockID: {}, txID: {}, reason: {}",
                pending.block_id,
                pending.transaction_id,
                metadata.failure_reason.as_deref().unwrap_or("unknown")
            ))),
        }
    }

    fn report_resolution(&self, resolution: &Resolution) {
        if let Some(soft_error) = &resolution.soft_error {
            self.log_soft_error(soft_error.clone());
        }
        if let Some(message) = &resolution.log_message {
            debug!("{message}");
        }
    }

    fn apply_resolution_without_locking(
        &self,
        state: &mut FaucetState,
        resolution: Resolution,
    ) {
        self.report_resolution(&resolution);
        match resolution.verdict {
            Verdict::Clear => {
                self.metrics.pending_transactions_cleared.inc();
                self.clear_pending_requests_without_locking(state);
            }
            Verdict::Readd => {
                self.metrics.pending_transactions_readded.inc();
                self.readd_pending_requests_without_locking(state);
            }
            Verdict::Keep => {}
        }
    }
}

fn resolve_by_ledger_update(pending: &PendingTransaction, update: &LedgerUpdate) -> Resolution {
    // if output index 0 was created, all other outputs were created as well
    // because transactions are atomic
    let output_index_zero = OutputId::new(pending.transaction_id, 0);
    if update.created.contains(&output_index_zero) {
        return Resolution::clear(format!(
            "transaction landed, blockID: {}, txID: {}",
            pending.block_id, pending.transaction_id
        ));
    }

    if pending
        .consumed_inputs
        .iter()
        .any(|input| update.consumed.contains(input))
    {
        // a referenced input was spent without output 0 appearing, so the
        // transaction lost against a conflicting one
        return Resolution::readd(FaucetError::LedgerClient(format!(
            "transaction conflicting, inputs consumed in another transaction, blockID: {}, txID: {}",
            pending.block_id, pending.transaction_id
        )));
    }

    Resolution {
        verdict: Verdict::Keep,
        log_message: None,
        soft_error: None,
    }
}
