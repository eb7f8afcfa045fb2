// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The batcher: the faucet's main loop. Waits until no transaction is
//! pending, drains the queue under the batch timeout (or a flush signal),
//! filters the batch against the current balance projection and output
//! budget, materialises a transaction and arms the pending slot.

use super::{Faucet, FaucetState, PendingTransaction, QueuedRequest};
use crate::error::{FaucetError, FaucetResult};
use crate::transaction_builder::TransactionBuilder;
use faucet_types::{BaseToken, BasicOutput, Mana, OutputId, UnspentOutput};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Cooldown between loop iterations while a transaction is pending.
const PENDING_COOLDOWN: Duration = Duration::from_secs(1);

impl Faucet {
    /// Collects unspent outputs on the faucet address and batches the
    /// requests from the queue until the shutdown signal fires. Returns an
    /// error only for critical conditions; everything else is logged and
    /// the loop continues.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> FaucetResult<()> {
        // set the initial faucet balance; a failure here is fatal
        self.compute_and_set_initial_balance()
            .await
            .map_err(|e| e.critical())?;

        loop {
            if *shutdown.borrow() {
                return Ok(());
            }

            match self.collect_requests_and_send_block(&mut shutdown).await {
                Ok(()) => {}
                Err(err) if err.is_critical() => return Err(err),
                Err(err) => self.log_soft_error(err),
            }
        }
    }

    async fn collect_requests_and_send_block(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> FaucetResult<()> {
        // check if there is a pending transaction before issuing the next one
        let pending = self.state.read().await.pending_transaction.clone();
        if let Some(pending) = pending {
            debug!(
                "skip processing of new requests because a pending tx was found, blockID: {}, txID: {}",
                pending.block_id, pending.transaction_id
            );
            tokio::select! {
                _ = shutdown.changed() => {}
                _ = tokio::time::sleep(PENDING_COOLDOWN) => {}
            }
            return Ok(());
        }

        let batched_requests = match self.collect_requests(shutdown).await {
            Ok(requests) => requests,
            Err(FaucetError::OperationAborted) => return Ok(()),
            Err(err) => return Err(err),
        };

        debug!("collected {} requests", batched_requests.len());

        // the write lock spans the filter, the assembly and the submission,
        // so the pending slot is armed before a ledger update can race it
        let mut state = self.state.write().await;

        let (unspent_outputs, balance) = match self
            .collect_outputs_and_balance_without_locking(&state)
            .await
        {
            Ok(result) => result,
            Err(err) => {
                if err.is_critical() {
                    return Err(err);
                }
                self.log_soft_error(err);
                // re-add all collected requests back to the queue
                self.readd_requests_without_locking(&mut state, batched_requests);
                return Ok(());
            }
        };
        state.faucet_balance = balance;
        self.metrics.faucet_balance.set(balance as i64);

        if unspent_outputs.len() < 2 && batched_requests.is_empty() {
            // no need to sweep or send funds
            return Ok(());
        }

        let node_healthy = self.ledger.is_node_healthy().await;
        let processable_requests = self.process_requests_without_locking(
            &mut state,
            unspent_outputs.len(),
            balance,
            batched_requests,
            node_healthy,
        );

        debug!(
            "determined {} available unspent outputs and {} processable requests",
            unspent_outputs.len(),
            processable_requests.len()
        );

        if let Err(err) = self
            .send_faucet_block_without_locking(&mut state, unspent_outputs, &processable_requests)
            .await
        {
            if err.is_critical() {
                return Err(err);
            }
            // re-add the non-processed requests back to the queue
            self.readd_requests_without_locking(&mut state, processable_requests);
            self.log_soft_error(err);
        }

        Ok(())
    }

    /// Collects faucet requests until the batch timeout elapses, a flush is
    /// signaled, the maximum batch size is reached or the faucet is stopped.
    async fn collect_requests(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> FaucetResult<Vec<Arc<QueuedRequest>>> {
        let mut queue_rx = self.queue_rx.lock().await;
        let mut flush_rx = self.flush_rx.lock().await;

        let max_outputs = self.protocol_parameters.max_outputs;
        let mut batched_requests = Vec::new();
        let mut flush = false;

        'collect: while batched_requests.len() < max_outputs {
            tokio::select! {
                _ = shutdown.changed() => {
                    // faucet was stopped
                    return Err(FaucetError::OperationAborted);
                }
                _ = tokio::time::sleep(self.options.batch_timeout) => {
                    // timeout was reached => stop collecting requests
                    break 'collect;
                }
                _ = flush_rx.recv() => {
                    // flush signal => end the batch early
                    flush = true;
                    break 'collect;
                }
                request = queue_rx.recv() => {
                    match request {
                        Some(request) => batched_requests.push(request),
                        // the sender half never closes while the faucet is alive
                        None => return Err(FaucetError::OperationAborted),
                    }
                }
            }
        }

        if flush {
            // drain everything that is queued right now, without waiting
            while batched_requests.len() < max_outputs {
                match queue_rx.try_recv() {
                    Ok(request) => batched_requests.push(request),
                    Err(_) => break,
                }
            }
        }

        Ok(batched_requests)
    }

    /// Processes all requests that fit the transaction size and the
    /// remaining funds of the faucet. Deferred requests (node unhealthy or
    /// no output slot left) go back to the queue; requests the balance can
    /// no longer cover are dropped. Write lock must be held by the caller.
    fn process_requests_without_locking(
        &self,
        state: &mut FaucetState,
        mut collected_requests_counter: usize,
        mut balance: BaseToken,
        batched_requests: Vec<Arc<QueuedRequest>>,
        node_healthy: bool,
    ) -> Vec<Arc<QueuedRequest>> {
        let max_outputs = self.protocol_parameters.max_outputs;
        let mut processed = Vec::new();
        let mut unprocessed = Vec::new();

        for request in batched_requests {
            if !node_healthy {
                // request can't be processed now => re-add it to the queue
                unprocessed.push(request);
                continue;
            }

            if collected_requests_counter >= max_outputs - 1 {
                // no output slot left, one is reserved for the remainder
                // => re-add it to the queue
                unprocessed.push(request);
                continue;
            }

            if balance < request.amount {
                // not enough funds to process this request => drop it, the
                // user has to request again once the balance recovered
                self.clear_request_without_locking(state, &request);
                continue;
            }

            balance -= request.amount;
            collected_requests_counter += 1;
            processed.push(request);
        }

        self.readd_requests_without_locking(state, unprocessed);

        processed
    }

    /// Creates the transaction builder with all inputs and batched requests.
    /// Returns the builder, the consumed input ids and the index of the
    /// remainder output (if one was added).
    async fn create_transaction_builder(
        &self,
        unspent_outputs: &[UnspentOutput],
        batched_requests: &[Arc<QueuedRequest>],
    ) -> (TransactionBuilder, Vec<OutputId>, Option<usize>) {
        let max_outputs = self.protocol_parameters.max_outputs;

        let mut builder = TransactionBuilder::new();
        builder.add_tagged_data_payload(self.options.tag_message.clone(), Vec::new());

        // collect all unspent outputs of the faucet address
        let mut output_count = 0usize;
        let mut remainder_amount: BaseToken = 0;
        for unspent_output in unspent_outputs {
            output_count += 1;
            remainder_amount = remainder_amount.saturating_add(unspent_output.output.amount);
            builder.add_input(unspent_output.clone());
        }
        let consumed_inputs = builder.input_ids();

        let mana_payout_per_output = self
            .compute_mana_payout(&builder, batched_requests.len())
            .await;

        // add all requests as outputs
        for request in batched_requests {
            output_count += 1;

            if output_count >= max_outputs - 1 {
                // do not collect further requests, the last slot is for the
                // remainder
                break;
            }

            if remainder_amount == 0 {
                break;
            }

            // not enough funds left => truncate the payout
            let base_token_amount = request.amount.min(remainder_amount);
            remainder_amount -= base_token_amount;

            builder.add_output(BasicOutput {
                amount: base_token_amount,
                mana: mana_payout_per_output,
                address: request.address,
            });
        }

        let remainder_output_index = (remainder_amount > 0).then(|| {
            builder.add_output(BasicOutput {
                amount: remainder_amount,
                mana: 0,
                address: self.address,
            })
        });

        (builder, consumed_inputs, remainder_output_index)
    }

    /// Decides the mana attached to each payout output. Payouts are halted
    /// (zero mana, soft error) when the faucet's stored mana would fall
    /// below the configured floor.
    async fn compute_mana_payout(
        &self,
        builder: &TransactionBuilder,
        batch_size: usize,
    ) -> Mana {
        // the exact slot of the transaction is not known yet; the latest
        // observed slot is close enough since only stored mana counts
        let latest_slot = self.ledger.latest_slot().await;

        let available = match builder.available_mana_inputs(latest_slot) {
            Ok(available) => available,
            Err(err) => {
                self.log_soft_error(FaucetError::TransactionBuild(format!(
                    "failed to calculate available mana balance: {err}"
                )));
                return 0;
            }
        };

        let total_payouts = match (batch_size as Mana).checked_mul(self.options.mana_amount) {
            Some(total) => total,
            None => {
                self.log_soft_error(FaucetError::TransactionBuild(
                    "failed to calculate required total mana for payouts".to_string(),
                ));
                return 0;
            }
        };

        match available.unbound_stored_mana.checked_sub(total_payouts) {
            None => {
                self.log_soft_error(FaucetError::TransactionBuild(format!(
                    "not enough mana left in the faucet to do the payouts: {} < {}",
                    available.unbound_stored_mana, total_payouts
                )));
                0
            }
            Some(remainder) if remainder <= self.options.mana_amount_min_faucet => {
                self.log_soft_error(FaucetError::TransactionBuild(format!(
                    "not enough mana left in the faucet: {} <= {}",
                    remainder, self.options.mana_amount_min_faucet
                )));
                0
            }
            Some(_) => self.options.mana_amount,
        }
    }

    /// Creates the faucet transaction payload, sends it to the block issuer
    /// and arms the pending slot. Write lock must be held by the caller.
    async fn send_faucet_block_without_locking(
        &self,
        state: &mut FaucetState,
        unspent_outputs: Vec<UnspentOutput>,
        batched_requests: &[Arc<QueuedRequest>],
    ) -> FaucetResult<()> {
        let (builder, consumed_inputs, remainder_output_index) = self
            .create_transaction_builder(&unspent_outputs, batched_requests)
            .await;

        let (signed_transaction, block_id) = self
            .ledger
            .submit_transaction_payload(
                builder,
                remainder_output_index,
                self.options.pow_worker_count,
            )
            .await
            .map_err(|err| {
                // the criticality decision belongs to the submitter, keep it
                let is_critical = err.is_critical();
                let wrapped = FaucetError::LedgerClient(format!(
                    "submit faucet transaction payload failed: {err}"
                ));
                if is_critical {
                    wrapped.critical()
                } else {
                    wrapped
                }
            })?;

        state.pending_transaction = Some(PendingTransaction {
            block_id,
            transaction_id: signed_transaction.transaction_id(),
            consumed_inputs,
            batched_requests: batched_requests.to_vec(),
        });

        self.metrics.issued_blocks.inc();
        self.events.emit_issued_block(block_id);

        Ok(())
    }
}
