// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::error::FaucetResult;
use crate::transaction_builder::TransactionBuilder;
use async_trait::async_trait;
use faucet_types::{
    BaseToken, BlockId, Ed25519Address, LedgerUpdate, SignedTransaction, SlotIndex,
    TransactionId, TransactionMetadata, UnspentOutput,
};
use tokio::sync::mpsc;

/// Everything the faucet needs from the outside world, bundled into one
/// capability set. The production implementation talks to a node over its
/// REST API; tests substitute an in-memory fake.
#[async_trait]
pub trait LedgerClient: Send + Sync + 'static {
    /// Whether the node the faucet is attached to is synced and healthy.
    async fn is_node_healthy(&self) -> bool;

    /// Metadata of the given transaction. `None` means the node does not
    /// know the transaction at all, which can only happen if the block
    /// carrying it was orphaned.
    async fn fetch_transaction_metadata(
        &self,
        transaction_id: TransactionId,
    ) -> FaucetResult<Option<TransactionMetadata>>;

    /// The faucet address's unspent basic outputs, excluding outputs with
    /// timelock, expiration or storage-deposit-return conditions.
    async fn collect_unlockable_outputs(&self) -> FaucetResult<Vec<UnspentOutput>>;

    /// The unlockable balance of an arbitrary address.
    async fn compute_unlockable_address_balance(
        &self,
        address: &Ed25519Address,
    ) -> FaucetResult<BaseToken>;

    /// The latest slot known to the network.
    async fn latest_slot(&self) -> SlotIndex;

    /// Finalizes and signs the built transaction and hands it to a block
    /// issuer. `remainder_output_index` is the output carrying the stored
    /// mana remainder, if the transaction has one.
    async fn submit_transaction_payload(
        &self,
        builder: TransactionBuilder,
        remainder_output_index: Option<usize>,
        pow_workers: usize,
    ) -> FaucetResult<(SignedTransaction, BlockId)>;

    /// Subscribes to ledger updates. A failure here is fatal for the
    /// service: without updates the faucet cannot resolve conflicts.
    async fn subscribe_ledger_updates(&self) -> FaucetResult<mpsc::Receiver<LedgerUpdate>>;
}
