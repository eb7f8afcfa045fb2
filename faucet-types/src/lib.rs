// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Ledger base types shared by the faucet service: scalar units,
//! identifiers, addresses, outputs, protocol parameters and transactions.

pub mod address;
pub mod base_types;
pub mod output;
pub mod protocol;
pub mod transaction;

pub use address::Ed25519Address;
pub use base_types::{BaseToken, BlockId, Mana, OutputId, SlotIndex, TransactionId};
pub use output::{BasicOutput, UnspentOutput};
pub use protocol::ProtocolParameters;
pub use transaction::{
    LedgerUpdate, SignedTransaction, TaggedDataPayload, Transaction, TransactionMetadata,
    TransactionState,
};
