// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! A faucet service: dispenses small fixed amounts of the ledger's base
//! token (and mana) to addresses on request. Requests are admitted into a
//! bounded queue, batched into a single multi-output transaction funded from
//! the faucet's own unspent outputs, and tracked until the ledger accepts or
//! rejects the transaction. No admitted request is silently lost: on any
//! failure the batched requests return to the queue.

pub mod config;
pub mod crypto;
pub mod error;
pub mod events;
pub mod faucet;
pub mod ledger_client;
pub mod metrics;
pub mod node;
pub mod node_bridge;
pub mod server;
pub mod transaction_builder;

#[cfg(test)]
pub mod mock_ledger_client;

#[cfg(test)]
pub mod test_utils;
