// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::address::Ed25519Address;
use crate::base_types::{BaseToken, Mana, OutputId};
use serde::{Deserialize, Serialize};

/// The simplest on-chain value-bearing record: base tokens plus stored mana,
/// unlockable by a single address.
///
/// Outputs handed to the faucet by the node-side indexer query are guaranteed
/// to be free of timelock, expiration and storage-deposit-return conditions,
/// so none of those are modeled here.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicOutput {
    pub amount: BaseToken,
    pub mana: Mana,
    pub address: Ed25519Address,
}

impl BasicOutput {
    /// Contribution of this output to the storage score: the serialized size
    /// of its fields (kind byte, amount, mana, unlock-condition count,
    /// address kind byte, address bytes).
    pub fn storage_score(&self) -> u64 {
        (1 + 8 + 8 + 1 + 1 + Ed25519Address::LENGTH) as u64
    }
}

/// An unspent output together with its identifier, as reported by the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentOutput {
    pub output_id: OutputId,
    pub output: BasicOutput,
}
