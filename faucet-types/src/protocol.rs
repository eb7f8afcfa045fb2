// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::base_types::BaseToken;
use crate::output::BasicOutput;
use serde::{Deserialize, Serialize};

/// Protocol parameters reported by the node. The faucet treats these as
/// opaque network facts: it never derives them locally.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolParameters {
    /// Human readable prefix of bech32 addresses on this network.
    pub bech32_hrp: String,
    /// Protocol-defined cap on outputs (and inputs) per transaction.
    pub max_outputs: usize,
    /// Cost in base tokens per storage-score point.
    pub storage_cost: BaseToken,
    /// Fixed per-output score offset covering the shared output overhead.
    pub storage_score_offset: u64,
}

impl ProtocolParameters {
    /// Minimum amount required to keep the given output representable
    /// on-chain.
    pub fn min_storage_deposit(&self, output: &BasicOutput) -> BaseToken {
        self.storage_cost
            .saturating_mul(self.storage_score_offset + output.storage_score())
    }

    pub fn for_testing() -> Self {
        Self {
            bech32_hrp: "tst".to_string(),
            max_outputs: 128,
            storage_cost: 100,
            storage_score_offset: 10,
        }
    }
}
