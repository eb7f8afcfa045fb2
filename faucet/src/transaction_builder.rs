// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::error::{FaucetError, FaucetResult};
use faucet_types::{
    BasicOutput, Mana, OutputId, SlotIndex, TaggedDataPayload, Transaction, UnspentOutput,
};

/// Mana available on the inputs of a transaction under construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AvailableManaInputs {
    /// Stored mana not earmarked by unlock conditions. All basic outputs the
    /// faucet consumes are plain address-unlocked, so everything counts.
    pub unbound_stored_mana: Mana,
}

/// Assembles the faucet's multi-output transaction: tagged-data payload,
/// consumed inputs, payout outputs and the remainder.
#[derive(Debug, Default)]
pub struct TransactionBuilder {
    payload: Option<TaggedDataPayload>,
    inputs: Vec<UnspentOutput>,
    outputs: Vec<BasicOutput>,
}

impl TransactionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tagged_data_payload(&mut self, tag: Vec<u8>, data: Vec<u8>) {
        self.payload = Some(TaggedDataPayload { tag, data });
    }

    pub fn add_input(&mut self, unspent_output: UnspentOutput) {
        self.inputs.push(unspent_output);
    }

    /// Adds an output and returns its index within the transaction.
    pub fn add_output(&mut self, output: BasicOutput) -> usize {
        self.outputs.push(output);
        self.outputs.len() - 1
    }

    pub fn input_ids(&self) -> Vec<OutputId> {
        self.inputs.iter().map(|input| input.output_id).collect()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// Mana spendable from the currently added inputs.
    ///
    /// Only stored mana enters the calculation; mana the inputs may still
    /// generate up to `_latest_slot` is ignored, which keeps the estimate
    /// conservative.
    pub fn available_mana_inputs(
        &self,
        _latest_slot: SlotIndex,
    ) -> FaucetResult<AvailableManaInputs> {
        let mut unbound_stored_mana: Mana = 0;
        for input in &self.inputs {
            unbound_stored_mana = unbound_stored_mana
                .checked_add(input.output.mana)
                .ok_or_else(|| {
                    FaucetError::TransactionBuild("input mana sum overflows".to_string())
                })?;
        }
        Ok(AvailableManaInputs { unbound_stored_mana })
    }

    /// Builds the final transaction. Stored mana left over after the payout
    /// outputs is carried onto the output at `stored_mana_output_index`
    /// (the remainder output) so it is not burned.
    pub fn finish(
        mut self,
        creation_slot: SlotIndex,
        stored_mana_output_index: Option<usize>,
    ) -> FaucetResult<Transaction> {
        if self.inputs.is_empty() {
            return Err(FaucetError::TransactionBuild(
                "transaction has no inputs".to_string(),
            ));
        }
        if self.outputs.is_empty() {
            return Err(FaucetError::TransactionBuild(
                "transaction has no outputs".to_string(),
            ));
        }

        if let Some(index) = stored_mana_output_index {
            let input_mana = self
                .available_mana_inputs(creation_slot)?
                .unbound_stored_mana;
            let output_mana: Mana = self.outputs.iter().map(|output| output.mana).sum();
            let leftover = input_mana.checked_sub(output_mana).ok_or_else(|| {
                FaucetError::TransactionBuild(format!(
                    "outputs allocate more mana than the inputs hold: {output_mana} > {input_mana}"
                ))
            })?;
            let output = self.outputs.get_mut(index).ok_or_else(|| {
                FaucetError::TransactionBuild(format!(
                    "stored mana output index {index} out of bounds"
                ))
            })?;
            output.mana += leftover;
        }

        Ok(Transaction {
            creation_slot,
            inputs: self.input_ids(),
            outputs: self.outputs,
            payload: self.payload,
        })
    }
}
