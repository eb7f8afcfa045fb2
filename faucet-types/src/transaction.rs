// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::base_types::{OutputId, SlotIndex, TransactionId};
use crate::output::BasicOutput;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Free-form payload attached to faucet transactions so they are easy to
/// spot in explorers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaggedDataPayload {
    pub tag: Vec<u8>,
    pub data: Vec<u8>,
}

/// A transaction consuming a set of outputs and creating a new set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub creation_slot: SlotIndex,
    pub inputs: Vec<OutputId>,
    pub outputs: Vec<BasicOutput>,
    pub payload: Option<TaggedDataPayload>,
}

impl Transaction {
    /// Deterministic byte encoding, input for the transaction id digest.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&self.creation_slot.to_le_bytes());

        bytes.extend_from_slice(&(self.inputs.len() as u16).to_le_bytes());
        for input in &self.inputs {
            bytes.extend_from_slice(input.transaction_id().as_bytes());
            bytes.extend_from_slice(&input.index().to_le_bytes());
        }

        bytes.extend_from_slice(&(self.outputs.len() as u16).to_le_bytes());
        for output in &self.outputs {
            bytes.extend_from_slice(&output.amount.to_le_bytes());
            bytes.extend_from_slice(&output.mana.to_le_bytes());
            bytes.extend_from_slice(output.address.as_bytes());
        }

        match &self.payload {
            Some(payload) => {
                bytes.push(1);
                bytes.extend_from_slice(&(payload.tag.len() as u8).to_le_bytes());
                bytes.extend_from_slice(&payload.tag);
                bytes.extend_from_slice(&(payload.data.len() as u32).to_le_bytes());
                bytes.extend_from_slice(&payload.data);
            }
            None => bytes.push(0),
        }

        bytes
    }

    pub fn id(&self) -> TransactionId {
        TransactionId::new(*blake3::hash(&self.to_bytes()).as_bytes())
    }
}

/// A transaction together with the signature unlocking its inputs.
#[derive(Clone, Debug)]
pub struct SignedTransaction {
    pub transaction: Transaction,
    pub public_key: VerifyingKey,
    pub signature: Signature,
}

impl SignedTransaction {
    pub fn transaction_id(&self) -> TransactionId {
        self.transaction.id()
    }

    pub fn verify_signature(&self) -> bool {
        self.public_key
            .verify(&self.transaction.to_bytes(), &self.signature)
            .is_ok()
    }
}

/// Reported confirmation state of a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransactionState {
    Unknown,
    Pending,
    Accepted,
    Committed,
    Finalized,
    Failed,
}

/// Metadata of a transaction as reported by the node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMetadata {
    pub state: TransactionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// One ledger update as pushed by the node: the outputs created and consumed
/// by a batch of accepted transactions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerUpdate {
    pub created: HashSet<OutputId>,
    pub consumed: HashSet<OutputId>,
}
