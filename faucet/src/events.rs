// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use faucet_types::BlockId;
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Publish-only event emitters for observability. Emission never blocks:
/// slow or absent listeners only ever lose events, they cannot stall the
/// faucet.
#[derive(Debug)]
pub struct FaucetEvents {
    issued_blocks: broadcast::Sender<BlockId>,
    soft_errors: broadcast::Sender<String>,
}

impl FaucetEvents {
    pub fn new() -> Self {
        Self {
            issued_blocks: broadcast::channel(EVENT_CHANNEL_CAPACITY).0,
            soft_errors: broadcast::channel(EVENT_CHANNEL_CAPACITY).0,
        }
    }

    /// Fired when a faucet block is issued.
    pub fn subscribe_issued_blocks(&self) -> broadcast::Receiver<BlockId> {
        self.issued_blocks.subscribe()
    }

    /// Fired when a soft error is encountered.
    pub fn subscribe_soft_errors(&self) -> broadcast::Receiver<String> {
        self.soft_errors.subscribe()
    }

    pub(crate) fn emit_issued_block(&self, block_id: BlockId) {
        // a send error only means nobody is listening
        let _ = self.issued_blocks.send(block_id);
    }

    pub(crate) fn emit_soft_error(&self, message: String) {
        let _ = self.soft_errors.send(message);
    }
}

impl Default for FaucetEvents {
    fn default() -> Self {
        Self::new()
    }
}
