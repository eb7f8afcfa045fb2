// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Shared helpers for the faucet test suite.

use crate::error::FaucetResult;
use crate::faucet::{Faucet, FaucetOptions};
use crate::metrics::FaucetMetrics;
use crate::mock_ledger_client::MockLedgerClient;
use faucet_types::{
    BasicOutput, Ed25519Address, Mana, OutputId, ProtocolParameters, TransactionId, UnspentOutput,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub fn test_protocol_parameters() -> ProtocolParameters {
    ProtocolParameters::for_testing()
}

/// Options with a short batch timeout so the loop tests stay fast.
pub fn test_options() -> FaucetOptions {
    FaucetOptions {
        batch_timeout: Duration::from_millis(50),
        ..FaucetOptions::default()
    }
}

pub fn test_address(seed: u8) -> Ed25519Address {
    Ed25519Address::new([seed; 32])
}

pub fn test_bech32(seed: u8) -> String {
    test_address(seed).to_bech32(&test_protocol_parameters().bech32_hrp)
}

/// An unspent output on the mock's faucet address.
pub fn unspent_output(index: u16, amount: u64, mana: Mana) -> UnspentOutput {
    UnspentOutput {
        output_id: OutputId::new(TransactionId::new([0xaa; 32]), index),
        output: BasicOutput {
            amount,
            mana,
            // the mock's signer address, see MockLedgerClient::faucet_address
            address: Ed25519Address::from_verifying_key(
                &ed25519_dalek::SigningKey::from_bytes(&[0xfa; 32]).verifying_key(),
            ),
        },
    }
}

pub async fn new_test_faucet(mock: Arc<MockLedgerClient>) -> Arc<Faucet> {
    test_faucet_with_options(mock, test_options()).await
}

pub async fn test_faucet_with_options(
    mock: Arc<MockLedgerClient>,
    options: FaucetOptions,
) -> Arc<Faucet> {
    let faucet = test_faucet_without_init(mock, options).await;
    // tests that script output failures initialise the balance themselves
    let _ = faucet.compute_and_set_initial_balance().await;
    faucet
}

pub async fn test_faucet_without_init(
    mock: Arc<MockLedgerClient>,
    options: FaucetOptions,
) -> Arc<Faucet> {
    let address = mock.faucet_address();
    Arc::new(Faucet::new(
        mock,
        address,
        test_protocol_parameters(),
        options,
        FaucetMetrics::new_for_testing(),
    ))
}

pub async fn test_faucet_with_max_outputs(
    mock: Arc<MockLedgerClient>,
    options: FaucetOptions,
    max_outputs: usize,
) -> Arc<Faucet> {
    let address = mock.faucet_address();
    let faucet = Arc::new(Faucet::new(
        mock,
        address,
        ProtocolParameters {
            max_outputs,
            ..test_protocol_parameters()
        },
        options,
        FaucetMetrics::new_for_testing(),
    ));
    let _ = faucet.compute_and_set_initial_balance().await;
    faucet
}

/// Spawns the faucet loop and hands back the shutdown sender and the task
/// handle. Keep the sender alive for the lifetime of the loop.
pub fn spawn_faucet_loop(
    faucet: &Arc<Faucet>,
) -> (
    watch::Sender<bool>,
    tokio::task::JoinHandle<FaucetResult<()>>,
) {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let faucet = faucet.clone();
    let handle = tokio::spawn(async move { faucet.run(shutdown_rx).await });
    (shutdown_tx, handle)
}

/// Polls the condition until it holds, panicking after a few seconds.
pub async fn wait_until<F, Fut>(condition: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..300 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
