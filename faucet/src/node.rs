// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Process wiring: spawns the ledger-update subscriber, the batcher loop
//! and the pending-transaction ticker, and runs the HTTP server until a
//! shutdown signal or a critical faucet error.

use crate::config::FaucetNodeConfig;
use crate::faucet::Faucet;
use crate::ledger_client::LedgerClient;
use crate::metrics::{start_metrics_server, FaucetMetrics};
use crate::server::run_server;
use anyhow::anyhow;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

/// Interval of the pending-transaction state poll.
const PENDING_CHECK_INTERVAL: Duration = Duration::from_secs(5);

pub async fn run_faucet_node(
    config: FaucetNodeConfig,
    prometheus_registry: prometheus::Registry,
) -> anyhow::Result<()> {
    let metrics = Arc::new(FaucetMetrics::new(&prometheus_registry));

    let metrics_address = SocketAddr::new(
        IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
        config.metrics_port,
    );
    let _metrics_handle = start_metrics_server(metrics_address, prometheus_registry);

    let server_config = config.validate().await?;

    // subscribing to ledger updates must succeed, otherwise conflicting
    // transactions would never be detected
    let mut ledger_updates = server_config
        .node_bridge
        .subscribe_ledger_updates()
        .await
        .map_err(|e| anyhow!("listening to ledger updates failed: {e}"))?;

    let faucet = Arc::new(Faucet::new(
        server_config.node_bridge.clone(),
        server_config.faucet_address,
        server_config.protocol_parameters,
        server_config.options,
        metrics.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ledger-update handler
    let update_faucet = faucet.clone();
    let mut update_shutdown = shutdown_rx.clone();
    let update_handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = update_shutdown.changed() => return,
                update = ledger_updates.recv() => match update {
                    Some(update) => update_faucet.apply_ledger_update(&update).await,
                    None => return,
                },
            }
        }
    });

    // periodic pending-transaction check
    let ticker_faucet = faucet.clone();
    let mut ticker_shutdown = shutdown_rx.clone();
    let ticker_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PENDING_CHECK_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker_shutdown.changed() => return,
                _ = ticker.tick() => ticker_faucet.check_pending_transaction_state().await,
            }
        }
    });

    // the batcher loop, the faucet's main task
    let loop_faucet = faucet.clone();
    let loop_shutdown = shutdown_rx.clone();
    let mut faucet_handle = tokio::spawn(async move { loop_faucet.run(loop_shutdown).await });

    let server_address = SocketAddr::new(
        IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
        config.server_listen_port,
    );
    let server_handle = run_server(&server_address, faucet, metrics, shutdown_rx);

    let mut critical_error = None;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
        result = &mut faucet_handle => {
            match result {
                Ok(Ok(())) => info!("faucet loop finished"),
                Ok(Err(err)) => {
                    error!("faucet hit a critical error: {err}");
                    critical_error = Some(anyhow!("faucet hit a critical error: {err}"));
                }
                Err(join_err) => {
                    critical_error = Some(anyhow!("faucet task panicked: {join_err}"));
                }
            }
        }
    }

    // tear everything down; the tasks observe the watch channel
    shutdown_tx.send(true).ok();
    let _ = server_handle.await;
    let _ = update_handle.await;
    let _ = ticker_handle.await;
    if !faucet_handle.is_finished() {
        let _ = faucet_handle.await;
    }

    match critical_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
