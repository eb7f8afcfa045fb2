// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use prometheus::{
    register_int_counter_vec_with_registry, register_int_counter_with_registry,
    register_int_gauge_vec_with_registry, register_int_gauge_with_registry, IntCounter,
    IntCounterVec, IntGauge, IntGaugeVec, Registry, TextEncoder,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

#[derive(Clone, Debug)]
pub struct FaucetMetrics {
    pub(crate) requests_received: IntCounterVec,
    pub(crate) requests_ok: IntCounterVec,
    pub(crate) err_requests: IntCounterVec,
    pub(crate) requests_inflight: IntGaugeVec,

    pub(crate) faucet_balance: IntGauge,
    pub(crate) queued_requests: IntGauge,
    pub(crate) issued_blocks: IntCounter,
    pub(crate) soft_errors: IntCounter,
    pub(crate) pending_transactions_cleared: IntCounter,
    pub(crate) pending_transactions_readded: IntCounter,
}

impl FaucetMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            requests_received: register_int_counter_vec_with_registry!(
                "faucet_requests_received",
                "Total HTTP requests received by request type",
                &["type"],
                registry,
            )
            .unwrap(),
            requests_ok: register_int_counter_vec_with_registry!(
                "faucet_requests_ok",
                "Total successful HTTP requests by request type",
                &["type"],
                registry,
            )
            .unwrap(),
            err_requests: register_int_counter_vec_with_registry!(
                "faucet_err_requests",
                "Total failed HTTP requests by request type",
                &["type"],
                registry,
            )
            .unwrap(),
            requests_inflight: register_int_gauge_vec_with_registry!(
                "faucet_requests_inflight",
                "In-flight HTTP requests by request type",
                &["type"],
                registry,
            )
            .unwrap(),
            faucet_balance: register_int_gauge_with_registry!(
                "faucet_balance",
                "Projected spendable balance of the faucet in base tokens",
                registry,
            )
            .unwrap(),
            queued_requests: register_int_gauge_with_registry!(
                "faucet_queued_requests",
                "Requests currently queued or in flight",
                registry,
            )
            .unwrap(),
            issued_blocks: register_int_counter_with_registry!(
                "faucet_issued_blocks",
                "Total blocks issued by the faucet",
                registry,
            )
            .unwrap(),
            soft_errors: register_int_counter_with_registry!(
                "faucet_soft_errors",
                "Total soft errors encountered",
                registry,
            )
            .unwrap(),
            pending_transactions_cleared: register_int_counter_with_registry!(
                "faucet_pending_transactions_cleared",
                "Pending transactions that settled successfully",
                registry,
            )
            .unwrap(),
            pending_transactions_readded: register_int_counter_with_registry!(
                "faucet_pending_transactions_readded",
                "Pending transactions whose requests went back to the queue",
                registry,
            )
            .unwrap(),
        }
    }

    pub fn new_for_testing() -> Arc<Self> {
        Arc::new(Self::new(&Registry::new()))
    }
}

/// Serves the registry in the Prometheus text format on its own port.
pub fn start_metrics_server(
    socket_address: SocketAddr,
    registry: Registry,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = axum::Router::new().route(
            "/metrics",
            axum::routing::get(move || {
                let registry = registry.clone();
                async move {
                    TextEncoder::new()
                        .encode_to_string(&registry.gather())
                        .unwrap_or_default()
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind(socket_address)
            .await
            .expect("failed to bind metrics listener");
        info!("metrics server listening on {socket_address}");
        axum::serve(listener, app)
            .await
            .expect("metrics server exited");
    })
}
