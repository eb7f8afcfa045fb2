// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The faucet's HTTP surface. Handlers are thin: they call into the core
//! and translate its errors into status codes.

use crate::error::FaucetError;
use crate::faucet::{EnqueueResponse, Faucet, InfoResponse};
use crate::metrics::FaucetMetrics;
use crate::with_metrics;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

pub const INFO_PATH: &str = "/info";
pub const ENQUEUE_PATH: &str = "/enqueue";
pub const FLUSH_PATH: &str = "/flush";

/// Defines the request of a POST /enqueue REST API call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnqueueRequest {
    /// The bech32 address.
    pub address: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl axum::response::IntoResponse for FaucetError {
    fn into_response(self) -> axum::response::Response {
        let status = if self.is_user_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

pub fn run_server(
    socket_address: &SocketAddr,
    faucet: Arc<Faucet>,
    metrics: Arc<FaucetMetrics>,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    let socket_address = *socket_address;
    tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(socket_address)
            .await
            .expect("failed to bind faucet listener");
        info!("faucet API listening on {socket_address}");
        axum::serve(listener, make_router(faucet, metrics).into_make_service())
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await
            .expect("faucet server exited");
    })
}

pub(crate) fn make_router(faucet: Arc<Faucet>, metrics: Arc<FaucetMetrics>) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route(INFO_PATH, get(handle_info))
        .route(ENQUEUE_PATH, post(handle_enqueue))
        .route(FLUSH_PATH, post(handle_flush))
        .with_state((faucet, metrics))
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}

async fn handle_info(
    State((faucet, metrics)): State<(Arc<Faucet>, Arc<FaucetMetrics>)>,
) -> Result<Json<InfoResponse>, FaucetError> {
    let future = async { Ok(Json(faucet.info().await)) };
    with_metrics!(metrics, "info", future).await
}

async fn handle_enqueue(
    State((faucet, metrics)): State<(Arc<Faucet>, Arc<FaucetMetrics>)>,
    Json(request): Json<EnqueueRequest>,
) -> Result<Json<EnqueueResponse>, FaucetError> {
    let future = async {
        let response = faucet.enqueue(&request.address).await?;
        Ok(Json(response))
    };
    with_metrics!(metrics, "enqueue", future).await
}

async fn handle_flush(
    State((faucet, metrics)): State<(Arc<Faucet>, Arc<FaucetMetrics>)>,
) -> Result<StatusCode, FaucetError> {
    let future = async {
        faucet.flush_requests();
        Ok(StatusCode::OK)
    };
    with_metrics!(metrics, "flush", future).await
}

#[macro_export]
macro_rules! with_metrics {
    ($metrics:expr, $type_:expr, $func:expr) => {
        async move {
            $metrics
                .requests_received
                .with_label_values(&[$type_])
                .inc();
            $metrics
                .requests_inflight
                .with_label_values(&[$type_])
                .inc();

            let result = $func.await;

            match &result {
                Ok(_) => {
                    $metrics.requests_ok.with_label_values(&[$type_]).inc();
                }
                Err(e) => {
                    tracing::info!("{} request failed: {:?}", $type_, e);
                    $metrics.err_requests.with_label_values(&[$type_]).inc();
                }
            }

            $metrics
                .requests_inflight
                .with_label_values(&[$type_])
                .dec();
            result
        }
    };
}
