// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

/// Errors produced by the faucet.
///
/// Most variants are soft: they are logged, surfaced through the
/// `SoftError` event and the service continues. Only errors wrapped in
/// `Critical` terminate the process; the wrapper is the single signalling
/// channel for fatal conditions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaucetError {
    // The provided address is not a valid bech32 address for this network
    InvalidAddress(String),
    // The address already has a request in the queue or in flight
    AlreadyInQueue,
    // The target address already holds more than the configured maximum
    EnoughFundsOnAddress,
    // The faucet's node is not synchronized/healthy
    NodeUnhealthy,
    // The request queue is at capacity
    QueueFull,
    // The projected faucet balance cannot cover the request
    InsufficientFaucetFunds,
    // No outputs to sweep and no requests to pay out
    NothingToProcess,
    // A loop was stopped by the shutdown signal
    OperationAborted,
    // A ledger client call failed
    LedgerClient(String),
    // Transaction assembly failed
    TransactionBuild(String),
    // Uncategorized internal error
    Internal(String),
    // Marker making the wrapped error fatal for the whole process
    Critical(Box<FaucetError>),
}

pub type FaucetResult<T> = Result<T, FaucetError>;

impl FaucetError {
    /// Wraps the error in the critical marker. Already-critical errors are
    /// returned unchanged.
    pub fn critical(self) -> Self {
        match self {
            critical @ FaucetError::Critical(_) => critical,
            other => FaucetError::Critical(Box::new(other)),
        }
    }

    pub fn is_critical(&self) -> bool {
        matches!(self, FaucetError::Critical(_))
    }

    /// True for errors caused by the caller's input, mapped to HTTP 400.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            FaucetError::InvalidAddress(_)
                | FaucetError::AlreadyInQueue
                | FaucetError::EnoughFundsOnAddress
        )
    }

    /// Returns a short string identifying the error type for metrics labels
    pub fn error_type(&self) -> &'static str {
        match self {
            FaucetError::InvalidAddress(_) => "invalid_address",
            FaucetError::AlreadyInQueue => "already_in_queue",
            FaucetError::EnoughFundsOnAddress => "enough_funds_on_address",
            FaucetError::NodeUnhealthy => "node_unhealthy",
            FaucetError::QueueFull => "queue_full",
            FaucetError::InsufficientFaucetFunds => "insufficient_faucet_funds",
            FaucetError::NothingToProcess => "nothing_to_process",
            FaucetError::OperationAborted => "operation_aborted",
            FaucetError::LedgerClient(_) => "ledger_client",
            FaucetError::TransactionBuild(_) => "transaction_build",
            FaucetError::Internal(_) => "internal",
            FaucetError::Critical(inner) => inner.error_type(),
        }
    }
}

impl fmt::Display for FaucetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaucetError::InvalidAddress(reason) => {
                write!(f, "Invalid bech32 address provided: {reason}")
            }
            FaucetError::AlreadyInQueue => write!(f, "Address is already in the queue."),
            FaucetError::EnoughFundsOnAddress => {
                write!(f, "You already have enough funds on your address.")
            }
            FaucetError::NodeUnhealthy => write!(
                f,
                "Faucet node is not synchronized/healthy. Please try again later!"
            ),
            FaucetError::QueueFull => {
                write!(f, "Faucet queue is full. Please try again later!")
            }
            FaucetError::InsufficientFaucetFunds => write!(
                f,
                "Faucet does not have enough funds to process your request. Please try again later!"
            ),
            FaucetError::NothingToProcess => write!(f, "nothing to process"),
            FaucetError::OperationAborted => write!(f, "operation was aborted"),
            FaucetError::LedgerClient(reason) => write!(f, "ledger client error: {reason}"),
            FaucetError::TransactionBuild(reason) => {
                write!(f, "transaction build error: {reason}")
            }
            FaucetError::Internal(reason) => write!(f, "internal error: {reason}"),
            FaucetError::Critical(inner) => write!(f, "critical error: {inner}"),
        }
    }
}

impl std::error::Error for FaucetError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_critical_wrapping_is_idempotent() {
        let err = FaucetError::LedgerClient("boom".to_string()).critical();
        assert!(err.is_critical());
        let rewrapped = err.clone().critical();
        assert_eq!(err, rewrapped);
    }

    #[test]
    fn test_critical_keeps_inner_error_type() {
        let err = FaucetError::Internal("x".to_string()).critical();
        assert_eq!(err.error_type(), "internal");
    }

    #[test]
    fn test_user_error_classification() {
        assert!(FaucetError::InvalidAddress("bad".to_string()).is_user_error());
        assert!(FaucetError::AlreadyInQueue.is_user_error());
        assert!(FaucetError::EnoughFundsOnAddress.is_user_error());
        assert!(!FaucetError::QueueFull.is_user_error());
        assert!(!FaucetError::NodeUnhealthy.is_user_error());
        assert!(!FaucetError::InsufficientFaucetFunds.is_user_error());
    }

    /// error_type values feed Prometheus labels and must stay lowercase
    /// with underscores only.
    #[test]
    fn test_error_type_valid_prometheus_labels() {
        let errors = vec![
            FaucetError::InvalidAddress("x".to_string()),
            FaucetError::AlreadyInQueue,
            FaucetError::EnoughFundsOnAddress,
            FaucetError::NodeUnhealthy,
            FaucetError::QueueFull,
            FaucetError::InsufficientFaucetFunds,
            FaucetError::NothingToProcess,
            FaucetError::OperationAborted,
            FaucetError::LedgerClient("x".to_string()),
            FaucetError::TransactionBuild("x".to_string()),
            FaucetError::Internal("x".to_string()),
        ];
        for error in errors {
            let error_type = error.error_type();
            assert!(!error_type.is_empty());
            for c in error_type.chars() {
                assert!(
                    c.is_ascii_lowercase() || c == '_',
                    "error_type '{}' contains invalid character '{}'",
                    error_type,
                    c
                );
            }
            assert!(!error_type.starts_with('_'));
            assert!(!error_type.ends_with('_'));
        }
    }
}
