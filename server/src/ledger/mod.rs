//! Access to the FlightSuretyApp contract on the external ledger.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::models::{Address, OracleRequest, StatusCode, SubmissionOutcome};

pub mod contract;
mod rpc;
mod subscription;

pub use rpc::{EthRpcClient, LedgerClient};
pub use subscription::{Backoff, Keepalive, OracleRequestSubscription};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("transaction {tx_hash} reverted")]
    Reverted { tx_hash: String },
    #[error("ledger call timed out after {0:?}")]
    Timeout(Duration),
    #[error("malformed ledger response: {0}")]
    Malformed(String),
    #[error(transparent)]
    Abi(#[from] alloy_sol_types::Error),
}

impl LedgerError {
    /// Whether the ledger itself refused the call, as opposed to the call
    /// never completing.
    pub fn is_rejection(&self) -> bool {
        matches!(self, LedgerError::Rpc { .. } | LedgerError::Reverted { .. })
    }

    pub fn into_outcome(self) -> SubmissionOutcome {
        if self.is_rejection() {
            SubmissionOutcome::Rejected {
                reason: self.to_string(),
            }
        } else {
            SubmissionOutcome::Error {
                reason: self.to_string(),
            }
        }
    }
}

/// Read/write operations the oracle core needs from the ledger.
///
/// Submissions never fail past this boundary: every failure is folded into
/// the returned [`SubmissionOutcome`].
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn submit_response(
        &self,
        account: Address,
        index: u8,
        request: &OracleRequest,
        code: StatusCode,
    ) -> SubmissionOutcome;

    /// Accounts known to the ledger node, in node order
    async fn list_registered_accounts(&self) -> Result<Vec<Address>, LedgerError>;

    /// Indexes assigned to `account` when it registered as an oracle
    async fn oracle_indexes(&self, account: Address) -> Result<[u8; 3], LedgerError>;

    /// Register `account` as an oracle, paying `fee_wei`
    async fn register_oracle(&self, account: Address, fee_wei: u128) -> Result<(), LedgerError>;
}
