//! Network submission with bounded retry.

pub mod paper;
pub mod retrier;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{SignedTransaction, TransactionId};
use crate::error::CollaboratorError;

pub use paper::PaperNetwork;
pub use retrier::{BroadcastReceipt, BroadcastRetrier};

/// What the network said about one submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Accepted; the id is authoritative
    Accepted(TransactionId),
    /// Refused; `retryable` separates congestion from permanent failures
    Rejected { retryable: bool, reason: String },
    /// No usable answer (reply lost, connection reset); acceptance unknown
    Ambiguous(String),
}

/// Result of a status lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    Confirmed(TransactionId),
    NotFound,
    Failed(String),
}

/// Blockchain RPC collaborator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NetworkClient: Send + Sync {
    async fn submit(&self, tx: &SignedTransaction) -> SubmitOutcome;

    /// Look up a transaction by its locally derived id
    async fn lookup(&self, tx_id: &TransactionId) -> Result<TxStatus, CollaboratorError>;
}
