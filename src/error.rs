use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::{AssetId, SignerRole};

/// Application-level error type (configuration, IO, wallet setup)
#[derive(Error, Debug)]
pub enum TradegateError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Crypto/signing errors
    #[error("Wallet error: {0}")]
    Wallet(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // Trade execution
    #[error("Execution failed: {0}")]
    Execution(#[from] ExecutionError),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for TradegateError
pub type Result<T> = std::result::Result<T, TradegateError>;

/// Failure reported by an external collaborator call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("{service} unavailable: {reason}")]
    Unavailable { service: String, reason: String },

    #[error("{service} timed out after {elapsed_ms}ms")]
    Timeout { service: String, elapsed_ms: u64 },

    #[error("{service} rejected request: {reason}")]
    Rejected { service: String, reason: String },
}

impl CollaboratorError {
    pub fn unavailable(service: &str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            service: service.to_string(),
            reason: reason.into(),
        }
    }

    pub fn timeout(service: &str, elapsed_ms: u64) -> Self {
        Self::Timeout {
            service: service.to_string(),
            elapsed_ms,
        }
    }

    pub fn rejected(service: &str, reason: impl Into<String>) -> Self {
        Self::Rejected {
            service: service.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while building a venue transaction
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VenueError {
    #[error("Unsupported venue: {0}")]
    UnsupportedVenue(String),

    #[error("Liquidity query failed: {0}")]
    Liquidity(#[from] CollaboratorError),

    #[error("Venue {venue} returned {found} state, expected {expected}")]
    UnexpectedState {
        venue: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Insufficient liquidity on {venue}: {reason}")]
    InsufficientLiquidity { venue: String, reason: String },

    #[error("Slippage exceeded: quoted {quoted}, minimum {minimum}")]
    SlippageExceeded { quoted: Decimal, minimum: Decimal },

    #[error("Invalid trade parameters: {0}")]
    InvalidParams(String),
}

/// Custody failures; never partially accepted
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SigningError {
    #[error("{role} signer unavailable: {reason}")]
    SignerUnavailable { role: SignerRole, reason: String },

    #[error("{role} signer timed out after {elapsed_ms}ms")]
    SignerTimeout { role: SignerRole, elapsed_ms: u64 },

    #[error("{role} share failed verification: {reason}")]
    InvalidShare { role: SignerRole, reason: String },

    #[error("Fee payer {fee_payer} is not the primary required signer")]
    FeePayerMismatch { fee_payer: String },

    #[error("Required signer set mismatch: {0}")]
    SignerSetMismatch(String),

    #[error("Failed to encode transaction message: {0}")]
    Encoding(String),
}

/// Broadcast failures, classified for the retry loop
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BroadcastError {
    #[error("Retryable broadcast failure: {0}")]
    Retryable(String),

    #[error("Fatal broadcast failure: {0}")]
    Fatal(String),

    #[error("Broadcast exhausted after {attempts} attempts (ambiguous: {ambiguous}): {last_error}")]
    Exhausted {
        attempts: u32,
        last_error: String,
        ambiguous: bool,
    },
}

impl BroadcastError {
    /// Classify a network rejection
    pub fn rejection(retryable: bool, reason: impl Into<String>) -> Self {
        if retryable {
            BroadcastError::Retryable(reason.into())
        } else {
            BroadcastError::Fatal(reason.into())
        }
    }

    /// True when the network may have accepted the transaction
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, BroadcastError::Exhausted { ambiguous: true, .. })
    }
}

/// Portfolio ledger failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Insufficient balance for {asset}: available {available}, change {change}")]
    InsufficientBalance {
        asset: AssetId,
        available: Decimal,
        change: Decimal,
    },

    #[error("Empty portfolio delta for {0}")]
    EmptyDelta(String),

    #[error("Balance overflow for {asset}: available {available}, change {change}")]
    Overflow {
        asset: AssetId,
        available: Decimal,
        change: Decimal,
    },
}

/// Pipeline-facing error taxonomy
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("Compliance rejected trade: {reason}")]
    ComplianceRejected { reason: String },

    #[error("Compliance check unavailable: {0}")]
    ComplianceUnavailable(CollaboratorError),

    #[error("Scoring failed (fail-closed): {0}")]
    ScoringFailed(String),

    #[error("Unsupported venue: {0}")]
    UnsupportedVenue(String),

    #[error("Transaction build failed: {0}")]
    Build(VenueError),

    #[error("Signing failed: {0}")]
    Signing(#[from] SigningError),

    #[error("Broadcast failed: {0}")]
    Broadcast(#[from] BroadcastError),

    #[error("Ledger update failed: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Trade cancelled before broadcast")]
    Cancelled,
}

impl ExecutionError {
    /// Errors from build onwards are system faults and get escalated
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            ExecutionError::UnsupportedVenue(_)
                | ExecutionError::Build(_)
                | ExecutionError::Signing(_)
                | ExecutionError::Broadcast(_)
                | ExecutionError::Ledger(_)
        )
    }

    /// Short machine-friendly tag used in records and alerts
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionError::ComplianceRejected { .. } => "compliance_rejected",
            ExecutionError::ComplianceUnavailable(_) => "compliance_unavailable",
            ExecutionError::ScoringFailed(_) => "scoring_failed",
            ExecutionError::UnsupportedVenue(_) => "unsupported_venue",
            ExecutionError::Build(_) => "build_failed",
            ExecutionError::Signing(_) => "signing_error",
            ExecutionError::Broadcast(BroadcastError::Exhausted { .. }) => "broadcast_exhausted",
            ExecutionError::Broadcast(_) => "broadcast_error",
            ExecutionError::Ledger(_) => "ledger_error",
            ExecutionError::Cancelled => "cancelled",
        }
    }
}

impl From<VenueError> for ExecutionError {
    fn from(err: VenueError) -> Self {
        match err {
            VenueError::UnsupportedVenue(venue) => ExecutionError::UnsupportedVenue(venue),
            other => ExecutionError::Build(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_venue_maps_to_its_own_variant() {
        let err: ExecutionError = VenueError::UnsupportedVenue("V9".into()).into();
        assert_eq!(err, ExecutionError::UnsupportedVenue("V9".into()));
        assert!(err.is_critical());
    }

    #[test]
    fn control_outcomes_are_not_critical() {
        let rejected = ExecutionError::ComplianceRejected {
            reason: "sanctioned".into(),
        };
        assert!(!rejected.is_critical());
        assert!(!ExecutionError::ScoringFailed("low confidence".into()).is_critical());
        assert!(!ExecutionError::Cancelled.is_critical());
    }

    #[test]
    fn exhausted_broadcast_reports_ambiguity() {
        let err = BroadcastError::Exhausted {
            attempts: 3,
            last_error: "congested".into(),
            ambiguous: true,
        };
        assert!(err.is_ambiguous());
        assert_eq!(
            ExecutionError::Broadcast(err).kind(),
            "broadcast_exhausted"
        );
    }

    #[test]
    fn rejections_are_classified_by_retryability() {
        assert_eq!(
            BroadcastError::rejection(true, "congested"),
            BroadcastError::Retryable("congested".into())
        );
        assert_eq!(
            BroadcastError::rejection(false, "bad signature"),
            BroadcastError::Fatal("bad signature".into())
        );
        assert!(!BroadcastError::Retryable("congested".into()).is_ambiguous());
    }

    #[test]
    fn invalid_config_lists_every_problem() {
        let err = TradegateError::InvalidConfig(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "Invalid configuration: a; b");
    }
}
