use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{PortfolioDelta, TransactionId};

/// Final status of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionStatus {
    /// Broadcast confirmed and ledger updated
    Executed,
    /// Stopped by compliance, scoring policy or cancellation
    Rejected,
    /// System fault from build onwards
    Errored,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Executed => write!(f, "EXECUTED"),
            ExecutionStatus::Rejected => write!(f, "REJECTED"),
            ExecutionStatus::Errored => write!(f, "ERRORED"),
        }
    }
}

/// Pipeline stage names used in records and incidents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Compliance,
    Scoring,
    Build,
    Signing,
    Broadcast,
    Ledger,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Compliance => "compliance",
            Stage::Scoring => "scoring",
            Stage::Build => "build",
            Stage::Signing => "signing",
            Stage::Broadcast => "broadcast",
            Stage::Ledger => "ledger",
        };
        f.write_str(s)
    }
}

/// Audit record, written once per pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub intent_id: Uuid,
    pub venue: String,
    pub status: ExecutionStatus,
    pub tx_id: Option<TransactionId>,
    pub latency_ms: u64,
    /// Expected vs quoted output, in basis points (positive = worse than expected)
    pub slippage_bps: Option<Decimal>,
    pub failed_stage: Option<Stage>,
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Broadcast that the ledger could not (or may not) reflect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationRecord {
    pub intent_id: Uuid,
    pub tx_id: TransactionId,
    pub delta: PortfolioDelta,
    pub reason: String,
    /// False when the network outcome itself is unknown
    pub broadcast_confirmed: bool,
    pub recorded_at: DateTime<Utc>,
}
