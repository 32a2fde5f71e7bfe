pub mod broadcast;
pub mod cli;
pub mod compliance;
pub mod config;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod execution;
pub mod ledger;
pub mod ml;
pub mod paper;
pub mod persistence;
pub mod services;
pub mod signing;
pub mod supervisor;
pub mod venue;

pub use broadcast::{BroadcastRetrier, NetworkClient, PaperNetwork};
pub use compliance::{ComplianceCheck, ComplianceDecision, LimitCompliance};
pub use config::AppConfig;
pub use coordination::{cancel_pair, CancelHandle, CancelSignal};
pub use domain::{
    AssetAmount, AssetId, ExecutionRecord, ExecutionStatus, PortfolioDelta, TradeIntent,
    TransactionId,
};
pub use error::{ExecutionError, Result, TradegateError};
pub use execution::{ExecutionPipeline, PipelineComponents};
pub use ledger::{ApplyOutcome, PortfolioLedger};
pub use paper::PaperEnvironment;
pub use persistence::ExecutionJournal;
pub use services::{ExecutionMetrics, MetricsSink};
pub use signing::{CustodySigner, SignerQuorum};
pub use supervisor::{AlertLevel, AlertManager, AlertManagerConfig, Incident, IncidentNotifier};
pub use venue::{VenueKind, VenueRegistry};
