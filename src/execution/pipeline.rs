use chrono::Utc;
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::broadcast::{BroadcastRetrier, NetworkClient};
use crate::compliance::{ComplianceCheck, ComplianceDecision};
use crate::config::{BroadcastConfig, PipelineConfig};
use crate::coordination::CancelSignal;
use crate::domain::{
    ExecutionRecord, ExecutionStatus, PortfolioDelta, ReconciliationRecord, Stage, TradeIntent,
    TransactionId,
};
use crate::error::{CollaboratorError, ExecutionError};
use crate::ledger::{ApplyOutcome, PortfolioLedger};
use crate::ml::{preprocess, PredictiveModel, ScoreOutcome, ScoringPolicy};
use crate::persistence::ExecutionJournal;
use crate::services::{ExecutionTimer, MetricsSink};
use crate::signing::SignerQuorum;
use crate::supervisor::{AlertLevel, Incident, IncidentNotifier};
use crate::venue::{TradeParams, VenueRegistry, BPS};

/// Collaborators the pipeline is wired with
pub struct PipelineComponents {
    pub compliance: Arc<dyn ComplianceCheck>,
    pub model: Arc<dyn PredictiveModel>,
    pub venues: VenueRegistry,
    pub quorum: SignerQuorum,
    pub network: Arc<dyn NetworkClient>,
    pub ledger: Arc<PortfolioLedger>,
    pub metrics: Arc<dyn MetricsSink>,
    pub notifier: Arc<dyn IncidentNotifier>,
    pub journal: Arc<ExecutionJournal>,
}

/// Successful run
struct Executed {
    tx_id: TransactionId,
    slippage_bps: Decimal,
}

/// Failed run with the stage it stopped in
struct StageFailure {
    stage: Stage,
    error: ExecutionError,
    tx_id: Option<TransactionId>,
}

impl StageFailure {
    fn new(stage: Stage, error: impl Into<ExecutionError>) -> Self {
        Self {
            stage,
            error: error.into(),
            tx_id: None,
        }
    }

    fn with_tx(mut self, tx_id: TransactionId) -> Self {
        self.tx_id = Some(tx_id);
        self
    }
}

/// Secure trade-execution pipeline.
///
/// Stages run strictly in order: compliance, scoring, venue build, custody
/// signing, broadcast, ledger update. Failures from build onwards go through
/// [`ExecutionPipeline::handle_critical_error`]; every run leaves exactly one
/// [`ExecutionRecord`] in the journal and one latency sample.
pub struct ExecutionPipeline {
    compliance: Arc<dyn ComplianceCheck>,
    model: Arc<dyn PredictiveModel>,
    venues: VenueRegistry,
    quorum: SignerQuorum,
    broadcaster: BroadcastRetrier,
    ledger: Arc<PortfolioLedger>,
    metrics: Arc<dyn MetricsSink>,
    notifier: Arc<dyn IncidentNotifier>,
    journal: Arc<ExecutionJournal>,
    policy: ScoringPolicy,
    compliance_timeout: Duration,
    model_timeout: Duration,
    max_attempts: u32,
}

impl ExecutionPipeline {
    pub fn new(
        components: PipelineComponents,
        pipeline: &PipelineConfig,
        broadcast: &BroadcastConfig,
    ) -> Self {
        Self {
            compliance: components.compliance,
            model: components.model,
            venues: components.venues,
            quorum: components.quorum,
            broadcaster: BroadcastRetrier::new(components.network, broadcast),
            ledger: components.ledger,
            metrics: components.metrics,
            notifier: components.notifier,
            journal: components.journal,
            policy: ScoringPolicy::from_config(pipeline),
            compliance_timeout: pipeline.compliance_timeout(),
            model_timeout: pipeline.model_timeout(),
            max_attempts: broadcast.max_attempts,
        }
    }

    pub fn ledger(&self) -> &Arc<PortfolioLedger> {
        &self.ledger
    }

    pub fn journal(&self) -> &Arc<ExecutionJournal> {
        &self.journal
    }

    /// Run one trade to completion
    pub async fn execute_trade(&self, intent: &TradeIntent) -> Result<TransactionId, ExecutionError> {
        self.execute_trade_with_cancel(intent, CancelSignal::never())
            .await
    }

    /// Run one trade; `cancel` is honored until the first broadcast attempt
    pub async fn execute_trade_with_cancel(
        &self,
        intent: &TradeIntent,
        cancel: CancelSignal,
    ) -> Result<TransactionId, ExecutionError> {
        let mut timer = ExecutionTimer::start(self.metrics.clone(), intent.venue.clone());
        let span = info_span!("execute_trade", intent_id = %intent.id, venue = %intent.venue);

        let outcome = self.run(intent, &cancel).instrument(span).await;

        let (status, result, record) = match outcome {
            Ok(executed) => {
                info!(
                    intent_id = %intent.id,
                    tx_id = %executed.tx_id,
                    slippage_bps = %executed.slippage_bps,
                    "Trade executed"
                );
                let record = self.record(intent, ExecutionStatus::Executed, &timer);
                let record = ExecutionRecord {
                    tx_id: Some(executed.tx_id.clone()),
                    slippage_bps: Some(executed.slippage_bps),
                    ..record
                };
                (ExecutionStatus::Executed, Ok(executed.tx_id), record)
            }
            Err(failure) => {
                let status = if failure.error.is_critical() {
                    ExecutionStatus::Errored
                } else {
                    info!(
                        intent_id = %intent.id,
                        stage = %failure.stage,
                        reason = %failure.error,
                        "Trade not executed"
                    );
                    ExecutionStatus::Rejected
                };
                let record = ExecutionRecord {
                    tx_id: failure.tx_id.clone(),
                    failed_stage: Some(failure.stage),
                    error: Some(failure.error.to_string()),
                    ..self.record(intent, status, &timer)
                };
                let error = if failure.error.is_critical() {
                    self.handle_critical_error(intent, &failure)
                } else {
                    failure.error
                };
                (status, Err(error), record)
            }
        };

        self.journal.append_execution(record).await;
        timer.set_status(status);
        result
    }

    fn record(
        &self,
        intent: &TradeIntent,
        status: ExecutionStatus,
        timer: &ExecutionTimer,
    ) -> ExecutionRecord {
        ExecutionRecord {
            intent_id: intent.id,
            venue: intent.venue.clone(),
            status,
            tx_id: None,
            latency_ms: timer.elapsed().as_millis() as u64,
            slippage_bps: None,
            failed_stage: None,
            error: None,
            recorded_at: Utc::now(),
        }
    }

    async fn run(&self, intent: &TradeIntent, cancel: &CancelSignal) -> Result<Executed, StageFailure> {
        // 1. compliance
        unless_cancelled(cancel, Stage::Compliance, self.check_compliance(intent)).await?;

        // 2. scoring (advisory)
        let slippage_bps = unless_cancelled(cancel, Stage::Scoring, self.score(intent)).await?;

        // 3. venue build
        let params = TradeParams::from_intent(intent, self.quorum.co_signers(), slippage_bps);
        let unsigned = unless_cancelled(cancel, Stage::Build, async {
            self.venues
                .build(&intent.venue, &params)
                .await
                .map_err(ExecutionError::from)
        })
        .await?;

        // 4. custody signing
        let signed = unless_cancelled(cancel, Stage::Signing, async {
            self.quorum.sign(&unsigned).await.map_err(ExecutionError::from)
        })
        .await?;

        if cancel.is_cancelled() {
            return Err(StageFailure::new(Stage::Broadcast, ExecutionError::Cancelled));
        }

        // 5. broadcast; not cancellable from here on
        let receipt = match self.broadcaster.broadcast(&signed, self.max_attempts).await {
            Ok(receipt) => receipt,
            Err(e) => {
                let local_id = signed.local_id();
                if e.is_ambiguous() {
                    self.reconcile(intent, &local_id, &e.to_string(), false).await;
                }
                return Err(StageFailure::new(Stage::Broadcast, e).with_tx(local_id));
            }
        };
        debug!(tx_id = %receipt.tx_id, attempts = receipt.attempts, recovered = receipt.recovered, "Broadcast confirmed");

        // 6. ledger, keyed by the network id
        let delta = PortfolioDelta::from_intent(intent);
        match self.ledger.apply_delta(&receipt.tx_id, &delta).await {
            Ok(ApplyOutcome::Applied) => {}
            Ok(ApplyOutcome::AlreadyApplied) => {
                warn!(tx_id = %receipt.tx_id, "Ledger already reflected this transaction");
            }
            Err(e) => {
                self.reconcile(intent, &receipt.tx_id, &e.to_string(), true).await;
                return Err(StageFailure::new(Stage::Ledger, e).with_tx(receipt.tx_id));
            }
        }

        // 7. telemetry
        let slippage_bps = realized_slippage_bps(intent.expected_output, unsigned.quote.quoted_output);
        self.metrics.record_slippage(&intent.venue, slippage_bps);

        Ok(Executed {
            tx_id: receipt.tx_id,
            slippage_bps,
        })
    }

    async fn check_compliance(&self, intent: &TradeIntent) -> Result<(), ExecutionError> {
        let start = Instant::now();
        match timeout(self.compliance_timeout, self.compliance.verify(intent)).await {
            Ok(Ok(ComplianceDecision::Approved)) => Ok(()),
            Ok(Ok(ComplianceDecision::Rejected(reason))) => {
                Err(ExecutionError::ComplianceRejected { reason })
            }
            Ok(Err(e)) => Err(ExecutionError::ComplianceUnavailable(e)),
            Err(_) => Err(ExecutionError::ComplianceUnavailable(CollaboratorError::timeout(
                "compliance",
                start.elapsed().as_millis() as u64,
            ))),
        }
    }

    /// Slippage tolerance for the trade, in bps
    async fn score(&self, intent: &TradeIntent) -> Result<Decimal, ExecutionError> {
        let features = preprocess(intent);
        let result = if !features.is_finite() {
            Err(CollaboratorError::rejected("model", "non-finite features"))
        } else {
            let start = Instant::now();
            match timeout(self.model_timeout, self.model.predict(&features)).await {
                Ok(result) => result,
                Err(_) => Err(CollaboratorError::timeout(
                    "model",
                    start.elapsed().as_millis() as u64,
                )),
            }
        };

        let outcome = self.policy.assess(result);
        if let ScoreOutcome::Degraded { reason } = &outcome {
            if self.policy.fail_closed {
                return Err(ExecutionError::ScoringFailed(reason.clone()));
            }
            warn!(%reason, "Scoring degraded, using conservative slippage");
        }

        let slippage_bps = self.policy.slippage_bps(&outcome);
        debug!(?outcome, %slippage_bps, "Slippage tolerance set");
        Ok(slippage_bps)
    }

    async fn reconcile(
        &self,
        intent: &TradeIntent,
        tx_id: &TransactionId,
        reason: &str,
        broadcast_confirmed: bool,
    ) {
        self.journal
            .append_reconciliation(ReconciliationRecord {
                intent_id: intent.id,
                tx_id: tx_id.clone(),
                delta: PortfolioDelta::from_intent(intent),
                reason: reason.to_string(),
                broadcast_confirmed,
                recorded_at: Utc::now(),
            })
            .await;
    }

    /// Single escalation path: count, notify, hand the error back
    fn handle_critical_error(&self, intent: &TradeIntent, failure: &StageFailure) -> ExecutionError {
        let error = &failure.error;
        error!(
            intent_id = %intent.id,
            venue = %intent.venue,
            stage = %failure.stage,
            kind = error.kind(),
            error = %error,
            "Critical execution failure"
        );

        self.metrics.increment_critical_errors(error.kind());

        let level = match error {
            ExecutionError::Ledger(_) => AlertLevel::Critical,
            ExecutionError::Broadcast(e) if e.is_ambiguous() => AlertLevel::Critical,
            _ => AlertLevel::Error,
        };
        self.notifier.notify(Incident {
            intent_id: intent.id,
            venue: intent.venue.clone(),
            stage: failure.stage,
            level,
            kind: error.kind().to_string(),
            message: error.to_string(),
            tx_id: failure.tx_id.clone(),
            occurred_at: Utc::now(),
        });

        error.clone()
    }
}

/// Race a pre-broadcast stage against cancellation
async fn unless_cancelled<T, F>(cancel: &CancelSignal, stage: Stage, stage_fut: F) -> Result<T, StageFailure>
where
    F: Future<Output = Result<T, ExecutionError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            info!(%stage, "Trade cancelled");
            Err(StageFailure::new(stage, ExecutionError::Cancelled))
        }
        result = stage_fut => result.map_err(|e| StageFailure::new(stage, e)),
    }
}

/// Shortfall of quoted versus expected output, in bps
fn realized_slippage_bps(expected: Decimal, quoted: Decimal) -> Decimal {
    if expected <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    // Only a quote far above expectation overflows
    (expected - quoted)
        .checked_div(expected)
        .and_then(|ratio| ratio.checked_mul(Decimal::from(BPS)))
        .map(|bps| bps.round_dp(2))
        .unwrap_or(Decimal::MIN)
}
