use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use super::{NetworkClient, SubmitOutcome, TxStatus};
use crate::config::BroadcastConfig;
use crate::domain::{SignedTransaction, TransactionId};
use crate::error::BroadcastError;

/// Successful broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastReceipt {
    /// Network-confirmed transaction id
    pub tx_id: TransactionId,
    /// Submissions actually sent
    pub attempts: u32,
    /// True when acceptance was discovered by lookup after an ambiguous submit
    pub recovered: bool,
}

/// Submits one signed transaction with bounded retry and linear backoff.
///
/// The same signed bytes are reused on every attempt. After an ambiguous
/// outcome the network is asked whether the transaction already landed before
/// anything is resubmitted.
pub struct BroadcastRetrier {
    network: Arc<dyn NetworkClient>,
    base_delay: Duration,
    submit_timeout: Duration,
    lookup_timeout: Duration,
}

impl BroadcastRetrier {
    pub fn new(network: Arc<dyn NetworkClient>, config: &BroadcastConfig) -> Self {
        Self {
            network,
            base_delay: config.base_delay(),
            submit_timeout: config.submit_timeout(),
            lookup_timeout: config.lookup_timeout(),
        }
    }

    /// Delay after failed attempt `attempt` (1-based)
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    pub async fn broadcast(
        &self,
        tx: &SignedTransaction,
        max_attempts: u32,
    ) -> Result<BroadcastReceipt, BroadcastError> {
        let max_attempts = max_attempts.max(1);
        let local_id = tx.local_id();
        let mut last_error = String::new();
        let mut ambiguous = false;
        let mut lookup_pending = false;
        let mut sent = 0u32;

        for attempt in 1..=max_attempts {
            if lookup_pending {
                if let Some(tx_id) = self.prior_acceptance(&local_id).await? {
                    return Ok(BroadcastReceipt {
                        tx_id,
                        attempts: sent,
                        recovered: true,
                    });
                }
            }

            sent += 1;
            let outcome = match timeout(self.submit_timeout, self.network.submit(tx)).await {
                Ok(outcome) => outcome,
                Err(_) => SubmitOutcome::Ambiguous(format!(
                    "submit timed out after {}ms",
                    self.submit_timeout.as_millis()
                )),
            };

            match outcome {
                SubmitOutcome::Accepted(tx_id) => {
                    info!(%tx_id, attempt, "Transaction accepted");
                    return Ok(BroadcastReceipt {
                        tx_id,
                        attempts: sent,
                        recovered: false,
                    });
                }
                SubmitOutcome::Rejected { retryable, reason } => {
                    match BroadcastError::rejection(retryable, reason) {
                        BroadcastError::Retryable(reason) => {
                            warn!(%local_id, attempt, %reason, "Broadcast attempt failed");
                            last_error = reason;
                            lookup_pending = false;
                        }
                        fatal => {
                            error!(%local_id, attempt, error = %fatal, "Broadcast rejected permanently");
                            return Err(fatal);
                        }
                    }
                }
                SubmitOutcome::Ambiguous(reason) => {
                    warn!(%local_id, attempt, %reason, "Broadcast outcome unknown");
                    last_error = reason;
                    ambiguous = true;
                    lookup_pending = true;
                }
            }

            if attempt < max_attempts {
                let delay = self.backoff_delay(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "Backing off");
                sleep(delay).await;
            }
        }

        // An earlier ambiguous submit may still have landed.
        if ambiguous {
            if let Some(tx_id) = self.prior_acceptance(&local_id).await? {
                return Ok(BroadcastReceipt {
                    tx_id,
                    attempts: sent,
                    recovered: true,
                });
            }
        }

        error!(%local_id, attempts = sent, ambiguous, %last_error, "Broadcast retries exhausted");
        Err(BroadcastError::Exhausted {
            attempts: sent,
            last_error,
            ambiguous,
        })
    }

    /// `Ok(None)` means not found or unknown; resubmitting identical bytes is safe.
    async fn prior_acceptance(
        &self,
        local_id: &TransactionId,
    ) -> Result<Option<TransactionId>, BroadcastError> {
        match timeout(self.lookup_timeout, self.network.lookup(local_id)).await {
            Ok(Ok(TxStatus::Confirmed(tx_id))) => {
                info!(%local_id, %tx_id, "Prior submission found on network");
                Ok(Some(tx_id))
            }
            Ok(Ok(TxStatus::Failed(reason))) => {
                error!(%local_id, %reason, "Prior submission failed on network");
                Err(BroadcastError::Fatal(format!("transaction failed: {reason}")))
            }
            Ok(Ok(TxStatus::NotFound)) => Ok(None),
            Ok(Err(e)) => {
                warn!(%local_id, error = %e, "Status lookup failed");
                Ok(None)
            }
            Err(_) => {
                warn!(%local_id, "Status lookup timed out");
                Ok(None)
            }
        }
    }
}
