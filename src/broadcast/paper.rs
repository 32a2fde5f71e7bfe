use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

use super::{NetworkClient, SubmitOutcome, TxStatus};
use crate::domain::{SignedTransaction, TransactionId};
use crate::error::CollaboratorError;

#[derive(Debug, Default)]
struct NetworkState {
    /// local id -> network id
    accepted: HashMap<TransactionId, TransactionId>,
    submissions: u32,
    congested_remaining: u32,
    lost_replies_remaining: u32,
}

/// In-memory network for paper trading and tests.
///
/// Deduplicates by signed bytes the way a real chain does: resubmitting an
/// accepted transaction returns the original id and changes nothing.
#[derive(Debug, Default)]
pub struct PaperNetwork {
    state: Mutex<NetworkState>,
    fixed_id: Option<TransactionId>,
    fatal_reason: Option<String>,
}

impl PaperNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return this id for every accepted transaction
    pub fn with_fixed_id(mut self, tx_id: impl Into<String>) -> Self {
        self.fixed_id = Some(TransactionId::new(tx_id));
        self
    }

    /// Reject the first `n` submissions as congested
    pub fn with_congestion(self, n: u32) -> Self {
        self.update(|s| s.congested_remaining = n);
        self
    }

    /// Accept the first `n` submissions but lose the reply
    pub fn with_lost_replies(self, n: u32) -> Self {
        self.update(|s| s.lost_replies_remaining = n);
        self
    }

    /// Permanently reject everything
    pub fn rejecting(mut self, reason: impl Into<String>) -> Self {
        self.fatal_reason = Some(reason.into());
        self
    }

    pub fn submissions(&self) -> u32 {
        self.read(|s| s.submissions)
    }

    /// Distinct transactions the network has accepted
    pub fn accepted_count(&self) -> usize {
        self.read(|s| s.accepted.len())
    }

    fn update(&self, f: impl FnOnce(&mut NetworkState)) {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard);
    }

    fn read<T>(&self, f: impl FnOnce(&NetworkState) -> T) -> T {
        let guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&guard)
    }
}

#[async_trait]
impl NetworkClient for PaperNetwork {
    async fn submit(&self, tx: &SignedTransaction) -> SubmitOutcome {
        let local_id = tx.local_id();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.submissions += 1;

        if let Some(reason) = &self.fatal_reason {
            return SubmitOutcome::Rejected {
                retryable: false,
                reason: reason.clone(),
            };
        }
        if let Some(existing) = state.accepted.get(&local_id) {
            debug!(%local_id, "Duplicate submission ignored");
            return SubmitOutcome::Accepted(existing.clone());
        }
        if state.congested_remaining > 0 {
            state.congested_remaining -= 1;
            return SubmitOutcome::Rejected {
                retryable: true,
                reason: "network congested".to_string(),
            };
        }

        let network_id = self.fixed_id.clone().unwrap_or_else(|| local_id.clone());
        state.accepted.insert(local_id, network_id.clone());

        if state.lost_replies_remaining > 0 {
            state.lost_replies_remaining -= 1;
            return SubmitOutcome::Ambiguous("reply lost".to_string());
        }
        SubmitOutcome::Accepted(network_id)
    }

    async fn lookup(&self, tx_id: &TransactionId) -> Result<TxStatus, CollaboratorError> {
        Ok(self.read(|s| match s.accepted.get(tx_id) {
            Some(network_id) => TxStatus::Confirmed(network_id.clone()),
            None => TxStatus::NotFound,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::BroadcastRetrier;
    use crate::config::BroadcastConfig;
    use crate::domain::{Quote, UnsignedTransaction};
    use ethers::types::Address;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn signed(anchor: &str) -> SignedTransaction {
        let unsigned = UnsignedTransaction {
            venue: "V1".into(),
            instructions: vec![],
            fee_payer: Address::repeat_byte(1),
            validity_anchor: anchor.into(),
            required_signers: vec![Address::repeat_byte(1)],
            quote: Quote {
                quoted_output: dec!(1),
                min_output: dec!(1),
            },
        };
        let digest = unsigned.digest().unwrap();
        SignedTransaction::assemble(unsigned, digest, vec![])
    }

    #[tokio::test]
    async fn resubmission_is_deduplicated() {
        let network = PaperNetwork::new().with_fixed_id("tx123");
        let tx = signed("a");

        assert_eq!(network.submit(&tx).await, SubmitOutcome::Accepted("tx123".into()));
        assert_eq!(network.submit(&tx).await, SubmitOutcome::Accepted("tx123".into()));
        assert_eq!(network.submissions(), 2);
        assert_eq!(network.accepted_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn lost_reply_is_recovered_without_second_acceptance() {
        let network = Arc::new(PaperNetwork::new().with_lost_replies(1));
        let retrier = BroadcastRetrier::new(network.clone(), &BroadcastConfig::default());
        let tx = signed("b");

        let receipt = retrier.broadcast(&tx, 3).await.unwrap();
        assert!(receipt.recovered);
        assert_eq!(receipt.tx_id, tx.local_id());
        assert_eq!(network.submissions(), 1);
        assert_eq!(network.accepted_count(), 1);
    }

    #[tokio::test]
    async fn lookup_misses_unknown_transaction() {
        let network = PaperNetwork::new();
        let status = network.lookup(&TransactionId::from("0xdead")).await;
        assert_eq!(status, Ok(TxStatus::NotFound));
    }
}
