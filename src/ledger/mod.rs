//! Authoritative portfolio balances.
//!
//! The only mutation is [`PortfolioLedger::apply_delta`], keyed by the
//! network-confirmed transaction id. Every leg is validated before any leg is
//! written, inside one write section, so readers see either the whole trade or
//! none of it.

use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::domain::{AssetId, PortfolioDelta, TransactionId};
use crate::error::LedgerError;

/// Result of a successful `apply_delta`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// The transaction id was seen before; balances untouched
    AlreadyApplied,
}

#[derive(Debug, Default)]
struct LedgerState {
    balances: BTreeMap<AssetId, Decimal>,
    applied: HashMap<TransactionId, PortfolioDelta>,
    version: u64,
}

#[derive(Debug, Default)]
pub struct PortfolioLedger {
    state: RwLock<LedgerState>,
}

impl PortfolioLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed opening balances
    pub fn with_balances<I, A>(balances: I) -> Self
    where
        I: IntoIterator<Item = (A, Decimal)>,
        A: Into<AssetId>,
    {
        let balances = balances
            .into_iter()
            .map(|(asset, amount)| (asset.into(), amount))
            .collect();
        Self {
            state: RwLock::new(LedgerState {
                balances,
                ..LedgerState::default()
            }),
        }
    }

    /// Apply `delta` once for `tx_id`.
    pub async fn apply_delta(
        &self,
        tx_id: &TransactionId,
        delta: &PortfolioDelta,
    ) -> Result<ApplyOutcome, LedgerError> {
        let mut state = self.state.write().await;

        if let Some(previous) = state.applied.get(tx_id) {
            if previous != delta {
                warn!(%tx_id, "Repeated transaction id carries a different delta; ignoring");
            } else {
                debug!(%tx_id, "Delta already applied");
            }
            return Ok(ApplyOutcome::AlreadyApplied);
        }

        if delta.is_empty() {
            return Err(LedgerError::EmptyDelta(tx_id.to_string()));
        }

        let mut updated = Vec::new();
        for (asset, change) in delta.changes() {
            let available = state.balances.get(asset).copied().unwrap_or(Decimal::ZERO);
            let next = available
                .checked_add(*change)
                .ok_or_else(|| LedgerError::Overflow {
                    asset: asset.clone(),
                    available,
                    change: *change,
                })?;
            if next < Decimal::ZERO {
                return Err(LedgerError::InsufficientBalance {
                    asset: asset.clone(),
                    available,
                    change: *change,
                });
            }
            updated.push((asset.clone(), next));
        }

        for (asset, balance) in updated {
            state.balances.insert(asset, balance);
        }
        state.applied.insert(tx_id.clone(), delta.clone());
        state.version += 1;

        info!(%tx_id, version = state.version, "Portfolio delta applied");
        Ok(ApplyOutcome::Applied)
    }

    pub async fn balance(&self, asset: &AssetId) -> Decimal {
        self.state
            .read()
            .await
            .balances
            .get(asset)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Consistent copy of every balance
    pub async fn snapshot(&self) -> BTreeMap<AssetId, Decimal> {
        self.state.read().await.balances.clone()
    }

    pub async fn is_applied(&self, tx_id: &TransactionId) -> bool {
        self.state.read().await.applied.contains_key(tx_id)
    }

    /// Number of committed updates
    pub async fn version(&self) -> u64 {
        self.state.read().await.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn trade(input: Decimal, output: Decimal) -> PortfolioDelta {
        PortfolioDelta::new()
            .with_change("USDC".into(), -input)
            .with_change("SOL".into(), output)
    }

    fn ledger() -> PortfolioLedger {
        PortfolioLedger::with_balances([("USDC", dec!(1000)), ("SOL", dec!(0))])
    }

    #[tokio::test]
    async fn applies_once_per_transaction() {
        let ledger = ledger();
        let tx: TransactionId = "tx123".into();
        let delta = trade(dec!(100), dec!(95));

        assert_eq!(ledger.apply_delta(&tx, &delta).await, Ok(ApplyOutcome::Applied));
        let after_first = ledger.snapshot().await;

        assert_eq!(
            ledger.apply_delta(&tx, &delta).await,
            Ok(ApplyOutcome::AlreadyApplied)
        );
        assert_eq!(ledger.snapshot().await, after_first);
        assert_eq!(ledger.balance(&"USDC".into()).await, dec!(900));
        assert_eq!(ledger.balance(&"SOL".into()).await, dec!(95));
        assert_eq!(ledger.version().await, 1);
    }

    #[tokio::test]
    async fn conflicting_delta_for_known_id_is_ignored() {
        let ledger = ledger();
        let tx: TransactionId = "tx1".into();
        ledger.apply_delta(&tx, &trade(dec!(10), dec!(9))).await.unwrap();

        let outcome = ledger.apply_delta(&tx, &trade(dec!(500), dec!(1))).await;
        assert_eq!(outcome, Ok(ApplyOutcome::AlreadyApplied));
        assert_eq!(ledger.balance(&"USDC".into()).await, dec!(990));
    }

    #[tokio::test]
    async fn overdraft_leaves_every_leg_untouched() {
        let ledger = ledger();
        let before = ledger.snapshot().await;

        let err = ledger
            .apply_delta(&"tx2".into(), &trade(dec!(1500), dec!(10)))
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        assert_eq!(ledger.snapshot().await, before);
        assert!(!ledger.is_applied(&"tx2".into()).await);
    }

    #[tokio::test]
    async fn spending_to_exactly_zero_is_allowed() {
        let ledger = ledger();
        ledger
            .apply_delta(&"all-in".into(), &trade(dec!(1000), dec!(1)))
            .await
            .unwrap();
        assert_eq!(ledger.balance(&"USDC".into()).await, Decimal::ZERO);
    }

    #[tokio::test]
    async fn empty_delta_is_rejected() {
        let ledger = ledger();
        let err = ledger
            .apply_delta(&"noop".into(), &PortfolioDelta::new())
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::EmptyDelta("noop".into()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_distinct_trades_all_land() {
        let ledger = Arc::new(ledger());
        let mut handles = Vec::new();
        for i in 0..50 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                let tx = TransactionId::new(format!("tx-{i}"));
                ledger.apply_delta(&tx, &trade(dec!(10), dec!(2))).await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(ApplyOutcome::Applied));
        }

        assert_eq!(ledger.balance(&"USDC".into()).await, dec!(500));
        assert_eq!(ledger.balance(&"SOL".into()).await, dec!(100));
        assert_eq!(ledger.version().await, 50);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_duplicates_apply_once() {
        let ledger = Arc::new(ledger());
        let tx: TransactionId = "dup".into();
        let mut handles = Vec::new();
        for _ in 0..20 {
            let (ledger, tx) = (ledger.clone(), tx.clone());
            handles.push(tokio::spawn(async move {
                ledger.apply_delta(&tx, &trade(dec!(100), dec!(95))).await
            }));
        }

        let mut applied = 0;
        for handle in handles {
            if handle.await.unwrap() == Ok(ApplyOutcome::Applied) {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);
        assert_eq!(ledger.balance(&"USDC".into()).await, dec!(900));
    }

    #[tokio::test]
    async fn balance_overflow_is_rejected_atomically() {
        let ledger = PortfolioLedger::with_balances([("USDC", dec!(1000)), ("SOL", Decimal::MAX)]);
        let tx = TransactionId::from("tx-overflow");

        let err = ledger.apply_delta(&tx, &trade(dec!(100), dec!(1))).await.unwrap_err();

        assert!(matches!(err, LedgerError::Overflow { ref asset, .. } if asset.as_str() == "SOL"));
        assert_eq!(ledger.balance(&"USDC".into()).await, dec!(1000));
        assert_eq!(ledger.balance(&"SOL".into()).await, Decimal::MAX);
        assert!(!ledger.is_applied(&tx).await);
        assert_eq!(ledger.version().await, 0);
    }
}
