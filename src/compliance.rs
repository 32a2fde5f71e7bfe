//! Compliance gate collaborator and a limit-based paper implementation.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashSet;
use tracing::debug;

use crate::config::ComplianceLimits;
use crate::domain::{AssetId, TradeIntent};
use crate::error::CollaboratorError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComplianceDecision {
    Approved,
    Rejected(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ComplianceCheck: Send + Sync {
    async fn verify(&self, intent: &TradeIntent) -> Result<ComplianceDecision, CollaboratorError>;
}

/// Static per-trade limits and an asset blocklist
#[derive(Debug, Clone, Default)]
pub struct LimitCompliance {
    max_input_amount: Option<Decimal>,
    blocked: HashSet<AssetId>,
}

impl LimitCompliance {
    pub fn new(limits: &ComplianceLimits) -> Self {
        Self {
            max_input_amount: (limits.max_input_amount > Decimal::ZERO)
                .then_some(limits.max_input_amount),
            blocked: limits
                .blocked_assets
                .iter()
                .map(|a| AssetId::new(a.as_str()))
                .collect(),
        }
    }

    fn check(&self, intent: &TradeIntent) -> ComplianceDecision {
        if intent.input.amount <= Decimal::ZERO {
            return ComplianceDecision::Rejected("input amount must be positive".to_string());
        }
        if intent.input.asset == intent.output_asset {
            return ComplianceDecision::Rejected("input and output asset are the same".to_string());
        }
        if let Some(max) = self.max_input_amount {
            if intent.input.amount > max {
                return ComplianceDecision::Rejected(format!(
                    "input {} exceeds per-trade limit {max}",
                    intent.input.amount
                ));
            }
        }
        for asset in [&intent.input.asset, &intent.output_asset] {
            if self.blocked.contains(asset) {
                return ComplianceDecision::Rejected(format!("asset {asset} is blocked"));
            }
        }
        ComplianceDecision::Approved
    }
}

#[async_trait]
impl ComplianceCheck for LimitCompliance {
    async fn verify(&self, intent: &TradeIntent) -> Result<ComplianceDecision, CollaboratorError> {
        let decision = self.check(intent);
        debug!(intent_id = %intent.id, ?decision, "Compliance decision");
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AssetAmount;
    use ethers::types::Address;
    use rust_decimal_macros::dec;

    fn intent(input: &str, amount: Decimal, output: &str) -> TradeIntent {
        TradeIntent::new("V1", Address::zero(), AssetAmount::new(input, amount), output, dec!(1))
    }

    fn gate() -> LimitCompliance {
        LimitCompliance::new(&ComplianceLimits {
            max_input_amount: dec!(500),
            blocked_assets: vec!["SANCTIONED".into()],
        })
    }

    #[tokio::test]
    async fn approves_within_limits() {
        let decision = gate().verify(&intent("USDC", dec!(100), "SOL")).await.unwrap();
        assert_eq!(decision, ComplianceDecision::Approved);
    }

    #[tokio::test]
    async fn rejects_oversized_and_blocked_trades() {
        let g = gate();
        for bad in [
            intent("USDC", dec!(501), "SOL"),
            intent("USDC", dec!(10), "SANCTIONED"),
            intent("USDC", dec!(0), "SOL"),
            intent("SOL", dec!(1), "SOL"),
        ] {
            assert!(matches!(
                g.verify(&bad).await.unwrap(),
                ComplianceDecision::Rejected(_)
            ));
        }
    }

    #[tokio::test]
    async fn zero_limit_means_unlimited() {
        let g = LimitCompliance::new(&ComplianceLimits::default());
        let decision = g.verify(&intent("USDC", dec!(1_000_000), "SOL")).await.unwrap();
        assert_eq!(decision, ComplianceDecision::Approved);
    }
}
