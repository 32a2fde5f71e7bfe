use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{AssetId, TradeIntent};

/// Signed per-asset balance changes produced by one trade
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioDelta {
    changes: BTreeMap<AssetId, Decimal>,
}

impl PortfolioDelta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Debit the input asset and credit the expected output
    pub fn from_intent(intent: &TradeIntent) -> Self {
        Self::new()
            .with_change(intent.input.asset.clone(), -intent.input.amount)
            .with_change(intent.output_asset.clone(), intent.expected_output)
    }

    /// Add a change; repeated assets are netted
    pub fn with_change(mut self, asset: AssetId, change: Decimal) -> Self {
        *self.changes.entry(asset).or_insert(Decimal::ZERO) += change;
        self
    }

    pub fn changes(&self) -> impl Iterator<Item = (&AssetId, &Decimal)> {
        self.changes.iter()
    }

    pub fn get(&self, asset: &AssetId) -> Decimal {
        self.changes.get(asset).copied().unwrap_or(Decimal::ZERO)
    }

    /// True when no leg changes any balance
    pub fn is_empty(&self) -> bool {
        self.changes.values().all(|c| c.is_zero())
    }
}
