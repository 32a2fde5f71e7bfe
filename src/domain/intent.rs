use chrono::{DateTime, Utc};
use ethers::types::Address;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Asset identifier (mint, token symbol, or contract address)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AssetId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Quantity of a single asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetAmount {
    pub asset: AssetId,
    pub amount: Decimal,
}

impl AssetAmount {
    pub fn new(asset: impl Into<AssetId>, amount: Decimal) -> Self {
        Self {
            asset: asset.into(),
            amount,
        }
    }
}

/// Market data captured alongside the intent, used for scoring
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Mid price as output-asset units per unit of input asset
    pub mid_price: Decimal,
    /// Quoted spread in basis points
    pub spread_bps: Decimal,
    /// Recent prices, oldest first
    #[serde(default)]
    pub recent_prices: Vec<Decimal>,
    /// 24h volume in input-asset units
    #[serde(default)]
    pub volume_24h: Decimal,
    pub observed_at: Option<DateTime<Utc>>,
}

/// A proposed trade submitted to the pipeline.
///
/// Immutable once submitted; the pipeline only ever borrows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeIntent {
    pub id: Uuid,
    /// Venue identifier as registered in the venue registry
    pub venue: String,
    /// Owner identity; also the fee payer of the built transaction
    pub owner: Address,
    pub input: AssetAmount,
    pub output_asset: AssetId,
    /// Output the caller expects to receive
    pub expected_output: Decimal,
    pub market: MarketSnapshot,
    pub created_at: DateTime<Utc>,
}

impl TradeIntent {
    pub fn new(
        venue: impl Into<String>,
        owner: Address,
        input: AssetAmount,
        output_asset: impl Into<AssetId>,
        expected_output: Decimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            venue: venue.into(),
            owner,
            input,
            output_asset: output_asset.into(),
            expected_output,
            market: MarketSnapshot::default(),
            created_at: Utc::now(),
        }
    }

    pub fn with_market(mut self, market: MarketSnapshot) -> Self {
        self.market = market;
        self
    }

    /// Implied price of the trade (output per unit input); `None` for a zero
    /// input or when the ratio does not fit a `Decimal`
    pub fn implied_price(&self) -> Option<Decimal> {
        self.expected_output.checked_div(self.input.amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn implied_price_guards_zero_input() {
        let intent = TradeIntent::new(
            "V1",
            Address::zero(),
            AssetAmount::new("A", dec!(0)),
            "B",
            dec!(95),
        );
        assert_eq!(intent.implied_price(), None);

        let intent = TradeIntent::new(
            "V1",
            Address::zero(),
            AssetAmount::new("A", dec!(100)),
            "B",
            dec!(95),
        );
        assert_eq!(intent.implied_price(), Some(dec!(0.95)));
    }

    #[test]
    fn implied_price_is_none_on_overflow() {
        let intent = TradeIntent::new(
            "V1",
            Address::zero(),
            AssetAmount::new("A", dec!(0.0000000000000000000000000001)),
            "B",
            Decimal::MAX,
        );
        assert_eq!(intent.implied_price(), None);
    }
}
