//! Venue adapters and the registry that dispatches to them.
//!
//! Adapters are a closed set: adding a venue kind means adding a variant to
//! [`VenueAdapter`], so every dispatch site is checked by the compiler.

pub mod constant_product;
pub mod order_book;
pub mod paper;
pub mod registry;

pub use constant_product::ConstantProductAdapter;
pub use order_book::OrderBookAdapter;
pub use paper::StaticLiquidity;
pub use registry::VenueRegistry;

use async_trait::async_trait;
use ethers::types::Address;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{AssetAmount, AssetId, TradeIntent, UnsignedTransaction};
use crate::error::{CollaboratorError, VenueError};

pub(crate) const BPS: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueKind {
    ConstantProduct,
    OrderBook,
}

impl VenueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VenueKind::ConstantProduct => "constant_product",
            VenueKind::OrderBook => "order_book",
        }
    }
}

impl std::fmt::Display for VenueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One price level; price is input units per unit of output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Decimal,
    pub size: Decimal,
}

/// Normalized parameters every adapter builds from
#[derive(Debug, Clone, PartialEq)]
pub struct TradeParams {
    pub input: AssetAmount,
    pub output_asset: AssetId,
    pub expected_output: Decimal,
    /// Fee payer and first required signer
    pub owner: Address,
    /// Additional required signers, in signing order
    pub co_signers: Vec<Address>,
    /// Accepted shortfall versus expected output, in basis points
    pub slippage_bps: Decimal,
}

impl TradeParams {
    pub fn from_intent(intent: &TradeIntent, co_signers: Vec<Address>, slippage_bps: Decimal) -> Self {
        Self {
            input: intent.input.clone(),
            output_asset: intent.output_asset.clone(),
            expected_output: intent.expected_output,
            owner: intent.owner,
            co_signers,
            slippage_bps,
        }
    }

    /// Lowest acceptable output after slippage tolerance
    pub fn min_output(&self) -> Decimal {
        let tolerance = self.slippage_bps.max(Decimal::ZERO) / Decimal::from(BPS);
        // Overflow only happens for tolerances above 100%, which clamp to zero anyway
        self.expected_output
            .checked_mul(Decimal::ONE - tolerance)
            .unwrap_or(Decimal::ZERO)
            .max(Decimal::ZERO)
    }

    pub fn required_signers(&self) -> Vec<Address> {
        let mut signers = Vec::with_capacity(1 + self.co_signers.len());
        signers.push(self.owner);
        signers.extend(self.co_signers.iter().copied());
        signers
    }

    pub(crate) fn validate(&self) -> Result<(), VenueError> {
        if self.input.amount <= Decimal::ZERO {
            return Err(VenueError::InvalidParams("input amount must be positive".into()));
        }
        if self.expected_output <= Decimal::ZERO {
            return Err(VenueError::InvalidParams("expected output must be positive".into()));
        }
        if self.input.asset == self.output_asset {
            return Err(VenueError::InvalidParams(format!(
                "input and output asset are both {}",
                self.output_asset
            )));
        }
        Ok(())
    }
}

/// Venue-specific liquidity state
#[derive(Debug, Clone, PartialEq)]
pub enum PoolState {
    ConstantProduct {
        reserve_in: Decimal,
        reserve_out: Decimal,
        fee_bps: u32,
    },
    OrderBook {
        /// Best ask first
        asks: Vec<BookLevel>,
    },
}

impl PoolState {
    pub fn kind_name(&self) -> &'static str {
        match self {
            PoolState::ConstantProduct { .. } => VenueKind::ConstantProduct.as_str(),
            PoolState::OrderBook { .. } => VenueKind::OrderBook.as_str(),
        }
    }
}

/// Result of one liquidity read
#[derive(Debug, Clone, PartialEq)]
pub struct PoolSnapshot {
    pub pool_id: String,
    pub state: PoolState,
    /// Recent validity anchor observed with the read
    pub validity_anchor: String,
}

/// Read access to venue pool / order-book state
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LiquiditySource: Send + Sync {
    async fn pool_state(
        &self,
        venue_id: &str,
        kind: VenueKind,
        params: &TradeParams,
    ) -> Result<PoolSnapshot, CollaboratorError>;
}

/// Closed set of supported venue adapters
#[derive(Debug, Clone)]
pub enum VenueAdapter {
    ConstantProduct(ConstantProductAdapter),
    OrderBook(OrderBookAdapter),
}

impl VenueAdapter {
    pub fn kind(&self) -> VenueKind {
        match self {
            VenueAdapter::ConstantProduct(_) => VenueKind::ConstantProduct,
            VenueAdapter::OrderBook(_) => VenueKind::OrderBook,
        }
    }

    /// Build from a liquidity read; pure, so safe to repeat
    pub fn build(
        &self,
        venue_id: &str,
        snapshot: &PoolSnapshot,
        params: &TradeParams,
    ) -> Result<UnsignedTransaction, VenueError> {
        params.validate()?;
        match self {
            VenueAdapter::ConstantProduct(adapter) => adapter.build(venue_id, snapshot, params),
            VenueAdapter::OrderBook(adapter) => adapter.build(venue_id, snapshot, params),
        }
    }
}

impl From<ConstantProductAdapter> for VenueAdapter {
    fn from(adapter: ConstantProductAdapter) -> Self {
        VenueAdapter::ConstantProduct(adapter)
    }
}

impl From<OrderBookAdapter> for VenueAdapter {
    fn from(adapter: OrderBookAdapter) -> Self {
        VenueAdapter::OrderBook(adapter)
    }
}

impl From<VenueKind> for VenueAdapter {
    fn from(kind: VenueKind) -> Self {
        match kind {
            VenueKind::ConstantProduct => VenueAdapter::ConstantProduct(ConstantProductAdapter::default()),
            VenueKind::OrderBook => VenueAdapter::OrderBook(OrderBookAdapter::default()),
        }
    }
}

fn check_min_output(quoted: Decimal, params: &TradeParams) -> Result<Decimal, VenueError> {
    let minimum = params.min_output();
    if quoted < minimum {
        return Err(VenueError::SlippageExceeded { quoted, minimum });
    }
    Ok(minimum)
}
