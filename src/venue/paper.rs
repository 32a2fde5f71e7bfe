use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use super::{LiquiditySource, PoolSnapshot, PoolState, TradeParams, VenueKind};
use crate::config::PaperVenueConfig;
use crate::error::CollaboratorError;

/// In-memory liquidity for paper trading and tests.
///
/// Each read advances a fake slot so consecutive builds see fresh anchors.
#[derive(Debug, Default)]
pub struct StaticLiquidity {
    pools: RwLock<HashMap<String, PoolState>>,
    slot: AtomicU64,
    reads: AtomicU64,
}

impl StaticLiquidity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(venues: &[PaperVenueConfig]) -> Self {
        let liquidity = Self::new();
        for venue in venues {
            let state = match venue.kind {
                VenueKind::ConstantProduct => PoolState::ConstantProduct {
                    reserve_in: venue.reserve_in,
                    reserve_out: venue.reserve_out,
                    fee_bps: venue.fee_bps,
                },
                VenueKind::OrderBook => PoolState::OrderBook {
                    asks: venue.asks.clone(),
                },
            };
            liquidity.set_pool(&venue.id, state);
        }
        liquidity
    }

    pub fn set_pool(&self, venue_id: &str, state: PoolState) {
        if let Ok(mut pools) = self.pools.write() {
            pools.insert(venue_id.to_string(), state);
        }
    }

    /// Number of reads served so far
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LiquiditySource for StaticLiquidity {
    async fn pool_state(
        &self,
        venue_id: &str,
        _kind: VenueKind,
        params: &TradeParams,
    ) -> Result<PoolSnapshot, CollaboratorError> {
        self.reads.fetch_add(1, Ordering::SeqCst);

        let state = self
            .pools
            .read()
            .map_err(|_| CollaboratorError::unavailable("liquidity", "pool table poisoned"))?
            .get(venue_id)
            .cloned()
            .ok_or_else(|| {
                CollaboratorError::unavailable("liquidity", format!("no pool for {venue_id}"))
            })?;

        let slot = self.slot.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PoolSnapshot {
            pool_id: format!(
                "{}:{}-{}",
                venue_id, params.input.asset, params.output_asset
            ),
            state,
            validity_anchor: format!("paper-slot-{slot}"),
        })
    }
}
