use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

use super::{LiquiditySource, TradeParams, VenueAdapter};
use crate::domain::UnsignedTransaction;
use crate::error::{CollaboratorError, VenueError};

/// Maps venue identifiers to adapters and runs the liquidity read
pub struct VenueRegistry {
    adapters: HashMap<String, VenueAdapter>,
    liquidity: Arc<dyn LiquiditySource>,
    query_timeout: Duration,
}

impl VenueRegistry {
    pub fn new(liquidity: Arc<dyn LiquiditySource>, query_timeout: Duration) -> Self {
        Self {
            adapters: HashMap::new(),
            liquidity,
            query_timeout,
        }
    }

    /// Register (or replace) the adapter for a venue id
    pub fn register(&mut self, venue_id: impl Into<String>, adapter: impl Into<VenueAdapter>) {
        let venue_id = venue_id.into();
        let adapter = adapter.into();
        debug!(venue = %venue_id, kind = %adapter.kind(), "Registered venue adapter");
        self.adapters.insert(venue_id, adapter);
    }

    pub fn with_venue(mut self, venue_id: impl Into<String>, adapter: impl Into<VenueAdapter>) -> Self {
        self.register(venue_id, adapter);
        self
    }

    pub fn contains(&self, venue_id: &str) -> bool {
        self.adapters.contains_key(venue_id)
    }

    pub fn venues(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Build an unsigned transaction for `venue_id`.
    ///
    /// Unknown venues fail before any liquidity query is made.
    pub async fn build(
        &self,
        venue_id: &str,
        params: &TradeParams,
    ) -> Result<UnsignedTransaction, VenueError> {
        let adapter = self
            .adapters
            .get(venue_id)
            .ok_or_else(|| VenueError::UnsupportedVenue(venue_id.to_string()))?;

        let start = Instant::now();
        let snapshot = match timeout(
            self.query_timeout,
            self.liquidity.pool_state(venue_id, adapter.kind(), params),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                let elapsed_ms = start.elapsed().as_millis() as u64;
                warn!(venue = venue_id, elapsed_ms, "Liquidity query timed out");
                return Err(CollaboratorError::timeout("liquidity", elapsed_ms).into());
            }
        };

        let tx = adapter.build(venue_id, &snapshot, params)?;
        debug!(
            venue = venue_id,
            instructions = tx.instructions.len(),
            quoted = %tx.quote.quoted_output,
            anchor = %tx.validity_anchor,
            "Built unsigned transaction"
        );
        Ok(tx)
    }
}
