use rust_decimal::Decimal;

use super::{check_min_output, BookLevel, PoolSnapshot, PoolState, TradeParams};
use crate::domain::{Instruction, Quote, UnsignedTransaction};
use crate::error::VenueError;

/// Central-limit order book adapter: IOC buy against asks, then settle
#[derive(Debug, Clone)]
pub struct OrderBookAdapter {
    pub program: String,
}

impl Default for OrderBookAdapter {
    fn default() -> Self {
        Self {
            program: "clob".to_string(),
        }
    }
}

/// Result of sweeping the book with a fixed input budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sweep {
    pub filled_output: Decimal,
    pub spent_input: Decimal,
    pub worst_price: Decimal,
}

impl OrderBookAdapter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Walk asks best-first spending at most `budget` input.
    ///
    /// `Ok(None)` when nothing fills; an error when the budget or a level
    /// pushes the arithmetic out of `Decimal` range.
    pub fn sweep(asks: &[BookLevel], budget: Decimal) -> Result<Option<Sweep>, VenueError> {
        let overflow =
            || VenueError::InvalidParams(format!("sweep of {budget} overflows book arithmetic"));
        let mut remaining = budget;
        let mut filled = Decimal::ZERO;
        let mut worst = Decimal::ZERO;

        for level in asks {
            if remaining <= Decimal::ZERO {
                break;
            }
            if level.price <= Decimal::ZERO || level.size <= Decimal::ZERO {
                continue;
            }
            // A level too large to price cannot be fully bought with any budget
            let take = match level.price.checked_mul(level.size) {
                Some(cost) if cost <= remaining => level.size,
                _ => remaining.checked_div(level.price).ok_or_else(overflow)?,
            };
            filled = filled.checked_add(take).ok_or_else(overflow)?;
            let spent = take.checked_mul(level.price).ok_or_else(overflow)?;
            remaining = remaining.checked_sub(spent).ok_or_else(overflow)?;
            worst = level.price;
        }

        if filled.is_zero() {
            return Ok(None);
        }

        Ok(Some(Sweep {
            filled_output: filled,
            spent_input: budget - remaining.max(Decimal::ZERO),
            worst_price: worst,
        }))
    }

    pub(crate) fn build(
        &self,
        venue_id: &str,
        snapshot: &PoolSnapshot,
        params: &TradeParams,
    ) -> Result<UnsignedTransaction, VenueError> {
        let asks = match &snapshot.state {
            PoolState::OrderBook { asks } => asks,
            other => {
                return Err(VenueError::UnexpectedState {
                    venue: venue_id.to_string(),
                    expected: "order_book",
                    found: other.kind_name(),
                })
            }
        };

        let sweep = Self::sweep(asks, params.input.amount)?.ok_or_else(|| {
            VenueError::InsufficientLiquidity {
                venue: venue_id.to_string(),
                reason: "no asks".to_string(),
            }
        })?;
        if sweep.spent_input < params.input.amount {
            return Err(VenueError::InsufficientLiquidity {
                venue: venue_id.to_string(),
                reason: format!(
                    "book absorbs {} of {} {}",
                    sweep.spent_input, params.input.amount, params.input.asset
                ),
            });
        }

        let quoted = sweep.filled_output.round_dp(12);
        let min_output = check_min_output(quoted, params)?;

        let place = Instruction::new(&self.program, "place_order")
            .param("market", &snapshot.pool_id)
            .param("side", "buy")
            .param("time_in_force", "IOC")
            .param("limit_price", sweep.worst_price)
            .param("max_input", params.input.amount)
            .param("min_fill", min_output);
        let settle = Instruction::new(&self.program, "settle")
            .param("market", &snapshot.pool_id)
            .param("owner", format!("{:?}", params.owner));

        Ok(UnsignedTransaction {
            venue: venue_id.to_string(),
            instructions: vec![place, settle],
            fee_payer: params.owner,
            validity_anchor: snapshot.validity_anchor.clone(),
            required_signers: params.required_signers(),
            quote: Quote {
                quoted_output: quoted,
                min_output,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn level(price: Decimal, size: Decimal) -> BookLevel {
        BookLevel { price, size }
    }

    #[test]
    fn sweep_spans_levels() {
        let asks = vec![level(dec!(1.0), dec!(50)), level(dec!(1.1), dec!(100))];
        let sweep = OrderBookAdapter::sweep(&asks, dec!(105)).unwrap().unwrap();

        // 50 @ 1.0, then 55 / 1.1 = 50 @ 1.1
        assert_eq!(sweep.filled_output, dec!(100));
        assert_eq!(sweep.spent_input, dec!(105));
        assert_eq!(sweep.worst_price, dec!(1.1));
    }

    #[test]
    fn thin_book_is_insufficient() {
        let asks = vec![level(dec!(1.0), dec!(10))];
        let sweep = OrderBookAdapter::sweep(&asks, dec!(100)).unwrap().unwrap();
        assert_eq!(sweep.spent_input, dec!(10));
    }

    #[test]
    fn empty_book_yields_nothing() {
        assert!(OrderBookAdapter::sweep(&[], dec!(1)).unwrap().is_none());
    }

    #[test]
    fn sweep_overflow_is_an_error() {
        let tiny = dec!(0.0000000000000000000000000001);
        let huge = dec!(50000000000000000000000000000);
        let asks = vec![level(tiny, huge), level(tiny, huge)];

        let err = OrderBookAdapter::sweep(&asks, dec!(100)).unwrap_err();
        assert!(matches!(err, VenueError::InvalidParams(_)));
    }
}
