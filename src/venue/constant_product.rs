use rust_decimal::Decimal;

use super::{check_min_output, PoolSnapshot, PoolState, TradeParams, BPS};
use crate::domain::{Instruction, Quote, UnsignedTransaction};
use crate::error::VenueError;

/// x*y=k pool adapter; emits a single swap instruction
#[derive(Debug, Clone)]
pub struct ConstantProductAdapter {
    pub program: String,
}

impl Default for ConstantProductAdapter {
    fn default() -> Self {
        Self {
            program: "cpmm".to_string(),
        }
    }
}

impl ConstantProductAdapter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Output for `amount_in` against the given reserves, after fee;
    /// `None` when the product leaves `Decimal` range
    pub fn quote_output(
        amount_in: Decimal,
        reserve_in: Decimal,
        reserve_out: Decimal,
        fee_bps: u32,
    ) -> Option<Decimal> {
        let fee_factor = Decimal::from(BPS.saturating_sub(fee_bps)) / Decimal::from(BPS);
        let effective_in = amount_in.checked_mul(fee_factor)?;
        reserve_out
            .checked_mul(effective_in)?
            .checked_div(reserve_in.checked_add(effective_in)?)
    }

    pub(crate) fn build(
        &self,
        venue_id: &str,
        snapshot: &PoolSnapshot,
        params: &TradeParams,
    ) -> Result<UnsignedTransaction, VenueError> {
        let (reserve_in, reserve_out, fee_bps) = match &snapshot.state {
            PoolState::ConstantProduct {
                reserve_in,
                reserve_out,
                fee_bps,
            } => (*reserve_in, *reserve_out, *fee_bps),
            other => {
                return Err(VenueError::UnexpectedState {
                    venue: venue_id.to_string(),
                    expected: "constant_product",
                    found: other.kind_name(),
                })
            }
        };

        if reserve_in <= Decimal::ZERO || reserve_out <= Decimal::ZERO {
            return Err(VenueError::InsufficientLiquidity {
                venue: venue_id.to_string(),
                reason: format!("empty pool {}", snapshot.pool_id),
            });
        }

        let quoted = Self::quote_output(params.input.amount, reserve_in, reserve_out, fee_bps)
            .ok_or_else(|| {
                VenueError::InvalidParams(format!(
                    "input {} {} overflows quote arithmetic on {}",
                    params.input.amount, params.input.asset, snapshot.pool_id
                ))
            })?
            .round_dp(12);
        let min_output = check_min_output(quoted, params)?;

        let swap = Instruction::new(&self.program, "swap")
            .param("pool", &snapshot.pool_id)
            .param("input_asset", &params.input.asset)
            .param("output_asset", &params.output_asset)
            .param("amount_in", params.input.amount)
            .param("min_amount_out", min_output);

        Ok(UnsignedTransaction {
            venue: venue_id.to_string(),
            instructions: vec![swap],
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
    use crate::domain::AssetAmount;
    use ethers::types::Address;
    use rust_decimal_macros::dec;

    fn params(slippage_bps: Decimal) -> TradeParams {
        TradeParams {
            input: AssetAmount::new("A", dec!(100)),
            output_asset: "B".into(),
            expected_output: dec!(95),
            owner: Address::repeat_byte(1),
            co_signers: vec![Address::repeat_byte(2)],
            slippage_bps,
        }
    }

    fn snapshot(reserve_in: Decimal, reserve_out: Decimal) -> PoolSnapshot {
        PoolSnapshot {
            pool_id: "pool-ab".into(),
            state: PoolState::ConstantProduct {
                reserve_in,
                reserve_out,
                fee_bps: 30,
            },
            validity_anchor: "anchor-7".into(),
        }
    }

    #[test]
    fn deep_pool_builds_single_swap() {
        let tx = ConstantProductAdapter::default()
            .build("V1", &snapshot(dec!(1000000), dec!(1000000)), &params(dec!(50)))
            .unwrap();

        assert_eq!(tx.instructions.len(), 1);
        assert_eq!(tx.instructions[0].action, "swap");
        assert_eq!(tx.validity_anchor, "anchor-7");
        assert_eq!(tx.fee_payer, Address::repeat_byte(1));
        assert!(tx.quote.quoted_output > dec!(99));
    }

    #[test]
    fn shallow_pool_exceeds_slippage() {
        // 100 in against 1000/1000 yields ~90.7 out, below 95 * 0.995
        let err = ConstantProductAdapter::default()
            .build("V1", &snapshot(dec!(1000), dec!(1000)), &params(dec!(50)))
            .unwrap_err();
        assert!(matches!(err, VenueError::SlippageExceeded { .. }));
    }

    #[test]
    fn wrong_state_kind_is_rejected() {
        let snap = PoolSnapshot {
            pool_id: "book".into(),
            state: PoolState::OrderBook { asks: vec![] },
            validity_anchor: "a".into(),
        };
        let err = ConstantProductAdapter::default()
            .build("V1", &snap, &params(dec!(50)))
            .unwrap_err();
        assert!(matches!(err, VenueError::UnexpectedState { .. }));
    }

    #[test]
    fn oversized_input_is_rejected_not_panicking() {
        let mut p = params(dec!(50));
        p.input.amount = dec!(100000000000000000000000);
        p.expected_output = dec!(1000000);

        assert_eq!(
            ConstantProductAdapter::quote_output(p.input.amount, dec!(1000000), dec!(1000000), 30),
            None
        );
        let err = ConstantProductAdapter::default()
            .build("V1", &snapshot(dec!(1000000), dec!(1000000)), &p)
            .unwrap_err();
        assert!(matches!(err, VenueError::InvalidParams(_)), "{err:?}");
    }
}
