//! Quarter-over-quarter balance roll-forward for a single segment.
//!
//! Order of operations is fixed: attrition and amortization run off the
//! beginning balance first, and default is assessed on the surviving
//! balance.
//!
//! 1. pre_default = beginning * (1 - attrition) * (1 - amortization)
//! 2. defaulted   = pre_default * PD_cond
//! 3. NCO         = defaulted * LGD
//! 4. ending      = pre_default - defaulted
//!
//! Defaulted exposure leaves the performing pool; cures and re-aging are not
//! modelled.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::CapitalStressError;
use crate::loss::LossParameters;
use crate::portfolio::Segment;
use crate::types::{Money, Quarter, Rate};
use crate::CapitalStressResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Immutable snapshot of one segment in one projection quarter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarterState {
    pub quarter: Quarter,
    pub segment_id: String,
    /// Satellite output driving the conditional PD
    pub systematic_index: Decimal,
    pub conditional_pd: Rate,
    pub lgd: Rate,
    pub ead: Money,
    pub beginning_balance: Money,
    /// Balance after attrition and amortization, before default
    pub pre_default_balance: Money,
    pub defaulted_balance: Money,
    pub net_charge_off: Money,
    pub ending_balance: Money,
    pub net_revenue: Money,
}

/// Chain of snapshots for one segment, quarter 1 first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentPath {
    pub segment_id: String,
    pub jump_off_balance: Money,
    pub quarters: Vec<QuarterState>,
}

impl SegmentPath {
    pub fn new(segment: &Segment) -> Self {
        SegmentPath {
            segment_id: segment.id.clone(),
            jump_off_balance: segment.starting_balance,
            quarters: Vec::new(),
        }
    }

    /// Balance the next quarter starts from.
    pub fn current_balance(&self) -> Money {
        self.quarters
            .last()
            .map(|q| q.ending_balance)
            .unwrap_or(self.jump_off_balance)
    }

    pub fn last_quarter(&self) -> Quarter {
        self.quarters.last().map(|q| q.quarter).unwrap_or(0)
    }

    pub fn get(&self, quarter: Quarter) -> Option<&QuarterState> {
        self.quarters.iter().find(|q| q.quarter == quarter)
    }

    /// Append the next snapshot. Quarters must be contiguous and each
    /// beginning balance must equal the previous ending balance.
    pub fn push(&mut self, state: QuarterState) -> CapitalStressResult<()> {
        self.check_next(&state)?;
        self.quarters.push(state);
        Ok(())
    }

    /// Check that `state` could be pushed, without changing the path.
    pub fn check_next(&self, state: &QuarterState) -> CapitalStressResult<()> {
        let expected = self.last_quarter() + 1;
        if state.quarter != expected {
            return Err(CapitalStressError::computation(
                state.quarter,
                &self.segment_id,
                "quarter",
                format!("expected quarter {}, chain is not contiguous", expected),
            ));
        }
        if state.beginning_balance != self.current_balance() {
            return Err(CapitalStressError::computation(
                state.quarter,
                &self.segment_id,
                "beginning_balance",
                format!(
                    "{} does not match prior ending balance {}",
                    state.beginning_balance,
                    self.current_balance()
                ),
            ));
        }
        Ok(())
    }

    pub fn cumulative_net_charge_offs(&self) -> Money {
        self.quarters.iter().map(|q| q.net_charge_off).sum()
    }
}

/// Per-quarter risk inputs for a segment, produced upstream of the roll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RollInputs {
    pub quarter: Quarter,
    pub systematic_index: Decimal,
    pub conditional_pd: Rate,
    pub loss: LossParameters,
}

// ---------------------------------------------------------------------------
// Roller
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct PortfolioRoller;

impl PortfolioRoller {
    /// Produce the next snapshot for `segment` from its beginning balance.
    pub fn roll(
        &self,
        segment: &Segment,
        beginning_balance: Money,
        inputs: &RollInputs,
    ) -> CapitalStressResult<QuarterState> {
        let q = inputs.quarter;
        let check_rate = |name: &str, rate: Rate| -> CapitalStressResult<()> {
            if rate < Decimal::ZERO || rate >= Decimal::ONE {
                return Err(CapitalStressError::computation(
                    q,
                    &segment.id,
                    name,
                    format!("{} is outside [0, 1)", rate),
                ));
            }
            Ok(())
        };
        check_rate("attrition_rate", segment.attrition_rate)?;
        check_rate("amortization_rate", segment.amortization_rate)?;
        check_rate("conditional_pd", inputs.conditional_pd)?;
        if inputs.loss.lgd < Decimal::ZERO || inputs.loss.lgd > Decimal::ONE {
            return Err(CapitalStressError::computation(
                q,
                &segment.id,
                "lgd",
                format!("{} is outside [0, 1]", inputs.loss.lgd),
            ));
        }
        if beginning_balance < Decimal::ZERO {
            return Err(CapitalStressError::computation(
                q,
                &segment.id,
                "beginning_balance",
                format!("{} is negative", beginning_balance),
            ));
        }

        let pre_default_balance = beginning_balance
            * (Decimal::ONE - segment.attrition_rate)
            * (Decimal::ONE - segment.amortization_rate);
        let defaulted_balance = pre_default_balance * inputs.conditional_pd;
        let net_charge_off = defaulted_balance * inputs.loss.lgd;
        let ending_balance = pre_default_balance - defaulted_balance;

        if ending_balance < Decimal::ZERO {
            return Err(CapitalStressError::computation(
                q,
                &segment.id,
                "ending_balance",
                format!("{} is negative", ending_balance),
            ));
        }

        let net_revenue =
            beginning_balance * (segment.interest_yield - segment.funding_cost_rate) / dec!(4);

        Ok(QuarterState {
            quarter: q,
            segment_id: segment.id.clone(),
            systematic_index: inputs.systematic_index,
            conditional_pd: inputs.conditional_pd,
            lgd: inputs.loss.lgd,
            ead: inputs.loss.ead,
            beginning_balance,
            pre_default_balance,
            defaulted_balance,
            net_charge_off,
            ending_balance,
            net_revenue,
        })
    }
}
