//! Immutable output of a stress run.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::capital::CapitalState;
use crate::roller::SegmentPath;
use crate::types::{Money, Quarter, Rate};

/// Minimum CET1 ratio over the horizon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trough {
    pub cet1_ratio: Rate,
    pub quarter: Quarter,
}

/// Horizon totals for one segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentLossSummary {
    pub segment_id: String,
    pub jump_off_balance: Money,
    pub ending_balance: Money,
    pub cumulative_defaults: Money,
    pub cumulative_net_charge_offs: Money,
    /// Cumulative NCO over the jump-off balance; zero for an empty segment
    pub cumulative_loss_rate: Rate,
    pub peak_conditional_pd: Rate,
}

impl SegmentLossSummary {
    pub fn from_path(path: &SegmentPath) -> Self {
        let cumulative_defaults = path.quarters.iter().map(|q| q.defaulted_balance).sum();
        let cumulative_net_charge_offs = path.cumulative_net_charge_offs();
        let cumulative_loss_rate = if path.jump_off_balance > Decimal::ZERO {
            cumulative_net_charge_offs / path.jump_off_balance
        } else {
            Decimal::ZERO
        };
        let peak_conditional_pd = path
            .quarters
            .iter()
            .map(|q| q.conditional_pd)
            .max()
            .unwrap_or(Decimal::ZERO);

        SegmentLossSummary {
            segment_id: path.segment_id.clone(),
            jump_off_balance: path.jump_off_balance,
            ending_balance: path.current_balance(),
            cumulative_defaults,
            cumulative_net_charge_offs,
            cumulative_loss_rate,
            peak_conditional_pd,
        }
    }
}

/// Projection paths plus derived summaries. Partial when a run fails or is
/// aborted: only completed quarters appear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressResults {
    pub scenario: String,
    pub jump_off_date: NaiveDate,
    pub segment_paths: Vec<SegmentPath>,
    pub capital_path: Vec<CapitalState>,
    pub trough: Option<Trough>,
    pub loss_summaries: Vec<SegmentLossSummary>,
    /// Quarters whose CET1 ratio fell below the configured minimum
    pub breach_quarters: Vec<Quarter>,
}

impl StressResults {
    pub fn build(
        scenario: &str,
        jump_off_date: NaiveDate,
        segment_paths: Vec<SegmentPath>,
        capital_path: Vec<CapitalState>,
        minimum_cet1_ratio: Rate,
    ) -> Self {
        let trough = find_trough(&capital_path);
        let loss_summaries = segment_paths.iter().map(SegmentLossSummary::from_path).collect();
        let breach_quarters = capital_path
            .iter()
            .filter(|c| c.breaches(minimum_cet1_ratio))
            .map(|c| c.quarter)
            .collect();

        StressResults {
            scenario: scenario.to_string(),
            jump_off_date,
            segment_paths,
            capital_path,
            trough,
            loss_summaries,
            breach_quarters,
        }
    }

    pub fn completed_quarters(&self) -> Quarter {
        self.capital_path.last().map(|c| c.quarter).unwrap_or(0)
    }

    pub fn segment_path(&self, id: &str) -> Option<&SegmentPath> {
        self.segment_paths.iter().find(|p| p.segment_id == id)
    }

    pub fn capital(&self, quarter: Quarter) -> Option<&CapitalState> {
        self.capital_path.iter().find(|c| c.quarter == quarter)
    }

    pub fn total_net_charge_offs(&self) -> Money {
        self.capital_path.iter().map(|c| c.provisions).sum()
    }
}

/// Minimum ratio; the earliest quarter wins a tie.
pub fn find_trough(capital_path: &[CapitalState]) -> Option<Trough> {
    let mut trough: Option<Trough> = None;
    for c in capital_path {
        match trough {
            Some(t) if c.cet1_ratio >= t.cet1_ratio => {}
            _ => {
                trough = Some(Trough {
                    cet1_ratio: c.cet1_ratio,
                    quarter: c.quarter,
                })
            }
        }
    }
    trough
}
