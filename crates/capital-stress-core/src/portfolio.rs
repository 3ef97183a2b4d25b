//! Jump-off portfolio: homogeneous loan segments and their static attributes.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::CapitalStressError;
use crate::types::{Money, Rate};
use crate::CapitalStressResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A homogeneous pool of exposures (product / vintage / risk grade).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: String,
    /// Drawn balance at jump-off
    pub starting_balance: Money,
    /// Through-the-cycle quarterly probability of default, in (0, 1)
    pub pd_ttc: Rate,
    /// Vasicek asset correlation, in (0, 1)
    pub asset_correlation: Rate,
    /// Baseline loss given default, in [0, 1]
    pub lgd_baseline: Rate,
    /// Annualized effective interest yield on the drawn balance
    pub interest_yield: Rate,
    /// Annualized funding cost netted against the yield
    #[serde(default)]
    pub funding_cost_rate: Rate,
    /// Scheduled principal amortization per quarter, in [0, 1)
    #[serde(default)]
    pub amortization_rate: Rate,
    /// Prepayment / payoff attrition per quarter, in [0, 1)
    #[serde(default)]
    pub attrition_rate: Rate,
}

/// Segment-level exposures as of the jump-off date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub jump_off_date: NaiveDate,
    pub segments: Vec<Segment>,
}

impl PortfolioSnapshot {
    pub fn total_balance(&self) -> Money {
        self.segments.iter().map(|s| s.starting_balance).sum()
    }

    pub fn segment(&self, id: &str) -> Option<&Segment> {
        self.segments.iter().find(|s| s.id == id)
    }

    /// Checks every static attribute before a run is allowed to start.
    pub fn validate(&self) -> CapitalStressResult<()> {
        if self.segments.is_empty() {
            return Err(CapitalStressError::configuration(
                "portfolio.segments",
                "at least one segment is required",
            ));
        }

        let mut seen = BTreeSet::new();
        for (i, seg) in self.segments.iter().enumerate() {
            if seg.id.trim().is_empty() {
                return Err(CapitalStressError::configuration(
                    format!("portfolio.segments[{}].id", i),
                    "segment id must not be empty",
                ));
            }
            if !seen.insert(seg.id.as_str()) {
                return Err(CapitalStressError::configuration(
                    format!("portfolio.segments[{}].id", i),
                    format!("duplicate segment id '{}'", seg.id),
                ));
            }
            seg.validate()?;
        }
        Ok(())
    }
}

impl Segment {
    pub fn validate(&self) -> CapitalStressResult<()> {
        let field = |name: &str| format!("segment '{}'.{}", self.id, name);

        if self.starting_balance < Decimal::ZERO {
            return Err(CapitalStressError::configuration(
                field("starting_balance"),
                "must be non-negative",
            ));
        }
        if self.pd_ttc <= Decimal::ZERO || self.pd_ttc >= Decimal::ONE {
            return Err(CapitalStressError::configuration(
                field("pd_ttc"),
                "must be strictly inside (0, 1)",
            ));
        }
        if self.asset_correlation <= Decimal::ZERO || self.asset_correlation >= Decimal::ONE {
            return Err(CapitalStressError::configuration(
                field("asset_correlation"),
                "must be strictly inside (0, 1)",
            ));
        }
        if self.lgd_baseline < Decimal::ZERO || self.lgd_baseline > Decimal::ONE {
            return Err(CapitalStressError::configuration(
                field("lgd_baseline"),
                "must be in [0, 1]",
            ));
        }
        if self.funding_cost_rate < Decimal::ZERO {
            return Err(CapitalStressError::configuration(
                field("funding_cost_rate"),
                "must be non-negative",
            ));
        }
        for (name, rate) in [
            ("amortization_rate", self.amortization_rate),
            ("attrition_rate", self.attrition_rate),
        ] {
            if rate < Decimal::ZERO || rate >= Decimal::ONE {
                return Err(CapitalStressError::configuration(field(name), "must be in [0, 1)"));
            }
        }
        Ok(())
    }
}
