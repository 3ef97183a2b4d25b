//! Structured run configuration.
//!
//! Everything the engine needs beyond the scenario and the portfolio is
//! passed explicitly here: satellite coefficients, loss models, risk
//! weights, tax rate and the capital distribution plan. Nothing is read from
//! globals, so independent runs never interfere.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::CapitalStressError;
use crate::loss::{EadModel, LgdModel, LossParameterEstimator};
use crate::portfolio::PortfolioSnapshot;
use crate::satellite::SatelliteSpec;
use crate::types::{Money, Quarter, Rate, HORIZON_QUARTERS};
use crate::vasicek::VasicekTransform;
use crate::CapitalStressResult;

/// Common Equity Tier 1 minimum under Basel III.
pub const DEFAULT_MINIMUM_CET1_RATIO: Rate = dec!(0.045);

/// Calibrated models for one segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentModelConfig {
    /// Maps each macro quarter to the segment's systematic index
    pub satellite: SatelliteSpec,
    /// Standardized-approach risk weight applied to EAD (e.g. 1.0 = 100%)
    pub risk_weight: Rate,
    #[serde(default)]
    pub lgd_model: LgdModel,
    #[serde(default)]
    pub ead_model: EadModel,
}

impl SegmentModelConfig {
    pub fn new(satellite: SatelliteSpec, risk_weight: Rate) -> Self {
        SegmentModelConfig {
            satellite,
            risk_weight,
            lgd_model: LgdModel::default(),
            ead_model: EadModel::default(),
        }
    }
}

/// Configuration for one stress run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressConfig {
    /// CET1 capital at the jump-off date
    pub starting_cet1: Money,
    /// Flat tax rate on positive pre-tax income
    pub tax_rate: Rate,
    /// Planned distributions per quarter (index 0 = quarter 1); missing
    /// quarters distribute nothing
    #[serde(default)]
    pub distributions: Vec<Money>,
    #[serde(default = "default_minimum_ratio")]
    pub minimum_cet1_ratio: Rate,
    #[serde(default)]
    pub vasicek: VasicekTransform,
    /// Keyed by segment id
    pub segment_models: BTreeMap<String, SegmentModelConfig>,
}

fn default_minimum_ratio() -> Rate {
    DEFAULT_MINIMUM_CET1_RATIO
}

impl StressConfig {
    pub fn new(starting_cet1: Money, tax_rate: Rate) -> Self {
        StressConfig {
            starting_cet1,
            tax_rate,
            distributions: Vec::new(),
            minimum_cet1_ratio: DEFAULT_MINIMUM_CET1_RATIO,
            vasicek: VasicekTransform::default(),
            segment_models: BTreeMap::new(),
        }
    }

    pub fn with_segment(mut self, id: impl Into<String>, model: SegmentModelConfig) -> Self {
        self.segment_models.insert(id.into(), model);
        self
    }

    pub fn with_distributions(mut self, distributions: Vec<Money>) -> Self {
        self.distributions = distributions;
        self
    }

    /// Distribution planned for a 1-based quarter.
    pub fn distribution(&self, quarter: Quarter) -> Money {
        self.distributions
            .get((quarter as usize).saturating_sub(1))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn segment_model(&self, id: &str) -> CapitalStressResult<&SegmentModelConfig> {
        self.segment_models.get(id).ok_or_else(|| {
            CapitalStressError::configuration(
                format!("segment_models.{}", id),
                "no model configuration for segment",
            )
        })
    }

    /// Validate capital inputs and check that every segment in `portfolio`
    /// has a well-formed model configuration.
    pub fn validate(&self, portfolio: &PortfolioSnapshot) -> CapitalStressResult<Vec<String>> {
        let mut warnings = Vec::new();

        if self.tax_rate < Decimal::ZERO || self.tax_rate >= Decimal::ONE {
            return Err(CapitalStressError::configuration("tax_rate", "must be in [0, 1)"));
        }
        if self.minimum_cet1_ratio < Decimal::ZERO || self.minimum_cet1_ratio >= Decimal::ONE {
            return Err(CapitalStressError::configuration(
                "minimum_cet1_ratio",
                "must be in [0, 1)",
            ));
        }
        if self.starting_cet1 <= Decimal::ZERO {
            warnings.push(format!(
                "Starting CET1 is non-positive ({}); every ratio will be at or below zero",
                self.starting_cet1
            ));
        }
        if self.distributions.len() > HORIZON_QUARTERS as usize {
            return Err(CapitalStressError::configuration(
                "distributions",
                format!(
                    "at most {} quarterly distributions, got {}",
                    HORIZON_QUARTERS,
                    self.distributions.len()
                ),
            ));
        }
        for (i, d) in self.distributions.iter().enumerate() {
            if *d < Decimal::ZERO {
                return Err(CapitalStressError::configuration(
                    format!("distributions[{}]", i),
                    "distributions must be non-negative",
                ));
            }
        }
        self.vasicek.validate()?;

        let estimator = LossParameterEstimator;
        for segment in &portfolio.segments {
            let model = self.segment_model(&segment.id)?;
            if model.risk_weight < Decimal::ZERO {
                return Err(CapitalStressError::configuration(
                    format!("segment_models.{}.risk_weight", segment.id),
                    "must be non-negative",
                ));
            }
            if model.risk_weight > dec!(12.5) {
                warnings.push(format!(
                    "Segment '{}' risk weight {} exceeds 1250%",
                    segment.id, model.risk_weight
                ));
            }
            estimator.validate(segment, &model.lgd_model, &model.ead_model)?;
        }

        for id in self.segment_models.keys() {
            if portfolio.segment(id).is_none() {
                warnings.push(format!(
                    "Model configuration for '{}' has no matching segment and is ignored",
                    id
                ));
            }
        }

        Ok(warnings)
    }
}
