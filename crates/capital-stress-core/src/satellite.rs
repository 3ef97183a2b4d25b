//! Satellite models: macro quarter -> systematic risk index.
//!
//! Coefficients are supplied as configuration and never estimated here.
//! Larger index values denote more adverse conditions.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::CapitalStressError;
use crate::math;
use crate::scenario::{MacroQuarter, MacroVariable};
use crate::CapitalStressResult;

/// Capability shared by every satellite variant.
pub trait SatelliteModel {
    /// Systematic index for one macro quarter. Pure: identical inputs give
    /// identical outputs.
    fn evaluate(&self, quarter: &MacroQuarter) -> CapitalStressResult<Decimal>;

    /// Variables `evaluate` will read.
    fn drivers(&self) -> Vec<MacroVariable>;
}

// ---------------------------------------------------------------------------
// Variants
// ---------------------------------------------------------------------------

/// Z = intercept + sum(beta_v * x_v)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LinearSatellite {
    pub intercept: Decimal,
    #[serde(default)]
    pub coefficients: BTreeMap<MacroVariable, Decimal>,
}

impl LinearSatellite {
    pub fn new(intercept: Decimal) -> Self {
        LinearSatellite {
            intercept,
            coefficients: BTreeMap::new(),
        }
    }

    pub fn with(mut self, variable: MacroVariable, beta: Decimal) -> Self {
        self.coefficients.insert(variable, beta);
        self
    }
}

impl SatelliteModel for LinearSatellite {
    fn evaluate(&self, quarter: &MacroQuarter) -> CapitalStressResult<Decimal> {
        let mut z = self.intercept;
        for (variable, beta) in &self.coefficients {
            z = accumulate(z, *beta, quarter.value(*variable)?, quarter, *variable)?;
        }
        Ok(z)
    }

    fn drivers(&self) -> Vec<MacroVariable> {
        self.coefficients.keys().copied().collect()
    }
}

/// Z = intercept + sum(beta_v * ln(x_v)), for strictly positive level drivers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LogLinearSatellite {
    pub intercept: Decimal,
    #[serde(default)]
    pub coefficients: BTreeMap<MacroVariable, Decimal>,
}

impl LogLinearSatellite {
    pub fn new(intercept: Decimal) -> Self {
        LogLinearSatellite {
            intercept,
            coefficients: BTreeMap::new(),
        }
    }

    pub fn with(mut self, variable: MacroVariable, beta: Decimal) -> Self {
        self.coefficients.insert(variable, beta);
        self
    }
}

impl SatelliteModel for LogLinearSatellite {
    fn evaluate(&self, quarter: &MacroQuarter) -> CapitalStressResult<Decimal> {
        let mut z = self.intercept;
        for (variable, beta) in &self.coefficients {
            let x = quarter.value(*variable)?;
            let log_x = math::ln(x).ok_or_else(|| {
                CapitalStressError::configuration(
                    format!("scenario.quarters[{}].{}", quarter.quarter, variable.name()),
                    format!("log-linear driver must be positive, got {}", x),
                )
            })?;
            z = accumulate(z, *beta, log_x, quarter, *variable)?;
        }
        Ok(z)
    }

    fn drivers(&self) -> Vec<MacroVariable> {
        self.coefficients.keys().copied().collect()
    }
}

/// z + beta * x, failing instead of overflowing. The segment is filled in
/// by the caller.
fn accumulate(
    z: Decimal,
    beta: Decimal,
    x: Decimal,
    quarter: &MacroQuarter,
    variable: MacroVariable,
) -> CapitalStressResult<Decimal> {
    beta.checked_mul(x)
        .and_then(|term| z.checked_add(term))
        .ok_or_else(|| {
            CapitalStressError::computation(
                quarter.quarter,
                "",
                "systematic_index",
                format!("{} term overflows", variable.name()),
            )
        })
}

// ---------------------------------------------------------------------------
// Configuration form
// ---------------------------------------------------------------------------

/// Serializable choice of satellite variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "form", rename_all = "snake_case")]
pub enum SatelliteSpec {
    Linear(LinearSatellite),
    LogLinear(LogLinearSatellite),
}

impl SatelliteSpec {
    /// A satellite that ignores the scenario and always returns `index`.
    pub fn constant(index: Decimal) -> Self {
        SatelliteSpec::Linear(LinearSatellite::new(index))
    }
}

impl Default for SatelliteSpec {
    fn default() -> Self {
        SatelliteSpec::constant(Decimal::ZERO)
    }
}

impl SatelliteModel for SatelliteSpec {
    fn evaluate(&self, quarter: &MacroQuarter) -> CapitalStressResult<Decimal> {
        match self {
            SatelliteSpec::Linear(m) => m.evaluate(quarter),
            SatelliteSpec::LogLinear(m) => m.evaluate(quarter),
        }
    }

    fn drivers(&self) -> Vec<MacroVariable> {
        match self {
            SatelliteSpec::Linear(m) => m.drivers(),
            SatelliteSpec::LogLinear(m) => m.drivers(),
        }
    }
}

impl From<LinearSatellite> for SatelliteSpec {
    fn from(m: LinearSatellite) -> Self {
        SatelliteSpec::Linear(m)
    }
}

impl From<LogLinearSatellite> for SatelliteSpec {
    fn from(m: LogLinearSatellite) -> Self {
        SatelliteSpec::LogLinear(m)
    }
}
