//! Quarterly macroeconomic scenario paths.
//!
//! A `ScenarioPath` is pure data: nine `MacroQuarter` records keyed by a
//! fixed vocabulary of `MacroVariable`s. Ingestion from supervisory files is
//! left to the caller; everything here works on fully materialized values.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::CapitalStressError;
use crate::types::{Quarter, HORIZON_QUARTERS};
use crate::CapitalStressResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Recognized macro variables. Rates and growth figures are decimals
/// (0.05 = 5%); index levels are raw levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MacroVariable {
    UnemploymentRate,
    RealGdpGrowth,
    NominalGdpGrowth,
    RealDisposableIncomeGrowth,
    CpiInflation,
    HousePriceIndex,
    HousePriceGrowth,
    CommercialRealEstatePriceGrowth,
    EquityIndexGrowth,
    Treasury3mRate,
    Treasury10yRate,
    BbbCorporateYield,
    MortgageRate,
    MarketVolatilityIndex,
}

impl MacroVariable {
    pub fn name(&self) -> &'static str {
        match self {
            MacroVariable::UnemploymentRate => "unemployment_rate",
            MacroVariable::RealGdpGrowth => "real_gdp_growth",
            MacroVariable::NominalGdpGrowth => "nominal_gdp_growth",
            MacroVariable::RealDisposableIncomeGrowth => "real_disposable_income_growth",
            MacroVariable::CpiInflation => "cpi_inflation",
            MacroVariable::HousePriceIndex => "house_price_index",
            MacroVariable::HousePriceGrowth => "house_price_growth",
            MacroVariable::CommercialRealEstatePriceGrowth => {
                "commercial_real_estate_price_growth"
            }
            MacroVariable::EquityIndexGrowth => "equity_index_growth",
            MacroVariable::Treasury3mRate => "treasury_3m_rate",
            MacroVariable::Treasury10yRate => "treasury_10y_rate",
            MacroVariable::BbbCorporateYield => "bbb_corporate_yield",
            MacroVariable::MortgageRate => "mortgage_rate",
            MacroVariable::MarketVolatilityIndex => "market_volatility_index",
        }
    }
}

/// Macro variable values for one projection quarter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroQuarter {
    /// 1-based quarter index within the horizon
    pub quarter: Quarter,
    pub variables: BTreeMap<MacroVariable, Decimal>,
}

impl MacroQuarter {
    pub fn new(quarter: Quarter) -> Self {
        MacroQuarter {
            quarter,
            variables: BTreeMap::new(),
        }
    }

    /// Builder-style insert, convenient for assembling paths in code.
    pub fn with(mut self, variable: MacroVariable, value: Decimal) -> Self {
        self.variables.insert(variable, value);
        self
    }

    /// Value of `variable`, or a configuration error naming the quarter.
    pub fn value(&self, variable: MacroVariable) -> CapitalStressResult<Decimal> {
        self.variables.get(&variable).copied().ok_or_else(|| {
            CapitalStressError::configuration(
                format!("scenario.quarters[{}].{}", self.quarter, variable.name()),
                "required macro variable is absent from the scenario quarter",
            )
        })
    }
}

/// The full supervisory horizon of macro quarters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioPath {
    pub name: String,
    pub quarters: Vec<MacroQuarter>,
}

impl ScenarioPath {
    /// Build a validated path: exactly nine quarters indexed 1..=9.
    pub fn new(name: impl Into<String>, quarters: Vec<MacroQuarter>) -> CapitalStressResult<Self> {
        let path = ScenarioPath {
            name: name.into(),
            quarters,
        };
        path.validate()?;
        Ok(path)
    }

    pub fn validate(&self) -> CapitalStressResult<()> {
        if self.quarters.len() != HORIZON_QUARTERS as usize {
            return Err(CapitalStressError::configuration(
                "scenario.quarters",
                format!(
                    "expected exactly {} quarters, got {}",
                    HORIZON_QUARTERS,
                    self.quarters.len()
                ),
            ));
        }
        for (i, q) in self.quarters.iter().enumerate() {
            let expected = (i + 1) as Quarter;
            if q.quarter != expected {
                return Err(CapitalStressError::configuration(
                    format!("scenario.quarters[{}].quarter", i),
                    format!(
                        "quarter indices must increase strictly from 1; expected {}, got {}",
                        expected, q.quarter
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Macro record for a 1-based quarter index.
    pub fn quarter(&self, quarter: Quarter) -> CapitalStressResult<&MacroQuarter> {
        self.quarters
            .iter()
            .find(|q| q.quarter == quarter)
            .ok_or_else(|| {
                CapitalStressError::configuration(
                    "scenario.quarters",
                    format!("no macro record for quarter {}", quarter),
                )
            })
    }

    /// Build a path from per-variable series, each of horizon length.
    pub fn from_series(
        name: impl Into<String>,
        series: &BTreeMap<MacroVariable, Vec<Decimal>>,
    ) -> CapitalStressResult<Self> {
        for (variable, values) in series {
            if values.len() != HORIZON_QUARTERS as usize {
                return Err(CapitalStressError::configuration(
                    format!("scenario.series.{}", variable.name()),
                    format!(
                        "expected {} quarterly values, got {}",
                        HORIZON_QUARTERS,
                        values.len()
                    ),
                ));
            }
        }
        let quarters = (1..=HORIZON_QUARTERS)
            .map(|q| MacroQuarter {
                quarter: q,
                variables: series
                    .iter()
                    .map(|(v, values)| (*v, values[(q - 1) as usize]))
                    .collect(),
            })
            .collect();
        ScenarioPath::new(name, quarters)
    }
}
