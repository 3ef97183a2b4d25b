//! Portfolio-level capital waterfall.
//!
//! Aggregates segment snapshots for one quarter into provisions, income,
//! CET1 capital, risk-weighted assets and the CET1 ratio:
//!
//!   provisions = sum NCO
//!   pre_tax    = sum net_revenue - provisions
//!   taxes      = max(pre_tax, 0) * tax_rate
//!   net_income = pre_tax - taxes
//!   CET1       = CET1_prior + net_income - distributions
//!   RWA        = sum EAD * risk_weight
//!   ratio      = CET1 / RWA

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::StressConfig;
use crate::error::CapitalStressError;
use crate::roller::QuarterState;
use crate::types::{Money, Quarter, Rate};
use crate::CapitalStressResult;

/// Portfolio-wide position at the end of one quarter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapitalState {
    pub quarter: Quarter,
    pub net_revenue: Money,
    /// Realized net charge-offs recognised in the quarter
    pub provisions: Money,
    pub pre_tax_income: Money,
    pub taxes: Money,
    pub net_income: Money,
    pub distributions: Money,
    pub beginning_cet1: Money,
    pub cet1_capital: Money,
    pub total_ead: Money,
    pub rwa: Money,
    pub cet1_ratio: Rate,
    /// CET1 above (or below, if negative) the configured minimum ratio
    pub surplus: Money,
}

impl CapitalState {
    pub fn breaches(&self, minimum_ratio: Rate) -> bool {
        self.cet1_ratio < minimum_ratio
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CapitalWaterfall;

impl CapitalWaterfall {
    /// Apply the waterfall to all segment snapshots of `quarter`.
    ///
    /// `states` must hold exactly one snapshot per segment for the quarter;
    /// risk weights are looked up in `config` by segment id.
    pub fn apply(
        &self,
        prior_cet1: Money,
        quarter: Quarter,
        states: &[QuarterState],
        config: &StressConfig,
    ) -> CapitalStressResult<CapitalState> {
        let mut net_revenue = Decimal::ZERO;
        let mut provisions = Decimal::ZERO;
        let mut total_ead = Decimal::ZERO;
        let mut rwa = Decimal::ZERO;

        for state in states {
            if state.quarter != quarter {
                return Err(CapitalStressError::computation(
                    quarter,
                    &state.segment_id,
                    "quarter",
                    format!("snapshot belongs to quarter {}", state.quarter),
                ));
            }
            let risk_weight = config.segment_model(&state.segment_id)?.risk_weight;
            net_revenue += state.net_revenue;
            provisions += state.net_charge_off;
            total_ead += state.ead;
            rwa = state
                .ead
                .checked_mul(risk_weight)
                .and_then(|w| rwa.checked_add(w))
                .ok_or_else(|| {
                    CapitalStressError::computation(
                        quarter,
                        &state.segment_id,
                        "rwa",
                        "risk-weighted assets overflow",
                    )
                })?;
        }

        if rwa <= Decimal::ZERO {
            return Err(CapitalStressError::computation(
                quarter,
                "portfolio",
                "rwa",
                format!("risk-weighted assets are {}, ratio is undefined", rwa),
            ));
        }

        let pre_tax_income = net_revenue - provisions;
        let taxes = pre_tax_income.max(Decimal::ZERO) * config.tax_rate;
        let net_income = pre_tax_income - taxes;
        let distributions = config.distribution(quarter);
        let cet1_capital = prior_cet1 + net_income - distributions;
        let cet1_ratio = cet1_capital.checked_div(rwa).ok_or_else(|| {
            CapitalStressError::computation(
                quarter,
                "portfolio",
                "cet1_ratio",
                format!("CET1 {} over RWA {} is not representable", cet1_capital, rwa),
            )
        })?;
        let surplus = config
            .minimum_cet1_ratio
            .checked_mul(rwa)
            .and_then(|required| cet1_capital.checked_sub(required))
            .ok_or_else(|| {
                CapitalStressError::computation(quarter, "portfolio", "surplus", "overflow")
            })?;

        Ok(CapitalState {
            quarter,
            net_revenue,
            provisions,
            pre_tax_income,
            taxes,
            net_income,
            distributions,
            beginning_cet1: prior_cet1,
            cet1_capital,
            total_ead,
            rwa,
            cet1_ratio,
            surplus,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SegmentModelConfig;
    use crate::satellite::SatelliteSpec;
    use rust_decimal_macros::dec;

    fn state(id: &str, quarter: Quarter, revenue: Money, nco: Money, ead: Money) -> QuarterState {
        QuarterState {
            quarter,
            segment_id: id.into(),
            systematic_index: Decimal::ZERO,
            conditional_pd: dec!(0.02),
            lgd: dec!(0.4),
            ead,
            beginning_balance: ead,
            pre_default_balance: ead,
            defaulted_balance: nco,
            net_charge_off: nco,
            ending_balance: ead,
            net_revenue: revenue,
        }
    }

    fn config() -> StressConfig {
        StressConfig::new(dec!(100_000), dec!(0.25))
            .with_segment("Cards", SegmentModelConfig::new(SatelliteSpec::default(), dec!(1)))
            .with_segment("Mortgage", SegmentModelConfig::new(SatelliteSpec::default(), dec!(0.5)))
            .with_distributions(vec![dec!(2_000)])
    }

    #[test]
    fn test_profitable_quarter() {
        let states = vec![
            state("Cards", 1, dec!(12_000), dec!(4_000), dec!(400_000)),
            state("Mortgage", 1, dec!(8_000), dec!(1_000), dec!(600_000)),
        ];
        let c = CapitalWaterfall
            .apply(dec!(100_000), 1, &states, &config())
            .unwrap();

        assert_eq!(c.net_revenue, dec!(20_000));
        assert_eq!(c.provisions, dec!(5_000));
        assert_eq!(c.pre_tax_income, dec!(15_000));
        assert_eq!(c.taxes, dec!(3_750));
        assert_eq!(c.net_income, dec!(11_250));
        assert_eq!(c.distributions, dec!(2_000));
        // 100,000 + 11,250 - 2,000
        assert_eq!(c.cet1_capital, dec!(109_250));
        // 400,000 * 1.0 + 600,000 * 0.5
        assert_eq!(c.rwa, dec!(700_000));
        assert_eq!(c.total_ead, dec!(1_000_000));
        assert_eq!(c.cet1_ratio, c.cet1_capital / c.rwa);
        // 109,250 - 0.045 * 700,000
        assert_eq!(c.surplus, dec!(77_750));
        assert!(!c.breaches(dec!(0.045)));
    }

    #[test]
    fn test_loss_quarter_pays_no_tax() {
        let states = vec![state("Cards", 2, dec!(5_000), dec!(30_000), dec!(400_000))];
        let c = CapitalWaterfall
            .apply(dec!(50_000), 2, &states, &config())
            .unwrap();
        assert_eq!(c.pre_tax_income, dec!(-25_000));
        assert_eq!(c.taxes, Decimal::ZERO);
        assert_eq!(c.net_income, dec!(-25_000));
        // No distribution planned for quarter 2
        assert_eq!(c.distributions, Decimal::ZERO);
        assert_eq!(c.cet1_capital, dec!(25_000));
        assert_eq!(c.beginning_cet1, dec!(50_000));
    }

    #[test]
    fn test_provisions_not_double_counted() {
        let states = vec![state("Cards", 3, Decimal::ZERO, dec!(10_000), dec!(100_000))];
        let mut cfg = config();
        cfg.tax_rate = Decimal::ZERO;
        let c = CapitalWaterfall.apply(dec!(50_000), 3, &states, &cfg).unwrap();
        assert_eq!(c.cet1_capital, dec!(40_000));
    }

    #[test]
    fn test_breach_detection() {
        let states = vec![state("Cards", 2, Decimal::ZERO, dec!(45_000), dec!(1_000_000))];
        let mut cfg = config();
        cfg.tax_rate = Decimal::ZERO;
        let c = CapitalWaterfall.apply(dec!(80_000), 2, &states, &cfg).unwrap();
        assert_eq!(c.cet1_ratio, dec!(0.035));
        assert!(c.breaches(cfg.minimum_cet1_ratio));
        assert!(c.surplus < Decimal::ZERO);
    }

    #[test]
    fn test_zero_rwa_is_computation_error() {
        let states = vec![state("Cards", 1, Decimal::ZERO, Decimal::ZERO, Decimal::ZERO)];
        let err = CapitalWaterfall
            .apply(dec!(100_000), 1, &states, &config())
            .unwrap_err();
        match err {
            CapitalStressError::Computation { quarter, quantity, .. } => {
                assert_eq!(quarter, 1);
                assert_eq!(quantity, "rwa");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_vanishing_rwa_is_computation_error() {
        // Positive but tiny RWA: the ratio is too large to represent.
        let states = vec![state("Cards", 9, Decimal::ZERO, Decimal::ZERO, dec!(0.000000000000000001))];
        let err = CapitalWaterfall
            .apply(dec!(1_000_000_000_000), 9, &states, &config())
            .unwrap_err();
        match err {
            CapitalStressError::Computation { quarter, quantity, .. } => {
                assert_eq!(quarter, 9);
                assert_eq!(quantity, "cet1_ratio");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_reject_mismatched_quarter() {
        let states = vec![state("Cards", 4, dec!(1), dec!(1), dec!(100))];
        assert!(CapitalWaterfall
            .apply(dec!(100_000), 3, &states, &config())
            .is_err());
    }
}
