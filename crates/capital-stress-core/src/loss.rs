//! Loss-given-default and exposure-at-default paths per segment and quarter.
//!
//! Both parameters respond to the macro path through a satellite-style
//! regression passed through a logistic link, which keeps them inside their
//! bounds by construction:
//!
//! - LGD_t = logistic(logit(LGD_baseline) + s_t)
//! - CCF_t = logistic(logit(CCF_baseline) + s_t),
//!   EAD_t = drawn_t + CCF_t * (commitment_limit - drawn_t)

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::CapitalStressError;
use crate::math;
use crate::portfolio::Segment;
use crate::satellite::{SatelliteModel, SatelliteSpec};
use crate::scenario::MacroQuarter;
use crate::types::{Money, Rate};
use crate::CapitalStressResult;

// ---------------------------------------------------------------------------
// Model configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum LgdModel {
    /// LGD fixed at the segment baseline for every quarter.
    #[default]
    Baseline,
    /// Baseline shifted on the logit scale by a macro sensitivity.
    Logistic { sensitivity: SatelliteSpec },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum EadModel {
    /// EAD equals the drawn beginning balance.
    #[default]
    Drawn,
    /// Revolving exposure: stressed drawdown of the undrawn commitment.
    CreditConversion {
        /// Commitment ceiling; EAD never exceeds it
        commitment_limit: Money,
        /// Baseline credit conversion factor on the undrawn amount, in (0, 1)
        ccf_baseline: Rate,
        #[serde(default)]
        sensitivity: SatelliteSpec,
    },
}

/// LGD and EAD for one segment-quarter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LossParameters {
    pub lgd: Rate,
    pub ead: Money,
    /// Credit conversion factor applied, when the EAD model uses one
    pub ccf: Option<Rate>,
}

// ---------------------------------------------------------------------------
// Estimator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct LossParameterEstimator;

impl LossParameterEstimator {
    /// Calibration checks, run once before the first quarter.
    pub fn validate(
        &self,
        segment: &Segment,
        lgd_model: &LgdModel,
        ead_model: &EadModel,
    ) -> CapitalStressResult<()> {
        if let LgdModel::Logistic { .. } = lgd_model {
            if segment.lgd_baseline <= Decimal::ZERO || segment.lgd_baseline >= Decimal::ONE {
                return Err(CapitalStressError::configuration(
                    format!("segment '{}'.lgd_baseline", segment.id),
                    "logistic LGD needs a baseline strictly inside (0, 1)",
                ));
            }
        }
        if let EadModel::CreditConversion {
            commitment_limit,
            ccf_baseline,
            ..
        } = ead_model
        {
            if *commitment_limit < segment.starting_balance {
                return Err(CapitalStressError::configuration(
                    format!("segment '{}'.commitment_limit", segment.id),
                    format!(
                        "commitment limit {} is below the drawn balance {}",
                        commitment_limit, segment.starting_balance
                    ),
                ));
            }
            if *ccf_baseline <= Decimal::ZERO || *ccf_baseline >= Decimal::ONE {
                return Err(CapitalStressError::configuration(
                    format!("segment '{}'.ccf_baseline", segment.id),
                    "must be strictly inside (0, 1)",
                ));
            }
        }
        Ok(())
    }

    /// LGD and EAD for `segment` in `quarter`, given its beginning balance.
    pub fn estimate(
        &self,
        segment: &Segment,
        lgd_model: &LgdModel,
        ead_model: &EadModel,
        quarter: &MacroQuarter,
        beginning_balance: Money,
    ) -> CapitalStressResult<LossParameters> {
        self.validate(segment, lgd_model, ead_model)?;
        let q = quarter.quarter;

        let lgd = match lgd_model {
            LgdModel::Baseline => segment.lgd_baseline,
            LgdModel::Logistic { sensitivity } => {
                shifted_probability(segment.lgd_baseline, sensitivity, quarter)?
            }
        };
        if lgd < Decimal::ZERO || lgd > Decimal::ONE {
            return Err(CapitalStressError::computation(
                q,
                &segment.id,
                "lgd",
                format!("{} is outside [0, 1]", lgd),
            ));
        }

        let (ead, ccf, ceiling) = match ead_model {
            EadModel::Drawn => (beginning_balance, None, beginning_balance),
            EadModel::CreditConversion {
                commitment_limit,
                ccf_baseline,
                sensitivity,
            } => {
                let ccf = shifted_probability(*ccf_baseline, sensitivity, quarter)?;
                let undrawn = *commitment_limit - beginning_balance;
                (
                    beginning_balance + ccf * undrawn,
                    Some(ccf),
                    *commitment_limit,
                )
            }
        };
        if ead < Decimal::ZERO || ead > ceiling {
            return Err(CapitalStressError::computation(
                q,
                &segment.id,
                "ead",
                format!("{} is outside [0, {}]", ead, ceiling),
            ));
        }

        Ok(LossParameters { lgd, ead, ccf })
    }
}

/// logistic(logit(baseline) + s) with s from the sensitivity satellite.
fn shifted_probability(
    baseline: Rate,
    sensitivity: &SatelliteSpec,
    quarter: &MacroQuarter,
) -> CapitalStressResult<Rate> {
    let base = math::logit(baseline).ok_or_else(|| {
        CapitalStressError::configuration(
            "loss_model.baseline",
            format!("{} has no logit; must be strictly inside (0, 1)", baseline),
        )
    })?;
    let shift = sensitivity.evaluate(quarter)?;
    Ok(math::logistic(base + shift))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::satellite::LinearSatellite;
    use crate::scenario::MacroVariable;
    use rust_decimal_macros::dec;

    fn approx_eq(a: Decimal, b: Decimal, eps: Decimal) -> bool {
        (a - b).abs() < eps
    }

    fn card_segment() -> Segment {
        Segment {
            id: "Cards".into(),
            starting_balance: dec!(800_000),
            pd_ttc: dec!(0.03),
            asset_correlation: dec!(0.04),
            lgd_baseline: dec!(0.8),
            interest_yield: dec!(0.16),
            funding_cost_rate: dec!(0.03),
            amortization_rate: dec!(0.05),
            attrition_rate: dec!(0.02),
        }
    }

    fn quarter(unemployment: Decimal) -> MacroQuarter {
        MacroQuarter::new(2).with(MacroVariable::UnemploymentRate, unemployment)
    }

    fn unemployment_sensitivity() -> SatelliteSpec {
        LinearSatellite::new(dec!(-0.5))
            .with(MacroVariable::UnemploymentRate, dec!(10))
            .into()
    }

    #[test]
    fn test_baseline_models() {
        let est = LossParameterEstimator;
        let p = est
            .estimate(
                &card_segment(),
                &LgdModel::Baseline,
                &EadModel::Drawn,
                &quarter(dec!(0.05)),
                dec!(750_000),
            )
            .unwrap();
        assert_eq!(p.lgd, dec!(0.8));
        assert_eq!(p.ead, dec!(750_000));
        assert!(p.ccf.is_none());
    }

    #[test]
    fn test_logistic_lgd_neutral_shift_returns_baseline() {
        // s = -0.5 + 10 * 0.05 = 0 -> LGD = baseline
        let est = LossParameterEstimator;
        let lgd_model = LgdModel::Logistic {
            sensitivity: unemployment_sensitivity(),
        };
        let p = est
            .estimate(
                &card_segment(),
                &lgd_model,
                &EadModel::Drawn,
                &quarter(dec!(0.05)),
                dec!(800_000),
            )
            .unwrap();
        assert!(approx_eq(p.lgd, dec!(0.8), dec!(0.000000000001)));
    }

    #[test]
    fn test_logistic_lgd_rises_under_stress_and_stays_bounded() {
        let est = LossParameterEstimator;
        let lgd_model = LgdModel::Logistic {
            sensitivity: unemployment_sensitivity(),
        };
        let seg = card_segment();
        let calm = est
            .estimate(&seg, &lgd_model, &EadModel::Drawn, &quarter(dec!(0.05)), dec!(1))
            .unwrap();
        let stressed = est
            .estimate(&seg, &lgd_model, &EadModel::Drawn, &quarter(dec!(0.10)), dec!(1))
            .unwrap();
        let extreme = est
            .estimate(&seg, &lgd_model, &EadModel::Drawn, &quarter(dec!(9)), dec!(1))
            .unwrap();
        assert!(stressed.lgd > calm.lgd);
        assert!(extreme.lgd <= Decimal::ONE);
    }

    #[test]
    fn test_credit_conversion_drawdown() {
        let est = LossParameterEstimator;
        let ead_model = EadModel::CreditConversion {
            commitment_limit: dec!(1_000_000),
            ccf_baseline: dec!(0.5),
            sensitivity: SatelliteSpec::default(),
        };
        // EAD = 800k + 0.5 * 200k = 900k
        let p = est
            .estimate(
                &card_segment(),
                &LgdModel::Baseline,
                &ead_model,
                &quarter(dec!(0.05)),
                dec!(800_000),
            )
            .unwrap();
        assert!(approx_eq(p.ead, dec!(900_000), dec!(0.000001)));
        assert!(p.ead > dec!(800_000), "stress drawdown may exceed drawn balance");
        assert!(p.ead <= dec!(1_000_000), "but never the commitment ceiling");
        assert!(approx_eq(p.ccf.unwrap(), dec!(0.5), dec!(0.000000000001)));
    }

    #[test]
    fn test_credit_conversion_rises_with_stress() {
        let est = LossParameterEstimator;
        let ead_model = EadModel::CreditConversion {
            commitment_limit: dec!(1_000_000),
            ccf_baseline: dec!(0.4),
            sensitivity: unemployment_sensitivity(),
        };
        let seg = card_segment();
        let calm = est
            .estimate(&seg, &LgdModel::Baseline, &ead_model, &quarter(dec!(0.05)), dec!(800_000))
            .unwrap();
        let stressed = est
            .estimate(&seg, &LgdModel::Baseline, &ead_model, &quarter(dec!(0.12)), dec!(800_000))
            .unwrap();
        assert!(stressed.ead > calm.ead);
        assert!(stressed.ead <= dec!(1_000_000));
    }

    #[test]
    fn test_reject_limit_below_balance() {
        let est = LossParameterEstimator;
        let ead_model = EadModel::CreditConversion {
            commitment_limit: dec!(500_000),
            ccf_baseline: dec!(0.5),
            sensitivity: SatelliteSpec::default(),
        };
        let err = est
            .validate(&card_segment(), &LgdModel::Baseline, &ead_model)
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_reject_degenerate_baselines() {
        let est = LossParameterEstimator;
        let mut seg = card_segment();
        seg.lgd_baseline = Decimal::ONE;
        let lgd_model = LgdModel::Logistic {
            sensitivity: SatelliteSpec::default(),
        };
        assert!(est.validate(&seg, &lgd_model, &EadModel::Drawn).is_err());

        let ead_model = EadModel::CreditConversion {
            commitment_limit: dec!(1_000_000),
            ccf_baseline: Decimal::ZERO,
            sensitivity: SatelliteSpec::default(),
        };
        assert!(est
            .validate(&card_segment(), &LgdModel::Baseline, &ead_model)
            .is_err());
    }

    #[test]
    fn test_missing_sensitivity_driver_fails() {
        let est = LossParameterEstimator;
        let lgd_model = LgdModel::Logistic {
            sensitivity: LinearSatellite::new(Decimal::ZERO)
                .with(MacroVariable::HousePriceGrowth, dec!(-3))
                .into(),
        };
        let err = est
            .estimate(
                &card_segment(),
                &lgd_model,
                &EadModel::Drawn,
                &quarter(dec!(0.05)),
                dec!(1),
            )
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_model_serde_tags() {
        let json = serde_json::json!({ "model": "baseline" });
        let m: LgdModel = serde_json::from_value(json).unwrap();
        assert_eq!(m, LgdModel::Baseline);

        let json = serde_json::json!({
            "model": "credit_conversion",
            "commitment_limit": "1000000",
            "ccf_baseline": "0.45"
        });
        let m: EadModel = serde_json::from_value(json).unwrap();
        assert!(matches!(m, EadModel::CreditConversion { .. }));
    }
}
