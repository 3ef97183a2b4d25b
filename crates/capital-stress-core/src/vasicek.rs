//! Vasicek single-factor transform from through-the-cycle PD to a
//! scenario-conditional, point-in-time PD.
//!
//! PD_cond = Phi((Phi^-1(PD_ttc) + sqrt(rho) * Z) / sqrt(1 - rho))
//!
//! `Z` is a stress index: a larger value is a worse economy. Written with the
//! usual economic factor X = -Z this is the familiar
//! Phi((Phi^-1(PD) - sqrt(rho) * X) / sqrt(1 - rho)).

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::CapitalStressError;
use crate::math;
use crate::types::Rate;
use crate::CapitalStressResult;

/// Default clamp on conditional PD, keeping it away from 0 and 1.
pub const DEFAULT_PD_EPSILON: Decimal = dec!(0.0000000001);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VasicekTransform {
    /// Output PD is clamped to [epsilon, 1 - epsilon].
    pub epsilon: Decimal,
}

impl Default for VasicekTransform {
    fn default() -> Self {
        VasicekTransform {
            epsilon: DEFAULT_PD_EPSILON,
        }
    }
}

impl VasicekTransform {
    pub fn with_epsilon(epsilon: Decimal) -> CapitalStressResult<Self> {
        let v = VasicekTransform { epsilon };
        v.validate()?;
        Ok(v)
    }

    /// The clamp must leave a non-empty interval around every PD.
    pub fn validate(&self) -> CapitalStressResult<()> {
        if self.epsilon <= Decimal::ZERO || self.epsilon >= dec!(0.5) {
            return Err(CapitalStressError::configuration(
                "vasicek.epsilon",
                format!("must be in (0, 0.5), got {}", self.epsilon),
            ));
        }
        Ok(())
    }

    /// Conditional PD for a stress index `z`.
    ///
    /// An argument too large to represent is a computation error; its quarter
    /// and segment are filled in by the caller.
    pub fn conditional_pd(&self, pd_ttc: Rate, rho: Rate, z: Decimal) -> CapitalStressResult<Rate> {
        validate_parameters(pd_ttc, rho)?;
        self.validate()?;

        let arg = math::sqrt(rho)
            .checked_mul(z)
            .and_then(|shift| math::norm_inv(pd_ttc).checked_add(shift))
            .and_then(|num| num.checked_div(math::sqrt(Decimal::ONE - rho)))
            .ok_or_else(|| {
                CapitalStressError::computation(
                    0,
                    "",
                    "conditional_pd",
                    format!("Vasicek argument overflows for Z = {}, rho = {}", z, rho),
                )
            })?;
        let pd = math::norm_cdf(arg);
        Ok(pd.max(self.epsilon).min(Decimal::ONE - self.epsilon))
    }

    /// The stress index at which the conditional PD equals `pd_ttc`.
    ///
    /// Z* = Phi^-1(PD_ttc) * (sqrt(1 - rho) - 1) / sqrt(rho). Anchoring a
    /// satellite intercept here makes a neutral scenario reproduce the
    /// through-the-cycle PD.
    pub fn neutral_index(&self, pd_ttc: Rate, rho: Rate) -> CapitalStressResult<Decimal> {
        validate_parameters(pd_ttc, rho)?;
        let k = math::norm_inv(pd_ttc);
        Ok(k * (math::sqrt(Decimal::ONE - rho) - Decimal::ONE) / math::sqrt(rho))
    }
}

fn validate_parameters(pd_ttc: Rate, rho: Rate) -> CapitalStressResult<()> {
    if pd_ttc <= Decimal::ZERO || pd_ttc >= Decimal::ONE {
        return Err(CapitalStressError::configuration(
            "pd_ttc",
            format!("must be strictly inside (0, 1), got {}", pd_ttc),
        ));
    }
    if rho <= Decimal::ZERO || rho >= Decimal::ONE {
        return Err(CapitalStressError::configuration(
            "asset_correlation",
            format!("must be strictly inside (0, 1), got {}", rho),
        ));
    }
    Ok(())
}
