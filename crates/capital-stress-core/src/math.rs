//! Decimal special functions used by the credit transforms.
//!
//! Everything stays in `rust_decimal::Decimal` so that a stress run is
//! bit-for-bit reproducible. No `f64`, no MathematicalOps.
//!
//! Covers:
//! 1. **exp / ln / sqrt** -- range-reduced series and Newton iterations.
//! 2. **Normal PDF / CDF** -- Marsaglia's series, exact to Decimal precision
//!    inside |x| <= 8.5 and saturated to 0 / 1 outside.
//! 3. **Inverse normal CDF** -- Acklam's rational approximation polished with
//!    Newton steps against the series CDF.
//! 4. **Logit / logistic** -- link functions for bounded loss parameters.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const LN_2: Decimal = dec!(0.693147180559945309417232121);
const SQRT_2PI: Decimal = dec!(2.50662827463100050241576528);

/// Normal CDF is reported as exactly 0 or 1 beyond this magnitude
/// (Phi(-8.5) ~ 9.5e-18, far below any PD floor in use).
pub const CDF_CUTOFF: Decimal = dec!(8.5);

const MAX_SERIES_TERMS: u32 = 2_000;

// ---------------------------------------------------------------------------
// Elementary functions
// ---------------------------------------------------------------------------

/// exp(x) = 2^n * exp(r) with |r| <= ln2 / 2, Taylor series on r.
///
/// Saturates at `Decimal::MAX` instead of overflowing.
pub fn exp(x: Decimal) -> Decimal {
    if x.is_zero() {
        return Decimal::ONE;
    }
    let saturated = if x > Decimal::ZERO { Decimal::MAX } else { Decimal::ZERO };
    let n = match x.checked_div(LN_2) {
        Some(q) => q.round(),
        None => return saturated,
    };
    let r = x - n * LN_2;

    let mut term = Decimal::ONE;
    let mut sum = Decimal::ONE;
    for i in 1u32..40 {
        term = term * r / Decimal::from(i);
        if term.is_zero() {
            break;
        }
        sum += term;
    }

    let n = match n.to_i64() {
        Some(n) => n,
        None => return saturated,
    };
    if n >= 0 {
        let mut result = sum;
        for _ in 0..n {
            match result.checked_mul(dec!(2)) {
                Some(v) => result = v,
                None => return Decimal::MAX,
            }
        }
        result
    } else {
        let mut result = sum;
        for _ in 0..(-n) {
            result *= dec!(0.5);
            if result.is_zero() {
                break;
            }
        }
        result
    }
}

/// Natural logarithm. Non-positive input has no logarithm and yields `None`.
///
/// Reduces into [0.5, 2] by powers of two, then
/// ln(v) = 2 * atanh((v - 1) / (v + 1)).
pub fn ln(x: Decimal) -> Option<Decimal> {
    if x <= Decimal::ZERO {
        return None;
    }
    if x == Decimal::ONE {
        return Some(Decimal::ZERO);
    }
    let mut val = x;
    let mut adjust = Decimal::ZERO;
    while val > dec!(2) {
        val /= dec!(2);
        adjust += LN_2;
    }
    while val < dec!(0.5) {
        val *= dec!(2);
        adjust -= LN_2;
    }

    let z = (val - Decimal::ONE) / (val + Decimal::ONE);
    let z2 = z * z;
    let mut term = z;
    let mut sum = z;
    for k in 1u32..80 {
        term *= z2;
        if term.is_zero() {
            break;
        }
        sum += term / Decimal::from(2 * k + 1);
    }
    Some(dec!(2) * sum + adjust)
}

/// Square root via Newton's method, iterated until the guess is stable.
pub fn sqrt(x: Decimal) -> Decimal {
    if x <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    if x == Decimal::ONE {
        return Decimal::ONE;
    }
    let mut guess = if x > Decimal::ONE { x / dec!(2) } else { Decimal::ONE };
    for _ in 0..200 {
        let next = (guess + x / guess) / dec!(2);
        if next == guess {
            break;
        }
        guess = next;
    }
    guess
}

// ---------------------------------------------------------------------------
// Standard normal
// ---------------------------------------------------------------------------

/// Standard normal PDF: phi(x) = exp(-x^2 / 2) / sqrt(2 pi).
pub fn norm_pdf(x: Decimal) -> Decimal {
    exp(-(x * x) / dec!(2)) / SQRT_2PI
}

/// Standard normal CDF.
///
/// Phi(x) = 1/2 + phi(x) * sum_{n>=0} x^(2n+1) / (2n+1)!!
/// Every term has the sign of x, so the series never cancels internally.
pub fn norm_cdf(x: Decimal) -> Decimal {
    if x > CDF_CUTOFF {
        return Decimal::ONE;
    }
    if x < -CDF_CUTOFF {
        return Decimal::ZERO;
    }
    if x.is_zero() {
        return dec!(0.5);
    }

    let x2 = x * x;
    let mut term = x;
    let mut sum = x;
    let mut k = 1u32;
    for _ in 0..MAX_SERIES_TERMS {
        k += 2;
        term = term * x2 / Decimal::from(k);
        if term.is_zero() || term.abs() < sum.abs() * dec!(0.000000000000000000000000001) {
            break;
        }
        sum += term;
    }

    let p = dec!(0.5) + norm_pdf(x) * sum;
    p.max(Decimal::ZERO).min(Decimal::ONE)
}

/// Inverse standard normal CDF.
///
/// Inputs at or beyond the unit interval map to the CDF cutoff (+/- 8.5).
pub fn norm_inv(p: Decimal) -> Decimal {
    if p <= Decimal::ZERO {
        return -CDF_CUTOFF;
    }
    if p >= Decimal::ONE {
        return CDF_CUTOFF;
    }
    if p == dec!(0.5) {
        return Decimal::ZERO;
    }

    let mut x = acklam(p);
    if x.abs() >= CDF_CUTOFF {
        return x.max(-CDF_CUTOFF).min(CDF_CUTOFF);
    }

    for _ in 0..3 {
        let density = norm_pdf(x);
        if density.is_zero() {
            break;
        }
        let step = (norm_cdf(x) - p) / density;
        if step.is_zero() {
            break;
        }
        x -= step;
    }
    x
}

/// Acklam's rational approximation (relative error ~1.15e-9).
fn acklam(p: Decimal) -> Decimal {
    let a = [
        dec!(-39.69683028665376),
        dec!(220.9460984245205),
        dec!(-275.9285104469687),
        dec!(138.3577518672690),
        dec!(-30.66479806614716),
        dec!(2.506628277459239),
    ];
    let b = [
        dec!(-54.47609879822406),
        dec!(161.5858368580410),
        dec!(-155.6989798598866),
        dec!(66.80131188771972),
        dec!(-13.28068155288572),
    ];
    let c = [
        dec!(-0.007784894002430293),
        dec!(-0.3223964580411365),
        dec!(-2.400758277161838),
        dec!(-2.549732539343734),
        dec!(4.374664141464968),
        dec!(2.938163982698783),
    ];
    let d = [
        dec!(0.007784695709041462),
        dec!(0.3224671290700398),
        dec!(2.445134137142996),
        dec!(3.754408661907416),
    ];
    let p_low = dec!(0.02425);
    let p_high = Decimal::ONE - p_low;

    let tail = |q: Decimal| -> Decimal {
        let num = ((((c[0] * q + c[1]) * q + c[2]) * q + c[3]) * q + c[4]) * q + c[5];
        let den = (((d[0] * q + d[1]) * q + d[2]) * q + d[3]) * q + Decimal::ONE;
        num / den
    };

    if p < p_low {
        let q = sqrt(dec!(-2) * ln(p).unwrap_or(Decimal::ZERO));
        tail(q)
    } else if p > p_high {
        let q = sqrt(dec!(-2) * ln(Decimal::ONE - p).unwrap_or(Decimal::ZERO));
        -tail(q)
    } else {
        let q = p - dec!(0.5);
        let r = q * q;
        let num = (((((a[0] * r + a[1]) * r + a[2]) * r + a[3]) * r + a[4]) * r + a[5]) * q;
        let den = ((((b[0] * r + b[1]) * r + b[2]) * r + b[3]) * r + b[4]) * r + Decimal::ONE;
        num / den
    }
}

// ---------------------------------------------------------------------------
// Link functions
// ---------------------------------------------------------------------------

/// log(p / (1 - p)); `None` outside the open unit interval.
pub fn logit(p: Decimal) -> Option<Decimal> {
    if p <= Decimal::ZERO || p >= Decimal::ONE {
        return None;
    }
    ln(p / (Decimal::ONE - p))
}

/// 1 / (1 + exp(-y)), evaluated so that exp only sees non-positive arguments.
pub fn logistic(y: Decimal) -> Decimal {
    if y >= Decimal::ZERO {
        Decimal::ONE / (Decimal::ONE + exp(-y))
    } else {
        let e = exp(y);
        e / (Decimal::ONE + e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use statrs::distribution::{ContinuousCDF, Normal};

    fn approx_eq(a: Decimal, b: Decimal, eps: Decimal) -> bool {
        (a - b).abs() < eps
    }

    fn to_f64(x: Decimal) -> f64 {
        x.to_f64().unwrap()
    }

    #[test]
    fn test_exp_known_values() {
        assert!(approx_eq(exp(Decimal::ONE), dec!(2.718281828459045235), dec!(0.000000000000000001)));
        assert!(approx_eq(exp(dec!(-1)), dec!(0.367879441171442321), dec!(0.000000000000000001)));
        assert!(approx_eq(exp(dec!(10)), dec!(22026.465794806716516957), dec!(0.000000000001)));
    }

    #[test]
    fn test_exp_saturates_instead_of_panicking() {
        assert_eq!(exp(dec!(500)), Decimal::MAX);
        assert_eq!(exp(dec!(-500)), Decimal::ZERO);
    }

    #[test]
    fn test_exp_saturates_at_extreme_arguments() {
        // x / ln2 overflows
        assert_eq!(exp(Decimal::MAX), Decimal::MAX);
        assert_eq!(exp(Decimal::MIN), Decimal::ZERO);
        // x / ln2 fits in Decimal but not in i64
        assert_eq!(exp(dec!(10_000_000_000_000_000_000_000)), Decimal::MAX);
        assert_eq!(exp(dec!(-10_000_000_000_000_000_000_000)), Decimal::ZERO);
    }

    #[test]
    fn test_ln_inverts_exp() {
        for x in [dec!(0.001), dec!(0.3), dec!(1.7), dec!(42), dec!(1000000)] {
            let back = exp(ln(x).unwrap());
            assert!(approx_eq(back / x, Decimal::ONE, dec!(0.000000000000000001)), "x = {}", x);
        }
    }

    #[test]
    fn test_ln_rejects_non_positive() {
        assert!(ln(Decimal::ZERO).is_none());
        assert!(ln(dec!(-2)).is_none());
    }

    #[test]
    fn test_sqrt() {
        assert!(approx_eq(sqrt(dec!(2)), dec!(1.414213562373095048801688724), dec!(0.000000000000000000000001)));
        assert!(approx_eq(sqrt(dec!(0.0000000001)), dec!(0.00001), dec!(0.000000000000000000000001)));
        assert_eq!(sqrt(dec!(-4)), Decimal::ZERO);
    }

    #[test]
    fn test_norm_cdf_symmetry_and_centre() {
        assert_eq!(norm_cdf(Decimal::ZERO), dec!(0.5));
        for x in [dec!(0.25), dec!(1.3), dec!(2.9), dec!(5.1)] {
            let sum = norm_cdf(x) + norm_cdf(-x);
            assert!(approx_eq(sum, Decimal::ONE, dec!(0.00000000000000000001)), "x = {}", x);
        }
    }

    #[test]
    fn test_norm_cdf_matches_statrs() {
        let normal = Normal::new(0.0, 1.0).unwrap();
        for x in [dec!(-7.5), dec!(-4), dec!(-2.054), dec!(-1), dec!(0.3), dec!(1.96), dec!(3.2)] {
            let ours = to_f64(norm_cdf(x));
            let reference = normal.cdf(to_f64(x));
            assert!(
                (ours - reference).abs() < 1e-12,
                "x = {}: {} vs {}",
                x,
                ours,
                reference
            );
        }
    }

    #[test]
    fn test_norm_cdf_saturates_outside_cutoff() {
        assert_eq!(norm_cdf(dec!(9)), Decimal::ONE);
        assert_eq!(norm_cdf(dec!(-9)), Decimal::ZERO);
        assert_eq!(norm_cdf(dec!(-1000)), Decimal::ZERO);
    }

    #[test]
    fn test_norm_inv_matches_statrs() {
        let normal = Normal::new(0.0, 1.0).unwrap();
        for p in [dec!(0.000001), dec!(0.01), dec!(0.02), dec!(0.3), dec!(0.75), dec!(0.999)] {
            let ours = to_f64(norm_inv(p));
            let reference = normal.inverse_cdf(to_f64(p));
            assert!(
                (ours - reference).abs() < 1e-9,
                "p = {}: {} vs {}",
                p,
                ours,
                reference
            );
        }
    }

    #[test]
    fn test_norm_inv_round_trip_is_tight() {
        for p in [dec!(0.0001), dec!(0.02), dec!(0.5), dec!(0.9)] {
            assert!(approx_eq(norm_cdf(norm_inv(p)), p, dec!(0.000000000000000001)), "p = {}", p);
        }
    }

    #[test]
    fn test_norm_inv_edges() {
        assert_eq!(norm_inv(Decimal::ZERO), -CDF_CUTOFF);
        assert_eq!(norm_inv(Decimal::ONE), CDF_CUTOFF);
        assert_eq!(norm_inv(dec!(0.5)), Decimal::ZERO);
    }

    #[test]
    fn test_logit_logistic_inverse() {
        for p in [dec!(0.01), dec!(0.4), dec!(0.95)] {
            let back = logistic(logit(p).unwrap());
            assert!(approx_eq(back, p, dec!(0.000000000000000001)), "p = {}", p);
        }
        assert!(logit(Decimal::ZERO).is_none());
        assert!(logit(Decimal::ONE).is_none());
    }

    #[test]
    fn test_logistic_is_bounded() {
        let hi = logistic(dec!(80));
        let lo = logistic(dec!(-80));
        assert!(hi <= Decimal::ONE && hi > dec!(0.999999));
        assert!(lo >= Decimal::ZERO && lo < dec!(0.000001));
    }
}
