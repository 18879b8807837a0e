//! Shared numeric helpers
//!
//! Closed-form approximations used by both analyzers. Nothing here pulls in a
//! statistics crate: the log-gamma, normal tail and incomplete gamma are
//! implemented directly so their numerical behavior is pinned by this crate's
//! own tests.

use std::f64::consts::PI;

/// Lanczos coefficients for g = 7, n = 9
#[allow(clippy::excessive_precision)]
const LANCZOS_COEFFICIENTS: [f64; 9] = [
    0.99999999999980993,
    676.5203681218851,
    -1259.1392167224028,
    771.32342877765313,
    -176.61502916214059,
    12.507343278686905,
    -0.13857109526572012,
    9.9843695780195716e-6,
    1.5056327351493116e-7,
];

/// Zelen & Severo (A&S 26.2.17) polynomial coefficients b1..b5
const ZELEN_SEVERO_P: f64 = 0.2316419;
const ZELEN_SEVERO_DENSITY: f64 = 0.3989423;
const ZELEN_SEVERO_B: [f64; 5] = [0.3193815, -0.3565638, 1.781478, -1.821256, 1.330274];

const INCOMPLETE_GAMMA_MAX_ITER: usize = 200;
const INCOMPLETE_GAMMA_EPS: f64 = 1e-14;
const FPMIN: f64 = 1e-300;

/// Round to a fixed number of decimal places
#[inline]
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Lanczos approximation of ln(Gamma(x)) for x > 0
///
/// Uses the reflection formula below 0.5. Accurate to ~15 significant digits
/// over the range the Beta posteriors need.
pub fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        return (PI / (PI * x).sin()).ln() - ln_gamma(1.0 - x);
    }

    let x = x - 1.0;
    let t = x + 7.5; // g + 0.5
    let acc = LANCZOS_COEFFICIENTS
        .iter()
        .enumerate()
        .skip(1)
        .fold(LANCZOS_COEFFICIENTS[0], |acc, (i, &coef)| {
            acc + coef / (x + i as f64)
        });

    0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + acc.ln()
}

/// ln(B(a, b)) = ln Gamma(a) + ln Gamma(b) - ln Gamma(a + b)
#[inline]
pub fn ln_beta(a: f64, b: f64) -> f64 {
    ln_gamma(a) + ln_gamma(b) - ln_gamma(a + b)
}

/// One-sided upper tail P(Z > |z|) of the standard normal
///
/// Zelen & Severo polynomial approximation; absolute error below 7.5e-8.
/// The frequentist layer's tolerances are calibrated against this exact
/// approximation, not an erf-based CDF.
pub fn normal_upper_tail(z: f64) -> f64 {
    let z = z.abs();
    let t = 1.0 / (1.0 + ZELEN_SEVERO_P * z);
    let d = ZELEN_SEVERO_DENSITY * (-z * z / 2.0).exp();
    let poly = ZELEN_SEVERO_B
        .iter()
        .rev()
        .fold(0.0, |acc, &b| (acc + b) * t);
    d * poly
}

/// Standard normal CDF built on the Zelen & Severo tail
pub fn normal_cdf(x: f64) -> f64 {
    let tail = normal_upper_tail(x);
    if x >= 0.0 {
        1.0 - tail
    } else {
        tail
    }
}

/// Inverse standard normal CDF (Acklam's rational approximation)
///
/// Relative error ~1.15e-9. Returns +-infinity at the endpoints.
pub fn inverse_normal_cdf(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];
    const P_LOW: f64 = 0.02425;
    const P_HIGH: f64 = 1.0 - P_LOW;

    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }

    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= P_HIGH {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    }
}

/// Regularized upper incomplete gamma Q(s, x) = Gamma(s, x) / Gamma(s)
///
/// Series expansion below `s + 1`, Lentz continued fraction above.
pub fn regularized_gamma_q(s: f64, x: f64) -> f64 {
    if x <= 0.0 || s <= 0.0 {
        return 1.0;
    }

    let log_prefactor = -x + s * x.ln() - ln_gamma(s);

    if x < s + 1.0 {
        let mut ap = s;
        let mut del = 1.0 / s;
        let mut sum = del;
        for _ in 0..INCOMPLETE_GAMMA_MAX_ITER {
            ap += 1.0;
            del *= x / ap;
            sum += del;
            if del.abs() < sum.abs() * INCOMPLETE_GAMMA_EPS {
                break;
            }
        }
        (1.0 - sum * log_prefactor.exp()).clamp(0.0, 1.0)
    } else {
        let mut b = x + 1.0 - s;
        let mut c = 1.0 / FPMIN;
        let mut d = 1.0 / b;
        let mut h = d;
        for i in 1..=INCOMPLETE_GAMMA_MAX_ITER {
            let an = -(i as f64) * (i as f64 - s);
            b += 2.0;
            d = an * d + b;
            if d.abs() < FPMIN {
                d = FPMIN;
            }
            c = b + an / c;
            if c.abs() < FPMIN {
                c = FPMIN;
            }
            d = 1.0 / d;
            let del = d * c;
            h *= del;
            if (del - 1.0).abs() < INCOMPLETE_GAMMA_EPS {
                break;
            }
        }
        (log_prefactor.exp() * h).clamp(0.0, 1.0)
    }
}

/// Survival function of the chi-squared distribution
pub fn chi_squared_survival(chi_squared: f64, degrees_of_freedom: usize) -> f64 {
    if degrees_of_freedom == 0 || !chi_squared.is_finite() {
        return if chi_squared.is_nan() { 1.0 } else { 0.0 };
    }
    regularized_gamma_q(degrees_of_freedom as f64 / 2.0, chi_squared / 2.0)
}
