//! Frequentist analysis: two-proportion z-test
//!
//! Zero-traffic inputs produce zeros rather than NaN: a variant without
//! impressions has "no signal yet", which is not an error.

use serde::{Deserialize, Serialize};

use crate::constants::{
    CRITICAL_VALUES, DEFAULT_CRITICAL_VALUE, DEFAULT_POWER, DEFAULT_SIGNIFICANCE_LEVEL,
    SAMPLE_SIZE_Z_ALPHA, SAMPLE_SIZE_Z_BETA,
};
use crate::counts::VariantCount;
use crate::numeric::{inverse_normal_cdf, normal_upper_tail};

/// z-test outcome for one treatment arm against the control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Treatment conversion rate
    pub conversion_rate: f64,
    /// Standard error of the treatment rate
    pub standard_error: f64,
    /// Pooled two-proportion z-score (treatment - control)
    pub z_score: f64,
    /// Two-tailed p-value
    pub p_value: f64,
    /// Interval around the treatment rate, clamped to [0, 1]
    pub confidence_interval: (f64, f64),
    pub significant: bool,
    /// (treatment - control) / control; 0 when the control rate is 0
    pub relative_lift: f64,
}

/// Conversions over impressions, 0 without impressions
pub fn conversion_rate(conversions: u64, impressions: u64) -> f64 {
    if impressions == 0 {
        0.0
    } else {
        conversions as f64 / impressions as f64
    }
}

/// sqrt(p(1 - p) / n), 0 without samples
pub fn standard_error(rate: f64, n: u64) -> f64 {
    if n == 0 {
        0.0
    } else {
        (rate * (1.0 - rate) / n as f64).sqrt()
    }
}

/// Pooled two-proportion z-score of `rate1 - rate2`
///
/// Identical rates (or a degenerate pooled rate of 0 or 1) give SE = 0 and
/// z = 0.
pub fn z_score(rate1: f64, rate2: f64, n1: u64, n2: u64) -> f64 {
    if n1 == 0 || n2 == 0 {
        return 0.0;
    }
    let (n1, n2) = (n1 as f64, n2 as f64);
    let pooled = (rate1 * n1 + rate2 * n2) / (n1 + n2);
    let se = (pooled * (1.0 - pooled) * (1.0 / n1 + 1.0 / n2)).sqrt();
    if se == 0.0 || !se.is_finite() {
        0.0
    } else {
        (rate1 - rate2) / se
    }
}

/// Two-tailed p-value using the Zelen & Severo normal tail
pub fn p_value(z: f64) -> f64 {
    (2.0 * normal_upper_tail(z)).clamp(0.0, 1.0)
}

/// z critical value for a two-sided confidence level
///
/// Only 0.90, 0.95 and 0.99 are tabulated; anything else uses 1.645.
pub fn critical_value(level: f64) -> f64 {
    CRITICAL_VALUES
        .iter()
        .find(|(l, _)| (l - level).abs() < 1e-9)
        .map(|(_, z)| *z)
        .unwrap_or(DEFAULT_CRITICAL_VALUE)
}

/// `rate +- z * SE`, clamped to [0, 1]
pub fn confidence_interval(rate: f64, n: u64, level: f64) -> (f64, f64) {
    let margin = critical_value(level) * standard_error(rate, n);
    (
        (rate - margin).clamp(0.0, 1.0),
        (rate + margin).clamp(0.0, 1.0),
    )
}

pub fn is_significant(p_value: f64, alpha: f64) -> bool {
    p_value < alpha
}

/// Per-arm sample size to detect a relative lift at alpha 0.05 and 80% power
///
/// Returns `None` when no finite sample size exists: baseline outside
/// (0, 1), a non-positive effect, or a lifted rate at or above 1.
pub fn minimum_sample_size(baseline_rate: f64, min_detectable_effect: f64) -> Option<u64> {
    sample_size_for(
        baseline_rate,
        min_detectable_effect,
        SAMPLE_SIZE_Z_ALPHA,
        SAMPLE_SIZE_Z_BETA,
    )
}

/// [`minimum_sample_size`] with explicit alpha and power
///
/// At the defaults (0.05, 0.8) the fixed 1.96 / 0.84 critical values are
/// used so results match [`minimum_sample_size`] exactly; other values go
/// through the inverse normal CDF.
pub fn minimum_sample_size_with(
    baseline_rate: f64,
    min_detectable_effect: f64,
    alpha: f64,
    power: f64,
) -> Option<u64> {
    if !(alpha > 0.0 && alpha < 1.0 && power > 0.0 && power < 1.0) {
        return None;
    }
    let z_alpha = if (alpha - DEFAULT_SIGNIFICANCE_LEVEL).abs() < 1e-12 {
        SAMPLE_SIZE_Z_ALPHA
    } else {
        inverse_normal_cdf(1.0 - alpha / 2.0)
    };
    let z_beta = if (power - DEFAULT_POWER).abs() < 1e-12 {
        SAMPLE_SIZE_Z_BETA
    } else {
        inverse_normal_cdf(power)
    };
    sample_size_for(baseline_rate, min_detectable_effect, z_alpha, z_beta)
}

fn sample_size_for(baseline: f64, effect: f64, z_alpha: f64, z_beta: f64) -> Option<u64> {
    if !(baseline > 0.0 && baseline < 1.0) || !(effect > 0.0) {
        return None;
    }
    let p1 = baseline;
    let p2 = baseline * (1.0 + effect);
    if !(p2 < 1.0) {
        return None;
    }
    let p_bar = (p1 + p2) / 2.0;

    let numerator = z_alpha * (2.0 * p_bar * (1.0 - p_bar)).sqrt()
        + z_beta * (p1 * (1.0 - p1) + p2 * (1.0 - p2)).sqrt();
    let n = (numerator * numerator / ((p2 - p1) * (p2 - p1))).ceil();

    if n.is_finite() {
        Some(n as u64)
    } else {
        None
    }
}

/// Stateless z-test runner
pub struct FrequentistAnalyzer;

impl FrequentistAnalyzer {
    /// Compare a treatment arm against the control
    pub fn analyze(
        control: &VariantCount,
        treatment: &VariantCount,
        confidence_level: f64,
        alpha: f64,
    ) -> AnalysisResult {
        let control_rate = control.conversion_rate();
        let rate = treatment.conversion_rate();

        let z = z_score(rate, control_rate, treatment.impressions, control.impressions);
        let p = p_value(z);

        let relative_lift = if control_rate > 0.0 {
            (rate - control_rate) / control_rate
        } else {
            0.0
        };

        AnalysisResult {
            conversion_rate: rate,
            standard_error: standard_error(rate, treatment.impressions),
            z_score: z,
            p_value: p,
            confidence_interval: confidence_interval(rate, treatment.impressions, confidence_level),
            significant: is_significant(p, alpha),
            relative_lift,
        }
    }
}
