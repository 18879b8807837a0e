//! Experiment reports: one decision from both statistical models
//!
//! Answers the questions a reporting layer or an auto-declare workflow asks:
//! - Is there enough traffic to trust any result yet?
//! - Did randomization work (sample ratio matches the split)?
//! - Which variant, if any, should win?
//! - Do the frequentist and Bayesian views agree?

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::bayesian::{BayesianAnalyzer, BayesianConfig, BayesianResult};
use crate::bucketing::{fallback_variant, Variant};
use crate::config::EngineConfig;
use crate::counts::VariantCount;
use crate::errors::{EngineError, Result};
use crate::frequentist::{minimum_sample_size, AnalysisResult, FrequentistAnalyzer};
use crate::metrics::{Timer, REPORT_DECISIONS_TOTAL, REPORT_DURATION};
use crate::numeric::chi_squared_survival;
use crate::split::{validate_split, TrafficSplit};

/// Everything needed to analyze one experiment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentInput {
    pub test_id: String,
    pub variants: Vec<Variant>,
    pub split: TrafficSplit,
    /// Counts keyed by variant id; variants without an entry have no traffic
    pub counts: HashMap<String, VariantCount>,
}

/// Frequentist comparison of one treatment against the control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreatmentComparison {
    pub variant_id: String,
    pub result: AnalysisResult,
}

/// Sample-ratio-mismatch check of observed impressions against the split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SrmCheck {
    pub chi_squared: f64,
    pub degrees_of_freedom: usize,
    pub p_value: f64,
    pub detected: bool,
    /// Split share per variant, renormalized over the analyzed variants
    pub expected_shares: Vec<(String, f64)>,
    pub observed_shares: Vec<(String, f64)>,
}

/// What the caller should do with the experiment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "variant_id", rename_all = "snake_case")]
pub enum Decision {
    /// Not enough (or untrustworthy) data yet
    KeepRunning,
    /// The named variant cleared the stopping rule
    DeclareWinner(String),
    /// Fully powered and still no clear winner
    Inconclusive,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::KeepRunning => "keep_running",
            Decision::DeclareWinner(_) => "declare_winner",
            Decision::Inconclusive => "inconclusive",
        }
    }
}

/// Combined analysis of an experiment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub test_id: String,
    pub control_id: String,
    pub comparisons: Vec<TreatmentComparison>,
    pub bayesian: BayesianResult,
    pub srm: Option<SrmCheck>,
    /// Every arm has reached the configured minimum sample size
    pub ready: bool,
    /// Per-arm impressions needed for the configured minimum detectable effect
    pub required_sample_size: Option<u64>,
    pub decision: Decision,
    pub recommendations: Vec<String>,
    pub analyzed_at: DateTime<Utc>,
}

/// Chi-squared test of observed impressions against the configured split
///
/// Returns `None` when the split is invalid, covers fewer than two of the
/// variants, or there is no traffic.
pub fn check_srm(
    split: &TrafficSplit,
    arms: &[(&str, VariantCount)],
    alpha: f64,
) -> Option<SrmCheck> {
    if !validate_split(split).valid {
        return None;
    }

    let covered: Vec<(&str, f64, u64)> = arms
        .iter()
        .filter_map(|(id, count)| {
            split
                .get(id)
                .filter(|pct| *pct > 0.0)
                .map(|pct| (*id, pct, count.impressions))
        })
        .collect();
    if covered.len() < 2 {
        return None;
    }

    let total_share: f64 = covered.iter().map(|(_, pct, _)| pct).sum();
    let total_impressions: u64 = covered.iter().map(|(_, _, n)| n).sum();
    if total_impressions == 0 {
        return None;
    }
    let total = total_impressions as f64;

    let mut chi_squared = 0.0;
    let mut expected_shares = Vec::with_capacity(covered.len());
    let mut observed_shares = Vec::with_capacity(covered.len());
    for (id, pct, n) in &covered {
        let share = pct / total_share;
        let expected = total * share;
        chi_squared += (*n as f64 - expected).powi(2) / expected;
        expected_shares.push((id.to_string(), share));
        observed_shares.push((id.to_string(), *n as f64 / total));
    }

    let degrees_of_freedom = covered.len() - 1;
    let p_value = chi_squared_survival(chi_squared, degrees_of_freedom);

    Some(SrmCheck {
        chi_squared,
        degrees_of_freedom,
        p_value,
        detected: p_value < alpha,
        expected_shares,
        observed_shares,
    })
}

/// Builds [`ExperimentReport`]s from a validated [`EngineConfig`]
#[derive(Debug, Clone)]
pub struct ExperimentAnalyzer {
    config: EngineConfig,
    bayesian: BayesianAnalyzer,
}

impl ExperimentAnalyzer {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let bayesian = BayesianAnalyzer::new(BayesianConfig::from(&config));
        Ok(Self { config, bayesian })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Analyze with the RNG described by the config (seeded or entropy)
    pub fn run(&self, input: &ExperimentInput) -> Result<ExperimentReport> {
        let mut rng = self.config.rng();
        self.analyze(input, &mut rng)
    }

    /// Analyze with a caller-supplied RNG
    pub fn analyze<R: Rng + ?Sized>(
        &self,
        input: &ExperimentInput,
        rng: &mut R,
    ) -> Result<ExperimentReport> {
        let _timer = Timer::new(REPORT_DURATION.clone());

        let control = fallback_variant(&input.variants).ok_or(EngineError::NoVariants)?;

        if let Some(unknown) = input
            .counts
            .keys()
            .find(|id| !input.variants.iter().any(|v| &v.id == *id))
        {
            return Err(EngineError::UnknownVariant(unknown.clone()));
        }

        let arms: Vec<(&str, VariantCount)> = input
            .variants
            .iter()
            .map(|v| {
                let count = input.counts.get(&v.id).copied().unwrap_or_default();
                count.validate(&v.id).map(|_| (v.id.as_str(), count))
            })
            .collect::<Result<_>>()?;

        let control_count = arms
            .iter()
            .find(|(id, _)| *id == control.id)
            .map(|(_, c)| *c)
            .unwrap_or_default();

        // Bonferroni across treatment comparisons
        let treatments = arms.len().saturating_sub(1).max(1);
        let alpha = self.config.significance_level / treatments as f64;

        let comparisons: Vec<TreatmentComparison> = arms
            .iter()
            .filter(|(id, _)| *id != control.id)
            .map(|(id, count)| TreatmentComparison {
                variant_id: id.to_string(),
                result: FrequentistAnalyzer::analyze(
                    &control_count,
                    count,
                    self.config.confidence_level,
                    alpha,
                ),
            })
            .collect();

        let bayesian = self.bayesian.test_multi(&arms, rng);
        let srm = check_srm(&input.split, &arms, self.config.srm_alpha);

        let ready = arms
            .iter()
            .all(|(_, c)| c.impressions >= self.config.min_sample_size);
        let required_sample_size = minimum_sample_size(
            control_count.conversion_rate(),
            self.config.min_detectable_effect,
        );
        let fully_powered = required_sample_size
            .map(|n| arms.iter().all(|(_, c)| c.impressions >= n))
            .unwrap_or(false);
        let srm_detected = srm.as_ref().map(|s| s.detected).unwrap_or(false);

        let decision = if !ready || srm_detected {
            Decision::KeepRunning
        } else if let (true, Some(winner)) = (bayesian.should_stop, &bayesian.recommended_variant) {
            Decision::DeclareWinner(winner.clone())
        } else if fully_powered {
            Decision::Inconclusive
        } else {
            Decision::KeepRunning
        };

        if let Some(check) = srm.as_ref().filter(|s| s.detected) {
            warn!(
                test_id = %input.test_id,
                chi_squared = check.chi_squared,
                p_value = check.p_value,
                "Sample ratio mismatch detected"
            );
        }

        let recommendations = self.recommendations(
            &arms,
            &control.id,
            &comparisons,
            &bayesian,
            srm.as_ref(),
            &decision,
            required_sample_size,
        );

        REPORT_DECISIONS_TOTAL
            .with_label_values(&[decision.as_str()])
            .inc();
        info!(
            test_id = %input.test_id,
            decision = decision.as_str(),
            confidence = bayesian.confidence,
            "Experiment analyzed"
        );

        Ok(ExperimentReport {
            test_id: input.test_id.clone(),
            control_id: control.id.clone(),
            comparisons,
            bayesian,
            srm,
            ready,
            required_sample_size,
            decision,
            recommendations,
            analyzed_at: Utc::now(),
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn recommendations(
        &self,
        arms: &[(&str, VariantCount)],
        control_id: &str,
        comparisons: &[TreatmentComparison],
        bayesian: &BayesianResult,
        srm: Option<&SrmCheck>,
        decision: &Decision,
        required_sample_size: Option<u64>,
    ) -> Vec<String> {
        let mut recommendations = Vec::new();

        if let Some(check) = srm.filter(|s| s.detected) {
            recommendations.push(format!(
                "Sample ratio mismatch (chi-squared {:.2}, p = {:.5}): traffic does not match the configured split, check bucketing and event collection before trusting results",
                check.chi_squared, check.p_value
            ));
        }

        let min_impressions = arms.iter().map(|(_, c)| c.impressions).min().unwrap_or(0);
        if min_impressions < self.config.min_sample_size {
            recommendations.push(format!(
                "Insufficient data: smallest arm has {} impressions, need at least {} before deciding",
                min_impressions, self.config.min_sample_size
            ));
        }

        match decision {
            Decision::DeclareWinner(winner) => {
                let posterior = bayesian.variant(winner);
                recommendations.push(format!(
                    "Variant '{}' wins with {:.1}% probability to be best (expected loss {:.5})",
                    winner,
                    bayesian.confidence * 100.0,
                    posterior.map(|p| p.expected_loss).unwrap_or(0.0)
                ));

                if winner == control_id {
                    recommendations
                        .push("Recommendation: keep the control, do not ship any treatment".to_string());
                } else {
                    recommendations.push(format!("Recommendation: ship variant '{winner}'"));
                    let significant = comparisons
                        .iter()
                        .find(|c| &c.variant_id == winner)
                        .map(|c| c.result.significant)
                        .unwrap_or(false);
                    if !significant {
                        recommendations.push(
                            "Note: the z-test is not yet significant for this variant; the Bayesian model is more decisive at this sample size".to_string(),
                        );
                    }
                }
            }
            Decision::Inconclusive => {
                recommendations.push(
                    "No variant is meaningfully better: the test reached its planned sample size without a winner".to_string(),
                );
            }
            Decision::KeepRunning => {
                if let Some(n) = required_sample_size {
                    if min_impressions < n {
                        recommendations.push(format!(
                            "Keep running: ~{} impressions per arm needed to detect a {:.0}% relative lift ({} so far in the smallest arm)",
                            n,
                            self.config.min_detectable_effect * 100.0,
                            min_impressions
                        ));
                    }
                }
            }
        }

        for comparison in comparisons.iter().filter(|c| c.result.significant) {
            if comparison.result.relative_lift < 0.0 {
                recommendations.push(format!(
                    "Variant '{}' performs significantly worse than control ({:.1}%)",
                    comparison.variant_id,
                    comparison.result.relative_lift * 100.0
                ));
            }
        }

        recommendations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::engine_rng;

    fn input(counts: &[(&str, u64, u64)]) -> ExperimentInput {
        let variants = vec![Variant::control("control"), Variant::treatment("treatment")];
        ExperimentInput {
            test_id: "checkout-button".to_string(),
            variants,
            split: TrafficSplit::from_entries([("control", 50.0), ("treatment", 50.0)]),
            counts: counts
                .iter()
                .map(|(id, c, n)| (id.to_string(), VariantCount::new(*c, *n).unwrap()))
                .collect(),
        }
    }

    fn analyzer() -> ExperimentAnalyzer {
        ExperimentAnalyzer::new(EngineConfig {
            seed: Some(2024),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_srm_balanced_traffic() {
        let split = TrafficSplit::from_entries([("a", 50.0), ("b", 50.0)]);
        let arms = [
            ("a", VariantCount::new(0, 5_020).unwrap()),
            ("b", VariantCount::new(0, 4_980).unwrap()),
        ];
        let check = check_srm(&split, &arms, 0.001).unwrap();
        assert!(!check.detected);
        assert_eq!(check.degrees_of_freedom, 1);
        assert!(check.p_value > 0.5);
    }

    #[test]
    fn test_srm_detects_skew() {
        let split = TrafficSplit::from_entries([("a", 30.0), ("b", 70.0)]);
        let arms = [
            ("a", VariantCount::new(0, 5_000).unwrap()),
            ("b", VariantCount::new(0, 5_000).unwrap()),
        ];
        let check = check_srm(&split, &arms, 0.001).unwrap();
        assert!(check.detected);
        assert!(check.p_value < 1e-10);
        assert_eq!(check.expected_shares[0], ("a".to_string(), 0.3));
    }

    #[test]
    fn test_srm_skipped_without_data() {
        let split = TrafficSplit::from_entries([("a", 50.0), ("b", 50.0)]);
        let arms = [("a", VariantCount::default()), ("b", VariantCount::default())];
        assert!(check_srm(&split, &arms, 0.001).is_none());

        let bad_split = TrafficSplit::from_entries([("a", 10.0)]);
        assert!(check_srm(&bad_split, &arms, 0.001).is_none());
    }

    #[test]
    fn test_report_declares_winner() {
        let report = analyzer()
            .run(&input(&[("control", 500, 10_000), ("treatment", 650, 10_000)]))
            .unwrap();
        assert_eq!(report.control_id, "control");
        assert!(report.ready);
        assert_eq!(report.decision, Decision::DeclareWinner("treatment".to_string()));
        assert!(report.comparisons[0].result.significant);
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.contains("ship variant 'treatment'")));
    }

    #[test]
    fn test_report_underpowered_keeps_running() {
        let report = analyzer()
            .run(&input(&[("control", 5, 100), ("treatment", 7, 100)]))
            .unwrap();
        assert_eq!(report.decision, Decision::KeepRunning);
        assert!(report.required_sample_size.unwrap() > 100);
        assert!(!report.comparisons[0].result.significant);
    }

    #[test]
    fn test_report_below_min_sample_never_stops() {
        // Lopsided but tiny: 0/50 vs 10/50
        let report = analyzer()
            .run(&input(&[("control", 0, 50), ("treatment", 10, 50)]))
            .unwrap();
        assert!(!report.ready);
        assert_eq!(report.decision, Decision::KeepRunning);
        assert!(report.recommendations[0].starts_with("Insufficient data"));
    }

    #[test]
    fn test_report_srm_blocks_decision() {
        let mut skewed = input(&[("control", 300, 6_000), ("treatment", 400, 4_000)]);
        skewed.split = TrafficSplit::from_entries([("control", 50.0), ("treatment", 50.0)]);
        let report = analyzer().run(&skewed).unwrap();
        assert!(report.srm.as_ref().unwrap().detected);
        assert_eq!(report.decision, Decision::KeepRunning);
        assert!(report.recommendations[0].contains("Sample ratio mismatch"));
    }

    #[test]
    fn test_report_inconclusive_when_fully_powered() {
        // 10% baseline at 10% MDE needs ~14.7k per arm
        let report = analyzer()
            .run(&input(&[("control", 5_000, 50_000), ("treatment", 5_010, 50_000)]))
            .unwrap();
        assert_eq!(report.decision, Decision::Inconclusive);
    }

    #[test]
    fn test_report_missing_counts_are_zero() {
        let report = analyzer().run(&input(&[])).unwrap();
        assert_eq!(report.decision, Decision::KeepRunning);
        assert!(report.srm.is_none());
        assert_eq!(report.required_sample_size, None);
    }

    #[test]
    fn test_report_rejects_bad_input() {
        let mut bad = input(&[("control", 5, 100)]);
        bad.counts.insert(
            "treatment".to_string(),
            VariantCount {
                conversions: 11,
                impressions: 10,
            },
        );
        assert_eq!(analyzer().run(&bad).unwrap_err().code(), "INVALID_COUNTS");

        let mut unknown = input(&[("control", 5, 100)]);
        unknown
            .counts
            .insert("ghost".to_string(), VariantCount::default());
        assert!(matches!(
            analyzer().run(&unknown),
            Err(EngineError::UnknownVariant(id)) if id == "ghost"
        ));

        let mut empty = input(&[]);
        empty.variants.clear();
        assert_eq!(analyzer().run(&empty).unwrap_err(), EngineError::NoVariants);
    }

    #[test]
    fn test_seeded_reports_repeat() {
        let data = input(&[("control", 480, 9_000), ("treatment", 530, 9_100)]);
        let a = analyzer().run(&data).unwrap();
        let b = analyzer().run(&data).unwrap();
        assert_eq!(a.bayesian, b.bayesian);
        assert_eq!(a.decision, b.decision);
    }

    #[test]
    fn test_decision_serialization() {
        let json = serde_json::to_string(&Decision::DeclareWinner("v2".to_string())).unwrap();
        assert_eq!(json, r#"{"decision":"declare_winner","variant_id":"v2"}"#);
        let json = serde_json::to_string(&Decision::KeepRunning).unwrap();
        assert_eq!(json, r#"{"decision":"keep_running"}"#);
    }

    #[test]
    fn test_analyze_with_injected_rng() {
        let data = input(&[("control", 500, 10_000), ("treatment", 520, 10_000)]);
        let report = analyzer().analyze(&data, &mut engine_rng(Some(1))).unwrap();
        assert_eq!(report.bayesian.simulations, 10_000);
        assert_eq!(report.comparisons.len(), 1);
    }
}
