//! Configuration for the decision engine
//!
//! All tunable parameters in one place with environment variable overrides.
//! Build one [`EngineConfig`] at process start and pass it by reference.

use std::env;
use std::str::FromStr;

use anyhow::Context;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::constants::{
    CRITICAL_VALUES, DEFAULT_CONFIDENCE_LEVEL, DEFAULT_LOSS_THRESHOLD,
    DEFAULT_MIN_DETECTABLE_EFFECT, DEFAULT_PARALLEL_THRESHOLD, DEFAULT_PROBABILITY_THRESHOLD,
    DEFAULT_SIGNIFICANCE_LEVEL, DEFAULT_SIMULATIONS, DEFAULT_SRM_ALPHA, MAX_SIMULATIONS,
    MIN_SAMPLE_SIZE,
};
use crate::errors::{EngineError, Result};
use crate::sampling::engine_rng;

/// Engine configuration loaded from environment with defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Monte-Carlo trials per Bayesian analysis (default: 10000)
    pub simulations: u64,

    /// Probability-to-be-best needed to stop (default: 0.95)
    pub probability_threshold: f64,

    /// Maximum expected loss tolerated when stopping (default: 0.001)
    pub loss_threshold: f64,

    /// Frequentist alpha (default: 0.05)
    pub significance_level: f64,

    /// Confidence level for reported intervals (default: 0.90)
    pub confidence_level: f64,

    /// Impressions each arm needs before a decision (default: 100)
    pub min_sample_size: u64,

    /// Relative lift the experiment is powered to detect (default: 0.10)
    pub min_detectable_effect: f64,

    /// Alpha for the sample-ratio-mismatch check (default: 0.001)
    pub srm_alpha: f64,

    /// Trial count at which simulation runs on the rayon pool (default: 100000)
    pub parallel_threshold: u64,

    /// Fixed RNG seed; `None` draws from OS entropy (default: None)
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            simulations: DEFAULT_SIMULATIONS,
            probability_threshold: DEFAULT_PROBABILITY_THRESHOLD,
            loss_threshold: DEFAULT_LOSS_THRESHOLD,
            significance_level: DEFAULT_SIGNIFICANCE_LEVEL,
            confidence_level: DEFAULT_CONFIDENCE_LEVEL,
            min_sample_size: MIN_SAMPLE_SIZE,
            min_detectable_effect: DEFAULT_MIN_DETECTABLE_EFFECT,
            srm_alpha: DEFAULT_SRM_ALPHA,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
            seed: None,
        }
    }
}

fn parse_var<T>(key: &str, raw: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .with_context(|| format!("{key}={raw:?} is not a valid value"))
}

/// Read and parse an env var, warning and ignoring it when malformed
fn env_override<T>(key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = env::var(key).ok()?;
    match parse_var(key, &raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring {}: {:#}", key, e);
            None
        }
    }
}

fn unit_interval(field: &str, value: f64) -> Result<()> {
    if value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(EngineError::config(
            field,
            format!("must be strictly between 0 and 1, got {value}"),
        ))
    }
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults
    #[allow(clippy::field_reassign_with_default)] // Environment overrides require mutable config
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(n) = env_override("EXPERIMENT_SIMULATIONS") {
            config.simulations = n;
        }

        if let Some(p) = env_override("EXPERIMENT_PROBABILITY_THRESHOLD") {
            config.probability_threshold = p;
        }

        if let Some(l) = env_override("EXPERIMENT_LOSS_THRESHOLD") {
            config.loss_threshold = l;
        }

        if let Some(a) = env_override("EXPERIMENT_SIGNIFICANCE_LEVEL") {
            config.significance_level = a;
        }

        if let Some(level) = env_override::<f64>("EXPERIMENT_CONFIDENCE_LEVEL") {
            if !CRITICAL_VALUES.iter().any(|(l, _)| (l - level).abs() < 1e-9) {
                warn!(
                    "EXPERIMENT_CONFIDENCE_LEVEL={} has no tabulated critical value, intervals will use z=1.645",
                    level
                );
            }
            config.confidence_level = level;
        }

        if let Some(n) = env_override("EXPERIMENT_MIN_SAMPLE_SIZE") {
            config.min_sample_size = n;
        }

        if let Some(mde) = env_override("EXPERIMENT_MIN_DETECTABLE_EFFECT") {
            config.min_detectable_effect = mde;
        }

        if let Some(a) = env_override("EXPERIMENT_SRM_ALPHA") {
            config.srm_alpha = a;
        }

        if let Some(n) = env_override("EXPERIMENT_PARALLEL_THRESHOLD") {
            config.parallel_threshold = n;
        }

        if let Some(seed) = env_override("EXPERIMENT_SEED") {
            config.seed = Some(seed);
        }

        config
    }

    /// Reject values the analyzers cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.simulations == 0 {
            return Err(EngineError::config("simulations", "must be greater than 0"));
        }
        if self.simulations > MAX_SIMULATIONS {
            return Err(EngineError::config(
                "simulations",
                format!("must be at most {MAX_SIMULATIONS}, got {}", self.simulations),
            ));
        }
        unit_interval("probability_threshold", self.probability_threshold)?;
        unit_interval("significance_level", self.significance_level)?;
        unit_interval("confidence_level", self.confidence_level)?;
        unit_interval("srm_alpha", self.srm_alpha)?;
        if !(self.loss_threshold >= 0.0 && self.loss_threshold.is_finite()) {
            return Err(EngineError::config(
                "loss_threshold",
                format!("must be a non-negative number, got {}", self.loss_threshold),
            ));
        }
        if !(self.min_detectable_effect > 0.0 && self.min_detectable_effect.is_finite()) {
            return Err(EngineError::config(
                "min_detectable_effect",
                format!("must be positive, got {}", self.min_detectable_effect),
            ));
        }
        Ok(())
    }

    /// RNG for Monte-Carlo analyses: seeded when `seed` is set
    pub fn rng(&self) -> StdRng {
        engine_rng(self.seed)
    }

    /// Log the current configuration
    pub fn log(&self) {
        info!("Experiment engine configuration:");
        info!("   Simulations: {}", self.simulations);
        info!(
            "   Stop thresholds: P(best) >= {:.3}, expected loss <= {}",
            self.probability_threshold, self.loss_threshold
        );
        info!(
            "   Frequentist: alpha={}, CI level={}",
            self.significance_level, self.confidence_level
        );
        info!(
            "   Min sample size: {} per arm (MDE {:.1}%)",
            self.min_sample_size,
            self.min_detectable_effect * 100.0
        );
        info!("   SRM alpha: {}", self.srm_alpha);
        info!("   Parallel threshold: {} trials", self.parallel_threshold);
        match self.seed {
            Some(seed) => info!("   RNG: seeded ({})", seed),
            None => info!("   RNG: OS entropy"),
        }
    }
}

/// Environment variable documentation
#[allow(unused)] // Public API - available for host CLI help output
pub fn print_env_help() {
    println!("Experiment Engine Configuration Environment Variables:");
    println!();
    println!("  EXPERIMENT_SIMULATIONS            - Monte-Carlo trials per analysis, at most 10000000 (default: 10000)");
    println!("  EXPERIMENT_PROBABILITY_THRESHOLD  - P(best) required to stop (default: 0.95)");
    println!("  EXPERIMENT_LOSS_THRESHOLD         - Max expected loss to stop (default: 0.001)");
    println!("  EXPERIMENT_SIGNIFICANCE_LEVEL     - z-test alpha (default: 0.05)");
    println!("  EXPERIMENT_CONFIDENCE_LEVEL       - Interval level: 0.90, 0.95, 0.99 (default: 0.90)");
    println!("  EXPERIMENT_MIN_SAMPLE_SIZE        - Impressions per arm before deciding (default: 100)");
    println!("  EXPERIMENT_MIN_DETECTABLE_EFFECT  - Relative lift for power planning (default: 0.10)");
    println!("  EXPERIMENT_SRM_ALPHA              - Sample-ratio-mismatch alpha (default: 0.001)");
    println!("  EXPERIMENT_PARALLEL_THRESHOLD     - Trials at which simulation goes parallel (default: 100000)");
    println!("  EXPERIMENT_SEED                   - Fixed RNG seed for reproducible runs (default: unset)");
    println!();
    println!("  RUST_LOG                          - Log level (e.g., info, debug, trace)");
    println!();
}
