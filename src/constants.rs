//! Documented constants for the decision engine
//!
//! Every tunable default lives here with the reasoning behind its value.
//! Centralizing constants prevents magic numbers and keeps the statistical
//! conventions consistent across the frequentist and Bayesian layers.

// =============================================================================
// TRAFFIC SPLIT CONSTANTS
// =============================================================================

/// Total percentage a traffic split must add up to
pub const SPLIT_TOTAL: f64 = 100.0;

/// Absolute tolerance when checking that a split sums to 100
///
/// Splits are authored with two decimals, so 33.33/33.33/33.34 has to pass
/// after f64 summation error. Anything further off is a configuration bug.
pub const SPLIT_SUM_TOLERANCE: f64 = 0.01;

/// Number of distinct buckets a visitor hash is reduced to
///
/// 10 000 buckets gives two-decimal percentage granularity (`bucket / 100`),
/// matching the precision splits are authored with.
pub const BUCKET_COUNT: u32 = 10_000;

/// Divisor turning a bucket index into a percentage in `[0, 100)`
pub const BUCKET_SCALE: f64 = 100.0;

// =============================================================================
// FREQUENTIST CONSTANTS
// =============================================================================

/// Default significance level (p < 0.05)
pub const DEFAULT_SIGNIFICANCE_LEVEL: f64 = 0.05;

/// Default confidence level for intervals
///
/// Intervals are reported at 90%, which is also the fallback critical value
/// for any level outside the lookup table.
pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.90;

/// Critical value used for any confidence level not in the lookup table
pub const DEFAULT_CRITICAL_VALUE: f64 = 1.645;

/// Two-sided confidence level -> z critical value
pub const CRITICAL_VALUES: [(f64, f64); 3] = [(0.90, 1.645), (0.95, 1.96), (0.99, 2.576)];

/// z for alpha = 0.05 (two-sided) used by sample-size planning
pub const SAMPLE_SIZE_Z_ALPHA: f64 = 1.96;

/// z for 80% power used by sample-size planning
pub const SAMPLE_SIZE_Z_BETA: f64 = 0.84;

/// Default statistical power for sample-size planning
pub const DEFAULT_POWER: f64 = 0.8;

/// Minimum impressions per arm before a winner may be declared
///
/// Below this, a handful of conversions can swing both the z-test and the
/// posterior far enough to trigger a false stop.
pub const MIN_SAMPLE_SIZE: u64 = 100;

/// Default relative minimum detectable effect (10% lift)
pub const DEFAULT_MIN_DETECTABLE_EFFECT: f64 = 0.10;

// =============================================================================
// BAYESIAN CONSTANTS
// =============================================================================

/// Monte-Carlo trials per analysis
///
/// 10 000 trials put the standard error of a probability estimate near
/// 0.5 / sqrt(10 000) = 0.005 in the worst case, well inside the distance
/// between a 0.95 threshold and a meaningful "not yet" answer.
pub const DEFAULT_SIMULATIONS: u64 = 10_000;

/// Probability-to-be-best required to recommend stopping
pub const DEFAULT_PROBABILITY_THRESHOLD: f64 = 0.95;

/// Expected loss (absolute conversion-rate points) tolerated when stopping
///
/// 0.001 = 0.1 percentage points of conversion rate.
pub const DEFAULT_LOSS_THRESHOLD: f64 = 0.001;

/// Upper bound on Monte-Carlo trials per analysis
///
/// Ten million trials already put the standard error near 1.6e-4; larger
/// values only burn CPU and memory for the chunk plan.
pub const MAX_SIMULATIONS: u64 = 10_000_000;

/// Trials per worker chunk for data-parallel simulation
pub const SIMULATION_CHUNK_SIZE: u64 = 8_192;

/// Trial count at which simulations are spread across the rayon pool
///
/// The default 10 000-trial analysis takes around a millisecond on one
/// core, so only large batch analyses pay the fork/join overhead.
pub const DEFAULT_PARALLEL_THRESHOLD: u64 = 100_000;

// =============================================================================
// DATA QUALITY CONSTANTS
// =============================================================================

/// Significance level for the sample-ratio-mismatch test
///
/// SRM is checked at a much stricter level than the experiment itself:
/// a false SRM alarm blocks a decision, so it needs strong evidence.
pub const DEFAULT_SRM_ALPHA: f64 = 0.001;
