//! Experiment Engine Library
//!
//! Deterministic A/B test bucketing and statistical decision support.
//!
//! # Key Features
//! - Hash-based visitor assignment (SHA-256, 10,000 buckets, no stored state)
//! - Traffic split validation and even-split generation
//! - Two-proportion z-test, confidence intervals, sample size planning
//! - Beta-Binomial posteriors with Monte-Carlo probability-to-be-best
//!   and expected loss, pairwise or across N variants
//! - Experiment reports with SRM detection and stop/continue decisions
//!
//! # Determinism
//! - Assignment is a pure function of (visitor id, test id, split)
//! - Every random draw goes through a caller-supplied RNG; seeded runs
//!   reproduce exactly, including parallel simulation

pub mod bayesian;
pub mod bucketing;
pub mod config;
pub mod constants;
pub mod counts;
pub mod errors;
pub mod frequentist;
pub mod metrics;
pub mod numeric;
pub mod report;
pub mod sampling;
pub mod split;
pub mod tracing_setup;

pub use bayesian::{BayesianAnalyzer, BayesianConfig, BayesianResult, BetaParameters};
pub use bucketing::{BucketAssigner, BucketAssignment, Variant};
pub use config::EngineConfig;
pub use counts::VariantCount;
pub use errors::{EngineError, Result};
pub use frequentist::{AnalysisResult, FrequentistAnalyzer};
pub use report::{Decision, ExperimentAnalyzer, ExperimentInput, ExperimentReport};
pub use split::{create_even_split, validate_split, SplitValidation, TrafficSplit};

// Re-export dependencies to ensure tests/benchmarks use the same version
pub use chrono;
pub use rand;
