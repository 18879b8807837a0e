//! Prometheus metrics for the decision engine
//!
//! Counters and histograms are process-wide; the embedding service exposes
//! [`METRICS_REGISTRY`] on its own scrape endpoint after calling
//! [`register_metrics`].
//!
//! NOTE: visitor and test ids are never used as labels, only bounded enums.

use lazy_static::lazy_static;
use prometheus::{Histogram, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

lazy_static! {
    /// Global metrics registry
    pub static ref METRICS_REGISTRY: Registry = Registry::new();

    /// Bucketing outcomes: assigned, fallback, unassigned
    pub static ref ASSIGNMENTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("experiment_assignments_total", "Visitor bucketing outcomes"),
        &["outcome"]
    ).unwrap();

    /// Monte-Carlo simulation duration
    pub static ref SIMULATION_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "experiment_simulation_duration_seconds",
            "Monte-Carlo posterior simulation duration"
        )
        .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        &["mode"]  // mode: "serial" or "parallel"
    ).unwrap();

    /// Full report build duration
    pub static ref REPORT_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "experiment_report_duration_seconds",
            "Experiment report build duration"
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0])
    ).unwrap();

    /// Report decisions: keep_running, declare_winner, inconclusive
    pub static ref REPORT_DECISIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("experiment_report_decisions_total", "Experiment report decisions"),
        &["decision"]
    ).unwrap();
}

/// Register all metrics with the global registry
pub fn register_metrics() -> Result<(), prometheus::Error> {
    METRICS_REGISTRY.register(Box::new(ASSIGNMENTS_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(SIMULATION_DURATION.clone()))?;
    METRICS_REGISTRY.register(Box::new(REPORT_DURATION.clone()))?;
    METRICS_REGISTRY.register(Box::new(REPORT_DECISIONS_TOTAL.clone()))?;
    Ok(())
}

/// Records elapsed time to a histogram when dropped
///
/// Usage: `let _timer = Timer::new(SOME_HISTOGRAM.clone());`
pub struct Timer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl Timer {
    pub fn new(histogram: Histogram) -> Self {
        Self {
            histogram,
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}
