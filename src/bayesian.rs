//! Bayesian analysis: Beta-Binomial posteriors and Monte-Carlo decisions
//!
//! Each variant's conversion rate gets a Beta(conversions + 1, failures + 1)
//! posterior (uniform prior). Posteriors are sampled jointly; every trial
//! credits a win to the arm with the highest draw and charges every other
//! arm the gap to that draw as loss. Probability-to-be-best and expected
//! loss both come out of the same trials.
//!
//! Large runs are split into chunks that each get their own seed drawn from
//! the caller's RNG, so a seeded analysis returns the same numbers whether
//! it ran on one thread or many.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EngineConfig;
use crate::constants::{
    DEFAULT_LOSS_THRESHOLD, DEFAULT_PARALLEL_THRESHOLD, DEFAULT_PROBABILITY_THRESHOLD,
    DEFAULT_SIMULATIONS, SIMULATION_CHUNK_SIZE,
};
use crate::counts::VariantCount;
use crate::metrics::{Timer, SIMULATION_DURATION};
use crate::numeric::ln_beta;
use crate::sampling::sample_beta;

// =============================================================================
// POSTERIORS
// =============================================================================

/// Beta posterior over a variant's conversion rate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BetaParameters {
    pub alpha: f64,
    pub beta: f64,
}

impl BetaParameters {
    /// Posterior under a uniform Beta(1, 1) prior
    pub fn from_counts(conversions: u64, impressions: u64) -> Self {
        Self {
            alpha: conversions as f64 + 1.0,
            beta: impressions.saturating_sub(conversions) as f64 + 1.0,
        }
    }

    pub fn from_count(count: &VariantCount) -> Self {
        Self::from_counts(count.conversions, count.impressions)
    }

    pub fn mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }

    pub fn variance(&self) -> f64 {
        let total = self.alpha + self.beta;
        self.alpha * self.beta / (total * total * (total + 1.0))
    }

    /// Log density at `x`; `-inf` outside (0, 1)
    pub fn ln_pdf(&self, x: f64) -> f64 {
        if !(x > 0.0 && x < 1.0) {
            return f64::NEG_INFINITY;
        }
        (self.alpha - 1.0) * x.ln() + (self.beta - 1.0) * (1.0 - x).ln()
            - ln_beta(self.alpha, self.beta)
    }

    #[inline]
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        sample_beta(rng, self.alpha, self.beta)
    }
}

// =============================================================================
// SIMULATION
// =============================================================================

/// Win counts and summed losses from a batch of trials
#[derive(Debug, Clone, PartialEq)]
struct SimulationTally {
    trials: u64,
    wins: Vec<u64>,
    loss_sums: Vec<f64>,
}

impl SimulationTally {
    fn new(arms: usize) -> Self {
        Self {
            trials: 0,
            wins: vec![0; arms],
            loss_sums: vec![0.0; arms],
        }
    }

    fn merge(mut self, other: Self) -> Self {
        self.trials += other.trials;
        for (w, o) in self.wins.iter_mut().zip(&other.wins) {
            *w += o;
        }
        for (l, o) in self.loss_sums.iter_mut().zip(&other.loss_sums) {
            *l += o;
        }
        self
    }

    fn probabilities(&self) -> Vec<f64> {
        if self.trials == 0 {
            return vec![0.0; self.wins.len()];
        }
        self.wins
            .iter()
            .map(|&w| w as f64 / self.trials as f64)
            .collect()
    }

    fn expected_losses(&self) -> Vec<f64> {
        if self.trials == 0 {
            return vec![0.0; self.loss_sums.len()];
        }
        self.loss_sums
            .iter()
            .map(|&l| l / self.trials as f64)
            .collect()
    }
}

/// Run `trials` joint draws on the calling thread
///
/// Ties go to the later arm, so in the two-arm case A only wins when its
/// draw is strictly greater than B's.
fn run_trials<R: Rng + ?Sized>(
    posteriors: &[BetaParameters],
    trials: u64,
    rng: &mut R,
) -> SimulationTally {
    let mut tally = SimulationTally::new(posteriors.len());
    if posteriors.is_empty() {
        return tally;
    }

    let mut draws = vec![0.0; posteriors.len()];
    for _ in 0..trials {
        let mut best_idx = 0;
        let mut best = f64::NEG_INFINITY;
        for (i, (slot, posterior)) in draws.iter_mut().zip(posteriors).enumerate() {
            *slot = posterior.sample(rng);
            if *slot >= best {
                best = *slot;
                best_idx = i;
            }
        }

        tally.wins[best_idx] += 1;
        for (loss, &draw) in tally.loss_sums.iter_mut().zip(&draws) {
            *loss += (best - draw).max(0.0);
        }
    }
    tally.trials = trials;
    tally
}

/// Run trials serially or, at or above `parallel_threshold`, on the rayon pool
fn simulate<R: Rng + ?Sized>(
    posteriors: &[BetaParameters],
    simulations: u64,
    parallel_threshold: u64,
    rng: &mut R,
) -> SimulationTally {
    let parallel = simulations >= parallel_threshold && simulations > SIMULATION_CHUNK_SIZE;
    let mode = if parallel { "parallel" } else { "serial" };
    let _timer = Timer::new(SIMULATION_DURATION.with_label_values(&[mode]));

    let tally = if parallel {
        let mut chunks = Vec::with_capacity((simulations / SIMULATION_CHUNK_SIZE + 1) as usize);
        let mut remaining = simulations;
        while remaining > 0 {
            let trials = remaining.min(SIMULATION_CHUNK_SIZE);
            chunks.push((rng.gen::<u64>(), trials));
            remaining -= trials;
        }

        // Collected in chunk order so float sums do not depend on scheduling
        let partials: Vec<SimulationTally> = chunks
            .into_par_iter()
            .map(|(seed, trials)| {
                let mut chunk_rng = StdRng::seed_from_u64(seed);
                run_trials(posteriors, trials, &mut chunk_rng)
            })
            .collect();

        partials
            .into_iter()
            .fold(SimulationTally::new(posteriors.len()), SimulationTally::merge)
    } else {
        run_trials(posteriors, simulations, rng)
    };

    debug!(
        arms = posteriors.len(),
        simulations,
        mode,
        "Posterior simulation finished"
    );
    tally
}

fn posteriors_of(counts: &[VariantCount]) -> Vec<BetaParameters> {
    counts.iter().map(BetaParameters::from_count).collect()
}

/// Monte-Carlo probability that A's true rate beats B's
pub fn probability_to_be_best<R: Rng + ?Sized>(
    a: &VariantCount,
    b: &VariantCount,
    simulations: u64,
    rng: &mut R,
) -> f64 {
    let posteriors = posteriors_of(&[*a, *b]);
    simulate(&posteriors, simulations, DEFAULT_PARALLEL_THRESHOLD, rng).probabilities()[0]
}

/// Monte-Carlo probability that each arm has the highest true rate
///
/// The returned probabilities sum to 1 (for a non-empty input and at least
/// one simulation).
pub fn probability_to_be_best_multi<R: Rng + ?Sized>(
    counts: &[VariantCount],
    simulations: u64,
    rng: &mut R,
) -> Vec<f64> {
    simulate(&posteriors_of(counts), simulations, DEFAULT_PARALLEL_THRESHOLD, rng).probabilities()
}

/// Expected loss of choosing A and of choosing B: `(loss_a, loss_b)`
pub fn expected_loss<R: Rng + ?Sized>(
    a: &VariantCount,
    b: &VariantCount,
    simulations: u64,
    rng: &mut R,
) -> (f64, f64) {
    let posteriors = posteriors_of(&[*a, *b]);
    let losses = simulate(&posteriors, simulations, DEFAULT_PARALLEL_THRESHOLD, rng).expected_losses();
    (losses[0], losses[1])
}

/// Expected loss per arm: mean of `max(0, best_draw - draw_i)`
pub fn expected_loss_multi<R: Rng + ?Sized>(
    counts: &[VariantCount],
    simulations: u64,
    rng: &mut R,
) -> Vec<f64> {
    simulate(&posteriors_of(counts), simulations, DEFAULT_PARALLEL_THRESHOLD, rng).expected_losses()
}

/// Closed-form P(rate_B > rate_A) for the uniform-prior posteriors
///
/// Sums `alpha_B` terms, so cost grows with B's conversion count.
pub fn probability_b_beats_a_exact(a: &VariantCount, b: &VariantCount) -> f64 {
    let pa = BetaParameters::from_count(a);
    let pb = BetaParameters::from_count(b);
    let ln_beta_a = ln_beta(pa.alpha, pa.beta);

    let total: f64 = (0..=b.conversions)
        .map(|i| {
            let i = i as f64;
            (ln_beta(pa.alpha + i, pa.beta + pb.beta)
                - (pb.beta + i).ln()
                - ln_beta(1.0 + i, pb.beta)
                - ln_beta_a)
                .exp()
        })
        .sum();

    total.clamp(0.0, 1.0)
}

// =============================================================================
// DECISIONS
// =============================================================================

/// Thresholds and effort for Bayesian decisions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BayesianConfig {
    pub simulations: u64,
    pub probability_threshold: f64,
    pub loss_threshold: f64,
    pub parallel_threshold: u64,
}

impl Default for BayesianConfig {
    fn default() -> Self {
        Self {
            simulations: DEFAULT_SIMULATIONS,
            probability_threshold: DEFAULT_PROBABILITY_THRESHOLD,
            loss_threshold: DEFAULT_LOSS_THRESHOLD,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }
}

impl From<&EngineConfig> for BayesianConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            simulations: config.simulations,
            probability_threshold: config.probability_threshold,
            loss_threshold: config.loss_threshold,
            parallel_threshold: config.parallel_threshold,
        }
    }
}

/// Which arm of a two-arm test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Arm {
    A,
    B,
}

/// Two-arm Bayesian test outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairwiseBayesianResult {
    pub probability_a_best: f64,
    pub probability_b_best: f64,
    pub expected_loss_a: f64,
    pub expected_loss_b: f64,
    /// Arm that cleared both thresholds, if any
    pub winner: Option<Arm>,
    pub should_stop: bool,
    /// max(P(A best), P(B best))
    pub confidence: f64,
}

/// Posterior summary for one arm of an N-way test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantPosterior {
    pub variant_id: String,
    pub probability_best: f64,
    pub expected_loss: f64,
    pub posterior_mean: f64,
}

/// N-way Bayesian test outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BayesianResult {
    pub variants: Vec<VariantPosterior>,
    pub recommended_variant: Option<String>,
    pub should_stop: bool,
    /// Highest probability-to-be-best among all arms
    pub confidence: f64,
    pub simulations: u64,
}

impl BayesianResult {
    pub fn variant(&self, variant_id: &str) -> Option<&VariantPosterior> {
        self.variants.iter().find(|v| v.variant_id == variant_id)
    }
}

/// Bayesian stop/continue recommendations
#[derive(Debug, Clone, Default)]
pub struct BayesianAnalyzer {
    config: BayesianConfig,
}

impl BayesianAnalyzer {
    pub fn new(config: BayesianConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BayesianConfig {
        &self.config
    }

    /// Two-arm test: stop for the arm with P(best) >= threshold and
    /// expected loss <= threshold
    pub fn test<R: Rng + ?Sized>(
        &self,
        a: &VariantCount,
        b: &VariantCount,
        rng: &mut R,
    ) -> PairwiseBayesianResult {
        let posteriors = posteriors_of(&[*a, *b]);
        let tally = simulate(
            &posteriors,
            self.config.simulations,
            self.config.parallel_threshold,
            rng,
        );
        let probs = tally.probabilities();
        let losses = tally.expected_losses();

        let clears = |i: usize| {
            tally.trials > 0
                && probs[i] >= self.config.probability_threshold
                && losses[i] <= self.config.loss_threshold
        };
        let winner = match (clears(0), clears(1)) {
            (true, true) if probs[1] > probs[0] => Some(Arm::B),
            (true, _) => Some(Arm::A),
            (false, true) => Some(Arm::B),
            (false, false) => None,
        };

        PairwiseBayesianResult {
            probability_a_best: probs[0],
            probability_b_best: probs[1],
            expected_loss_a: losses[0],
            expected_loss_b: losses[1],
            winner,
            should_stop: winner.is_some(),
            confidence: probs[0].max(probs[1]),
        }
    }

    /// N-way test over `(variant_id, counts)` arms
    ///
    /// The recommended arm is the most-likely-best among those whose
    /// expected loss is within the loss threshold; stopping additionally
    /// needs its probability to reach the probability threshold.
    pub fn test_multi<R: Rng + ?Sized>(
        &self,
        arms: &[(&str, VariantCount)],
        rng: &mut R,
    ) -> BayesianResult {
        let posteriors: Vec<BetaParameters> = arms
            .iter()
            .map(|(_, count)| BetaParameters::from_count(count))
            .collect();
        let tally = simulate(
            &posteriors,
            self.config.simulations,
            self.config.parallel_threshold,
            rng,
        );
        let probs = tally.probabilities();
        let losses = tally.expected_losses();

        let variants: Vec<VariantPosterior> = arms
            .iter()
            .zip(&posteriors)
            .enumerate()
            .map(|(i, ((id, _), posterior))| VariantPosterior {
                variant_id: id.to_string(),
                probability_best: probs[i],
                expected_loss: losses[i],
                posterior_mean: posterior.mean(),
            })
            .collect();

        let recommended = if tally.trials == 0 {
            None
        } else {
            variants
                .iter()
                .filter(|v| v.expected_loss <= self.config.loss_threshold)
                .fold(None::<&VariantPosterior>, |best, v| match best {
                    Some(b) if b.probability_best >= v.probability_best => Some(b),
                    _ => Some(v),
                })
        };

        let should_stop = recommended
            .map(|v| v.probability_best >= self.config.probability_threshold)
            .unwrap_or(false);
        let confidence = probs.iter().copied().fold(0.0, f64::max);

        BayesianResult {
            recommended_variant: recommended.map(|v| v.variant_id.clone()),
            should_stop,
            confidence,
            simulations: tally.trials,
            variants,
        }
    }
}
