//! Multistart search for two distinct positive steady states sharing rate constants and
//! conservation totals.
//!
//! Trial `i` owns a `StdRng` seeded with `seed + i`: it draws rate constants, a state
//! fixing the totals and a set of initial guesses, then solves from every guess. Trials
//! run in parallel; the lowest successful index wins, and a trial is skipped only when a
//! lower index has already succeeded, so the reported witness does not depend on
//! scheduling.
use super::continuation::BistableRange;
use super::sampling::{SeedPoint, log_normal_around, sample_log_uniform, spread_guess};
use super::search_config::{SearchConfig, Tolerances};
use super::steady_state::{
    FailureReason, SolveOutcome, Stability, SteadyStateProblem, local_stability,
    relative_separation,
};
use crate::ReactionNetwork::matrices::NetworkMatrices;
use crate::crn_error::CrnError;
use log::{debug, info};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SteadyState {
    pub concentrations: Vec<f64>,
    /// scaled residual max-norm
    pub residual: f64,
    pub iterations: usize,
    pub stability: Stability,
    /// eigenvalues `(re, im)` on the stoichiometric subspace
    pub eigenvalues: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WitnessPair {
    pub species: Vec<String>,
    pub reactions: Vec<String>,
    pub rate_constants: Vec<f64>,
    /// conservation totals `W x` shared by both states
    pub totals: Vec<f64>,
    pub first: SteadyState,
    pub second: SteadyState,
    pub separation: f64,
    /// largest relative deviation of either state from the shared totals
    pub conservation_defect: f64,
    pub trial: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum WitnessOutcome {
    WitnessFound(WitnessPair),
    /// search exhausted; says nothing about non-existence
    NoWitnessFound,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WitnessSearchResult {
    pub outcome: WitnessOutcome,
    pub tolerances: Tolerances,
    pub seed: u64,
    /// trials up to and including the winner (all trials when none succeeded)
    pub attempts: usize,
    pub converged_solves: usize,
    pub failed_solves: usize,
    pub timed_out_trials: usize,
    /// solves discarded for leaving the admissible range
    pub unstable_solves: usize,
    pub certificate_guided: bool,
    pub continuation: Option<BistableRange>,
}

impl WitnessSearchResult {
    pub fn witness(&self) -> Option<&WitnessPair> {
        match &self.outcome {
            WitnessOutcome::WitnessFound(pair) => Some(pair),
            WitnessOutcome::NoWitnessFound => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct TrialReport {
    pair: Option<WitnessPair>,
    converged: usize,
    failed: usize,
    timed_out: bool,
    unstable: usize,
}

pub struct WitnessSearchEngine<'a> {
    matrices: &'a NetworkMatrices,
    species: Vec<String>,
    reactions: Vec<String>,
    config: &'a SearchConfig,
    seed_point: Option<SeedPoint>,
}

impl<'a> WitnessSearchEngine<'a> {
    pub fn new(
        matrices: &'a NetworkMatrices,
        species: Vec<String>,
        reactions: Vec<String>,
        config: &'a SearchConfig,
    ) -> Self {
        Self {
            matrices,
            species,
            reactions,
            config,
            seed_point: None,
        }
    }

    /// Odd trials sample around this point instead of the global ranges.
    pub fn with_seed_point(mut self, seed_point: Option<SeedPoint>) -> Self {
        self.seed_point = seed_point;
        self
    }

    pub fn search(&self) -> WitnessSearchResult {
        let n = self.config.n_trials;
        let reports: Vec<Option<TrialReport>> = if self.config.parallel {
            let best = AtomicUsize::new(usize::MAX);
            (0..n)
                .into_par_iter()
                .map(|i| {
                    if best.load(Ordering::Relaxed) < i {
                        return None;
                    }
                    let report = self.run_trial(i);
                    if report.pair.is_some() {
                        best.fetch_min(i, Ordering::Relaxed);
                    }
                    Some(report)
                })
                .collect()
        } else {
            let mut reports = Vec::with_capacity(n);
            for i in 0..n {
                let report = self.run_trial(i);
                let done = report.pair.is_some();
                reports.push(Some(report));
                if done {
                    break;
                }
            }
            reports
        };

        let winner = reports
            .iter()
            .position(|r| r.as_ref().is_some_and(|r| r.pair.is_some()));
        let counted = winner.map(|w| w + 1).unwrap_or(reports.len());
        let mut result = WitnessSearchResult {
            outcome: WitnessOutcome::NoWitnessFound,
            tolerances: self.config.tolerances,
            seed: self.config.seed,
            attempts: counted,
            converged_solves: 0,
            failed_solves: 0,
            timed_out_trials: 0,
            unstable_solves: 0,
            certificate_guided: self.seed_point.is_some(),
            continuation: None,
        };
        for report in reports.into_iter().take(counted).flatten() {
            result.converged_solves += report.converged;
            result.failed_solves += report.failed;
            result.unstable_solves += report.unstable;
            if report.timed_out {
                result.timed_out_trials += 1;
            }
            if let Some(pair) = report.pair {
                result.outcome = WitnessOutcome::WitnessFound(pair);
            }
        }
        match &result.outcome {
            WitnessOutcome::WitnessFound(pair) => info!(
                "witness found in trial {} (separation {:.3e}, {} attempts)",
                pair.trial, pair.separation, result.attempts
            ),
            WitnessOutcome::NoWitnessFound => info!(
                "no witness after {} trials ({} converged, {} failed, {} discarded)",
                result.attempts, result.converged_solves, result.failed_solves, result.unstable_solves
            ),
        }
        result
    }

    fn run_trial(&self, index: usize) -> TrialReport {
        let config = self.config;
        let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(index as u64));
        let s = self.matrices.n_species();
        let r = self.matrices.n_reactions();
        let (rate_constants, reference) = match (&self.seed_point, index % 2 == 1) {
            (Some(seed), true) => (
                log_normal_around(&mut rng, &seed.rate_constants, config.certificate_spread),
                log_normal_around(&mut rng, &seed.concentrations, config.certificate_spread),
            ),
            _ => (
                sample_log_uniform(&mut rng, r, config.rate_range),
                sample_log_uniform(&mut rng, s, config.concentration_range),
            ),
        };
        let mut guesses = vec![reference.clone()];
        for _ in 1..config.guesses_per_trial {
            guesses.push(spread_guess(&mut rng, &reference, config.guess_spread));
        }

        let problem = SteadyStateProblem::new(self.matrices, &rate_constants, &reference);
        let deadline = Instant::now() + Duration::from_millis(config.trial_timeout_ms);
        let tolerance = config.tolerances.residual_tolerance;
        let mut report = TrialReport::default();
        let mut roots: Vec<(Vec<f64>, f64, usize)> = Vec::new();
        for guess in &guesses {
            match problem.solve(guess, tolerance, config.max_iterations, deadline) {
                Ok(SolveOutcome::Converged {
                    x,
                    residual,
                    iterations,
                }) => {
                    report.converged += 1;
                    roots.push((x, residual, iterations));
                }
                Ok(SolveOutcome::Failed {
                    reason: FailureReason::TimedOut,
                }) => {
                    report.timed_out = true;
                    break;
                }
                Ok(SolveOutcome::Failed { .. }) => report.failed += 1,
                Err(CrnError::NumericalInstability(msg)) => {
                    debug!("trial {}: discarded solve ({})", index, msg);
                    report.unstable += 1;
                }
                Err(e) => {
                    debug!("trial {}: solver error {}", index, e);
                    report.failed += 1;
                }
            }
        }
        report.pair = self.best_pair(index, &problem, &roots);
        report
    }

    /// The two most separated roots, if they are distinct and share their totals.
    fn best_pair(
        &self,
        trial: usize,
        problem: &SteadyStateProblem,
        roots: &[(Vec<f64>, f64, usize)],
    ) -> Option<WitnessPair> {
        let tolerances = &self.config.tolerances;
        let mut best: Option<(usize, usize, f64)> = None;
        for a in 0..roots.len() {
            for b in a + 1..roots.len() {
                let sep = relative_separation(&roots[a].0, &roots[b].0);
                if best.is_none_or(|(_, _, s)| sep > s) {
                    best = Some((a, b, sep));
                }
            }
        }
        let (a, b, separation) = best?;
        if separation <= tolerances.min_separation {
            return None;
        }
        let defect = problem
            .conservation_defect(&roots[a].0)
            .max(problem.conservation_defect(&roots[b].0));
        if defect > tolerances.conservation_tolerance {
            return None;
        }
        let (lo, hi) = if roots[a].0.iter().sum::<f64>() <= roots[b].0.iter().sum::<f64>() {
            (a, b)
        } else {
            (b, a)
        };
        let state = |i: usize| {
            let (stability, eigenvalues) =
                local_stability(self.matrices, problem.rate_constants(), &roots[i].0);
            SteadyState {
                concentrations: roots[i].0.clone(),
                residual: roots[i].1,
                iterations: roots[i].2,
                stability,
                eigenvalues,
            }
        };
        Some(WitnessPair {
            species: self.species.clone(),
            reactions: self.reactions.clone(),
            rate_constants: problem.rate_constants().to_vec(),
            totals: problem.totals().iter().cloned().collect(),
            first: state(lo),
            second: state(hi),
            separation,
            conservation_defect: defect,
            trial,
        })
    }
}
