//! Natural-parameter continuation of a witness pair in one rate constant.
//!
//! Both states are followed with multiplicative steps `k *= step_factor` upwards and
//! `k /= step_factor` downwards, each solve warm-started from the previous point and
//! keeping the totals of the pair. The bracket `[lower, upper]` is the last parameter
//! value on each side at which the two branches were still distinct.
use super::multistart::WitnessPair;
use super::search_config::SearchConfig;
use super::steady_state::{SolveOutcome, SteadyStateProblem, relative_separation};
use crate::ReactionNetwork::matrices::NetworkMatrices;
use crate::crn_error::{CrnError, CrnResult};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContinuationConfig {
    pub enabled: bool,
    /// reaction id of the continued rate constant; chosen automatically when absent
    pub parameter: Option<String>,
    pub step_factor: f64,
    pub max_steps: usize,
}

impl Default for ContinuationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            parameter: None,
            step_factor: 1.1,
            max_steps: 40,
        }
    }
}

impl ContinuationConfig {
    pub fn validate(&self) -> CrnResult<()> {
        if !(self.step_factor > 1.0 && self.step_factor.is_finite()) {
            return Err(CrnError::ConfigError(format!(
                "continuation step_factor must exceed 1, got {}",
                self.step_factor
            )));
        }
        if self.max_steps == 0 {
            return Err(CrnError::ConfigError(
                "continuation max_steps must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    BranchesMerged,
    SolveFailed,
    StepBudget,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BistableRange {
    pub reaction_id: String,
    pub base_value: f64,
    pub lower: f64,
    pub upper: f64,
    pub lower_stop: StopReason,
    pub upper_stop: StopReason,
    pub steps: usize,
}

impl BistableRange {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

struct Branches {
    first: Vec<f64>,
    second: Vec<f64>,
}

pub struct Continuation<'a> {
    matrices: &'a NetworkMatrices,
    pair: &'a WitnessPair,
    search: &'a SearchConfig,
    config: &'a ContinuationConfig,
}

impl<'a> Continuation<'a> {
    pub fn new(
        matrices: &'a NetworkMatrices,
        pair: &'a WitnessPair,
        search: &'a SearchConfig,
        config: &'a ContinuationConfig,
    ) -> Self {
        Self {
            matrices,
            pair,
            search,
            config,
        }
    }

    /// `Ok(None)` when no rate constant can be moved without losing a branch.
    pub fn run(&self) -> CrnResult<Option<BistableRange>> {
        let reaction = match &self.config.parameter {
            Some(id) => Some(
                self.pair
                    .reactions
                    .iter()
                    .position(|r| r == id)
                    .ok_or_else(|| {
                        CrnError::ConfigError(format!(
                            "continuation parameter '{}' is not a reaction of this network",
                            id
                        ))
                    })?,
            ),
            None => self.most_sensitive_reaction(),
        };
        let Some(j) = reaction else {
            info!("continuation: no rate constant keeps both branches");
            return Ok(None);
        };
        let base_value = self.pair.rate_constants[j];
        let (upper, upper_stop, up_steps) = self.march(j, self.config.step_factor);
        let (lower, lower_stop, down_steps) = self.march(j, 1.0 / self.config.step_factor);
        let range = BistableRange {
            reaction_id: self.pair.reactions[j].clone(),
            base_value,
            lower,
            upper,
            lower_stop,
            upper_stop,
            steps: up_steps + down_steps,
        };
        info!(
            "continuation in k_{}: two states on [{:.4e}, {:.4e}] around {:.4e}",
            range.reaction_id, range.lower, range.upper, range.base_value
        );
        Ok(Some(range))
    }

    fn deadline(&self) -> Instant {
        Instant::now() + Duration::from_millis(self.search.trial_timeout_ms)
    }

    /// Solves both branches at rate constants `k`, warm-started from `from`.
    fn follow(&self, k: &[f64], from: &Branches) -> Option<Branches> {
        let problem = SteadyStateProblem::new(self.matrices, k, &self.pair.first.concentrations);
        let tolerance = self.search.tolerances.residual_tolerance;
        let solve = |x0: &[f64]| match problem.solve(
            x0,
            tolerance,
            self.search.max_iterations,
            self.deadline(),
        ) {
            Ok(SolveOutcome::Converged { x, .. }) => Some(x),
            Ok(SolveOutcome::Failed { reason }) => {
                debug!("continuation solve failed: {:?}", reason);
                None
            }
            Err(e) => {
                debug!("continuation solve discarded: {}", e);
                None
            }
        };
        let first = solve(&from.first)?;
        let second = solve(&from.second)?;
        Some(Branches { first, second })
    }

    fn start(&self) -> Branches {
        Branches {
            first: self.pair.first.concentrations.clone(),
            second: self.pair.second.concentrations.clone(),
        }
    }

    /// Reaction whose one-step scaling changes the separation the most.
    fn most_sensitive_reaction(&self) -> Option<usize> {
        let start = self.start();
        let mut best: Option<(usize, f64)> = None;
        for j in 0..self.pair.rate_constants.len() {
            let mut k = self.pair.rate_constants.clone();
            k[j] *= self.config.step_factor;
            if let Some(next) = self.follow(&k, &start) {
                let change = (relative_separation(&next.first, &next.second)
                    - self.pair.separation)
                    .abs();
                if best.is_none_or(|(_, c)| change > c) {
                    best = Some((j, change));
                }
            }
        }
        best.map(|(j, _)| j)
    }

    fn march(&self, j: usize, factor: f64) -> (f64, StopReason, usize) {
        let mut k = self.pair.rate_constants.clone();
        let mut last_good = k[j];
        let mut branches = self.start();
        for step in 1..=self.config.max_steps {
            k[j] *= factor;
            let Some(next) = self.follow(&k, &branches) else {
                return (last_good, StopReason::SolveFailed, step);
            };
            if relative_separation(&next.first, &next.second)
                <= self.search.tolerances.min_separation
            {
                return (last_good, StopReason::BranchesMerged, step);
            }
            last_good = k[j];
            branches = next;
        }
        (last_good, StopReason::StepBudget, self.config.max_steps)
    }
}
