//! Combining per-unit verdicts into one classification of the network.
//!
//! Precedence:
//! 1. a unit without positive steady states makes the whole network injective;
//! 2. unit witnesses are lifted to the whole network in unit order (other units solved at their own
//!    sampled rate constants), giving `MultistabilityConfirmed` or `WitnessNotLifted`;
//! 3. otherwise the weakest unit decides: solver unavailable, unresolved general approach,
//!    feasible sign change without witness;
//! 4. all units injective gives `Injective`.
use crate::Decomposition::decomposer::{Decomposition, DecompositionUnit, InjectivityBasis};
use crate::ReactionNetwork::matrices::NetworkMatrices;
use crate::ReactionNetwork::network::Network;
use crate::SignConditions::sign_solver::SignReport;
use crate::WitnessSearch::multistart::{WitnessPair, WitnessSearchResult};
use crate::WitnessSearch::sampling::{sample_log_uniform, spread_guess};
use crate::WitnessSearch::search_config::{SearchConfig, Tolerances};
use crate::WitnessSearch::steady_state::{
    SolveOutcome, Stability, SteadyStateProblem, local_stability, relative_separation,
};
use crate::crn_error::CrnResult;
use log::{debug, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use std::time::{Duration, Instant};

/// offset separating the generators used for lifting from those of the search trials
const LIFT_SEED_OFFSET: u64 = 1 << 32;
const LIFT_TRIALS: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum UnitVerdict {
    Injective { basis: InjectivityBasis },
    Multistable,
    FeasibleButNoWitness,
    Undetermined { reason: String },
    SolverUnavailable { message: String },
}

/// Everything computed for one unit.
#[derive(Debug, Clone, Serialize)]
pub struct UnitEvaluation {
    pub unit: usize,
    pub sign: Option<SignReport>,
    pub search: Option<WitnessSearchResult>,
    pub verdict: UnitVerdict,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum InconclusiveReason {
    FeasibleButNoWitness,
    GeneralApproachUnresolved,
    SolverUnavailable(String),
    WitnessNotLifted,
}

impl InconclusiveReason {
    pub fn describe(&self) -> String {
        match self {
            InconclusiveReason::FeasibleButNoWitness => {
                "sign change feasible but no witness found".to_string()
            }
            InconclusiveReason::GeneralApproachUnresolved => {
                "general approach could not decide the sign condition".to_string()
            }
            InconclusiveReason::SolverUnavailable(msg) => format!("solver unavailable ({})", msg),
            InconclusiveReason::WitnessNotLifted => {
                "unit witness could not be extended to the whole network".to_string()
            }
        }
    }
}

/// Two steady states of the whole network at common rate constants and totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkWitness {
    pub species: Vec<String>,
    pub reactions: Vec<String>,
    pub rate_constants: Vec<f64>,
    pub totals: Vec<f64>,
    pub first: Vec<f64>,
    pub second: Vec<f64>,
    pub first_stability: Stability,
    pub second_stability: Stability,
    pub residuals: (f64, f64),
    pub conservation_defect: f64,
    pub separation: f64,
    /// unit in which the pair was found
    pub unit: usize,
    pub tolerances: Tolerances,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Classification {
    Injective,
    MultistabilityConfirmed(NetworkWitness),
    Inconclusive(InconclusiveReason),
}

impl Classification {
    pub fn name(&self) -> &'static str {
        match self {
            Classification::Injective => "Injective",
            Classification::MultistabilityConfirmed(_) => "MultistabilityConfirmed",
            Classification::Inconclusive(_) => "Inconclusive",
        }
    }
}

pub struct Aggregator<'a> {
    network: &'a Network,
    decomposition: &'a Decomposition,
    search: &'a SearchConfig,
}

impl<'a> Aggregator<'a> {
    pub fn new(network: &'a Network, decomposition: &'a Decomposition, search: &'a SearchConfig) -> Self {
        Self {
            network,
            decomposition,
            search,
        }
    }

    /// Classification and its confidence statement.
    pub fn aggregate(&self, evaluations: &[UnitEvaluation]) -> CrnResult<(Classification, String)> {
        let tolerances = &self.search.tolerances;
        if let Some(e) = evaluations.iter().find(|e| {
            matches!(&e.verdict, UnitVerdict::Injective { basis } if !basis.admits_positive_steady_state())
        }) {
            return Ok((
                Classification::Injective,
                format!(
                    "proven injective: unit {} admits no positive steady state (deficiency zero, not weakly reversible)",
                    e.unit
                ),
            ));
        }

        let witnesses: Vec<(usize, &WitnessPair)> = evaluations
            .iter()
            .filter_map(|e| e.search.as_ref().and_then(|s| s.witness()).map(|pair| (e.unit, pair)))
            .collect();
        if !witnesses.is_empty() {
            for (unit, pair) in &witnesses {
                if let Some(witness) = self.lift(*unit, pair)? {
                    let text = format!(
                        "witness found with tolerance {:e} (residual), separation > {:e}, conservation within {:e}",
                        tolerances.residual_tolerance,
                        tolerances.min_separation,
                        tolerances.conservation_tolerance
                    );
                    return Ok((Classification::MultistabilityConfirmed(witness), text));
                }
                debug!("witness of unit {} could not be lifted, trying the next unit", unit);
            }
            let reason = InconclusiveReason::WitnessNotLifted;
            let text = format!(
                "inconclusive: {} ({} unit witnesses tried)",
                reason.describe(),
                witnesses.len()
            );
            return Ok((Classification::Inconclusive(reason), text));
        }

        let reason = evaluations.iter().find_map(|e| match &e.verdict {
            UnitVerdict::SolverUnavailable { message } => {
                Some(InconclusiveReason::SolverUnavailable(message.clone()))
            }
            _ => None,
        });
        let reason = reason
            .or_else(|| {
                evaluations
                    .iter()
                    .any(|e| matches!(e.verdict, UnitVerdict::Undetermined { .. }))
                    .then_some(InconclusiveReason::GeneralApproachUnresolved)
            })
            .or_else(|| {
                evaluations
                    .iter()
                    .any(|e| matches!(e.verdict, UnitVerdict::FeasibleButNoWitness))
                    .then_some(InconclusiveReason::FeasibleButNoWitness)
            });
        if let Some(reason) = reason {
            let mut text = format!("inconclusive: {}", reason.describe());
            if matches!(reason, InconclusiveReason::FeasibleButNoWitness) {
                let attempts: usize = evaluations
                    .iter()
                    .filter_map(|e| e.search.as_ref().map(|s| s.attempts))
                    .sum();
                text.push_str(&format!(" after {} trials", attempts));
            }
            return Ok((Classification::Inconclusive(reason), text));
        }

        let bases: Vec<String> = evaluations
            .iter()
            .filter_map(|e| match &e.verdict {
                UnitVerdict::Injective { basis } => {
                    Some(format!("unit {}: {}", e.unit, basis.describe()))
                }
                _ => None,
            })
            .collect();
        Ok((
            Classification::Injective,
            format!("proven injective: {}", bases.join("; ")),
        ))
    }

    /// One positive steady state of `unit` at freshly sampled rate constants.
    fn steady_state_of(&self, unit: &DecompositionUnit) -> Option<(Vec<f64>, Vec<f64>)> {
        let m = &unit.matrices;
        let config = self.search;
        for trial in 0..LIFT_TRIALS {
            let seed = config
                .seed
                .wrapping_add(LIFT_SEED_OFFSET)
                .wrapping_add((unit.index * LIFT_TRIALS + trial) as u64);
            let mut rng = StdRng::seed_from_u64(seed);
            let k = sample_log_uniform(&mut rng, m.n_reactions(), config.rate_range);
            let reference = sample_log_uniform(&mut rng, m.n_species(), config.concentration_range);
            let problem = SteadyStateProblem::new(m, &k, &reference);
            let deadline = Instant::now() + Duration::from_millis(config.trial_timeout_ms);
            for g in 0..config.guesses_per_trial {
                let guess = if g == 0 {
                    reference.clone()
                } else {
                    spread_guess(&mut rng, &reference, config.guess_spread)
                };
                if let Ok(SolveOutcome::Converged { x, .. }) = problem.solve(
                    &guess,
                    config.tolerances.residual_tolerance,
                    config.max_iterations,
                    deadline,
                ) {
                    return Some((k, x));
                }
            }
        }
        None
    }

    /// Extends a unit witness to every species and reaction of the network and verifies
    /// it on the full steady-state system.
    fn lift(&self, unit_index: usize, pair: &WitnessPair) -> CrnResult<Option<NetworkWitness>> {
        let s = self.network.n_species();
        let r = self.network.n_reactions();
        // species outside every unit take part in no reaction
        let mut k = vec![0.0; r];
        let mut first = vec![1.0; s];
        let mut second = vec![1.0; s];
        for unit in &self.decomposition.units {
            let map = &unit.restricted;
            if unit.index == unit_index {
                for (local, global) in map.reaction_map.iter().enumerate() {
                    k[*global] = pair.rate_constants[local];
                }
                for (local, global) in map.species_map.iter().enumerate() {
                    first[*global] = pair.first.concentrations[local];
                    second[*global] = pair.second.concentrations[local];
                }
                continue;
            }
            let Some((unit_k, unit_x)) = self.steady_state_of(unit) else {
                warn!("lifting: no positive steady state found for unit {}", unit.index);
                return Ok(None);
            };
            for (local, global) in map.reaction_map.iter().enumerate() {
                k[*global] = unit_k[local];
            }
            for (local, global) in map.species_map.iter().enumerate() {
                first[*global] = unit_x[local];
                second[*global] = unit_x[local];
            }
        }

        let matrices = NetworkMatrices::build(self.network)?;
        let problem = SteadyStateProblem::new(&matrices, &k, &first);
        let tolerances = self.search.tolerances;
        // unit rows reappear unchanged in the full system, up to summation order
        let accept = 10.0 * tolerances.residual_tolerance;
        let residuals = (problem.residual_norm(&first), problem.residual_norm(&second));
        let defect = problem.conservation_defect(&second);
        if residuals.0 > accept || residuals.1 > accept || defect > tolerances.conservation_tolerance {
            warn!(
                "lifting: full residuals {:.2e}, {:.2e}, conservation defect {:.2e}",
                residuals.0, residuals.1, defect
            );
            return Ok(None);
        }
        let (first_stability, _) = local_stability(&matrices, &k, &first);
        let (second_stability, _) = local_stability(&matrices, &k, &second);
        info!("unit {} witness lifted to the whole network", unit_index);
        Ok(Some(NetworkWitness {
            species: self.network.species_names(),
            reactions: self.network.reaction_ids(),
            rate_constants: k,
            totals: problem.totals().iter().cloned().collect(),
            separation: relative_separation(&first, &second),
            first,
            second,
            first_stability,
            second_stability,
            residuals,
            conservation_defect: defect,
            unit: unit_index,
            tolerances,
        }))
    }
}
