//! Absolute concentration robustness.
//!
//! Two independent lines of evidence are reported:
//! - structural: a deficiency one network with two non-terminal complexes that differ
//!   only in one species has that species robust, provided a positive steady state
//!   exists (checked numerically here);
//! - numerical: for several rate-constant vectors, steady states are computed in
//!   several compatibility classes and species whose value does not move are kept.
use crate::Decomposition::deficiency::DeficiencyReport;
use crate::Decomposition::graph::ReactionGraph;
use crate::ReactionNetwork::matrices::NetworkMatrices;
use crate::ReactionNetwork::network::Network;
use crate::WitnessSearch::sampling::{log_uniform, sample_log_uniform, spread_guess};
use crate::WitnessSearch::search_config::SearchConfig;
use crate::WitnessSearch::steady_state::{SolveOutcome, SteadyStateProblem};
use crate::crn_error::{CrnError, CrnResult};
use log::{debug, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcrConfig {
    pub enabled: bool,
    pub n_rate_samples: usize,
    pub n_classes: usize,
    pub relative_tolerance: f64,
    /// rate constants held fixed across samples, by reaction id
    pub fixed_rates: BTreeMap<String, f64>,
    pub rate_range: (f64, f64),
    pub concentration_range: (f64, f64),
    /// initial guesses tried per compatibility class
    pub class_attempts: usize,
    pub seed: u64,
}

impl Default for AcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            n_rate_samples: 3,
            n_classes: 3,
            relative_tolerance: 1e-6,
            fixed_rates: BTreeMap::new(),
            rate_range: (0.1, 10.0),
            concentration_range: (0.1, 100.0),
            class_attempts: 20,
            seed: 7,
        }
    }
}

impl AcrConfig {
    pub fn validate(&self) -> CrnResult<()> {
        if self.n_rate_samples == 0 || self.n_classes < 2 || self.class_attempts == 0 {
            return Err(CrnError::ConfigError(
                "ACR needs at least one rate sample, two classes and one attempt per class"
                    .to_string(),
            ));
        }
        if !(self.relative_tolerance > 0.0) {
            return Err(CrnError::ConfigError(format!(
                "ACR relative_tolerance must be positive, got {}",
                self.relative_tolerance
            )));
        }
        for (name, range) in [
            ("ACR rate_range", self.rate_range),
            ("ACR concentration_range", self.concentration_range),
        ] {
            if !(range.0 > 0.0 && range.1 >= range.0) {
                return Err(CrnError::ConfigError(format!(
                    "{} must satisfy 0 < low <= high, got [{}, {}]",
                    name, range.0, range.1
                )));
            }
        }
        if let Some((id, k)) = self.fixed_rates.iter().find(|(_, k)| !(**k > 0.0)) {
            return Err(CrnError::ConfigError(format!(
                "fixed rate constant of '{}' must be positive, got {}",
                id, k
            )));
        }
        Ok(())
    }
}

/// Non-terminal complexes whose difference is a single species.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuralAcr {
    pub species: String,
    pub complexes: (String, String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RobustSpecies {
    pub species: String,
    /// steady-state value for each evaluated rate sample
    pub values: Vec<f64>,
    /// the value is also the same for every sampled rate vector
    pub invariant_across_samples: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcrReport {
    pub structural: Vec<StructuralAcr>,
    pub robust_species: Vec<RobustSpecies>,
    pub samples_evaluated: usize,
    pub positive_steady_state_found: bool,
    pub relative_tolerance: f64,
}

impl AcrReport {
    pub fn is_robust(&self, species: &str) -> bool {
        self.robust_species.iter().any(|r| r.species == species)
    }
}

/// Structural candidates for deficiency one networks.
pub fn structural_acr(
    network: &Network,
    deficiency: &DeficiencyReport,
    graph: &ReactionGraph,
) -> Vec<StructuralAcr> {
    if deficiency.deficiency != 1 {
        return Vec::new();
    }
    let non_terminal = graph.non_terminal_complexes();
    let mut found: Vec<StructuralAcr> = Vec::new();
    for (a, ca) in non_terminal.iter().enumerate() {
        for cb in non_terminal.iter().skip(a + 1) {
            let (ya, yb) = (&network.complexes()[*ca], &network.complexes()[*cb]);
            let differing: Vec<usize> = (0..network.n_species())
                .filter(|s| ya.coefficient(*s) != yb.coefficient(*s))
                .collect();
            if let [s] = differing.as_slice() {
                let species = network.species()[*s].name.clone();
                if !found.iter().any(|f| f.species == species) {
                    found.push(StructuralAcr {
                        species,
                        complexes: (network.format_complex(*ca), network.format_complex(*cb)),
                    });
                }
            }
        }
    }
    found
}

pub struct AcrAnalysis<'a> {
    network: &'a Network,
    matrices: NetworkMatrices,
    deficiency: DeficiencyReport,
    graph: ReactionGraph,
    config: &'a AcrConfig,
    search: &'a SearchConfig,
}

impl<'a> AcrAnalysis<'a> {
    pub fn new(network: &'a Network, config: &'a AcrConfig, search: &'a SearchConfig) -> CrnResult<Self> {
        config.validate()?;
        if let Some(id) = config
            .fixed_rates
            .keys()
            .find(|id| network.reaction_index(id).is_none())
        {
            return Err(CrnError::ConfigError(format!(
                "fixed rate given for unknown reaction '{}'",
                id
            )));
        }
        let matrices = NetworkMatrices::build(network)?;
        let graph = ReactionGraph::new(network);
        let deficiency = DeficiencyReport::new(network, &matrices, &graph);
        Ok(Self {
            network,
            matrices,
            deficiency,
            graph,
            config,
            search,
        })
    }

    /// Fixed rates first, then the network's own values, otherwise sampled.
    fn rate_sample(&self, rng: &mut StdRng) -> Vec<f64> {
        self.network
            .reactions()
            .iter()
            .map(|r| {
                let drawn = log_uniform(rng, self.config.rate_range);
                self.config
                    .fixed_rates
                    .get(&r.id)
                    .cloned()
                    .or(r.rate_constant)
                    .unwrap_or(drawn)
            })
            .collect()
    }

    /// A steady state in the class of a random reference state.
    fn class_steady_state(&self, k: &[f64], rng: &mut StdRng) -> Option<Vec<f64>> {
        let reference = sample_log_uniform(rng, self.network.n_species(), self.config.concentration_range);
        let problem = SteadyStateProblem::new(&self.matrices, k, &reference);
        let deadline = Instant::now() + Duration::from_millis(self.search.trial_timeout_ms);
        for attempt in 0..self.config.class_attempts {
            let guess = if attempt == 0 {
                reference.clone()
            } else {
                spread_guess(rng, &reference, self.search.guess_spread)
            };
            match problem.solve(
                &guess,
                self.search.tolerances.residual_tolerance,
                self.search.max_iterations,
                deadline,
            ) {
                Ok(SolveOutcome::Converged { x, .. }) => return Some(x),
                Ok(SolveOutcome::Failed { .. }) => {}
                Err(e) => debug!("ACR solve discarded: {}", e),
            }
        }
        None
    }

    pub fn run(&self) -> AcrReport {
        let n = self.network.n_species();
        let tol = self.config.relative_tolerance;
        let mut robust_in_all = vec![true; n];
        let mut values: Vec<Vec<f64>> = vec![Vec::new(); n];
        let mut samples_evaluated = 0;
        let mut any_steady_state = false;
        for sample in 0..self.config.n_rate_samples {
            let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(sample as u64));
            let k = self.rate_sample(&mut rng);
            let states: Vec<Vec<f64>> = (0..self.config.n_classes)
                .filter_map(|_| self.class_steady_state(&k, &mut rng))
                .collect();
            any_steady_state |= !states.is_empty();
            if states.len() < 2 {
                warn!(
                    "ACR sample {}: steady states found in {} of {} classes, sample skipped",
                    sample,
                    states.len(),
                    self.config.n_classes
                );
                continue;
            }
            samples_evaluated += 1;
            for i in 0..n {
                let column: Vec<f64> = states.iter().map(|x| x[i]).collect();
                if relative_spread(&column) > tol {
                    robust_in_all[i] = false;
                }
                values[i].push(column.iter().sum::<f64>() / column.len() as f64);
            }
        }

        let species = self.network.species_names();
        let robust_species: Vec<RobustSpecies> = if samples_evaluated == 0 {
            Vec::new()
        } else {
            (0..n)
                .filter(|i| robust_in_all[*i])
                .map(|i| RobustSpecies {
                    species: species[i].clone(),
                    invariant_across_samples: relative_spread(&values[i]) <= tol,
                    values: values[i].clone(),
                })
                .collect()
        };
        let structural = if any_steady_state {
            structural_acr(self.network, &self.deficiency, &self.graph)
        } else {
            Vec::new()
        };
        info!(
            "ACR: {} robust species over {} samples, {} structural certificates",
            robust_species.len(),
            samples_evaluated,
            structural.len()
        );
        AcrReport {
            structural,
            robust_species,
            samples_evaluated,
            positive_steady_state_found: any_steady_state,
            relative_tolerance: tol,
        }
    }
}

/// `(max - min) / max|v|`
fn relative_spread(values: &[f64]) -> f64 {
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let size = values.iter().map(|v| v.abs()).fold(0.0, f64::max);
    if size == 0.0 { 0.0 } else { (max - min) / size }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReactionNetwork::network_parser::network_from_equations;
    use approx::assert_relative_eq;

    fn acr_motif() -> Network {
        network_from_equations(&["A + B -> 2B", "B -> A", "A <-> C"]).unwrap()
    }

    #[test]
    fn test_structural_certificate() {
        let network = acr_motif();
        let matrices = NetworkMatrices::build(&network).unwrap();
        let graph = ReactionGraph::new(&network);
        let deficiency = DeficiencyReport::new(&network, &matrices, &graph);
        assert_eq!(deficiency.deficiency, 1);
        let found = structural_acr(&network, &deficiency, &graph);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].species, "A");
    }

    #[test]
    fn test_numerical_robustness_with_fixed_rates() {
        let network = acr_motif();
        let mut config = AcrConfig::default();
        config.fixed_rates.insert("r1".to_string(), 1.0);
        config.fixed_rates.insert("r2".to_string(), 0.5);
        let search = SearchConfig::default();
        let report = AcrAnalysis::new(&network, &config, &search).unwrap().run();
        assert!(report.positive_steady_state_found);
        assert!(report.samples_evaluated >= 2);
        let a = report
            .robust_species
            .iter()
            .find(|r| r.species == "A")
            .expect("A is robust");
        assert!(a.invariant_across_samples);
        for v in &a.values {
            assert_relative_eq!(*v, 0.5, max_relative = 1e-6);
        }
        assert!(!report.is_robust("B"));
        assert_eq!(report.structural[0].species, "A");
    }

    #[test]
    fn test_unknown_fixed_reaction_rejected() {
        let network = acr_motif();
        let mut config = AcrConfig::default();
        config.fixed_rates.insert("missing".to_string(), 1.0);
        let search = SearchConfig::default();
        assert!(matches!(
            AcrAnalysis::new(&network, &config, &search),
            Err(CrnError::ConfigError(_))
        ));
    }

    #[test]
    fn test_relative_spread() {
        assert_eq!(relative_spread(&[2.0, 2.0]), 0.0);
        assert_relative_eq!(relative_spread(&[1.0, 2.0]), 0.5);
    }
}
