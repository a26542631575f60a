//! Full analysis of one network: decomposition, per-unit sign conditions and witness
//! searches (units run concurrently, each with its own matrices and LP backend),
//! aggregation and the optional ACR check.
use super::acr::AcrAnalysis;
use super::aggregator::{Aggregator, UnitEvaluation, UnitVerdict};
use super::config::AnalysisConfig;
use super::report::{AnalysisReport, NetworkSummary, UnitTrace};
use crate::Decomposition::decomposer::{Decomposer, DecompositionUnit, InjectivityBasis, UnitOutcome};
use crate::ReactionNetwork::matrices::NetworkMatrices;
use crate::ReactionNetwork::network::Network;
use crate::ReactionNetwork::symbolic_odes::format_odes;
use crate::SignConditions::sign_solver::{
    SignConditionSolver, SignOutcome, SignReport, SignTarget,
};
use crate::WitnessSearch::continuation::Continuation;
use crate::WitnessSearch::multistart::{WitnessSearchEngine, WitnessSearchResult};
use crate::WitnessSearch::sampling::{SeedPoint, seed_from_certificate};
use crate::crn_error::CrnResult;
use log::{info, warn};
use rayon::prelude::*;
use std::time::Instant;

pub struct MultistabilityAnalysis<'a> {
    network: &'a Network,
    config: AnalysisConfig,
}

impl<'a> MultistabilityAnalysis<'a> {
    /// Fails with `ConfigError` on an invalid configuration.
    pub fn new(network: &'a Network, config: AnalysisConfig) -> CrnResult<Self> {
        config.validate()?;
        Ok(Self { network, config })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn run(&self) -> CrnResult<AnalysisReport> {
        let start = Instant::now();
        self.network.validate()?;
        let decomposition = Decomposer::new(self.config.decompose).decompose(self.network)?;
        info!(
            "decomposition: {} unit(s), {} unresolved",
            decomposition.units.len(),
            decomposition.n_unresolved()
        );

        let evaluations: Vec<UnitEvaluation> = decomposition
            .units
            .par_iter()
            .map(|unit| self.evaluate_unit(unit))
            .collect::<CrnResult<Vec<UnitEvaluation>>>()?;

        let aggregator = Aggregator::new(self.network, &decomposition, &self.config.search);
        let (classification, confidence) = aggregator.aggregate(&evaluations)?;
        info!("classification: {} ({})", classification.name(), confidence);

        let acr = if self.config.acr.enabled {
            Some(AcrAnalysis::new(self.network, &self.config.acr, &self.config.search)?.run())
        } else {
            None
        };

        let units = decomposition
            .units
            .iter()
            .zip(evaluations)
            .map(|(unit, evaluation)| UnitTrace::new(unit, evaluation))
            .collect();
        let conservation_laws = NetworkMatrices::build(self.network)?
            .conservation
            .describe(&self.network.species_names());
        Ok(AnalysisReport {
            network: NetworkSummary::new(self.network, &decomposition.network_deficiency, conservation_laws),
            odes: format_odes(self.network),
            classification,
            confidence,
            tolerances: self.config.search.tolerances,
            seed: self.config.search.seed,
            decomposed: decomposition.decomposed,
            units,
            acr,
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Handler per structural outcome of the unit.
    fn evaluate_unit(&self, unit: &DecompositionUnit) -> CrnResult<UnitEvaluation> {
        match &unit.outcome {
            UnitOutcome::ResolvedInjective { basis } => Ok(UnitEvaluation {
                unit: unit.index,
                sign: None,
                search: None,
                verdict: UnitVerdict::Injective { basis: *basis },
            }),
            UnitOutcome::ResolvedNonInjective { reason } => {
                info!("unit {}: {}, searching for a witness", unit.index, reason);
                let search = self.witness_search(unit, None)?;
                Ok(self.verdict_after_search(unit, None, search, UnitVerdict::FeasibleButNoWitness))
            }
            UnitOutcome::NeedsSignCondition { candidate } => {
                let solver = SignConditionSolver::new(&self.config.sign_conditions);
                let report = match solver.solve(candidate, SignTarget::ChangesSign) {
                    Ok(report) => report,
                    Err(e) => {
                        warn!("unit {}: {}", unit.index, e);
                        return Ok(UnitEvaluation {
                            unit: unit.index,
                            sign: None,
                            search: None,
                            verdict: UnitVerdict::SolverUnavailable {
                                message: e.to_string(),
                            },
                        });
                    }
                };
                match &report.outcome {
                    SignOutcome::Infeasible { reason } => {
                        info!("unit {}: sign change infeasible ({})", unit.index, reason);
                        Ok(UnitEvaluation {
                            unit: unit.index,
                            sign: Some(report),
                            search: None,
                            verdict: UnitVerdict::Injective {
                                basis: InjectivityBasis::ConstantSignDeterminant,
                            },
                        })
                    }
                    SignOutcome::Feasible { .. } => {
                        let seed = report
                            .guiding_certificate()
                            .map(|cert| seed_from_certificate(cert, &unit.matrices.kinetic_order));
                        let search = self.witness_search(unit, seed)?;
                        Ok(self.verdict_after_search(
                            unit,
                            Some(report),
                            search,
                            UnitVerdict::FeasibleButNoWitness,
                        ))
                    }
                    SignOutcome::Undetermined { reason } => {
                        let fallback = UnitVerdict::Undetermined {
                            reason: reason.clone(),
                        };
                        let search = self.witness_search(unit, None)?;
                        Ok(self.verdict_after_search(unit, Some(report), search, fallback))
                    }
                }
            }
        }
    }

    fn verdict_after_search(
        &self,
        unit: &DecompositionUnit,
        sign: Option<SignReport>,
        search: WitnessSearchResult,
        fallback: UnitVerdict,
    ) -> UnitEvaluation {
        let verdict = if search.witness().is_some() {
            UnitVerdict::Multistable
        } else {
            fallback
        };
        UnitEvaluation {
            unit: unit.index,
            sign,
            search: Some(search),
            verdict,
        }
    }

    fn witness_search(
        &self,
        unit: &DecompositionUnit,
        seed: Option<SeedPoint>,
    ) -> CrnResult<WitnessSearchResult> {
        let engine = WitnessSearchEngine::new(
            &unit.matrices,
            unit.species_names(),
            unit.reaction_ids(),
            &self.config.search,
        )
        .with_seed_point(seed);
        let mut result = engine.search();
        let continuation = &self.config.continuation;
        let range = match result.witness() {
            Some(pair)
                if continuation.enabled
                    && continuation
                        .parameter
                        .as_ref()
                        .is_none_or(|id| pair.reactions.contains(id)) =>
            {
                Continuation::new(&unit.matrices, pair, &self.config.search, continuation).run()?
            }
            _ => None,
        };
        result.continuation = range;
        Ok(result)
    }
}
