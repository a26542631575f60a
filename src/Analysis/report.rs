use super::acr::AcrReport;
use super::aggregator::{Classification, NetworkWitness, UnitEvaluation, UnitVerdict};
use crate::Decomposition::decomposer::{DecompositionUnit, UnitClass, UnitOutcome};
use crate::Decomposition::deficiency::DeficiencyReport;
use crate::ReactionNetwork::network::Network;
use crate::SignConditions::sign_solver::SignReport;
use crate::WitnessSearch::multistart::WitnessSearchResult;
use crate::WitnessSearch::search_config::Tolerances;
use crate::crn_error::CrnResult;
use log::info;
use prettytable::{Table, row};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Structural numbers of the whole network.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkSummary {
    pub n_species: usize,
    pub n_complexes: usize,
    pub n_reactions: usize,
    pub n_linkage_classes: usize,
    pub rank: usize,
    pub deficiency: usize,
    pub weakly_reversible: bool,
    pub conservation_laws: Vec<String>,
}

impl NetworkSummary {
    pub fn new(network: &Network, deficiency: &DeficiencyReport, conservation_laws: Vec<String>) -> Self {
        Self {
            n_species: network.n_species(),
            n_complexes: network.n_complexes(),
            n_reactions: network.n_reactions(),
            n_linkage_classes: deficiency.n_linkage_classes,
            rank: deficiency.rank,
            deficiency: deficiency.deficiency,
            weakly_reversible: deficiency.weakly_reversible,
            conservation_laws,
        }
    }
}

/// What happened to one unit, from decomposition to verdict.
#[derive(Debug, Clone, Serialize)]
pub struct UnitTrace {
    pub index: usize,
    pub reactions: Vec<String>,
    pub species: Vec<String>,
    pub deficiency: usize,
    pub class: UnitClass,
    pub structural_outcome: String,
    pub whole_network_fallback: bool,
    pub sign: Option<SignReport>,
    pub search: Option<WitnessSearchResult>,
    pub verdict: UnitVerdict,
}

impl UnitTrace {
    pub fn new(unit: &DecompositionUnit, evaluation: UnitEvaluation) -> Self {
        let structural_outcome = match &unit.outcome {
            UnitOutcome::ResolvedInjective { basis } => basis.describe().to_string(),
            UnitOutcome::ResolvedNonInjective { reason } => reason.clone(),
            UnitOutcome::NeedsSignCondition { candidate } => format!(
                "sign condition on a {}x{} candidate matrix",
                candidate.size, candidate.size
            ),
        };
        Self {
            index: unit.index,
            reactions: unit.reaction_ids(),
            species: unit.species_names(),
            deficiency: unit.deficiency.deficiency,
            class: unit.class,
            structural_outcome,
            whole_network_fallback: unit.whole_network_fallback,
            sign: evaluation.sign,
            search: evaluation.search,
            verdict: evaluation.verdict,
        }
    }
}

/// Result of a full multistability analysis.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub network: NetworkSummary,
    pub odes: Vec<String>,
    pub classification: Classification,
    pub confidence: String,
    pub tolerances: Tolerances,
    pub seed: u64,
    pub decomposed: bool,
    pub units: Vec<UnitTrace>,
    pub acr: Option<AcrReport>,
    pub elapsed_ms: u64,
}

impl AnalysisReport {
    pub fn is_injective(&self) -> bool {
        matches!(self.classification, Classification::Injective)
    }

    pub fn is_multistable(&self) -> bool {
        matches!(self.classification, Classification::MultistabilityConfirmed(_))
    }

    pub fn witness(&self) -> Option<&NetworkWitness> {
        match &self.classification {
            Classification::MultistabilityConfirmed(witness) => Some(witness),
            _ => None,
        }
    }

    pub fn to_json(&self) -> CrnResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: &Path) -> CrnResult<()> {
        fs::write(path, self.to_json()?)?;
        info!("report written to {}", path.display());
        Ok(())
    }

    pub fn print_table(&self) {
        let n = &self.network;
        let mut summary = Table::new();
        summary.add_row(row!["Property", "Value"]);
        summary.add_row(row!["species", n.n_species]);
        summary.add_row(row!["complexes", n.n_complexes]);
        summary.add_row(row!["reactions", n.n_reactions]);
        summary.add_row(row!["linkage classes", n.n_linkage_classes]);
        summary.add_row(row!["rank", n.rank]);
        summary.add_row(row!["deficiency", n.deficiency]);
        summary.add_row(row!["weakly reversible", n.weakly_reversible]);
        for law in &n.conservation_laws {
            summary.add_row(row!["conservation law", law]);
        }
        summary.printstd();

        for ode in &self.odes {
            println!("{}", ode);
        }

        let mut units = Table::new();
        units.add_row(row!["Unit", "Reactions", "Deficiency", "Structure", "Verdict"]);
        for unit in &self.units {
            units.add_row(row![
                unit.index,
                unit.reactions.join(", "),
                unit.deficiency,
                unit.structural_outcome,
                format!("{:?}", unit.verdict)
            ]);
        }
        units.printstd();

        println!("\x1b[34m{}\x1b[0m: {}", self.classification.name(), self.confidence);
        if let Some(witness) = self.witness() {
            let mut table = Table::new();
            table.add_row(row!["Species", "State 1", "State 2"]);
            for (i, s) in witness.species.iter().enumerate() {
                table.add_row(row![
                    s,
                    format!("{:.6e}", witness.first[i]),
                    format!("{:.6e}", witness.second[i])
                ]);
            }
            table.printstd();
            let mut rates = Table::new();
            rates.add_row(row!["Reaction", "k"]);
            for (id, k) in witness.reactions.iter().zip(&witness.rate_constants) {
                rates.add_row(row![id, format!("{:.6e}", k)]);
            }
            rates.printstd();
            println!(
                "stability: {:?} / {:?}, residuals {:.2e} / {:.2e}",
                witness.first_stability,
                witness.second_stability,
                witness.residuals.0,
                witness.residuals.1
            );
        }
        if let Some(acr) = &self.acr {
            for s in &acr.structural {
                println!(
                    "structural ACR candidate {} ({} / {})",
                    s.species, s.complexes.0, s.complexes.1
                );
            }
            for r in &acr.robust_species {
                println!(
                    "robust species {} : {:?} (invariant across samples: {})",
                    r.species, r.values, r.invariant_across_samples
                );
            }
        }
        println!("elapsed: {} ms", self.elapsed_ms);
    }
}
