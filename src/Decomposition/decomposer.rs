//! Splitting a network into dynamically independent units and resolving each unit by
//! the cheapest argument that applies.
//!
//! Linkage classes that share a species are merged, so distinct units have disjoint
//! species sets and their steady-state problems decouple. Every unit is then classified
//! ([`UnitClass`]) and handed to the handler of its class:
//! - deficiency zero: injective (no positive steady state if not weakly reversible)
//! - deficiency one theorem: injective
//! - unresolved deficiency one, higher deficiency: general approach on the candidate matrix
use super::deficiency::DeficiencyReport;
use super::graph::{ReactionGraph, groups_from_labels};
use crate::ReactionNetwork::matrices::NetworkMatrices;
use crate::ReactionNetwork::network::{Network, RestrictedNetwork};
use crate::SignConditions::candidate_matrix::CandidateMatrix;
use crate::crn_error::CrnResult;
use log::{debug, info};
use petgraph::unionfind::UnionFind;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnitClass {
    DeficiencyZero { weakly_reversible: bool },
    DeficiencyOneTheorem,
    DeficiencyOneUnresolved,
    HigherDeficiency { deficiency: usize },
}

/// Why a unit cannot have two positive steady states in one compatibility class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InjectivityBasis {
    /// deficiency zero theorem; without weak reversibility no positive steady state exists
    DeficiencyZero { weakly_reversible: bool },
    DeficiencyOneTheorem,
    /// the candidate determinant has constant sign
    ConstantSignDeterminant,
}

impl InjectivityBasis {
    pub fn admits_positive_steady_state(&self) -> bool {
        !matches!(
            self,
            InjectivityBasis::DeficiencyZero {
                weakly_reversible: false
            }
        )
    }

    pub fn describe(&self) -> &'static str {
        match self {
            InjectivityBasis::DeficiencyZero {
                weakly_reversible: true,
            } => "deficiency zero, weakly reversible",
            InjectivityBasis::DeficiencyZero {
                weakly_reversible: false,
            } => "deficiency zero, not weakly reversible (no positive steady state)",
            InjectivityBasis::DeficiencyOneTheorem => "deficiency one theorem",
            InjectivityBasis::ConstantSignDeterminant => "determinant of constant sign",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum UnitOutcome {
    ResolvedInjective { basis: InjectivityBasis },
    /// the candidate determinant vanishes identically
    ResolvedNonInjective { reason: String },
    NeedsSignCondition { candidate: CandidateMatrix },
}

/// One independent part of the network with its own matrices and classification.
#[derive(Debug, Clone)]
pub struct DecompositionUnit {
    pub index: usize,
    pub restricted: RestrictedNetwork,
    pub matrices: NetworkMatrices,
    pub deficiency: DeficiencyReport,
    pub class: UnitClass,
    pub outcome: UnitOutcome,
    /// the unit is the whole network and no structural argument resolved it
    pub whole_network_fallback: bool,
}

impl DecompositionUnit {
    pub fn network(&self) -> &Network {
        &self.restricted.network
    }

    pub fn reaction_ids(&self) -> Vec<String> {
        self.restricted.network.reaction_ids()
    }

    pub fn species_names(&self) -> Vec<String> {
        self.restricted.network.species_names()
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self.outcome, UnitOutcome::NeedsSignCondition { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Decomposition {
    pub units: Vec<DecompositionUnit>,
    /// deficiency data of the whole network
    pub network_deficiency: DeficiencyReport,
    pub decomposed: bool,
}

impl Decomposition {
    pub fn n_unresolved(&self) -> usize {
        self.units.iter().filter(|u| !u.is_resolved()).count()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Decomposer {
    decompose: bool,
}

impl Default for Decomposer {
    fn default() -> Self {
        Self { decompose: true }
    }
}

impl Decomposer {
    /// With `decompose == false` the whole network goes to the general approach as a
    /// single unit.
    pub fn new(decompose: bool) -> Self {
        Self { decompose }
    }

    pub fn decompose(&self, network: &Network) -> CrnResult<Decomposition> {
        let matrices = NetworkMatrices::build(network)?;
        let graph = ReactionGraph::new(network);
        let network_deficiency = DeficiencyReport::new(network, &matrices, &graph);
        info!(
            "network: {} complexes, {} linkage classes, rank {}, deficiency {}",
            network_deficiency.n_complexes,
            network_deficiency.n_linkage_classes,
            network_deficiency.rank,
            network_deficiency.deficiency
        );

        let groups = if self.decompose {
            independent_reaction_groups(network, &graph)
        } else {
            vec![(0..network.n_reactions()).collect()]
        };
        let single = groups.len() == 1;
        let mut units = Vec::with_capacity(groups.len());
        for (index, reactions) in groups.into_iter().enumerate() {
            let restricted = network.restrict_to_reactions(&reactions)?;
            let unit_matrices = NetworkMatrices::build(&restricted.network)?;
            let unit_graph = ReactionGraph::new(&restricted.network);
            let deficiency =
                DeficiencyReport::new(&restricted.network, &unit_matrices, &unit_graph);
            let class = classify(&deficiency);
            let outcome = if self.decompose {
                handle(class, &unit_matrices)
            } else {
                general_approach(&unit_matrices)
            };
            let whole_network_fallback =
                !self.decompose || (single && matches!(outcome, UnitOutcome::NeedsSignCondition { .. }));
            debug!(
                "unit {}: {} reactions, class {:?}, outcome {}",
                index,
                reactions.len(),
                class,
                outcome_name(&outcome)
            );
            units.push(DecompositionUnit {
                index,
                restricted,
                matrices: unit_matrices,
                deficiency,
                class,
                outcome,
                whole_network_fallback,
            });
        }
        Ok(Decomposition {
            units,
            network_deficiency,
            decomposed: self.decompose,
        })
    }
}

fn outcome_name(outcome: &UnitOutcome) -> &'static str {
    match outcome {
        UnitOutcome::ResolvedInjective { .. } => "resolved injective",
        UnitOutcome::ResolvedNonInjective { .. } => "resolved non-injective",
        UnitOutcome::NeedsSignCondition { .. } => "needs sign condition",
    }
}

/// Reaction sets of the species-disjoint unions of linkage classes.
fn independent_reaction_groups(network: &Network, graph: &ReactionGraph) -> Vec<Vec<usize>> {
    let n_classes = graph.linkage_classes.len();
    let mut uf: UnionFind<usize> = UnionFind::new(n_classes);
    let mut owner: Vec<Option<usize>> = vec![None; network.n_species()];
    for (l, class) in graph.linkage_classes.iter().enumerate() {
        for c in &class.complexes {
            for s in network.complexes()[*c].species() {
                match owner[s] {
                    Some(other) => {
                        uf.union(other, l);
                    }
                    None => owner[s] = Some(l),
                }
            }
        }
    }
    groups_from_labels(uf)
        .into_iter()
        .map(|classes| {
            let mut reactions: Vec<usize> = classes
                .iter()
                .flat_map(|l| graph.linkage_classes[*l].reactions.iter().cloned())
                .collect();
            reactions.sort_unstable();
            reactions
        })
        .collect()
}

pub fn classify(report: &DeficiencyReport) -> UnitClass {
    if report.deficiency == 0 {
        UnitClass::DeficiencyZero {
            weakly_reversible: report.weakly_reversible,
        }
    } else if report.deficiency_one_theorem_applies() {
        UnitClass::DeficiencyOneTheorem
    } else if report.deficiency == 1 {
        UnitClass::DeficiencyOneUnresolved
    } else {
        UnitClass::HigherDeficiency {
            deficiency: report.deficiency,
        }
    }
}

fn handle(class: UnitClass, matrices: &NetworkMatrices) -> UnitOutcome {
    match class {
        UnitClass::DeficiencyZero { weakly_reversible } => deficiency_zero(weakly_reversible),
        UnitClass::DeficiencyOneTheorem => deficiency_one_theorem(),
        UnitClass::DeficiencyOneUnresolved => general_approach(matrices),
        UnitClass::HigherDeficiency { .. } => general_approach(matrices),
    }
}

fn deficiency_zero(weakly_reversible: bool) -> UnitOutcome {
    UnitOutcome::ResolvedInjective {
        basis: InjectivityBasis::DeficiencyZero { weakly_reversible },
    }
}

fn deficiency_one_theorem() -> UnitOutcome {
    UnitOutcome::ResolvedInjective {
        basis: InjectivityBasis::DeficiencyOneTheorem,
    }
}

fn general_approach(matrices: &NetworkMatrices) -> UnitOutcome {
    let candidate = CandidateMatrix::from_matrices(matrices);
    if candidate.is_structurally_singular() {
        UnitOutcome::ResolvedNonInjective {
            reason: "candidate matrix is structurally singular".to_string(),
        }
    } else {
        UnitOutcome::NeedsSignCondition { candidate }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReactionNetwork::network_parser::network_from_equations;

    fn decompose(equations: &[&str], split: bool) -> Decomposition {
        let network = network_from_equations(equations).unwrap();
        Decomposer::new(split).decompose(&network).unwrap()
    }

    #[test]
    fn test_michaelis_menten_resolved_by_deficiency_zero() {
        let d = decompose(&["S + E <-> C", "C -> E + P"], true);
        assert_eq!(d.units.len(), 1);
        let unit = &d.units[0];
        assert_eq!(
            unit.class,
            UnitClass::DeficiencyZero {
                weakly_reversible: false
            }
        );
        match &unit.outcome {
            UnitOutcome::ResolvedInjective { basis } => {
                assert!(!basis.admits_positive_steady_state())
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(!unit.whole_network_fallback);
        assert_eq!(d.n_unresolved(), 0);
    }

    #[test]
    fn test_schlogl_goes_to_general_approach() {
        let d = decompose(&["0 <-> X", "2X <-> 3X"], true);
        assert_eq!(d.units.len(), 1);
        assert_eq!(d.units[0].class, UnitClass::DeficiencyOneUnresolved);
        assert!(matches!(
            d.units[0].outcome,
            UnitOutcome::NeedsSignCondition { .. }
        ));
        assert!(d.units[0].whole_network_fallback);
    }

    #[test]
    fn test_species_disjoint_units() {
        // a reversible isomerisation and an independent Schlögl module
        let d = decompose(&["A <-> B", "0 <-> X", "2X <-> 3X"], true);
        assert_eq!(d.units.len(), 2);
        assert_eq!(d.units[0].species_names(), vec!["A", "B"]);
        assert_eq!(
            d.units[0].outcome,
            UnitOutcome::ResolvedInjective {
                basis: InjectivityBasis::DeficiencyZero {
                    weakly_reversible: true
                }
            }
        );
        assert_eq!(d.units[1].restricted.reaction_map, vec![2, 3, 4, 5]);
        assert!(!d.units[1].whole_network_fallback);
        assert_eq!(d.n_unresolved(), 1);
    }

    #[test]
    fn test_linkage_classes_sharing_species_are_merged() {
        let d = decompose(
            &["D + X <-> DX", "DX + X <-> DX2", "DX2 -> DX2 + X", "X -> 0", "0 -> X"],
            true,
        );
        assert_eq!(d.network_deficiency.n_linkage_classes, 3);
        assert_eq!(d.units.len(), 1);
        assert_eq!(d.units[0].class, UnitClass::DeficiencyOneUnresolved);
    }

    #[test]
    fn test_deficiency_one_theorem_unit() {
        let d = decompose(&["2A <-> A + B", "A + B <-> 2B", "2B -> 2A"], true);
        assert_eq!(d.units[0].class, UnitClass::DeficiencyOneTheorem);
        assert_eq!(
            d.units[0].outcome,
            UnitOutcome::ResolvedInjective {
                basis: InjectivityBasis::DeficiencyOneTheorem
            }
        );
    }

    #[test]
    fn test_structurally_singular_unit() {
        // P is never consumed and not conserved: empty candidate column
        let d = decompose(&["0 <-> X", "2X <-> 3X", "X -> P"], true);
        assert_eq!(d.units.len(), 1);
        assert_eq!(d.units[0].class, UnitClass::DeficiencyOneUnresolved);
        assert!(matches!(
            d.units[0].outcome,
            UnitOutcome::ResolvedNonInjective { .. }
        ));
        assert!(!d.units[0].whole_network_fallback);
    }

    #[test]
    fn test_no_decomposition_forwards_whole_network() {
        let d = decompose(&["S + E <-> C", "C -> E + P"], false);
        assert_eq!(d.units.len(), 1);
        assert!(d.units[0].whole_network_fallback);
        assert!(matches!(
            d.units[0].outcome,
            UnitOutcome::NeedsSignCondition { .. }
        ));
    }
}
