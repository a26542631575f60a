use super::graph::ReactionGraph;
use crate::ReactionNetwork::exact_linalg::rank_i64;
use crate::ReactionNetwork::matrices::NetworkMatrices;
use crate::ReactionNetwork::network::Network;
use nalgebra::DMatrix;
use serde::Serialize;

/// Deficiency data of one linkage class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkageClassDeficiency {
    pub complexes: Vec<usize>,
    pub reactions: Vec<usize>,
    /// rank of the stoichiometric columns of the class reactions
    pub rank: usize,
    /// n_complexes - 1 - rank
    pub deficiency: usize,
    pub n_terminal_classes: usize,
}

/// δ = n - l - s together with its per-linkage-class split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeficiencyReport {
    pub n_complexes: usize,
    pub n_linkage_classes: usize,
    pub rank: usize,
    pub deficiency: usize,
    pub weakly_reversible: bool,
    pub per_class: Vec<LinkageClassDeficiency>,
}

impl DeficiencyReport {
    pub fn new(network: &Network, matrices: &NetworkMatrices, graph: &ReactionGraph) -> Self {
        let per_class: Vec<LinkageClassDeficiency> = graph
            .linkage_classes
            .iter()
            .enumerate()
            .map(|(l, class)| {
                let columns = DMatrix::from_fn(
                    matrices.stoichiometric.nrows(),
                    class.reactions.len(),
                    |i, c| matrices.stoichiometric[(i, class.reactions[c])],
                );
                let rank = rank_i64(&columns);
                LinkageClassDeficiency {
                    complexes: class.complexes.clone(),
                    reactions: class.reactions.clone(),
                    rank,
                    deficiency: class.complexes.len().saturating_sub(1 + rank),
                    n_terminal_classes: graph.n_terminal_in(l),
                }
            })
            .collect();
        let n_complexes = network.n_complexes();
        let n_linkage_classes = graph.linkage_classes.len();
        Self {
            n_complexes,
            n_linkage_classes,
            rank: matrices.rank,
            deficiency: n_complexes.saturating_sub(n_linkage_classes + matrices.rank),
            weakly_reversible: graph.is_weakly_reversible(),
            per_class,
        }
    }

    pub fn sum_of_class_deficiencies(&self) -> usize {
        self.per_class.iter().map(|c| c.deficiency).sum()
    }

    /// Hypotheses of the deficiency one theorem: every linkage class has deficiency at
    /// most one, the class deficiencies add up to the network deficiency and every
    /// linkage class holds exactly one terminal strong linkage class.
    pub fn deficiency_one_theorem_applies(&self) -> bool {
        self.per_class.iter().all(|c| c.deficiency <= 1)
            && self.sum_of_class_deficiencies() == self.deficiency
            && self.per_class.iter().all(|c| c.n_terminal_classes == 1)
    }
}
