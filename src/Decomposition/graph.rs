//! Reaction graph on complexes: linkage classes, strong linkage classes, terminal
//! strong linkage classes and weak reversibility, computed with petgraph.
use crate::ReactionNetwork::network::Network;
use petgraph::Direction::Outgoing;
use petgraph::algo::condensation;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::unionfind::UnionFind;
use serde::Serialize;

/// Groups the elements `0..n` by union-find label; each group is sorted and groups are
/// ordered by their smallest element.
pub fn groups_from_labels(uf: UnionFind<usize>) -> Vec<Vec<usize>> {
    let labels = uf.into_labeling();
    let mut group_of_label: Vec<Option<usize>> = vec![None; labels.len()];
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (element, label) in labels.into_iter().enumerate() {
        match group_of_label[label] {
            Some(g) => groups[g].push(element),
            None => {
                group_of_label[label] = Some(groups.len());
                groups.push(vec![element]);
            }
        }
    }
    groups
}

/// Connected component of the reaction graph (direction ignored).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkageClass {
    pub complexes: Vec<usize>,
    pub reactions: Vec<usize>,
}

/// Strongly connected component of the directed reaction graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrongLinkageClass {
    pub complexes: Vec<usize>,
    /// no reaction leaves the class
    pub terminal: bool,
    /// index of the linkage class containing it
    pub linkage_class: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReactionGraph {
    pub n_complexes: usize,
    /// (reactant complex, product complex) per reaction
    pub edges: Vec<(usize, usize)>,
    pub linkage_classes: Vec<LinkageClass>,
    pub strong_linkage_classes: Vec<StrongLinkageClass>,
}

impl ReactionGraph {
    pub fn new(network: &Network) -> Self {
        let n_complexes = network.n_complexes();
        let edges: Vec<(usize, usize)> = network
            .reactions()
            .iter()
            .map(|r| (r.reactant, r.product))
            .collect();
        let mut graph: DiGraph<usize, usize> = DiGraph::with_capacity(n_complexes, edges.len());
        for c in 0..n_complexes {
            graph.add_node(c);
        }
        for (j, (a, b)) in edges.iter().enumerate() {
            graph.add_edge(NodeIndex::new(*a), NodeIndex::new(*b), j);
        }
        let linkage_classes = linkage_classes(n_complexes, &edges);
        let mut class_of_complex = vec![0usize; n_complexes];
        for (l, class) in linkage_classes.iter().enumerate() {
            for c in &class.complexes {
                class_of_complex[*c] = l;
            }
        }

        // intra-class edges dropped: a condensed node without successors is terminal
        let condensed = condensation(graph, true);
        let mut strong_linkage_classes: Vec<StrongLinkageClass> = condensed
            .node_indices()
            .map(|n| {
                let mut complexes = condensed[n].clone();
                complexes.sort_unstable();
                StrongLinkageClass {
                    linkage_class: class_of_complex[complexes[0]],
                    terminal: condensed.neighbors_directed(n, Outgoing).next().is_none(),
                    complexes,
                }
            })
            .collect();
        strong_linkage_classes.sort_by_key(|slc| slc.complexes[0]);

        Self {
            n_complexes,
            edges,
            linkage_classes,
            strong_linkage_classes,
        }
    }

    /// Every reaction lies inside a strong linkage class.
    pub fn is_weakly_reversible(&self) -> bool {
        let mut component_of = vec![0usize; self.n_complexes];
        for (k, slc) in self.strong_linkage_classes.iter().enumerate() {
            for c in &slc.complexes {
                component_of[*c] = k;
            }
        }
        self.edges
            .iter()
            .all(|(a, b)| component_of[*a] == component_of[*b])
    }

    pub fn terminal_classes(&self) -> Vec<&StrongLinkageClass> {
        self.strong_linkage_classes
            .iter()
            .filter(|s| s.terminal)
            .collect()
    }

    /// Number of terminal strong linkage classes inside linkage class `l`.
    pub fn n_terminal_in(&self, l: usize) -> usize {
        self.strong_linkage_classes
            .iter()
            .filter(|s| s.terminal && s.linkage_class == l)
            .count()
    }

    /// Complexes that do not belong to a terminal strong linkage class.
    pub fn non_terminal_complexes(&self) -> Vec<usize> {
        let mut out: Vec<usize> = self
            .strong_linkage_classes
            .iter()
            .filter(|s| !s.terminal)
            .flat_map(|s| s.complexes.iter().cloned())
            .collect();
        out.sort_unstable();
        out
    }
}

fn linkage_classes(n_complexes: usize, edges: &[(usize, usize)]) -> Vec<LinkageClass> {
    let mut uf = UnionFind::new(n_complexes);
    for (a, b) in edges {
        uf.union(*a, *b);
    }
    let groups = groups_from_labels(uf);
    let mut class_of = vec![0usize; n_complexes];
    for (l, g) in groups.iter().enumerate() {
        for c in g {
            class_of[*c] = l;
        }
    }
    let mut reactions: Vec<Vec<usize>> = vec![Vec::new(); groups.len()];
    for (j, (a, _)) in edges.iter().enumerate() {
        reactions[class_of[*a]].push(j);
    }
    groups
        .into_iter()
        .zip(reactions)
        .map(|(complexes, reactions)| LinkageClass {
            complexes,
            reactions,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReactionNetwork::network_parser::network_from_equations;

    #[test]
    fn test_groups_from_labels() {
        let mut uf = UnionFind::new(6);
        uf.union(4, 1);
        uf.union(2, 5);
        uf.union(5, 4);
        assert_eq!(
            groups_from_labels(uf),
            vec![vec![0], vec![1, 2, 4, 5], vec![3]]
        );
    }

    #[test]
    fn test_cycle_with_tail() {
        // A -> B -> C -> A is one strong class, C -> D leaves it
        let network = network_from_equations(&["A -> B", "B -> C", "C -> A", "C -> D"]).unwrap();
        let graph = ReactionGraph::new(&network);
        assert_eq!(graph.linkage_classes.len(), 1);
        assert_eq!(graph.strong_linkage_classes.len(), 2);
        assert_eq!(graph.strong_linkage_classes[0].complexes, vec![0, 1, 2]);
        assert!(!graph.strong_linkage_classes[0].terminal);
        assert_eq!(graph.strong_linkage_classes[1].complexes, vec![3]);
        assert!(graph.strong_linkage_classes[1].terminal);
        assert!(!graph.is_weakly_reversible());
    }

    #[test]
    fn test_enzyme_graph_terminal_classes() {
        // complexes: S+E, C, E+P
        let network = network_from_equations(&["S + E <-> C", "C -> E + P"]).unwrap();
        let graph = ReactionGraph::new(&network);
        assert_eq!(graph.linkage_classes.len(), 1);
        assert_eq!(graph.linkage_classes[0].reactions, vec![0, 1, 2]);
        assert_eq!(graph.strong_linkage_classes.len(), 2);
        assert!(!graph.is_weakly_reversible());
        let terminal = graph.terminal_classes();
        assert_eq!(terminal.len(), 1);
        assert_eq!(terminal[0].complexes, vec![2]);
        assert_eq!(graph.non_terminal_complexes(), vec![0, 1]);
        assert_eq!(graph.n_terminal_in(0), 1);
    }

    #[test]
    fn test_weak_reversibility() {
        let network = network_from_equations(&["A -> B", "B -> C", "C -> A", "2A <-> D"]).unwrap();
        let graph = ReactionGraph::new(&network);
        assert!(graph.is_weakly_reversible());
        assert_eq!(graph.linkage_classes.len(), 2);
        assert!(graph.strong_linkage_classes.iter().all(|s| s.terminal));
    }
}
