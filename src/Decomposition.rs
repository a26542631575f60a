/// Complex graph of a network: linkage classes, strong linkage classes, terminal
/// classes and weak reversibility.
pub mod graph;
/// Network and per-linkage-class deficiency, deficiency one theorem hypotheses.
pub mod deficiency;
/// eng
/// Decomposition into species-disjoint units and the fallback chain
/// deficiency zero -> deficiency one theorem -> general approach,
/// one handler per unit class.
pub mod decomposer;
