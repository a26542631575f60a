use super::polynomial::{CoefficientTable, ExpansionError};
use crate::ReactionNetwork::matrices::NetworkMatrices;
use nalgebra::DMatrix;
use petgraph::algo::maximum_matching;
use petgraph::graph::{NodeIndex, UnGraph};
use serde::Serialize;
use std::collections::HashMap;

/// `coefficient * κ_reaction * λ_species`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolicTerm {
    pub reaction: usize,
    pub species: usize,
    pub coefficient: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CandidateEntry {
    Zero,
    Constant(i64),
    Symbolic(Vec<SymbolicTerm>),
}

impl CandidateEntry {
    pub fn is_zero(&self) -> bool {
        matches!(self, CandidateEntry::Zero)
    }
}

/// Jacobian of the mass-action system in flux/inverse-concentration variables,
/// `N diag(κ) Kᵀ diag(λ)`, with the rows of the conservation pivot species replaced by
/// the conservation laws. Its determinant is a polynomial in `κ ∪ λ` whose sign
/// behaviour decides injectivity on stoichiometric compatibility classes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateMatrix {
    pub size: usize,
    pub n_reactions: usize,
    /// row-major entries
    pub entries: Vec<Vec<CandidateEntry>>,
    pub replaced_rows: Vec<usize>,
    /// rank of the stoichiometric matrix
    pub rank: usize,
}

/// Expansion is limited to matrices addressable by a 64-bit column mask.
const MAX_EXPANSION_SIZE: usize = 63;
const MAX_MEMO_ENTRIES: usize = 1 << 20;

impl CandidateMatrix {
    pub fn from_matrices(m: &NetworkMatrices) -> Self {
        let s = m.n_species();
        let r = m.n_reactions();
        let pivots = &m.conservation.pivots;
        let mut entries = vec![vec![CandidateEntry::Zero; s]; s];
        for (i, row) in entries.iter_mut().enumerate() {
            if let Some(p) = pivots.iter().position(|pv| *pv == i) {
                for (l, entry) in row.iter_mut().enumerate() {
                    let w = m.conservation.laws[(p, l)];
                    if w != 0 {
                        *entry = CandidateEntry::Constant(w);
                    }
                }
                continue;
            }
            for (l, entry) in row.iter_mut().enumerate() {
                let terms: Vec<SymbolicTerm> = (0..r)
                    .filter_map(|j| {
                        let coefficient = m.stoichiometric[(i, j)] * m.kinetic_order[(l, j)];
                        (coefficient != 0).then_some(SymbolicTerm {
                            reaction: j,
                            species: l,
                            coefficient,
                        })
                    })
                    .collect();
                if !terms.is_empty() {
                    *entry = CandidateEntry::Symbolic(terms);
                }
            }
        }
        Self {
            size: s,
            n_reactions: r,
            entries,
            replaced_rows: pivots.clone(),
            rank: m.rank,
        }
    }

    /// κ variables first (one per reaction), then λ variables (one per species).
    pub fn n_variables(&self) -> usize {
        self.n_reactions + self.size
    }

    pub fn variable_names(&self, reaction_ids: &[String], species: &[String]) -> Vec<String> {
        reaction_ids
            .iter()
            .map(|id| format!("kappa_{}", id))
            .chain(species.iter().map(|s| format!("lambda_{}", s)))
            .collect()
    }

    /// Sign `(-1)^rank` that the determinant takes on injective networks.
    pub fn expected_sign(&self) -> i8 {
        if self.rank % 2 == 0 { 1 } else { -1 }
    }

    /// Numerical matrix at positive values of κ and λ.
    pub fn evaluate(&self, kappa: &[f64], lambda: &[f64]) -> DMatrix<f64> {
        DMatrix::from_fn(self.size, self.size, |i, l| match &self.entries[i][l] {
            CandidateEntry::Zero => 0.0,
            CandidateEntry::Constant(c) => *c as f64,
            CandidateEntry::Symbolic(terms) => terms
                .iter()
                .map(|t| t.coefficient as f64 * kappa[t.reaction] * lambda[t.species])
                .sum(),
        })
    }

    /// True when no permutation picks a nonzero entry in every row, so the
    /// determinant vanishes identically (maximum matching of the row/column sparsity
    /// graph smaller than the size).
    pub fn is_structurally_singular(&self) -> bool {
        let n = self.size;
        let mut pattern: UnGraph<(), ()> = UnGraph::with_capacity(2 * n, n * n);
        for _ in 0..2 * n {
            pattern.add_node(());
        }
        for (i, row) in self.entries.iter().enumerate() {
            for (l, entry) in row.iter().enumerate() {
                if !entry.is_zero() {
                    pattern.add_edge(NodeIndex::new(i), NodeIndex::new(n + l), ());
                }
            }
        }
        maximum_matching(&pattern).len() < n
    }

    fn entry_table(&self, entry: &CandidateEntry) -> Result<CoefficientTable, ExpansionError> {
        let n_vars = self.n_variables();
        match entry {
            CandidateEntry::Zero => Ok(CoefficientTable::zero(n_vars)),
            CandidateEntry::Constant(c) => Ok(CoefficientTable::constant(n_vars, *c as i128)),
            CandidateEntry::Symbolic(terms) => {
                let mut table = CoefficientTable::zero(n_vars);
                for t in terms {
                    let mono = CoefficientTable::monomial(
                        n_vars,
                        &[t.reaction, self.n_reactions + t.species],
                        t.coefficient as i128,
                    );
                    table.add_scaled(&mono, 1)?;
                }
                Ok(table)
            }
        }
    }

    /// Exact determinant as a coefficient table, by Laplace expansion along rows with
    /// minors memoised on the set of used columns.
    pub fn determinant(&self, max_terms: usize) -> Result<CoefficientTable, ExpansionError> {
        if self.size > MAX_EXPANSION_SIZE {
            return Err(ExpansionError::MatrixTooLarge(self.size));
        }
        let tables = self
            .entries
            .iter()
            .map(|row| row.iter().map(|e| self.entry_table(e)).collect())
            .collect::<Result<Vec<Vec<CoefficientTable>>, ExpansionError>>()?;
        let mut memo: HashMap<u64, CoefficientTable> = HashMap::new();
        self.expand(0, 0, &tables, &mut memo, max_terms)
    }

    fn expand(
        &self,
        row: usize,
        used: u64,
        tables: &[Vec<CoefficientTable>],
        memo: &mut HashMap<u64, CoefficientTable>,
        max_terms: usize,
    ) -> Result<CoefficientTable, ExpansionError> {
        let n_vars = self.n_variables();
        if row == self.size {
            return Ok(CoefficientTable::constant(n_vars, 1));
        }
        if let Some(done) = memo.get(&used) {
            return Ok(done.clone());
        }
        if memo.len() > MAX_MEMO_ENTRIES {
            return Err(ExpansionError::TooManyTerms(max_terms));
        }
        let mut result = CoefficientTable::zero(n_vars);
        let mut position = 0usize;
        for col in 0..self.size {
            if used & (1u64 << col) != 0 {
                continue;
            }
            let sign: i128 = if position % 2 == 0 { 1 } else { -1 };
            position += 1;
            if self.entries[row][col].is_zero() {
                continue;
            }
            let minor = self.expand(row + 1, used | (1u64 << col), tables, memo, max_terms)?;
            if minor.is_zero() {
                continue;
            }
            let product = tables[row][col].mul(&minor)?;
            result.add_scaled(&product, sign)?;
            if result.len() > max_terms {
                return Err(ExpansionError::TooManyTerms(max_terms));
            }
        }
        memo.insert(used, result.clone());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReactionNetwork::network_parser::network_from_equations;
    use approx::assert_relative_eq;

    fn candidate(equations: &[&str]) -> (CandidateMatrix, Vec<String>) {
        let network = network_from_equations(equations).unwrap();
        let m = NetworkMatrices::build(&network).unwrap();
        let c = CandidateMatrix::from_matrices(&m);
        let names = c.variable_names(&network.reaction_ids(), &network.species_names());
        (c, names)
    }

    #[test]
    fn test_injective_pair_has_constant_sign() {
        // conservation A + B replaces the first row
        let (c, names) = candidate(&["A -> B", "2B -> 2A"]);
        assert_eq!(c.size, 2);
        assert_eq!(c.entries[0][0], CandidateEntry::Constant(1));
        assert_eq!(c.expected_sign(), -1);
        let det = c.determinant(1000).unwrap();
        assert_eq!(det.sign_counts(), (0, 2));
        assert_eq!(det.format(&names), "-4*kappa_r2*lambda_B - kappa_r1*lambda_A");
    }

    #[test]
    fn test_numeric_determinant_matches_table() {
        let (c, _) = candidate(&[
            "D + X <-> DX",
            "DX + X <-> DX2",
            "DX2 -> DX2 + X",
            "X -> 0",
            "0 -> X",
        ]);
        assert!(!c.is_structurally_singular());
        let det = c.determinant(50_000).unwrap();
        let kappa: Vec<f64> = (0..c.n_reactions).map(|j| 0.3 + 0.25 * j as f64).collect();
        let lambda: Vec<f64> = (0..c.size).map(|i| 1.7 - 0.2 * i as f64).collect();
        let numeric = c.evaluate(&kappa, &lambda).determinant();
        let point: Vec<f64> = kappa.iter().chain(lambda.iter()).cloned().collect();
        assert_relative_eq!(det.evaluate(&point), numeric, epsilon = 1e-9, max_relative = 1e-9);
    }

    #[test]
    fn test_structural_singularity() {
        // P is never a reactant and not conserved: its column is empty
        let (c, _) = candidate(&["0 -> A", "A -> P"]);
        assert!(c.is_structurally_singular());
        assert!(c.determinant(1000).unwrap().is_zero());
        let (c, _) = candidate(&["0 <-> X", "2X <-> 3X"]);
        assert!(!c.is_structurally_singular());
    }

    #[test]
    fn test_term_limit() {
        let (c, _) = candidate(&[
            "D + X <-> DX",
            "DX + X <-> DX2",
            "DX2 -> DX2 + X",
            "X -> 0",
            "0 -> X",
        ]);
        assert!(matches!(c.determinant(1), Err(ExpansionError::TooManyTerms(1))));
    }
}
