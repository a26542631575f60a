use super::exact_linalg::{integer_left_null_space, rank_i64};
use super::network::Network;
use crate::crn_error::{CrnError, CrnResult};
use log::debug;
use nalgebra::{DMatrix, DVector};
use serde::Serialize;

/// Conservation-law basis: rows `w` with `wᵀ N = 0`, in reduced row-echelon form with
/// primitive integer entries. `pivots[p]` is the species carrying the leading entry of row `p`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConservationBasis {
    pub laws: DMatrix<i64>,
    pub pivots: Vec<usize>,
}

impl ConservationBasis {
    pub fn len(&self) -> usize {
        self.laws.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.laws.nrows() == 0
    }

    /// Conservation totals `T = W x`.
    pub fn totals(&self, x: &DVector<f64>) -> DVector<f64> {
        self.laws.map(|v| v as f64) * x
    }

    /// "S + C + P" style rendering of every law.
    pub fn describe(&self, species: &[String]) -> Vec<String> {
        (0..self.laws.nrows())
            .map(|p| {
                let mut parts = Vec::new();
                for (i, name) in species.iter().enumerate() {
                    let w = self.laws[(p, i)];
                    match w {
                        0 => {}
                        1 => parts.push(name.clone()),
                        -1 => parts.push(format!("-{}", name)),
                        w => parts.push(format!("{}{}", w, name)),
                    }
                }
                parts.join(" + ").replace("+ -", "- ")
            })
            .collect()
    }
}

/// Every matrix derived from a [`Network`]. Rows follow species order, reaction columns
/// follow reaction order, complex rows/columns follow complex order.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkMatrices {
    /// N, species × reactions
    pub stoichiometric: DMatrix<i64>,
    /// K, species × reactions, reactant exponents of mass-action rates
    pub kinetic_order: DMatrix<i64>,
    /// Y, species × complexes
    pub complex_composition: DMatrix<i64>,
    /// I_a, complexes × reactions
    pub incidence: DMatrix<i64>,
    pub conservation: ConservationBasis,
    /// exact rank of N
    pub rank: usize,
}

impl NetworkMatrices {
    pub fn build(network: &Network) -> CrnResult<Self> {
        network.validate()?;
        let s = network.n_species();
        let c = network.n_complexes();
        let r = network.n_reactions();

        let mut complex_composition = DMatrix::<i64>::zeros(s, c);
        for (ci, complex) in network.complexes().iter().enumerate() {
            for (sp, coef) in complex.terms() {
                complex_composition[(*sp, ci)] = *coef as i64;
            }
        }
        let mut incidence = DMatrix::<i64>::zeros(c, r);
        let mut kinetic_order = DMatrix::<i64>::zeros(s, r);
        for (j, reaction) in network.reactions().iter().enumerate() {
            incidence[(reaction.reactant, j)] -= 1;
            incidence[(reaction.product, j)] += 1;
            for (sp, coef) in network.complexes()[reaction.reactant].terms() {
                kinetic_order[(*sp, j)] = *coef as i64;
            }
        }
        let stoichiometric = &complex_composition * &incidence;
        let rank = rank_i64(&stoichiometric);
        let (laws, pivots) = integer_left_null_space(&stoichiometric)?;
        if laws.nrows() + rank != s {
            return Err(CrnError::NumericalInstability(format!(
                "conservation basis of size {} inconsistent with rank {} and {} species",
                laws.nrows(),
                rank,
                s
            )));
        }
        debug!(
            "matrices built: {} species, {} complexes, {} reactions, rank {}, {} conservation laws",
            s,
            c,
            r,
            rank,
            laws.nrows()
        );
        Ok(Self {
            stoichiometric,
            kinetic_order,
            complex_composition,
            incidence,
            conservation: ConservationBasis { laws, pivots },
            rank,
        })
    }

    pub fn n_species(&self) -> usize {
        self.stoichiometric.nrows()
    }

    pub fn n_reactions(&self) -> usize {
        self.stoichiometric.ncols()
    }

    /// Species whose steady-state equation is kept (not replaced by a conservation law).
    pub fn non_pivot_species(&self) -> Vec<usize> {
        (0..self.n_species())
            .filter(|i| !self.conservation.pivots.contains(i))
            .collect()
    }

    /// Mass-action rates `v_j = k_j ∏ x_i^{K_ij}`.
    pub fn reaction_rates(&self, k: &[f64], x: &[f64]) -> Vec<f64> {
        (0..self.n_reactions())
            .map(|j| {
                let mut v = k[j];
                for i in 0..self.n_species() {
                    let e = self.kinetic_order[(i, j)];
                    if e != 0 {
                        v *= x[i].powi(e as i32);
                    }
                }
                v
            })
            .collect()
    }

    /// Species formation rate `f(x) = N v(x)`.
    pub fn species_formation_rate(&self, k: &[f64], x: &[f64]) -> DVector<f64> {
        let v = self.reaction_rates(k, x);
        let mut f = DVector::<f64>::zeros(self.n_species());
        for j in 0..self.n_reactions() {
            for i in 0..self.n_species() {
                let n = self.stoichiometric[(i, j)];
                if n != 0 {
                    f[i] += n as f64 * v[j];
                }
            }
        }
        f
    }

    /// Jacobian `∂f_i/∂x_l = Σ_j N_ij v_j K_lj / x_l`, valid for positive `x`.
    pub fn jacobian(&self, k: &[f64], x: &[f64]) -> DMatrix<f64> {
        let s = self.n_species();
        let v = self.reaction_rates(k, x);
        let mut jac = DMatrix::<f64>::zeros(s, s);
        for j in 0..self.n_reactions() {
            for l in 0..s {
                let e = self.kinetic_order[(l, j)];
                if e == 0 {
                    continue;
                }
                let d = v[j] * e as f64 / x[l];
                for i in 0..s {
                    let n = self.stoichiometric[(i, j)];
                    if n != 0 {
                        jac[(i, l)] += n as f64 * d;
                    }
                }
            }
        }
        jac
    }

    /// Laplacian of the weighted reaction graph, complexes × complexes, with
    /// `dx/dt = Y L(k) Ψ(x)` where `Ψ_c(x) = x^{y_c}`.
    pub fn laplacian(&self, k: &[f64]) -> DMatrix<f64> {
        let c = self.incidence.nrows();
        let mut l = DMatrix::<f64>::zeros(c, c);
        for j in 0..self.n_reactions() {
            let (mut source, mut target) = (0, 0);
            for ci in 0..c {
                match self.incidence[(ci, j)] {
                    -1 => source = ci,
                    1 => target = ci,
                    _ => {}
                }
            }
            l[(target, source)] += k[j];
            l[(source, source)] -= k[j];
        }
        l
    }
}
