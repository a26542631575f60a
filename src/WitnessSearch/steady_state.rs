//! Positive steady states on a fixed stoichiometric compatibility class.
//!
//! Unknowns are `u = ln x`, so every iterate is strictly positive. The square system is
//! - `f_q(x) / Σ_j |N_qj| v_j(x)` for each species `q` that is not a conservation pivot,
//! - `(W x - T)_p / scale_p` for each conservation law `p`,
//!
//! i.e. relative rate balances and relative conservation defects, solved by
//! Levenberg-Marquardt with a capped step and backtracking.
use super::search_config::Tolerances;
use crate::ReactionNetwork::matrices::NetworkMatrices;
use crate::crn_error::{CrnError, CrnResult};
use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use std::time::Instant;

const MAX_LOG_CONCENTRATION: f64 = 60.0;
const MAX_LOG_STEP: f64 = 2.0;
const MIN_STEP_FRACTION: f64 = 1e-4;
const INITIAL_DAMPING: f64 = 1e-3;
const MAX_DAMPING: f64 = 1e6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureReason {
    MaxIterations,
    Stalled,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SolveOutcome {
    Converged {
        x: Vec<f64>,
        residual: f64,
        iterations: usize,
    },
    Failed {
        reason: FailureReason,
    },
}

/// Steady-state equations of one network at fixed rate constants and totals.
pub struct SteadyStateProblem<'a> {
    matrices: &'a NetworkMatrices,
    rate_constants: Vec<f64>,
    rows: Vec<usize>,
    totals: DVector<f64>,
    total_scales: Vec<f64>,
}

impl<'a> SteadyStateProblem<'a> {
    /// Totals and their scales are taken from the reference state `x_ref`.
    pub fn new(matrices: &'a NetworkMatrices, rate_constants: &[f64], x_ref: &[f64]) -> Self {
        let laws = &matrices.conservation.laws;
        let x = DVector::from_column_slice(x_ref);
        let totals = matrices.conservation.totals(&x);
        let total_scales = (0..laws.nrows())
            .map(|p| {
                let weighted: f64 = (0..laws.ncols())
                    .map(|i| (laws[(p, i)] as f64).abs() * x_ref[i])
                    .sum();
                totals[p].abs().max(weighted).max(f64::MIN_POSITIVE)
            })
            .collect();
        Self {
            matrices,
            rate_constants: rate_constants.to_vec(),
            rows: matrices.non_pivot_species(),
            totals,
            total_scales,
        }
    }

    pub fn rate_constants(&self) -> &[f64] {
        &self.rate_constants
    }

    pub fn totals(&self) -> &DVector<f64> {
        &self.totals
    }

    pub fn n_species(&self) -> usize {
        self.matrices.n_species()
    }

    fn log_rates(&self, u: &[f64]) -> Vec<f64> {
        let k = &self.matrices.kinetic_order;
        (0..self.matrices.n_reactions())
            .map(|j| {
                let mut log_v = self.rate_constants[j].ln();
                for (i, ui) in u.iter().enumerate() {
                    let e = k[(i, j)];
                    if e != 0 {
                        log_v += e as f64 * ui;
                    }
                }
                log_v.exp()
            })
            .collect()
    }

    /// Scaled residual and its Jacobian with respect to `u = ln x`.
    pub fn evaluate(&self, u: &[f64]) -> (DVector<f64>, DMatrix<f64>) {
        let s = self.n_species();
        let n = &self.matrices.stoichiometric;
        let k = &self.matrices.kinetic_order;
        let v = self.log_rates(u);
        let laws = &self.matrices.conservation.laws;
        let mut residual = DVector::<f64>::zeros(s);
        let mut jac = DMatrix::<f64>::zeros(s, s);

        for (row, q) in self.rows.iter().enumerate() {
            let (mut f, mut scale) = (0.0, 0.0);
            let mut df = vec![0.0; s];
            let mut dscale = vec![0.0; s];
            for (j, vj) in v.iter().enumerate() {
                let nq = n[(*q, j)];
                if nq == 0 {
                    continue;
                }
                f += nq as f64 * vj;
                scale += (nq as f64).abs() * vj;
                for i in 0..s {
                    let e = k[(i, j)];
                    if e != 0 {
                        df[i] += nq as f64 * e as f64 * vj;
                        dscale[i] += (nq as f64).abs() * e as f64 * vj;
                    }
                }
            }
            if scale <= 0.0 || !scale.is_finite() {
                continue;
            }
            residual[row] = f / scale;
            for i in 0..s {
                jac[(row, i)] = (df[i] * scale - f * dscale[i]) / (scale * scale);
            }
        }
        let offset = self.rows.len();
        for p in 0..laws.nrows() {
            let mut total = 0.0;
            for i in 0..s {
                let w = laws[(p, i)];
                if w != 0 {
                    let term = w as f64 * u[i].exp();
                    total += term;
                    jac[(offset + p, i)] = term / self.total_scales[p];
                }
            }
            residual[offset + p] = (total - self.totals[p]) / self.total_scales[p];
        }
        (residual, jac)
    }

    /// Max-norm of the scaled residual at a positive state.
    pub fn residual_norm(&self, x: &[f64]) -> f64 {
        let u: Vec<f64> = x.iter().map(|xi| xi.ln()).collect();
        self.evaluate(&u).0.amax()
    }

    /// Relative conservation defect `max_p |(W x - T)_p| / scale_p`.
    pub fn conservation_defect(&self, x: &[f64]) -> f64 {
        let totals = self
            .matrices
            .conservation
            .totals(&DVector::from_column_slice(x));
        (0..totals.len())
            .map(|p| (totals[p] - self.totals[p]).abs() / self.total_scales[p])
            .fold(0.0, f64::max)
    }

    /// Levenberg-Marquardt from `x0`. `Err(NumericalInstability)` when an accepted
    /// iterate leaves `|ln x| <= 60` or the residual stops being finite.
    pub fn solve(
        &self,
        x0: &[f64],
        tolerance: f64,
        max_iterations: usize,
        deadline: Instant,
    ) -> CrnResult<SolveOutcome> {
        let s = self.n_species();
        let mut u: Vec<f64> = x0.iter().map(|x| x.ln()).collect();
        if u.iter().any(|ui| !ui.is_finite()) {
            return Err(CrnError::NumericalInstability(
                "initial guess is not strictly positive".to_string(),
            ));
        }
        let (mut residual, mut jac) = self.evaluate(&u);
        let mut cost = residual.norm_squared();
        let mut damping = INITIAL_DAMPING;
        for iteration in 0..max_iterations {
            let norm = residual.amax();
            if !norm.is_finite() {
                return Err(CrnError::NumericalInstability(
                    "non-finite residual".to_string(),
                ));
            }
            if norm < tolerance {
                return Ok(SolveOutcome::Converged {
                    x: u.iter().map(|ui| ui.exp()).collect(),
                    residual: norm,
                    iterations: iteration,
                });
            }
            if Instant::now() >= deadline {
                return Ok(SolveOutcome::Failed {
                    reason: FailureReason::TimedOut,
                });
            }
            let jt = jac.transpose();
            let normal = &jt * &jac;
            let gradient = &jt * &residual;
            let mut accepted = None;
            while accepted.is_none() {
                if damping > MAX_DAMPING {
                    return Ok(SolveOutcome::Failed {
                        reason: FailureReason::Stalled,
                    });
                }
                let system = &normal + DMatrix::<f64>::identity(s, s) * damping;
                let Some(mut step) = system.lu().solve(&(-&gradient)) else {
                    damping *= 10.0;
                    continue;
                };
                let longest = step.amax();
                if longest > MAX_LOG_STEP {
                    step *= MAX_LOG_STEP / longest;
                }
                let mut fraction = 1.0;
                while fraction >= MIN_STEP_FRACTION {
                    let trial: Vec<f64> = u
                        .iter()
                        .zip(step.iter())
                        .map(|(ui, di)| ui + fraction * di)
                        .collect();
                    let (r, j) = self.evaluate(&trial);
                    let trial_cost = r.norm_squared();
                    if trial_cost.is_finite() && trial_cost < cost {
                        accepted = Some((trial, r, j, trial_cost));
                        break;
                    }
                    fraction *= 0.5;
                }
                if accepted.is_none() {
                    damping *= 10.0;
                } else {
                    damping = (damping / 10.0).max(1e-12);
                }
            }
            if let Some((trial, r, j, trial_cost)) = accepted {
                if trial.iter().any(|ui| ui.abs() > MAX_LOG_CONCENTRATION) {
                    return Err(CrnError::NumericalInstability(format!(
                        "iterate left the admissible range |ln x| <= {}",
                        MAX_LOG_CONCENTRATION
                    )));
                }
                u = trial;
                residual = r;
                jac = j;
                cost = trial_cost;
            }
        }
        let norm = residual.amax();
        if norm < tolerance {
            return Ok(SolveOutcome::Converged {
                x: u.iter().map(|ui| ui.exp()).collect(),
                residual: norm,
                iterations: max_iterations,
            });
        }
        Ok(SolveOutcome::Failed {
            reason: FailureReason::MaxIterations,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stability {
    /// every eigenvalue on the stoichiometric subspace has negative real part
    Stable,
    Unstable,
    /// an eigenvalue with real part within tolerance of zero
    Marginal,
}

/// Eigenvalues `(re, im)` of the Jacobian restricted to the stoichiometric subspace and
/// the resulting stability verdict.
pub fn local_stability(
    matrices: &NetworkMatrices,
    rate_constants: &[f64],
    x: &[f64],
) -> (Stability, Vec<(f64, f64)>) {
    let n = matrices.stoichiometric.map(|v| v as f64);
    let svd = n.clone().svd(true, false);
    let Some(u) = svd.u else {
        return (Stability::Marginal, Vec::new());
    };
    let largest = svd.singular_values.amax();
    let columns: Vec<usize> = (0..svd.singular_values.len())
        .filter(|i| svd.singular_values[*i] > 1e-9 * largest.max(1.0))
        .collect();
    if columns.is_empty() {
        return (Stability::Marginal, Vec::new());
    }
    let basis = u.select_columns(columns.iter());
    let jac = matrices.jacobian(rate_constants, x);
    let reduced = basis.transpose() * jac * &basis;
    let scale = reduced.amax().max(f64::MIN_POSITIVE);
    let eigenvalues: Vec<(f64, f64)> = reduced
        .complex_eigenvalues()
        .iter()
        .map(|c| (c.re, c.im))
        .collect();
    let threshold = 1e-9 * scale;
    let stability = if eigenvalues.iter().any(|(re, _)| *re > threshold) {
        Stability::Unstable
    } else if eigenvalues.iter().any(|(re, _)| re.abs() <= threshold) {
        Stability::Marginal
    } else {
        Stability::Stable
    };
    (stability, eigenvalues)
}

/// `|x1 - x2|_inf / max(|x1|_inf, |x2|_inf)`
pub fn relative_separation(x1: &[f64], x2: &[f64]) -> f64 {
    let diff = x1
        .iter()
        .zip(x2.iter())
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max);
    let size = x1
        .iter()
        .chain(x2.iter())
        .map(|v| v.abs())
        .fold(0.0, f64::max);
    if size == 0.0 { 0.0 } else { diff / size }
}

/// Distinct within `tolerances.min_separation`.
pub fn are_distinct(x1: &[f64], x2: &[f64], tolerances: &Tolerances) -> bool {
    relative_separation(x1, x2) > tolerances.min_separation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReactionNetwork::network_parser::network_from_equations;
    use approx::assert_relative_eq;
    use std::time::Duration;

    fn matrices(equations: &[&str]) -> NetworkMatrices {
        NetworkMatrices::build(&network_from_equations(equations).unwrap()).unwrap()
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    #[test]
    fn test_isomerisation_steady_state() {
        // A <-> B with k_f = 2, k_r = 1, A + B = 3: A = 1, B = 2
        let m = matrices(&["A <-> B"]);
        let problem = SteadyStateProblem::new(&m, &[2.0, 1.0], &[1.5, 1.5]);
        match problem.solve(&[0.3, 5.0], 1e-12, 100, deadline()).unwrap() {
            SolveOutcome::Converged { x, residual, .. } => {
                assert_relative_eq!(x[0], 1.0, epsilon = 1e-9);
                assert_relative_eq!(x[1], 2.0, epsilon = 1e-9);
                assert!(residual < 1e-12);
                assert!(problem.conservation_defect(&x) < 1e-12);
                let (stability, eigenvalues) = local_stability(&m, &[2.0, 1.0], &x);
                assert_eq!(stability, Stability::Stable);
                assert_eq!(eigenvalues.len(), 1);
                assert_relative_eq!(eigenvalues[0].0, -3.0, epsilon = 1e-9);
            }
            other => panic!("no convergence: {:?}", other),
        }
    }

    #[test]
    fn test_schlogl_three_roots() {
        // rates chosen so that X = 1, 2, 3 are steady states:
        // 6 - 11 X + 6 X^2 - X^3 = (1 - X)(2 - X)(3 - X)
        let m = matrices(&["0 <-> X", "2X <-> 3X"]);
        let k = [6.0, 11.0, 6.0, 1.0];
        let problem = SteadyStateProblem::new(&m, &k, &[1.0]);
        let mut found = Vec::new();
        for guess in [0.5, 1.9, 5.0] {
            if let SolveOutcome::Converged { x, .. } =
                problem.solve(&[guess], 1e-12, 100, deadline()).unwrap()
            {
                found.push(x[0]);
            }
        }
        assert_eq!(found.len(), 3);
        assert_relative_eq!(found[0], 1.0, epsilon = 1e-8);
        assert_relative_eq!(found[2], 3.0, epsilon = 1e-8);
        let (low, _) = local_stability(&m, &k, &[1.0]);
        let (middle, _) = local_stability(&m, &k, &[2.0]);
        assert_eq!(low, Stability::Stable);
        assert_eq!(middle, Stability::Unstable);
        assert!(are_distinct(&[1.0], &[3.0], &Tolerances::default()));
    }

    #[test]
    fn test_expired_deadline() {
        let m = matrices(&["A <-> B"]);
        let problem = SteadyStateProblem::new(&m, &[2.0, 1.0], &[1.5, 1.5]);
        let outcome = problem.solve(&[0.3, 5.0], 1e-12, 100, Instant::now()).unwrap();
        assert_eq!(
            outcome,
            SolveOutcome::Failed {
                reason: FailureReason::TimedOut
            }
        );
    }

    #[test]
    fn test_non_positive_guess_is_instability() {
        let m = matrices(&["A <-> B"]);
        let problem = SteadyStateProblem::new(&m, &[1.0, 1.0], &[1.0, 1.0]);
        assert!(matches!(
            problem.solve(&[0.0, 1.0], 1e-10, 10, deadline()),
            Err(CrnError::NumericalInstability(_))
        ));
    }

    #[test]
    fn test_separation() {
        assert_relative_eq!(relative_separation(&[1.0, 2.0], &[1.0, 4.0]), 0.5);
        assert_eq!(relative_separation(&[0.0], &[0.0]), 0.0);
    }
}
