//! Deciding whether a determinant polynomial can take a given sign on the positive orthant.
//!
//! For a sign σ the decision runs, cheapest first:
//! 1. no coefficient of sign σ: σ is unattainable;
//! 2. the all-ones point already has sign σ: attainable, certified;
//! 3. a σ-term whose exponent is a vertex of the Newton polytope (an LP over directions
//!    `c ∈ [-1, 1]^D`) dominates along that direction: attainable, certified by a point;
//! 4. every σ-term dominated by a weighted AM-GM bound over the opposite terms (an LP over
//!    convex weights): unattainable;
//! 5. otherwise attainable without certificate.
//!
//! Borderline LP results fall on the attainable side, so a sign change is never ruled
//! out by rounding.
use super::candidate_matrix::CandidateMatrix;
use super::lp::{
    Comparison, Direction, LinearProgram, LpBackend, LpBackendConfig, LpOutcome, LpSolverKind,
};
use super::polynomial::{CoefficientTable, Exponent, ExpansionError};
use crate::ReactionNetwork::exact_linalg::solve_exact;
use crate::crn_error::{CrnError, CrnResult};
use log::{debug, info};
use num::bigint::BigInt;
use num::rational::BigRational;
use num::traits::{One, Signed, ToPrimitive};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignTarget {
    StrictlyPositive,
    StrictlyNegative,
    ChangesSign,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignConditionConfig {
    /// LP tolerance; vertex margins and domination gaps must exceed it
    pub tolerance: f64,
    pub lp_timeout_ms: u64,
    /// expansion is abandoned (outcome `Undetermined`) above this many terms
    pub max_sign_terms: usize,
    /// vertex LPs tried per sign before falling back to the domination test
    pub max_vertex_checks: usize,
    pub backend: LpBackendConfig,
}

impl Default for SignConditionConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-9,
            lp_timeout_ms: 5000,
            max_sign_terms: 50_000,
            max_vertex_checks: 64,
            backend: LpBackendConfig::Builtin,
        }
    }
}

/// Determinant polynomial together with the sign pattern it is asked to realise.
#[derive(Debug, Clone)]
pub struct SignCondition {
    pub determinant: CoefficientTable,
    pub target: SignTarget,
    /// sign taken on injective networks, `(-1)^rank`
    pub expected_sign: i8,
    /// the first `n_reactions` variables are fluxes κ, the rest inverse concentrations λ
    pub n_reactions: usize,
}

impl SignCondition {
    pub fn new(determinant: CoefficientTable, target: SignTarget, expected_sign: i8) -> Self {
        Self {
            determinant,
            target,
            expected_sign,
            n_reactions: 0,
        }
    }

    pub fn from_candidate(
        candidate: &CandidateMatrix,
        target: SignTarget,
        max_terms: usize,
    ) -> Result<Self, ExpansionError> {
        Ok(Self {
            determinant: candidate.determinant(max_terms)?,
            target,
            expected_sign: candidate.expected_sign(),
            n_reactions: candidate.n_reactions,
        })
    }
}

/// Point `z = exp(log_point)` at which the determinant has sign `sign`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignCertificate {
    pub sign: i8,
    pub log_point: Vec<f64>,
    /// ln |det| at the point
    pub log_value: f64,
    pub n_reactions: usize,
}

impl SignCertificate {
    /// ln κ, one entry per reaction
    pub fn log_kappa(&self) -> &[f64] {
        &self.log_point[..self.n_reactions]
    }

    /// ln λ, one entry per species
    pub fn log_lambda(&self) -> &[f64] {
        &self.log_point[self.n_reactions..]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SignOutcome {
    /// the requested sign pattern is attainable; `certified` when every required sign
    /// has a certificate point
    Feasible {
        certificates: Vec<SignCertificate>,
        certified: bool,
    },
    /// no positive assignment realises the pattern
    Infeasible { reason: String },
    /// the condition could not be posed (expansion too large)
    Undetermined { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SignReport {
    pub target: SignTarget,
    pub outcome: SignOutcome,
    pub n_terms: usize,
    pub n_positive: usize,
    pub n_negative: usize,
    pub lp_calls: usize,
    pub expected_sign: i8,
}

impl SignReport {
    pub fn is_feasible(&self) -> bool {
        matches!(self.outcome, SignOutcome::Feasible { .. })
    }

    pub fn is_infeasible(&self) -> bool {
        matches!(self.outcome, SignOutcome::Infeasible { .. })
    }

    /// Certificate with the sign opposite to the injective one, the natural starting
    /// point of a witness search.
    pub fn guiding_certificate(&self) -> Option<&SignCertificate> {
        match &self.outcome {
            SignOutcome::Feasible { certificates, .. } => certificates
                .iter()
                .find(|c| c.sign == -self.expected_sign)
                .or_else(|| certificates.first()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
enum Attainability {
    Impossible(String),
    Possible(Option<SignCertificate>),
}

fn sign_name(sign: i8) -> &'static str {
    if sign > 0 { "positive" } else { "negative" }
}

pub struct SignConditionSolver {
    config: SignConditionConfig,
    backend: LpSolverKind,
}

impl SignConditionSolver {
    pub fn new(config: &SignConditionConfig) -> Self {
        let backend = config
            .backend
            .build(Duration::from_millis(config.lp_timeout_ms));
        Self::with_backend(config, backend)
    }

    pub fn with_backend(config: &SignConditionConfig, backend: LpSolverKind) -> Self {
        Self {
            config: config.clone(),
            backend,
        }
    }

    pub fn backend_name(&self) -> String {
        self.backend.name()
    }

    /// Expands the determinant of `candidate` and decides `target`.
    pub fn solve(&self, candidate: &CandidateMatrix, target: SignTarget) -> CrnResult<SignReport> {
        match SignCondition::from_candidate(candidate, target, self.config.max_sign_terms) {
            Ok(condition) => self.decide(&condition),
            Err(e) => {
                info!("sign condition not posed: {}", e);
                Ok(SignReport {
                    target,
                    outcome: SignOutcome::Undetermined {
                        reason: e.to_string(),
                    },
                    n_terms: 0,
                    n_positive: 0,
                    n_negative: 0,
                    lp_calls: 0,
                    expected_sign: candidate.expected_sign(),
                })
            }
        }
    }

    pub fn decide(&self, condition: &SignCondition) -> CrnResult<SignReport> {
        let table = &condition.determinant;
        let (n_positive, n_negative) = table.sign_counts();
        let mut lp_calls = 0usize;
        let outcome = if table.is_zero() {
            match condition.target {
                SignTarget::ChangesSign => SignOutcome::Feasible {
                    certificates: Vec::new(),
                    certified: false,
                },
                _ => SignOutcome::Infeasible {
                    reason: "determinant vanishes identically".to_string(),
                },
            }
        } else {
            let required: Vec<i8> = match condition.target {
                SignTarget::StrictlyPositive => vec![1],
                SignTarget::StrictlyNegative => vec![-1],
                SignTarget::ChangesSign => vec![1, -1],
            };
            let mut certificates = Vec::new();
            let mut certified = true;
            let mut impossible = None;
            for sigma in required {
                match self.attainability(table, sigma, condition.n_reactions, &mut lp_calls)? {
                    Attainability::Impossible(reason) => {
                        impossible = Some(reason);
                        break;
                    }
                    Attainability::Possible(Some(cert)) => certificates.push(cert),
                    Attainability::Possible(None) => certified = false,
                }
            }
            match impossible {
                Some(reason) => SignOutcome::Infeasible { reason },
                None => SignOutcome::Feasible {
                    certificates,
                    certified,
                },
            }
        };
        debug!(
            "sign condition {:?}: {} terms (+{} / -{}), {} LP calls -> {:?}",
            condition.target,
            table.len(),
            n_positive,
            n_negative,
            lp_calls,
            outcome
        );
        Ok(SignReport {
            target: condition.target,
            outcome,
            n_terms: table.len(),
            n_positive,
            n_negative,
            lp_calls,
            expected_sign: condition.expected_sign,
        })
    }

    fn attainability(
        &self,
        table: &CoefficientTable,
        sigma: i8,
        n_reactions: usize,
        lp_calls: &mut usize,
    ) -> CrnResult<Attainability> {
        let sigma_terms = table.terms_with_sign(sigma);
        if sigma_terms.is_empty() {
            return Ok(Attainability::Impossible(format!(
                "no {} coefficient in the determinant",
                sign_name(sigma)
            )));
        }
        let origin = vec![0.0; table.n_vars()];
        if let Some(cert) = certificate_at(table, &origin, sigma, n_reactions) {
            return Ok(Attainability::Possible(Some(cert)));
        }

        let active = active_dimensions(table);
        for (exponent, _) in sigma_terms.iter().take(self.config.max_vertex_checks) {
            if let Some(direction) = self.vertex_direction(table, exponent, &active, lp_calls)? {
                let mut scale = 1.0;
                while scale <= 1024.0 {
                    let point: Vec<f64> = direction.iter().map(|c| c * scale).collect();
                    if let Some(cert) = certificate_at(table, &point, sigma, n_reactions) {
                        return Ok(Attainability::Possible(Some(cert)));
                    }
                    scale *= 2.0;
                }
            }
        }

        let opposite = table.terms_with_sign(-sigma);
        let n_sigma = sigma_terms.len() as f64;
        let mut all_dominated = true;
        for (exponent, coefficient) in &sigma_terms {
            if !self.dominated(exponent, *coefficient, &opposite, n_sigma, &active, lp_calls)? {
                all_dominated = false;
                break;
            }
        }
        if all_dominated {
            return Ok(Attainability::Impossible(format!(
                "every {} term is dominated by opposite terms (AM-GM)",
                sign_name(sigma)
            )));
        }
        Ok(Attainability::Possible(None))
    }

    /// Direction `c` along which `exponent` strictly maximises `⟨c, e⟩` over the support,
    /// if the exponent is a vertex of the Newton polytope.
    fn vertex_direction(
        &self,
        table: &CoefficientTable,
        exponent: &Exponent,
        active: &[usize],
        lp_calls: &mut usize,
    ) -> CrnResult<Option<Vec<f64>>> {
        if active.is_empty() {
            return Ok(None);
        }
        let mut lp = LinearProgram::new(Direction::Maximize);
        let c: Vec<usize> = active
            .iter()
            .map(|d| lp.add_variable(&format!("c{}", d), 0.0, -1.0, 1.0))
            .collect();
        let t = lp.add_variable("t", 1.0, f64::NEG_INFINITY, 1.0);
        for (other, _) in table.terms() {
            if other == exponent {
                continue;
            }
            let mut row: Vec<(usize, f64)> = active
                .iter()
                .zip(c.iter())
                .filter_map(|(d, var)| {
                    let diff = exponent[*d] as f64 - other[*d] as f64;
                    (diff != 0.0).then_some((*var, diff))
                })
                .collect();
            row.push((t, -1.0));
            lp.add_constraint(row, Comparison::Ge, 0.0);
        }
        *lp_calls += 1;
        match self.backend.solve(&lp).map_err(annotate_backend)? {
            LpOutcome::Optimal { objective, values } if objective > self.config.tolerance => {
                let mut direction = vec![0.0; table.n_vars()];
                for (d, var) in active.iter().zip(c.iter()) {
                    direction[*d] = values[*var];
                }
                Ok(Some(direction))
            }
            _ => Ok(None),
        }
    }

    /// Weighted AM-GM: with convex weights μ over opposite terms reproducing `exponent`,
    /// `Σ μ_i (|c_i|/n_σ) z^{e_i} / μ_i ≥ B z^{exponent}`, `ln B = Σ μ_i ln(|c_i| / (n_σ μ_i))`.
    /// The σ-term is dominated when `ln B` exceeds `ln |c_v|` by more than the tolerance.
    fn dominated(
        &self,
        exponent: &Exponent,
        coefficient: i128,
        opposite: &[(Exponent, i128)],
        n_sigma: f64,
        active: &[usize],
        lp_calls: &mut usize,
    ) -> CrnResult<bool> {
        if opposite.is_empty() {
            return Ok(false);
        }
        let mut lp = LinearProgram::new(Direction::Maximize);
        let weights: Vec<usize> = opposite
            .iter()
            .enumerate()
            .map(|(i, (_, c))| {
                let gain = (c.unsigned_abs() as f64 / n_sigma).ln();
                lp.add_variable(&format!("mu{}", i), gain, 0.0, 1.0)
            })
            .collect();
        for d in active {
            let row: Vec<(usize, f64)> = opposite
                .iter()
                .zip(weights.iter())
                .filter(|((e, _), _)| e[*d] != 0)
                .map(|((e, _), w)| (*w, e[*d] as f64))
                .collect();
            lp.add_constraint(row, Comparison::Eq, exponent[*d] as f64);
        }
        lp.add_constraint(
            weights.iter().map(|w| (*w, 1.0)).collect(),
            Comparison::Eq,
            1.0,
        );
        *lp_calls += 1;
        let values = match self.backend.solve(&lp).map_err(annotate_backend)? {
            LpOutcome::Optimal { values, .. } => values,
            _ => return Ok(false),
        };
        let approximate: Vec<f64> = weights.iter().map(|w| values[*w]).collect();
        let Some(mu) = exact_amgm_weights(exponent, opposite, active, &approximate) else {
            debug!("AM-GM weights for {:?} not reproducible exactly", exponent);
            return Ok(false);
        };
        let log_bound: f64 = opposite
            .iter()
            .zip(mu.iter())
            .filter(|(_, m)| **m > 0.0)
            .map(|((_, c), m)| m * ((c.unsigned_abs() as f64 / n_sigma).ln() - m.ln()))
            .sum();
        Ok(log_bound > (coefficient.unsigned_abs() as f64).ln() + self.config.tolerance)
    }
}

/// Re-solves the AM-GM weight system in exact arithmetic on the support of the LP
/// weights. Returns convex weights reproducing `exponent` on every active dimension, or
/// `None` when the support admits no exact nonnegative solution.
fn exact_amgm_weights(
    exponent: &Exponent,
    opposite: &[(Exponent, i128)],
    active: &[usize],
    approximate: &[f64],
) -> Option<Vec<f64>> {
    let support: Vec<usize> = (0..opposite.len())
        .filter(|i| approximate.get(*i).is_some_and(|m| *m > 1e-12))
        .collect();
    if support.is_empty() {
        return None;
    }
    let integer = |v: u16| BigRational::from_integer(BigInt::from(v));
    let mut system: Vec<Vec<BigRational>> = active
        .iter()
        .map(|d| {
            let mut row: Vec<BigRational> =
                support.iter().map(|i| integer(opposite[*i].0[*d])).collect();
            row.push(integer(exponent[*d]));
            row
        })
        .collect();
    system.push(vec![BigRational::one(); support.len() + 1]);
    let exact = solve_exact(system, support.len())?;
    if exact.iter().any(|m| m.is_negative()) {
        return None;
    }
    let mut mu = vec![0.0; opposite.len()];
    for (i, m) in support.iter().zip(exact.iter()) {
        mu[*i] = m.to_f64()?;
    }
    Some(mu)
}

fn annotate_backend(e: CrnError) -> CrnError {
    match e {
        CrnError::SolverError(msg) => CrnError::SolverError(format!("sign condition LP: {}", msg)),
        other => other,
    }
}

/// Variables whose exponent is not the same in every term.
fn active_dimensions(table: &CoefficientTable) -> Vec<usize> {
    let mut terms = table.terms();
    let Some((first, _)) = terms.next() else {
        return Vec::new();
    };
    let mut active = vec![false; table.n_vars()];
    for (e, _) in terms {
        for (d, (a, b)) in first.iter().zip(e.iter()).enumerate() {
            if a != b {
                active[d] = true;
            }
        }
    }
    (0..table.n_vars()).filter(|d| active[*d]).collect()
}

fn certificate_at(
    table: &CoefficientTable,
    log_point: &[f64],
    sigma: i8,
    n_reactions: usize,
) -> Option<SignCertificate> {
    let value = table.log_evaluate(log_point);
    (value.sign == sigma).then(|| SignCertificate {
        sign: sigma,
        log_point: log_point.to_vec(),
        log_value: value.log_abs,
        n_reactions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReactionNetwork::matrices::NetworkMatrices;
    use crate::ReactionNetwork::network_parser::network_from_equations;

    fn solver() -> SignConditionSolver {
        SignConditionSolver::new(&SignConditionConfig::default())
    }

    fn candidate(equations: &[&str]) -> CandidateMatrix {
        let network = network_from_equations(equations).unwrap();
        CandidateMatrix::from_matrices(&NetworkMatrices::build(&network).unwrap())
    }

    #[test]
    fn test_constant_sign_is_infeasible_without_lp() {
        let report = solver()
            .solve(&candidate(&["A -> B", "2B -> 2A"]), SignTarget::ChangesSign)
            .unwrap();
        assert!(report.is_infeasible());
        assert_eq!(report.lp_calls, 0);
        assert_eq!((report.n_positive, report.n_negative), (0, 2));
        assert!(report.guiding_certificate().is_none());
    }

    #[test]
    fn test_schlogl_sign_change_certified() {
        let report = solver()
            .solve(&candidate(&["0 <-> X", "2X <-> 3X"]), SignTarget::ChangesSign)
            .unwrap();
        match &report.outcome {
            SignOutcome::Feasible {
                certificates,
                certified,
            } => {
                assert!(*certified);
                assert_eq!(certificates.len(), 2);
            }
            other => panic!("expected Feasible, got {:?}", other),
        }
        // rank one: the injective sign is negative, the guide must be positive
        assert_eq!(report.expected_sign, -1);
        let guide = report.guiding_certificate().unwrap();
        assert_eq!(guide.sign, 1);
        assert_eq!(guide.log_kappa().len(), 4);
        assert_eq!(guide.log_lambda().len(), 1);
    }

    #[test]
    fn test_amgm_domination_excludes_sign() {
        // z0^2 + z1^2 - z0 z1 > 0 on the positive orthant
        let mut p = CoefficientTable::monomial(2, &[0, 0], 1);
        p.add_term(vec![0, 2], 1).unwrap();
        p.add_term(vec![1, 1], -1).unwrap();
        let condition = SignCondition::new(p.clone(), SignTarget::ChangesSign, 1);
        let report = solver().decide(&condition).unwrap();
        match &report.outcome {
            SignOutcome::Infeasible { reason } => assert!(reason.contains("dominated")),
            other => panic!("expected Infeasible, got {:?}", other),
        }
        assert!(report.lp_calls >= 2);
        let positive = SignCondition::new(p, SignTarget::StrictlyPositive, 1);
        assert!(solver().decide(&positive).unwrap().is_feasible());
    }

    #[test]
    fn test_amgm_weights_recomputed_exactly() {
        let opposite = vec![(vec![2u16, 0], -1i128), (vec![0u16, 2], -1i128)];
        let exponent = vec![1u16, 1];
        // slightly perturbed LP weights are replaced by the exact convex combination
        let mu = exact_amgm_weights(&exponent, &opposite, &[0, 1], &[0.5 + 3e-9, 0.5 - 3e-9])
            .unwrap();
        assert_eq!(mu, vec![0.5, 0.5]);
    }

    #[test]
    fn test_amgm_weights_rejected_when_not_exact() {
        let exponent = vec![1u16, 1];
        // reproduces the exponent but the weights do not sum to one
        let opposite = vec![(vec![2u16, 2], -1i128), (vec![0u16, 0], -1i128)];
        assert!(exact_amgm_weights(&exponent, &opposite, &[0, 1], &[0.5, 0.0]).is_none());

        // nearly parallel far exponents: the only exact combination has a negative weight
        let opposite = vec![
            (vec![0u16, 0], -1i128),
            (vec![65535u16, 65534], -1i128),
            (vec![65534u16, 65533], -1i128),
        ];
        assert!(exact_amgm_weights(&exponent, &opposite, &[0, 1], &[1e-9, 1.0, 1e-9]).is_none());
        assert!(exact_amgm_weights(&exponent, &opposite, &[0, 1], &[0.0, 0.0, 0.0]).is_none());
    }

    #[test]
    fn test_ill_conditioned_polynomial_never_proven_sign_definite() {
        // 1 + z0^65535 z1^65534 + z0^65534 z1^65533 - z0 z1 takes negative values only far
        // from the origin; whatever the LP reports, it must not be declared impossible
        let mut p = CoefficientTable::zero(2);
        p.add_term(vec![0, 0], 1).unwrap();
        p.add_term(vec![65535, 65534], 1).unwrap();
        p.add_term(vec![65534, 65533], 1).unwrap();
        p.add_term(vec![1, 1], -1).unwrap();
        let condition = SignCondition::new(p, SignTarget::StrictlyNegative, 1);
        let report = solver().decide(&condition).unwrap();
        assert!(!report.is_infeasible());
    }

    #[test]
    fn test_origin_certificate() {
        // z0^2 + z1^2 - 3 z0 z1 is negative at (1, 1)
        let mut p = CoefficientTable::monomial(2, &[0, 0], 1);
        p.add_term(vec![0, 2], 1).unwrap();
        p.add_term(vec![1, 1], -3).unwrap();
        let report = solver()
            .decide(&SignCondition::new(p.clone(), SignTarget::StrictlyNegative, 1))
            .unwrap();
        match &report.outcome {
            SignOutcome::Feasible { certificates, certified } => {
                assert!(*certified);
                assert_eq!(certificates[0].log_point, vec![0.0, 0.0]);
            }
            other => panic!("expected Feasible, got {:?}", other),
        }
        assert_eq!(report.lp_calls, 0);
        let cert_value = p.evaluate(&[1.0, 1.0]);
        assert!(cert_value < 0.0);
    }

    #[test]
    fn test_vertex_certificate_far_from_origin() {
        // -10 z0 + z0^2: positive for large z0, negative at the origin
        let mut p = CoefficientTable::monomial(1, &[0], -10);
        p.add_term(vec![2], 1).unwrap();
        let report = solver()
            .decide(&SignCondition::new(p.clone(), SignTarget::StrictlyPositive, 1))
            .unwrap();
        match &report.outcome {
            SignOutcome::Feasible { certificates, certified } => {
                assert!(*certified);
                let z = certificates[0].log_point[0].exp();
                assert!(p.evaluate(&[z]) > 0.0);
            }
            other => panic!("expected Feasible, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_determinant() {
        let zero = CoefficientTable::zero(3);
        let report = solver()
            .decide(&SignCondition::new(zero.clone(), SignTarget::ChangesSign, 1))
            .unwrap();
        assert!(report.is_feasible());
        let report = solver()
            .decide(&SignCondition::new(zero, SignTarget::StrictlyPositive, 1))
            .unwrap();
        assert!(report.is_infeasible());
    }

    #[test]
    fn test_expansion_limit_gives_undetermined() {
        let config = SignConditionConfig {
            max_sign_terms: 1,
            ..SignConditionConfig::default()
        };
        let report = SignConditionSolver::new(&config)
            .solve(&candidate(&["0 <-> X", "2X <-> 3X", "X + Y <-> 2Y", "Y -> 0"]), SignTarget::ChangesSign)
            .unwrap();
        assert!(matches!(report.outcome, SignOutcome::Undetermined { .. }));
    }

    #[test]
    fn test_missing_external_solver_is_error() {
        let config = SignConditionConfig {
            backend: LpBackendConfig::Glpk {
                binary: "/nonexistent/glpsol".to_string(),
            },
            ..SignConditionConfig::default()
        };
        let mut p = CoefficientTable::monomial(1, &[0], -10);
        p.add_term(vec![2], 1).unwrap();
        let result = SignConditionSolver::new(&config)
            .decide(&SignCondition::new(p, SignTarget::StrictlyPositive, 1));
        assert!(matches!(result, Err(CrnError::SolverError(_))));
    }
}
