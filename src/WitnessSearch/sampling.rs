//! Random draws of rate constants and concentrations. Every function takes the caller's
//! generator, so a trial seeded with `seed + index` replays exactly.
use crate::SignConditions::sign_solver::SignCertificate;
use nalgebra::DMatrix;
use rand::Rng;
use rand::rngs::StdRng;
use rand_distr::StandardNormal;
use serde::Serialize;

/// ln-space bound applied to seeds derived from sign certificates
const SEED_LOG_BOUND: f64 = 15.0;

pub fn log_uniform(rng: &mut StdRng, range: (f64, f64)) -> f64 {
    let (lo, hi) = (range.0.ln(), range.1.ln());
    (lo + (hi - lo) * rng.r#gen::<f64>()).exp()
}

pub fn sample_log_uniform(rng: &mut StdRng, n: usize, range: (f64, f64)) -> Vec<f64> {
    (0..n).map(|_| log_uniform(rng, range)).collect()
}

pub fn standard_normal(rng: &mut StdRng) -> f64 {
    rng.sample(StandardNormal)
}

/// `x_i * exp(U(-ln f, ln f))`
pub fn spread_guess(rng: &mut StdRng, center: &[f64], factor: f64) -> Vec<f64> {
    let width = factor.ln();
    center
        .iter()
        .map(|x| x * (width * (2.0 * rng.r#gen::<f64>() - 1.0)).exp())
        .collect()
}

/// `x_i * exp(sigma * N(0, 1))`
pub fn log_normal_around(rng: &mut StdRng, center: &[f64], sigma: f64) -> Vec<f64> {
    center
        .iter()
        .map(|x| x * (sigma * standard_normal(rng)).exp())
        .collect()
}

/// Rate constants and concentrations suggested by a sign certificate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeedPoint {
    pub rate_constants: Vec<f64>,
    pub concentrations: Vec<f64>,
}

/// Reads a certificate point (κ, λ) as fluxes and inverse concentrations:
/// `x_i = 1 / λ_i`, `k_j = κ_j / x^{K_j}`, clamped to `exp(±15)`.
pub fn seed_from_certificate(cert: &SignCertificate, kinetic_order: &DMatrix<i64>) -> SeedPoint {
    let log_x: Vec<f64> = cert
        .log_lambda()
        .iter()
        .map(|l| (-l).clamp(-SEED_LOG_BOUND, SEED_LOG_BOUND))
        .collect();
    let rate_constants = cert
        .log_kappa()
        .iter()
        .enumerate()
        .map(|(j, log_kappa)| {
            let monomial: f64 = (0..kinetic_order.nrows())
                .map(|i| kinetic_order[(i, j)] as f64 * log_x[i])
                .sum();
            (log_kappa - monomial)
                .clamp(-SEED_LOG_BOUND, SEED_LOG_BOUND)
                .exp()
        })
        .collect();
    SeedPoint {
        rate_constants,
        concentrations: log_x.iter().map(|u| u.exp()).collect(),
    }
}
