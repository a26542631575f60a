//! Multivariate polynomials with integer coefficients stored as explicit coefficient
//! tables: exponent vector over the sign variables → coefficient.
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpansionError {
    #[error("determinant expansion exceeded {0} terms")]
    TooManyTerms(usize),
    #[error("integer overflow in coefficient or exponent")]
    Overflow,
    #[error("matrix of size {0} is too large for exact expansion")]
    MatrixTooLarge(usize),
}

pub type Exponent = Vec<u16>;

/// Sign and magnitude of a polynomial value evaluated in logarithmic coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogValue {
    /// -1, 0 or 1
    pub sign: i8,
    /// ln |p|, `-inf` when the value cancels
    pub log_abs: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoefficientTable {
    n_vars: usize,
    terms: BTreeMap<Exponent, i128>,
}

fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

impl CoefficientTable {
    pub fn zero(n_vars: usize) -> Self {
        Self {
            n_vars,
            terms: BTreeMap::new(),
        }
    }

    pub fn constant(n_vars: usize, c: i128) -> Self {
        let mut table = Self::zero(n_vars);
        if c != 0 {
            table.terms.insert(vec![0; n_vars], c);
        }
        table
    }

    /// `coefficient * Π_{v in vars} z_v`, repeated variables raise the power.
    pub fn monomial(n_vars: usize, vars: &[usize], coefficient: i128) -> Self {
        let mut table = Self::zero(n_vars);
        if coefficient != 0 {
            let mut exponent = vec![0u16; n_vars];
            for v in vars {
                exponent[*v] += 1;
            }
            table.terms.insert(exponent, coefficient);
        }
        table
    }

    pub fn n_vars(&self) -> usize {
        self.n_vars
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn terms(&self) -> impl Iterator<Item = (&Exponent, &i128)> {
        self.terms.iter()
    }

    pub fn coefficient(&self, exponent: &[u16]) -> i128 {
        self.terms.get(exponent).cloned().unwrap_or(0)
    }

    pub fn add_term(&mut self, exponent: Exponent, coefficient: i128) -> Result<(), ExpansionError> {
        if coefficient == 0 {
            return Ok(());
        }
        let current = self.terms.get(&exponent).cloned().unwrap_or(0);
        let sum = current
            .checked_add(coefficient)
            .ok_or(ExpansionError::Overflow)?;
        if sum == 0 {
            self.terms.remove(&exponent);
        } else {
            self.terms.insert(exponent, sum);
        }
        Ok(())
    }

    /// `self += factor * other`
    pub fn add_scaled(&mut self, other: &Self, factor: i128) -> Result<(), ExpansionError> {
        for (exponent, c) in &other.terms {
            let scaled = c.checked_mul(factor).ok_or(ExpansionError::Overflow)?;
            self.add_term(exponent.clone(), scaled)?;
        }
        Ok(())
    }

    pub fn mul(&self, other: &Self) -> Result<Self, ExpansionError> {
        let mut product = Self::zero(self.n_vars);
        for (ea, ca) in &self.terms {
            for (eb, cb) in &other.terms {
                let mut exponent = Vec::with_capacity(self.n_vars);
                for (a, b) in ea.iter().zip(eb.iter()) {
                    exponent.push(a.checked_add(*b).ok_or(ExpansionError::Overflow)?);
                }
                let c = ca.checked_mul(*cb).ok_or(ExpansionError::Overflow)?;
                product.add_term(exponent, c)?;
            }
        }
        Ok(product)
    }

    /// (number of positive coefficients, number of negative coefficients)
    pub fn sign_counts(&self) -> (usize, usize) {
        let positive = self.terms.values().filter(|c| **c > 0).count();
        (positive, self.terms.len() - positive)
    }

    /// Terms whose coefficient has the given sign, in table order.
    pub fn terms_with_sign(&self, sign: i8) -> Vec<(Exponent, i128)> {
        self.terms
            .iter()
            .filter(|(_, c)| (**c > 0) == (sign > 0))
            .map(|(e, c)| (e.clone(), *c))
            .collect()
    }

    pub fn evaluate(&self, point: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|(e, c)| {
                let mut v = *c as f64;
                for (z, p) in point.iter().zip(e.iter()) {
                    if *p != 0 {
                        v *= z.powi(*p as i32);
                    }
                }
                v
            })
            .sum()
    }

    /// Sign of the polynomial at `z = exp(log_point)`, robust to huge and tiny magnitudes.
    pub fn log_evaluate(&self, log_point: &[f64]) -> LogValue {
        let mut positive = Vec::new();
        let mut negative = Vec::new();
        for (e, c) in &self.terms {
            let mut log_term = (c.unsigned_abs() as f64).ln();
            for (z, p) in log_point.iter().zip(e.iter()) {
                log_term += *p as f64 * z;
            }
            if *c > 0 {
                positive.push(log_term);
            } else {
                negative.push(log_term);
            }
        }
        let lp = log_sum_exp(&positive);
        let ln = log_sum_exp(&negative);
        if lp == ln {
            return LogValue {
                sign: 0,
                log_abs: f64::NEG_INFINITY,
            };
        }
        let (sign, big, small) = if lp > ln { (1, lp, ln) } else { (-1, ln, lp) };
        let gap = small - big;
        if gap > -1e-12 {
            return LogValue {
                sign: 0,
                log_abs: f64::NEG_INFINITY,
            };
        }
        LogValue {
            sign,
            log_abs: big + (-gap.exp()).ln_1p(),
        }
    }

    /// Renders the table with the given variable names, e.g. `-4*k_r2*l_B - k_r1*l_A`.
    pub fn format(&self, names: &[String]) -> String {
        if self.terms.is_empty() {
            return "0".to_string();
        }
        let mut out = String::new();
        for (i, (e, c)) in self.terms.iter().enumerate() {
            let sign = if *c < 0 { "-" } else if i > 0 { "+" } else { "" };
            if i > 0 {
                out.push(' ');
            }
            out.push_str(sign);
            if i > 0 {
                out.push(' ');
            }
            let mut factors: Vec<String> = Vec::new();
            if c.unsigned_abs() != 1 || e.iter().all(|p| *p == 0) {
                factors.push(c.unsigned_abs().to_string());
            }
            for (v, p) in e.iter().enumerate() {
                let name = names.get(v).cloned().unwrap_or_else(|| format!("z{}", v));
                match p {
                    0 => {}
                    1 => factors.push(name),
                    p => factors.push(format!("{}^{}", name, p)),
                }
            }
            out.push_str(&factors.join("*"));
        }
        out
    }
}

impl fmt::Display for CoefficientTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = (0..self.n_vars).map(|v| format!("z{}", v)).collect();
        write!(f, "{}", self.format(&names))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_multiplication_and_cancellation() {
        // (z0 + z1) * (z0 - z1) = z0^2 - z1^2
        let mut a = CoefficientTable::monomial(2, &[0], 1);
        a.add_scaled(&CoefficientTable::monomial(2, &[1], 1), 1).unwrap();
        let mut b = CoefficientTable::monomial(2, &[0], 1);
        b.add_scaled(&CoefficientTable::monomial(2, &[1], 1), -1).unwrap();
        let p = a.mul(&b).unwrap();
        assert_eq!(p.len(), 2);
        assert_eq!(p.coefficient(&[2, 0]), 1);
        assert_eq!(p.coefficient(&[0, 2]), -1);
        assert_eq!(p.coefficient(&[1, 1]), 0);
        assert_eq!(p.sign_counts(), (1, 1));
    }

    #[test]
    fn test_overflow_is_reported() {
        let big = CoefficientTable::constant(1, i128::MAX / 2);
        assert_eq!(big.mul(&big), Err(ExpansionError::Overflow));
    }

    #[test]
    fn test_log_evaluate_matches_direct() {
        let mut p = CoefficientTable::monomial(2, &[0, 0], 3);
        p.add_term(vec![0, 1], -5).unwrap();
        let point = [0.7f64, 2.0];
        let log_point: Vec<f64> = point.iter().map(|v| v.ln()).collect();
        let direct = p.evaluate(&point);
        let lv = p.log_evaluate(&log_point);
        assert_eq!(lv.sign, if direct > 0.0 { 1 } else { -1 });
        assert_relative_eq!(lv.log_abs, direct.abs().ln(), epsilon = 1e-10);
        // far away in log space the z1 term dominates without overflowing
        let lv = p.log_evaluate(&[-400.0, 400.0]);
        assert_eq!(lv.sign, -1);
    }

    #[test]
    fn test_format() {
        let mut p = CoefficientTable::monomial(2, &[0, 1], -4);
        p.add_term(vec![1, 0], -1).unwrap();
        let names = vec!["a".to_string(), "b".to_string()];
        assert_eq!(p.format(&names), "-a - 4*a*b");
        assert_eq!(CoefficientTable::zero(2).format(&names), "0");
    }
}
