//! Exact linear algebra over the rationals for integer matrices.
//!
//! Stoichiometric matrices are small integer matrices, so rank and null spaces are
//! computed with `BigRational` Gauss-Jordan elimination. A floating point rank would
//! misclassify nearly dependent columns and shift the deficiency by one.
use crate::crn_error::{CrnError, CrnResult};
use nalgebra::DMatrix;
use num::bigint::BigInt;
use num::rational::BigRational;
use num::traits::{One, Signed, ToPrimitive, Zero};
use num::Integer;

/// Dense row-major rational matrix.
pub type RationalMatrix = Vec<Vec<BigRational>>;

pub fn rational_from_i64(m: &DMatrix<i64>) -> RationalMatrix {
    (0..m.nrows())
        .map(|i| {
            (0..m.ncols())
                .map(|j| BigRational::from_integer(BigInt::from(m[(i, j)])))
                .collect()
        })
        .collect()
}

/// Gauss-Jordan elimination in place. Returns the pivot columns; the first
/// `pivots.len()` rows of `rows` form the reduced row-echelon form.
pub fn rref(rows: &mut RationalMatrix, ncols: usize) -> Vec<usize> {
    let nrows = rows.len();
    let mut pivots = Vec::new();
    let mut r = 0;
    for c in 0..ncols {
        if r == nrows {
            break;
        }
        let Some(p) = (r..nrows).find(|i| !rows[*i][c].is_zero()) else {
            continue;
        };
        rows.swap(r, p);
        let inv = rows[r][c].recip();
        for k in 0..ncols {
            rows[r][k] = &rows[r][k] * &inv;
        }
        let pivot_row = rows[r].clone();
        for i in 0..nrows {
            if i == r || rows[i][c].is_zero() {
                continue;
            }
            let factor = rows[i][c].clone();
            for k in 0..ncols {
                rows[i][k] = &rows[i][k] - &factor * &pivot_row[k];
            }
        }
        pivots.push(c);
        r += 1;
    }
    pivots
}

/// Exact rank of an integer matrix.
pub fn rank_i64(m: &DMatrix<i64>) -> usize {
    let mut rows = rational_from_i64(m);
    rref(&mut rows, m.ncols()).len()
}

/// Basis of the right null space `{v : M v = 0}`, one basis vector per row.
pub fn null_space(m: &DMatrix<i64>) -> RationalMatrix {
    let ncols = m.ncols();
    let mut rows = rational_from_i64(m);
    let pivots = rref(&mut rows, ncols);
    let free: Vec<usize> = (0..ncols).filter(|c| !pivots.contains(c)).collect();
    free.iter()
        .map(|f| {
            let mut v = vec![BigRational::zero(); ncols];
            v[*f] = BigRational::one();
            for (r, pc) in pivots.iter().enumerate() {
                v[*pc] = -rows[r][*f].clone();
            }
            v
        })
        .collect()
}

/// Basis of the left null space `{w : wᵀ M = 0}`, one basis vector per row.
pub fn left_null_space(m: &DMatrix<i64>) -> RationalMatrix {
    null_space(&m.transpose())
}

/// Scales a rational row by a positive factor so that its entries are coprime integers.
pub fn to_primitive_integer_row(row: &[BigRational]) -> CrnResult<Vec<i64>> {
    let mut denominator_lcm = BigInt::one();
    for q in row {
        denominator_lcm = denominator_lcm.lcm(q.denom());
    }
    let scaled: Vec<BigInt> = row
        .iter()
        .map(|q| q.numer() * (&denominator_lcm / q.denom()))
        .collect();
    let mut common = BigInt::zero();
    for v in &scaled {
        common = common.gcd(v);
    }
    if common.is_zero() {
        return Ok(vec![0; row.len()]);
    }
    let common = common.abs();
    scaled
        .iter()
        .map(|v| {
            (v / &common).to_i64().ok_or_else(|| {
                CrnError::NumericalInstability(format!("integer overflow in row entry {}", v))
            })
        })
        .collect()
}

/// Left null space of `m` in reduced row-echelon form with primitive integer rows.
/// Returns the basis (rows) and the pivot column of every row.
pub fn integer_left_null_space(m: &DMatrix<i64>) -> CrnResult<(DMatrix<i64>, Vec<usize>)> {
    let n = m.nrows();
    let mut basis = left_null_space(m);
    let pivots = rref(&mut basis, n);
    let mut laws = DMatrix::<i64>::zeros(pivots.len(), n);
    for (r, row) in basis.iter().take(pivots.len()).enumerate() {
        let integer_row = to_primitive_integer_row(row)?;
        for (c, v) in integer_row.into_iter().enumerate() {
            laws[(r, c)] = v;
        }
    }
    Ok((laws, pivots))
}

/// One exact solution of `A x = b` (free variables set to zero), `None` when the
/// system is inconsistent. `augmented` holds the rows `[A | b]` with `ncols` columns of `A`.
pub fn solve_exact(mut augmented: RationalMatrix, ncols: usize) -> Option<Vec<BigRational>> {
    let pivots = rref(&mut augmented, ncols + 1);
    if pivots.last() == Some(&ncols) {
        return None;
    }
    let mut x = vec![BigRational::zero(); ncols];
    for (r, pc) in pivots.iter().enumerate() {
        x[*pc] = augmented[r][ncols].clone();
    }
    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(n: i64, d: i64) -> BigRational {
        BigRational::new(BigInt::from(n), BigInt::from(d))
    }

    #[test]
    fn test_rank_of_dependent_columns() {
        // S + E <-> C -> E + P
        let n = DMatrix::from_row_slice(4, 3, &[-1, 1, 0, -1, 1, 1, 1, -1, -1, 0, 0, 1]);
        assert_eq!(rank_i64(&n), 2);
        let zero = DMatrix::<i64>::zeros(3, 2);
        assert_eq!(rank_i64(&zero), 0);
    }

    #[test]
    fn test_null_space_annihilates() {
        let m = DMatrix::from_row_slice(2, 4, &[1, 2, 0, -1, 0, 0, 1, 3]);
        let basis = null_space(&m);
        assert_eq!(basis.len(), 2);
        let mq = rational_from_i64(&m);
        for v in &basis {
            for row in &mq {
                let dot = row
                    .iter()
                    .zip(v.iter())
                    .fold(BigRational::zero(), |acc, (a, b)| acc + a * b);
                assert!(dot.is_zero());
            }
        }
    }

    #[test]
    fn test_primitive_integer_row() {
        let row = vec![q(1, 2), q(-1, 3), BigRational::zero()];
        assert_eq!(to_primitive_integer_row(&row).unwrap(), vec![3, -2, 0]);
        let row = vec![q(4, 1), q(6, 1)];
        assert_eq!(to_primitive_integer_row(&row).unwrap(), vec![2, 3]);
        let row = vec![BigRational::zero(); 2];
        assert_eq!(to_primitive_integer_row(&row).unwrap(), vec![0, 0]);
    }

    #[test]
    fn test_solve_exact() {
        // x + y = 1, x - y = 0
        let system = vec![vec![q(1, 1), q(1, 1), q(1, 1)], vec![q(1, 1), q(-1, 1), q(0, 1)]];
        assert_eq!(solve_exact(system, 2).unwrap(), vec![q(1, 2), q(1, 2)]);
        // x + y = 1, 2x + 2y = 3
        let system = vec![vec![q(1, 1), q(1, 1), q(1, 1)], vec![q(2, 1), q(2, 1), q(3, 1)]];
        assert!(solve_exact(system, 2).is_none());
        // underdetermined: free y set to zero
        let system = vec![vec![q(1, 1), q(2, 1), q(4, 1)]];
        assert_eq!(solve_exact(system, 2).unwrap(), vec![q(4, 1), q(0, 1)]);
    }

    #[test]
    fn test_enzyme_conservation_laws() {
        // species S, E, C, P
        let n = DMatrix::from_row_slice(4, 3, &[-1, 1, 0, -1, 1, 1, 1, -1, -1, 0, 0, 1]);
        let (laws, pivots) = integer_left_null_space(&n).unwrap();
        assert_eq!(laws.nrows(), 2);
        assert_eq!(pivots, vec![0, 1]);
        // S + C + P and E + C
        assert_eq!(laws.row(0).iter().cloned().collect::<Vec<i64>>(), vec![1, 0, 1, 1]);
        assert_eq!(laws.row(1).iter().cloned().collect::<Vec<i64>>(), vec![0, 1, 1, 0]);
        let product = &laws * &n;
        assert!(product.iter().all(|v| *v == 0));
    }
}
