/// Integer-coefficient polynomials as exponent → coefficient tables, with evaluation in
/// logarithmic coordinates.
pub mod polynomial;
/// eng
/// The candidate matrix N diag(κ) Kᵀ diag(λ) with conservation rows spliced in, its
/// structural singularity test and the exact expansion of its determinant.
pub mod candidate_matrix;
/// Linear programs, the `LpBackend` trait and its implementations (builtin simplex,
/// external glpsol).
pub mod lp;
/// Sign decisions on the determinant: vertex certificates, AM-GM domination,
/// feasible/infeasible/undetermined outcomes.
pub mod sign_solver;
