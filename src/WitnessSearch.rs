/// Tolerances and sampling settings of the witness search.
pub mod search_config;
/// Seeded log-uniform and log-normal draws, seed points from sign certificates.
pub mod sampling;
/// eng
/// Steady states in logarithmic coordinates:
/// 1) scaled residual (relative rate balance + relative conservation defect)
/// 2) Levenberg-Marquardt with capped steps, backtracking and a deadline
/// 3) local stability on the stoichiometric subspace
pub mod steady_state;
/// Parallel multistart search with deterministic winner selection.
pub mod multistart;
/// Continuation of a witness pair in one rate constant, bistable parameter range.
pub mod continuation;
