/// Immutable network model: species, complexes (multisets of species) and directed
/// reactions between complexes. `NetworkBuilder` validates every reference on `build()`,
/// so downstream stages never see an inconsistent network.
pub mod network;
/// Loader for reaction equations such as `"2A + B <-> C @ 1.0, 0.5"` or `"X -> 0"`.
/// Not part of the analysis core; the core only consumes a validated `Network`.
pub mod network_parser;
/// Exact Gauss-Jordan elimination over `BigRational`: rank, null spaces and primitive
/// integer rows.
pub mod exact_linalg;
/// eng
/// Derived matrices of a network:
/// 1) stoichiometric matrix N (species × reactions)
/// 2) kinetic-order matrix K (reactant exponents, species × reactions)
/// 3) complex composition Y and incidence I_a with N = Y I_a
/// 4) conservation-law basis, exact left null space of N
///
/// plus the mass-action formation rate, its Jacobian and the graph Laplacian.
pub mod matrices;
/// Mass-action ODEs as RustedSciThe symbolic expressions.
pub mod symbolic_odes;
mod network_tests;
