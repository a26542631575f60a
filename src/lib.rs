pub mod crn_error;
#[allow(non_snake_case)]
pub mod ReactionNetwork;
#[allow(non_snake_case)]
pub mod Decomposition;
#[allow(non_snake_case)]
pub mod SignConditions;
#[allow(non_snake_case)]
pub mod WitnessSearch;
#[allow(non_snake_case)]
pub mod Analysis;
#[allow(non_snake_case)]
pub mod Utils;
#[allow(non_snake_case)]
pub mod Examples;
pub mod cli;
