use crate::Analysis::config::AnalysisConfig;
use crate::Analysis::pipeline::MultistabilityAnalysis;
use crate::Decomposition::decomposer::Decomposer;
use crate::ReactionNetwork::matrices::NetworkMatrices;
use crate::ReactionNetwork::network::{Network, NetworkBuilder};
use crate::ReactionNetwork::network_parser::network_from_equations;
use crate::ReactionNetwork::symbolic_odes::format_odes;
use crate::crn_error::CrnResult;

pub fn michaelis_menten() -> CrnResult<Network> {
    let mut builder = NetworkBuilder::new();
    builder
        .add_species_in_group("E", "enzyme")
        .add_species("S")
        .add_species_in_group("C", "enzyme")
        .add_species("P")
        .add_reversible("bind", &[("S", 1), ("E", 1)], &[("C", 1)])
        .add_reaction("cat", &[("C", 1)], &[("E", 1), ("P", 1)]);
    builder.build()
}

/// Cubic autocatalysis with inflow and outflow, three positive steady states for
/// suitable rate constants.
pub fn schlogl() -> CrnResult<Network> {
    network_from_equations(&["0 <-> X", "2X <-> 3X"])
}

/// Gene with two cooperative binding sites for its own product.
pub fn cooperative_switch() -> CrnResult<Network> {
    network_from_equations(&[
        "D + X <-> DX",
        "DX + X <-> DX2",
        "DX2 -> DX2 + X",
        "X -> 0",
        "0 -> X",
    ])
}

/// Deficiency one motif where A has the same value at every positive steady state.
pub fn acr_motif() -> CrnResult<Network> {
    network_from_equations(&["A + B -> 2B", "B -> A", "A <-> C"])
}

pub fn injective_pair() -> CrnResult<Network> {
    network_from_equations(&["A -> B", "2B -> 2A"])
}

/// Two modules without common species.
pub fn independent_pair() -> CrnResult<Network> {
    network_from_equations(&["A <-> B", "0 <-> X", "2X <-> 3X"])
}

fn analyse_and_print(network: &Network, config: AnalysisConfig) -> CrnResult<()> {
    let report = MultistabilityAnalysis::new(network, config)?.run()?;
    report.print_table();
    Ok(())
}

pub fn crn_examples(task: usize) -> CrnResult<()> {
    match task {
        0 => {
            // STRUCTURE OF A NETWORK
            let network = michaelis_menten()?;
            for r in 0..network.n_reactions() {
                println!("{}", network.format_reaction(r));
            }
            let matrices = NetworkMatrices::build(&network)?;
            println!("stoichiometric matrix {}", matrices.stoichiometric);
            println!("kinetic orders {}", matrices.kinetic_order);
            println!("rank {}", matrices.rank);
            for law in matrices.conservation.describe(&network.species_names()) {
                println!("conserved: {}", law);
            }
            for ode in format_odes(&network) {
                println!("{}", ode);
            }
        }
        1 => {
            // DECOMPOSITION INTO INDEPENDENT UNITS
            let network = independent_pair()?;
            let decomposition = Decomposer::default().decompose(&network)?;
            println!(
                "network deficiency {}, {} units",
                decomposition.network_deficiency.deficiency,
                decomposition.units.len()
            );
            for unit in &decomposition.units {
                println!(
                    "unit {}: {:?} -> {:?} ({:?})",
                    unit.index,
                    unit.reaction_ids(),
                    unit.class,
                    unit.outcome
                );
            }
        }
        2 => {
            // MICHAELIS-MENTEN: NO POSITIVE STEADY STATE, INJECTIVE
            let mut config = AnalysisConfig::default();
            config.acr.enabled = false;
            analyse_and_print(&michaelis_menten()?, config)?;
        }
        3 => {
            // SCHLÖGL: BISTABILITY WITNESS AND BISTABLE RANGE
            let mut config = AnalysisConfig::default();
            config.acr.enabled = false;
            analyse_and_print(&schlogl()?, config)?;
        }
        4 => {
            // COOPERATIVE SWITCH WITH A LARGER SEARCH
            let mut config = AnalysisConfig::default();
            config.search.n_trials = 1000;
            config.acr.enabled = false;
            analyse_and_print(&cooperative_switch()?, config)?;
        }
        5 => {
            // ABSOLUTE CONCENTRATION ROBUSTNESS
            let mut config = AnalysisConfig::default();
            config.acr.fixed_rates.insert("r1".to_string(), 1.0);
            config.acr.fixed_rates.insert("r2".to_string(), 0.5);
            analyse_and_print(&acr_motif()?, config)?;
        }
        6 => {
            // CONSTANT SIGN DETERMINANT WITHOUT DECOMPOSITION
            let mut config = AnalysisConfig::default();
            config.decompose = false;
            config.acr.enabled = false;
            analyse_and_print(&injective_pair()?, config)?;
        }
        _ => println!("unknown example {}", task),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_networks_build() {
        let mm = michaelis_menten().unwrap();
        assert_eq!(mm.reaction_ids(), vec!["bind_f", "bind_r", "cat"]);
        assert_eq!(mm.n_complexes(), 3);
        assert_eq!(schlogl().unwrap().n_species(), 1);
        assert_eq!(cooperative_switch().unwrap().n_reactions(), 7);
        assert_eq!(acr_motif().unwrap().n_reactions(), 4);
        assert_eq!(injective_pair().unwrap().n_complexes(), 4);
        assert_eq!(independent_pair().unwrap().n_species(), 3);
    }

    #[test]
    fn test_structural_examples_run() {
        crn_examples(0).unwrap();
        crn_examples(1).unwrap();
        crn_examples(99).unwrap();
    }
}
