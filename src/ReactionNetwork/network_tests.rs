#[cfg(test)]
mod tests {
    use crate::crn_error::CrnError;
    use approx::assert_relative_eq;
    use crate::ReactionNetwork::matrices::NetworkMatrices;
    use crate::ReactionNetwork::network::{Complex, Network, NetworkBuilder, Reaction, Species};
    use crate::ReactionNetwork::network_parser::network_from_equations;

    fn reference_networks() -> Vec<Network> {
        vec![
            network_from_equations(&["S + E <-> C", "C -> E + P"]).unwrap(),
            network_from_equations(&["0 <-> X", "2X <-> 3X"]).unwrap(),
            network_from_equations(&["A + B -> 2B", "B -> A", "A <-> C"]).unwrap(),
            network_from_equations(&[
                "D + X <-> DX",
                "DX + X <-> DX2",
                "DX2 -> DX2 + X",
                "X -> 0",
                "0 -> X",
            ])
            .unwrap(),
        ]
    }

    #[test]
    fn test_complex_normalisation() {
        let c = Complex::new(vec![(2, 1), (0, 1), (2, 2), (1, 0)]);
        assert_eq!(c.terms(), &[(0, 1), (2, 3)]);
        assert_eq!(c.coefficient(2), 3);
        assert_eq!(c.coefficient(1), 0);
        assert!(Complex::new(vec![(1, 0)]).is_zero());
    }

    #[test]
    fn test_zero_reactions_is_malformed() {
        let mut builder = NetworkBuilder::new();
        builder.add_species("A");
        match builder.build() {
            Err(CrnError::MalformedNetwork(msg)) => assert!(msg.contains("no reactions")),
            other => panic!("expected MalformedNetwork, got {:?}", other),
        }
        let direct = Network::from_parts(vec![Species::new("A")], vec![Complex::zero()], vec![]);
        assert!(matches!(direct, Err(CrnError::MalformedNetwork(_))));
    }

    #[test]
    fn test_undeclared_species_is_malformed() {
        let mut builder = NetworkBuilder::new();
        builder.add_species("A");
        builder.add_reaction("r1", &[("A", 1)], &[("B", 1)]);
        assert!(matches!(builder.build(), Err(CrnError::MalformedNetwork(_))));
    }

    #[test]
    fn test_dangling_complex_index_is_malformed() {
        let species = vec![Species::new("A"), Species::new("B")];
        let complexes = vec![Complex::new(vec![(0, 1)]), Complex::new(vec![(1, 1)])];
        let reactions = vec![Reaction {
            id: "r1".to_string(),
            reactant: 0,
            product: 5,
            rate_symbol: "k_r1".to_string(),
            rate_constant: None,
        }];
        assert!(matches!(
            Network::from_parts(species, complexes, reactions),
            Err(CrnError::MalformedNetwork(_))
        ));
        let species = vec![Species::new("A")];
        let complexes = vec![Complex::new(vec![(3, 1)]), Complex::zero()];
        let reactions = vec![Reaction {
            id: "r1".to_string(),
            reactant: 0,
            product: 1,
            rate_symbol: "k_r1".to_string(),
            rate_constant: None,
        }];
        assert!(matches!(
            Network::from_parts(species, complexes, reactions),
            Err(CrnError::MalformedNetwork(_))
        ));
    }

    #[test]
    fn test_trivial_reaction_and_duplicate_ids_rejected() {
        let mut builder = NetworkBuilder::new();
        builder.add_species("A");
        builder.add_reaction("r1", &[("A", 1)], &[("A", 1)]);
        assert!(matches!(builder.build(), Err(CrnError::MalformedNetwork(_))));

        let mut builder = NetworkBuilder::new();
        builder.add_species("A").add_species("B");
        builder.add_reaction("r1", &[("A", 1)], &[("B", 1)]);
        builder.add_reaction("r1", &[("B", 1)], &[("A", 1)]);
        assert!(matches!(builder.build(), Err(CrnError::MalformedNetwork(_))));
    }

    #[test]
    fn test_non_positive_rate_rejected() {
        let mut builder = NetworkBuilder::new();
        builder.add_species("A").add_species("B");
        builder.add_reaction_with_rate("r1", &[("A", 1)], &[("B", 1)], 0.0);
        assert!(matches!(builder.build(), Err(CrnError::MalformedNetwork(_))));
    }

    #[test]
    fn test_complexes_deduplicated_in_first_appearance_order() {
        let network = network_from_equations(&["A + B <-> C", "C -> 2A", "B + A -> 0"]).unwrap();
        assert_eq!(network.n_complexes(), 4);
        assert_eq!(network.format_complex(0), "A + B");
        assert_eq!(network.format_complex(1), "C");
        assert_eq!(network.format_complex(2), "2A");
        assert_eq!(network.format_complex(3), "0");
        assert_eq!(network.reactions()[2].reactant, 1);
        assert_eq!(network.reactions()[2].product, 2);
        assert_eq!(network.reactions()[3].reactant, 0);
        assert_eq!(network.reactions()[3].product, 3);
        assert_eq!(network.reactions()[0].rate_symbol, "k_r1_f");
    }

    #[test]
    fn test_duplicate_reactions_merged_with_summed_rates() {
        let network =
            network_from_equations(&["A + B <-> C @ 1.0, 2.0", "C -> A + B @ 0.5", "C -> 0"])
                .unwrap();
        assert_eq!(network.n_reactions(), 3);
        assert_eq!(network.reaction_ids(), vec!["r1_f", "r1_r_r2", "r3"]);
        assert_eq!(network.reactions()[1].rate_symbol, "k_r1_r_r2");
        assert_relative_eq!(network.reactions()[1].rate_constant.unwrap(), 2.5);

        let symbolic = network_from_equations(&["A -> B", "A -> B", "B -> A"]).unwrap();
        assert_eq!(symbolic.reaction_ids(), vec!["r1_r2", "r3"]);
        assert_eq!(symbolic.reactions()[0].rate_constant, None);
    }

    #[test]
    fn test_duplicate_with_mixed_rates_rejected() {
        let mut builder = NetworkBuilder::new();
        builder.add_species("A").add_species("B");
        builder.add_reaction_with_rate("r1", &[("A", 1)], &[("B", 1)], 1.0);
        builder.add_reaction("r2", &[("A", 1)], &[("B", 1)]);
        match builder.build() {
            Err(CrnError::MalformedNetwork(msg)) => assert!(msg.contains("r1") && msg.contains("r2")),
            other => panic!("expected MalformedNetwork, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_pair_rejected_outside_builder() {
        let species = vec![Species::new("A"), Species::new("B")];
        let complexes = vec![Complex::new(vec![(0, 1)]), Complex::new(vec![(1, 1)])];
        let reaction = |id: &str| Reaction {
            id: id.to_string(),
            reactant: 0,
            product: 1,
            rate_symbol: format!("k_{}", id),
            rate_constant: None,
        };
        assert!(matches!(
            Network::from_parts(species, complexes, vec![reaction("r1"), reaction("r2")]),
            Err(CrnError::MalformedNetwork(_))
        ));
    }

    #[test]
    fn test_catalysts_and_formatting() {
        let network =
            network_from_equations(&["cat: C + E -> E + P @ 1.5", "DX2 -> DX2 + X", "2A -> 3A"])
                .unwrap();
        assert_eq!(network.catalysts(0), vec![(1, 1)]);
        assert_eq!(network.format_reaction(0), "cat: C + E -> E + P  [catalyst: E]");
        assert_eq!(network.format_reaction(1), "r2: DX2 -> DX2 + X  [catalyst: DX2]");
        assert_eq!(network.format_reaction(2), "r3: 2A -> 3A  [catalyst: 2A]");
        assert_eq!(
            network.format_reaction_kinetics(0, false, 3),
            "cat: C + E ->(1.500e0) E + P"
        );
        assert_eq!(
            network.format_reaction_kinetics(0, true, 2),
            "cat: C + E ->(1.50e0*C*E) E + P"
        );
        assert_eq!(network.format_reaction_kinetics(2, true, 3), "r3: 2A ->(k_r3*A^2) 3A");
    }

    #[test]
    fn test_without_catalysts_keeps_net_change() {
        let network = network_from_equations(&["C + E -> E + P", "2A -> 3A", "A -> P"]).unwrap();
        let stripped = network.without_catalysts().unwrap();
        assert_eq!(stripped.species_names(), network.species_names());
        assert_eq!(stripped.format_reaction(0), "r1: C -> P");
        assert_eq!(stripped.format_reaction(1), "r2: 0 -> A");
        assert!(stripped.catalysts(0).is_empty());
        let before = NetworkMatrices::build(&network).unwrap();
        let after = NetworkMatrices::build(&stripped).unwrap();
        assert_eq!(before.stoichiometric, after.stoichiometric);

        let merged = network_from_equations(&["A + E -> B + E", "A -> B"]).unwrap();
        let stripped = merged.without_catalysts().unwrap();
        assert_eq!(stripped.reaction_ids(), vec!["r1_r2"]);
    }

    #[test]
    fn test_conservation_group_labels_kept() {
        let mut builder = NetworkBuilder::new();
        builder
            .add_species("S")
            .add_species_in_group("E", "enzyme")
            .add_species_in_group("C", "enzyme")
            .add_species("P");
        builder.add_reversible("bind", &[("S", 1), ("E", 1)], &[("C", 1)]);
        builder.add_reaction("cat", &[("C", 1)], &[("E", 1), ("P", 1)]);
        let network = builder.build().unwrap();
        assert_eq!(network.species()[1].conservation_group.as_deref(), Some("enzyme"));
        assert_eq!(network.reaction_ids(), vec!["bind_f", "bind_r", "cat"]);
        assert_eq!(format!("{}", network).lines().count(), 3);
    }

    #[test]
    fn test_restriction_renumbers_consistently() {
        let network = network_from_equations(&["A <-> B", "C + D -> E", "E -> C + D"]).unwrap();
        let restricted = network.restrict_to_reactions(&[3, 2]).unwrap();
        assert_eq!(restricted.reaction_map, vec![2, 3]);
        assert_eq!(restricted.species_map, vec![2, 3, 4]);
        assert_eq!(restricted.network.species_names(), vec!["C", "D", "E"]);
        assert_eq!(restricted.network.format_reaction(0), "r2: C + D -> E");
        assert!(network.restrict_to_reactions(&[7]).is_err());
    }

    #[test]
    fn test_stoichiometry_factorises_through_complexes() {
        for network in reference_networks() {
            let m = NetworkMatrices::build(&network).unwrap();
            assert_eq!(&m.complex_composition * &m.incidence, m.stoichiometric);
        }
    }

    #[test]
    fn test_conservation_basis_size_equals_corank() {
        let expected = [(2, 2), (1, 0), (2, 1), (3, 1)];
        for (network, (rank, laws)) in reference_networks().iter().zip(expected.iter()) {
            let m = NetworkMatrices::build(network).unwrap();
            assert_eq!(m.rank, *rank);
            assert_eq!(m.conservation.len(), *laws);
            assert_eq!(m.conservation.len(), network.n_species() - m.rank);
            let product = &m.conservation.laws * &m.stoichiometric;
            assert!(product.iter().all(|v| *v == 0));
        }
    }

    #[test]
    fn test_matrices_are_deterministic() {
        let a = NetworkMatrices::build(&reference_networks()[3]).unwrap();
        let b = NetworkMatrices::build(&reference_networks()[3]).unwrap();
        assert_eq!(a.stoichiometric, b.stoichiometric);
        assert_eq!(a.kinetic_order, b.kinetic_order);
        assert_eq!(a.conservation, b.conservation);
    }
}
