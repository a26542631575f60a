//! Mass-action ODE right-hand sides as symbolic expressions, used for reporting and for
//! cross-checking the numerical formation rate.
use super::network::Network;
use RustedSciThe::symbolic::symbolic_engine::Expr;

/// Symbolic mass-action rate `k_j * x_1^a_1 * ...` of reaction `j`.
pub fn reaction_rate_expr(network: &Network, reaction: usize) -> Expr {
    let r = &network.reactions()[reaction];
    let mut rate = Expr::Var(r.rate_symbol.clone());
    for (sp, coef) in network.reactant_complex(reaction).terms() {
        let x = Expr::Var(network.species()[*sp].name.clone());
        rate = if *coef == 1 {
            rate * x
        } else {
            rate * x.pow(Expr::Const(*coef as f64))
        };
    }
    rate
}

/// `(species name, dx/dt)` for every species, rate constants kept symbolic.
pub fn mass_action_odes(network: &Network) -> Vec<(String, Expr)> {
    let rates: Vec<Expr> = (0..network.n_reactions())
        .map(|j| reaction_rate_expr(network, j))
        .collect();
    network
        .species()
        .iter()
        .enumerate()
        .map(|(i, sp)| {
            let mut rhs = Expr::Const(0.0);
            for (j, rate) in rates.iter().enumerate() {
                let net = network.product_complex(j).coefficient(i) as i64
                    - network.reactant_complex(j).coefficient(i) as i64;
                if net != 0 {
                    rhs = rhs + Expr::Const(net as f64) * rate.clone();
                }
            }
            (sp.name.clone(), rhs.symplify())
        })
        .collect()
}

/// Same as [`mass_action_odes`] with numeric rate constants substituted where the
/// network carries them.
pub fn mass_action_odes_with_rates(network: &Network) -> Vec<(String, Expr)> {
    mass_action_odes(network)
        .into_iter()
        .map(|(name, mut rhs)| {
            for r in network.reactions() {
                if let Some(k) = r.rate_constant {
                    rhs = rhs.set_variable(&r.rate_symbol, k);
                }
            }
            (name, rhs)
        })
        .collect()
}

/// Human-readable `d[X]/dt = ...` lines.
pub fn format_odes(network: &Network) -> Vec<String> {
    mass_action_odes(network)
        .iter()
        .map(|(name, rhs)| format!("d[{}]/dt = {}", name, rhs))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReactionNetwork::matrices::NetworkMatrices;
    use crate::ReactionNetwork::network_parser::network_from_equations;
    use approx::assert_relative_eq;

    #[test]
    fn test_symbolic_odes_match_numeric_rates() {
        let network = network_from_equations(&["2A + B -> C", "C -> A", "0 -> B"]).unwrap();
        let matrices = NetworkMatrices::build(&network).unwrap();
        let odes = mass_action_odes(&network);
        assert_eq!(odes.len(), 3);

        let x = [0.8, 1.7, 0.3];
        let k = [1.2, 0.4, 2.0];
        let numeric = matrices.species_formation_rate(&k, &x);

        let mut arguments: Vec<String> = network.species_names();
        arguments.extend(network.reactions().iter().map(|r| r.rate_symbol.clone()));
        let values: Vec<f64> = x.iter().chain(k.iter()).cloned().collect();
        for (i, (_, rhs)) in odes.iter().enumerate() {
            let f = rhs.clone().lambdify_owned(arguments.iter().map(|s| s.as_str()).collect());
            assert_relative_eq!(f(values.clone()), numeric[i], epsilon = 1e-10);
        }
    }

    #[test]
    fn test_rate_substitution() {
        let network = network_from_equations(&["A -> B @ 3.0", "B -> A @ 0.5"]).unwrap();
        let odes = mass_action_odes_with_rates(&network);
        let f = odes[0].1.clone().lambdify_owned(vec!["A", "B"]);
        assert_relative_eq!(f(vec![2.0, 1.0]), -3.0 * 2.0 + 0.5 * 1.0, epsilon = 1e-12);
        let lines = format_odes(&network);
        assert!(lines[0].starts_with("d[A]/dt = "));
    }
}
