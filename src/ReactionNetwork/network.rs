use crate::crn_error::{CrnError, CrnResult};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// A chemical species. `conservation_group` is an optional user label marking membership
/// in a known total (e.g. all forms of an enzyme); it is informational, the conservation
/// laws themselves are always computed from the stoichiometry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Species {
    pub name: String,
    pub conservation_group: Option<String>,
}

impl Species {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            conservation_group: None,
        }
    }
}

/// Multiset of species: sorted pairs (species index, stoichiometric coefficient).
/// The empty multiset is the zero complex used for inflow and outflow reactions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Complex {
    terms: Vec<(usize, u32)>,
}

impl Complex {
    /// merges repeated species and drops zero coefficients
    pub fn new(terms: Vec<(usize, u32)>) -> Self {
        let mut merged: Vec<(usize, u32)> = Vec::with_capacity(terms.len());
        let mut sorted = terms;
        sorted.sort_by_key(|(species, _)| *species);
        for (species, coefficient) in sorted {
            if coefficient == 0 {
                continue;
            }
            match merged.last_mut() {
                Some((last, total)) if *last == species => *total += coefficient,
                _ => merged.push((species, coefficient)),
            }
        }
        Self { terms: merged }
    }

    pub fn zero() -> Self {
        Self { terms: Vec::new() }
    }

    pub fn terms(&self) -> &[(usize, u32)] {
        &self.terms
    }

    pub fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn coefficient(&self, species: usize) -> u32 {
        self.terms
            .iter()
            .find(|(s, _)| *s == species)
            .map(|(_, c)| *c)
            .unwrap_or(0)
    }

    pub fn species(&self) -> impl Iterator<Item = usize> + '_ {
        self.terms.iter().map(|(s, _)| *s)
    }

    /// "2A + B" or "0"
    pub fn format(&self, species: &[Species]) -> String {
        if self.is_zero() {
            return "0".to_string();
        }
        self.terms
            .iter()
            .map(|(s, c)| {
                let name = species
                    .get(*s)
                    .map(|sp| sp.name.clone())
                    .unwrap_or_else(|| format!("#{}", s));
                if *c == 1 {
                    name
                } else {
                    format!("{}{}", c, name)
                }
            })
            .collect::<Vec<String>>()
            .join(" + ")
    }
}

/// Directed reaction between two complexes of the network (indices into the complex list).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub id: String,
    pub reactant: usize,
    pub product: usize,
    /// symbol of the mass-action rate constant, `k_<id>` unless given otherwise
    pub rate_symbol: String,
    /// optional numerical value of the rate constant
    pub rate_constant: Option<f64>,
}

/// Immutable reaction network. Reaction order fixes the column order of every derived
/// matrix, species order fixes the row order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    species: Vec<Species>,
    complexes: Vec<Complex>,
    reactions: Vec<Reaction>,
}

impl Network {
    /// Assembles a network from its parts and checks internal consistency.
    pub fn from_parts(
        species: Vec<Species>,
        complexes: Vec<Complex>,
        reactions: Vec<Reaction>,
    ) -> CrnResult<Self> {
        let network = Self {
            species,
            complexes,
            reactions,
        };
        network.validate()?;
        Ok(network)
    }

    /// Checks every invariant of the data model. Called by the builder and again by the
    /// matrix builder, so a network is never trusted implicitly.
    pub fn validate(&self) -> CrnResult<()> {
        if self.reactions.is_empty() {
            return Err(CrnError::MalformedNetwork(
                "network has no reactions".to_string(),
            ));
        }
        let mut names = HashSet::new();
        for sp in &self.species {
            if sp.name.trim().is_empty() {
                return Err(CrnError::MalformedNetwork(
                    "species with empty name".to_string(),
                ));
            }
            if !names.insert(sp.name.as_str()) {
                return Err(CrnError::MalformedNetwork(format!(
                    "species '{}' declared twice",
                    sp.name
                )));
            }
        }
        for (c, complex) in self.complexes.iter().enumerate() {
            if let Some(s) = complex.species().find(|s| *s >= self.species.len()) {
                return Err(CrnError::MalformedNetwork(format!(
                    "complex {} references undeclared species #{}",
                    c, s
                )));
            }
        }
        let mut ids = HashSet::new();
        let mut pairs = HashSet::new();
        for reaction in &self.reactions {
            if !pairs.insert((reaction.reactant, reaction.product)) {
                return Err(CrnError::MalformedNetwork(format!(
                    "reaction '{}' repeats the complexes of an earlier reaction",
                    reaction.id
                )));
            }
            if !ids.insert(reaction.id.as_str()) {
                return Err(CrnError::MalformedNetwork(format!(
                    "reaction id '{}' used twice",
                    reaction.id
                )));
            }
            if reaction.reactant >= self.complexes.len() || reaction.product >= self.complexes.len()
            {
                return Err(CrnError::MalformedNetwork(format!(
                    "reaction '{}' references an undeclared complex",
                    reaction.id
                )));
            }
            if self.complexes[reaction.reactant] == self.complexes[reaction.product] {
                return Err(CrnError::MalformedNetwork(format!(
                    "reaction '{}' has identical reactant and product complexes",
                    reaction.id
                )));
            }
            if let Some(k) = reaction.rate_constant {
                if !(k.is_finite() && k > 0.0) {
                    return Err(CrnError::MalformedNetwork(format!(
                        "reaction '{}' has non-positive rate constant {}",
                        reaction.id, k
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn species(&self) -> &[Species] {
        &self.species
    }

    pub fn complexes(&self) -> &[Complex] {
        &self.complexes
    }

    pub fn reactions(&self) -> &[Reaction] {
        &self.reactions
    }

    pub fn n_species(&self) -> usize {
        self.species.len()
    }

    pub fn n_complexes(&self) -> usize {
        self.complexes.len()
    }

    pub fn n_reactions(&self) -> usize {
        self.reactions.len()
    }

    pub fn species_names(&self) -> Vec<String> {
        self.species.iter().map(|s| s.name.clone()).collect()
    }

    pub fn reaction_ids(&self) -> Vec<String> {
        self.reactions.iter().map(|r| r.id.clone()).collect()
    }

    pub fn species_index(&self, name: &str) -> Option<usize> {
        self.species.iter().position(|s| s.name == name)
    }

    pub fn reaction_index(&self, id: &str) -> Option<usize> {
        self.reactions.iter().position(|r| r.id == id)
    }

    pub fn reactant_complex(&self, reaction: usize) -> &Complex {
        &self.complexes[self.reactions[reaction].reactant]
    }

    pub fn product_complex(&self, reaction: usize) -> &Complex {
        &self.complexes[self.reactions[reaction].product]
    }

    pub fn format_complex(&self, complex: usize) -> String {
        self.complexes[complex].format(&self.species)
    }

    /// Species found on both sides of a reaction, with the coefficient they keep there.
    pub fn catalysts(&self, reaction: usize) -> Vec<(usize, u32)> {
        let reactant = self.reactant_complex(reaction);
        let product = self.product_complex(reaction);
        reactant
            .terms()
            .iter()
            .filter_map(|(s, c)| {
                let shared = (*c).min(product.coefficient(*s));
                (shared > 0).then_some((*s, shared))
            })
            .collect()
    }

    /// "id: lhs -> rhs", followed by the catalysts when the reaction has any:
    /// "cat: C + E -> E + P  [catalyst: E]"
    pub fn format_reaction(&self, reaction: usize) -> String {
        let r = &self.reactions[reaction];
        let mut line = format!(
            "{}: {} -> {}",
            r.id,
            self.format_complex(r.reactant),
            self.format_complex(r.product)
        );
        let catalysts = self.catalysts(reaction);
        if !catalysts.is_empty() {
            let names = Complex::new(catalysts).format(&self.species);
            line.push_str(&format!("  [catalyst: {}]", names));
        }
        line
    }

    /// "id: lhs ->(k) rhs" where k is the numerical rate constant in exponent notation
    /// with `precision` digits, or the rate symbol when no value is set. With `rate`
    /// the full mass-action rate is shown instead, e.g. `1.500e0*S*E`.
    pub fn format_reaction_kinetics(&self, reaction: usize, rate: bool, precision: usize) -> String {
        let r = &self.reactions[reaction];
        let mut k = match r.rate_constant {
            Some(value) => format!("{:.*e}", precision, value),
            None => r.rate_symbol.clone(),
        };
        if rate {
            for (s, c) in self.complexes[r.reactant].terms() {
                let name = &self.species[*s].name;
                if *c == 1 {
                    k.push_str(&format!("*{}", name));
                } else {
                    k.push_str(&format!("*{}^{}", name, c));
                }
            }
        }
        format!(
            "{}: {} ->({}) {}",
            r.id,
            self.format_complex(r.reactant),
            k,
            self.format_complex(r.product)
        )
    }

    /// Network in which every species present on both sides of a reaction is removed
    /// from both sides, keeping the net change. Only the structure is preserved: the
    /// mass-action rate of a stripped reaction no longer depends on its catalysts.
    /// Reactions that become duplicates are merged as in [`NetworkBuilder::build`].
    pub fn without_catalysts(&self) -> CrnResult<Network> {
        let mut builder = NetworkBuilder::new();
        builder.species = self.species.clone();
        for (j, r) in self.reactions.iter().enumerate() {
            let catalysts = self.catalysts(j);
            let strip = |complex: &Complex| {
                complex
                    .terms()
                    .iter()
                    .filter_map(|(s, c)| {
                        let shared = catalysts
                            .iter()
                            .find(|(cs, _)| cs == s)
                            .map(|(_, sc)| *sc)
                            .unwrap_or(0);
                        (*c > shared).then(|| (self.species[*s].name.clone(), *c - shared))
                    })
                    .collect::<Vec<(String, u32)>>()
            };
            builder.reactions.push(PendingReaction {
                id: r.id.clone(),
                reactant: strip(&self.complexes[r.reactant]),
                product: strip(&self.complexes[r.product]),
                rate_constant: r.rate_constant,
            });
        }
        builder.build()
    }

    /// Numerical rate constants when every reaction carries one.
    pub fn rate_constants(&self) -> Option<Vec<f64>> {
        self.reactions.iter().map(|r| r.rate_constant).collect()
    }

    /// Species that occur in at least one complex.
    pub fn active_species(&self) -> Vec<usize> {
        let mut used = vec![false; self.species.len()];
        for complex in &self.complexes {
            for s in complex.species() {
                used[s] = true;
            }
        }
        (0..self.species.len()).filter(|s| used[*s]).collect()
    }

    /// Restricts the network to the given reactions. Species and complexes are renumbered
    /// keeping their relative order; the returned maps send local indices to global ones.
    pub fn restrict_to_reactions(&self, reactions: &[usize]) -> CrnResult<RestrictedNetwork> {
        let mut reaction_map: Vec<usize> = reactions.to_vec();
        reaction_map.sort_unstable();
        reaction_map.dedup();
        if let Some(bad) = reaction_map.iter().find(|j| **j >= self.reactions.len()) {
            return Err(CrnError::MalformedNetwork(format!(
                "reaction index {} out of range",
                bad
            )));
        }
        let mut used_complexes: Vec<usize> = reaction_map
            .iter()
            .flat_map(|j| [self.reactions[*j].reactant, self.reactions[*j].product])
            .collect();
        used_complexes.sort_unstable();
        used_complexes.dedup();
        let mut species_map: Vec<usize> = used_complexes
            .iter()
            .flat_map(|c| self.complexes[*c].species().collect::<Vec<usize>>())
            .collect();
        species_map.sort_unstable();
        species_map.dedup();

        let species_local: HashMap<usize, usize> = species_map
            .iter()
            .enumerate()
            .map(|(local, global)| (*global, local))
            .collect();
        let complex_local: HashMap<usize, usize> = used_complexes
            .iter()
            .enumerate()
            .map(|(local, global)| (*global, local))
            .collect();

        let species = species_map.iter().map(|s| self.species[*s].clone()).collect();
        let complexes = used_complexes
            .iter()
            .map(|c| {
                Complex::new(
                    self.complexes[*c]
                        .terms()
                        .iter()
                        .map(|(s, coef)| (species_local[s], *coef))
                        .collect(),
                )
            })
            .collect();
        let reactions_local = reaction_map
            .iter()
            .map(|j| {
                let r = &self.reactions[*j];
                Reaction {
                    id: r.id.clone(),
                    reactant: complex_local[&r.reactant],
                    product: complex_local[&r.product],
                    rate_symbol: r.rate_symbol.clone(),
                    rate_constant: r.rate_constant,
                }
            })
            .collect();
        let network = Network::from_parts(species, complexes, reactions_local)?;
        Ok(RestrictedNetwork {
            network,
            species_map,
            reaction_map,
            complex_map: used_complexes,
        })
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for j in 0..self.reactions.len() {
            writeln!(f, "{}", self.format_reaction(j))?;
        }
        Ok(())
    }
}

/// Result of [`Network::restrict_to_reactions`].
#[derive(Debug, Clone)]
pub struct RestrictedNetwork {
    pub network: Network,
    /// local species index -> global species index
    pub species_map: Vec<usize>,
    /// local reaction index -> global reaction index
    pub reaction_map: Vec<usize>,
    /// local complex index -> global complex index
    pub complex_map: Vec<usize>,
}

#[derive(Debug, Clone)]
struct PendingReaction {
    id: String,
    reactant: Vec<(String, u32)>,
    product: Vec<(String, u32)>,
    rate_constant: Option<f64>,
}

/// Collects species and reactions by name and produces a validated [`Network`].
///
/// # Examples
/// ```
/// use CRNmultistab::ReactionNetwork::network::NetworkBuilder;
/// let mut builder = NetworkBuilder::new();
/// builder.add_species("S").add_species("E").add_species("C").add_species("P");
/// builder.add_reversible("bind", &[("S", 1), ("E", 1)], &[("C", 1)]);
/// builder.add_reaction("cat", &[("C", 1)], &[("E", 1), ("P", 1)]);
/// let network = builder.build().unwrap();
/// assert_eq!(network.n_reactions(), 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct NetworkBuilder {
    species: Vec<Species>,
    reactions: Vec<PendingReaction>,
    /// declare unknown species on first use instead of rejecting them
    pub auto_declare: bool,
}

impl NetworkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_species(&mut self, name: &str) -> &mut Self {
        self.species.push(Species::new(name));
        self
    }

    pub fn add_species_in_group(&mut self, name: &str, group: &str) -> &mut Self {
        self.species.push(Species {
            name: name.to_string(),
            conservation_group: Some(group.to_string()),
        });
        self
    }

    pub fn add_reaction(
        &mut self,
        id: &str,
        reactant: &[(&str, u32)],
        product: &[(&str, u32)],
    ) -> &mut Self {
        self.push_reaction(id, reactant, product, None)
    }

    pub fn add_reaction_with_rate(
        &mut self,
        id: &str,
        reactant: &[(&str, u32)],
        product: &[(&str, u32)],
        rate_constant: f64,
    ) -> &mut Self {
        self.push_reaction(id, reactant, product, Some(rate_constant))
    }

    /// adds `<id>_f` (reactant -> product) and `<id>_r` (product -> reactant)
    pub fn add_reversible(
        &mut self,
        id: &str,
        reactant: &[(&str, u32)],
        product: &[(&str, u32)],
    ) -> &mut Self {
        self.push_reaction(&format!("{}_f", id), reactant, product, None);
        self.push_reaction(&format!("{}_r", id), product, reactant, None)
    }

    fn push_reaction(
        &mut self,
        id: &str,
        reactant: &[(&str, u32)],
        product: &[(&str, u32)],
        rate_constant: Option<f64>,
    ) -> &mut Self {
        let owned = |side: &[(&str, u32)]| {
            side.iter()
                .map(|(name, coef)| (name.to_string(), *coef))
                .collect::<Vec<(String, u32)>>()
        };
        self.reactions.push(PendingReaction {
            id: id.to_string(),
            reactant: owned(reactant),
            product: owned(product),
            rate_constant,
        });
        self
    }

    /// Resolves names, deduplicates complexes (first appearance order) and validates.
    ///
    /// Reactions sharing both reactant and product complex are merged into the first of
    /// them: the ids are joined with `_` and the rate constants summed. Mixing a reaction
    /// with a numerical rate and one without is rejected.
    pub fn build(&self) -> CrnResult<Network> {
        if self.reactions.is_empty() {
            return Err(CrnError::MalformedNetwork(
                "network has no reactions".to_string(),
            ));
        }
        let mut species = self.species.clone();
        let mut lookup: HashMap<String, usize> = HashMap::new();
        for (i, sp) in species.iter().enumerate() {
            if lookup.insert(sp.name.clone(), i).is_some() {
                return Err(CrnError::MalformedNetwork(format!(
                    "species '{}' declared twice",
                    sp.name
                )));
            }
        }

        let mut complexes: Vec<Complex> = Vec::new();
        let mut complex_lookup: HashMap<Complex, usize> = HashMap::new();
        let mut reactions = Vec::with_capacity(self.reactions.len());

        for pending in &self.reactions {
            let mut sides = [0usize; 2];
            for (slot, side) in [&pending.reactant, &pending.product].iter().enumerate() {
                let mut terms = Vec::with_capacity(side.len());
                for (name, coef) in side.iter() {
                    let index = match lookup.get(name) {
                        Some(i) => *i,
                        None if self.auto_declare => {
                            species.push(Species::new(name));
                            lookup.insert(name.clone(), species.len() - 1);
                            species.len() - 1
                        }
                        None => {
                            return Err(CrnError::MalformedNetwork(format!(
                                "reaction '{}' references undeclared species '{}'",
                                pending.id, name
                            )));
                        }
                    };
                    terms.push((index, *coef));
                }
                let complex = Complex::new(terms);
                let index = match complex_lookup.get(&complex) {
                    Some(i) => *i,
                    None => {
                        complexes.push(complex.clone());
                        complex_lookup.insert(complex, complexes.len() - 1);
                        complexes.len() - 1
                    }
                };
                sides[slot] = index;
            }
            let duplicate = reactions
                .iter()
                .position(|r: &Reaction| r.reactant == sides[0] && r.product == sides[1]);
            match duplicate {
                Some(i) => merge_into(&mut reactions[i], pending)?,
                None => reactions.push(Reaction {
                    id: pending.id.clone(),
                    reactant: sides[0],
                    product: sides[1],
                    rate_symbol: format!("k_{}", pending.id),
                    rate_constant: pending.rate_constant,
                }),
            }
        }
        Network::from_parts(species, complexes, reactions)
    }
}

fn merge_into(existing: &mut Reaction, duplicate: &PendingReaction) -> CrnResult<()> {
    existing.rate_constant = match (existing.rate_constant, duplicate.rate_constant) {
        (Some(a), Some(b)) => Some(a + b),
        (None, None) => None,
        _ => {
            return Err(CrnError::MalformedNetwork(format!(
                "reactions '{}' and '{}' share their complexes but only one has a rate constant",
                existing.id, duplicate.id
            )));
        }
    };
    info!("merging reaction '{}' into '{}'", duplicate.id, existing.id);
    existing.id = format!("{}_{}", existing.id, duplicate.id);
    existing.rate_symbol = format!("k_{}", existing.id);
    Ok(())
}
