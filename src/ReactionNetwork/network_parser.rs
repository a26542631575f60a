//! Loader turning reaction equations into a [`Network`].
//!
//! Accepted line format:
//! ```text
//! [id:] 2A + B -> C [@ k]
//! [id:] A + E <-> C [@ kf, kr]
//! 0 -> A
//! ```
//! `<->` and `<=>` create a forward (`<id>_f`) and a reverse (`<id>_r`) reaction,
//! `->`, `=>` and `=` a single one. `0` (or an empty side) is the zero complex.
//! Lines starting with `#` and blank lines are skipped by the file loader.
use super::network::{Network, NetworkBuilder};
use crate::crn_error::{CrnError, CrnResult};
use log::info;
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

const EQUATION_PATTERN: &str = r"^\s*(?:(?P<id>[A-Za-z0-9_]+)\s*:\s*)?(?P<lhs>[^<>=@-]*?)\s*(?P<arrow><->|<=>|->|=>|=)\s*(?P<rhs>[^@]*?)\s*(?:@\s*(?P<rates>[-+0-9.eE,\s]+))?\s*$";
const TERM_PATTERN: &str = r"^(?P<coef>\d+)?\s*\*?\s*(?P<name>[A-Za-z_][A-Za-z0-9_\[\]']*)$";

/// compiled once, shared by every call of [`parse_equation`]
static EQUATION_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(EQUATION_PATTERN));
static TERM_RE: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| Regex::new(TERM_PATTERN));

fn compiled(re: &'static LazyLock<Result<Regex, regex::Error>>) -> CrnResult<&'static Regex> {
    LazyLock::force(re)
        .as_ref()
        .map_err(|e| CrnError::ParseError(e.to_string()))
}

/// One parsed equation line.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEquation {
    pub id: String,
    pub reactant: Vec<(String, u32)>,
    pub product: Vec<(String, u32)>,
    pub reversible: bool,
    pub rate_constants: Vec<f64>,
}

fn parse_side(side: &str, term_re: &Regex, line: &str) -> CrnResult<Vec<(String, u32)>> {
    let side = side.trim();
    if side.is_empty() || side == "0" || side == "∅" {
        return Ok(Vec::new());
    }
    let mut terms = Vec::new();
    for raw in side.split('+') {
        let raw = raw.trim();
        let caps = term_re.captures(raw).ok_or_else(|| {
            CrnError::ParseError(format!("cannot read term '{}' in '{}'", raw, line))
        })?;
        let coef = match caps.name("coef") {
            Some(m) => m
                .as_str()
                .parse::<u32>()
                .map_err(|e| CrnError::ParseError(format!("bad coefficient in '{}': {}", raw, e)))?,
            None => 1,
        };
        let name = caps
            .name("name")
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| CrnError::ParseError(format!("missing species in '{}'", raw)))?;
        terms.push((name, coef));
    }
    Ok(terms)
}

/// Parses a single equation; `default_id` names reactions without an explicit id.
pub fn parse_equation(line: &str, default_id: &str) -> CrnResult<ParsedEquation> {
    let equation_re = compiled(&EQUATION_RE)?;
    let term_re = compiled(&TERM_RE)?;
    let caps = equation_re
        .captures(line)
        .ok_or_else(|| CrnError::ParseError(format!("not a reaction equation: '{}'", line)))?;

    let id = caps
        .name("id")
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| default_id.to_string());
    let lhs = caps.name("lhs").map(|m| m.as_str()).unwrap_or("");
    let rhs = caps.name("rhs").map(|m| m.as_str()).unwrap_or("");
    let reversible = matches!(caps.name("arrow").map(|m| m.as_str()), Some("<->") | Some("<=>"));

    let mut rate_constants = Vec::new();
    if let Some(rates) = caps.name("rates") {
        for value in rates.as_str().split(',') {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            let k = value
                .parse::<f64>()
                .map_err(|e| CrnError::ParseError(format!("bad rate '{}': {}", value, e)))?;
            rate_constants.push(k);
        }
    }
    let expected = if reversible { 2 } else { 1 };
    if !rate_constants.is_empty() && rate_constants.len() != expected {
        return Err(CrnError::ParseError(format!(
            "'{}' needs {} rate constant(s), found {}",
            line,
            expected,
            rate_constants.len()
        )));
    }

    Ok(ParsedEquation {
        id,
        reactant: parse_side(lhs, term_re, line)?,
        product: parse_side(rhs, term_re, line)?,
        reversible,
        rate_constants,
    })
}

/// Builds a network from equation strings; species are declared in order of appearance.
///
/// # Examples
/// ```
/// use CRNmultistab::ReactionNetwork::network_parser::network_from_equations;
/// let network = network_from_equations(&["S + E <-> C", "C -> E + P"]).unwrap();
/// assert_eq!(network.species_names(), vec!["S", "E", "C", "P"]);
/// assert_eq!(network.n_reactions(), 3);
/// ```
pub fn network_from_equations(equations: &[&str]) -> CrnResult<Network> {
    let mut builder = NetworkBuilder::new();
    builder.auto_declare = true;
    for (i, line) in equations.iter().enumerate() {
        let parsed = parse_equation(line, &format!("r{}", i + 1))?;
        let reactant: Vec<(&str, u32)> =
            parsed.reactant.iter().map(|(n, c)| (n.as_str(), *c)).collect();
        let product: Vec<(&str, u32)> =
            parsed.product.iter().map(|(n, c)| (n.as_str(), *c)).collect();
        match (parsed.reversible, parsed.rate_constants.as_slice()) {
            (true, [kf, kr]) => {
                builder.add_reaction_with_rate(&format!("{}_f", parsed.id), &reactant, &product, *kf);
                builder.add_reaction_with_rate(&format!("{}_r", parsed.id), &product, &reactant, *kr);
            }
            (true, _) => {
                builder.add_reversible(&parsed.id, &reactant, &product);
            }
            (false, [k]) => {
                builder.add_reaction_with_rate(&parsed.id, &reactant, &product, *k);
            }
            (false, _) => {
                builder.add_reaction(&parsed.id, &reactant, &product);
            }
        }
    }
    builder.build()
}

/// Reads one equation per line, skipping blank lines and `#` comments.
pub fn network_from_file(path: &Path) -> CrnResult<Network> {
    let content = fs::read_to_string(path)?;
    let lines: Vec<&str> = content
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .collect();
    let network = network_from_equations(&lines)?;
    info!(
        "loaded network from {}: {} species, {} reactions",
        path.display(),
        network.n_species(),
        network.n_reactions()
    );
    Ok(network)
}
