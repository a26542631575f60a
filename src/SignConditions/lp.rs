//! Solver-agnostic linear programs and the backends that solve them.
//!
//! The sign-condition solver only builds [`LinearProgram`]s; which library answers them
//! is decided by an [`LpSolverKind`]. Infeasible and unbounded programs are ordinary
//! outcomes, a backend that cannot run at all is a `CrnError::SolverError`.
use crate::crn_error::{CrnError, CrnResult};
use enum_dispatch::enum_dispatch;
use log::{debug, warn};
use minilp::{ComparisonOp, LinearExpr, OptimizationDirection, Problem};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::process::Command;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Maximize,
    Minimize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    Le,
    Ge,
    Eq,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LpVariable {
    pub name: String,
    pub objective: f64,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LpConstraint {
    /// (variable index, coefficient)
    pub coefficients: Vec<(usize, f64)>,
    pub comparison: Comparison,
    pub rhs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearProgram {
    pub direction: Direction,
    pub variables: Vec<LpVariable>,
    pub constraints: Vec<LpConstraint>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LpOutcome {
    Optimal { objective: f64, values: Vec<f64> },
    Infeasible,
    Unbounded,
    /// wall-clock limit reached before the backend answered
    TimedOut,
}

impl LinearProgram {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            variables: Vec::new(),
            constraints: Vec::new(),
        }
    }

    /// Adds a variable with bounds `[lower, upper]` (infinite bounds allowed), returns its index.
    pub fn add_variable(&mut self, name: &str, objective: f64, lower: f64, upper: f64) -> usize {
        self.variables.push(LpVariable {
            name: name.to_string(),
            objective,
            lower,
            upper,
        });
        self.variables.len() - 1
    }

    pub fn add_constraint(&mut self, coefficients: Vec<(usize, f64)>, comparison: Comparison, rhs: f64) {
        self.constraints.push(LpConstraint {
            coefficients,
            comparison,
            rhs,
        });
    }

    /// CPLEX LP text understood by `glpsol --lp`. Variables are renamed `x<i>`.
    pub fn to_cplex_lp(&self) -> String {
        let mut out = String::new();
        out.push_str(match self.direction {
            Direction::Maximize => "Maximize\n",
            Direction::Minimize => "Minimize\n",
        });
        let objective: Vec<(usize, f64)> = self
            .variables
            .iter()
            .enumerate()
            .filter(|(_, v)| v.objective != 0.0)
            .map(|(i, v)| (i, v.objective))
            .collect();
        if objective.is_empty() {
            out.push_str(" obj: 0 x0\n");
        } else {
            out.push_str(&format!(" obj: {}\n", format_linear(&objective)));
        }
        out.push_str("Subject To\n");
        for (k, c) in self.constraints.iter().enumerate() {
            let op = match c.comparison {
                Comparison::Le => "<=",
                Comparison::Ge => ">=",
                Comparison::Eq => "=",
            };
            let lhs = if c.coefficients.is_empty() {
                "0 x0".to_string()
            } else {
                format_linear(&c.coefficients)
            };
            out.push_str(&format!(" c{}: {} {} {:e}\n", k, lhs, op, c.rhs));
        }
        out.push_str("Bounds\n");
        for (i, v) in self.variables.iter().enumerate() {
            match (v.lower.is_finite(), v.upper.is_finite()) {
                (false, false) => out.push_str(&format!(" x{} free\n", i)),
                (true, true) => out.push_str(&format!(" {:e} <= x{} <= {:e}\n", v.lower, i, v.upper)),
                (true, false) => out.push_str(&format!(" x{} >= {:e}\n", i, v.lower)),
                (false, true) => out.push_str(&format!(" -inf <= x{} <= {:e}\n", i, v.upper)),
            }
        }
        out.push_str("End\n");
        out
    }
}

fn format_linear(terms: &[(usize, f64)]) -> String {
    let mut s = String::new();
    for (k, (i, c)) in terms.iter().enumerate() {
        if k == 0 {
            s.push_str(&format!("{:e} x{}", c, i));
        } else if *c < 0.0 {
            s.push_str(&format!(" - {:e} x{}", -c, i));
        } else {
            s.push_str(&format!(" + {:e} x{}", c, i));
        }
    }
    s
}

#[enum_dispatch]
pub trait LpBackend {
    fn solve(&self, lp: &LinearProgram) -> CrnResult<LpOutcome>;
    fn name(&self) -> String;
}

/// Pure-Rust dual simplex (`minilp`), solved on the calling thread.
///
/// `minilp` cannot be interrupted, so the limit is checked once the solve returns: an
/// answer that took longer than `timeout` is discarded as [`LpOutcome::TimedOut`]. A
/// pathological program still occupies its thread until `minilp` gives up, but no
/// solver thread outlives the call.
#[derive(Debug, Clone)]
pub struct BuiltinSimplex {
    pub timeout: Duration,
}

fn solve_with_minilp(lp: &LinearProgram) -> LpOutcome {
    let direction = match lp.direction {
        Direction::Maximize => OptimizationDirection::Maximize,
        Direction::Minimize => OptimizationDirection::Minimize,
    };
    let mut problem = Problem::new(direction);
    let vars: Vec<minilp::Variable> = lp
        .variables
        .iter()
        .map(|v| problem.add_var(v.objective, (v.lower, v.upper)))
        .collect();
    for c in &lp.constraints {
        let mut expr = LinearExpr::empty();
        for (i, coef) in &c.coefficients {
            expr.add(vars[*i], *coef);
        }
        let op = match c.comparison {
            Comparison::Le => ComparisonOp::Le,
            Comparison::Ge => ComparisonOp::Ge,
            Comparison::Eq => ComparisonOp::Eq,
        };
        problem.add_constraint(expr, op, c.rhs);
    }
    match problem.solve() {
        Ok(solution) => {
            let objective = solution.objective();
            let values: Vec<f64> = vars.iter().map(|v| solution[*v]).collect();
            // minilp can report an unbounded ray as an infinite optimum
            if objective.is_finite() && values.iter().all(|v| v.is_finite()) {
                LpOutcome::Optimal { objective, values }
            } else {
                LpOutcome::Unbounded
            }
        }
        Err(minilp::Error::Unbounded) => LpOutcome::Unbounded,
        Err(_) => LpOutcome::Infeasible,
    }
}

impl LpBackend for BuiltinSimplex {
    fn solve(&self, lp: &LinearProgram) -> CrnResult<LpOutcome> {
        let start = Instant::now();
        let outcome = solve_with_minilp(lp);
        let elapsed = start.elapsed();
        if elapsed >= self.timeout {
            warn!(
                "LP with {} variables took {:?}, over the limit of {:?}",
                lp.variables.len(),
                elapsed,
                self.timeout
            );
            return Ok(LpOutcome::TimedOut);
        }
        Ok(outcome)
    }

    fn name(&self) -> String {
        "builtin simplex (minilp)".to_string()
    }
}

/// External GLPK solver: the program is written to a temporary CPLEX-LP file and
/// `glpsol` writes its basic solution in GLPK plain-text format.
#[derive(Debug, Clone)]
pub struct GlpkCli {
    pub binary: String,
    pub time_limit_s: u64,
}

/// Parses a solution written by `glpsol -w`.
pub fn parse_glpk_solution(text: &str, n_vars: usize) -> CrnResult<LpOutcome> {
    let mut outcome: Option<(char, char, f64)> = None;
    let mut values = vec![0.0; n_vars];
    for line in text.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.first() {
            Some(&"s") if fields.len() >= 7 => {
                let primal = fields[4].chars().next().unwrap_or('u');
                let dual = fields[5].chars().next().unwrap_or('u');
                let objective = fields[6].parse::<f64>().map_err(|e| {
                    CrnError::SolverError(format!("bad objective in glpsol output: {}", e))
                })?;
                outcome = Some((primal, dual, objective));
            }
            Some(&"j") if fields.len() >= 4 => {
                let column = fields[1]
                    .parse::<usize>()
                    .map_err(|e| CrnError::SolverError(format!("bad column in glpsol output: {}", e)))?;
                let value = fields[3]
                    .parse::<f64>()
                    .map_err(|e| CrnError::SolverError(format!("bad value in glpsol output: {}", e)))?;
                if column >= 1 && column <= n_vars {
                    values[column - 1] = value;
                }
            }
            _ => {}
        }
    }
    match outcome {
        Some(('f', 'n', _)) => Ok(LpOutcome::Unbounded),
        Some(('f', _, objective)) => Ok(LpOutcome::Optimal { objective, values }),
        Some(('n', _, _)) | Some(('i', _, _)) => Ok(LpOutcome::Infeasible),
        Some(_) => Ok(LpOutcome::TimedOut),
        None => Err(CrnError::SolverError(
            "glpsol output has no solution line".to_string(),
        )),
    }
}

impl LpBackend for GlpkCli {
    fn solve(&self, lp: &LinearProgram) -> CrnResult<LpOutcome> {
        let mut model = tempfile::Builder::new().suffix(".lp").tempfile()?;
        model.write_all(lp.to_cplex_lp().as_bytes())?;
        model.flush()?;
        let solution = tempfile::Builder::new().suffix(".sol").tempfile()?;
        let output = Command::new(&self.binary)
            .arg("--lp")
            .arg(model.path())
            .arg("-w")
            .arg(solution.path())
            .arg("--tmlim")
            .arg(self.time_limit_s.to_string())
            .output()
            .map_err(|e| {
                CrnError::SolverError(format!("cannot run LP solver '{}': {}", self.binary, e))
            })?;
        if !output.status.success() {
            return Err(CrnError::SolverError(format!(
                "'{}' exited with {}: {}",
                self.binary,
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        let text = fs::read_to_string(solution.path())?;
        debug!("glpsol answered LP with {} variables", lp.variables.len());
        parse_glpk_solution(&text, lp.variables.len())
    }

    fn name(&self) -> String {
        format!("glpsol ({})", self.binary)
    }
}

#[enum_dispatch(LpBackend)]
#[derive(Debug, Clone)]
pub enum LpSolverKind {
    Builtin(BuiltinSimplex),
    Glpk(GlpkCli),
}

/// Serializable choice of backend, resolved with the LP timeout of the configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum LpBackendConfig {
    #[default]
    Builtin,
    Glpk { binary: String },
}

impl LpBackendConfig {
    pub fn build(&self, timeout: Duration) -> LpSolverKind {
        match self {
            LpBackendConfig::Builtin => LpSolverKind::Builtin(BuiltinSimplex { timeout }),
            LpBackendConfig::Glpk { binary } => LpSolverKind::Glpk(GlpkCli {
                binary: binary.clone(),
                time_limit_s: timeout.as_secs().max(1),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn builtin() -> LpSolverKind {
        LpBackendConfig::Builtin.build(Duration::from_secs(5))
    }

    #[test]
    fn test_builtin_optimum() {
        // max x + y s.t. x + 2y <= 4, 3x + y <= 6, x, y >= 0  -> (1.6, 1.2)
        let mut lp = LinearProgram::new(Direction::Maximize);
        let x = lp.add_variable("x", 1.0, 0.0, f64::INFINITY);
        let y = lp.add_variable("y", 1.0, 0.0, f64::INFINITY);
        lp.add_constraint(vec![(x, 1.0), (y, 2.0)], Comparison::Le, 4.0);
        lp.add_constraint(vec![(x, 3.0), (y, 1.0)], Comparison::Le, 6.0);
        match builtin().solve(&lp).unwrap() {
            LpOutcome::Optimal { objective, values } => {
                assert_relative_eq!(objective, 2.8, epsilon = 1e-9);
                assert_relative_eq!(values[0], 1.6, epsilon = 1e-9);
                assert_relative_eq!(values[1], 1.2, epsilon = 1e-9);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_builtin_infeasible_and_unbounded() {
        let mut lp = LinearProgram::new(Direction::Minimize);
        let x = lp.add_variable("x", 1.0, 0.0, 1.0);
        lp.add_constraint(vec![(x, 1.0)], Comparison::Ge, 2.0);
        assert_eq!(builtin().solve(&lp).unwrap(), LpOutcome::Infeasible);

        let mut lp = LinearProgram::new(Direction::Maximize);
        let x = lp.add_variable("x", 1.0, 0.0, f64::INFINITY);
        lp.add_constraint(vec![(x, 1.0)], Comparison::Ge, 1.0);
        assert_eq!(builtin().solve(&lp).unwrap(), LpOutcome::Unbounded);
    }

    #[test]
    fn test_builtin_limit_checked_after_solve() {
        let mut lp = LinearProgram::new(Direction::Maximize);
        let x = lp.add_variable("x", 1.0, 0.0, 1.0);
        lp.add_constraint(vec![(x, 1.0)], Comparison::Le, 1.0);
        let expired = LpBackendConfig::Builtin.build(Duration::ZERO);
        assert_eq!(expired.solve(&lp).unwrap(), LpOutcome::TimedOut);
        assert!(matches!(builtin().solve(&lp).unwrap(), LpOutcome::Optimal { .. }));
    }

    #[test]
    fn test_builtin_runs_many_programs_in_parallel() {
        use rayon::prelude::*;
        let outcomes: Vec<LpOutcome> = (1..=64)
            .into_par_iter()
            .map(|i| {
                let mut lp = LinearProgram::new(Direction::Maximize);
                let x = lp.add_variable("x", 1.0, 0.0, f64::INFINITY);
                lp.add_constraint(vec![(x, 1.0)], Comparison::Le, i as f64);
                builtin().solve(&lp).unwrap()
            })
            .collect();
        for (i, outcome) in outcomes.iter().enumerate() {
            match outcome {
                LpOutcome::Optimal { objective, .. } => {
                    assert_relative_eq!(*objective, (i + 1) as f64, epsilon = 1e-9)
                }
                other => panic!("unexpected outcome {:?}", other),
            }
        }
    }

    #[test]
    fn test_cplex_lp_text() {
        let mut lp = LinearProgram::new(Direction::Maximize);
        let c = lp.add_variable("c", 0.0, -1.0, 1.0);
        let t = lp.add_variable("t", 1.0, f64::NEG_INFINITY, 1.0);
        lp.add_constraint(vec![(c, 2.0), (t, -1.0)], Comparison::Ge, 0.0);
        let text = lp.to_cplex_lp();
        assert!(text.starts_with("Maximize\n obj: 1e0 x1\n"));
        assert!(text.contains(" c0: 2e0 x0 - 1e0 x1 >= 0e0\n"));
        assert!(text.contains(" -1e0 <= x0 <= 1e0\n"));
        assert!(text.contains(" -inf <= x1 <= 1e0\n"));
        assert!(text.ends_with("End\n"));
    }

    #[test]
    fn test_parse_glpk_solution() {
        let text = "c Problem:\nc\ns bas 1 2 f f 2.8\ni 1 u 4 0.2\nj 1 b 1.6 0\nj 2 b 1.2 0\ne o f\n";
        assert_eq!(
            parse_glpk_solution(text, 2).unwrap(),
            LpOutcome::Optimal {
                objective: 2.8,
                values: vec![1.6, 1.2]
            }
        );
        let text = "s bas 1 1 n f 0\ne o f\n";
        assert_eq!(parse_glpk_solution(text, 1).unwrap(), LpOutcome::Infeasible);
        assert!(parse_glpk_solution("garbage", 1).is_err());
    }

    #[test]
    fn test_missing_glpk_binary_is_solver_error() {
        let backend = LpBackendConfig::Glpk {
            binary: "/nonexistent/glpsol-missing".to_string(),
        }
        .build(Duration::from_secs(1));
        let mut lp = LinearProgram::new(Direction::Maximize);
        lp.add_variable("x", 1.0, 0.0, 1.0);
        match backend.solve(&lp) {
            Err(CrnError::SolverError(msg)) => assert!(msg.contains("cannot run LP solver")),
            other => panic!("expected SolverError, got {:?}", other),
        }
        assert!(backend.name().contains("glpsol"));
    }
}
