use crate::crn_error::{CrnError, CrnResult};
use serde::{Deserialize, Serialize};

/// Numerical tolerances of a witness search. Every result carries a copy of the values
/// it was obtained with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerances {
    /// max-norm of the scaled steady-state residual (relative rate balance and relative
    /// conservation defect)
    pub residual_tolerance: f64,
    /// two states are distinct if `|x1 - x2|_inf / max(|x1|_inf, |x2|_inf)` exceeds it
    pub min_separation: f64,
    /// relative agreement of conservation totals between the two states
    pub conservation_tolerance: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            residual_tolerance: 1e-10,
            min_separation: 1e-3,
            conservation_tolerance: 1e-8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub n_trials: usize,
    /// initial guesses per trial, all sharing the trial's rate constants and totals
    pub guesses_per_trial: usize,
    pub seed: u64,
    /// rate constants are sampled log-uniformly in this range
    pub rate_range: (f64, f64),
    /// concentrations defining the conservation totals, log-uniform in this range
    pub concentration_range: (f64, f64),
    /// guesses are spread by up to this factor around the defining concentrations
    pub guess_spread: f64,
    /// standard deviation in ln-space of certificate-guided samples
    pub certificate_spread: f64,
    pub trial_timeout_ms: u64,
    pub max_iterations: usize,
    pub parallel: bool,
    pub tolerances: Tolerances,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            n_trials: 400,
            guesses_per_trial: 12,
            seed: 42,
            rate_range: (1e-2, 1e2),
            concentration_range: (1e-1, 1e1),
            guess_spread: 1e3,
            certificate_spread: 0.5,
            trial_timeout_ms: 2000,
            max_iterations: 100,
            parallel: true,
            tolerances: Tolerances::default(),
        }
    }
}

fn check_range(name: &str, range: (f64, f64)) -> CrnResult<()> {
    if !(range.0 > 0.0 && range.1 >= range.0 && range.1.is_finite()) {
        return Err(CrnError::ConfigError(format!(
            "{} must satisfy 0 < low <= high, got [{}, {}]",
            name, range.0, range.1
        )));
    }
    Ok(())
}

fn check_positive(name: &str, value: f64) -> CrnResult<()> {
    if !(value > 0.0 && value.is_finite()) {
        return Err(CrnError::ConfigError(format!(
            "{} must be positive, got {}",
            name, value
        )));
    }
    Ok(())
}

impl SearchConfig {
    pub fn validate(&self) -> CrnResult<()> {
        if self.n_trials == 0 {
            return Err(CrnError::ConfigError("n_trials must be at least 1".to_string()));
        }
        if self.guesses_per_trial < 2 {
            return Err(CrnError::ConfigError(
                "guesses_per_trial must be at least 2".to_string(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(CrnError::ConfigError(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        check_range("rate_range", self.rate_range)?;
        check_range("concentration_range", self.concentration_range)?;
        if self.guess_spread < 1.0 {
            return Err(CrnError::ConfigError(format!(
                "guess_spread must be at least 1, got {}",
                self.guess_spread
            )));
        }
        check_positive("certificate_spread", self.certificate_spread)?;
        check_positive("residual_tolerance", self.tolerances.residual_tolerance)?;
        check_positive("min_separation", self.tolerances.min_separation)?;
        check_positive("conservation_tolerance", self.tolerances.conservation_tolerance)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SearchConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tolerances.residual_tolerance, 1e-10);
        assert_eq!(config.guesses_per_trial, 12);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = SearchConfig::default();
        config.n_trials = 0;
        assert!(matches!(config.validate(), Err(CrnError::ConfigError(_))));
        let mut config = SearchConfig::default();
        config.rate_range = (1.0, 0.5);
        assert!(config.validate().is_err());
        let mut config = SearchConfig::default();
        config.tolerances.min_separation = 0.0;
        assert!(config.validate().is_err());
    }
}
