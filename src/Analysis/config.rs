use super::acr::AcrConfig;
use crate::SignConditions::sign_solver::SignConditionConfig;
use crate::WitnessSearch::continuation::ContinuationConfig;
use crate::Utils::logger::level_from_str;
use crate::WitnessSearch::search_config::SearchConfig;
use crate::crn_error::{CrnError, CrnResult};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Every setting of one analysis run. Any field missing from a JSON file keeps its
/// default.
///
/// # Examples
/// ```
/// use CRNmultistab::Analysis::config::AnalysisConfig;
/// let config: AnalysisConfig = serde_json::from_str(r#"{"search": {"n_trials": 50}}"#).unwrap();
/// assert_eq!(config.search.n_trials, 50);
/// assert_eq!(config.search.guesses_per_trial, 12);
/// assert!(config.decompose);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub decompose: bool,
    pub sign_conditions: SignConditionConfig,
    pub search: SearchConfig,
    pub continuation: ContinuationConfig,
    pub acr: AcrConfig,
    pub log_level: String,
    pub log_file: Option<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            decompose: true,
            sign_conditions: SignConditionConfig::default(),
            search: SearchConfig::default(),
            continuation: ContinuationConfig::default(),
            acr: AcrConfig::default(),
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

impl AnalysisConfig {
    pub fn from_json_file(path: &Path) -> CrnResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: AnalysisConfig = serde_json::from_str(&content)?;
        config.validate()?;
        info!("configuration loaded from {}", path.display());
        Ok(config)
    }

    pub fn to_json_file(&self, path: &Path) -> CrnResult<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> CrnResult<()> {
        let sc = &self.sign_conditions;
        if !(sc.tolerance > 0.0) {
            return Err(CrnError::ConfigError(format!(
                "sign condition tolerance must be positive, got {}",
                sc.tolerance
            )));
        }
        if sc.lp_timeout_ms == 0 || sc.max_sign_terms == 0 {
            return Err(CrnError::ConfigError(
                "lp_timeout_ms and max_sign_terms must be at least 1".to_string(),
            ));
        }
        self.search.validate()?;
        if self.continuation.enabled {
            self.continuation.validate()?;
        }
        if self.acr.enabled {
            self.acr.validate()?;
        }
        level_from_str(&self.log_level)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SignConditions::lp::LpBackendConfig;
    use tempfile::tempdir;

    #[test]
    fn test_json_round_trip_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{
                "decompose": false,
                "search": {"n_trials": 25, "tolerances": {"min_separation": 0.01}},
                "sign_conditions": {"backend": {"Glpk": {"binary": "glpsol"}}},
                "acr": {"fixed_rates": {"r1": 1.0}}
            }"#,
        )
        .unwrap();
        let config = AnalysisConfig::from_json_file(&path).unwrap();
        assert!(!config.decompose);
        assert_eq!(config.search.n_trials, 25);
        assert_eq!(config.search.tolerances.min_separation, 0.01);
        assert_eq!(config.search.tolerances.residual_tolerance, 1e-10);
        assert_eq!(
            config.sign_conditions.backend,
            LpBackendConfig::Glpk {
                binary: "glpsol".to_string()
            }
        );
        assert_eq!(config.acr.fixed_rates.get("r1"), Some(&1.0));
        assert_eq!(config.continuation.step_factor, 1.1);

        let out = dir.path().join("saved.json");
        config.to_json_file(&out).unwrap();
        assert_eq!(AnalysisConfig::from_json_file(&out).unwrap(), config);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{"search": {"n_trials": 0}}"#).unwrap();
        assert!(matches!(
            AnalysisConfig::from_json_file(&path),
            Err(CrnError::ConfigError(_))
        ));
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            AnalysisConfig::from_json_file(&path),
            Err(CrnError::Json(_))
        ));
        let config = AnalysisConfig {
            log_level: "loud".to_string(),
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
