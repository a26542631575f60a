use crate::crn_error::{CrnError, CrnResult};
use simplelog::{
    ColorChoice, CombinedLogger, Config, LevelFilter, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};
use std::fs::File;
use std::path::Path;

pub fn level_from_str(level: &str) -> CrnResult<LevelFilter> {
    match level.to_lowercase().as_str() {
        "off" => Ok(LevelFilter::Off),
        "error" => Ok(LevelFilter::Error),
        "warn" => Ok(LevelFilter::Warn),
        "info" => Ok(LevelFilter::Info),
        "debug" => Ok(LevelFilter::Debug),
        "trace" => Ok(LevelFilter::Trace),
        other => Err(CrnError::ConfigError(format!("unknown log level '{}'", other))),
    }
}

/// Terminal logger plus an optional log file. Returns `false` when a global logger was
/// already installed (repeated calls from tests or the interactive menu).
pub fn init_logger(level: &str, log_file: Option<&Path>) -> CrnResult<bool> {
    let filter = level_from_str(level)?;
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        filter,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];
    if let Some(path) = log_file {
        loggers.push(WriteLogger::new(filter, Config::default(), File::create(path)?));
    }
    Ok(CombinedLogger::init(loggers).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_level_names() {
        assert_eq!(level_from_str("DEBUG").unwrap(), LevelFilter::Debug);
        assert_eq!(level_from_str("off").unwrap(), LevelFilter::Off);
        assert!(matches!(level_from_str("loud"), Err(CrnError::ConfigError(_))));
    }

    #[test]
    fn test_second_init_is_tolerated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.log");
        let first = init_logger("warn", Some(&path)).unwrap();
        let second = init_logger("warn", None).unwrap();
        assert!(!second || !first);
        assert!(path.exists());
    }
}
