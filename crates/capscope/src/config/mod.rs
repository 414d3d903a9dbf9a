//! Runtime settings for the analysis scheduler.
//!
//! Settings come from the environment with validated defaults, so the
//! scheduler can be constructed without any configuration file present.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Concurrency ceiling for running analyses.
pub const ENV_MAX_CONCURRENT: &str = "MAX_CONCURRENT_ANALYSIS";
/// Per-job wall-clock timeout in milliseconds.
pub const ENV_ANALYSIS_TIMEOUT: &str = "ANALYSIS_TIMEOUT";
/// Directory holding the external engine scripts.
pub const ENV_SCRIPTS_DIR: &str = "ANALYSIS_SCRIPTS_DIR";
/// Interpreter used to invoke the engine scripts.
pub const ENV_PYTHON_BIN: &str = "ANALYSIS_PYTHON_BIN";

const DEFAULT_MAX_CONCURRENT: usize = 3;
const DEFAULT_TIMEOUT_MS: u64 = 300_000;
const DEFAULT_SCRIPTS_DIR: &str = "analysis-scripts";
const DEFAULT_PYTHON_BIN: &str = "python3";

#[derive(Debug, Clone)]
pub struct Settings {
    /// Maximum number of analyses running at once.
    pub max_concurrent: usize,
    /// Wall-clock timeout for a single engine invocation.
    pub analysis_timeout: Duration,
    /// Directory containing the analysis engine scripts.
    pub scripts_dir: PathBuf,
    /// Interpreter binary for the engine scripts.
    pub python_bin: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            analysis_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            scripts_dir: PathBuf::from(DEFAULT_SCRIPTS_DIR),
            python_bin: DEFAULT_PYTHON_BIN.to_string(),
        }
    }
}

impl Settings {
    /// Builds settings from the environment. Unset variables fall back to
    /// defaults; unparsable values are an error rather than a silent default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Self::default();

        if let Ok(raw) = std::env::var(ENV_MAX_CONCURRENT) {
            settings.max_concurrent = parse_var(ENV_MAX_CONCURRENT, &raw)?;
        }
        if let Ok(raw) = std::env::var(ENV_ANALYSIS_TIMEOUT) {
            let millis: u64 = parse_var(ENV_ANALYSIS_TIMEOUT, &raw)?;
            settings.analysis_timeout = Duration::from_millis(millis);
        }
        if let Ok(raw) = std::env::var(ENV_SCRIPTS_DIR) {
            settings.scripts_dir = PathBuf::from(raw);
        }
        if let Ok(raw) = std::env::var(ENV_PYTHON_BIN) {
            settings.python_bin = raw;
        }

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 {
            return Err(ConfigError::Validation {
                message: format!("{} must be at least 1", ENV_MAX_CONCURRENT),
            });
        }
        if self.analysis_timeout.is_zero() {
            return Err(ConfigError::Validation {
                message: format!("{} must be greater than 0", ENV_ANALYSIS_TIMEOUT),
            });
        }
        if self.python_bin.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: format!("{} must not be empty", ENV_PYTHON_BIN),
            });
        }
        Ok(())
    }
}

fn parse_var<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr<Err = std::num::ParseIntError>,
{
    raw.trim().parse().map_err(|source| ConfigError::ParseVar {
        name,
        value: raw.to_string(),
        source,
    })
}
