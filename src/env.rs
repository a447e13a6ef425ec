//! Process-wide safety ceilings and result storage settings.
//!
//! An [`Environment`] is built once at startup and handed to
//! [`Bombard`](crate::Bombard), which never mutates it. Every clamp in the
//! merge engine reads its ceilings from here.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Attack duration used when a target does not set one.
pub const DEFAULT_ATTACK_DURATION: Duration = Duration::from_secs(10);

/// Requests per second used when a target does not set a rate.
pub const DEFAULT_ATTACK_RATE_PER_SECOND: u32 = 500;

/// Per-request timeout used when a target does not set one.
pub const DEFAULT_ATTACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Default ceiling for client-requested attack durations.
pub const DEFAULT_MAX_ATTACK_DURATION: Duration = Duration::from_secs(30);

/// Default ceiling for client-requested attack rates.
pub const DEFAULT_MAX_ATTACK_RATE: u32 = 3000;

/// Safety ceilings and result storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    /// Longest attack a client may request
    #[serde(default = "default_max_attack_duration", with = "crate::options::humantime_serde")]
    pub max_attack_duration: Duration,

    /// Highest rate per second a client may request
    #[serde(default = "default_max_attack_rate")]
    pub max_attack_rate: u32,

    /// Longest per-request timeout a client may request
    #[serde(default = "default_max_attack_timeout", with = "crate::options::humantime_serde")]
    pub max_attack_timeout: Duration,

    /// Directory where attack results are stored
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,

    /// Suffix appended to every result file name, may be empty
    #[serde(default)]
    pub results_suffix: String,
}

fn default_max_attack_duration() -> Duration {
    DEFAULT_MAX_ATTACK_DURATION
}

fn default_max_attack_rate() -> u32 {
    DEFAULT_MAX_ATTACK_RATE
}

fn default_max_attack_timeout() -> Duration {
    DEFAULT_ATTACK_TIMEOUT
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("testdata")
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            max_attack_duration: default_max_attack_duration(),
            max_attack_rate: default_max_attack_rate(),
            max_attack_timeout: default_max_attack_timeout(),
            results_dir: default_results_dir(),
            results_suffix: String::new(),
        }
    }
}

impl Environment {
    /// Check that every ceiling is positive and the suffix is usable in a
    /// file name.
    pub fn validate(&self) -> Result<()> {
        if self.max_attack_duration.is_zero() {
            return Err(Error::InvalidEnvironment(
                "max_attack_duration must be positive".to_string(),
            ));
        }
        if self.max_attack_rate == 0 {
            return Err(Error::InvalidEnvironment(
                "max_attack_rate must be positive".to_string(),
            ));
        }
        if self.max_attack_timeout.is_zero() {
            return Err(Error::InvalidEnvironment(
                "max_attack_timeout must be positive".to_string(),
            ));
        }
        if self.results_suffix.contains(['/', '\\']) {
            return Err(Error::InvalidEnvironment(format!(
                "results_suffix must not contain a path separator: {}",
                self.results_suffix
            )));
        }
        Ok(())
    }

    /// Build the result file name for one attack.
    pub(crate) fn result_name(
        &self,
        target_id: &str,
        http_target_id: &str,
        timestamp: chrono::DateTime<chrono::Utc>,
        rate: u32,
        duration: Duration,
    ) -> String {
        let mut name = format!(
            "{}.{}.{}.{}x{}s",
            target_id,
            http_target_id,
            timestamp.format("%Y%m%d%H%M%S"),
            rate,
            duration.as_secs()
        );
        if !self.results_suffix.is_empty() {
            name.push('.');
            name.push_str(&self.results_suffix);
        }
        name.push_str(RESULT_EXTENSION);
        name
    }
}

/// Extension of every persisted result file.
pub(crate) const RESULT_EXTENSION: &str = ".json";
