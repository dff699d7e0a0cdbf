//! Client configuration.
//!
//! Defaults carry the current protocol revision's constants. The earlier
//! revision is available through [`EngineConfig::legacy`].

use std::time::Duration;

use regsync_core::{ClientIdentity, ErrorClassifier, PollSchedule, ResubmitSchedule, Stand};
use serde::{Deserialize, Serialize};

/// Errors loading a configuration document.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Retry, polling and concurrency settings of the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Wait ladder between result polls.
    pub poll: PollSchedule,
    /// Wait and cap for repeating calls that failed with ignorable errors.
    pub resubmit: ResubmitSchedule,
    /// How long a restartable operation may wait for its result before it is
    /// resubmitted from scratch.
    pub restart_timeout: Duration,
    /// Concurrently active operations in the assembler's fan-out phases.
    pub max_concurrency: usize,
    /// Wait limit for writes that must not be resubmitted. `None` polls until
    /// a result arrives or the caller cancels.
    pub write_wait_limit: Option<Duration>,
    pub classifier: ErrorClassifier,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll: PollSchedule::default(),
            resubmit: ResubmitSchedule::default(),
            restart_timeout: Duration::from_secs(20 * 60),
            max_concurrency: crate::registry::DEFAULT_MAX_CONCURRENCY,
            write_wait_limit: None,
            classifier: ErrorClassifier::default(),
        }
    }
}

impl EngineConfig {
    /// Constants of the earlier protocol revision.
    #[must_use]
    pub fn legacy() -> Self {
        Self {
            poll: PollSchedule::legacy(),
            resubmit: ResubmitSchedule::legacy(),
            restart_timeout: Duration::from_secs(120 * 60),
            ..Self::default()
        }
    }
}

/// Top-level client configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub identity: ClientIdentity,
    pub stand: Stand,
    pub engine: EngineConfig,
}

impl ClientConfig {
    /// Parses and validates a JSON configuration document. Missing fields take
    /// their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON or an invalid poll
    /// ladder, and [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the concurrency or the resubmission
    /// cap is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "engine.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.engine.resubmit.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "engine.resubmit.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
