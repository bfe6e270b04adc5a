//! Pipeline policy configuration.

use std::time::Duration;

use crate::PipelineError;

/// Default readiness threshold (wallet balance in SOL).
pub const DEFAULT_GATE_THRESHOLD: f64 = 0.1;

/// Default score at or above which content is stored in long-term memory.
pub const DEFAULT_MEMORY_THRESHOLD: u8 = 7;

/// Default score at or above which content is published.
pub const DEFAULT_PUBLISH_THRESHOLD: u8 = 3;

/// Default posting identity.
pub const DEFAULT_USERNAME: &str = "herald";

/// Default per-call collaborator timeout in seconds.
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 120;

/// Default number of prior posts fed back into generation.
pub const DEFAULT_PRIOR_POSTS_LIMIT: usize = 10;

/// Thresholds and limits applied during a run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Runs abort cleanly when readiness is below this value.
    pub gate_threshold: f64,
    /// Minimum score for long-term memory persistence.
    pub memory_threshold: u8,
    /// Minimum score for publishing.
    pub publish_threshold: u8,
    /// Username of the posting identity in the ledger.
    pub username: String,
    /// Upper bound on any single collaborator call.
    pub call_timeout: Duration,
    /// How many recent posts to feed back as context.
    pub prior_posts_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            gate_threshold: DEFAULT_GATE_THRESHOLD,
            memory_threshold: DEFAULT_MEMORY_THRESHOLD,
            publish_threshold: DEFAULT_PUBLISH_THRESHOLD,
            username: DEFAULT_USERNAME.to_string(),
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
            prior_posts_limit: DEFAULT_PRIOR_POSTS_LIMIT,
        }
    }
}

impl PipelineConfig {
    /// Validate thresholds and limits.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !self.gate_threshold.is_finite() {
            return Err(PipelineError::Config(
                "gate threshold must be a finite number".to_string(),
            ));
        }
        for (name, value) in [
            ("memory threshold", self.memory_threshold),
            ("publish threshold", self.publish_threshold),
        ] {
            if !(1..=10).contains(&value) {
                return Err(PipelineError::Config(format!(
                    "{} must be between 1 and 10, got {}",
                    name, value
                )));
            }
        }
        if self.username.trim().is_empty() {
            return Err(PipelineError::Config("username must not be empty".to_string()));
        }
        if self.call_timeout.is_zero() {
            return Err(PipelineError::Config(
                "call timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
