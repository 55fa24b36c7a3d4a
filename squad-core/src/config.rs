//! Configuration types

use crate::{ConfigError, SandboxResources};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Timing and limits for the coordination loops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinationConfig {
    /// Fixed poll interval for wait loops
    pub poll_interval: Duration,
    /// Soft deadline for a director waiting on specialists
    pub wait_timeout: Duration,
    /// Default limit for unread message queries
    pub inbox_limit: usize,
    /// Limit used by the specialist inbox poll
    pub inbox_poll_limit: usize,
    /// Provision a sandbox for every spawned agent
    pub provision_sandboxes: bool,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1_000),
            wait_timeout: Duration::from_millis(60_000),
            inbox_limit: 20,
            inbox_poll_limit: 10,
            provision_sandboxes: false,
        }
    }
}

impl CoordinationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "poll_interval".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.poll_interval > self.wait_timeout {
            return Err(ConfigError::InvalidValue {
                field: "poll_interval".to_string(),
                value: format!("{:?}", self.poll_interval),
                reason: "must not exceed wait_timeout".to_string(),
            });
        }
        if self.inbox_limit == 0 || self.inbox_poll_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "inbox_limit".to_string(),
                value: "0".to_string(),
                reason: "limits must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Defaults applied to sandboxes created without explicit resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxDefaults {
    pub resources: SandboxResources,
    /// Estimated cost per vCPU-second, in dollars
    pub cost_per_cpu_second: f64,
}

impl Default for SandboxDefaults {
    fn default() -> Self {
        Self {
            resources: SandboxResources::default(),
            cost_per_cpu_second: 0.000014,
        }
    }
}

impl SandboxDefaults {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.resources;
        if r.cpu_count <= 0 || r.memory_mb <= 0 || r.timeout_ms <= 0 {
            return Err(ConfigError::InvalidValue {
                field: "resources".to_string(),
                value: format!("{:?}", r),
                reason: "resource counts must be positive".to_string(),
            });
        }
        if self.cost_per_cpu_second < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "cost_per_cpu_second".to_string(),
                value: self.cost_per_cpu_second.to_string(),
                reason: "must be non-negative".to_string(),
            });
        }
        Ok(())
    }
}

/// Completion runner settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub model: String,
    pub max_tokens: i32,
    /// Root directory holding `director/SKILL.md` and
    /// `specialist/<specialization>/SKILL.md`
    pub skills_dir: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 4096,
            skills_dir: PathBuf::from(".claude/skills"),
        }
    }
}

impl RunnerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "model".to_string(),
            });
        }
        if self.max_tokens <= 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_tokens".to_string(),
                value: self.max_tokens.to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}
