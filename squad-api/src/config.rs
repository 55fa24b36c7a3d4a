//! Environment configuration for the `squad` binary.
//!
//! Required: `ANTHROPIC_API_KEY` (must start with `sk-ant-`) and
//! `E2B_API_KEY`. Everything else is optional:
//!
//! | Variable | Default |
//! |----------|---------|
//! | `SQUAD_POLL_INTERVAL_MS` | 1000 |
//! | `SQUAD_WAIT_TIMEOUT_MS` | 60000 |
//! | `SQUAD_INBOX_LIMIT` | 20 |
//! | `SQUAD_PROVISION_SANDBOXES` | true |
//! | `SQUAD_MODEL` | claude-sonnet-4-20250514 |
//! | `SQUAD_MAX_TOKENS` | 4096 |
//! | `SQUAD_SKILLS_DIR` | .claude/skills |
//! | `SQUAD_REQUESTS_PER_MINUTE` | 50 |
//! | `SQUAD_SANDBOX_TEMPLATE` | base |
//! | `SQUAD_SANDBOX_CPU` | 2 |
//! | `SQUAD_SANDBOX_MEMORY_MB` | 512 |
//! | `SQUAD_SANDBOX_TIMEOUT_MS` | 600000 |
//! | `SQUAD_LOG_FORMAT` | pretty |
//! | `SQUAD_STORE_PATH` | unset (in-memory store) |

use squad_core::{ConfigError, CoordinationConfig, RunnerConfig, SandboxDefaults};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(ConfigError::InvalidValue {
                field: "SQUAD_LOG_FORMAT".to_string(),
                value: s.to_string(),
                reason: "expected pretty or json".to_string(),
            }),
        }
    }
}

/// Fully resolved configuration.
#[derive(Clone)]
pub struct SquadConfig {
    pub anthropic_api_key: String,
    pub e2b_api_key: String,
    pub coordination: CoordinationConfig,
    pub runner: RunnerConfig,
    pub sandbox: SandboxDefaults,
    pub sandbox_template: String,
    pub requests_per_minute: u32,
    pub log_format: LogFormat,
    /// SQLite database file; `None` keeps all state in memory.
    pub store_path: Option<PathBuf>,
}

impl fmt::Debug for SquadConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SquadConfig")
            .field("anthropic_api_key", &"[REDACTED]")
            .field("e2b_api_key", &"[REDACTED]")
            .field("coordination", &self.coordination)
            .field("runner", &self.runner)
            .field("sandbox", &self.sandbox)
            .field("sandbox_template", &self.sandbox_template)
            .field("requests_per_minute", &self.requests_per_minute)
            .field("log_format", &self.log_format)
            .field("store_path", &self.store_path)
            .finish()
    }
}

impl SquadConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let anthropic_api_key = var("ANTHROPIC_API_KEY").ok_or_else(|| missing("ANTHROPIC_API_KEY"))?;
        if !anthropic_api_key.starts_with("sk-ant-") {
            return Err(ConfigError::InvalidValue {
                field: "ANTHROPIC_API_KEY".to_string(),
                value: "[REDACTED]".to_string(),
                reason: "must start with sk-ant-".to_string(),
            });
        }
        let e2b_api_key = var("E2B_API_KEY").ok_or_else(|| missing("E2B_API_KEY"))?;

        let defaults = CoordinationConfig::default();
        let coordination = CoordinationConfig {
            poll_interval: parse_or(&var, "SQUAD_POLL_INTERVAL_MS", defaults.poll_interval.as_millis() as u64)
                .map(Duration::from_millis)?,
            wait_timeout: parse_or(&var, "SQUAD_WAIT_TIMEOUT_MS", defaults.wait_timeout.as_millis() as u64)
                .map(Duration::from_millis)?,
            inbox_limit: parse_or(&var, "SQUAD_INBOX_LIMIT", defaults.inbox_limit)?,
            inbox_poll_limit: defaults.inbox_poll_limit,
            provision_sandboxes: parse_bool_or(&var, "SQUAD_PROVISION_SANDBOXES", true)?,
        };
        coordination.validate()?;

        let runner_defaults = RunnerConfig::default();
        let runner = RunnerConfig {
            model: var("SQUAD_MODEL").unwrap_or(runner_defaults.model),
            max_tokens: parse_or(&var, "SQUAD_MAX_TOKENS", runner_defaults.max_tokens)?,
            skills_dir: var("SQUAD_SKILLS_DIR")
                .map(PathBuf::from)
                .unwrap_or(runner_defaults.skills_dir),
        };
        runner.validate()?;

        let mut sandbox = SandboxDefaults::default();
        sandbox.resources.cpu_count = parse_or(&var, "SQUAD_SANDBOX_CPU", sandbox.resources.cpu_count)?;
        sandbox.resources.memory_mb =
            parse_or(&var, "SQUAD_SANDBOX_MEMORY_MB", sandbox.resources.memory_mb)?;
        sandbox.resources.timeout_ms =
            parse_or(&var, "SQUAD_SANDBOX_TIMEOUT_MS", sandbox.resources.timeout_ms)?;
        sandbox.validate()?;

        let requests_per_minute = parse_or(&var, "SQUAD_REQUESTS_PER_MINUTE", 50u32)?;
        if requests_per_minute == 0 {
            return Err(ConfigError::InvalidValue {
                field: "SQUAD_REQUESTS_PER_MINUTE".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }

        Ok(Self {
            anthropic_api_key,
            e2b_api_key,
            coordination,
            runner,
            sandbox,
            sandbox_template: var("SQUAD_SANDBOX_TEMPLATE").unwrap_or_else(|| "base".to_string()),
            requests_per_minute,
            log_format: var("SQUAD_LOG_FORMAT")
                .map(|v| v.parse())
                .transpose()?
                .unwrap_or_default(),
            store_path: var("SQUAD_STORE_PATH").map(PathBuf::from),
        })
    }
}

fn missing(field: &str) -> ConfigError {
    ConfigError::MissingRequired {
        field: field.to_string(),
    }
}

fn parse_or<T, V>(var: &V, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    V: Fn(&str) -> Option<String>,
{
    match var(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            field: key.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn parse_bool_or<V>(var: &V, key: &str, default: bool) -> Result<bool, ConfigError>
where
    V: Fn(&str) -> Option<String>,
{
    match var(key).map(|v| v.trim().to_lowercase()) {
        None => Ok(default),
        Some(v) if v == "true" || v == "1" => Ok(true),
        Some(v) if v == "false" || v == "0" => Ok(false),
        Some(v) => Err(ConfigError::InvalidValue {
            field: key.to_string(),
            value: v,
            reason: "expected true/false".to_string(),
        }),
    }
}
