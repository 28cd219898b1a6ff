// Executor configuration

use crate::executor::command::{Command, NewCommandFn};
use crate::executor::error::ConfigError;
use crate::executor::policy::PatternRetryHandler;
use crate::executor::process::ProcessCommand;
use crate::executor::retry::RetryableCommand;
use crate::executor::types::EnvMode;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Retry settings for the built-in pattern policy
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first; 1 disables retries
    pub max_attempts: u32,
    /// Delay after the first failure, doubled on each further failure
    pub base_delay_ms: u64,
    /// Upper bound for a single delay
    pub max_delay_ms: u64,
    /// Randomize each delay within [delay/2, delay]
    pub jitter: bool,
    /// Substrings of the combined stdout+stderr output that make a failure retryable
    pub retryable_patterns: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 500,
            max_delay_ms: 30000,
            jitter: true,
            retryable_patterns: Vec::new(),
        }
    }
}

/// Executor configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// How the child environment relates to ours
    pub env_mode: EnvMode,
    pub retry: RetryConfig,
}

impl ExecutorConfig {
    /// Load from a TOML file; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.display().to_string(), e))?;
        let config: ExecutorConfig = toml::from_str(&content)?;
        config.validate()?;

        debug!(path = %path.display(), "loaded executor config");
        Ok(config)
    }

    /// Load the config file, then apply environment variable overrides
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let path = std::env::var("CLIEXEC_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_config_path());

        let mut config = Self::load(&path)?;
        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `CLIEXEC_*` overrides read through `lookup`
    ///
    /// Invalid values are logged and leave the current value in place.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        self.env_mode = parse_var(&lookup, "CLIEXEC_ENV_MODE", self.env_mode);
        self.retry.max_attempts =
            parse_var(&lookup, "CLIEXEC_MAX_ATTEMPTS", self.retry.max_attempts);
        self.retry.base_delay_ms =
            parse_var(&lookup, "CLIEXEC_RETRY_DELAY_MS", self.retry.base_delay_ms);
        self.retry.max_delay_ms =
            parse_var(&lookup, "CLIEXEC_MAX_RETRY_DELAY_MS", self.retry.max_delay_ms);
        self.retry.jitter = parse_var(&lookup, "CLIEXEC_RETRY_JITTER", self.retry.jitter);

        if let Some(patterns) = lookup("CLIEXEC_RETRY_PATTERNS") {
            self.retry.retryable_patterns = patterns
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.retry.base_delay_ms, self.retry.max_delay_ms
            )));
        }
        Ok(())
    }

    /// Factory honoring the env mode, wrapping in retries when enabled
    pub fn command_factory(&self) -> NewCommandFn {
        let env_mode = self.env_mode;

        if self.retry.max_attempts <= 1 {
            return Arc::new(move |binary: &str, args: &[&str]| {
                Box::new(ProcessCommand::new(binary, args).with_env_mode(env_mode))
                    as Box<dyn Command>
            });
        }

        let handler = Arc::new(PatternRetryHandler::new(&self.retry));
        Arc::new(move |binary: &str, args: &[&str]| {
            let inner = ProcessCommand::new(binary, args).with_env_mode(env_mode);
            Box::new(RetryableCommand::new(Box::new(inner), handler.clone())) as Box<dyn Command>
        })
    }
}

fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .map(|p| p.join(".cliexec").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from(".cliexec/config.toml"))
}

/// Parse a variable, logging a warning if the value is present but invalid.
fn parse_var<T, F>(lookup: &F, name: &str, default: T) -> T
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(v) => match v.trim().parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(var = name, value = %v, "Invalid env var value, using default");
                default
            }
        },
        None => default,
    }
}
