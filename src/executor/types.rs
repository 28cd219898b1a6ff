// Data types for Executor module

use serde::Deserialize;
use std::str::FromStr;
use tracing::warn;

/// How the child environment is built from the ambient one
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvMode {
    /// Start from the parent's environment and overlay appended entries
    #[default]
    Inherit,
    /// Clear the environment; the child sees only appended entries
    Replace,
}

impl FromStr for EnvMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inherit" => Ok(EnvMode::Inherit),
            "replace" => Ok(EnvMode::Replace),
            other => Err(format!("unknown env mode '{}'", other)),
        }
    }
}

/// Description of one external call
#[derive(Debug, Clone)]
pub struct Invocation {
    binary: String,
    args: Vec<String>,
    /// `KEY=VALUE` entries in the order they were appended
    pub env: Vec<String>,
    pub stdin: Option<Vec<u8>>,
    pub env_mode: EnvMode,
}

impl Invocation {
    pub fn new(binary: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            binary: binary.into(),
            args,
            env: Vec::new(),
            stdin: None,
            env_mode: EnvMode::default(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Binary and arguments joined by spaces, as shown in errors
    pub fn command_line(&self) -> String {
        std::iter::once(self.binary.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Appended entries split into key/value pairs, in append order
    ///
    /// Malformed entries are skipped. Duplicate keys are kept so the last
    /// occurrence wins when applied.
    pub fn env_pairs(&self) -> Vec<(&str, &str)> {
        self.env
            .iter()
            .filter_map(|entry| match entry.split_once('=') {
                Some((key, value)) if !key.is_empty() => Some((key, value)),
                _ => {
                    warn!(entry = %entry, "ignoring malformed environment entry");
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_joins_binary_and_args() {
        let inv = Invocation::new("bw", vec!["get".into(), "item".into(), "abc".into()]);
        assert_eq!(inv.command_line(), "bw get item abc");
        assert_eq!(Invocation::new("true", vec![]).command_line(), "true");
    }

    #[test]
    fn test_env_pairs_keeps_order_and_duplicates() {
        let mut inv = Invocation::new("env", vec![]);
        inv.env = vec![
            "A=1".into(),
            "B=x=y".into(),
            "A=2".into(),
            "EMPTY=".into(),
        ];
        assert_eq!(
            inv.env_pairs(),
            vec![("A", "1"), ("B", "x=y"), ("A", "2"), ("EMPTY", "")]
        );
    }

    #[test]
    fn test_env_pairs_skips_malformed() {
        let mut inv = Invocation::new("env", vec![]);
        inv.env = vec!["NOVALUE".into(), "=orphan".into(), "OK=1".into()];
        assert_eq!(inv.env_pairs(), vec![("OK", "1")]);
    }

    #[test]
    fn test_env_mode_parse() {
        assert_eq!("inherit".parse::<EnvMode>(), Ok(EnvMode::Inherit));
        assert_eq!(" Replace ".parse::<EnvMode>(), Ok(EnvMode::Replace));
        assert!("merge".parse::<EnvMode>().is_err());
    }
}
