// Error types for Executor module

use std::process::ExitStatus;
use thiserror::Error;

/// Errors returned by a command run
///
/// Every variant keeps the command line that was run and the stdout bytes
/// collected before the failure. Launch, exit and I/O failures also carry the
/// combined stdout+stderr text for offline diagnosis.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The process could not be started (binary missing, permission denied)
    #[error("error running '{command}': {source}, {output}")]
    Launch {
        command: String,
        source: std::io::Error,
        output: String,
        stdout: Vec<u8>,
    },

    /// The process exited with a non-zero status or was killed by a signal
    #[error("error running '{command}': {status}, {output}")]
    Exit {
        command: String,
        status: ExitStatus,
        output: String,
        stdout: Vec<u8>,
    },

    /// Feeding stdin or reading the output pipes failed after spawn
    #[error("error running '{command}': {source}, {output}")]
    Io {
        command: String,
        source: std::io::Error,
        output: String,
        stdout: Vec<u8>,
    },

    #[error("running '{command}' was cancelled")]
    Cancelled { command: String, stdout: Vec<u8> },
}

impl CommandError {
    /// The space-joined binary and argument vector that failed
    pub fn command(&self) -> &str {
        match self {
            CommandError::Launch { command, .. }
            | CommandError::Exit { command, .. }
            | CommandError::Io { command, .. }
            | CommandError::Cancelled { command, .. } => command,
        }
    }

    /// Combined stdout and stderr text produced during the run
    pub fn output(&self) -> &str {
        match self {
            CommandError::Launch { output, .. }
            | CommandError::Exit { output, .. }
            | CommandError::Io { output, .. } => output,
            CommandError::Cancelled { .. } => "",
        }
    }

    /// Stdout bytes collected before the failure, possibly partial
    pub fn stdout(&self) -> &[u8] {
        match self {
            CommandError::Launch { stdout, .. }
            | CommandError::Exit { stdout, .. }
            | CommandError::Io { stdout, .. }
            | CommandError::Cancelled { stdout, .. } => stdout,
        }
    }

    pub fn into_stdout(self) -> Vec<u8> {
        match self {
            CommandError::Launch { stdout, .. }
            | CommandError::Exit { stdout, .. }
            | CommandError::Io { stdout, .. }
            | CommandError::Cancelled { stdout, .. } => stdout,
        }
    }

    /// Exit code of the process, if it exited normally
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            CommandError::Exit { status, .. } => status.code(),
            _ => None,
        }
    }

    pub fn is_launch_failure(&self) -> bool {
        matches!(self, CommandError::Launch { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, CommandError::Cancelled { .. })
    }

    /// Turn any failure into a cancellation of the same command
    pub(crate) fn into_cancelled(self) -> Self {
        let command = self.command().to_string();
        CommandError::Cancelled {
            command,
            stdout: self.into_stdout(),
        }
    }
}

/// Result type for command runs
pub type Result<T> = std::result::Result<T, CommandError>;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{0}': {1}")]
    Io(String, #[source] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
