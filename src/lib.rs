//! Execution layer for external command-line tools
//!
//! A [`Command`] composes a binary, its arguments, environment entries and an
//! optional stdin payload into one process call. [`RetryableCommand`] wraps any
//! command behind the same trait and reruns it according to a [`RetryHandler`].

pub mod executor;

pub use executor::{
    Command, CommandError, EnvMode, ExecutorConfig, FnRetryHandler, NewCommandFn,
    PatternRetryHandler, ProcessCommand, RetryConfig, RetryHandler, RetryableCommand,
    new_command, new_command_with_retries,
};
