// Executor module - runs external CLI tools with optional retries

pub mod command;
pub mod config;
pub mod error;
pub mod policy;
pub mod process;
pub mod retry;
pub mod types;

pub use command::{Command, NewCommandFn, new_command};
pub use config::{ExecutorConfig, RetryConfig};
pub use error::{CommandError, ConfigError, Result};
pub use policy::PatternRetryHandler;
pub use process::ProcessCommand;
pub use retry::{FnRetryHandler, RetryHandler, RetryableCommand, new_command_with_retries};
pub use types::{EnvMode, Invocation};
