//! cliexec
//!
//! Runs one external command through the executor, with the same environment
//! and retry handling library callers get. Useful to reproduce a failing CLI
//! call by hand.

use clap::Parser;
use cliexec::executor::{Command, CommandError, ExecutorConfig};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info};
use tracing_subscriber::fmt;

/// CLI arguments
#[derive(Debug, Parser)]
#[command(name = "cliexec")]
#[command(about = "Run a command-line tool with captured output and optional retries")]
struct Args {
    /// Environment entry for the child (KEY=VALUE), repeatable
    #[arg(short, long = "env", value_name = "KEY=VALUE")]
    envs: Vec<String>,

    /// Text to pass on the child's stdin
    #[arg(long, conflicts_with = "stdin_file")]
    stdin: Option<String>,

    /// File whose content is passed on stdin ("-" reads our own stdin)
    #[arg(long)]
    stdin_file: Option<PathBuf>,

    /// Total attempts including the first
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Retry only failures whose text contains this pattern, repeatable
    #[arg(long = "retry-on", value_name = "PATTERN")]
    retry_on: Vec<String>,

    /// Delay after the first failure in milliseconds
    #[arg(long)]
    retry_delay_ms: Option<u64>,

    /// Do not inherit our environment; the child sees only --env entries
    #[arg(long)]
    replace_env: bool,

    /// Config file path (defaults to $CLIEXEC_CONFIG or ~/.cliexec/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    /// Binary to run
    binary: String,

    /// Arguments passed verbatim to the binary
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

impl Args {
    fn executor_config(&self) -> Result<ExecutorConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => {
                let mut config = ExecutorConfig::load(path)?;
                config.apply_overrides(|name| std::env::var(name).ok());
                config
            }
            None => ExecutorConfig::from_env()?,
        };

        if let Some(n) = self.max_attempts {
            config.retry.max_attempts = n;
        }
        if !self.retry_on.is_empty() {
            config.retry.retryable_patterns = self.retry_on.clone();
        }
        if let Some(ms) = self.retry_delay_ms {
            config.retry.base_delay_ms = ms;
            config.retry.max_delay_ms = config.retry.max_delay_ms.max(ms);
        }
        if self.replace_env {
            config.env_mode = cliexec::EnvMode::Replace;
        }

        config.validate()?;
        Ok(config)
    }

    fn stdin_payload(&self) -> io::Result<Option<String>> {
        if let Some(text) = &self.stdin {
            return Ok(Some(text.clone()));
        }
        match &self.stdin_file {
            Some(path) if path.as_os_str() == "-" => {
                let mut buf = String::new();
                io::stdin().read_to_string(&mut buf)?;
                Ok(Some(buf))
            }
            Some(path) => std::fs::read_to_string(path).map(Some),
            None => Ok(None),
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Logs go to stderr; stdout carries the child's output
    fmt()
        .with_max_level(if args.verbose {
            Level::DEBUG
        } else {
            Level::WARN
        })
        .with_target(true)
        .with_writer(io::stderr)
        .init();

    let config = match args.executor_config() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            process::exit(2);
        }
    };

    let stdin = match args.stdin_payload() {
        Ok(stdin) => stdin,
        Err(e) => {
            error!(error = %e, "failed to read stdin payload");
            process::exit(2);
        }
    };

    info!(
        binary = %args.binary,
        max_attempts = config.retry.max_attempts,
        env_mode = ?config.env_mode,
        "configuration loaded"
    );

    let arg_refs: Vec<&str> = args.args.iter().map(String::as_str).collect();
    let new_command = config.command_factory();
    let mut cmd = new_command(args.binary.as_str(), &arg_refs[..]);
    cmd.append_env(args.envs.clone());
    if let Some(payload) = &stdin {
        cmd.with_stdin(payload);
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            on_signal.cancel();
        }
    });

    match cmd.run_with_cancel(&cancel).await {
        Ok(out) => {
            if let Err(e) = io::stdout().write_all(&out) {
                error!(error = %e, "failed to write output");
                process::exit(1);
            }
        }
        Err(e) => {
            let mut stdout = io::stdout();
            let _ = stdout.write_all(e.stdout()).and_then(|_| stdout.flush());
            eprintln!("{}", e);
            process::exit(exit_code_for(&e));
        }
    }
}

fn exit_code_for(err: &CommandError) -> i32 {
    match err {
        CommandError::Cancelled { .. } => 130,
        CommandError::Launch { .. } => 127,
        _ => err.exit_code().filter(|c| *c != 0).unwrap_or(1),
    }
}
