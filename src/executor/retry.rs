// Retry decorator for commands

use crate::executor::command::{Command, NewCommandFn, new_command};
use crate::executor::{CommandError, Result};
use async_trait::async_trait;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Decides whether a failed attempt is retried and how long to wait first
///
/// `attempt` is 1-indexed: it is the number of the attempt that just failed.
/// Bounding the number of attempts is up to the implementation.
pub trait RetryHandler: Send + Sync {
    fn is_retryable(&self, err: &CommandError, attempt: u32) -> bool;

    fn backoff(&self, attempt: u32) -> Duration;
}

/// `RetryHandler` built from a pair of closures
pub struct FnRetryHandler<R, B> {
    is_retryable: R,
    backoff: B,
}

impl<R, B> FnRetryHandler<R, B>
where
    R: Fn(&CommandError, u32) -> bool + Send + Sync,
    B: Fn(u32) -> Duration + Send + Sync,
{
    pub fn new(is_retryable: R, backoff: B) -> Self {
        Self {
            is_retryable,
            backoff,
        }
    }
}

impl<R, B> RetryHandler for FnRetryHandler<R, B>
where
    R: Fn(&CommandError, u32) -> bool + Send + Sync,
    B: Fn(u32) -> Duration + Send + Sync,
{
    fn is_retryable(&self, err: &CommandError, attempt: u32) -> bool {
        (self.is_retryable)(err, attempt)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        (self.backoff)(attempt)
    }
}

/// Factory producing process commands wrapped in a `RetryableCommand`
pub fn new_command_with_retries(handler: Arc<dyn RetryHandler>) -> NewCommandFn {
    Arc::new(move |binary: &str, args: &[&str]| {
        Box::new(RetryableCommand::new(new_command(binary, args), handler.clone()))
            as Box<dyn Command>
    })
}

/// Wraps a command and reruns it while the handler allows
pub struct RetryableCommand {
    cmd: Box<dyn Command>,
    handler: Arc<dyn RetryHandler>,
}

impl RetryableCommand {
    pub fn new(cmd: Box<dyn Command>, handler: Arc<dyn RetryHandler>) -> Self {
        Self { cmd, handler }
    }
}

#[async_trait]
impl Command for RetryableCommand {
    fn append_env(&mut self, envs: Vec<String>) -> &mut dyn Command {
        self.cmd.append_env(envs);
        self
    }

    fn with_stdin(&mut self, content: &str) -> &mut dyn Command {
        self.cmd.with_stdin(content);
        self
    }

    fn with_output(&mut self, out: Box<dyn Write + Send>) -> &mut dyn Command {
        self.cmd.with_output(out);
        self
    }

    async fn run_with_cancel(&mut self, cancel: &CancellationToken) -> Result<Vec<u8>> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let err = match self.cmd.run_with_cancel(cancel).await {
                Ok(out) => return Ok(out),
                Err(err) => err,
            };

            if err.is_cancelled() || !self.handler.is_retryable(&err, attempt) {
                return Err(err);
            }

            let delay = self.handler.backoff(attempt);
            warn!(
                attempt = attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying command after error"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(err.into_cancelled()),
            }
        }
    }
}
