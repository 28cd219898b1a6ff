// Command trait and constructors

use crate::executor::Result;
use crate::executor::process::ProcessCommand;
use async_trait::async_trait;
use std::io::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// One configurable external call
///
/// Implemented by the bare process invoker and by the retry decorator, so
/// callers holding a `Box<dyn Command>` do not know whether retries are on.
/// Configuration must be done before `run`.
#[async_trait]
pub trait Command: Send {
    /// Append `KEY=VALUE` entries to the child environment
    fn append_env(&mut self, envs: Vec<String>) -> &mut dyn Command;

    /// Set the stdin payload, replacing any previous one
    fn with_stdin(&mut self, content: &str) -> &mut dyn Command;

    /// Copy stdout to `out` as it is produced, in addition to capturing it
    ///
    /// Writes happen synchronously on the runtime thread draining the pipe, so
    /// the sink should be cheap or buffered (e.g. a `BufWriter` around a file).
    fn with_output(&mut self, out: Box<dyn Write + Send>) -> &mut dyn Command;

    /// Run to completion unless `cancel` fires first
    async fn run_with_cancel(&mut self, cancel: &CancellationToken) -> Result<Vec<u8>>;

    /// Run to completion, returning captured stdout
    async fn run(&mut self) -> Result<Vec<u8>> {
        self.run_with_cancel(&CancellationToken::new()).await
    }
}

/// Constructor for commands given a binary and its arguments
pub type NewCommandFn = Arc<dyn Fn(&str, &[&str]) -> Box<dyn Command> + Send + Sync>;

/// Build a bare process command with the default environment mode
pub fn new_command(binary: &str, args: &[&str]) -> Box<dyn Command> {
    Box::new(ProcessCommand::new(binary, args))
}
