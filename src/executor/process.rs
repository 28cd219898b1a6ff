// Process invoker implementation

use crate::executor::command::Command;
use crate::executor::types::{EnvMode, Invocation};
use crate::executor::{CommandError, Result};
use async_trait::async_trait;
use std::io::{self, Write};
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStderr, ChildStdin, ChildStdout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

const READ_CHUNK: usize = 8192;

/// Runs exactly one external process per call to `run`
pub struct ProcessCommand {
    invocation: Invocation,
    output: Option<Box<dyn Write + Send>>,
}

impl ProcessCommand {
    pub fn new(binary: &str, args: &[&str]) -> Self {
        Self {
            invocation: Invocation::new(binary, args.iter().map(|a| a.to_string()).collect()),
            output: None,
        }
    }

    pub fn with_env_mode(mut self, mode: EnvMode) -> Self {
        self.invocation.env_mode = mode;
        self
    }

    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    fn build(&self) -> tokio::process::Command {
        let inv = &self.invocation;
        let mut cmd = tokio::process::Command::new(inv.binary());
        cmd.args(inv.args());

        if inv.env_mode == EnvMode::Replace {
            cmd.env_clear();
        }
        for (key, value) in inv.env_pairs() {
            cmd.env(key, value);
        }

        cmd.stdin(if inv.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

        cmd
    }
}

#[async_trait]
impl Command for ProcessCommand {
    fn append_env(&mut self, envs: Vec<String>) -> &mut dyn Command {
        self.invocation.env.extend(envs);
        self
    }

    fn with_stdin(&mut self, content: &str) -> &mut dyn Command {
        self.invocation.stdin = Some(content.as_bytes().to_vec());
        self
    }

    fn with_output(&mut self, out: Box<dyn Write + Send>) -> &mut dyn Command {
        self.output = Some(out);
        self
    }

    async fn run_with_cancel(&mut self, cancel: &CancellationToken) -> Result<Vec<u8>> {
        let command = self.invocation.command_line();
        let args = self.invocation.args();

        if cancel.is_cancelled() {
            return Err(CommandError::Cancelled {
                command,
                stdout: Vec::new(),
            });
        }

        debug!(binary = %self.invocation.binary(), args = ?args, "running command");
        let start = Instant::now();

        let mut child = match self.build().spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(args = ?args, error = %e, "command finished with error");
                return Err(CommandError::Launch {
                    command,
                    source: e,
                    output: String::new(),
                    stdout: Vec::new(),
                });
            }
        };

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let payload = self.invocation.stdin.as_deref();
        let sink = self.output.as_mut();

        let mut out = Vec::new();
        let mut combined = Vec::new();

        let outcome = {
            let work = async {
                let (fed, captured) = tokio::join!(
                    feed_stdin(stdin, payload),
                    capture(stdout, stderr, &mut out, &mut combined, sink)
                );
                captured?;
                fed?;
                child.wait().await
            };

            tokio::select! {
                status = work => Some(status),
                _ = cancel.cancelled() => None,
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let output = String::from_utf8_lossy(&combined).into_owned();

        match outcome {
            None => {
                if let Err(e) = child.kill().await {
                    debug!(error = %e, "failed to kill cancelled command");
                }
                error!(args = ?args, duration_ms = duration_ms, "command cancelled");
                Err(CommandError::Cancelled {
                    command,
                    stdout: out,
                })
            }
            Some(Err(e)) => {
                // Reap the child so it does not linger as a zombie
                let _ = child.kill().await;
                error!(args = ?args, error = %e, "command finished with error");
                Err(CommandError::Io {
                    command,
                    source: e,
                    output,
                    stdout: out,
                })
            }
            Some(Ok(status)) if status.success() => {
                debug!(
                    args = ?args,
                    duration_ms = duration_ms,
                    stdout_bytes = out.len(),
                    "command finished with success"
                );
                Ok(out)
            }
            Some(Ok(status)) => {
                error!(
                    args = ?args,
                    duration_ms = duration_ms,
                    exit_code = status.code().unwrap_or(-1),
                    error = %status,
                    "command finished with error"
                );
                Err(CommandError::Exit {
                    command,
                    status,
                    output,
                    stdout: out,
                })
            }
        }
    }
}

/// Write the payload and close the pipe so the child sees EOF
async fn feed_stdin(stdin: Option<ChildStdin>, payload: Option<&[u8]>) -> io::Result<()> {
    let (Some(mut stdin), Some(payload)) = (stdin, payload) else {
        return Ok(());
    };

    match stdin.write_all(payload).await {
        Ok(()) => {}
        // The child may exit without reading its input
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => return Ok(()),
        Err(e) => return Err(e),
    }
    match stdin.shutdown().await {
        Err(e) if e.kind() != io::ErrorKind::BrokenPipe => Err(e),
        _ => Ok(()),
    }
}

/// Drain both pipes until EOF
///
/// `out` receives stdout only; `combined` receives both streams in the order
/// chunks arrive.
async fn capture(
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    out: &mut Vec<u8>,
    combined: &mut Vec<u8>,
    mut sink: Option<&mut Box<dyn Write + Send>>,
) -> io::Result<()> {
    let mut stdout_open = stdout.is_some();
    let mut stderr_open = stderr.is_some();
    let (mut stdout, mut stderr) = (stdout, stderr);
    let mut out_buf = [0u8; READ_CHUNK];
    let mut err_buf = [0u8; READ_CHUNK];

    while stdout_open || stderr_open {
        tokio::select! {
            n = read_some(&mut stdout, &mut out_buf), if stdout_open => {
                let n = n?;
                if n == 0 {
                    stdout_open = false;
                    continue;
                }
                let chunk = &out_buf[..n];
                out.extend_from_slice(chunk);
                combined.extend_from_slice(chunk);
                if let Some(sink) = sink.as_mut() {
                    sink.write_all(chunk)?;
                }
            }
            n = read_some(&mut stderr, &mut err_buf), if stderr_open => {
                let n = n?;
                if n == 0 {
                    stderr_open = false;
                    continue;
                }
                combined.extend_from_slice(&err_buf[..n]);
            }
        }
    }

    if let Some(sink) = sink {
        sink.flush()?;
    }
    Ok(())
}

async fn read_some<R>(reader: &mut Option<R>, buf: &mut [u8]) -> io::Result<usize>
where
    R: tokio::io::AsyncRead + Unpin,
{
    match reader {
        Some(r) => r.read(buf).await,
        None => Ok(0),
    }
}
