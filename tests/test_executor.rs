// Integration tests for the process invoker
// This file should be run with cargo test --test test_executor

use cliexec::executor::{
    Command, CommandError, EnvMode, ExecutorConfig, ProcessCommand, new_command,
};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    });
}

fn sh(script: &str) -> Box<dyn Command> {
    new_command("sh", &["-c", script])
}

/// Write sink that can be inspected after the command consumed it
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test basic echo execution
    #[tokio::test]
    async fn test_echo_hello() {
        init_tracing();

        let out = assert_ok!(new_command("echo", &["hello"]).run().await);
        assert_eq!(out, b"hello\n");
    }

    /// Stderr never leaks into the success output
    #[tokio::test]
    async fn test_stdout_excludes_stderr() {
        init_tracing();

        let out = assert_ok!(sh("echo out; echo noise >&2; echo more").run().await);
        assert_eq!(out, b"out\nmore\n");
    }

    /// Non-zero exit carries command line, combined output and partial stdout
    #[tokio::test]
    async fn test_error_exit() {
        init_tracing();

        let err = assert_err!(sh("echo partial; echo boom >&2; exit 3").run().await);

        assert!(matches!(err, CommandError::Exit { .. }));
        assert_eq!(err.exit_code(), Some(3));
        assert_eq!(err.command(), "sh -c echo partial; echo boom >&2; exit 3");
        assert_eq!(err.stdout(), b"partial\n");
        assert!(err.output().contains("partial"));
        assert!(err.output().contains("boom"));

        let text = err.to_string();
        assert!(text.starts_with("error running 'sh -c echo partial;"), "{}", text);
        assert!(text.contains("boom"), "{}", text);
    }

    /// A process killed by a signal is reported like a non-zero exit
    #[tokio::test]
    async fn test_killed_by_signal() {
        init_tracing();

        let err = assert_err!(sh("echo dying >&2; kill -9 $$").run().await);
        assert!(matches!(err, CommandError::Exit { .. }));
        assert_eq!(err.exit_code(), None);
        assert!(err.output().contains("dying"));
    }

    /// Missing binary surfaces as a launch failure with the same shape
    #[tokio::test]
    async fn test_missing_binary() {
        init_tracing();

        let err = assert_err!(
            new_command("cliexec-definitely-not-installed", &["--flag"])
                .run()
                .await
        );

        assert!(err.is_launch_failure());
        assert_eq!(err.exit_code(), None);
        assert!(err.stdout().is_empty());
        assert!(
            err.to_string()
                .contains("error running 'cliexec-definitely-not-installed --flag'")
        );
    }

    /// Stdin payload reaches the child and is closed afterwards
    #[tokio::test]
    async fn test_stdin_payload() {
        init_tracing();

        let mut cmd = new_command("cat", &[]);
        cmd.with_stdin("secret payload\nsecond line");
        let out = assert_ok!(cmd.run().await);
        assert_eq!(out, b"secret payload\nsecond line");
    }

    /// Without a payload the child reads EOF immediately
    #[tokio::test]
    async fn test_no_stdin_is_empty() {
        init_tracing();

        let out = assert_ok!(new_command("cat", &[]).run().await);
        assert!(out.is_empty());
    }

    /// A later with_stdin replaces the earlier payload
    #[tokio::test]
    async fn test_stdin_replaced() {
        init_tracing();

        let mut cmd = new_command("cat", &[]);
        cmd.with_stdin("first").with_stdin("second");
        assert_eq!(assert_ok!(cmd.run().await), b"second");
    }

    /// A child that ignores its stdin is not an error
    #[tokio::test]
    async fn test_unread_stdin() {
        init_tracing();

        let mut cmd = sh("exit 0");
        cmd.with_stdin(&"x".repeat(1 << 20));
        assert_ok!(cmd.run().await);
    }

    /// Each run sends the full stdin payload again
    #[tokio::test]
    async fn test_rerun_resends_stdin() {
        init_tracing();

        let mut cmd = new_command("cat", &[]);
        cmd.with_stdin("again");
        assert_eq!(assert_ok!(cmd.run().await), b"again");
        assert_eq!(assert_ok!(cmd.run().await), b"again");
    }

    /// Inherit mode overlays entries on the ambient environment
    #[tokio::test]
    async fn test_env_inherit() {
        init_tracing();

        let mut cmd = new_command("env", &[]);
        cmd.append_env(vec!["CLIEXEC_TEST_VAR=hello".to_string()]);
        let out = String::from_utf8(assert_ok!(cmd.run().await)).unwrap();

        assert!(out.lines().any(|l| l == "CLIEXEC_TEST_VAR=hello"), "{}", out);
        assert!(out.lines().any(|l| l.starts_with("PATH=")), "{}", out);
    }

    /// Replace mode hands the child only the appended entries
    #[tokio::test]
    async fn test_env_replace() {
        init_tracing();

        let mut cmd =
            ProcessCommand::new("/usr/bin/env", &[]).with_env_mode(EnvMode::Replace);
        cmd.append_env(vec!["CLIEXEC_TEST_VAR=hello".to_string()]);
        let out = assert_ok!(cmd.run().await);
        assert_eq!(out, b"CLIEXEC_TEST_VAR=hello\n");
    }

    /// Entries accumulate in order without deduplication
    #[tokio::test]
    async fn test_append_env_accumulates() {
        init_tracing();

        let mut cmd = ProcessCommand::new("true", &[]);
        cmd.append_env(vec!["A=1".to_string(), "B=2".to_string()])
            .append_env(vec!["A=3".to_string()]);

        assert_eq!(cmd.invocation().env, vec!["A=1", "B=2", "A=3"]);
        assert_eq!(cmd.invocation().command_line(), "true");
        assert_ok!(cmd.run().await);
    }

    /// The configured factory applies the env mode too
    #[tokio::test]
    async fn test_factory_env_mode() {
        init_tracing();

        let config = ExecutorConfig {
            env_mode: EnvMode::Replace,
            ..Default::default()
        };
        let new_command = config.command_factory();
        let mut cmd = new_command("/usr/bin/env", &[]);
        cmd.append_env(vec!["ONLY=1".to_string()]);
        assert_eq!(assert_ok!(cmd.run().await), b"ONLY=1\n");
    }

    /// Appending never drops earlier entries; the last duplicate wins
    #[tokio::test]
    async fn test_env_last_entry_wins() {
        init_tracing();

        let mut cmd = sh("printf '%s|%s' \"$CLIEXEC_A\" \"$CLIEXEC_DUP\"");
        cmd.append_env(vec!["CLIEXEC_A=a".to_string(), "CLIEXEC_DUP=first".to_string()])
            .append_env(vec!["CLIEXEC_DUP=second".to_string()]);
        assert_eq!(assert_ok!(cmd.run().await), b"a|second");
    }

    /// Configuration order does not change what the child sees
    #[tokio::test]
    async fn test_configuration_order() {
        init_tracing();

        let script = "printf '%s:' \"$CLIEXEC_ORDER\"; cat";
        let env = vec!["CLIEXEC_ORDER=set".to_string()];

        let mut env_first = sh(script);
        env_first.append_env(env.clone()).with_stdin("input");

        let mut stdin_first = sh(script);
        stdin_first.with_stdin("input").append_env(env);

        let a = assert_ok!(env_first.run().await);
        let b = assert_ok!(stdin_first.run().await);
        assert_eq!(a, b"set:input");
        assert_eq!(a, b);
    }

    /// Large outputs on both streams are drained without deadlock
    #[tokio::test]
    async fn test_large_output() {
        init_tracing();

        let out = assert_ok!(
            sh("head -c 300000 /dev/zero >&2; head -c 500000 /dev/zero; head -c 10 /dev/zero >&2")
                .run()
                .await
        );
        assert_eq!(out.len(), 500000);
        assert!(out.iter().all(|b| *b == 0));
    }

    /// Stdout is copied to the output sink as well as returned
    #[tokio::test]
    async fn test_output_sink() {
        init_tracing();

        let sink = SharedBuf::default();
        let mut cmd = sh("echo to-sink; echo not-sink >&2");
        cmd.with_output(Box::new(sink.clone()));

        let out = assert_ok!(cmd.run().await);
        assert_eq!(out, b"to-sink\n");
        assert_eq!(*sink.0.lock().unwrap(), b"to-sink\n");
    }

    /// A buffered file sink receives all of stdout once the run completes
    #[tokio::test]
    async fn test_buffered_file_sink() {
        init_tracing();

        let path = std::env::temp_dir().join(format!("cliexec-sink-{}", std::process::id()));
        let file = std::fs::File::create(&path).unwrap();

        let mut cmd = sh("head -c 200000 /dev/zero; echo done");
        cmd.with_output(Box::new(io::BufWriter::new(file)));
        let out = assert_ok!(cmd.run().await);

        let written = std::fs::read(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(written.len(), 200005);
        assert_eq!(written, out);
    }

    /// Cancelling kills a running child promptly
    #[tokio::test]
    async fn test_cancel_running_command() {
        init_tracing();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let mut cmd = sh("echo started; sleep 30");
        let err = assert_err!(cmd.run_with_cancel(&cancel).await);

        assert!(err.is_cancelled());
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    /// An already cancelled token prevents the launch entirely
    #[tokio::test]
    async fn test_cancel_before_launch() {
        init_tracing();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = assert_err!(
            new_command("cliexec-definitely-not-installed", &[])
                .run_with_cancel(&cancel)
                .await
        );
        assert!(err.is_cancelled());
        assert!(!err.is_launch_failure());
    }
}
