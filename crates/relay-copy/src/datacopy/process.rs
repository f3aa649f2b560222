//! External process execution with streamed capture and a hard timeout.

use std::fmt;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::core::schema::ExternalProcessResult;
use crate::error::Result;

/// Replacement text for credentials in logs and error output.
pub const MASK: &str = "********";

/// How long output readers may keep draining after the process exits.
/// Grandchildren can hold the pipes open past the parent's exit.
const DEFAULT_DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Replace every occurrence of each secret in `text` with [`MASK`].
pub fn mask(text: &str, secrets: &[String]) -> String {
    secrets
        .iter()
        .filter(|s| !s.is_empty())
        .fold(text.to_string(), |acc, secret| acc.replace(secret.as_str(), MASK))
}

/// A program and its arguments, with the arguments that must never be logged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessInvocation {
    pub program: String,
    pub args: Vec<String>,
    secrets: Vec<String>,
}

impl ProcessInvocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add an argument that is masked wherever the invocation is displayed.
    pub fn secret_arg(mut self, arg: impl Into<String>) -> Self {
        let arg = arg.into();
        if !arg.is_empty() {
            self.secrets.push(arg.clone());
        }
        self.args.push(arg);
        self
    }

    /// Mask this invocation's secrets in arbitrary text, e.g. captured output.
    pub fn mask(&self, text: &str) -> String {
        mask(text, &self.secrets)
    }
}

/// Displays the command line with secrets masked.
impl fmt::Display for ProcessInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            let shown = self.mask(arg);
            if shown.is_empty() || shown.contains(char::is_whitespace) {
                write!(f, " \"{}\"", shown.escape_debug())?;
            } else {
                write!(f, " {}", shown)?;
            }
        }
        Ok(())
    }
}

/// Runs external programs. Faked in tests.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run to completion or until `timeout` elapses, capturing all output.
    ///
    /// A timeout is reported through `ExternalProcessResult::timed_out`,
    /// not as an error; errors mean the process could not be started.
    async fn run(&self, invocation: &ProcessInvocation, timeout: Duration) -> Result<ExternalProcessResult>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

/// [`ProcessRunner`] backed by `tokio::process`.
#[derive(Debug, Clone)]
pub struct TokioProcessRunner {
    drain_grace: Duration,
}

impl Default for TokioProcessRunner {
    fn default() -> Self {
        Self {
            drain_grace: DEFAULT_DRAIN_GRACE,
        }
    }
}

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, invocation: &ProcessInvocation, timeout: Duration) -> Result<ExternalProcessResult> {
        debug!("Spawning: {}", invocation);

        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let (tx, mut rx) = mpsc::unbounded_channel::<(Stream, String)>();
        let mut readers: Vec<JoinHandle<()>> = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(read_lines(stdout, Stream::Stdout, tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(read_lines(stderr, Stream::Stderr, tx.clone())));
        }
        drop(tx);

        let collector = tokio::spawn(async move {
            let mut captured = ExternalProcessResult::default();
            while let Some((stream, line)) = rx.recv().await {
                match stream {
                    Stream::Stdout => captured.stdout.push_str(&line),
                    Stream::Stderr => captured.stderr.push_str(&line),
                }
                captured.combined.push_str(&line);
            }
            captured
        });

        let (exit_code, timed_out) = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => {
                let status = status?;
                let drained = tokio::time::timeout(self.drain_grace, async {
                    for reader in readers.iter_mut() {
                        let _ = reader.await;
                    }
                })
                .await;
                if drained.is_err() {
                    debug!("{}: output still open after exit, abandoning readers", invocation.program);
                }
                for reader in &readers {
                    reader.abort();
                }
                (status.code(), false)
            }
            Err(_) => {
                warn!(
                    "{} exceeded {}s, killing process",
                    invocation.program,
                    timeout.as_secs()
                );
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill {}: {}", invocation.program, e);
                }
                for reader in &readers {
                    reader.abort();
                }
                (None, true)
            }
        };

        let mut result = collector.await.unwrap_or_default();
        result.exit_code = exit_code;
        result.timed_out = timed_out;
        Ok(result)
    }
}

/// Forward lines from one pipe to the collector. Invalid UTF-8 is replaced
/// rather than ending the capture.
async fn read_lines<R>(reader: R, stream: Stream, tx: mpsc::UnboundedSender<(Stream, String)>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).into_owned();
                if tx.send((stream, line)).is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!("Output reader stopped: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_replaces_every_secret() {
        let secrets = vec!["hunter2".to_string(), String::new()];
        assert_eq!(
            mask("login hunter2 failed (hunter2)", &secrets),
            "login ******** failed (********)"
        );
        assert_eq!(mask("nothing here", &secrets), "nothing here");
    }

    #[test]
    fn test_display_masks_secret_args() {
        let inv = ProcessInvocation::new("bcp")
            .arg("SELECT a FROM t")
            .args(["-U", "relay"])
            .arg("-P")
            .secret_arg("hunter2");
        let shown = inv.to_string();
        assert_eq!(shown, "bcp \"SELECT a FROM t\" -U relay -P ********");
        assert!(!shown.contains("hunter2"));
        assert_eq!(inv.args.last().map(String::as_str), Some("hunter2"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captures_both_streams_and_exit_code() {
        let inv = ProcessInvocation::new("sh")
            .arg("-c")
            .arg("echo out1; echo err1 >&2; echo out2; exit 3");
        let result = TokioProcessRunner::new()
            .with_drain_grace(Duration::from_secs(1))
            .run(&inv, Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(result.exit_code, Some(3));
        assert!(!result.timed_out);
        assert!(!result.success());
        assert_eq!(result.stdout, "out1\nout2\n");
        assert_eq!(result.stderr, "err1\n");
        assert!(result.combined.contains("out1\n"));
        assert!(result.combined.contains("err1\n"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_beyond_pipe_buffer_does_not_stall() {
        // 3000 lines of 63 bytes is about 185 KiB per stream, well past a pipe
        // buffer. stdout is written in full before stderr starts.
        let line = "0123456789".repeat(6) + "ab";
        let script = format!(
            "yes {l} | head -n 3000; yes {l} | head -n 3000 >&2; exit 0",
            l = line
        );
        let inv = ProcessInvocation::new("sh").arg("-c").arg(script);
        let start = std::time::Instant::now();
        let result = TokioProcessRunner::new()
            .with_drain_grace(Duration::from_secs(5))
            .run(&inv, Duration::from_secs(20))
            .await
            .unwrap();

        assert!(!result.timed_out);
        assert_eq!(result.exit_code, Some(0));
        assert!(start.elapsed() < Duration::from_secs(20));
        assert_eq!(result.stdout.lines().count(), 3000);
        assert_eq!(result.stderr.lines().count(), 3000);
        assert!(result.stdout.len() > 128 * 1024);
        assert!(result.stderr.len() > 128 * 1024);
        assert!(result.stdout.lines().all(|l| l == line));
        assert_eq!(result.combined.len(), result.stdout.len() + result.stderr.len());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_process() {
        let inv = ProcessInvocation::new("sh").arg("-c").arg("echo started; exec sleep 5");
        let start = std::time::Instant::now();
        let result = TokioProcessRunner::new()
            .run(&inv, Duration::from_millis(300))
            .await
            .unwrap();

        assert!(result.timed_out);
        assert_eq!(result.exit_code, None);
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let inv = ProcessInvocation::new("/nonexistent/relay-copy-test-binary");
        assert!(TokioProcessRunner::new()
            .run(&inv, Duration::from_secs(1))
            .await
            .is_err());
    }
}
