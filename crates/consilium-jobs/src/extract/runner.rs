//! Command runner backed by real processes.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use consilium_core::{CommandRunner, ToolOutput};

/// Exit code used when the binary could not be spawned.
const CODE_SPAWN_FAILED: i32 = 127;
/// Exit code used when the process could not be awaited.
const CODE_WAIT_FAILED: i32 = 126;
/// Exit code used when the timeout elapsed.
const CODE_TIMED_OUT: i32 = 124;

/// Ceiling for the `--version` availability check. A healthy tool answers
/// in milliseconds; a hung one must not stall the pipeline.
const AVAILABILITY_TIMEOUT: Duration = Duration::from_secs(2);

/// [`CommandRunner`] that spawns real external processes via tokio.
///
/// Spawn failures and timeouts never surface as errors; they come back as a
/// `ToolOutput` with a non-zero code and the reason on stderr, so the
/// extraction pipeline can fall through to its next strategy.
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }

    fn failure(code: i32, reason: String) -> ToolOutput {
        ToolOutput {
            code,
            stdout: Vec::new(),
            stderr: reason.into_bytes(),
        }
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        stdin: Option<&[u8]>,
        timeout: Duration,
    ) -> ToolOutput {
        debug!(
            subsystem = "jobs",
            component = "runner",
            tool = program,
            arg_count = args.len(),
            timeout_secs = timeout.as_secs(),
            "Running external tool"
        );

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // A dropped future (timeout) must not leak the process.
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return Self::failure(CODE_SPAWN_FAILED, format!("failed to spawn {program}: {e}"))
            }
        };

        if let Some(input) = stdin {
            if let Some(mut handle) = child.stdin.take() {
                // A write error here shows up as a tool failure downstream.
                let _ = handle.write_all(input).await;
            }
        }

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => ToolOutput {
                code: output.status.code().unwrap_or(-1),
                stdout: output.stdout,
                stderr: output.stderr,
            },
            Ok(Err(e)) => Self::failure(CODE_WAIT_FAILED, format!("failed to wait on {program}: {e}")),
            Err(_) => Self::failure(
                CODE_TIMED_OUT,
                format!("{program} timed out after {}s", timeout.as_secs()),
            ),
        }
    }

    async fn available(&self, program: &str) -> bool {
        // Spawning with --version is enough to prove the binary exists; the
        // exit code does not matter (pdftoppm -v exits 99 on some versions).
        let mut cmd = Command::new(program);
        cmd.arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        matches!(
            tokio::time::timeout(AVAILABILITY_TIMEOUT, cmd.output()).await,
            Ok(Ok(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_failure_folds_into_output() {
        let runner = SystemRunner::new();
        let out = runner
            .run(
                "definitely-not-a-real-binary-7f3a",
                &[],
                None,
                Duration::from_secs(5),
            )
            .await;
        assert_eq!(out.code, CODE_SPAWN_FAILED);
        assert!(out.stderr_utf8().contains("failed to spawn"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let runner = SystemRunner::new();
        assert!(!runner.available("definitely-not-a-real-binary-7f3a").await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_availability_check_is_time_bounded() {
        use std::os::unix::fs::PermissionsExt;

        // A script that hangs on --version; only the timeout can bring
        // the call back.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hanging-tool");
        std::fs::write(&path, "#!/bin/sh\nsleep 30\n").unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();

        let runner = SystemRunner::new();
        let start = std::time::Instant::now();
        assert!(!runner.available(path.to_str().unwrap()).await);
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_run_captures_stdout() {
        let runner = SystemRunner::new();
        let out = runner
            .run(
                "sh",
                &["-c".to_string(), "printf hello".to_string()],
                None,
                Duration::from_secs(5),
            )
            .await;
        assert_eq!(out.code, 0);
        assert_eq!(out.stdout_utf8(), "hello");
    }

    #[tokio::test]
    async fn test_run_feeds_stdin() {
        let runner = SystemRunner::new();
        let out = runner
            .run(
                "cat",
                &[],
                Some(b"piped input"),
                Duration::from_secs(5),
            )
            .await;
        assert_eq!(out.code, 0);
        assert_eq!(out.stdout_utf8(), "piped input");
    }

    #[tokio::test]
    async fn test_timeout_folds_into_output() {
        let runner = SystemRunner::new();
        let out = runner
            .run(
                "sleep",
                &["5".to_string()],
                None,
                Duration::from_millis(50),
            )
            .await;
        assert_eq!(out.code, CODE_TIMED_OUT);
        assert!(out.stderr_utf8().contains("timed out"));
    }
}
