// src/system/osascript.rs

//! The downstream transport: one primitive that takes an opaque script
//! string and returns raw output. Everything above this module is testable
//! with a fake runner; everything below it is `osascript`.

use async_trait::async_trait;
use std::fmt;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("failed to launch the automation transport: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("script execution exceeded the {0:?} transport budget")]
    TimedOut(Duration),
    #[error("transport exited with status {status}: {stderr}")]
    NonZeroExit { status: i32, stderr: String },
    #[error("transport produced output that was not valid UTF-8")]
    InvalidUtf8Output(#[source] std::string::FromUtf8Error),
}

/// The single script-execution primitive the bridge depends on.
#[async_trait]
pub trait ScriptRunner: Send + Sync + fmt::Debug {
    /// Runs `source` in the primary scripting context and returns stdout.
    /// Implementations must enforce `timeout` themselves — the caller has no
    /// way to interrupt a script once it has been submitted.
    async fn run(&self, source: &str, timeout: Duration) -> Result<String, RunnerError>;
}

/// Production runner: `osascript -l JavaScript -e <source>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsaRunner;

#[async_trait]
impl ScriptRunner for OsaRunner {
    async fn run(&self, source: &str, timeout: Duration) -> Result<String, RunnerError> {
        let mut command = Command::new("osascript");
        command
            .args(["-l", "JavaScript", "-e", source])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // If the timeout fires the future is dropped; take the still
            // running osascript down with it instead of leaking it.
            .kill_on_drop(true);

        log::trace!("Submitting {}-byte script to osascript.", source.len());
        let output = tokio::time::timeout(timeout, command.output())
            .await
            .map_err(|_| RunnerError::TimedOut(timeout))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(RunnerError::NonZeroExit {
                status: output.status.code().unwrap_or(-1),
                stderr,
            });
        }
        String::from_utf8(output.stdout).map_err(RunnerError::InvalidUtf8Output)
    }
}
