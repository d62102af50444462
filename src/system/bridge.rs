// src/system/bridge.rs

//! # Dual-Context Execution Bridge
//!
//! Executes a [`CompiledScript`] against the automation target. Primary
//! (JXA) scripts go to the transport as-is; secondary (Omni Automation)
//! scripts are embedded into the `evaluateJavascript` shim first, so the
//! bridging call is itself just one more transport execution. The compiler
//! already guaranteed the wrapped form fits the primary ceiling.
//!
//! The target serializes incoming script executions, so the bridge holds one
//! session lock and never dispatches two scripts concurrently. Waiters are
//! queued on the lock; cache reads elsewhere in the process are unaffected.

use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::core::{compiler, templates};
use crate::models::{CompiledScript, ErrorKind, ExecutionResult, ScriptContext};
use crate::system::osascript::{RunnerError, ScriptRunner};

lazy_static! {
    // Transport-level failures that mean "the target cannot be reached right
    // now", as opposed to a script that ran and raised. Matched against the
    // stderr of a non-zero exit.
    static ref UNAVAILABLE_RE: Regex = Regex::new(
        r"(?i)(timed out|isn't running|is not running|application is busy|connection is invalid|AppleEvent timed out|-1712|-600|-609)"
    )
    .expect("static regex");
}

#[derive(Error, Debug)]
pub enum BridgeError {
    /// Transport timeout, target not running, or target blocked by a modal
    /// dialog. The operation may not have started; reads may retry.
    #[error("automation target unavailable: {reason}")]
    TargetUnavailable { reason: String },
    /// The target executed the script and reported an error. The raw
    /// message is preserved for the caller.
    #[error("target reported a script error: {message}")]
    OperationFailed { message: String },
}

impl BridgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TargetUnavailable { .. } => ErrorKind::TargetUnavailable,
            Self::OperationFailed { .. } => ErrorKind::OperationFailed,
        }
    }
}

/// Owns the session lock and the transport handle.
#[derive(Debug)]
pub struct ExecutionBridge {
    runner: Arc<dyn ScriptRunner>,
    session: Mutex<()>,
    timeout: Duration,
    app_name_lit: String,
}

impl ExecutionBridge {
    pub fn new(runner: Arc<dyn ScriptRunner>, timeout: Duration, app_name: &str) -> Self {
        Self {
            runner,
            session: Mutex::new(()),
            timeout,
            app_name_lit: compiler::encode_js_string(app_name),
        }
    }

    /// Executes one compiled script and returns its raw result. Empty
    /// stdout is a successful null payload, not a failure.
    pub async fn execute(&self, script: &CompiledScript) -> Result<ExecutionResult, BridgeError> {
        let source = match script.context() {
            ScriptContext::Jxa => script.source().to_string(),
            ScriptContext::OmniJs => {
                let inner_lit = compiler::encode_js_string(script.source());
                templates::omnijs_shim(&self.app_name_lit, &inner_lit)
            }
        };

        let _session = self.session.lock().await;
        log::debug!(
            "Executing {} script via {} context ({} bytes on the wire).",
            script.kind(),
            script.context(),
            source.len()
        );
        let start = Instant::now();
        let stdout = self
            .runner
            .run(&source, self.timeout)
            .await
            .map_err(classify)?;
        let elapsed = start.elapsed();
        log::debug!(
            "Script completed in {} ms ({} bytes out).",
            elapsed.as_millis(),
            stdout.len()
        );

        Ok(ExecutionResult {
            stdout,
            elapsed,
            context: script.context(),
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

fn classify(error: RunnerError) -> BridgeError {
    match error {
        RunnerError::TimedOut(budget) => BridgeError::TargetUnavailable {
            reason: format!("transport timeout after {budget:?}"),
        },
        RunnerError::Spawn(e) => BridgeError::TargetUnavailable {
            reason: format!("transport could not be launched: {e}"),
        },
        RunnerError::NonZeroExit { stderr, .. } if UNAVAILABLE_RE.is_match(&stderr) => {
            BridgeError::TargetUnavailable { reason: stderr }
        }
        RunnerError::NonZeroExit { stderr, .. } => {
            BridgeError::OperationFailed { message: stderr }
        }
        RunnerError::InvalidUtf8Output(e) => BridgeError::OperationFailed {
            message: format!("output was not valid UTF-8: {e}"),
        },
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! A scripted fake runner shared by bridge and pipeline tests.

    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    /// Canned transport behaviors, consumed in order. The last behavior
    /// repeats once the queue drains.
    #[derive(Debug, Clone)]
    pub enum Script {
        Succeed(&'static str),
        FailExit(&'static str),
        TimeOut,
    }

    #[derive(Debug, Default)]
    pub struct MockRunner {
        behaviors: StdMutex<VecDeque<Script>>,
        pub submitted: StdMutex<Vec<String>>,
    }

    impl MockRunner {
        pub fn with_behaviors(behaviors: Vec<Script>) -> Self {
            Self {
                behaviors: StdMutex::new(behaviors.into()),
                submitted: StdMutex::new(Vec::new()),
            }
        }

        pub fn submitted_sources(&self) -> Vec<String> {
            self.submitted.lock().expect("mock lock").clone()
        }
    }

    #[async_trait]
    impl ScriptRunner for MockRunner {
        async fn run(&self, source: &str, timeout: Duration) -> Result<String, RunnerError> {
            self.submitted
                .lock()
                .expect("mock lock")
                .push(source.to_string());
            let behavior = {
                let mut q = self.behaviors.lock().expect("mock lock");
                if q.len() > 1 {
                    q.pop_front()
                } else {
                    q.front().cloned()
                }
            };
            match behavior {
                Some(Script::Succeed(stdout)) => Ok(stdout.to_string()),
                Some(Script::FailExit(stderr)) => Err(RunnerError::NonZeroExit {
                    status: 1,
                    stderr: stderr.to_string(),
                }),
                Some(Script::TimeOut) => Err(RunnerError::TimedOut(timeout)),
                None => Ok(String::new()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{MockRunner, Script};
    use super::*;
    use crate::models::OperationKind;

    fn jxa_script(source: &str) -> CompiledScript {
        CompiledScript::new(source.to_string(), ScriptContext::Jxa, OperationKind::List)
            .expect("small script")
    }

    fn omnijs_script(source: &str) -> CompiledScript {
        CompiledScript::new(source.to_string(), ScriptContext::OmniJs, OperationKind::Update)
            .expect("small script")
    }

    fn bridge_with(runner: Arc<MockRunner>) -> ExecutionBridge {
        ExecutionBridge::new(runner, Duration::from_secs(5), "OmniFocus")
    }

    #[tokio::test]
    async fn test_jxa_script_goes_to_transport_verbatim() {
        let runner = Arc::new(MockRunner::with_behaviors(vec![Script::Succeed("[]")]));
        let bridge = bridge_with(runner.clone());

        let result = bridge.execute(&jxa_script("1 + 1")).await.unwrap();
        assert_eq!(result.stdout, "[]");
        assert_eq!(result.context, ScriptContext::Jxa);
        assert_eq!(runner.submitted_sources(), vec!["1 + 1".to_string()]);
    }

    #[tokio::test]
    async fn test_omnijs_script_is_wrapped_in_shim() {
        let runner = Arc::new(MockRunner::with_behaviors(vec![Script::Succeed("{}")]));
        let bridge = bridge_with(runner.clone());

        let result = bridge.execute(&omnijs_script("Task.byIdentifier(\"x\")")).await.unwrap();
        assert_eq!(result.context, ScriptContext::OmniJs);

        let submitted = runner.submitted_sources();
        assert_eq!(submitted.len(), 1);
        let on_wire = &submitted[0];
        assert!(on_wire.contains("evaluateJavascript"));
        // The inner source travels as an encoded literal, not verbatim.
        assert!(!on_wire.contains("Task.byIdentifier(\"x\")"));
        assert!(on_wire.contains("Task.byIdentifier(\\\"x\\\")"));
    }

    #[tokio::test]
    async fn test_timeout_classifies_as_target_unavailable() {
        let runner = Arc::new(MockRunner::with_behaviors(vec![Script::TimeOut]));
        let bridge = bridge_with(runner);

        let err = bridge.execute(&jxa_script("slow()")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TargetUnavailable);
    }

    #[tokio::test]
    async fn test_app_not_running_classifies_as_target_unavailable() {
        let runner = Arc::new(MockRunner::with_behaviors(vec![Script::FailExit(
            "execution error: OmniFocus isn't running. (-600)",
        )]));
        let bridge = bridge_with(runner);

        let err = bridge.execute(&jxa_script("x")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TargetUnavailable);
    }

    #[tokio::test]
    async fn test_script_error_classifies_as_operation_failed_with_message() {
        let runner = Arc::new(MockRunner::with_behaviors(vec![Script::FailExit(
            "execution error: Error: task not found: t9 (-2700)",
        )]));
        let bridge = bridge_with(runner);

        let err = bridge.execute(&jxa_script("x")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OperationFailed);
        // The target's own message reaches the caller untouched.
        assert!(err.to_string().contains("task not found: t9"));
    }

    #[tokio::test]
    async fn test_empty_stdout_is_success() {
        let runner = Arc::new(MockRunner::with_behaviors(vec![Script::Succeed("")]));
        let bridge = bridge_with(runner);

        let result = bridge.execute(&jxa_script("x")).await.unwrap();
        assert!(result.stdout.is_empty());
    }
}
