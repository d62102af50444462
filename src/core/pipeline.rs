// src/core/pipeline.rs

//! # Operation Pipeline
//!
//! Orchestrates one request end to end:
//! validate (upstream) → fingerprint → cache check → compile → execute →
//! normalize → cache update / invalidate → envelope.
//!
//! Reads may be served from cache and may retry a `TargetUnavailable`
//! failure once. Mutations skip the cache check, are never retried (the
//! target gives no idempotency guarantee), and always run their
//! invalidation step after execution — even a failed mutation may have been
//! partially applied.

use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::core::cache::CacheManager;
use crate::core::compiler::{self, CompileOptions};
use crate::core::config::CoreConfig;
use crate::core::{fingerprint, normalizer};
use crate::models::{
    CompiledScript, EntityType, EnvelopeError, EnvelopeMetadata, ErrorKind, ExecutionResult,
    InvalidationSignal, MutationAction, OperationRequest, ResultEnvelope, SubOperationResult,
};
use crate::system::bridge::{BridgeError, ExecutionBridge};
use crate::system::osascript::ScriptRunner;

/// The entry point upstream tool handlers call into.
#[derive(Debug)]
pub struct OperationPipeline {
    cache: Arc<CacheManager>,
    bridge: Arc<ExecutionBridge>,
    compile_options: CompileOptions,
    retry_backoff: Duration,
}

impl OperationPipeline {
    pub fn new(
        cache: Arc<CacheManager>,
        bridge: Arc<ExecutionBridge>,
        compile_options: CompileOptions,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            cache,
            bridge,
            compile_options,
            retry_backoff,
        }
    }

    /// Wires the whole core up from resolved configuration plus a transport.
    pub fn from_config(config: &CoreConfig, runner: Arc<dyn ScriptRunner>) -> Self {
        let cache = Arc::new(CacheManager::new(config.ttl_table(), config.cache_enabled));
        let bridge = Arc::new(ExecutionBridge::new(
            runner,
            config.exec_timeout,
            &config.target_app,
        ));
        Self::new(
            cache,
            bridge,
            CompileOptions {
                app_name: config.target_app.clone(),
                filter_strategy: config.filter_strategy,
            },
            config.retry_backoff,
        )
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// Runs one operation to completion. Every outcome — including every
    /// failure class — comes back as the canonical envelope.
    pub async fn dispatch(&self, request: OperationRequest) -> ResultEnvelope {
        let request_id = Uuid::new_v4();
        let entity = request.entity();
        let start = Instant::now();
        log::debug!(
            "[{request_id}] Received {} operation for entity '{entity}'.",
            if request.is_mutation() { "mutation" } else { "read" }
        );

        let envelope = match &request {
            OperationRequest::Query { .. } | OperationRequest::Analysis { .. } => {
                self.run_read(&request, entity, start).await
            }
            OperationRequest::Mutation { entity, action } => {
                self.run_mutation(*entity, action, start).await
            }
            OperationRequest::Batch { entity, actions } => {
                self.run_batch(*entity, actions, start).await
            }
        };

        log::debug!(
            "[{request_id}] Done: success={} fromCache={} elapsedMs={}.",
            envelope.success,
            envelope.metadata.from_cache,
            envelope.metadata.elapsed_ms
        );
        envelope
    }

    async fn run_read(
        &self,
        request: &OperationRequest,
        entity: EntityType,
        start: Instant,
    ) -> ResultEnvelope {
        let params = serde_json::to_value(request).unwrap_or(Value::Null);
        let fp = fingerprint::fingerprint(entity, &params);

        if let Some(payload) = self.cache.get(entity, &fp) {
            return ResultEnvelope::ok(payload, self.metadata(true, entity, start));
        }

        let script = match compiler::compile(request, &self.compile_options) {
            Ok(script) => script,
            Err(e) => {
                return ResultEnvelope::fail(
                    ErrorKind::CompileError,
                    e.to_string(),
                    self.metadata(false, entity, start),
                );
            }
        };

        match self.execute_with_retry(&script).await {
            Ok(result) => {
                let payload = normalizer::normalize_output(&result.stdout);
                self.cache.set(entity, fp, payload.clone());
                ResultEnvelope::ok(payload, self.metadata(false, entity, start))
            }
            Err(e) => ResultEnvelope::fail(
                e.kind(),
                e.to_string(),
                self.metadata(false, entity, start),
            ),
        }
    }

    async fn run_mutation(
        &self,
        entity: EntityType,
        action: &MutationAction,
        start: Instant,
    ) -> ResultEnvelope {
        let request = OperationRequest::Mutation {
            entity,
            action: action.clone(),
        };
        let script = match compiler::compile(&request, &self.compile_options) {
            // A compile failure never reached the target: nothing to
            // invalidate, nothing partially applied.
            Err(e) => {
                return ResultEnvelope::fail(
                    ErrorKind::CompileError,
                    e.to_string(),
                    self.metadata(false, entity, start),
                );
            }
            Ok(script) => script,
        };

        let outcome = self.bridge.execute(&script).await;

        // The script reached the target, so cached state is suspect no
        // matter how execution ended.
        let affected = action.target_id().map(str::to_string).into_iter().collect();
        self.invalidate(entity, affected);

        match outcome {
            Ok(result) => {
                let payload = normalizer::normalize_output(&result.stdout);
                ResultEnvelope::ok(payload, self.metadata(false, entity, start))
            }
            Err(e) => ResultEnvelope::fail(
                e.kind(),
                e.to_string(),
                self.metadata(false, entity, start),
            ),
        }
    }

    async fn run_batch(
        &self,
        entity: EntityType,
        actions: &[MutationAction],
        start: Instant,
    ) -> ResultEnvelope {
        let scripts = match compiler::compile_batch(entity, actions, &self.compile_options) {
            Err(e) => {
                return ResultEnvelope::fail(
                    ErrorKind::CompileError,
                    e.to_string(),
                    self.metadata(false, entity, start),
                );
            }
            Ok(scripts) => scripts,
        };

        let mut sub_results = Vec::with_capacity(scripts.len());
        let mut succeeded = 0usize;
        for (index, script) in scripts.iter().enumerate() {
            match self.bridge.execute(script).await {
                Ok(result) => {
                    succeeded += 1;
                    sub_results.push(SubOperationResult {
                        index,
                        success: true,
                        data: Some(normalizer::normalize_output(&result.stdout)),
                        error: None,
                    });
                }
                Err(e) => {
                    log::warn!("Batch sub-operation {index} failed: {e}");
                    sub_results.push(SubOperationResult {
                        index,
                        success: false,
                        data: None,
                        error: Some(EnvelopeError {
                            kind: e.kind(),
                            message: e.to_string(),
                        }),
                    });
                }
            }
        }

        let affected = actions
            .iter()
            .filter_map(|a| a.target_id().map(str::to_string))
            .collect();
        self.invalidate(entity, affected);

        let failed = sub_results.len() - succeeded;
        let data = serde_json::to_value(&sub_results).unwrap_or(Value::Null);
        let metadata = self.metadata(false, entity, start);
        if failed == 0 {
            return ResultEnvelope::ok(data, metadata);
        }
        // Successful sub-operations keep their effects and their results;
        // the envelope as a whole still reports the failure.
        let kind = if succeeded > 0 {
            ErrorKind::PartialBatchFailure
        } else {
            ErrorKind::OperationFailed
        };
        ResultEnvelope {
            success: false,
            data: Some(data),
            error: Some(EnvelopeError {
                kind,
                message: format!(
                    "{failed} of {} batch sub-operations failed",
                    sub_results.len()
                ),
            }),
            metadata,
        }
    }

    /// Reads get one retry on a `TargetUnavailable` failure. Mutations never
    /// come through here — see `run_mutation`/`run_batch`, which call the
    /// bridge directly.
    async fn execute_with_retry(
        &self,
        script: &CompiledScript,
    ) -> Result<ExecutionResult, BridgeError> {
        match self.bridge.execute(script).await {
            Err(e) if e.kind().is_retryable() => {
                log::warn!(
                    "Read failed ({e}); retrying once after {:?}.",
                    self.retry_backoff
                );
                tokio::time::sleep(self.retry_backoff).await;
                self.bridge.execute(script).await
            }
            other => other,
        }
    }

    /// Synchronous invalidation. Infallible by construction; if the cache
    /// layer ever grows a failure mode it must be logged here, never allowed
    /// to change the mutation's own reported outcome.
    fn invalidate(&self, entity: EntityType, affected_ids: Vec<String>) {
        let signal = InvalidationSignal::new(entity, affected_ids);
        let dropped = self.cache.invalidate(&signal);
        log::trace!("Mutation invalidation dropped {dropped} cache entries.");
    }

    fn metadata(&self, from_cache: bool, entity: EntityType, start: Instant) -> EnvelopeMetadata {
        EnvelopeMetadata {
            from_cache,
            elapsed_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            entity_type: entity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::TtlTable;
    use crate::models::{FieldChanges, QueryFilter};
    use crate::system::bridge::test_support::{MockRunner, Script};
    use serde_json::json;

    fn pipeline_with(runner: Arc<MockRunner>) -> OperationPipeline {
        let cache = Arc::new(CacheManager::new(TtlTable::default(), true));
        let bridge = Arc::new(ExecutionBridge::new(
            runner,
            Duration::from_secs(5),
            "OmniFocus",
        ));
        OperationPipeline::new(
            cache,
            bridge,
            CompileOptions::default(),
            Duration::from_millis(1),
        )
    }

    fn open_task_query() -> OperationRequest {
        OperationRequest::Query {
            entity: EntityType::Task,
            filter: QueryFilter {
                completed: Some(false),
                ..Default::default()
            },
            limit: Some(10),
            count_only: false,
        }
    }

    fn complete_mutation(id: &str) -> OperationRequest {
        OperationRequest::Mutation {
            entity: EntityType::Task,
            action: MutationAction::Complete { id: id.to_string() },
        }
    }

    #[tokio::test]
    async fn test_repeat_query_is_served_from_cache() {
        let runner = Arc::new(MockRunner::with_behaviors(vec![Script::Succeed(
            r#"[{"id":"t1","name":"Call dentist"}]"#,
        )]));
        let pipeline = pipeline_with(runner.clone());

        let first = pipeline.dispatch(open_task_query()).await;
        let second = pipeline.dispatch(open_task_query()).await;

        assert!(first.success && !first.metadata.from_cache);
        assert!(second.success && second.metadata.from_cache);
        assert_eq!(first.data, second.data);
        // Only the first dispatch reached the transport.
        assert_eq!(runner.submitted_sources().len(), 1);
    }

    #[tokio::test]
    async fn test_read_after_write_never_sees_stale_cache() {
        let runner = Arc::new(MockRunner::with_behaviors(vec![Script::Succeed(
            r#"[{"id":"t1","completed":false}]"#,
        )]));
        let pipeline = pipeline_with(runner.clone());

        let warm = pipeline.dispatch(open_task_query()).await;
        assert!(warm.success);

        let mutated = pipeline.dispatch(complete_mutation("t1")).await;
        assert!(mutated.success);

        let after = pipeline.dispatch(open_task_query()).await;
        // The very next read misses the cache and re-executes.
        assert!(!after.metadata.from_cache);
        assert_eq!(runner.submitted_sources().len(), 3);
    }

    #[tokio::test]
    async fn test_task_mutation_invalidates_analysis_aggregates() {
        let runner = Arc::new(MockRunner::with_behaviors(vec![Script::Succeed(
            r#"{"openTasks": 12}"#,
        )]));
        let pipeline = pipeline_with(runner.clone());
        let analysis = OperationRequest::Analysis {
            kind: crate::models::AnalysisKind::Productivity,
            days: Some(7),
        };

        pipeline.dispatch(analysis.clone()).await;
        pipeline.dispatch(complete_mutation("t1")).await;
        let after = pipeline.dispatch(analysis).await;

        assert!(!after.metadata.from_cache);
        assert_eq!(runner.submitted_sources().len(), 3);
    }

    #[tokio::test]
    async fn test_read_retries_once_on_target_unavailable() {
        let runner = Arc::new(MockRunner::with_behaviors(vec![
            Script::TimeOut,
            Script::Succeed("[]"),
        ]));
        let pipeline = pipeline_with(runner.clone());

        let envelope = pipeline.dispatch(open_task_query()).await;
        assert!(envelope.success);
        assert_eq!(runner.submitted_sources().len(), 2);
    }

    #[tokio::test]
    async fn test_mutation_is_never_retried() {
        let runner = Arc::new(MockRunner::with_behaviors(vec![Script::TimeOut]));
        let pipeline = pipeline_with(runner.clone());

        let envelope = pipeline.dispatch(complete_mutation("t1")).await;
        assert!(!envelope.success);
        assert_eq!(
            envelope.error.as_ref().map(|e| e.kind),
            Some(ErrorKind::TargetUnavailable)
        );
        // Exactly one submission: a write is never silently replayed.
        assert_eq!(runner.submitted_sources().len(), 1);
    }

    #[tokio::test]
    async fn test_script_runtime_error_is_not_retried_on_reads() {
        let runner = Arc::new(MockRunner::with_behaviors(vec![Script::FailExit(
            "execution error: Error: boom (-2700)",
        )]));
        let pipeline = pipeline_with(runner.clone());

        let envelope = pipeline.dispatch(open_task_query()).await;
        assert!(!envelope.success);
        assert_eq!(runner.submitted_sources().len(), 1);
    }

    #[tokio::test]
    async fn test_compile_error_never_reaches_the_transport() {
        let runner = Arc::new(MockRunner::default());
        let pipeline = pipeline_with(runner.clone());
        let request = OperationRequest::Query {
            entity: EntityType::Task,
            filter: QueryFilter {
                due_before: Some("whenever".to_string()),
                ..Default::default()
            },
            limit: None,
            count_only: false,
        };

        let envelope = pipeline.dispatch(request).await;
        assert!(!envelope.success);
        assert_eq!(
            envelope.error.as_ref().map(|e| e.kind),
            Some(ErrorKind::CompileError)
        );
        assert!(runner.submitted_sources().is_empty());
    }

    #[tokio::test]
    async fn test_count_runs_as_primary_context_scan() {
        let runner = Arc::new(MockRunner::with_behaviors(vec![Script::Succeed(
            r#"{"count": 2143}"#,
        )]));
        let pipeline = pipeline_with(runner.clone());
        let request = OperationRequest::Query {
            entity: EntityType::Task,
            filter: QueryFilter {
                completed: Some(false),
                ..Default::default()
            },
            limit: None,
            count_only: true,
        };

        let envelope = pipeline.dispatch(request).await;
        assert!(envelope.success);
        assert_eq!(envelope.data, Some(json!({"count": 2143})));

        let submitted = runner.submitted_sources();
        assert_eq!(submitted.len(), 1);
        // Manual primary-context scan; the bridging call would time out on a
        // collection this size.
        assert!(submitted[0].contains("flattenedTasks"));
        assert!(!submitted[0].contains("evaluateJavascript"));
    }

    #[tokio::test]
    async fn test_tag_write_and_read_back_share_the_secondary_context() {
        let runner = Arc::new(MockRunner::with_behaviors(vec![Script::Succeed("{}")]));
        let pipeline = pipeline_with(runner.clone());
        let request = OperationRequest::Mutation {
            entity: EntityType::Task,
            action: MutationAction::Update {
                id: "t1".to_string(),
                changes: FieldChanges {
                    tags: Some(vec!["urgent".to_string()]),
                    ..Default::default()
                },
            },
        };

        let envelope = pipeline.dispatch(request).await;
        assert!(envelope.success);

        let submitted = runner.submitted_sources();
        assert_eq!(submitted.len(), 1);
        // One wire script: the shim. Both the tag write and the tag
        // read-back ride inside the same evaluateJavascript call.
        assert!(submitted[0].contains("evaluateJavascript"));
        assert!(submitted[0].contains("applyTags"));
        assert!(submitted[0].contains("t.tags.map"));
    }

    #[tokio::test]
    async fn test_batch_partial_failure_reports_every_sub_operation() {
        let runner = Arc::new(MockRunner::with_behaviors(vec![
            Script::Succeed(r#"{"id":"t1","completed":true}"#),
            Script::FailExit("execution error: Error: task not found: t2 (-2700)"),
            Script::Succeed(r#"{"id":"t3","completed":true}"#),
        ]));
        let pipeline = pipeline_with(runner);
        let request = OperationRequest::Batch {
            entity: EntityType::Task,
            actions: vec![
                MutationAction::Complete { id: "t1".into() },
                MutationAction::Complete { id: "t2".into() },
                MutationAction::Complete { id: "t3".into() },
            ],
        };

        let envelope = pipeline.dispatch(request).await;
        assert!(!envelope.success);
        assert_eq!(
            envelope.error.as_ref().map(|e| e.kind),
            Some(ErrorKind::PartialBatchFailure)
        );

        let subs: Vec<SubOperationResult> =
            serde_json::from_value(envelope.data.expect("per-sub results present")).unwrap();
        assert_eq!(subs.len(), 3);
        assert!(subs[0].success && subs[2].success);
        assert!(!subs[1].success);
        let sub_error = subs[1].error.as_ref().expect("failed sub keeps its error");
        assert!(sub_error.message.contains("task not found: t2"));
    }

    #[tokio::test]
    async fn test_batch_with_all_failures_is_operation_failed() {
        let runner = Arc::new(MockRunner::with_behaviors(vec![Script::FailExit(
            "execution error: Error: nope (-2700)",
        )]));
        let pipeline = pipeline_with(runner);
        let request = OperationRequest::Batch {
            entity: EntityType::Task,
            actions: vec![
                MutationAction::Delete { id: "a".into() },
                MutationAction::Delete { id: "b".into() },
            ],
        };

        let envelope = pipeline.dispatch(request).await;
        assert_eq!(
            envelope.error.as_ref().map(|e| e.kind),
            Some(ErrorKind::OperationFailed)
        );
    }

    #[tokio::test]
    async fn test_failed_mutation_still_invalidates() {
        let runner = Arc::new(MockRunner::with_behaviors(vec![
            Script::Succeed(r#"[{"id":"t1"}]"#),
            Script::FailExit("execution error: Error: task not found: t1 (-2700)"),
            Script::Succeed(r#"[]"#),
        ]));
        let pipeline = pipeline_with(runner.clone());

        pipeline.dispatch(open_task_query()).await;
        let failed = pipeline.dispatch(complete_mutation("t1")).await;
        assert!(!failed.success);

        // The failed mutation may have been partially applied; the next
        // read must go back to the target.
        let after = pipeline.dispatch(open_task_query()).await;
        assert!(!after.metadata.from_cache);
        assert_eq!(runner.submitted_sources().len(), 3);
    }

    #[tokio::test]
    async fn test_disabled_cache_bypasses_storage() {
        let runner = Arc::new(MockRunner::with_behaviors(vec![Script::Succeed("[]")]));
        let cache = Arc::new(CacheManager::new(TtlTable::default(), false));
        let bridge = Arc::new(ExecutionBridge::new(
            runner.clone(),
            Duration::from_secs(5),
            "OmniFocus",
        ));
        let pipeline = OperationPipeline::new(
            cache,
            bridge,
            CompileOptions::default(),
            Duration::from_millis(1),
        );

        pipeline.dispatch(open_task_query()).await;
        let second = pipeline.dispatch(open_task_query()).await;
        assert!(!second.metadata.from_cache);
        assert_eq!(runner.submitted_sources().len(), 2);
    }
}
