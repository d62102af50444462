// src/models.rs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::constants::{MAX_JXA_SCRIPT_BYTES, MAX_OMNIJS_SCRIPT_BYTES};

// --- ENTITY MODEL ---

/// The domain entities the automation surface exposes. `Analysis` is not a
/// database object; it namespaces cached aggregate results so they can be
/// invalidated independently of the base entities they are derived from.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Task,
    Project,
    Tag,
    Folder,
    Perspective,
    Analysis,
}

impl EntityType {
    /// Every entity type, in a fixed order. Used by the cache to build its
    /// per-entity buckets up front.
    pub const ALL: [Self; 6] = [
        Self::Task,
        Self::Project,
        Self::Tag,
        Self::Folder,
        Self::Perspective,
        Self::Analysis,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Project => "project",
            Self::Tag => "tag",
            Self::Folder => "folder",
            Self::Perspective => "perspective",
            Self::Analysis => "analysis",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- OPERATION REQUESTS (validated upstream, deserialized here) ---

/// Filter for query operations. All fields are optional; an empty filter
/// selects the whole collection. Date fields accept any RFC3339 spelling or
/// a bare `YYYY-MM-DD`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct QueryFilter {
    pub completed: Option<bool>,
    pub flagged: Option<bool>,
    pub available: Option<bool>,
    pub inbox: Option<bool>,
    pub project: Option<String>,
    pub tag: Option<String>,
    pub folder: Option<String>,
    pub status: Option<String>,
    pub due_before: Option<String>,
    pub due_after: Option<String>,
    pub search: Option<String>,
}

impl QueryFilter {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Payload for creating a task or project.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct CreatePayload {
    pub name: String,
    pub note: Option<String>,
    pub project: Option<String>,
    pub folder: Option<String>,
    pub due_date: Option<String>,
    pub defer_date: Option<String>,
    pub flagged: bool,
    pub estimated_minutes: Option<u32>,
    pub tags: Vec<String>,
    pub repetition_rule: Option<String>,
}

/// Field changes for an update. `tags` replaces the full tag set;
/// `repetition_rule` takes an ICS recurrence string (e.g. `FREQ=WEEKLY`).
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct FieldChanges {
    pub name: Option<String>,
    pub note: Option<String>,
    pub due_date: Option<String>,
    pub defer_date: Option<String>,
    pub flagged: Option<bool>,
    pub estimated_minutes: Option<u32>,
    pub tags: Option<Vec<String>>,
    pub repetition_rule: Option<String>,
}

impl FieldChanges {
    /// True when the change set touches state that only the secondary
    /// context reads and writes faithfully.
    pub fn touches_bridge_state(&self) -> bool {
        self.tags.is_some() || self.repetition_rule.is_some()
    }
}

/// A single mutation against one entity.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MutationAction {
    Create {
        #[serde(flatten)]
        payload: CreatePayload,
    },
    Update {
        id: String,
        changes: FieldChanges,
    },
    Complete {
        id: String,
    },
    Delete {
        id: String,
    },
    Move {
        id: String,
        parent: String,
    },
}

impl MutationAction {
    /// The id this mutation targets, when it targets an existing object.
    pub fn target_id(&self) -> Option<&str> {
        match self {
            Self::Create { .. } => None,
            Self::Update { id, .. }
            | Self::Complete { id }
            | Self::Delete { id }
            | Self::Move { id, .. } => Some(id),
        }
    }
}

/// The aggregate reports the analysis surface can produce.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    Productivity,
    Overdue,
    Velocity,
}

impl AnalysisKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Productivity => "productivity",
            Self::Overdue => "overdue",
            Self::Velocity => "velocity",
        }
    }
}

/// One structured operation, as handed over by the protocol layer. Shape
/// validation happened upstream; this core only routes and executes it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OperationRequest {
    Query {
        entity: EntityType,
        #[serde(default)]
        filter: QueryFilter,
        #[serde(default)]
        limit: Option<usize>,
        #[serde(default)]
        count_only: bool,
    },
    Mutation {
        entity: EntityType,
        action: MutationAction,
    },
    Batch {
        entity: EntityType,
        actions: Vec<MutationAction>,
    },
    Analysis {
        kind: AnalysisKind,
        #[serde(default)]
        days: Option<u32>,
    },
}

impl OperationRequest {
    /// Mutations (single or batched) are never cached and never retried.
    pub fn is_mutation(&self) -> bool {
        matches!(self, Self::Mutation { .. } | Self::Batch { .. })
    }

    /// The entity type a result for this request is cached (and its
    /// invalidation keyed) under.
    pub fn entity(&self) -> EntityType {
        match self {
            Self::Query { entity, .. }
            | Self::Mutation { entity, .. }
            | Self::Batch { entity, .. } => *entity,
            Self::Analysis { .. } => EntityType::Analysis,
        }
    }
}

// --- COMPILED SCRIPTS ---

/// The two scripting contexts the automation target exposes. State mutated
/// in one is not reliably visible from the other within a session, so a
/// logical operation must read and write through a single context.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ScriptContext {
    /// Default context (`osascript -l JavaScript`). Broad collection access,
    /// unreliable for tag writes, repetition rules, and reparenting.
    Jxa,
    /// Omni Automation, reached only through the `evaluateJavascript`
    /// bridging call. Authoritative for tag/recurrence/move state, but
    /// slower per call and with a tighter size budget.
    OmniJs,
}

impl ScriptContext {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jxa => "jxa",
            Self::OmniJs => "omnijs",
        }
    }

    /// The hard size ceiling for scripts compiled for this context.
    pub fn size_ceiling(self) -> usize {
        match self {
            Self::Jxa => MAX_JXA_SCRIPT_BYTES,
            Self::OmniJs => MAX_OMNIJS_SCRIPT_BYTES,
        }
    }
}

impl fmt::Display for ScriptContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The logical operation a compiled script performs. Metadata only; the
/// pipeline uses it for logging and cache policy, never for re-routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    List,
    Count,
    Create,
    Update,
    Complete,
    Delete,
    Move,
    Analysis,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Count => "count",
            Self::Create => "create",
            Self::Update => "update",
            Self::Complete => "complete",
            Self::Delete => "delete",
            Self::Move => "move",
            Self::Analysis => "analysis",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A script would blow past its context's transport ceiling. Construction
/// fails instead of truncating; a truncated script is worse than no script.
#[derive(Error, Debug)]
#[error(
    "compiled {kind} script is {bytes} bytes, over the {ceiling}-byte ceiling of the {context} context"
)]
pub struct OversizedScript {
    pub kind: OperationKind,
    pub context: ScriptContext,
    pub bytes: usize,
    pub ceiling: usize,
}

/// An executable script plus routing metadata. Opaque once built: the size
/// invariant is checked here, at construction, not by the transport.
#[derive(Debug, Clone)]
pub struct CompiledScript {
    source: String,
    context: ScriptContext,
    kind: OperationKind,
    bytes: usize,
}

impl CompiledScript {
    pub fn new(
        source: String,
        context: ScriptContext,
        kind: OperationKind,
    ) -> Result<Self, OversizedScript> {
        let bytes = source.len();
        let ceiling = context.size_ceiling();
        if bytes > ceiling {
            return Err(OversizedScript {
                kind,
                context,
                bytes,
                ceiling,
            });
        }
        Ok(Self {
            source,
            context,
            kind,
            bytes,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn context(&self) -> ScriptContext {
        self.context
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn estimated_bytes(&self) -> usize {
        self.bytes
    }
}

// --- EXECUTION RESULTS ---

/// What came back from one script execution. Consumed exactly once by the
/// pipeline's normalization step; the raw form is never cached.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub stdout: String,
    pub elapsed: Duration,
    pub context: ScriptContext,
}

// --- CACHE INVALIDATION ---

/// Produced by every successful (or possibly-partially-applied) mutation and
/// consumed synchronously by the cache before the caller sees the result.
#[derive(Debug, Clone)]
pub struct InvalidationSignal {
    pub entity: EntityType,
    /// Ids the mutation is known to have touched. Currently informational:
    /// invalidation clears whole entity buckets along the cascade set.
    pub affected_ids: Vec<String>,
}

impl InvalidationSignal {
    pub fn new(entity: EntityType, affected_ids: Vec<String>) -> Self {
        Self {
            entity,
            affected_ids,
        }
    }

    /// The entity types whose cached entries a mutation of `self.entity`
    /// renders stale. Derived dependencies live here, in one place, so a new
    /// call site cannot invent a weaker cascade.
    pub fn cascade(&self) -> &'static [EntityType] {
        match self.entity {
            EntityType::Task => &[EntityType::Task, EntityType::Project, EntityType::Analysis],
            EntityType::Project => {
                &[EntityType::Project, EntityType::Task, EntityType::Analysis]
            }
            EntityType::Tag => &[EntityType::Tag, EntityType::Task, EntityType::Analysis],
            EntityType::Folder => &[EntityType::Folder, EntityType::Project],
            EntityType::Perspective => &[EntityType::Perspective],
            EntityType::Analysis => &[EntityType::Analysis],
        }
    }
}

// --- RESULT ENVELOPE ---

/// Structured failure classes surfaced to the caller. Retryability is a
/// property of the kind (together with the operation's mutability), not of
/// individual call sites.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The script could not be produced at all. Resolved locally; nothing
    /// was sent to the target.
    CompileError,
    /// Transport timeout, target not running, or target blocked by a modal
    /// dialog. Retryable for reads.
    TargetUnavailable,
    /// The target ran the script and reported a domain error. The original
    /// message is preserved verbatim.
    OperationFailed,
    /// A batch in which some sub-operations succeeded and others failed.
    PartialBatchFailure,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::TargetUnavailable)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CompileError => "compile_error",
            Self::TargetUnavailable => "target_unavailable",
            Self::OperationFailed => "operation_failed",
            Self::PartialBatchFailure => "partial_batch_failure",
        }
    }
}

/// The error half of the canonical envelope.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EnvelopeError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Execution metadata attached to every envelope.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeMetadata {
    pub from_cache: bool,
    pub elapsed_ms: u64,
    pub entity_type: EntityType,
}

/// Canonical result envelope returned for every operation, success or not.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ResultEnvelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EnvelopeError>,
    pub metadata: EnvelopeMetadata,
}

impl ResultEnvelope {
    pub fn ok(data: serde_json::Value, metadata: EnvelopeMetadata) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            metadata,
        }
    }

    pub fn fail(kind: ErrorKind, message: String, metadata: EnvelopeMetadata) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(EnvelopeError { kind, message }),
            metadata,
        }
    }
}

/// Outcome of one sub-operation inside a batch. Every sub-operation is
/// reported individually; a batch envelope never collapses them.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SubOperationResult {
    pub index: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EnvelopeError>,
}
