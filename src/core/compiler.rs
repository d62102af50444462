// src/core/compiler.rs

//! # Parameter Compiler
//!
//! Binds validated operation parameters into a script template and produces
//! a single executable [`CompiledScript`]. Three rules hold for everything
//! that leaves this module:
//!
//! 1. Every interpolated value goes through [`encode_js_string`] or
//!    [`encode_js_date`] — raw concatenation of caller input into script
//!    text never happens.
//! 2. The execution context is decided exactly once per logical operation
//!    ([`required_context`]); the write and its read-back land in the same
//!    script, so they cannot end up in different contexts.
//! 3. A script that would exceed its context's transport ceiling fails
//!    compilation. No truncation, ever.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{DEFAULT_TARGET_APP, MAX_JXA_SCRIPT_BYTES};
use crate::core::{fingerprint, templates};
use crate::models::{
    AnalysisKind, CompiledScript, CreatePayload, EntityType, FieldChanges, MutationAction,
    OperationKind, OperationRequest, OversizedScript, QueryFilter, ScriptContext,
};

/// Default page size when the caller gives no limit.
const DEFAULT_QUERY_LIMIT: usize = 100;

/// Cap on the task detail list inside an overdue analysis payload.
const OVERDUE_DETAIL_LIMIT: usize = 200;

const DEFAULT_PRODUCTIVITY_DAYS: u32 = 7;
const DEFAULT_VELOCITY_DAYS: u32 = 14;

/// How list/count operations filter collections.
///
/// `Manual` iterates the flattened collection with an early exit. The native
/// `whose()` facility resolves one Apple Event per element and was measured
/// 10-40x slower on databases in the low thousands of tasks; `Native` exists
/// as a tunable escape hatch for installations where that measurement does
/// not hold, and only covers boolean filter members.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FilterStrategy {
    #[default]
    Manual,
    Native,
}

/// Compilation policy, owned by the caller and threaded through every
/// compile call.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Scripting name of the target application.
    pub app_name: String,
    pub filter_strategy: FilterStrategy,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            app_name: DEFAULT_TARGET_APP.to_string(),
            filter_strategy: FilterStrategy::default(),
        }
    }
}

/// Errors produced while turning a request into a script. All of them are
/// resolved locally — nothing reaches the automation target.
#[derive(Error, Debug)]
pub enum CompileError {
    /// The instantiated template exceeds the transport ceiling.
    #[error(transparent)]
    Oversized(#[from] OversizedScript),
    /// An interpolated value cannot be encoded as a safe script literal.
    #[error("value cannot be encoded as a script literal: {reason}")]
    Unencodable { reason: String },
    /// The filter carries a member that does not apply to the entity.
    #[error("invalid filter for {entity}: {reason}")]
    InvalidFilter { entity: EntityType, reason: String },
    /// The (entity, operation) pair has no template.
    #[error("operation '{kind}' is not supported for entity '{entity}'")]
    Unsupported { entity: EntityType, kind: String },
}

// --- LITERAL ENCODING ---

/// Encodes a string as a double-quoted JS string literal. JSON string
/// encoding is a strict subset of JS once U+2028/U+2029 are escaped, so the
/// result can never terminate the literal or smuggle statements in.
pub fn encode_js_string(value: &str) -> String {
    let encoded = serde_json::Value::String(value.to_owned()).to_string();
    encoded
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}

/// Encodes a date parameter as a `new Date("...")` expression, normalized to
/// RFC3339 UTC first so equivalent spellings compile identically.
pub fn encode_js_date(raw: &str) -> Result<String, CompileError> {
    let normalized = fingerprint::normalize_date(raw).ok_or_else(|| CompileError::Unencodable {
        reason: format!("'{raw}' is not a recognizable date"),
    })?;
    Ok(format!("new Date({})", encode_js_string(&normalized)))
}

fn encode_tag_array(tags: &[String]) -> String {
    let members: Vec<String> = tags.iter().map(|t| encode_js_string(t)).collect();
    format!("[{}]", members.join(", "))
}

// --- CONTEXT ROUTING ---

/// The single routing decision for a mutation. Tag collections, repetition
/// rules, and reparenting are only trustworthy in the secondary context;
/// everything else stays in the cheaper primary context.
pub fn required_context(entity: EntityType, action: &MutationAction) -> ScriptContext {
    match (entity, action) {
        (EntityType::Tag, _) => ScriptContext::OmniJs,
        (_, MutationAction::Move { .. }) => ScriptContext::OmniJs,
        (_, MutationAction::Create { payload })
            if !payload.tags.is_empty() || payload.repetition_rule.is_some() =>
        {
            ScriptContext::OmniJs
        }
        (_, MutationAction::Update { changes, .. }) if changes.touches_bridge_state() => {
            ScriptContext::OmniJs
        }
        _ => ScriptContext::Jxa,
    }
}

// --- PUBLIC COMPILER API ---

/// Compiles a single (non-batch) request. Batches go through
/// [`compile_batch`] so each sub-operation gets its own routing decision.
pub fn compile(
    request: &OperationRequest,
    options: &CompileOptions,
) -> Result<CompiledScript, CompileError> {
    match request {
        OperationRequest::Query {
            entity,
            filter,
            limit,
            count_only,
        } => {
            if *count_only {
                compile_count(*entity, filter, options)
            } else {
                compile_query(*entity, filter, limit.unwrap_or(DEFAULT_QUERY_LIMIT), options)
            }
        }
        OperationRequest::Mutation { entity, action } => {
            compile_mutation(*entity, action, options)
        }
        OperationRequest::Analysis { kind, days } => compile_analysis(*kind, *days, options),
        OperationRequest::Batch { entity, .. } => Err(CompileError::Unsupported {
            entity: *entity,
            kind: "inline batch".to_string(),
        }),
    }
}

/// Compiles every sub-operation of a batch up front. One uncompilable
/// sub-operation fails the whole batch before anything executes; partial
/// failure is an execution-time concept, not a compile-time one.
pub fn compile_batch(
    entity: EntityType,
    actions: &[MutationAction],
    options: &CompileOptions,
) -> Result<Vec<CompiledScript>, CompileError> {
    actions
        .iter()
        .map(|action| compile_mutation(entity, action, options))
        .collect()
}

fn compile_query(
    entity: EntityType,
    filter: &QueryFilter,
    limit: usize,
    options: &CompileOptions,
) -> Result<CompiledScript, CompileError> {
    let app_lit = encode_js_string(&options.app_name);
    match entity {
        EntityType::Task => {
            let source = match options.filter_strategy {
                FilterStrategy::Native => match native_whose_literal(filter) {
                    Some(whose) => templates::task_list_native(&app_lit, &whose, limit),
                    // Non-boolean members have no native translation.
                    None => templates::task_list(&app_lit, &task_predicate(filter)?, limit),
                },
                FilterStrategy::Manual => {
                    templates::task_list(&app_lit, &task_predicate(filter)?, limit)
                }
            };
            finish(source, ScriptContext::Jxa, OperationKind::List, options)
        }
        EntityType::Project => {
            let source = templates::project_list(&app_lit, &project_predicate(filter)?, limit);
            finish(source, ScriptContext::Jxa, OperationKind::List, options)
        }
        EntityType::Tag => {
            require_empty_filter(entity, filter)?;
            let source = templates::omnijs_tag_list(limit);
            finish(source, ScriptContext::OmniJs, OperationKind::List, options)
        }
        EntityType::Folder => {
            require_empty_filter(entity, filter)?;
            let source = templates::folder_list(&app_lit, limit);
            finish(source, ScriptContext::Jxa, OperationKind::List, options)
        }
        EntityType::Perspective => {
            require_empty_filter(entity, filter)?;
            let source = templates::perspective_list(&app_lit, limit);
            finish(source, ScriptContext::Jxa, OperationKind::List, options)
        }
        EntityType::Analysis => Err(CompileError::Unsupported {
            entity,
            kind: "list".to_string(),
        }),
    }
}

/// Counts always run as a primary-context manual scan. Routing a
/// full-collection pass through the bridging call does not merely slow it
/// down — it hits the transport's fixed round-trip timeout on collections in
/// the low thousands and fails unconditionally.
fn compile_count(
    entity: EntityType,
    filter: &QueryFilter,
    options: &CompileOptions,
) -> Result<CompiledScript, CompileError> {
    let app_lit = encode_js_string(&options.app_name);
    let source = match entity {
        EntityType::Task => {
            templates::collection_count(&app_lit, "flattenedTasks", &task_predicate(filter)?)
        }
        EntityType::Project => {
            templates::collection_count(&app_lit, "flattenedProjects", &project_predicate(filter)?)
        }
        EntityType::Tag => {
            require_empty_filter(entity, filter)?;
            templates::collection_count(&app_lit, "flattenedTags", "true")
        }
        EntityType::Folder => {
            require_empty_filter(entity, filter)?;
            templates::collection_count(&app_lit, "flattenedFolders", "true")
        }
        EntityType::Perspective | EntityType::Analysis => {
            return Err(CompileError::Unsupported {
                entity,
                kind: "count".to_string(),
            });
        }
    };
    finish(source, ScriptContext::Jxa, OperationKind::Count, options)
}

fn compile_mutation(
    entity: EntityType,
    action: &MutationAction,
    options: &CompileOptions,
) -> Result<CompiledScript, CompileError> {
    let context = required_context(entity, action);
    let app_lit = encode_js_string(&options.app_name);
    match (entity, action) {
        (EntityType::Task, MutationAction::Create { payload }) => match context {
            ScriptContext::Jxa => {
                let props = jxa_create_props(payload)?;
                let project_lit = payload.project.as_deref().map(encode_js_string);
                let source = templates::task_create(&app_lit, &props, project_lit.as_deref());
                finish(source, context, OperationKind::Create, options)
            }
            ScriptContext::OmniJs => {
                let assignments = omnijs_create_assignments(payload)?;
                let project_lit = payload.project.as_deref().map(encode_js_string);
                let source = templates::omnijs_task_create(
                    &encode_js_string(&payload.name),
                    project_lit.as_deref(),
                    &assignments,
                    !payload.tags.is_empty(),
                );
                finish(source, context, OperationKind::Create, options)
            }
        },
        (EntityType::Task, MutationAction::Update { id, changes }) => {
            let id_lit = encode_js_string(id);
            let source = match context {
                ScriptContext::Jxa => {
                    templates::task_update(&app_lit, &id_lit, &jxa_task_assignments(changes)?)
                }
                ScriptContext::OmniJs => templates::omnijs_task_update(
                    &id_lit,
                    &omnijs_update_assignments(changes)?,
                    changes.tags.is_some(),
                ),
            };
            finish(source, context, OperationKind::Update, options)
        }
        (EntityType::Task, MutationAction::Complete { id }) => {
            let source = templates::task_complete(&app_lit, &encode_js_string(id));
            finish(source, context, OperationKind::Complete, options)
        }
        (EntityType::Task, MutationAction::Delete { id }) => {
            let source = templates::task_delete(&app_lit, &encode_js_string(id));
            finish(source, context, OperationKind::Delete, options)
        }
        (EntityType::Task, MutationAction::Move { id, parent }) => {
            let source =
                templates::omnijs_task_move(&encode_js_string(id), &encode_js_string(parent));
            finish(source, context, OperationKind::Move, options)
        }
        (EntityType::Project, MutationAction::Create { payload }) => {
            if !payload.tags.is_empty() || payload.repetition_rule.is_some() {
                return Err(CompileError::Unsupported {
                    entity,
                    kind: "create with tags/recurrence".to_string(),
                });
            }
            let props = jxa_create_props(payload)?;
            let folder_lit = payload.folder.as_deref().map(encode_js_string);
            let source = templates::project_create(&app_lit, &props, folder_lit.as_deref());
            finish(source, context, OperationKind::Create, options)
        }
        (EntityType::Project, MutationAction::Update { id, changes }) => {
            if changes.touches_bridge_state() {
                return Err(CompileError::Unsupported {
                    entity,
                    kind: "update of tags/recurrence".to_string(),
                });
            }
            let source = templates::project_update(
                &app_lit,
                &encode_js_string(id),
                &jxa_project_assignments(changes)?,
            );
            finish(source, context, OperationKind::Update, options)
        }
        (EntityType::Project, MutationAction::Delete { id }) => {
            let source = templates::project_delete(&app_lit, &encode_js_string(id));
            finish(source, context, OperationKind::Delete, options)
        }
        (EntityType::Project, MutationAction::Move { id, parent }) => {
            let source =
                templates::omnijs_project_move(&encode_js_string(id), &encode_js_string(parent));
            finish(source, context, OperationKind::Move, options)
        }
        (EntityType::Tag, MutationAction::Create { payload }) => {
            let source = templates::omnijs_tag_create(&encode_js_string(&payload.name));
            finish(source, context, OperationKind::Create, options)
        }
        (EntityType::Tag, MutationAction::Delete { id }) => {
            let source = templates::omnijs_tag_delete(&encode_js_string(id));
            finish(source, context, OperationKind::Delete, options)
        }
        (entity, action) => Err(CompileError::Unsupported {
            entity,
            kind: mutation_kind(action).as_str().to_string(),
        }),
    }
}

fn compile_analysis(
    kind: AnalysisKind,
    days: Option<u32>,
    options: &CompileOptions,
) -> Result<CompiledScript, CompileError> {
    let app_lit = encode_js_string(&options.app_name);
    let source = match kind {
        AnalysisKind::Productivity => {
            templates::analysis_productivity(&app_lit, days.unwrap_or(DEFAULT_PRODUCTIVITY_DAYS))
        }
        AnalysisKind::Overdue => templates::analysis_overdue(&app_lit, OVERDUE_DETAIL_LIMIT),
        AnalysisKind::Velocity => {
            templates::analysis_velocity(&app_lit, days.unwrap_or(DEFAULT_VELOCITY_DAYS).max(1))
        }
    };
    finish(source, ScriptContext::Jxa, OperationKind::Analysis, options)
}

/// Final gate: constructs the script (checking its own ceiling) and, for
/// secondary-context scripts, proves the shim-wrapped form will still fit
/// the primary ceiling the wrapper has to pass through.
fn finish(
    source: String,
    context: ScriptContext,
    kind: OperationKind,
    options: &CompileOptions,
) -> Result<CompiledScript, CompileError> {
    let script = CompiledScript::new(source, context, kind)?;
    if context == ScriptContext::OmniJs {
        let app_lit = encode_js_string(&options.app_name);
        let wrapped_bytes =
            encode_js_string(script.source()).len() + templates::omnijs_shim_overhead(&app_lit);
        if wrapped_bytes > MAX_JXA_SCRIPT_BYTES {
            return Err(CompileError::Oversized(OversizedScript {
                kind,
                context,
                bytes: wrapped_bytes,
                ceiling: MAX_JXA_SCRIPT_BYTES,
            }));
        }
    }
    log::trace!(
        "Compiled {} script for {} context: {} bytes.",
        script.kind(),
        script.context(),
        script.estimated_bytes()
    );
    Ok(script)
}

fn mutation_kind(action: &MutationAction) -> OperationKind {
    match action {
        MutationAction::Create { .. } => OperationKind::Create,
        MutationAction::Update { .. } => OperationKind::Update,
        MutationAction::Complete { .. } => OperationKind::Complete,
        MutationAction::Delete { .. } => OperationKind::Delete,
        MutationAction::Move { .. } => OperationKind::Move,
    }
}

// --- FILTER TRANSLATION ---

fn require_empty_filter(entity: EntityType, filter: &QueryFilter) -> Result<(), CompileError> {
    if filter.is_empty() {
        Ok(())
    } else {
        Err(CompileError::InvalidFilter {
            entity,
            reason: "this entity does not support filters".to_string(),
        })
    }
}

/// Builds the per-element predicate for a manual task scan.
fn task_predicate(filter: &QueryFilter) -> Result<String, CompileError> {
    if filter.status.is_some() {
        return Err(CompileError::InvalidFilter {
            entity: EntityType::Task,
            reason: "'status' applies to projects".to_string(),
        });
    }
    let mut clauses = Vec::new();
    if let Some(completed) = filter.completed {
        clauses.push(format!("t.completed() === {completed}"));
    }
    if let Some(flagged) = filter.flagged {
        clauses.push(format!("t.flagged() === {flagged}"));
    }
    if let Some(available) = filter.available {
        clauses.push(if available {
            "(!t.completed() && !t.blocked())".to_string()
        } else {
            "(t.completed() || t.blocked())".to_string()
        });
    }
    if let Some(inbox) = filter.inbox {
        clauses.push(format!("t.inInbox() === {inbox}"));
    }
    if let Some(project) = &filter.project {
        let lit = encode_js_string(project);
        clauses.push(format!(
            "(() => {{ const p = t.containingProject(); return p !== null && p.name() === {lit}; }})()"
        ));
    }
    if let Some(folder) = &filter.folder {
        let lit = encode_js_string(folder);
        clauses.push(format!(
            "(() => {{ const p = t.containingProject(); if (p === null) return false; const f = p.folder(); return f !== null && f.name() === {lit}; }})()"
        ));
    }
    if let Some(tag) = &filter.tag {
        let lit = encode_js_string(tag);
        clauses.push(format!("t.tags().some((g) => g.name() === {lit})"));
    }
    if let Some(due_before) = &filter.due_before {
        let date = encode_js_date(due_before)?;
        clauses.push(format!("(t.dueDate() !== null && t.dueDate() <= {date})"));
    }
    if let Some(due_after) = &filter.due_after {
        let date = encode_js_date(due_after)?;
        clauses.push(format!("(t.dueDate() !== null && t.dueDate() >= {date})"));
    }
    if let Some(search) = &filter.search {
        let lit = encode_js_string(&search.to_lowercase());
        clauses.push(format!(
            "((t.name() + ' ' + (t.note() || '')).toLowerCase().indexOf({lit}) !== -1)"
        ));
    }
    Ok(join_clauses(clauses))
}

fn project_predicate(filter: &QueryFilter) -> Result<String, CompileError> {
    for (member, present) in [
        ("tag", filter.tag.is_some()),
        ("inbox", filter.inbox.is_some()),
        ("available", filter.available.is_some()),
        ("project", filter.project.is_some()),
    ] {
        if present {
            return Err(CompileError::InvalidFilter {
                entity: EntityType::Project,
                reason: format!("'{member}' does not apply to projects"),
            });
        }
    }
    let mut clauses = Vec::new();
    if let Some(status) = &filter.status {
        let lit = encode_js_string(&status.to_lowercase());
        clauses.push(format!(
            "String(p.status()).replace(/ status$/, '') === {lit}"
        ));
    }
    if let Some(completed) = filter.completed {
        let op = if completed { "===" } else { "!==" };
        clauses.push(format!("String(p.status()).replace(/ status$/, '') {op} 'done'"));
    }
    if let Some(flagged) = filter.flagged {
        clauses.push(format!("p.flagged() === {flagged}"));
    }
    if let Some(folder) = &filter.folder {
        let lit = encode_js_string(folder);
        clauses.push(format!(
            "(() => {{ const f = p.folder(); return f !== null && f.name() === {lit}; }})()"
        ));
    }
    if let Some(due_before) = &filter.due_before {
        let date = encode_js_date(due_before)?;
        clauses.push(format!("(p.dueDate() !== null && p.dueDate() <= {date})"));
    }
    if let Some(due_after) = &filter.due_after {
        let date = encode_js_date(due_after)?;
        clauses.push(format!("(p.dueDate() !== null && p.dueDate() >= {date})"));
    }
    if let Some(search) = &filter.search {
        let lit = encode_js_string(&search.to_lowercase());
        clauses.push(format!(
            "((p.name() + ' ' + (p.note() || '')).toLowerCase().indexOf({lit}) !== -1)"
        ));
    }
    Ok(join_clauses(clauses))
}

fn join_clauses(clauses: Vec<String>) -> String {
    if clauses.is_empty() {
        "true".to_string()
    } else {
        clauses.join(" && ")
    }
}

/// Translates a filter into a `whose()` record. Only boolean members have a
/// native form; any other member makes this return `None` and the caller
/// falls back to the manual scan.
fn native_whose_literal(filter: &QueryFilter) -> Option<String> {
    let non_boolean_present = filter.project.is_some()
        || filter.folder.is_some()
        || filter.tag.is_some()
        || filter.status.is_some()
        || filter.due_before.is_some()
        || filter.due_after.is_some()
        || filter.search.is_some()
        || filter.available.is_some();
    if non_boolean_present {
        return None;
    }
    let mut members = Vec::new();
    if let Some(completed) = filter.completed {
        members.push(format!("completed: {completed}"));
    }
    if let Some(flagged) = filter.flagged {
        members.push(format!("flagged: {flagged}"));
    }
    if let Some(inbox) = filter.inbox {
        members.push(format!("inInbox: {inbox}"));
    }
    if members.is_empty() {
        return None;
    }
    Some(format!("{{{}}}", members.join(", ")))
}

// --- PAYLOAD TRANSLATION ---

/// Property record for `app.Task({...})` / `app.Project({...})`.
fn jxa_create_props(payload: &CreatePayload) -> Result<String, CompileError> {
    let mut members = vec![format!("name: {}", encode_js_string(&payload.name))];
    if let Some(note) = &payload.note {
        members.push(format!("note: {}", encode_js_string(note)));
    }
    if payload.flagged {
        members.push("flagged: true".to_string());
    }
    if let Some(due) = &payload.due_date {
        members.push(format!("dueDate: {}", encode_js_date(due)?));
    }
    if let Some(defer) = &payload.defer_date {
        members.push(format!("deferDate: {}", encode_js_date(defer)?));
    }
    if let Some(minutes) = payload.estimated_minutes {
        members.push(format!("estimatedMinutes: {minutes}"));
    }
    Ok(format!("{{{}}}", members.join(", ")))
}

/// `t.<prop> = <value>;` lines for a primary-context task update. An empty
/// date string clears the date.
fn jxa_task_assignments(changes: &FieldChanges) -> Result<String, CompileError> {
    let mut lines = Vec::new();
    if let Some(name) = &changes.name {
        lines.push(format!("  t.name = {};", encode_js_string(name)));
    }
    if let Some(note) = &changes.note {
        lines.push(format!("  t.note = {};", encode_js_string(note)));
    }
    if let Some(flagged) = changes.flagged {
        lines.push(format!("  t.flagged = {flagged};"));
    }
    if let Some(due) = &changes.due_date {
        lines.push(format!("  t.dueDate = {};", date_or_null(due)?));
    }
    if let Some(defer) = &changes.defer_date {
        lines.push(format!("  t.deferDate = {};", date_or_null(defer)?));
    }
    if let Some(minutes) = changes.estimated_minutes {
        lines.push(format!("  t.estimatedMinutes = {minutes};"));
    }
    Ok(join_lines(lines))
}

fn jxa_project_assignments(changes: &FieldChanges) -> Result<String, CompileError> {
    let mut lines = Vec::new();
    if let Some(name) = &changes.name {
        lines.push(format!("  p.name = {};", encode_js_string(name)));
    }
    if let Some(note) = &changes.note {
        lines.push(format!("  p.note = {};", encode_js_string(note)));
    }
    if let Some(flagged) = changes.flagged {
        lines.push(format!("  p.flagged = {flagged};"));
    }
    if let Some(due) = &changes.due_date {
        lines.push(format!("  p.dueDate = {};", date_or_null(due)?));
    }
    if let Some(defer) = &changes.defer_date {
        lines.push(format!("  p.deferDate = {};", date_or_null(defer)?));
    }
    Ok(join_lines(lines))
}

/// Assignment lines for a secondary-context create, applied after the task
/// object exists.
fn omnijs_create_assignments(payload: &CreatePayload) -> Result<String, CompileError> {
    let mut lines = Vec::new();
    if let Some(note) = &payload.note {
        lines.push(format!("  t.note = {};", encode_js_string(note)));
    }
    if payload.flagged {
        lines.push("  t.flagged = true;".to_string());
    }
    if let Some(due) = &payload.due_date {
        lines.push(format!("  t.dueDate = {};", encode_js_date(due)?));
    }
    if let Some(defer) = &payload.defer_date {
        lines.push(format!("  t.deferDate = {};", encode_js_date(defer)?));
    }
    if let Some(minutes) = payload.estimated_minutes {
        lines.push(format!("  t.estimatedMinutes = {minutes};"));
    }
    if !payload.tags.is_empty() {
        lines.push(format!("  applyTags(t, {});", encode_tag_array(&payload.tags)));
    }
    if let Some(rule) = &payload.repetition_rule {
        lines.push(format!("  {};", repetition_assignment(rule)?));
    }
    Ok(join_lines(lines))
}

fn omnijs_update_assignments(changes: &FieldChanges) -> Result<String, CompileError> {
    let mut lines = Vec::new();
    if let Some(name) = &changes.name {
        lines.push(format!("  t.name = {};", encode_js_string(name)));
    }
    if let Some(note) = &changes.note {
        lines.push(format!("  t.note = {};", encode_js_string(note)));
    }
    if let Some(flagged) = changes.flagged {
        lines.push(format!("  t.flagged = {flagged};"));
    }
    if let Some(due) = &changes.due_date {
        lines.push(format!("  t.dueDate = {};", date_or_null(due)?));
    }
    if let Some(defer) = &changes.defer_date {
        lines.push(format!("  t.deferDate = {};", date_or_null(defer)?));
    }
    if let Some(minutes) = changes.estimated_minutes {
        lines.push(format!("  t.estimatedMinutes = {minutes};"));
    }
    if let Some(tags) = &changes.tags {
        lines.push(format!("  applyTags(t, {});", encode_tag_array(tags)));
    }
    if let Some(rule) = &changes.repetition_rule {
        if rule.is_empty() {
            lines.push("  t.repetitionRule = null;".to_string());
        } else {
            lines.push(format!("  {};", repetition_assignment(rule)?));
        }
    }
    Ok(join_lines(lines))
}

fn repetition_assignment(rule: &str) -> Result<String, CompileError> {
    if !rule.contains("FREQ=") {
        return Err(CompileError::Unencodable {
            reason: format!("'{rule}' is not an ICS recurrence rule"),
        });
    }
    Ok(format!(
        "t.repetitionRule = new Task.RepetitionRule({}, Task.RepetitionMethod.Fixed)",
        encode_js_string(rule)
    ))
}

fn date_or_null(raw: &str) -> Result<String, CompileError> {
    if raw.is_empty() {
        Ok("null".to_string())
    } else {
        encode_js_date(raw)
    }
}

fn join_lines(lines: Vec<String>) -> String {
    if lines.is_empty() {
        String::new()
    } else {
        format!("{}\n", lines.join("\n"))
    }
}
