// src/core/templates.rs

//! # Script Template Library
//!
//! Parameterized JXA and Omni Automation script bodies for every logical
//! operation. Templates carry `@TOKEN@` placeholders that the compiler fills
//! with already-encoded literals; nothing in this module ever sees raw user
//! input. Each builder pulls in only the helper snippets its operation needs
//! so the assembled script stays far under the transport ceiling.
//!
//! A note on filtering: list/count templates iterate the flattened
//! collections manually with an early exit instead of leaning on `whose()`.
//! `whose()` resolves one Apple Event per candidate element and has been
//! measured 10-40x slower on databases in the low thousands of tasks.

/// Replaces `@TOKEN@` placeholders. Values are encoded literals by the time
/// they get here, so plain substitution cannot change the script structure.
fn fill(template: &str, substitutions: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (token, value) in substitutions {
        out = out.replace(token, value);
    }
    out
}

// --- SHARED SNIPPETS (JXA) ---

/// Opening lines of every JXA script. `@APP@` is the encoded application name.
const JXA_PRELUDE: &str = "\
const app = Application(@APP@);
app.includeStandardAdditions = false;
const doc = app.defaultDocument;
";

/// Manual id lookup over the flattened task collection.
const HELPER_FIND_TASK: &str = "\
const findTaskById = (id) => {
  const ts = doc.flattenedTasks();
  for (let i = 0; i < ts.length; i++) { if (ts[i].id() === id) return ts[i]; }
  return null;
};
";

const HELPER_FIND_PROJECT_BY_ID: &str = "\
const findProjectById = (id) => {
  const ps = doc.flattenedProjects();
  for (let i = 0; i < ps.length; i++) { if (ps[i].id() === id) return ps[i]; }
  return null;
};
";

const HELPER_FIND_PROJECT_BY_NAME: &str = "\
const findProjectByName = (name) => {
  const ps = doc.flattenedProjects();
  for (let i = 0; i < ps.length; i++) { if (ps[i].name() === name) return ps[i]; }
  return null;
};
";

const HELPER_FIND_FOLDER_BY_NAME: &str = "\
const findFolderByName = (name) => {
  const fs = doc.flattenedFolders();
  for (let i = 0; i < fs.length; i++) { if (fs[i].name() === name) return fs[i]; }
  return null;
};
";

/// Serialization of one task, shared by list templates and read-backs.
const HELPER_TASK_JSON: &str = "\
const taskJson = (t) => ({
  id: t.id(),
  name: t.name(),
  note: t.note(),
  completed: t.completed(),
  flagged: t.flagged(),
  inInbox: t.inInbox(),
  dueDate: t.dueDate() ? t.dueDate().toISOString() : null,
  deferDate: t.deferDate() ? t.deferDate().toISOString() : null,
  completionDate: t.completionDate() ? t.completionDate().toISOString() : null,
  estimatedMinutes: t.estimatedMinutes(),
  project: (() => { const p = t.containingProject(); return p ? p.name() : null; })()
});
";

const HELPER_PROJECT_JSON: &str = "\
const projectJson = (p) => ({
  id: p.id(),
  name: p.name(),
  note: p.note(),
  status: String(p.status()).replace(/ status$/, ''),
  flagged: p.flagged(),
  folder: (() => { const f = p.folder(); return f ? f.name() : null; })(),
  taskCount: p.numberOfTasks(),
  dueDate: p.dueDate() ? p.dueDate().toISOString() : null
});
";

// --- QUERY TEMPLATES (primary context) ---

const TASK_LIST: &str = "\
(() => {
@PRELUDE@@HELPERS@
  const ts = doc.flattenedTasks();
  const out = [];
  for (let i = 0; i < ts.length; i++) {
    const t = ts[i];
    if (!(@PRED@)) continue;
    out.push(taskJson(t));
    if (out.length >= @LIMIT@) break;
  }
  return JSON.stringify(out);
})()
";

/// Native-filter variant, kept for installations where `whose()` is fast
/// enough. Only boolean members survive the translation; everything else
/// falls back to the manual scan.
const TASK_LIST_NATIVE: &str = "\
(() => {
@PRELUDE@@HELPERS@
  const ts = doc.flattenedTasks.whose(@WHOSE@)();
  const out = [];
  for (let i = 0; i < ts.length && out.length < @LIMIT@; i++) {
    out.push(taskJson(ts[i]));
  }
  return JSON.stringify(out);
})()
";

const PROJECT_LIST: &str = "\
(() => {
@PRELUDE@@HELPERS@
  const ps = doc.flattenedProjects();
  const out = [];
  for (let i = 0; i < ps.length; i++) {
    const p = ps[i];
    if (!(@PRED@)) continue;
    out.push(projectJson(p));
    if (out.length >= @LIMIT@) break;
  }
  return JSON.stringify(out);
})()
";

const FOLDER_LIST: &str = "\
(() => {
@PRELUDE@
  const fs = doc.flattenedFolders();
  const out = [];
  for (let i = 0; i < fs.length && out.length < @LIMIT@; i++) {
    const f = fs[i];
    out.push({ id: f.id(), name: f.name() });
  }
  return JSON.stringify(out);
})()
";

const PERSPECTIVE_LIST: &str = "\
(() => {
@PRELUDE@
  const names = app.perspectiveNames();
  return JSON.stringify(names.slice(0, @LIMIT@).map((n) => ({ name: n })));
})()
";

const COLLECTION_COUNT: &str = "\
(() => {
@PRELUDE@
  const xs = doc.@COLLECTION@();
  let n = 0;
  for (let i = 0; i < xs.length; i++) {
    const t = xs[i];
    if (@PRED@) n++;
  }
  return JSON.stringify({ count: n });
})()
";

// --- MUTATION TEMPLATES (primary context) ---

const TASK_CREATE: &str = "\
(() => {
@PRELUDE@@HELPERS@
  const t = app.Task(@PROPS@);
@CONTAINER@
  return JSON.stringify(taskJson(t));
})()
";

const TASK_CREATE_INTO_INBOX: &str = "  doc.inboxTasks.push(t);\n";

const TASK_CREATE_INTO_PROJECT: &str = "\
  const p = findProjectByName(@PROJECT@);
  if (!p) throw new Error('project not found: ' + @PROJECT@);
  p.tasks.push(t);
";

const TASK_UPDATE: &str = "\
(() => {
@PRELUDE@@HELPERS@
  const t = findTaskById(@ID@);
  if (!t) throw new Error('task not found: ' + @ID@);
@ASSIGNMENTS@
  return JSON.stringify(taskJson(t));
})()
";

const TASK_COMPLETE: &str = "\
(() => {
@PRELUDE@@HELPERS@
  const t = findTaskById(@ID@);
  if (!t) throw new Error('task not found: ' + @ID@);
  app.markComplete(t);
  return JSON.stringify(taskJson(t));
})()
";

const TASK_DELETE: &str = "\
(() => {
@PRELUDE@@HELPERS@
  const t = findTaskById(@ID@);
  if (!t) throw new Error('task not found: ' + @ID@);
  app.delete(t);
  return JSON.stringify({ id: @ID@, deleted: true });
})()
";

const PROJECT_CREATE: &str = "\
(() => {
@PRELUDE@@HELPERS@
  const p = app.Project(@PROPS@);
@CONTAINER@
  return JSON.stringify(projectJson(p));
})()
";

const PROJECT_CREATE_AT_ROOT: &str = "  doc.projects.push(p);\n";

const PROJECT_CREATE_INTO_FOLDER: &str = "\
  const f = findFolderByName(@FOLDER@);
  if (!f) throw new Error('folder not found: ' + @FOLDER@);
  f.projects.push(p);
";

const PROJECT_UPDATE: &str = "\
(() => {
@PRELUDE@@HELPERS@
  const p = findProjectById(@ID@);
  if (!p) throw new Error('project not found: ' + @ID@);
@ASSIGNMENTS@
  return JSON.stringify(projectJson(p));
})()
";

const PROJECT_DELETE: &str = "\
(() => {
@PRELUDE@@HELPERS@
  const p = findProjectById(@ID@);
  if (!p) throw new Error('project not found: ' + @ID@);
  app.delete(p);
  return JSON.stringify({ id: @ID@, deleted: true });
})()
";

// --- SECONDARY-CONTEXT TEMPLATES (Omni Automation) ---
// These are inner scripts. The bridge embeds them in the `evaluateJavascript`
// shim; the read-back at the end runs in the same context as the write, which
// is what makes tag/recurrence/move results trustworthy.

const OMNIJS_TASK_JSON: &str = "\
const taskJson = (t) => ({
  id: t.id.primaryKey,
  name: t.name,
  note: t.note,
  completed: t.completed,
  flagged: t.flagged,
  dueDate: t.dueDate ? t.dueDate.toISOString() : null,
  deferDate: t.deferDate ? t.deferDate.toISOString() : null,
  tags: t.tags.map((g) => g.name),
  repetitionRule: t.repetitionRule ? String(t.repetitionRule.ruleString) : null,
  project: t.containingProject ? t.containingProject.name : null
});
";

const OMNIJS_REQUIRE_TASK: &str = "\
const t = Task.byIdentifier(@ID@);
if (!t) throw new Error('task not found: ' + @ID@);
";

const OMNIJS_APPLY_TAGS: &str = "\
const applyTags = (t, names) => {
  t.removeTags(t.tags);
  names.forEach((n) => {
    let g = flattenedTags.byName(n);
    if (!g) g = new Tag(n);
    t.addTag(g);
  });
};
";

const OMNIJS_TASK_CREATE: &str = "\
(() => {
@HELPERS@
  const t = new Task(@NAME@, @POSITION@);
@ASSIGNMENTS@
  return JSON.stringify(taskJson(t));
})()
";

const OMNIJS_POSITION_INBOX: &str = "inbox.ending";

const OMNIJS_POSITION_PROJECT: &str = "\
(() => {
    const p = flattenedProjects.byName(@PROJECT@);
    if (!p) throw new Error('project not found: ' + @PROJECT@);
    return p.ending;
  })()";

const OMNIJS_TASK_UPDATE: &str = "\
(() => {
@HELPERS@
@REQUIRE@
@ASSIGNMENTS@
  return JSON.stringify(taskJson(t));
})()
";

const OMNIJS_TASK_MOVE: &str = "\
(() => {
@HELPERS@
@REQUIRE@
  const p = flattenedProjects.byName(@PARENT@);
  if (!p) throw new Error('project not found: ' + @PARENT@);
  moveTasks([t], p.ending);
  return JSON.stringify(taskJson(t));
})()
";

const OMNIJS_PROJECT_MOVE: &str = "\
(() => {
  const p = flattenedProjects.byIdentifier(@ID@);
  if (!p) throw new Error('project not found: ' + @ID@);
  const f = flattenedFolders.byName(@PARENT@);
  if (!f) throw new Error('folder not found: ' + @PARENT@);
  moveSections([p], f.ending);
  return JSON.stringify({ id: p.id.primaryKey, name: p.name, folder: f.name });
})()
";

const OMNIJS_TAG_LIST: &str = "\
(() => {
  const out = flattenedTags.map((g) => ({
    id: g.id.primaryKey,
    name: g.name,
    remaining: g.remainingTasks.length
  }));
  return JSON.stringify(out.slice(0, @LIMIT@));
})()
";

const OMNIJS_TAG_CREATE: &str = "\
(() => {
  if (flattenedTags.byName(@NAME@)) throw new Error('tag already exists: ' + @NAME@);
  const g = new Tag(@NAME@);
  return JSON.stringify({ id: g.id.primaryKey, name: g.name });
})()
";

const OMNIJS_TAG_DELETE: &str = "\
(() => {
  const g = flattenedTags.byName(@NAME@) || flattenedTags.byIdentifier(@NAME@);
  if (!g) throw new Error('tag not found: ' + @NAME@);
  deleteObject(g);
  return JSON.stringify({ id: @NAME@, deleted: true });
})()
";

/// The bridging call itself: one JXA script whose only job is to hand the
/// encoded inner source to the secondary context and echo its result.
const OMNIJS_SHIM: &str = "\
(() => {
  const app = Application(@APP@);
  app.includeStandardAdditions = false;
  return app.evaluateJavascript(@INNER@);
})()
";

// --- ANALYSIS TEMPLATES (primary context, single pass) ---

const ANALYSIS_PRODUCTIVITY: &str = "\
(() => {
@PRELUDE@
  const ts = doc.flattenedTasks();
  const now = new Date();
  const cutoff = new Date(now.getTime() - @DAYS@ * 86400000);
  let open = 0, flagged = 0, overdue = 0, completedRecent = 0;
  const openByProject = {};
  for (let i = 0; i < ts.length; i++) {
    const t = ts[i];
    if (t.completed()) {
      const cd = t.completionDate();
      if (cd && cd >= cutoff) completedRecent++;
      continue;
    }
    open++;
    if (t.flagged()) flagged++;
    const dd = t.dueDate();
    if (dd && dd < now) overdue++;
    const p = t.containingProject();
    const key = p ? p.name() : '(no project)';
    openByProject[key] = (openByProject[key] || 0) + 1;
  }
  return JSON.stringify({
    days: @DAYS@,
    totalTasks: ts.length,
    openTasks: open,
    flaggedTasks: flagged,
    overdueTasks: overdue,
    completedInWindow: completedRecent,
    openByProject: openByProject
  });
})()
";

const ANALYSIS_OVERDUE: &str = "\
(() => {
@PRELUDE@
  const ts = doc.flattenedTasks();
  const now = new Date();
  const out = [];
  for (let i = 0; i < ts.length; i++) {
    const t = ts[i];
    if (t.completed()) continue;
    const dd = t.dueDate();
    if (!dd || dd >= now) continue;
    const p = t.containingProject();
    out.push({
      id: t.id(),
      name: t.name(),
      project: p ? p.name() : null,
      dueDate: dd.toISOString(),
      daysOverdue: Math.floor((now - dd) / 86400000)
    });
  }
  out.sort((a, b) => b.daysOverdue - a.daysOverdue);
  return JSON.stringify({ overdueCount: out.length, tasks: out.slice(0, @LIMIT@) });
})()
";

const ANALYSIS_VELOCITY: &str = "\
(() => {
@PRELUDE@
  const ts = doc.flattenedTasks();
  const now = new Date();
  const cutoff = new Date(now.getTime() - @DAYS@ * 86400000);
  const perDay = {};
  let total = 0;
  for (let i = 0; i < ts.length; i++) {
    const t = ts[i];
    if (!t.completed()) continue;
    const cd = t.completionDate();
    if (!cd || cd < cutoff) continue;
    const key = cd.toISOString().slice(0, 10);
    perDay[key] = (perDay[key] || 0) + 1;
    total++;
  }
  return JSON.stringify({
    days: @DAYS@,
    completed: total,
    perDay: perDay,
    dailyAverage: total / @DAYS@
  });
})()
";

// --- BUILDERS ---
// Every `*_lit` argument is an encoded JS literal (quotes included); numeric
// arguments are rendered by the compiler. Builders assemble the minimal
// helper set for the operation.

fn prelude(app_lit: &str) -> String {
    fill(JXA_PRELUDE, &[("@APP@", app_lit)])
}

pub fn task_list(app_lit: &str, predicate: &str, limit: usize) -> String {
    let helpers = HELPER_TASK_JSON;
    fill(
        TASK_LIST,
        &[
            ("@PRELUDE@", &prelude(app_lit)),
            ("@HELPERS@", helpers),
            ("@PRED@", predicate),
            ("@LIMIT@", &limit.to_string()),
        ],
    )
}

pub fn task_list_native(app_lit: &str, whose_literal: &str, limit: usize) -> String {
    fill(
        TASK_LIST_NATIVE,
        &[
            ("@PRELUDE@", &prelude(app_lit)),
            ("@HELPERS@", HELPER_TASK_JSON),
            ("@WHOSE@", whose_literal),
            ("@LIMIT@", &limit.to_string()),
        ],
    )
}

pub fn project_list(app_lit: &str, predicate: &str, limit: usize) -> String {
    fill(
        PROJECT_LIST,
        &[
            ("@PRELUDE@", &prelude(app_lit)),
            ("@HELPERS@", HELPER_PROJECT_JSON),
            ("@PRED@", predicate),
            ("@LIMIT@", &limit.to_string()),
        ],
    )
}

pub fn folder_list(app_lit: &str, limit: usize) -> String {
    fill(
        FOLDER_LIST,
        &[
            ("@PRELUDE@", &prelude(app_lit)),
            ("@LIMIT@", &limit.to_string()),
        ],
    )
}

pub fn perspective_list(app_lit: &str, limit: usize) -> String {
    fill(
        PERSPECTIVE_LIST,
        &[
            ("@PRELUDE@", &prelude(app_lit)),
            ("@LIMIT@", &limit.to_string()),
        ],
    )
}

/// Counts the members of a flattened collection matching `predicate`.
/// `collection` is one of the fixed accessor names, never user input.
pub fn collection_count(app_lit: &str, collection: &str, predicate: &str) -> String {
    fill(
        COLLECTION_COUNT,
        &[
            ("@PRELUDE@", &prelude(app_lit)),
            ("@COLLECTION@", collection),
            ("@PRED@", predicate),
        ],
    )
}

pub fn task_create(app_lit: &str, props_literal: &str, project_lit: Option<&str>) -> String {
    let (helpers, container) = match project_lit {
        Some(project) => (
            format!("{}{}", HELPER_TASK_JSON, HELPER_FIND_PROJECT_BY_NAME),
            fill(TASK_CREATE_INTO_PROJECT, &[("@PROJECT@", project)]),
        ),
        None => (HELPER_TASK_JSON.to_string(), TASK_CREATE_INTO_INBOX.to_string()),
    };
    fill(
        TASK_CREATE,
        &[
            ("@PRELUDE@", &prelude(app_lit)),
            ("@HELPERS@", &helpers),
            ("@PROPS@", props_literal),
            ("@CONTAINER@", &container),
        ],
    )
}

pub fn task_update(app_lit: &str, id_lit: &str, assignments: &str) -> String {
    fill(
        TASK_UPDATE,
        &[
            ("@PRELUDE@", &prelude(app_lit)),
            ("@HELPERS@", &format!("{}{}", HELPER_TASK_JSON, HELPER_FIND_TASK)),
            ("@ID@", id_lit),
            ("@ASSIGNMENTS@", assignments),
        ],
    )
}

pub fn task_complete(app_lit: &str, id_lit: &str) -> String {
    fill(
        TASK_COMPLETE,
        &[
            ("@PRELUDE@", &prelude(app_lit)),
            ("@HELPERS@", &format!("{}{}", HELPER_TASK_JSON, HELPER_FIND_TASK)),
            ("@ID@", id_lit),
        ],
    )
}

pub fn task_delete(app_lit: &str, id_lit: &str) -> String {
    fill(
        TASK_DELETE,
        &[
            ("@PRELUDE@", &prelude(app_lit)),
            ("@HELPERS@", HELPER_FIND_TASK),
            ("@ID@", id_lit),
        ],
    )
}

pub fn project_create(app_lit: &str, props_literal: &str, folder_lit: Option<&str>) -> String {
    let (helpers, container) = match folder_lit {
        Some(folder) => (
            format!("{}{}", HELPER_PROJECT_JSON, HELPER_FIND_FOLDER_BY_NAME),
            fill(PROJECT_CREATE_INTO_FOLDER, &[("@FOLDER@", folder)]),
        ),
        None => (
            HELPER_PROJECT_JSON.to_string(),
            PROJECT_CREATE_AT_ROOT.to_string(),
        ),
    };
    fill(
        PROJECT_CREATE,
        &[
            ("@PRELUDE@", &prelude(app_lit)),
            ("@HELPERS@", &helpers),
            ("@PROPS@", props_literal),
            ("@CONTAINER@", &container),
        ],
    )
}

pub fn project_update(app_lit: &str, id_lit: &str, assignments: &str) -> String {
    fill(
        PROJECT_UPDATE,
        &[
            ("@PRELUDE@", &prelude(app_lit)),
            (
                "@HELPERS@",
                &format!("{}{}", HELPER_PROJECT_JSON, HELPER_FIND_PROJECT_BY_ID),
            ),
            ("@ID@", id_lit),
            ("@ASSIGNMENTS@", assignments),
        ],
    )
}

pub fn project_delete(app_lit: &str, id_lit: &str) -> String {
    fill(
        PROJECT_DELETE,
        &[
            ("@PRELUDE@", &prelude(app_lit)),
            ("@HELPERS@", HELPER_FIND_PROJECT_BY_ID),
            ("@ID@", id_lit),
        ],
    )
}

/// Inner script creating a task with bridge-only state (tags, recurrence).
/// The read-back is part of the same script: whatever this returns was
/// observed in the secondary context, after the write.
pub fn omnijs_task_create(
    name_lit: &str,
    project_lit: Option<&str>,
    assignments: &str,
    with_tags: bool,
) -> String {
    let position = match project_lit {
        Some(project) => fill(OMNIJS_POSITION_PROJECT, &[("@PROJECT@", project)]),
        None => OMNIJS_POSITION_INBOX.to_string(),
    };
    let helpers = if with_tags {
        format!("{}{}", OMNIJS_TASK_JSON, OMNIJS_APPLY_TAGS)
    } else {
        OMNIJS_TASK_JSON.to_string()
    };
    fill(
        OMNIJS_TASK_CREATE,
        &[
            ("@HELPERS@", &helpers),
            ("@NAME@", name_lit),
            ("@POSITION@", &position),
            ("@ASSIGNMENTS@", assignments),
        ],
    )
}

pub fn omnijs_task_update(id_lit: &str, assignments: &str, with_tags: bool) -> String {
    let helpers = if with_tags {
        format!("{}{}", OMNIJS_TASK_JSON, OMNIJS_APPLY_TAGS)
    } else {
        OMNIJS_TASK_JSON.to_string()
    };
    fill(
        OMNIJS_TASK_UPDATE,
        &[
            ("@HELPERS@", &helpers),
            ("@REQUIRE@", &fill(OMNIJS_REQUIRE_TASK, &[("@ID@", id_lit)])),
            ("@ASSIGNMENTS@", assignments),
        ],
    )
}

pub fn omnijs_task_move(id_lit: &str, parent_lit: &str) -> String {
    fill(
        OMNIJS_TASK_MOVE,
        &[
            ("@HELPERS@", OMNIJS_TASK_JSON),
            ("@REQUIRE@", &fill(OMNIJS_REQUIRE_TASK, &[("@ID@", id_lit)])),
            ("@PARENT@", parent_lit),
        ],
    )
}

pub fn omnijs_project_move(id_lit: &str, parent_lit: &str) -> String {
    fill(
        OMNIJS_PROJECT_MOVE,
        &[("@ID@", id_lit), ("@PARENT@", parent_lit)],
    )
}

pub fn omnijs_tag_list(limit: usize) -> String {
    fill(OMNIJS_TAG_LIST, &[("@LIMIT@", &limit.to_string())])
}

pub fn omnijs_tag_create(name_lit: &str) -> String {
    fill(OMNIJS_TAG_CREATE, &[("@NAME@", name_lit)])
}

pub fn omnijs_tag_delete(name_lit: &str) -> String {
    fill(OMNIJS_TAG_DELETE, &[("@NAME@", name_lit)])
}

/// Wraps an encoded inner script into the bridging call.
pub fn omnijs_shim(app_lit: &str, inner_lit: &str) -> String {
    fill(OMNIJS_SHIM, &[("@APP@", app_lit), ("@INNER@", inner_lit)])
}

/// Fixed overhead the shim adds around the encoded inner script, used by the
/// compiler to prove the wrapped form fits the primary ceiling.
pub fn omnijs_shim_overhead(app_lit: &str) -> usize {
    omnijs_shim(app_lit, "").len()
}

pub fn analysis_productivity(app_lit: &str, days: u32) -> String {
    fill(
        ANALYSIS_PRODUCTIVITY,
        &[
            ("@PRELUDE@", &prelude(app_lit)),
            ("@DAYS@", &days.to_string()),
        ],
    )
}

pub fn analysis_overdue(app_lit: &str, limit: usize) -> String {
    fill(
        ANALYSIS_OVERDUE,
        &[
            ("@PRELUDE@", &prelude(app_lit)),
            ("@LIMIT@", &limit.to_string()),
        ],
    )
}

pub fn analysis_velocity(app_lit: &str, days: u32) -> String {
    fill(
        ANALYSIS_VELOCITY,
        &[
            ("@PRELUDE@", &prelude(app_lit)),
            ("@DAYS@", &days.to_string()),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_list_pulls_only_task_helpers() {
        let script = task_list("\"OmniFocus\"", "true", 50);
        assert!(script.contains("taskJson"));
        assert!(!script.contains("projectJson"));
        assert!(!script.contains("findProjectByName"));
        assert!(!script.contains("@PRED@"));
    }

    #[test]
    fn test_task_create_into_project_pulls_project_lookup() {
        let inbox = task_create("\"OmniFocus\"", "{name: \"x\"}", None);
        let proj = task_create("\"OmniFocus\"", "{name: \"x\"}", Some("\"Work\""));
        assert!(inbox.contains("inboxTasks.push"));
        assert!(!inbox.contains("findProjectByName"));
        assert!(proj.contains("findProjectByName"));
        assert!(!proj.contains("inboxTasks.push"));
    }

    #[test]
    fn test_mutation_templates_read_back_in_script() {
        let script = task_complete("\"OmniFocus\"", "\"t1\"");
        assert!(script.contains("markComplete"));
        // The read-back follows the write inside the same script.
        let write = script.find("markComplete").expect("write present");
        let read = script.rfind("taskJson(t)").expect("read-back present");
        assert!(read > write);
    }

    #[test]
    fn test_omnijs_update_includes_tag_helpers_only_when_needed() {
        let with_tags = omnijs_task_update("\"t1\"", "  applyTags(t, [\"a\"]);\n", true);
        let without = omnijs_task_update("\"t1\"", "  t.flagged = true;\n", false);
        assert!(with_tags.contains("applyTags"));
        assert!(!without.contains("applyTags"));
    }

    #[test]
    fn test_shim_embeds_inner_literal() {
        let shim = omnijs_shim("\"OmniFocus\"", "\"1 + 1\"");
        assert!(shim.contains("evaluateJavascript(\"1 + 1\")"));
    }

    #[test]
    fn test_no_placeholder_survives_filling() {
        let scripts = [
            task_list("\"OmniFocus\"", "t.completed() === false", 10),
            project_list("\"OmniFocus\"", "true", 10),
            folder_list("\"OmniFocus\"", 10),
            perspective_list("\"OmniFocus\"", 10),
            collection_count("\"OmniFocus\"", "flattenedTasks", "true"),
            task_update("\"OmniFocus\"", "\"id\"", "  t.name = \"x\";\n"),
            analysis_productivity("\"OmniFocus\"", 7),
            analysis_overdue("\"OmniFocus\"", 100),
            analysis_velocity("\"OmniFocus\"", 14),
            omnijs_task_move("\"id\"", "\"Work\""),
            omnijs_tag_create("\"urgent\""),
        ];
        for script in scripts {
            assert!(!script.contains('@'), "unfilled placeholder in: {script}");
        }
    }
}
