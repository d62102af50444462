//! focusbridge compiles structured task-management operations into OmniFocus
//! automation scripts, executes them through the correct scripting context,
//! and caches normalized results with per-entity TTLs.

pub mod constants;
pub mod core;
pub mod models;
pub mod system;
