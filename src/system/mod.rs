// src/system/mod.rs

pub mod bridge;
pub mod osascript;

pub use bridge::{BridgeError, ExecutionBridge};
pub use osascript::{OsaRunner, RunnerError, ScriptRunner};
