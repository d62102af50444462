// src/constants.rs

/// Hard byte ceiling for a script submitted to the primary (JXA) context.
/// Derived from the largest `osascript -e` argument observed to pass the
/// transport reliably; anything bigger must fail at compile time.
pub const MAX_JXA_SCRIPT_BYTES: usize = 65_536;

/// Byte ceiling for an inner Omni Automation script, before it is wrapped
/// into the `evaluateJavascript` shim. Half the primary ceiling: the inner
/// source is embedded as a JSON string literal, which can double its size.
pub const MAX_OMNIJS_SCRIPT_BYTES: usize = 32_768;

/// Transport round-trip ceiling in seconds. The automation transport itself
/// gives up at roughly two minutes; waiting longer only hangs the caller.
pub const DEFAULT_EXEC_TIMEOUT_SECS: u64 = 120;

/// Backoff before the single read retry after a `TargetUnavailable` failure.
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;

/// Default cache TTLs, in seconds, per entity type.
pub const DEFAULT_TASK_TTL_SECS: u64 = 300;
pub const DEFAULT_PROJECT_TTL_SECS: u64 = 300;
pub const DEFAULT_TAG_TTL_SECS: u64 = 600;
pub const DEFAULT_FOLDER_TTL_SECS: u64 = 600;
pub const DEFAULT_PERSPECTIVE_TTL_SECS: u64 = 600;
pub const DEFAULT_ANALYSIS_TTL_SECS: u64 = 3_600;

/// The scripting name of the automation target application.
pub const DEFAULT_TARGET_APP: &str = "OmniFocus";

/// Name of the configuration directory (inside the platform config dir).
pub const CONFIG_DIR: &str = "focusbridge";

/// Name of the configuration file inside [`CONFIG_DIR`].
pub const CONFIG_FILENAME: &str = "config.toml";

/// Environment variable that bypasses the cache process-wide.
pub const ENV_NO_CACHE: &str = "FOCUSBRIDGE_NO_CACHE";

/// Environment variable overriding the execution timeout, in seconds.
pub const ENV_TIMEOUT_SECS: &str = "FOCUSBRIDGE_TIMEOUT_SECS";

/// Environment variable pointing at an alternative configuration file.
pub const ENV_CONFIG_PATH: &str = "FOCUSBRIDGE_CONFIG";
