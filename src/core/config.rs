// src/core/config.rs

//! # Configuration
//!
//! Layered resolution, lowest precedence first: built-in defaults, an
//! optional TOML file, then environment variables. The file is looked up in
//! the platform config directory unless a path is given explicitly. A
//! missing file is fine; a file that exists but fails to parse is a hard
//! error — silently running with defaults after a typo is worse.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::constants::{
    CONFIG_DIR, CONFIG_FILENAME, DEFAULT_ANALYSIS_TTL_SECS, DEFAULT_EXEC_TIMEOUT_SECS,
    DEFAULT_FOLDER_TTL_SECS, DEFAULT_PERSPECTIVE_TTL_SECS, DEFAULT_PROJECT_TTL_SECS,
    DEFAULT_RETRY_BACKOFF_MS, DEFAULT_TAG_TTL_SECS, DEFAULT_TARGET_APP, DEFAULT_TASK_TTL_SECS,
    ENV_CONFIG_PATH, ENV_NO_CACHE, ENV_TIMEOUT_SECS,
};
use crate::core::cache::TtlTable;
use crate::core::compiler::FilterStrategy;
use crate::models::EntityType;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error while reading configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration file at '{path}': {source}")]
    TomlParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

// --- FILE MODELS (what the user writes) ---

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    cache: CacheSection,
    execution: ExecutionSection,
    compiler: CompilerSection,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default, deny_unknown_fields)]
struct CacheSection {
    enabled: bool,
    task_ttl_secs: u64,
    project_ttl_secs: u64,
    tag_ttl_secs: u64,
    folder_ttl_secs: u64,
    perspective_ttl_secs: u64,
    analysis_ttl_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: true,
            task_ttl_secs: DEFAULT_TASK_TTL_SECS,
            project_ttl_secs: DEFAULT_PROJECT_TTL_SECS,
            tag_ttl_secs: DEFAULT_TAG_TTL_SECS,
            folder_ttl_secs: DEFAULT_FOLDER_TTL_SECS,
            perspective_ttl_secs: DEFAULT_PERSPECTIVE_TTL_SECS,
            analysis_ttl_secs: DEFAULT_ANALYSIS_TTL_SECS,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default, deny_unknown_fields)]
struct ExecutionSection {
    timeout_secs: u64,
    retry_backoff_ms: u64,
    target_app: String,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_EXEC_TIMEOUT_SECS,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            target_app: DEFAULT_TARGET_APP.to_string(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default, deny_unknown_fields)]
struct CompilerSection {
    filter_strategy: FilterStrategy,
}

// --- RESOLVED CONFIGURATION (what the rest of the crate sees) ---

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub cache_enabled: bool,
    pub ttls: HashMap<EntityType, Duration>,
    pub exec_timeout: Duration,
    pub retry_backoff: Duration,
    pub filter_strategy: FilterStrategy,
    pub target_app: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        ConfigFile::default().resolve()
    }
}

impl CoreConfig {
    /// Loads configuration. `explicit_path` (a CLI flag) wins over the
    /// `FOCUSBRIDGE_CONFIG` variable, which wins over the platform default
    /// location. Environment overrides are applied last.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = explicit_path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(ENV_CONFIG_PATH).ok().map(PathBuf::from))
            .or_else(default_config_path);

        let file = match path {
            Some(path) if path.exists() => {
                log::debug!("Loading configuration from '{}'.", path.display());
                let content = std::fs::read_to_string(&path)?;
                toml::from_str(&content).map_err(|e| ConfigError::TomlParse { path, source: e })?
            }
            _ => ConfigFile::default(),
        };

        let mut config = file.resolve();
        config.apply_env_overrides();
        Ok(config)
    }

    /// The TTL table the cache manager is constructed with.
    pub fn ttl_table(&self) -> TtlTable {
        TtlTable::new(self.ttls.clone())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(raw) = std::env::var(ENV_NO_CACHE) {
            if raw == "1" || raw.eq_ignore_ascii_case("true") {
                log::debug!("{ENV_NO_CACHE} set; caching disabled for this process.");
                self.cache_enabled = false;
            }
        }
        if let Ok(raw) = std::env::var(ENV_TIMEOUT_SECS) {
            match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => self.exec_timeout = Duration::from_secs(secs),
                _ => log::warn!("Ignoring unparseable {ENV_TIMEOUT_SECS} value '{raw}'."),
            }
        }
    }
}

impl ConfigFile {
    fn resolve(self) -> CoreConfig {
        let mut ttls = HashMap::new();
        ttls.insert(
            EntityType::Task,
            Duration::from_secs(self.cache.task_ttl_secs),
        );
        ttls.insert(
            EntityType::Project,
            Duration::from_secs(self.cache.project_ttl_secs),
        );
        ttls.insert(EntityType::Tag, Duration::from_secs(self.cache.tag_ttl_secs));
        ttls.insert(
            EntityType::Folder,
            Duration::from_secs(self.cache.folder_ttl_secs),
        );
        ttls.insert(
            EntityType::Perspective,
            Duration::from_secs(self.cache.perspective_ttl_secs),
        );
        ttls.insert(
            EntityType::Analysis,
            Duration::from_secs(self.cache.analysis_ttl_secs),
        );
        CoreConfig {
            cache_enabled: self.cache.enabled,
            ttls,
            exec_timeout: Duration::from_secs(self.execution.timeout_secs),
            retry_backoff: Duration::from_millis(self.execution.retry_backoff_ms),
            filter_strategy: self.compiler.filter_strategy,
            target_app: self.execution.target_app,
        }
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILENAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_without_a_file() {
        let config = CoreConfig::load(Some(Path::new("/nonexistent/focusbridge.toml"))).unwrap();
        assert!(config.cache_enabled);
        assert_eq!(config.exec_timeout, Duration::from_secs(DEFAULT_EXEC_TIMEOUT_SECS));
        assert_eq!(config.filter_strategy, FilterStrategy::Manual);
        assert_eq!(config.target_app, DEFAULT_TARGET_APP);
        assert_eq!(
            config.ttls.get(&EntityType::Analysis),
            Some(&Duration::from_secs(DEFAULT_ANALYSIS_TTL_SECS))
        );
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[cache]
task_ttl_secs = 30

[execution]
timeout_secs = 15
target_app = "OmniFocus 4"

[compiler]
filter_strategy = "native"
"#
        )
        .unwrap();
        file.flush().unwrap();

        let config = CoreConfig::load(Some(file.path())).unwrap();
        assert_eq!(
            config.ttls.get(&EntityType::Task),
            Some(&Duration::from_secs(30))
        );
        // Unset fields keep their defaults.
        assert_eq!(
            config.ttls.get(&EntityType::Tag),
            Some(&Duration::from_secs(DEFAULT_TAG_TTL_SECS))
        );
        assert_eq!(config.exec_timeout, Duration::from_secs(15));
        assert_eq!(config.target_app, "OmniFocus 4");
        assert_eq!(config.filter_strategy, FilterStrategy::Native);
    }

    #[test]
    fn test_unknown_field_is_a_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[cache]\nttl = 5\n").unwrap();
        file.flush().unwrap();

        let result = CoreConfig::load(Some(file.path()));
        assert!(matches!(result, Err(ConfigError::TomlParse { .. })));
    }
}
