//! Recipe loading: one TOML file describing the server, engine tuning,
//! output location, and the declarative mapping rules.
//!
//! Credentials never live in the recipe; `server.password_env` names
//! the environment variable holding the password.

use std::path::{Path, PathBuf};
use std::time::Duration;

use graft_client::StoreConfig;
use graft_engine::EngineConfig;
use graft_mapping::MappingRules;
use serde::Deserialize;
use thiserror::Error;

/// Result type for recipe loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read recipe {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse recipe {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("environment variable '{variable}' (named by server.password_env) is not set")]
    MissingPassword { variable: String },
}

/// One reconciliation recipe.
#[derive(Debug, Clone, Deserialize)]
pub struct Recipe {
    pub server: ServerSection,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub output: OutputSection,
    pub mapping: MappingRules,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    /// Base URL of the graph store API.
    pub base_url: String,
    pub username: String,
    /// Name of the environment variable holding the password.
    pub password_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputSection {
    #[serde(default = "default_output_directory")]
    pub directory: PathBuf,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_workers() -> usize {
    8
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_output_directory() -> PathBuf {
    PathBuf::from("graft-out")
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
        }
    }
}

impl Recipe {
    /// Reads and parses a recipe file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Builds the HTTP client configuration, with the password already
    /// resolved from the environment.
    #[must_use]
    pub fn store_config(&self, password: String) -> StoreConfig {
        StoreConfig {
            base_url: self.server.base_url.clone(),
            username: self.server.username.clone(),
            password,
            timeout: Duration::from_secs(self.server.timeout_secs),
            max_retries: self.engine.max_retries,
            initial_backoff: Duration::from_millis(self.engine.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.engine.max_backoff_ms),
        }
    }

    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            workers: self.engine.workers,
        }
    }
}

impl ServerSection {
    /// Looks the password up in the environment.
    pub fn resolve_password(&self) -> ConfigResult<String> {
        std::env::var(&self.password_env).map_err(|_| ConfigError::MissingPassword {
            variable: self.password_env.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECIPE: &str = r#"
[server]
base_url = "https://graph.example.org/api"
username = "importer"
password_env = "GRAFT_PASSWORD"

[engine]
workers = 4

[output]
directory = "out/run1"

[mapping.columns]
"AUTHOR" = "person"
"WORK_ID" = "work"

[mapping.relations.authored]
type = "authored"
source_column = "AUTHOR"
source_type = "person"
target_column = "WORK_ID"
target_type = "work"
"#;

    #[test]
    fn parse_full_recipe() {
        let recipe: Recipe = toml::from_str(RECIPE).unwrap();
        assert_eq!(recipe.server.base_url, "https://graph.example.org/api");
        assert_eq!(recipe.server.timeout_secs, 30);
        assert_eq!(recipe.engine.workers, 4);
        assert_eq!(recipe.engine.max_retries, 3);
        assert_eq!(recipe.output.directory, PathBuf::from("out/run1"));
        assert_eq!(recipe.mapping.columns.len(), 2);
        recipe.mapping.validate().unwrap();
    }

    #[test]
    fn engine_and_output_sections_are_optional() {
        let minimal = r#"
[server]
base_url = "http://localhost:8080"
username = "u"
password_env = "P"

[mapping.columns]
"A" = "person"
"#;
        let recipe: Recipe = toml::from_str(minimal).unwrap();
        assert_eq!(recipe.engine.workers, 8);
        assert_eq!(recipe.output.directory, PathBuf::from("graft-out"));
    }

    #[test]
    fn store_config_conversion() {
        let recipe: Recipe = toml::from_str(RECIPE).unwrap();
        let cfg = recipe.store_config("hunter2".to_string());
        assert_eq!(cfg.base_url, "https://graph.example.org/api");
        assert_eq!(cfg.username, "importer");
        assert_eq!(cfg.password, "hunter2");
        assert_eq!(cfg.timeout, Duration::from_secs(30));
        assert_eq!(cfg.initial_backoff, Duration::from_millis(500));
    }

    #[test]
    fn missing_password_variable_is_an_error() {
        let server = ServerSection {
            base_url: String::new(),
            username: String::new(),
            password_env: "GRAFT_TEST_SURELY_UNSET_VARIABLE".to_string(),
            timeout_secs: 30,
        };
        let err = server.resolve_password().unwrap_err();
        assert!(matches!(err, ConfigError::MissingPassword { .. }));
        assert!(err.to_string().contains("GRAFT_TEST_SURELY_UNSET_VARIABLE"));
    }

    #[test]
    fn password_resolves_from_environment() {
        // PATH is set in any sane test environment; good enough to
        // exercise the success path without mutating the environment.
        let server = ServerSection {
            base_url: String::new(),
            username: String::new(),
            password_env: "PATH".to_string(),
            timeout_secs: 30,
        };
        assert!(server.resolve_password().is_ok());
    }
}
