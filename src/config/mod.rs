//! Configuration management for the entityflow service
//!
//! Handles server configuration, workflow and entity storage, and runtime
//! parameters. Every value can be overridden through environment variables.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Workflow descriptor storage
    pub workflows: WorkflowConfig,
    /// Entity Service backend
    pub entities: EntityConfig,
    /// Upper bound on automatic transitions fired after one event
    pub max_automatic_steps: usize,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
}

/// Workflow descriptor storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Directory holding `<entity_model>/workflow.json` files (default: "workflows")
    pub dir: String,
}

/// Which Entity Service adapter to run against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityBackend {
    Memory,
    Sqlite,
    Http,
}

impl FromStr for EntityBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(EntityBackend::Memory),
            "sqlite" => Ok(EntityBackend::Sqlite),
            "http" => Ok(EntityBackend::Http),
            other => Err(format!("unknown entity backend '{}'", other)),
        }
    }
}

/// Entity Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityConfig {
    pub backend: EntityBackend,
    /// SQLite database file for the sqlite backend
    pub database_path: String,
    /// Base URL of the remote entity API for the http backend
    pub api_url: String,
    /// Per-request timeout for the http backend, in milliseconds
    pub request_timeout_ms: u64,
    /// Entity version used when a caller does not name one
    pub default_version: String,
}

impl EntityConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {}='{}', using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for k8s/container deployment
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: env_or("ENTITYFLOW_HOST", "0.0.0.0"),
                port: env_parse("ENTITYFLOW_PORT", 3004),
            },
            workflows: WorkflowConfig {
                dir: env_or("ENTITYFLOW_WORKFLOW_DIR", "workflows"),
            },
            entities: EntityConfig {
                backend: env_parse("ENTITYFLOW_ENTITY_BACKEND", EntityBackend::Memory),
                database_path: env_or("ENTITYFLOW_DATABASE_PATH", "data/entities.db"),
                api_url: env_or("ENTITYFLOW_API_URL", "http://localhost:8082/api"),
                request_timeout_ms: env_parse("ENTITYFLOW_REQUEST_TIMEOUT_MS", 30_000),
                default_version: env_or("ENTITY_VERSION", "1000"),
            },
            max_automatic_steps: env_parse("ENTITYFLOW_MAX_AUTOMATIC_STEPS", 64),
        }
    }
}
