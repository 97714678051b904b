//! Entity Service layer
//!
//! Entity records live in an external store addressed by
//! `(entity_model, entity_version, technical_id)`. The engine and processors
//! only talk to it through the [`EntityService`] trait; ids are always
//! assigned by the service. Three adapters are provided:
//! - [`memory::InMemoryEntityService`] for tests and demos
//! - [`sqlite::SqliteEntityService`] for local development with sqlx
//! - [`http::HttpEntityService`] for the remote platform REST API

pub mod http;
pub mod memory;
pub mod sqlite;

use crate::workflow::types::ConditionGroup;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use http::HttpEntityService;
pub use memory::InMemoryEntityService;
pub use sqlite::SqliteEntityService;

/// Opaque, key-ordered attribute mapping of one entity
pub type EntityRecord = serde_json::Map<String, serde_json::Value>;

/// Address of one entity instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    pub entity_model: String,
    pub entity_version: String,
    pub technical_id: String,
}

impl EntityKey {
    pub fn new(
        entity_model: impl Into<String>,
        entity_version: impl Into<String>,
        technical_id: impl Into<String>,
    ) -> Self {
        Self {
            entity_model: entity_model.into(),
            entity_version: entity_version.into(),
            technical_id: technical_id.into(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.entity_model, self.entity_version, self.technical_id
        )
    }
}

/// A stored entity as returned by the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityEnvelope {
    pub technical_id: String,
    /// Workflow state pointer; `None` until the engine assigns the initial state
    pub current_state: Option<String>,
    pub data: EntityRecord,
}

/// Errors raised by Entity Service adapters
#[derive(Debug, thiserror::Error)]
pub enum EntityServiceError {
    #[error("entity {entity_model}/{entity_version}/{technical_id} not found")]
    NotFound {
        entity_model: String,
        entity_version: String,
        technical_id: String,
    },

    #[error("entity payload could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("entity database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("entity service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("entity service returned status {status}: {body}")]
    Remote { status: u16, body: String },

    #[error("unexpected entity service response: {0}")]
    InvalidResponse(String),
}

impl EntityServiceError {
    pub fn not_found(entity_model: &str, entity_version: &str, technical_id: &str) -> Self {
        EntityServiceError::NotFound {
            entity_model: entity_model.to_string(),
            entity_version: entity_version.to_string(),
            technical_id: technical_id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EntityServiceError::NotFound { .. })
    }
}

pub type EntityResult<T> = Result<T, EntityServiceError>;

/// Storage and retrieval of entity records
///
/// Every call is keyed by the caller-supplied model and version and carries an
/// opaque auth token that adapters forward verbatim (or ignore).
#[async_trait]
pub trait EntityService: Send + Sync {
    /// Store a new record and return the service-assigned technical id
    async fn add_item(
        &self,
        token: &str,
        entity_model: &str,
        entity_version: &str,
        data: &EntityRecord,
    ) -> EntityResult<String>;

    async fn get_item(
        &self,
        token: &str,
        entity_model: &str,
        entity_version: &str,
        technical_id: &str,
    ) -> EntityResult<EntityEnvelope>;

    async fn get_items(
        &self,
        token: &str,
        entity_model: &str,
        entity_version: &str,
    ) -> EntityResult<Vec<EntityEnvelope>>;

    /// Records whose data satisfies `condition`
    async fn get_items_by_condition(
        &self,
        token: &str,
        entity_model: &str,
        entity_version: &str,
        condition: &ConditionGroup,
    ) -> EntityResult<Vec<EntityEnvelope>>;

    /// Replace the record data, leaving the state pointer untouched
    async fn update_item(
        &self,
        token: &str,
        entity_model: &str,
        entity_version: &str,
        technical_id: &str,
        data: &EntityRecord,
    ) -> EntityResult<()>;

    /// Move the state pointer to `state`
    ///
    /// `via_transition` names the transition that caused the move; it is
    /// `None` when the initial state is assigned.
    async fn update_state(
        &self,
        token: &str,
        entity_model: &str,
        entity_version: &str,
        technical_id: &str,
        state: &str,
        via_transition: Option<&str>,
    ) -> EntityResult<()>;

    /// Persist one transition step: the processed record and the state the
    /// named transition leads to
    ///
    /// Both are written or neither is.
    #[allow(clippy::too_many_arguments)]
    async fn apply_transition(
        &self,
        token: &str,
        entity_model: &str,
        entity_version: &str,
        technical_id: &str,
        data: &EntityRecord,
        state: &str,
        transition: &str,
    ) -> EntityResult<()>;

    async fn delete_item(
        &self,
        token: &str,
        entity_model: &str,
        entity_version: &str,
        technical_id: &str,
    ) -> EntityResult<()>;
}
