//! HTTP API Layer
//!
//! REST endpoints for workflow descriptor management and for driving entity
//! instances through their workflows. Handlers share one [`AppState`] and
//! report failures as JSON bodies through [`ApiError`].

// Workflow descriptor management endpoints
pub mod workflows;

// Entity lifecycle endpoints
pub mod entities;

use crate::entity::EntityServiceError;
use crate::runtime::engine::{EngineError, WorkflowEngine};
use crate::workflow::registry::{RegistryError, WorkflowRegistry};
use axum::{
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

pub use entities::create_entity_routes;
pub use workflows::create_workflow_routes;

/// Application state containing shared resources
#[derive(Debug, Clone)]
pub struct AppState {
    /// Hot-reload registry of validated workflows
    pub registry: Arc<WorkflowRegistry>,
    /// Engine driving entity instances
    pub engine: Arc<WorkflowEngine>,
    /// Entity version used by routes that omit it
    pub default_version: String,
}

/// Build the complete API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .merge(create_workflow_routes())
        .merge(create_entity_routes())
        .with_state(state)
}

/// Health check endpoint handler
async fn health_check() -> &'static str {
    "ok"
}

/// Opaque token from `Authorization: Bearer <token>`, empty when absent
pub fn bearer_token(headers: &HeaderMap) -> String {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .unwrap_or_default()
}

/// Error response: status code plus JSON body
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: Value,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": message.into() }),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<EntityServiceError> for ApiError {
    fn from(err: EntityServiceError) -> Self {
        if err.is_not_found() {
            return ApiError::not_found(err.to_string());
        }
        tracing::error!("❌ Entity service error: {}", err);
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let status = match &err {
            EngineError::WorkflowNotFound { .. } | EngineError::UnknownTransition { .. } => {
                StatusCode::NOT_FOUND
            }
            EngineError::TransitionNotEligible { .. } => StatusCode::CONFLICT,
            EngineError::ProcessorFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::EntityService(inner) if inner.is_not_found() => StatusCode::NOT_FOUND,
            EngineError::UnknownState { .. }
            | EngineError::UnresolvedFunction { .. }
            | EngineError::StepLimitExceeded { .. }
            | EngineError::EntityService(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!("❌ {}", err);
        } else {
            tracing::debug!("Request rejected ({}): {}", status, err);
        }
        ApiError::new(status, err.to_string())
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Invalid {
                entity_model,
                errors,
            } => ApiError {
                status: StatusCode::BAD_REQUEST,
                body: json!({
                    "error": format!("workflow for '{}' failed validation", entity_model),
                    "errors": errors,
                }),
            },
            RegistryError::NotFound(entity_model) => {
                ApiError::not_found(format!("no workflow stored for entity model '{}'", entity_model))
            }
            RegistryError::Storage(e) => {
                tracing::error!("❌ Workflow storage error: {:#}", e);
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e))
            }
        }
    }
}
