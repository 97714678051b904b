//! Workflow management REST API endpoints
//!
//! Descriptor CRUD with hot reload: every accepted change is validated,
//! written to the workflow directory and swapped into the registry at once.

use crate::api::{ApiError, AppState};
use crate::workflow::graph::{GraphAnalysis, WorkflowGraph};
use crate::workflow::registry::CompiledWorkflow;
use crate::workflow::storage::is_safe_model_name;
use crate::workflow::types::WorkflowDescriptor;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use serde_json::{json, Value};

/// Response for validation requests
#[derive(Debug, Serialize)]
pub struct ValidationResponse {
    pub valid: bool,
    pub errors: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<GraphAnalysis>,
}

/// Summary row for workflow listings
#[derive(Debug, Serialize)]
pub struct WorkflowSummary {
    pub entity_model: String,
    pub workflow_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub initial_state: String,
    pub state_count: usize,
    pub analysis: GraphAnalysis,
}

impl From<&CompiledWorkflow> for WorkflowSummary {
    fn from(compiled: &CompiledWorkflow) -> Self {
        Self {
            entity_model: compiled.entity_model.clone(),
            workflow_name: compiled.descriptor.workflow_name.clone(),
            version: compiled.descriptor.version.clone(),
            initial_state: compiled.descriptor.initial_state.clone(),
            state_count: compiled.descriptor.states.len(),
            analysis: compiled.analysis.clone(),
        }
    }
}

/// Create workflow management routes
pub fn create_workflow_routes() -> Router<AppState> {
    Router::new()
        .route("/api/workflows", get(list_workflows))
        .route("/api/workflows/validate", post(validate_workflow))
        .route(
            "/api/workflows/{entity_model}",
            get(get_workflow).put(put_workflow).delete(delete_workflow),
        )
        .route("/api/workflows/{entity_model}/reload", post(reload_workflow))
}

fn parse_descriptor(body: &str) -> Result<WorkflowDescriptor, ApiError> {
    WorkflowDescriptor::from_json(body).map_err(|e| {
        tracing::warn!("❌ Invalid workflow descriptor JSON: {}", e);
        ApiError::bad_request(format!("invalid workflow descriptor: {}", e))
    })
}

fn checked_model(entity_model: &str) -> Result<(), ApiError> {
    if is_safe_model_name(entity_model) {
        Ok(())
    } else {
        Err(ApiError::bad_request(format!("invalid entity model name '{}'", entity_model)))
    }
}

/// Validate a descriptor without registering it
///
/// POST /api/workflows/validate
/// Body: workflow descriptor JSON
/// Returns: { "valid": bool, "errors": [...], "analysis": {...} }
async fn validate_workflow(State(state): State<AppState>, body: String) -> Json<ValidationResponse> {
    let descriptor = match WorkflowDescriptor::from_json(&body) {
        Ok(descriptor) => descriptor,
        Err(e) => {
            return Json(ValidationResponse {
                valid: false,
                errors: vec![json!({ "kind": "malformed_json", "message": e.to_string() })],
                analysis: None,
            })
        }
    };

    let errors: Vec<Value> = state
        .registry
        .check(&descriptor)
        .iter()
        .map(|error| {
            let mut value = serde_json::to_value(error).unwrap_or_else(|_| json!({}));
            if let Some(object) = value.as_object_mut() {
                object.insert("message".into(), json!(error.to_string()));
            }
            value
        })
        .collect();

    tracing::info!(
        "🔍 Validated workflow '{}': {} error(s)",
        descriptor.workflow_name,
        errors.len()
    );

    Json(ValidationResponse {
        valid: errors.is_empty(),
        errors,
        analysis: Some(WorkflowGraph::build(&descriptor).analyze()),
    })
}

/// List all registered workflows
///
/// GET /api/workflows
async fn list_workflows(State(state): State<AppState>) -> Json<Value> {
    let workflows: Vec<WorkflowSummary> = state
        .registry
        .list()
        .iter()
        .map(|compiled| WorkflowSummary::from(compiled.as_ref()))
        .collect();
    Json(json!({ "workflows": workflows }))
}

/// Get the descriptor of one entity model
///
/// GET /api/workflows/{entity_model}
async fn get_workflow(
    State(state): State<AppState>,
    Path(entity_model): Path<String>,
) -> Result<Json<WorkflowDescriptor>, ApiError> {
    state
        .registry
        .get(&entity_model)
        .map(|compiled| Json(compiled.descriptor.as_ref().clone()))
        .ok_or_else(|| ApiError::not_found(format!("no workflow for entity model '{}'", entity_model)))
}

/// Create or replace the descriptor of one entity model
///
/// PUT /api/workflows/{entity_model}
/// Body: workflow descriptor JSON
async fn put_workflow(
    State(state): State<AppState>,
    Path(entity_model): Path<String>,
    body: String,
) -> Result<Json<Value>, ApiError> {
    checked_model(&entity_model)?;
    let descriptor = parse_descriptor(&body)?;

    let compiled = state.registry.register(&entity_model, descriptor).await?;
    tracing::info!("🔥 Registered workflow for '{}'", entity_model);

    Ok(Json(json!({
        "entity_model": entity_model,
        "message": format!("Workflow '{}' registered", compiled.descriptor.workflow_name),
        "analysis": compiled.analysis,
    })))
}

/// Re-read a descriptor from the workflow directory
///
/// POST /api/workflows/{entity_model}/reload
async fn reload_workflow(
    State(state): State<AppState>,
    Path(entity_model): Path<String>,
) -> Result<Json<WorkflowSummary>, ApiError> {
    checked_model(&entity_model)?;
    let compiled = state.registry.reload(&entity_model).await?;
    Ok(Json(WorkflowSummary::from(compiled.as_ref())))
}

/// Delete the descriptor of one entity model
///
/// DELETE /api/workflows/{entity_model}
async fn delete_workflow(
    State(state): State<AppState>,
    Path(entity_model): Path<String>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    checked_model(&entity_model)?;
    if state.registry.remove(&entity_model).await? {
        tracing::info!("Deleted workflow: {}", entity_model);
        Ok((
            StatusCode::OK,
            Json(json!({ "message": "Workflow deleted successfully" })),
        ))
    } else {
        Err(ApiError::not_found(format!("no workflow for entity model '{}'", entity_model)))
    }
}
