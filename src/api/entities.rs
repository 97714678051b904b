//! Entity lifecycle REST API endpoints
//!
//! Creating an entity places it in its workflow's initial state and runs
//! automatic transitions; further progress happens through events and
//! explicitly triggered transitions.

use crate::api::{bearer_token, ApiError, AppState};
use crate::entity::{EntityEnvelope, EntityKey, EntityRecord};
use crate::runtime::engine::{TransitionOutcome, TransitionSummary};
use crate::workflow::types::ConditionGroup;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};

/// Create entity lifecycle routes
pub fn create_entity_routes() -> Router<AppState> {
    Router::new()
        .route("/api/entities/{model}", post(create_default_version))
        .route("/api/entities/{model}/{version}", post(create_entity).get(list_entities))
        .route("/api/entities/{model}/{version}/search", post(search_entities))
        .route(
            "/api/entities/{model}/{version}/{id}",
            get(get_entity).delete(delete_entity),
        )
        .route("/api/entities/{model}/{version}/{id}/events", post(process_event))
        .route(
            "/api/entities/{model}/{version}/{id}/transitions",
            get(list_transitions),
        )
        .route(
            "/api/entities/{model}/{version}/{id}/transitions/{name}",
            post(trigger_transition),
        )
}

async fn create(
    state: &AppState,
    headers: &HeaderMap,
    model: &str,
    version: &str,
    data: EntityRecord,
) -> Result<(StatusCode, Json<TransitionOutcome>), ApiError> {
    let token = bearer_token(headers);
    let outcome = state
        .engine
        .create_entity(&token, model, version, data)
        .await?;

    tracing::info!(
        "📥 Created {} -> '{}' after {} transition(s)",
        outcome.key,
        outcome.current_state,
        outcome.applied.len()
    );
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// Create an entity under the configured default version
///
/// POST /api/entities/{model}
async fn create_default_version(
    State(state): State<AppState>,
    Path(model): Path<String>,
    headers: HeaderMap,
    Json(data): Json<EntityRecord>,
) -> Result<(StatusCode, Json<TransitionOutcome>), ApiError> {
    let version = state.default_version.clone();
    create(&state, &headers, &model, &version, data).await
}

/// Create an entity and run its workflow from the initial state
///
/// POST /api/entities/{model}/{version}
/// Body: entity record (JSON object)
async fn create_entity(
    State(state): State<AppState>,
    Path((model, version)): Path<(String, String)>,
    headers: HeaderMap,
    Json(data): Json<EntityRecord>,
) -> Result<(StatusCode, Json<TransitionOutcome>), ApiError> {
    create(&state, &headers, &model, &version, data).await
}

/// GET /api/entities/{model}/{version}
async fn list_entities(
    State(state): State<AppState>,
    Path((model, version)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<Vec<EntityEnvelope>>, ApiError> {
    let token = bearer_token(&headers);
    let entities = state
        .engine
        .entity_service()
        .get_items(&token, &model, &version)
        .await?;
    Ok(Json(entities))
}

/// Entities whose data satisfies a condition group
///
/// POST /api/entities/{model}/{version}/search
/// Body: { "operator": "AND", "parameters": [...] }
async fn search_entities(
    State(state): State<AppState>,
    Path((model, version)): Path<(String, String)>,
    headers: HeaderMap,
    Json(condition): Json<ConditionGroup>,
) -> Result<Json<Vec<EntityEnvelope>>, ApiError> {
    let token = bearer_token(&headers);
    let entities = state
        .engine
        .entity_service()
        .get_items_by_condition(&token, &model, &version, &condition)
        .await?;
    Ok(Json(entities))
}

/// GET /api/entities/{model}/{version}/{id}
async fn get_entity(
    State(state): State<AppState>,
    Path((model, version, id)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<Json<EntityEnvelope>, ApiError> {
    let token = bearer_token(&headers);
    let entity = state
        .engine
        .entity_service()
        .get_item(&token, &model, &version, &id)
        .await?;
    Ok(Json(entity))
}

/// DELETE /api/entities/{model}/{version}/{id}
async fn delete_entity(
    State(state): State<AppState>,
    Path((model, version, id)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let token = bearer_token(&headers);
    state
        .engine
        .entity_service()
        .delete_item(&token, &model, &version, &id)
        .await?;

    tracing::info!("Deleted entity {}/{}/{}", model, version, id);
    Ok(Json(json!({ "message": "Entity deleted successfully" })))
}

/// Run automatic transitions from the current state
///
/// POST /api/entities/{model}/{version}/{id}/events
async fn process_event(
    State(state): State<AppState>,
    Path((model, version, id)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<Json<TransitionOutcome>, ApiError> {
    let token = bearer_token(&headers);
    let key = EntityKey::new(model, version, id);
    let outcome = state.engine.process_event(&token, &key).await?;
    Ok(Json(outcome))
}

/// Transitions of the current state with their eligibility
///
/// GET /api/entities/{model}/{version}/{id}/transitions
async fn list_transitions(
    State(state): State<AppState>,
    Path((model, version, id)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<Json<Vec<TransitionSummary>>, ApiError> {
    let token = bearer_token(&headers);
    let key = EntityKey::new(model, version, id);
    let transitions = state.engine.available_transitions(&token, &key).await?;
    Ok(Json(transitions))
}

/// Fire a named transition
///
/// POST /api/entities/{model}/{version}/{id}/transitions/{name}
async fn trigger_transition(
    State(state): State<AppState>,
    Path((model, version, id, name)): Path<(String, String, String, String)>,
    headers: HeaderMap,
) -> Result<Json<TransitionOutcome>, ApiError> {
    let token = bearer_token(&headers);
    let key = EntityKey::new(model, version, id);
    tracing::info!("🎯 Triggering '{}' on {}", name, key);

    let outcome = state.engine.trigger_transition(&token, &key, &name).await?;
    Ok(Json(outcome))
}
