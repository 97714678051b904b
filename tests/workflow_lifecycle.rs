//! Pet adoption scenario against the bundled workflow descriptors

use entityflow::entity::InMemoryEntityService;
use entityflow::runtime::engine::{EngineConfig, EngineError, WorkflowEngine};
use entityflow::server::default_functions;
use entityflow::workflow::storage::WorkflowStorage;
use entityflow::{EntityKey, EntityRecord, EntityService, WorkflowRegistry};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

const TOKEN: &str = "test-token";
const VERSION: &str = "1000";

fn record(value: Value) -> EntityRecord {
    value.as_object().cloned().unwrap()
}

async fn bundled_engine() -> (WorkflowEngine, Arc<InMemoryEntityService>) {
    let functions = Arc::new(default_functions());
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("workflows");
    let registry = Arc::new(WorkflowRegistry::with_storage(
        WorkflowStorage::new(dir),
        Arc::clone(&functions),
    ));
    let loaded = registry.init_from_storage().await.unwrap();
    assert_eq!(loaded, 2);

    let service = Arc::new(InMemoryEntityService::new());
    let engine = WorkflowEngine::new(
        registry,
        functions,
        service.clone(),
        EngineConfig::default(),
    );
    (engine, service)
}

#[tokio::test]
async fn bundled_workflows_are_valid() {
    let (engine, _) = bundled_engine().await;
    let models: Vec<String> = engine
        .workflows()
        .list()
        .iter()
        .map(|w| w.entity_model.clone())
        .collect();
    assert_eq!(models, vec!["adopt_request", "pet"]);

    let pet = engine.workflows().get("pet").unwrap();
    assert_eq!(pet.analysis.terminal_states, vec!["adopted", "deleted"]);
    assert!(pet.analysis.unreachable_states.is_empty());
}

#[tokio::test]
async fn adoption_approves_first_request_and_declines_second() {
    let (engine, service) = bundled_engine().await;

    let pet = engine
        .create_entity(TOKEN, "pet", VERSION, record(json!({"name": "Rex"})))
        .await
        .unwrap();
    assert_eq!(pet.current_state, "available");
    assert_eq!(pet.record["status"], json!("created"));
    let pet_id = pet.key.technical_id.clone();

    let first = engine
        .create_entity(
            TOKEN,
            "adopt_request",
            VERSION,
            record(json!({"petId": &pet_id, "userName": "ann"})),
        )
        .await
        .unwrap();
    assert_eq!(first.current_state, "approved");
    let names: Vec<&str> = first.applied.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["submit", "approve"]);

    let stored_pet = service.get_item(TOKEN, "pet", VERSION, &pet_id).await.unwrap();
    assert_eq!(stored_pet.data["adoptedBy"], json!("ann"));
    assert_eq!(stored_pet.current_state.as_deref(), Some("available"));

    // The pet record changed outside its own workflow; an event catches it up
    let caught_up = engine
        .process_event(TOKEN, &EntityKey::new("pet", VERSION, &pet_id))
        .await
        .unwrap();
    assert_eq!(caught_up.previous_state.as_deref(), Some("available"));
    assert_eq!(caught_up.current_state, "adopted");

    let second = engine
        .create_entity(
            TOKEN,
            "adopt_request",
            VERSION,
            record(json!({"petId": &pet_id, "userName": "bob"})),
        )
        .await
        .unwrap();
    assert_eq!(second.current_state, "declined");
    assert_eq!(second.record["message"], json!("Pet is not available for adoption."));
}

#[tokio::test]
async fn manual_transitions_follow_criteria() {
    let (engine, service) = bundled_engine().await;
    let pet = engine
        .create_entity(TOKEN, "pet", VERSION, record(json!({"name": "Tom"})))
        .await
        .unwrap();
    let key = pet.key.clone();

    let transitions = engine.available_transitions(TOKEN, &key).await.unwrap();
    let delete = transitions.iter().find(|t| t.name == "delete").unwrap();
    assert!(delete.eligible);

    let updated = engine.trigger_transition(TOKEN, &key, "update").await.unwrap();
    assert_eq!(updated.current_state, "available");
    assert_eq!(updated.record["status"], json!("updated"));

    let deleted = engine.trigger_transition(TOKEN, &key, "delete").await.unwrap();
    assert_eq!(deleted.current_state, "deleted");

    let stored = service
        .get_item(TOKEN, "pet", VERSION, &key.technical_id)
        .await
        .unwrap();
    assert_eq!(stored.current_state.as_deref(), Some("deleted"));
    assert_eq!(stored.data["status"], json!("deleted"));

    let err = engine.trigger_transition(TOKEN, &key, "update").await.unwrap_err();
    assert!(matches!(err, EngineError::UnknownTransition { .. }));
}

#[tokio::test]
async fn adoption_request_for_missing_pet_fails() {
    let (engine, service) = bundled_engine().await;
    let err = engine
        .create_entity(
            TOKEN,
            "adopt_request",
            VERSION,
            record(json!({"petId": "no-such-pet", "userName": "ann"})),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ProcessorFailed { .. }));

    // The request itself was stored and stays in the initial state
    let requests = service.get_items(TOKEN, "adopt_request", VERSION).await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].current_state.as_deref(), Some("none"));
}

#[tokio::test]
async fn concurrent_pet_update_cannot_undo_an_adoption() {
    let (engine, service) = bundled_engine().await;
    let pet = engine
        .create_entity(TOKEN, "pet", VERSION, record(json!({"name": "Rex"})))
        .await
        .unwrap();
    let pet_id = pet.key.technical_id.clone();

    let (update, adoption) = tokio::join!(
        engine.trigger_transition(TOKEN, &pet.key, "update"),
        engine.create_entity(
            TOKEN,
            "adopt_request",
            VERSION,
            record(json!({"petId": &pet_id, "userName": "ann"})),
        ),
    );
    assert_eq!(adoption.unwrap().current_state, "approved");
    // Either the update ran first, or it saw the adopted pet and was refused
    match update {
        Ok(outcome) => assert_eq!(outcome.current_state, "available"),
        Err(err) => assert!(matches!(err, EngineError::TransitionNotEligible { .. })),
    }

    let stored = service.get_item(TOKEN, "pet", VERSION, &pet_id).await.unwrap();
    assert_eq!(stored.data["status"], json!("adopted"));
    assert_eq!(stored.data["adoptedBy"], json!("ann"));

    let second = engine
        .create_entity(
            TOKEN,
            "adopt_request",
            VERSION,
            record(json!({"petId": &pet_id, "userName": "bob"})),
        )
        .await
        .unwrap();
    assert_eq!(second.current_state, "declined");
}
