//! Pet store demo functions
//!
//! Processors and criteria referenced by the bundled `pet` and
//! `adopt_request` workflows.

use crate::entity::{EntityKey, EntityRecord};
use crate::functions::{FunctionRegistry, Processor, ProcessorContext};
use async_trait::async_trait;
use serde_json::{json, Value};

/// Entity model of pets, looked up by adoption requests
pub const PET_MODEL: &str = "pet";

const ADOPTED: &str = "adopted";

fn set_status(mut record: EntityRecord, status: &str) -> anyhow::Result<EntityRecord> {
    record.insert("status".into(), json!(status));
    record.insert("workflowProcessed".into(), json!(true));
    Ok(record)
}

pub fn process_create_pet(record: EntityRecord) -> anyhow::Result<EntityRecord> {
    set_status(record, "created")
}

pub fn process_update_pet(record: EntityRecord) -> anyhow::Result<EntityRecord> {
    set_status(record, "updated")
}

pub fn process_delete_pet(record: EntityRecord) -> anyhow::Result<EntityRecord> {
    set_status(record, "deleted")
}

/// Checks the requested pet and marks it adopted when still available
///
/// The pet is read and rewritten while holding its instance lock, so pet
/// transitions and other adoptions of the same pet cannot interleave.
#[derive(Debug, Default)]
pub struct AdoptRequestProcessor;

#[async_trait]
impl Processor for AdoptRequestProcessor {
    async fn process(&self, ctx: &ProcessorContext, mut record: EntityRecord) -> anyhow::Result<EntityRecord> {
        let pet_id = record
            .get("petId")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        let user_name = record
            .get("userName")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .map(str::to_string);
        let (Some(pet_id), Some(user_name)) = (pet_id, user_name) else {
            anyhow::bail!("petId and userName are required in adopt_request entity");
        };

        let service = &ctx.entity_service;
        let version = &ctx.key.entity_version;
        let pet_key = EntityKey::new(PET_MODEL, version.as_str(), pet_id.as_str());
        let _pet_lock = ctx.locks.acquire(&pet_key).await;

        let pet = service
            .get_item(&ctx.token, PET_MODEL, version, &pet_id)
            .await?;

        if !is_pet_available(&pet.data) {
            tracing::info!("🐾 Adoption failed: pet {} already adopted", pet_id);
            record.insert("adoption_success".into(), json!(false));
            record.insert("message".into(), json!("Pet is not available for adoption."));
            return Ok(record);
        }

        let mut pet_data = pet.data;
        pet_data.insert("status".into(), json!(ADOPTED));
        pet_data.insert("adoptedBy".into(), json!(user_name));
        service
            .update_item(&ctx.token, PET_MODEL, version, &pet_id, &pet_data)
            .await?;

        tracing::info!("🐾 User '{}' adopted pet {}", user_name, pet_id);
        record.insert("adoption_success".into(), json!(true));
        record.insert("message".into(), json!("Adoption request confirmed."));
        record.insert("adopted_at".into(), json!(chrono::Utc::now().to_rfc3339()));
        Ok(record)
    }
}

pub fn is_adoption_successful(record: &EntityRecord) -> bool {
    record.get("adoption_success") == Some(&Value::Bool(true))
}

/// Not adopted yet; `adoptedBy` survives later status rewrites
pub fn is_pet_available(record: &EntityRecord) -> bool {
    record.get("status").and_then(Value::as_str) != Some(ADOPTED) && !record.contains_key("adoptedBy")
}

/// Register every pet store function
pub fn register(functions: &mut FunctionRegistry) {
    functions
        .register_fn_processor("process_create_pet", process_create_pet)
        .register_fn_processor("process_update_pet", process_update_pet)
        .register_fn_processor("process_delete_pet", process_delete_pet)
        .register_processor("process_adopt_request", AdoptRequestProcessor)
        .register_criterion("is_adoption_successful", is_adoption_successful)
        .register_criterion("is_pet_available", is_pet_available);
}
