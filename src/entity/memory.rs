//! In-memory Entity Service used by tests and the demo backend

use crate::entity::{EntityEnvelope, EntityRecord, EntityResult, EntityService, EntityServiceError};
use crate::runtime::condition::evaluate_group;
use crate::workflow::types::ConditionGroup;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

type Collection = Vec<EntityEnvelope>;

/// Entities grouped by `(entity_model, entity_version)` in insertion order
#[derive(Debug, Default)]
pub struct InMemoryEntityService {
    collections: RwLock<HashMap<(String, String), Collection>>,
}

impl InMemoryEntityService {
    pub fn new() -> Self {
        Self::default()
    }

    fn collection_key(entity_model: &str, entity_version: &str) -> (String, String) {
        (entity_model.to_string(), entity_version.to_string())
    }

    async fn with_entity<T>(
        &self,
        entity_model: &str,
        entity_version: &str,
        technical_id: &str,
        f: impl FnOnce(&mut EntityEnvelope) -> T,
    ) -> EntityResult<T> {
        let mut collections = self.collections.write().await;
        collections
            .get_mut(&Self::collection_key(entity_model, entity_version))
            .and_then(|entities| {
                entities
                    .iter_mut()
                    .find(|entity| entity.technical_id == technical_id)
            })
            .map(f)
            .ok_or_else(|| EntityServiceError::not_found(entity_model, entity_version, technical_id))
    }
}

#[async_trait]
impl EntityService for InMemoryEntityService {
    async fn add_item(
        &self,
        _token: &str,
        entity_model: &str,
        entity_version: &str,
        data: &EntityRecord,
    ) -> EntityResult<String> {
        let technical_id = uuid::Uuid::new_v4().to_string();
        let mut collections = self.collections.write().await;
        collections
            .entry(Self::collection_key(entity_model, entity_version))
            .or_default()
            .push(EntityEnvelope {
                technical_id: technical_id.clone(),
                current_state: None,
                data: data.clone(),
            });

        tracing::debug!("Stored {}/{}/{}", entity_model, entity_version, technical_id);
        Ok(technical_id)
    }

    async fn get_item(
        &self,
        _token: &str,
        entity_model: &str,
        entity_version: &str,
        technical_id: &str,
    ) -> EntityResult<EntityEnvelope> {
        let collections = self.collections.read().await;
        collections
            .get(&Self::collection_key(entity_model, entity_version))
            .and_then(|entities| {
                entities
                    .iter()
                    .find(|entity| entity.technical_id == technical_id)
            })
            .cloned()
            .ok_or_else(|| EntityServiceError::not_found(entity_model, entity_version, technical_id))
    }

    async fn get_items(
        &self,
        _token: &str,
        entity_model: &str,
        entity_version: &str,
    ) -> EntityResult<Vec<EntityEnvelope>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(&Self::collection_key(entity_model, entity_version))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_items_by_condition(
        &self,
        _token: &str,
        entity_model: &str,
        entity_version: &str,
        condition: &ConditionGroup,
    ) -> EntityResult<Vec<EntityEnvelope>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(&Self::collection_key(entity_model, entity_version))
            .map(|entities| {
                entities
                    .iter()
                    .filter(|entity| evaluate_group(condition, &entity.data))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn update_item(
        &self,
        _token: &str,
        entity_model: &str,
        entity_version: &str,
        technical_id: &str,
        data: &EntityRecord,
    ) -> EntityResult<()> {
        self.with_entity(entity_model, entity_version, technical_id, |entity| {
            entity.data = data.clone();
        })
        .await
    }

    async fn update_state(
        &self,
        _token: &str,
        entity_model: &str,
        entity_version: &str,
        technical_id: &str,
        state: &str,
        _via_transition: Option<&str>,
    ) -> EntityResult<()> {
        self.with_entity(entity_model, entity_version, technical_id, |entity| {
            entity.current_state = Some(state.to_string());
        })
        .await
    }

    async fn apply_transition(
        &self,
        _token: &str,
        entity_model: &str,
        entity_version: &str,
        technical_id: &str,
        data: &EntityRecord,
        state: &str,
        _transition: &str,
    ) -> EntityResult<()> {
        self.with_entity(entity_model, entity_version, technical_id, |entity| {
            entity.data = data.clone();
            entity.current_state = Some(state.to_string());
        })
        .await
    }

    async fn delete_item(
        &self,
        _token: &str,
        entity_model: &str,
        entity_version: &str,
        technical_id: &str,
    ) -> EntityResult<()> {
        let mut collections = self.collections.write().await;
        let entities = collections
            .get_mut(&Self::collection_key(entity_model, entity_version))
            .ok_or_else(|| EntityServiceError::not_found(entity_model, entity_version, technical_id))?;

        let before = entities.len();
        entities.retain(|entity| entity.technical_id != technical_id);
        if entities.len() == before {
            return Err(EntityServiceError::not_found(entity_model, entity_version, technical_id));
        }
        Ok(())
    }
}
