//! SQLite-backed Entity Service for local development
//!
//! Every entity is one row; the record is kept as a JSON column next to the
//! indexed lookup fields. Condition searches load the model/version slice and
//! filter with the same predicate semantics the evaluator uses.

use crate::entity::{EntityEnvelope, EntityRecord, EntityResult, EntityService, EntityServiceError};
use crate::runtime::condition::evaluate_group;
use crate::workflow::types::ConditionGroup;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;

/// SQLite entity store
#[derive(Debug, Clone)]
pub struct SqliteEntityService {
    pool: SqlitePool,
}

impl SqliteEntityService {
    /// Open (or create) the database file at `path` and ensure the schema
    pub async fn connect(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                anyhow::anyhow!("Failed to create entity database directory '{}': {}", parent.display(), e)
            })?;
        }

        tracing::info!("Opening entity database: {}", path.display());
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;

        let service = Self { pool };
        service.init_schema().await?;
        Ok(service)
    }

    /// Private in-memory database, one connection so every query sees it
    pub async fn in_memory() -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let service = Self { pool };
        service.init_schema().await?;
        Ok(service)
    }

    /// Create the entities table and its lookup index. Idempotent.
    pub async fn init_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entities (
                technical_id TEXT PRIMARY KEY,
                entity_model TEXT NOT NULL,
                entity_version TEXT NOT NULL,
                current_state TEXT,
                data JSON NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_entities_model
            ON entities(entity_model, entity_version)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn envelope_from_row(row: &SqliteRow) -> EntityResult<EntityEnvelope> {
        let data: String = row.try_get("data")?;
        let data = match serde_json::from_str(&data)? {
            serde_json::Value::Object(map) => map,
            other => {
                return Err(EntityServiceError::InvalidResponse(format!(
                    "stored entity data is not an object: {other}"
                )))
            }
        };

        Ok(EntityEnvelope {
            technical_id: row.try_get("technical_id")?,
            current_state: row.try_get("current_state")?,
            data,
        })
    }
}

#[async_trait]
impl EntityService for SqliteEntityService {
    async fn add_item(
        &self,
        _token: &str,
        entity_model: &str,
        entity_version: &str,
        data: &EntityRecord,
    ) -> EntityResult<String> {
        let technical_id = uuid::Uuid::new_v4().to_string();
        let data_json = serde_json::to_string(data)?;

        sqlx::query(
            r#"
            INSERT INTO entities (technical_id, entity_model, entity_version, data)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&technical_id)
        .bind(entity_model)
        .bind(entity_version)
        .bind(&data_json)
        .execute(&self.pool)
        .await?;

        Ok(technical_id)
    }

    async fn get_item(
        &self,
        _token: &str,
        entity_model: &str,
        entity_version: &str,
        technical_id: &str,
    ) -> EntityResult<EntityEnvelope> {
        let row = sqlx::query(
            r#"
            SELECT technical_id, current_state, data FROM entities
            WHERE technical_id = ? AND entity_model = ? AND entity_version = ?
            "#,
        )
        .bind(technical_id)
        .bind(entity_model)
        .bind(entity_version)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::envelope_from_row(&row),
            None => Err(EntityServiceError::not_found(entity_model, entity_version, technical_id)),
        }
    }

    async fn get_items(
        &self,
        _token: &str,
        entity_model: &str,
        entity_version: &str,
    ) -> EntityResult<Vec<EntityEnvelope>> {
        let rows = sqlx::query(
            r#"
            SELECT technical_id, current_state, data FROM entities
            WHERE entity_model = ? AND entity_version = ?
            ORDER BY rowid
            "#,
        )
        .bind(entity_model)
        .bind(entity_version)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::envelope_from_row).collect()
    }

    async fn get_items_by_condition(
        &self,
        token: &str,
        entity_model: &str,
        entity_version: &str,
        condition: &ConditionGroup,
    ) -> EntityResult<Vec<EntityEnvelope>> {
        let entities = self.get_items(token, entity_model, entity_version).await?;
        Ok(entities
            .into_iter()
            .filter(|entity| evaluate_group(condition, &entity.data))
            .collect())
    }

    async fn update_item(
        &self,
        _token: &str,
        entity_model: &str,
        entity_version: &str,
        technical_id: &str,
        data: &EntityRecord,
    ) -> EntityResult<()> {
        let data_json = serde_json::to_string(data)?;
        let result = sqlx::query(
            r#"
            UPDATE entities SET data = ?, updated_at = CURRENT_TIMESTAMP
            WHERE technical_id = ? AND entity_model = ? AND entity_version = ?
            "#,
        )
        .bind(&data_json)
        .bind(technical_id)
        .bind(entity_model)
        .bind(entity_version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EntityServiceError::not_found(entity_model, entity_version, technical_id));
        }
        Ok(())
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
        let result = sqlx::query(
            r#"
            UPDATE entities SET current_state = ?, updated_at = CURRENT_TIMESTAMP
            WHERE technical_id = ? AND entity_model = ? AND entity_version = ?
            "#,
        )
        .bind(state)
        .bind(technical_id)
        .bind(entity_model)
        .bind(entity_version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EntityServiceError::not_found(entity_model, entity_version, technical_id));
        }
        Ok(())
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
        let data_json = serde_json::to_string(data)?;
        let result = sqlx::query(
            r#"
            UPDATE entities SET data = ?, current_state = ?, updated_at = CURRENT_TIMESTAMP
            WHERE technical_id = ? AND entity_model = ? AND entity_version = ?
            "#,
        )
        .bind(&data_json)
        .bind(state)
        .bind(technical_id)
        .bind(entity_model)
        .bind(entity_version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EntityServiceError::not_found(entity_model, entity_version, technical_id));
        }
        Ok(())
    }

    async fn delete_item(
        &self,
        _token: &str,
        entity_model: &str,
        entity_version: &str,
        technical_id: &str,
    ) -> EntityResult<()> {
        let result = sqlx::query(
            "DELETE FROM entities WHERE technical_id = ? AND entity_model = ? AND entity_version = ?",
        )
        .bind(technical_id)
        .bind(entity_model)
        .bind(entity_version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EntityServiceError::not_found(entity_model, entity_version, technical_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::types::{GroupOperator, OperatorType, Predicate};
    use serde_json::json;

    fn record(value: serde_json::Value) -> EntityRecord {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn stores_data_and_state_pointer() {
        let service = SqliteEntityService::in_memory().await.unwrap();
        let id = service
            .add_item("t", "pet", "1000", &record(json!({"name": "Rex", "qty": 2})))
            .await
            .unwrap();

        service
            .update_state("t", "pet", "1000", &id, "available", Some("create"))
            .await
            .unwrap();

        let stored = service.get_item("t", "pet", "1000", &id).await.unwrap();
        assert_eq!(stored.technical_id, id);
        assert_eq!(stored.current_state.as_deref(), Some("available"));
        assert_eq!(stored.data, record(json!({"name": "Rex", "qty": 2})));

        let wrong_version = service.get_item("t", "pet", "2000", &id).await.unwrap_err();
        assert!(wrong_version.is_not_found());
    }

    #[tokio::test]
    async fn transition_writes_data_and_state_together() {
        let service = SqliteEntityService::in_memory().await.unwrap();
        let id = service
            .add_item("t", "pet", "1000", &record(json!({"name": "Rex"})))
            .await
            .unwrap();

        service
            .apply_transition("t", "pet", "1000", &id, &record(json!({"name": "Rex", "status": "created"})), "available", "create")
            .await
            .unwrap();
        let stored = service.get_item("t", "pet", "1000", &id).await.unwrap();
        assert_eq!(stored.current_state.as_deref(), Some("available"));
        assert_eq!(stored.data["status"], json!("created"));

        let err = service
            .apply_transition("t", "pet", "1000", "nope", &record(json!({})), "available", "create")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn lists_in_insertion_order_and_filters() {
        let service = SqliteEntityService::in_memory().await.unwrap();
        for qty in [3, 0, 7] {
            service
                .add_item("t", "pet", "1", &record(json!({"qty": qty})))
                .await
                .unwrap();
        }

        let all = service.get_items("t", "pet", "1").await.unwrap();
        let quantities: Vec<_> = all.iter().map(|e| e.data["qty"].clone()).collect();
        assert_eq!(quantities, vec![json!(3), json!(0), json!(7)]);

        let in_stock = ConditionGroup::new(
            GroupOperator::And,
            vec![Predicate::simple("qty", OperatorType::GreaterThan, json!(0))],
        );
        let found = service
            .get_items_by_condition("t", "pet", "1", &in_stock)
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn delete_reports_missing_rows() {
        let service = SqliteEntityService::in_memory().await.unwrap();
        let id = service.add_item("t", "pet", "1", &record(json!({}))).await.unwrap();

        service.delete_item("t", "pet", "1", &id).await.unwrap();
        assert!(service
            .delete_item("t", "pet", "1", &id)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn connect_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("entities.db");

        let service = SqliteEntityService::connect(&path).await.unwrap();
        service.add_item("t", "pet", "1", &record(json!({"a": 1}))).await.unwrap();

        assert!(path.exists());
    }
}
