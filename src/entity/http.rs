//! REST client for the remote platform's entity API
//!
//! Endpoints (relative to the configured API base URL):
//! - `POST entity/JSON/{model}/{version}`: create, returns `[{"entityIds": [id]}]`
//! - `GET entity/{id}`: `{"data": {...}, "meta": {"state": ...}}`
//! - `GET entity/{model}/{version}`: list of the same shape
//! - `PUT entity/JSON/{id}/{transition}`: replace data and launch a transition
//!   (`update` for plain data changes); one call per workflow step
//! - `PUT platform-api/entity/transition`: launch a named transition without
//!   new data
//! - `DELETE entity/{id}`
//! - `POST search/snapshot/{model}/{version}` + polling: condition search

use crate::entity::{EntityEnvelope, EntityRecord, EntityResult, EntityService, EntityServiceError};
use crate::workflow::types::{ConditionGroup, Predicate};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde_json::{json, Value};
use std::time::{Duration, Instant};

/// Transition the platform uses for plain data updates
pub const UPDATE_TRANSITION: &str = "update";

/// Entity class the platform stores JSON entities under
pub const TREE_NODE_ENTITY_CLASS: &str = "com.cyoda.tdb.model.treenode.TreeNodeEntity";

const SNAPSHOT_POLL_INTERVAL: Duration = Duration::from_millis(300);

/// HTTP Entity Service adapter
#[derive(Debug, Clone)]
pub struct HttpEntityService {
    client: Client,
    base_url: String,
    search_timeout: Duration,
}

impl HttpEntityService {
    /// Build a client for `base_url` (e.g. `https://host/api`); every request
    /// is bounded by `request_timeout`.
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build entity service HTTP client: {}", e))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            search_timeout: request_timeout,
        })
    }

    fn request(&self, method: Method, path: &str, token: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path);
        tracing::debug!("Entity service request: {} {}", method, url);

        let builder = self
            .client
            .request(method, url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if token.is_empty() {
            builder
        } else {
            builder.bearer_auth(token)
        }
    }

    /// Send and decode the JSON body, mapping non-2xx statuses to `Remote`
    async fn send(&self, builder: RequestBuilder) -> EntityResult<Value> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(EntityServiceError::Remote {
                status: status.as_u16(),
                body,
            });
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }

    /// Translate a condition group into the platform's search request shape
    pub fn search_request(group: &ConditionGroup) -> Value {
        let conditions: Vec<Value> = group
            .parameters
            .iter()
            .map(|predicate| match predicate {
                Predicate::Simple(simple) => json!({
                    "type": "simple",
                    "jsonPath": normalize_search_path(&simple.json_path),
                    "operatorType": simple.operator_type.as_str(),
                    "value": simple.value,
                }),
                Predicate::Group(nested) => Self::search_request(nested),
            })
            .collect();

        json!({
            "type": "group",
            "operator": group.operator.as_str(),
            "conditions": conditions,
        })
    }

    /// Replace the entity data and launch `transition` in one request
    async fn put_via_transition(
        &self,
        token: &str,
        technical_id: &str,
        transition: &str,
        data: &EntityRecord,
    ) -> EntityResult<()> {
        let path = format!(
            "entity/JSON/{}/{}?transactional=true&waitForConsistencyAfter=true",
            technical_id, transition
        );
        self.send(self.request(Method::PUT, &path, token).json(data))
            .await?;
        Ok(())
    }

    async fn wait_for_snapshot(&self, token: &str, snapshot_id: &str) -> EntityResult<()> {
        let started = Instant::now();
        let path = format!("search/snapshot/{}/status", snapshot_id);

        loop {
            let status = self.send(self.request(Method::GET, &path, token)).await?;
            match status.get("snapshotStatus").and_then(Value::as_str) {
                Some("SUCCESSFUL") => return Ok(()),
                Some("RUNNING") => {}
                _ => {
                    return Err(EntityServiceError::InvalidResponse(format!(
                        "snapshot search {} failed: {}",
                        snapshot_id, status
                    )))
                }
            }

            if started.elapsed() > self.search_timeout {
                return Err(EntityServiceError::InvalidResponse(format!(
                    "snapshot search {} did not finish within {:?}",
                    snapshot_id, self.search_timeout
                )));
            }
            tokio::time::sleep(SNAPSHOT_POLL_INTERVAL).await;
        }
    }
}

fn normalize_search_path(path: &str) -> String {
    if path.starts_with('$') {
        path.to_string()
    } else {
        format!("$.{}", path)
    }
}

/// Decode `{"data": {...}, "meta": {"id": ..., "state": ...}}`
fn envelope_from_payload(payload: &Value, fallback_id: Option<&str>) -> EntityResult<EntityEnvelope> {
    let data = payload
        .get("data")
        .and_then(Value::as_object)
        .cloned()
        .ok_or_else(|| EntityServiceError::InvalidResponse(format!("entity payload without data: {payload}")))?;
    let meta = payload.get("meta");

    let technical_id = meta
        .and_then(|m| m.get("id"))
        .and_then(Value::as_str)
        .or(fallback_id)
        .ok_or_else(|| EntityServiceError::InvalidResponse(format!("entity payload without id: {payload}")))?
        .to_string();

    let current_state = meta
        .and_then(|m| m.get("state"))
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(EntityEnvelope {
        technical_id,
        current_state,
        data,
    })
}

/// First id of `[{"entityIds": [id, ...]}, ...]` or `{"entityIds": [...]}`
fn first_entity_id(result: &Value) -> Option<String> {
    let holder = match result {
        Value::Array(items) => items.first()?,
        other => other,
    };
    holder
        .get("entityIds")?
        .as_array()?
        .first()?
        .as_str()
        .map(str::to_string)
}

#[async_trait]
impl EntityService for HttpEntityService {
    async fn add_item(
        &self,
        token: &str,
        entity_model: &str,
        entity_version: &str,
        data: &EntityRecord,
    ) -> EntityResult<String> {
        let path = format!("entity/JSON/{}/{}", entity_model, entity_version);
        let result = self
            .send(self.request(Method::POST, &path, token).json(data))
            .await?;

        first_entity_id(&result).ok_or_else(|| {
            EntityServiceError::InvalidResponse(format!("create returned no entity id: {result}"))
        })
    }

    async fn get_item(
        &self,
        token: &str,
        entity_model: &str,
        entity_version: &str,
        technical_id: &str,
    ) -> EntityResult<EntityEnvelope> {
        let path = format!("entity/{}", technical_id);
        match self.send(self.request(Method::GET, &path, token)).await {
            Ok(payload) => envelope_from_payload(&payload, Some(technical_id)),
            Err(EntityServiceError::Remote { status: 404, .. }) => Err(
                EntityServiceError::not_found(entity_model, entity_version, technical_id),
            ),
            Err(e) => Err(e),
        }
    }

    async fn get_items(
        &self,
        token: &str,
        entity_model: &str,
        entity_version: &str,
    ) -> EntityResult<Vec<EntityEnvelope>> {
        let path = format!("entity/{}/{}", entity_model, entity_version);
        let payload = self.send(self.request(Method::GET, &path, token)).await?;

        match payload {
            Value::Array(items) => items
                .iter()
                .map(|item| envelope_from_payload(item, None))
                .collect(),
            Value::Null => Ok(Vec::new()),
            other => Err(EntityServiceError::InvalidResponse(format!(
                "entity list is not an array: {other}"
            ))),
        }
    }

    async fn get_items_by_condition(
        &self,
        token: &str,
        entity_model: &str,
        entity_version: &str,
        condition: &ConditionGroup,
    ) -> EntityResult<Vec<EntityEnvelope>> {
        let path = format!("search/snapshot/{}/{}", entity_model, entity_version);
        let snapshot = self
            .send(
                self.request(Method::POST, &path, token)
                    .json(&Self::search_request(condition)),
            )
            .await?;
        let snapshot_id = snapshot.as_str().ok_or_else(|| {
            EntityServiceError::InvalidResponse(format!("snapshot id is not a string: {snapshot}"))
        })?;

        self.wait_for_snapshot(token, snapshot_id).await?;

        let path = format!("search/snapshot/{}", snapshot_id);
        let page = self.send(self.request(Method::GET, &path, token)).await?;

        let total = page
            .pointer("/page/totalElements")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        if total == 0 {
            return Ok(Vec::new());
        }

        page.pointer("/_embedded/objectNodes")
            .and_then(Value::as_array)
            .map(|nodes| {
                nodes
                    .iter()
                    .map(|node| envelope_from_payload(node, None))
                    .collect()
            })
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn update_item(
        &self,
        token: &str,
        _entity_model: &str,
        _entity_version: &str,
        technical_id: &str,
        data: &EntityRecord,
    ) -> EntityResult<()> {
        self.put_via_transition(token, technical_id, UPDATE_TRANSITION, data)
            .await
    }

    /// The platform stores the data and moves the state in one transactional call.
    async fn apply_transition(
        &self,
        token: &str,
        _entity_model: &str,
        _entity_version: &str,
        technical_id: &str,
        data: &EntityRecord,
        _state: &str,
        transition: &str,
    ) -> EntityResult<()> {
        self.put_via_transition(token, technical_id, transition, data)
            .await
    }

    async fn update_state(
        &self,
        token: &str,
        _entity_model: &str,
        _entity_version: &str,
        technical_id: &str,
        state: &str,
        via_transition: Option<&str>,
    ) -> EntityResult<()> {
        // The platform places new entities in their initial state itself.
        let Some(transition) = via_transition else {
            tracing::debug!("Platform assigns initial state '{}' to {}", state, technical_id);
            return Ok(());
        };

        let builder = self
            .request(Method::PUT, "platform-api/entity/transition", token)
            .query(&[
                ("entityId", technical_id),
                ("entityClass", TREE_NODE_ENTITY_CLASS),
                ("transitionName", transition),
            ]);
        self.send(builder).await?;
        Ok(())
    }

    async fn delete_item(
        &self,
        token: &str,
        entity_model: &str,
        entity_version: &str,
        technical_id: &str,
    ) -> EntityResult<()> {
        let path = format!("entity/{}", technical_id);
        match self.send(self.request(Method::DELETE, &path, token)).await {
            Ok(_) => Ok(()),
            Err(EntityServiceError::Remote { status: 404, .. }) => Err(
                EntityServiceError::not_found(entity_model, entity_version, technical_id),
            ),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::types::{GroupOperator, OperatorType};
    use axum::extract::State;
    use std::sync::{Arc, Mutex};

    #[test]
    fn builds_nested_search_request() {
        let group = ConditionGroup::new(
            GroupOperator::Or,
            vec![
                Predicate::simple("status", OperatorType::IEquals, json!("available")),
                Predicate::Group(ConditionGroup::new(
                    GroupOperator::Not,
                    vec![Predicate::simple("$.owner", OperatorType::IsNull, Value::Null)],
                )),
            ],
        );

        assert_eq!(
            HttpEntityService::search_request(&group),
            json!({
                "type": "group",
                "operator": "OR",
                "conditions": [
                    {"type": "simple", "jsonPath": "$.status", "operatorType": "IEQUALS", "value": "available"},
                    {"type": "group", "operator": "NOT", "conditions": [
                        {"type": "simple", "jsonPath": "$.owner", "operatorType": "IS_NULL", "value": null}
                    ]}
                ]
            })
        );
    }

    #[test]
    fn decodes_entity_payloads() {
        let payload = json!({"data": {"name": "Rex"}, "meta": {"id": "abc", "state": "available"}});
        let envelope = envelope_from_payload(&payload, None).unwrap();
        assert_eq!(envelope.technical_id, "abc");
        assert_eq!(envelope.current_state.as_deref(), Some("available"));

        let bare = json!({"data": {"name": "Rex"}});
        assert_eq!(envelope_from_payload(&bare, Some("xyz")).unwrap().technical_id, "xyz");
        assert!(envelope_from_payload(&bare, None).is_err());
    }

    #[test]
    fn extracts_first_entity_id() {
        assert_eq!(
            first_entity_id(&json!([{"entityIds": ["id-1", "id-2"]}])),
            Some("id-1".to_string())
        );
        assert_eq!(first_entity_id(&json!({"entityIds": ["id-3"]})), Some("id-3".to_string()));
        assert_eq!(first_entity_id(&json!([])), None);
    }

    type Seen = Arc<Mutex<Vec<(String, String, Value)>>>;

    /// Local stand-in for the platform that records every request it gets
    async fn recording_platform() -> (String, Seen) {
        let seen: Seen = Arc::default();
        let app = axum::Router::new()
            .fallback(
                |State(seen): State<Seen>, method: axum::http::Method, uri: axum::http::Uri, body: String| async move {
                    let body = serde_json::from_str(&body).unwrap_or(Value::Null);
                    seen.lock().unwrap().push((method.to_string(), uri.to_string(), body));
                    ""
                },
            )
            .with_state(Arc::clone(&seen));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });
        (format!("http://{}", addr), seen)
    }

    #[tokio::test]
    async fn transition_step_is_one_put_with_the_record() {
        let (base_url, seen) = recording_platform().await;
        let service = HttpEntityService::new(base_url, Duration::from_secs(5)).unwrap();
        let data = json!({"petId": "p-1", "status": "approved"}).as_object().cloned().unwrap();

        service
            .apply_transition("tok", "adopt_request", "1000", "id-1", &data, "approved", "approve")
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let (method, uri, body) = &seen[0];
        assert_eq!(method, "PUT");
        assert_eq!(
            uri,
            "/entity/JSON/id-1/approve?transactional=true&waitForConsistencyAfter=true"
        );
        assert_eq!(body, &json!({"petId": "p-1", "status": "approved"}));
    }

    #[tokio::test]
    async fn plain_update_uses_the_update_transition() {
        let (base_url, seen) = recording_platform().await;
        let service = HttpEntityService::new(base_url, Duration::from_secs(5)).unwrap();
        let data = json!({"name": "Rex"}).as_object().cloned().unwrap();

        service.update_item("", "pet", "1000", "id-2", &data).await.unwrap();
        service
            .update_state("", "pet", "1000", "id-2", "available", None)
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].1.starts_with("/entity/JSON/id-2/update?"));
    }

    #[test]
    fn trims_trailing_slash_from_base_url() {
        let service = HttpEntityService::new("http://localhost:8082/api/", Duration::from_secs(1)).unwrap();
        assert_eq!(service.base_url, "http://localhost:8082/api");
    }
}
