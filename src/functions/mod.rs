//! Processor and criterion function registry
//!
//! Descriptors refer to business logic by name (`action.name`,
//! `condition.function.name`). The registry maps those names to typed trait
//! objects. It is populated once at startup, validated against every
//! descriptor before first use, and then shared read-only behind an `Arc`.

pub mod pets;

use crate::entity::{EntityKey, EntityRecord, EntityService};
use crate::runtime::locks::InstanceLocks;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Everything a processor may use besides the record itself
#[derive(Clone)]
pub struct ProcessorContext {
    /// Instance the transition is firing on
    pub key: EntityKey,
    /// Opaque auth token forwarded to the Entity Service
    pub token: String,
    /// Name of the firing transition
    pub transition: String,
    /// Entity Service for fetching or adding related entities
    pub entity_service: Arc<dyn EntityService>,
    /// Engine instance locks; hold a related entity's lock while mutating it
    pub locks: InstanceLocks,
}

impl fmt::Debug for ProcessorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorContext")
            .field("key", &self.key)
            .field("transition", &self.transition)
            .finish_non_exhaustive()
    }
}

/// Side-effecting business logic attached to a transition
///
/// Receives the record by value and returns it, possibly mutated. Returning an
/// error aborts the transition: neither the record nor the state pointer is
/// persisted.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(
        &self,
        ctx: &ProcessorContext,
        record: EntityRecord,
    ) -> anyhow::Result<EntityRecord>;
}

/// Named boolean predicate gating a transition
pub trait Criterion: Send + Sync {
    fn check(&self, record: &EntityRecord) -> bool;
}

impl<F> Criterion for F
where
    F: Fn(&EntityRecord) -> bool + Send + Sync,
{
    fn check(&self, record: &EntityRecord) -> bool {
        self(record)
    }
}

/// Adapter for processors that only transform the record
pub struct FnProcessor<F>(pub F);

#[async_trait]
impl<F> Processor for FnProcessor<F>
where
    F: Fn(EntityRecord) -> anyhow::Result<EntityRecord> + Send + Sync,
{
    async fn process(
        &self,
        _ctx: &ProcessorContext,
        record: EntityRecord,
    ) -> anyhow::Result<EntityRecord> {
        (self.0)(record)
    }
}

/// Which registry namespace a function name lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionRole {
    Processor,
    Criterion,
}

impl fmt::Display for FunctionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionRole::Processor => f.write_str("processor"),
            FunctionRole::Criterion => f.write_str("criterion"),
        }
    }
}

/// Name lookup used by the validator
pub trait FunctionCatalog {
    fn has_processor(&self, name: &str) -> bool;
    fn has_criterion(&self, name: &str) -> bool;
}

/// Plain name sets, for validating without live function objects
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegisteredNames {
    pub processors: HashSet<String>,
    pub criteria: HashSet<String>,
}

impl RegisteredNames {
    pub fn new<P, C>(processors: P, criteria: C) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self {
            processors: processors.into_iter().map(Into::into).collect(),
            criteria: criteria.into_iter().map(Into::into).collect(),
        }
    }
}

impl FunctionCatalog for RegisteredNames {
    fn has_processor(&self, name: &str) -> bool {
        self.processors.contains(name)
    }

    fn has_criterion(&self, name: &str) -> bool {
        self.criteria.contains(name)
    }
}

/// Name → function mapping shared by the evaluator and executor
#[derive(Default)]
pub struct FunctionRegistry {
    processors: HashMap<String, Arc<dyn Processor>>,
    criteria: HashMap<String, Arc<dyn Criterion>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a processor under `name`, replacing any previous one
    pub fn register_processor<P>(&mut self, name: impl Into<String>, processor: P) -> &mut Self
    where
        P: Processor + 'static,
    {
        let name = name.into();
        if self.processors.insert(name.clone(), Arc::new(processor)).is_some() {
            tracing::warn!("Processor '{}' registered twice, keeping the latest", name);
        }
        self
    }

    /// Register a record-only transformation as a processor
    pub fn register_fn_processor<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(EntityRecord) -> anyhow::Result<EntityRecord> + Send + Sync + 'static,
    {
        self.register_processor(name, FnProcessor(f))
    }

    /// Register a criterion under `name`, replacing any previous one
    pub fn register_criterion<C>(&mut self, name: impl Into<String>, criterion: C) -> &mut Self
    where
        C: Criterion + 'static,
    {
        let name = name.into();
        if self.criteria.insert(name.clone(), Arc::new(criterion)).is_some() {
            tracing::warn!("Criterion '{}' registered twice, keeping the latest", name);
        }
        self
    }

    pub fn processor(&self, name: &str) -> Option<Arc<dyn Processor>> {
        self.processors.get(name).cloned()
    }

    pub fn criterion(&self, name: &str) -> Option<Arc<dyn Criterion>> {
        self.criteria.get(name).cloned()
    }

    /// Snapshot of registered names
    pub fn names(&self) -> RegisteredNames {
        RegisteredNames {
            processors: self.processors.keys().cloned().collect(),
            criteria: self.criteria.keys().cloned().collect(),
        }
    }
}

impl FunctionCatalog for FunctionRegistry {
    fn has_processor(&self, name: &str) -> bool {
        self.processors.contains_key(name)
    }

    fn has_criterion(&self, name: &str) -> bool {
        self.criteria.contains_key(name)
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut processors: Vec<_> = self.processors.keys().collect();
        let mut criteria: Vec<_> = self.criteria.keys().collect();
        processors.sort();
        criteria.sort();
        f.debug_struct("FunctionRegistry")
            .field("processors", &processors)
            .field("criteria", &criteria)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn registers_processors_and_criteria_by_role() {
        let mut registry = FunctionRegistry::new();
        registry
            .register_fn_processor("mark_seen", |mut record| {
                record.insert("seen".into(), json!(true));
                Ok(record)
            })
            .register_criterion("has_owner", |record: &EntityRecord| {
                record.contains_key("owner")
            });

        assert!(registry.has_processor("mark_seen"));
        assert!(!registry.has_criterion("mark_seen"));
        assert!(registry.has_criterion("has_owner"));

        let criterion = registry.criterion("has_owner").unwrap();
        let mut record = EntityRecord::new();
        assert!(!criterion.check(&record));
        record.insert("owner".into(), json!("ann"));
        assert!(criterion.check(&record));

        let names = registry.names();
        assert_eq!(names, RegisteredNames::new(["mark_seen"], ["has_owner"]));
    }
}
