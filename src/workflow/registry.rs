//! Hot-reload workflow registry using ArcSwap
//!
//! Holds the validated descriptor of every entity model. Each update swaps the
//! entire map pointer, so readers never block and in-flight evaluations keep
//! the descriptor they started with.

use crate::functions::FunctionRegistry;
use crate::workflow::graph::{GraphAnalysis, WorkflowGraph};
use crate::workflow::storage::WorkflowStorage;
use crate::workflow::types::WorkflowDescriptor;
use crate::workflow::validator::{validate, ValidationError};
use arc_swap::ArcSwap;
use std::{collections::HashMap, sync::Arc};

/// Errors raised while registering or reloading workflows
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("workflow for '{entity_model}' failed validation with {} error(s)", .errors.len())]
    Invalid {
        entity_model: String,
        errors: Vec<ValidationError>,
    },

    #[error("no workflow stored for entity model '{0}'")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// A validated descriptor ready for evaluation
#[derive(Debug, Clone)]
pub struct CompiledWorkflow {
    /// Entity model this workflow drives
    pub entity_model: String,

    /// Immutable descriptor shared by every evaluation
    pub descriptor: Arc<WorkflowDescriptor>,

    /// Graph facts computed once at registration
    pub analysis: GraphAnalysis,
}

/// Lock-free workflow registry for hot-reload capabilities
///
/// Keyed by entity model. Storage is optional so the registry can also be
/// used purely in memory.
#[derive(Debug)]
pub struct WorkflowRegistry {
    /// Atomic pointer to the entity_model -> workflow map
    workflows: ArcSwap<HashMap<String, Arc<CompiledWorkflow>>>,

    /// Persistent storage for register/reload/remove
    storage: Option<WorkflowStorage>,

    /// Names descriptors are validated against
    functions: Arc<FunctionRegistry>,
}

impl WorkflowRegistry {
    /// In-memory registry without persistence
    pub fn new(functions: Arc<FunctionRegistry>) -> Self {
        Self {
            workflows: ArcSwap::new(Arc::new(HashMap::new())),
            storage: None,
            functions,
        }
    }

    /// Registry backed by descriptor files
    pub fn with_storage(storage: WorkflowStorage, functions: Arc<FunctionRegistry>) -> Self {
        Self {
            storage: Some(storage),
            ..Self::new(functions)
        }
    }

    /// Initialize registry by loading all workflows from storage
    ///
    /// Every stored descriptor must validate; one invalid descriptor fails
    /// startup and leaves the registry untouched.
    pub async fn init_from_storage(&self) -> Result<usize, RegistryError> {
        let Some(storage) = &self.storage else {
            return Ok(0);
        };

        let stored = storage.load_all().await?;
        let mut compiled = HashMap::with_capacity(stored.len());
        for (entity_model, descriptor) in stored {
            let workflow = self.compile(&entity_model, descriptor)?;
            compiled.insert(entity_model, Arc::new(workflow));
        }

        let count = compiled.len();
        self.workflows.store(Arc::new(compiled));
        tracing::info!("📚 Initialized workflow registry with {} workflows", count);
        Ok(count)
    }

    /// Validate and install without touching storage
    pub fn install(
        &self,
        entity_model: &str,
        descriptor: WorkflowDescriptor,
    ) -> Result<Arc<CompiledWorkflow>, RegistryError> {
        let compiled = Arc::new(self.compile(entity_model, descriptor)?);
        self.swap_in(entity_model, compiled.clone());
        Ok(compiled)
    }

    /// Validate, persist and install a descriptor
    ///
    /// Nothing is written when validation fails.
    pub async fn register(
        &self,
        entity_model: &str,
        descriptor: WorkflowDescriptor,
    ) -> Result<Arc<CompiledWorkflow>, RegistryError> {
        let compiled = Arc::new(self.compile(entity_model, descriptor)?);
        if let Some(storage) = &self.storage {
            storage.save(entity_model, &compiled.descriptor).await?;
        }
        self.swap_in(entity_model, compiled.clone());
        Ok(compiled)
    }

    fn swap_in(&self, entity_model: &str, compiled: Arc<CompiledWorkflow>) {
        self.workflows.rcu(|current| {
            let mut next = (**current).clone();
            next.insert(entity_model.to_string(), compiled.clone());
            next
        });
        tracing::info!("🔄 Installed workflow for '{}'", entity_model);
    }

    /// Re-read one descriptor from storage and swap it in
    pub async fn reload(&self, entity_model: &str) -> Result<Arc<CompiledWorkflow>, RegistryError> {
        let storage = self
            .storage
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Workflow registry has no storage to reload from"))?;

        let descriptor = storage
            .load(entity_model)
            .await?
            .ok_or_else(|| RegistryError::NotFound(entity_model.to_string()))?;

        let compiled = self.install(entity_model, descriptor)?;
        tracing::info!("♻️ Hot-reloaded workflow: {}", entity_model);
        Ok(compiled)
    }

    /// Remove a workflow from the registry and from storage
    ///
    /// Returns whether anything was removed.
    pub async fn remove(&self, entity_model: &str) -> Result<bool, RegistryError> {
        let deleted = match &self.storage {
            Some(storage) => storage.delete(entity_model).await?,
            None => false,
        };

        let mut removed = false;
        self.workflows.rcu(|current| {
            let mut next = (**current).clone();
            removed = next.remove(entity_model).is_some();
            next
        });

        if removed {
            tracing::info!("🗑️ Removed workflow from registry: {}", entity_model);
        }
        Ok(removed || deleted)
    }

    /// Get a workflow by entity model (lock-free read)
    pub fn get(&self, entity_model: &str) -> Option<Arc<CompiledWorkflow>> {
        self.workflows.load().get(entity_model).cloned()
    }

    /// All registered workflows, sorted by entity model
    pub fn list(&self) -> Vec<Arc<CompiledWorkflow>> {
        let mut workflows: Vec<_> = self.workflows.load().values().cloned().collect();
        workflows.sort_by(|a, b| a.entity_model.cmp(&b.entity_model));
        workflows
    }

    /// Validate a descriptor against the registered functions without installing it
    pub fn check(&self, descriptor: &WorkflowDescriptor) -> Vec<ValidationError> {
        validate(descriptor, self.functions.as_ref())
    }

    fn compile(&self, entity_model: &str, descriptor: WorkflowDescriptor) -> Result<CompiledWorkflow, RegistryError> {
        let errors = self.check(&descriptor);
        if !errors.is_empty() {
            return Err(Self::rejected(entity_model, errors));
        }

        let graph = WorkflowGraph::build(&descriptor);
        let analysis = graph.analyze();
        tracing::debug!(
            "📊 '{}': {} states, {} transitions, terminal {:?}",
            entity_model,
            graph.state_count(),
            graph.transition_count(),
            analysis.terminal_states
        );
        if !analysis.unreachable_states.is_empty() {
            tracing::warn!(
                "⚠️ Workflow '{}' has unreachable states: {:?}",
                entity_model,
                analysis.unreachable_states
            );
        }
        if analysis.has_cycles {
            tracing::info!("🔁 Workflow '{}' contains cycles through {:?}", entity_model, analysis.cyclic_states);
        }

        Ok(CompiledWorkflow {
            entity_model: entity_model.to_string(),
            descriptor: Arc::new(descriptor),
            analysis,
        })
    }

    fn rejected(entity_model: &str, errors: Vec<ValidationError>) -> RegistryError {
        for error in &errors {
            tracing::warn!("❌ Workflow '{}': {}", entity_model, error);
        }
        RegistryError::Invalid {
            entity_model: entity_model.to_string(),
            errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityRecord;

    fn functions() -> Arc<FunctionRegistry> {
        let mut functions = FunctionRegistry::new();
        functions
            .register_fn_processor("process_create_pet", Ok)
            .register_criterion("is_available", |_: &EntityRecord| true);
        Arc::new(functions)
    }

    fn pet_workflow(action: &str) -> WorkflowDescriptor {
        WorkflowDescriptor::from_json(&format!(
            r#"{{
                "workflow_name": "pet",
                "initial_state": "none",
                "states": {{
                    "none": {{"transitions": {{"create": {{"next": "available", "action": {{"name": "{action}"}}}}}}}},
                    "available": {{}}
                }}
            }}"#
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn register_persists_and_reload_picks_up_edits() {
        let dir = tempfile::tempdir().unwrap();
        let storage = WorkflowStorage::new(dir.path());
        let registry = WorkflowRegistry::with_storage(storage.clone(), functions());

        registry.register("pet", pet_workflow("process_create_pet")).await.unwrap();
        assert!(storage.load("pet").await.unwrap().is_some());
        assert_eq!(registry.get("pet").unwrap().analysis.terminal_states, vec!["available"]);

        let mut edited = pet_workflow("process_create_pet");
        edited.description = Some("edited on disk".into());
        storage.save("pet", &edited).await.unwrap();
        registry.reload("pet").await.unwrap();
        assert_eq!(
            registry.get("pet").unwrap().descriptor.description.as_deref(),
            Some("edited on disk")
        );

        let fresh = WorkflowRegistry::with_storage(storage, functions());
        assert_eq!(fresh.init_from_storage().await.unwrap(), 1);
        assert_eq!(fresh.list().len(), 1);
    }

    #[tokio::test]
    async fn invalid_descriptor_is_rejected_and_not_stored() {
        let dir = tempfile::tempdir().unwrap();
        let storage = WorkflowStorage::new(dir.path());
        let registry = WorkflowRegistry::with_storage(storage.clone(), functions());

        let err = registry
            .register("pet", pet_workflow("process_missing"))
            .await
            .unwrap_err();
        match err {
            RegistryError::Invalid { errors, .. } => assert_eq!(errors.len(), 1),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(registry.get("pet").is_none());
        assert!(storage.load("pet").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invalid_stored_descriptor_fails_startup() {
        let dir = tempfile::tempdir().unwrap();
        let storage = WorkflowStorage::new(dir.path());
        storage.save("pet", &pet_workflow("process_missing")).await.unwrap();

        let registry = WorkflowRegistry::with_storage(storage, functions());
        assert!(matches!(
            registry.init_from_storage().await,
            Err(RegistryError::Invalid { .. })
        ));
    }

    #[tokio::test]
    async fn remove_and_missing_reload() {
        let dir = tempfile::tempdir().unwrap();
        let registry = WorkflowRegistry::with_storage(WorkflowStorage::new(dir.path()), functions());

        registry.register("pet", pet_workflow("process_create_pet")).await.unwrap();
        assert!(registry.remove("pet").await.unwrap());
        assert!(!registry.remove("pet").await.unwrap());
        assert!(registry.get("pet").is_none());
        assert!(matches!(
            registry.reload("pet").await,
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn in_memory_install_and_list() {
        let registry = WorkflowRegistry::new(functions());
        registry.install("pet", pet_workflow("process_create_pet")).unwrap();
        registry.install("cat", pet_workflow("process_create_pet")).unwrap();

        let models: Vec<_> = registry.list().iter().map(|w| w.entity_model.clone()).collect();
        assert_eq!(models, vec!["cat", "pet"]);
    }
}
