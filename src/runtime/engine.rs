//! Workflow engine
//!
//! Drives entity instances through their workflow: assigns the initial state
//! on creation, fires requested transitions and then keeps firing eligible
//! AUTOMATIC transitions until the instance settles. Each applied step runs
//! the transition's processor and then writes the record and the new state
//! pointer together, so a failed write leaves the instance as it was.

use crate::config::Config;
use crate::entity::{EntityKey, EntityRecord, EntityService, EntityServiceError};
use crate::functions::{FunctionRegistry, FunctionRole, ProcessorContext};
use crate::runtime::evaluator::{TransitionEvaluator, TransitionFilter};
use crate::runtime::executor::ActionExecutor;
use crate::runtime::locks::InstanceLocks;
use crate::workflow::registry::{CompiledWorkflow, WorkflowRegistry};
use crate::workflow::types::{Transition, TransitionKind};
use serde::Serialize;
use std::sync::Arc;

/// Errors raised while evaluating or firing transitions
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no workflow registered for entity model '{entity_model}'")]
    WorkflowNotFound { entity_model: String },

    #[error("state '{state}' is not defined in workflow '{workflow}'")]
    UnknownState { workflow: String, state: String },

    #[error("state '{state}' has no transition named '{transition}'")]
    UnknownTransition { state: String, transition: String },

    #[error("transition '{transition}' is not eligible for {key}")]
    TransitionNotEligible { transition: String, key: EntityKey },

    #[error("{role} '{name}' is not registered")]
    UnresolvedFunction { role: FunctionRole, name: String },

    #[error("processor '{processor}' failed for {key}: {source}")]
    ProcessorFailed {
        processor: String,
        key: EntityKey,
        #[source]
        source: anyhow::Error,
    },

    #[error("{key} exceeded {limit} automatic transitions without settling")]
    StepLimitExceeded { key: EntityKey, limit: usize },

    #[error(transparent)]
    EntityService(#[from] EntityServiceError),
}

/// Engine tuning knobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound on automatic transitions fired after one event
    pub max_automatic_steps: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_automatic_steps: 64,
        }
    }
}

impl From<&Config> for EngineConfig {
    fn from(config: &Config) -> Self {
        Self {
            max_automatic_steps: config.max_automatic_steps,
        }
    }
}

/// One transition that was applied to an instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedTransition {
    pub name: String,
    pub from: String,
    pub to: String,
}

/// Result of an engine operation on one instance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionOutcome {
    pub key: EntityKey,
    /// State before the operation; `None` for a freshly created entity
    pub previous_state: Option<String>,
    pub current_state: String,
    /// Transitions fired, in order
    pub applied: Vec<AppliedTransition>,
    /// Record as persisted after the last step
    pub record: EntityRecord,
}

impl TransitionOutcome {
    /// Whether any transition fired
    pub fn fired(&self) -> bool {
        !self.applied.is_empty()
    }
}

/// A transition of the current state with its eligibility
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionSummary {
    pub name: String,
    pub next: String,
    pub kind: TransitionKind,
    pub eligible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Runs workflows for entity instances
pub struct WorkflowEngine {
    workflows: Arc<WorkflowRegistry>,
    evaluator: TransitionEvaluator,
    executor: ActionExecutor,
    entity_service: Arc<dyn EntityService>,
    config: EngineConfig,
    locks: InstanceLocks,
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("workflows", &self.workflows)
            .field("config", &self.config)
            .field("active_instances", &self.locks.active())
            .finish_non_exhaustive()
    }
}

impl WorkflowEngine {
    pub fn new(
        workflows: Arc<WorkflowRegistry>,
        functions: Arc<FunctionRegistry>,
        entity_service: Arc<dyn EntityService>,
        config: EngineConfig,
    ) -> Self {
        Self {
            workflows,
            evaluator: TransitionEvaluator::new(functions.clone()),
            executor: ActionExecutor::new(functions),
            entity_service,
            config,
            locks: InstanceLocks::new(),
        }
    }

    pub fn entity_service(&self) -> &Arc<dyn EntityService> {
        &self.entity_service
    }

    pub fn workflows(&self) -> &Arc<WorkflowRegistry> {
        &self.workflows
    }

    fn workflow(&self, entity_model: &str) -> Result<Arc<CompiledWorkflow>, EngineError> {
        self.workflows
            .get(entity_model)
            .ok_or_else(|| EngineError::WorkflowNotFound {
                entity_model: entity_model.to_string(),
            })
    }

    /// Store a new entity, place it in the initial state and run automatic
    /// transitions from there
    pub async fn create_entity(
        &self,
        token: &str,
        entity_model: &str,
        entity_version: &str,
        data: EntityRecord,
    ) -> Result<TransitionOutcome, EngineError> {
        let workflow = self.workflow(entity_model)?;
        let initial_state = workflow.descriptor.initial_state.clone();

        let technical_id = self
            .entity_service
            .add_item(token, entity_model, entity_version, &data)
            .await?;
        let key = EntityKey::new(entity_model, entity_version, technical_id);
        tracing::info!("🆕 Created {} in state '{}'", key, initial_state);

        let _guard = self.locks.acquire(&key).await;
        self.entity_service
            .update_state(token, entity_model, entity_version, &key.technical_id, &initial_state, None)
            .await?;

        let mut applied = Vec::new();
        let (current_state, record) = self
            .run_automatic(token, &key, &workflow, initial_state, data, &mut applied)
            .await?;

        Ok(TransitionOutcome {
            key,
            previous_state: None,
            current_state,
            applied,
            record,
        })
    }

    /// Evaluate automatic transitions from the instance's current state
    pub async fn process_event(&self, token: &str, key: &EntityKey) -> Result<TransitionOutcome, EngineError> {
        let workflow = self.workflow(&key.entity_model)?;
        let _guard = self.locks.acquire(key).await;

        let (state, record) = self.load_instance(token, key, &workflow).await?;
        tracing::info!("📨 Processing event for {} in state '{}'", key, state);

        let mut applied = Vec::new();
        let (current_state, record) = self
            .run_automatic(token, key, &workflow, state.clone(), record, &mut applied)
            .await?;

        Ok(TransitionOutcome {
            key: key.clone(),
            previous_state: Some(state),
            current_state,
            applied,
            record,
        })
    }

    /// Fire the named transition of the current state, then run automatic
    /// transitions from the state it leads to
    pub async fn trigger_transition(
        &self,
        token: &str,
        key: &EntityKey,
        transition_name: &str,
    ) -> Result<TransitionOutcome, EngineError> {
        let workflow = self.workflow(&key.entity_model)?;
        let _guard = self.locks.acquire(key).await;

        let (state, record) = self.load_instance(token, key, &workflow).await?;
        let transition = workflow
            .descriptor
            .state(&state)
            .ok_or_else(|| EngineError::UnknownState {
                workflow: workflow.descriptor.workflow_name.clone(),
                state: state.clone(),
            })?
            .transitions
            .get(transition_name)
            .ok_or_else(|| EngineError::UnknownTransition {
                state: state.clone(),
                transition: transition_name.to_string(),
            })?;

        if !self.evaluator.is_eligible(transition, &record)? {
            tracing::warn!("🚫 Transition '{}' not eligible for {}", transition_name, key);
            return Err(EngineError::TransitionNotEligible {
                transition: transition_name.to_string(),
                key: key.clone(),
            });
        }

        let mut applied = Vec::new();
        let record = self
            .apply(token, key, &state, transition_name, transition, record, &mut applied)
            .await?;
        let (current_state, record) = self
            .run_automatic(token, key, &workflow, transition.next.clone(), record, &mut applied)
            .await?;

        Ok(TransitionOutcome {
            key: key.clone(),
            previous_state: Some(state),
            current_state,
            applied,
            record,
        })
    }

    /// Transitions leaving the instance's current state, with eligibility
    pub async fn available_transitions(
        &self,
        token: &str,
        key: &EntityKey,
    ) -> Result<Vec<TransitionSummary>, EngineError> {
        let workflow = self.workflow(&key.entity_model)?;
        let envelope = self
            .entity_service
            .get_item(token, &key.entity_model, &key.entity_version, &key.technical_id)
            .await?;
        let state_name = envelope
            .current_state
            .unwrap_or_else(|| workflow.descriptor.initial_state.clone());

        let state = workflow
            .descriptor
            .state(&state_name)
            .ok_or_else(|| EngineError::UnknownState {
                workflow: workflow.descriptor.workflow_name.clone(),
                state: state_name.clone(),
            })?;

        state
            .transitions
            .iter()
            .map(|(name, transition)| -> Result<TransitionSummary, EngineError> {
                Ok(TransitionSummary {
                    name: name.to_string(),
                    next: transition.next.clone(),
                    kind: transition.kind,
                    eligible: self.evaluator.is_eligible(transition, &envelope.data)?,
                    action: transition.action.as_ref().map(|a| a.name.clone()),
                    description: transition.description.clone(),
                })
            })
            .collect()
    }

    /// Current state and record; instances without a state pointer are put
    /// into the initial state first
    async fn load_instance(
        &self,
        token: &str,
        key: &EntityKey,
        workflow: &CompiledWorkflow,
    ) -> Result<(String, EntityRecord), EngineError> {
        let envelope = self
            .entity_service
            .get_item(token, &key.entity_model, &key.entity_version, &key.technical_id)
            .await?;

        let state = match envelope.current_state {
            Some(state) => state,
            None => {
                let initial = workflow.descriptor.initial_state.clone();
                tracing::info!("📍 {} has no state, assigning '{}'", key, initial);
                self.entity_service
                    .update_state(token, &key.entity_model, &key.entity_version, &key.technical_id, &initial, None)
                    .await?;
                initial
            }
        };

        if workflow.descriptor.state(&state).is_none() {
            return Err(EngineError::UnknownState {
                workflow: workflow.descriptor.workflow_name.clone(),
                state,
            });
        }
        Ok((state, envelope.data))
    }

    /// Fire eligible AUTOMATIC transitions until none fires or a terminal
    /// state is reached
    async fn run_automatic(
        &self,
        token: &str,
        key: &EntityKey,
        workflow: &CompiledWorkflow,
        mut state: String,
        mut record: EntityRecord,
        applied: &mut Vec<AppliedTransition>,
    ) -> Result<(String, EntityRecord), EngineError> {
        let descriptor = &workflow.descriptor;
        let mut steps = 0;

        loop {
            let current = descriptor.state(&state).ok_or_else(|| EngineError::UnknownState {
                workflow: descriptor.workflow_name.clone(),
                state: state.clone(),
            })?;
            if current.is_terminal() {
                tracing::debug!("🏁 {} reached terminal state '{}'", key, state);
                break;
            }

            let Some(selected) = self
                .evaluator
                .select_transition(current, &record, TransitionFilter::Automatic)?
            else {
                tracing::debug!("⏸️ No automatic transition fires for {} in '{}'", key, state);
                break;
            };

            if steps >= self.config.max_automatic_steps {
                tracing::error!(
                    "🔁 {} exceeded {} automatic transitions in '{}'",
                    key,
                    self.config.max_automatic_steps,
                    state
                );
                return Err(EngineError::StepLimitExceeded {
                    key: key.clone(),
                    limit: self.config.max_automatic_steps,
                });
            }

            record = self
                .apply(token, key, &state, selected.name, selected.transition, record, applied)
                .await?;
            state = selected.next().to_string();
            steps += 1;
        }

        Ok((state, record))
    }

    /// Run the processor, then persist the record and the new state in one write
    #[allow(clippy::too_many_arguments)]
    async fn apply(
        &self,
        token: &str,
        key: &EntityKey,
        from: &str,
        name: &str,
        transition: &Transition,
        record: EntityRecord,
        applied: &mut Vec<AppliedTransition>,
    ) -> Result<EntityRecord, EngineError> {
        let record = match &transition.action {
            Some(action) => {
                let ctx = ProcessorContext {
                    key: key.clone(),
                    token: token.to_string(),
                    transition: name.to_string(),
                    entity_service: self.entity_service.clone(),
                    locks: self.locks.clone(),
                };
                self.executor.invoke(&action.name, &ctx, record).await?
            }
            None => record,
        };

        self.entity_service
            .apply_transition(
                token,
                &key.entity_model,
                &key.entity_version,
                &key.technical_id,
                &record,
                &transition.next,
                name,
            )
            .await?;

        tracing::info!("➡️ {}: '{}' --{}--> '{}'", key, from, name, transition.next);
        applied.push(AppliedTransition {
            name: name.to_string(),
            from: from.to_string(),
            to: transition.next.clone(),
        });
        Ok(record)
    }
}
