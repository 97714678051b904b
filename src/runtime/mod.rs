//! Runtime Workflow Engine
//!
//! This module interprets validated workflow descriptors for entity instances.
//! It handles:
//! - Evaluating condition groups against entity records
//! - Selecting the first eligible transition of a state
//! - Invoking processors attached to transitions
//! - Persisting state changes with per-instance serialization

// JSONPath condition evaluation
pub mod condition;

// Transition eligibility and selection
pub mod evaluator;

// Processor invocation
pub mod executor;

// Per-instance async locks
pub mod locks;

// Workflow engine driving entity instances
pub mod engine;

// Re-export main types
pub use engine::{EngineConfig, EngineError, TransitionOutcome, WorkflowEngine};
pub use evaluator::TransitionEvaluator;
pub use executor::ActionExecutor;
pub use locks::InstanceLocks;
