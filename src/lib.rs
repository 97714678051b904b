//! entityflow: workflow descriptor validator and interpreter
//!
//! Entity lifecycles are described by JSON workflow descriptors: finite state
//! machines whose transitions carry optional criteria and processors. This
//! library validates descriptors, keeps them in a hot-reload registry, and
//! drives entity instances through them against a pluggable Entity Service.

// Core configuration and setup
pub mod config;

// Entity Service trait and its memory, SQLite and HTTP adapters
pub mod entity;

// Named processors and criteria referenced by descriptors
pub mod functions;

// Descriptor types, validation, graph analysis, storage and registry
pub mod workflow;

// Condition evaluation, transition selection and the workflow engine
pub mod runtime;

// HTTP API layer - REST endpoints for workflows and entities
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use entity::{EntityEnvelope, EntityKey, EntityRecord, EntityService};
pub use functions::FunctionRegistry;
pub use runtime::{EngineError, TransitionOutcome, WorkflowEngine};
pub use server::start_server;
pub use workflow::{ValidationError, WorkflowDescriptor, WorkflowRegistry};
