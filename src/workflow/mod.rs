//! Workflow Management Layer
//!
//! This module handles workflow descriptors, their validation, persistence
//! and hot-reload registry. It provides:
//! - Type definitions (WorkflowDescriptor, State, Transition, Condition)
//! - Structural validation with precise error locations
//! - petgraph-based reachability and cycle analysis
//! - File-based descriptor storage
//! - Lock-free hot-reload registry using ArcSwap

// Insertion-ordered name -> value maps used for states and transitions
pub mod ordered;

// Core descriptor type definitions
pub mod types;

// Structural validation of descriptors
pub mod validator;

// State graph analysis
pub mod graph;

// Descriptor files on disk
pub mod storage;

// Hot-reload registry using ArcSwap for zero-downtime updates
pub mod registry;

// Re-export commonly used types
pub use registry::{CompiledWorkflow, WorkflowRegistry};
pub use types::{Condition, ConditionGroup, State, Transition, WorkflowDescriptor};
pub use validator::{validate, ValidationError};
