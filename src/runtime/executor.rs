//! Processor invocation
//!
//! Resolves a transition's `action` name in the function registry and runs it
//! against the entity record, timing and logging the call.

use crate::entity::EntityRecord;
use crate::functions::{FunctionRegistry, FunctionRole, ProcessorContext};
use crate::runtime::engine::EngineError;
use std::sync::Arc;

/// Runs registered processors on behalf of the engine
#[derive(Debug, Clone)]
pub struct ActionExecutor {
    functions: Arc<FunctionRegistry>,
}

impl ActionExecutor {
    pub fn new(functions: Arc<FunctionRegistry>) -> Self {
        Self { functions }
    }

    /// Invoke processor `name` with the record and return the processed record
    ///
    /// A processor error is wrapped in [`EngineError::ProcessorFailed`]; the
    /// caller must not persist anything in that case.
    pub async fn invoke(
        &self,
        name: &str,
        ctx: &ProcessorContext,
        record: EntityRecord,
    ) -> Result<EntityRecord, EngineError> {
        let processor = self
            .functions
            .processor(name)
            .ok_or_else(|| EngineError::UnresolvedFunction {
                role: FunctionRole::Processor,
                name: name.to_string(),
            })?;

        tracing::info!("⚙️ Running processor '{}' for {} ({})", name, ctx.key, ctx.transition);
        tracing::debug!(
            "📥 Processor input: {}",
            serde_json::to_string(&record).unwrap_or_else(|_| "invalid_json".to_string())
        );

        let start_time = std::time::Instant::now();
        let result = processor.process(ctx, record).await;
        let duration = start_time.elapsed();

        match result {
            Ok(record) => {
                tracing::info!("✅ Processor '{}' completed in {:?}", name, duration);
                tracing::debug!(
                    "📤 Processor output: {}",
                    serde_json::to_string(&record).unwrap_or_else(|_| "invalid_json".to_string())
                );
                Ok(record)
            }
            Err(source) => {
                tracing::error!("❌ Processor '{}' failed in {:?} - Error: {:#}", name, duration, source);
                Err(EngineError::ProcessorFailed {
                    processor: name.to_string(),
                    key: ctx.key.clone(),
                    source,
                })
            }
        }
    }
}
