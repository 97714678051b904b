//! File-based persistence for workflow descriptors
//!
//! Each entity model owns one directory under the storage root holding its
//! descriptor: `<root>/<entity_model>/workflow.json`.

use crate::workflow::types::WorkflowDescriptor;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Descriptor file name inside each model directory
pub const DESCRIPTOR_FILE: &str = "workflow.json";

/// Directory-backed descriptor storage
#[derive(Debug, Clone)]
pub struct WorkflowStorage {
    /// Directory holding one sub-directory per entity model
    root: PathBuf,
}

impl WorkflowStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the storage root if missing. Safe to call multiple times.
    pub async fn init(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("Failed to create workflow directory '{}'", self.root.display()))
    }

    fn descriptor_path(&self, entity_model: &str) -> Result<PathBuf> {
        if !is_safe_model_name(entity_model) {
            anyhow::bail!("Invalid entity model name: '{}'", entity_model);
        }
        Ok(self.root.join(entity_model).join(DESCRIPTOR_FILE))
    }

    /// Write (create or replace) the descriptor of `entity_model`
    pub async fn save(&self, entity_model: &str, descriptor: &WorkflowDescriptor) -> Result<()> {
        let path = self.descriptor_path(entity_model)?;
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        let text = descriptor.to_json_pretty()?;
        tokio::fs::write(&path, text)
            .await
            .with_context(|| format!("Failed to write '{}'", path.display()))?;

        tracing::debug!("Saved workflow for '{}' to {}", entity_model, path.display());
        Ok(())
    }

    /// Read the descriptor of `entity_model`, `None` when no file exists
    pub async fn load(&self, entity_model: &str) -> Result<Option<WorkflowDescriptor>> {
        let path = self.descriptor_path(entity_model)?;
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Failed to read '{}'", path.display())),
        };

        let descriptor = WorkflowDescriptor::from_json(&text)
            .with_context(|| format!("Invalid workflow descriptor in '{}'", path.display()))?;
        Ok(Some(descriptor))
    }

    /// Entity models that have a descriptor file, sorted by name
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to list '{}'", self.root.display()))
            }
        };

        let mut models = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if is_safe_model_name(&name) && entry.path().join(DESCRIPTOR_FILE).is_file() {
                models.push(name);
            }
        }

        models.sort();
        Ok(models)
    }

    /// Load every stored descriptor for registry initialization
    pub async fn load_all(&self) -> Result<HashMap<String, WorkflowDescriptor>> {
        let mut descriptors = HashMap::new();
        for model in self.list_models().await? {
            if let Some(descriptor) = self.load(&model).await? {
                descriptors.insert(model, descriptor);
            }
        }
        Ok(descriptors)
    }

    /// Delete the descriptor of `entity_model`; `false` when there was none
    pub async fn delete(&self, entity_model: &str) -> Result<bool> {
        let path = self.descriptor_path(entity_model)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e).with_context(|| format!("Failed to delete '{}'", path.display())),
        }

        if let Some(dir) = path.parent() {
            // Leave the directory alone if anything else lives in it.
            let _ = tokio::fs::remove_dir(dir).await;
        }
        Ok(true)
    }
}

/// Model names double as directory names
pub fn is_safe_model_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
