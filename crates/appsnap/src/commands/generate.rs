//! Content generator backed by a JSON file of project items.

use appsnap_core::{ContentGenerator, GeneratorError, ProjectItem};
use async_trait::async_trait;
use std::path::PathBuf;

/// Replays items written by an external generator.
pub struct ItemsFileGenerator {
    path: PathBuf,
}

impl ItemsFileGenerator {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl ContentGenerator for ItemsFileGenerator {
    async fn generate(&self, _task: &str) -> Result<Vec<ProjectItem>, GeneratorError> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            GeneratorError::Fatal(format!("cannot read {}: {e}", self.path.display()))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            GeneratorError::Fatal(format!("invalid items in {}: {e}", self.path.display()))
        })
    }
}
