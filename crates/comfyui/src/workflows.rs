//! Named workflow storage over a directory of JSON files.
//!
//! Workflows are externally authored ComfyUI graphs, stored one per
//! file as `<name>.json`. Loading returns a fresh value each time, so
//! callers can mutate their copy freely without aliasing the stored
//! graph.

use std::path::{Path, PathBuf};

/// Errors from workflow storage operations.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowStoreError {
    #[error("Workflow '{0}' not found")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid workflow JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Directory-backed store of named workflow graphs.
pub struct WorkflowStore {
    dir: PathBuf,
}

impl WorkflowStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the workflow files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Names of all stored workflows, sorted. A missing directory is an
    /// empty store, not an error.
    pub async fn list(&self) -> Result<Vec<String>, WorkflowStoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Load a workflow by name (without extension).
    pub async fn load(&self, name: &str) -> Result<serde_json::Value, WorkflowStoreError> {
        let path = self.path_for(name);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(WorkflowStoreError::NotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&raw)?)
    }

    /// Save or overwrite a workflow, creating the directory if needed.
    pub async fn save(
        &self,
        name: &str,
        workflow: &serde_json::Value,
    ) -> Result<(), WorkflowStoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let pretty = serde_json::to_string_pretty(workflow)?;
        tokio::fs::write(self.path_for(name), pretty).await?;
        Ok(())
    }

    /// Delete a workflow. Returns whether one existed.
    pub async fn delete(&self, name: &str) -> Result<bool, WorkflowStoreError> {
        match tokio::fs::remove_file(self.path_for(name)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = WorkflowStore::new(dir.path().join("workflows"));

        let workflow = serde_json::json!({
            "3": {"class_type": "KSampler", "inputs": {"steps": 20}}
        });
        store.save("txt2img", &workflow).await.unwrap();

        let loaded = store.load("txt2img").await.unwrap();
        assert_eq!(loaded, workflow);
    }

    #[tokio::test]
    async fn load_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = WorkflowStore::new(dir.path());

        let err = store.load("absent").await.unwrap_err();
        assert!(matches!(err, WorkflowStoreError::NotFound(name) if name == "absent"));
    }

    #[tokio::test]
    async fn list_is_sorted_and_skips_non_json() {
        let dir = tempfile::tempdir().unwrap();
        let store = WorkflowStore::new(dir.path());

        store.save("zebra", &serde_json::json!({})).await.unwrap();
        store.save("alpha", &serde_json::json!({})).await.unwrap();
        tokio::fs::write(dir.path().join("notes.txt"), "ignored")
            .await
            .unwrap();

        assert_eq!(store.list().await.unwrap(), vec!["alpha", "zebra"]);
    }

    #[tokio::test]
    async fn list_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = WorkflowStore::new(dir.path().join("never-created"));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_reports_existence() {
        let dir = tempfile::tempdir().unwrap();
        let store = WorkflowStore::new(dir.path());

        store.save("wf", &serde_json::json!({})).await.unwrap();
        assert!(store.delete("wf").await.unwrap());
        assert!(!store.delete("wf").await.unwrap());
    }
}
