//! JSON file backed history: one object keyed by version number.

use super::HistoryStore;
use crate::core::{Policy, PolicyError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;

type HistoryDocument = BTreeMap<u64, Policy>;

pub struct JsonFileHistoryStore {
    path: PathBuf,
    // Serializes read-modify-write cycles on the document.
    io_lock: Mutex<()>,
}

impl JsonFileHistoryStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            io_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<HistoryDocument> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_document(&path))
            .await
            .map_err(|e| PolicyError::Storage(format!("history read task failed: {}", e)))?
    }

    async fn write(&self, document: HistoryDocument) -> Result<()> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_document(&path, &document))
            .await
            .map_err(|e| PolicyError::Storage(format!("history write task failed: {}", e)))?
    }
}

fn read_document(path: &Path) -> Result<HistoryDocument> {
    if !path.exists() {
        return Ok(HistoryDocument::new());
    }
    let content = fs::read_to_string(path).map_err(|e| {
        PolicyError::Storage(format!("Failed to read {}: {}", path.display(), e))
    })?;
    if content.trim().is_empty() {
        return Ok(HistoryDocument::new());
    }
    serde_json::from_str(&content)
        .map_err(|e| PolicyError::Storage(format!("Failed to parse {}: {}", path.display(), e)))
}

fn write_document(path: &Path, document: &HistoryDocument) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| {
        PolicyError::Storage(format!("Failed to create history directory: {}", e))
    })?;

    let serialized = serde_json::to_vec_pretty(document)?;
    let mut temp = NamedTempFile::new_in(&dir)
        .map_err(|e| PolicyError::Storage(format!("Failed to create temp file: {}", e)))?;
    temp.write_all(&serialized)
        .map_err(|e| PolicyError::Storage(format!("Failed to write history: {}", e)))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| PolicyError::Storage(format!("Failed to sync history: {}", e)))?;
    temp.persist(path)
        .map_err(|e| PolicyError::Storage(format!("Failed to replace history file: {}", e)))?;
    Ok(())
}

#[async_trait]
impl HistoryStore for JsonFileHistoryStore {
    async fn load(&self, version: u64) -> Result<Option<Policy>> {
        let _guard = self.io_lock.lock().await;
        let mut document = self.read().await?;
        Ok(document.remove(&version))
    }

    async fn save(&self, version: u64, policy: &Policy) -> Result<()> {
        let _guard = self.io_lock.lock().await;
        let mut document = self.read().await?;
        document.insert(version, policy.clone());
        self.write(document).await
    }

    async fn delete(&self, versions: &BTreeSet<u64>) -> Result<()> {
        let _guard = self.io_lock.lock().await;
        if !self.path.exists() {
            return Ok(());
        }
        let mut document = self.read().await?;
        let before = document.len();
        document.retain(|version, _| !versions.contains(version));
        if document.len() == before {
            return Ok(());
        }
        self.write(document).await
    }
}
