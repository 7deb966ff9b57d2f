//! File catalog
//!
//! The metadata side of storage: one [`FileRecord`] per stored file, keyed by
//! file id, persisted as JSON next to the node's data.

use super::{StorageDetails, StorageError};
use crate::crypto::ContentHash;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Metadata for one stored file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Unique file ID
    pub file_id: String,

    /// Original filename
    pub filename: String,

    /// Original size in bytes
    pub original_size: u64,

    /// BLAKE3 hash of the original bytes (base58)
    pub content_hash: Option<String>,

    /// Coding layout recorded at store time
    pub storage_details: StorageDetails,

    /// Creation timestamp
    pub created_at: i64,
}

impl FileRecord {
    /// Describe freshly stored `data`
    pub fn new(filename: impl Into<String>, data: &[u8], storage_details: StorageDetails) -> Self {
        Self {
            file_id: uuid::Uuid::new_v4().to_string(),
            filename: filename.into(),
            original_size: data.len() as u64,
            content_hash: Some(ContentHash::hash(data).to_base58()),
            storage_details,
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// In-memory file index
#[derive(Debug, Default)]
pub struct FileCatalog {
    files: HashMap<String, FileRecord>,
}

impl FileCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from disk; a missing file yields an empty catalog
    pub async fn load(path: &Path) -> Result<Self, StorageError> {
        match tokio::fs::read_to_string(path).await {
            Ok(json) => {
                let catalog = Self::import_json(&json)?;
                tracing::info!("Loaded {} file records from {:?}", catalog.len(), path);
                Ok(catalog)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write to disk, creating parent directories
    pub async fn save(&self, path: &Path) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, self.export_json()?).await?;
        Ok(())
    }

    pub fn insert(&mut self, record: FileRecord) {
        self.files.insert(record.file_id.clone(), record);
    }

    pub fn get(&self, file_id: &str) -> Option<&FileRecord> {
        self.files.get(file_id)
    }

    pub fn remove(&mut self, file_id: &str) -> Option<FileRecord> {
        self.files.remove(file_id)
    }

    /// All records, oldest first
    pub fn list(&self) -> Vec<&FileRecord> {
        let mut records: Vec<_> = self.files.values().collect();
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.file_id.cmp(&b.file_id))
        });
        records
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Export the catalog as JSON
    pub fn export_json(&self) -> Result<String, StorageError> {
        let records: Vec<&FileRecord> = self.list();
        serde_json::to_string_pretty(&records)
            .map_err(|e| StorageError::Serialization(e.to_string()))
    }

    /// Import a catalog from JSON
    pub fn import_json(json: &str) -> Result<Self, StorageError> {
        let records: Vec<FileRecord> =
            serde_json::from_str(json).map_err(|e| StorageError::Serialization(e.to_string()))?;

        let mut catalog = Self::new();
        for record in records {
            catalog.insert(record);
        }
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(name: &str, data: &[u8]) -> FileRecord {
        let details = StorageDetails::plan(data.len(), 4, 1, 2).unwrap();
        FileRecord::new(name, data, details)
    }

    #[test]
    fn test_record_hash_and_size() {
        let r = record("a.txt", b"hello");
        assert_eq!(r.original_size, 5);
        assert_eq!(
            r.content_hash.as_deref(),
            Some(ContentHash::hash(b"hello").to_base58().as_str())
        );
    }

    #[test]
    fn test_insert_get_remove() {
        let mut catalog = FileCatalog::new();
        let r = record("a.txt", b"hello");
        let id = r.file_id.clone();

        catalog.insert(r.clone());
        assert_eq!(catalog.get(&id), Some(&r));
        assert_eq!(catalog.len(), 1);

        assert_eq!(catalog.remove(&id), Some(r));
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_json_export_import() {
        let mut catalog = FileCatalog::new();
        catalog.insert(record("a.txt", b"hello"));
        catalog.insert(record("b.txt", b"world!"));

        let json = catalog.export_json().unwrap();
        assert!(json.contains("\"coded_fragments\""));

        let restored = FileCatalog::import_json(&json).unwrap();
        assert_eq!(restored.len(), 2);
        for r in catalog.list() {
            assert_eq!(restored.get(&r.file_id), Some(r));
        }
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("catalog.json");

        let empty = FileCatalog::load(&path).await.unwrap();
        assert!(empty.is_empty());

        let mut catalog = FileCatalog::new();
        let r = record("a.txt", b"hello");
        catalog.insert(r.clone());
        catalog.save(&path).await.unwrap();

        let loaded = FileCatalog::load(&path).await.unwrap();
        assert_eq!(loaded.get(&r.file_id), Some(&r));
    }

    #[tokio::test]
    async fn test_load_rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        tokio::fs::write(&path, "not json").await.unwrap();

        let result = FileCatalog::load(&path).await;
        assert!(matches!(result, Err(StorageError::Serialization(_))));
    }
}
