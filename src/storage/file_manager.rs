//! File Manager - High-level file operations
//!
//! Ties the catalog to the store, retrieve and repair paths over one peer
//! channel.

use super::{
    retrieve_file, store_file, FileCatalog, FileRecord, FragmentSelection, RepairOrchestrator,
    RepairReport, StorageError,
};
use crate::coding::Gf256;
use crate::p2p::PeerChannel;
use crate::RlncConfig;

use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Stores, retrieves and repairs files on a peer set
pub struct FileManager<C: PeerChannel> {
    /// Coding and timeout parameters
    config: RlncConfig,

    /// Shared field tables
    field: Arc<Gf256>,

    /// Transport to the peers
    channel: Arc<C>,

    /// Local file index
    catalog: FileCatalog,
}

impl<C: PeerChannel> FileManager<C> {
    /// Create a file manager with an empty catalog
    pub fn new(channel: Arc<C>, config: RlncConfig) -> Self {
        Self {
            config,
            field: Arc::new(Gf256::new()),
            channel,
            catalog: FileCatalog::new(),
        }
    }

    /// Share existing field tables
    pub fn with_field(mut self, field: Arc<Gf256>) -> Self {
        self.field = field;
        self
    }

    /// Start from an existing catalog
    pub fn with_catalog(mut self, catalog: FileCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Create a file manager whose catalog is read from `config.data_path`
    pub async fn open(channel: Arc<C>, config: RlncConfig) -> Result<Self, StorageError> {
        let catalog = FileCatalog::load(&config.catalog_path()).await?;
        Ok(Self::new(channel, config).with_catalog(catalog))
    }

    /// Persist the catalog under `config.data_path`
    pub async fn save_catalog(&self) -> Result<(), StorageError> {
        self.catalog.save(&self.config.catalog_path()).await
    }

    /// Encode `data`, place it on every peer and record it
    pub async fn store_file(
        &mut self,
        filename: &str,
        data: &[u8],
    ) -> Result<FileRecord, StorageError> {
        let details = store_file(self.channel.as_ref(), self.field.clone(), &self.config, data)
            .await?;

        let record = FileRecord::new(filename, data, details);
        tracing::info!(
            "Stored {} as {} ({} bytes)",
            record.filename,
            record.file_id,
            record.original_size
        );

        self.catalog.insert(record.clone());
        Ok(record)
    }

    /// Read a local file and store it
    pub async fn store_path(&mut self, path: &Path) -> Result<FileRecord, StorageError> {
        let data = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.store_file(&filename, &data).await
    }

    /// Retrieve a file from a random minimal subset of its fragments
    pub async fn get_file(&self, file_id: &str) -> Result<Vec<u8>, StorageError> {
        self.get_file_with(file_id, FragmentSelection::Random).await
    }

    /// Retrieve a file from a chosen fragment selection
    pub async fn get_file_with(
        &self,
        file_id: &str,
        selection: FragmentSelection,
    ) -> Result<Vec<u8>, StorageError> {
        let record = self.record(file_id)?;
        retrieve_file(
            self.channel.as_ref(),
            self.field.clone(),
            &self.config,
            record,
            selection,
        )
        .await
    }

    /// Repair the given files, in order
    pub async fn repair(
        &self,
        file_ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<RepairReport, StorageError> {
        let records = file_ids
            .iter()
            .map(|id| self.record(id))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(self.orchestrator().run(records, cancel).await)
    }

    /// Repair every cataloged file, oldest first
    pub async fn repair_all(&self, cancel: &CancellationToken) -> RepairReport {
        self.orchestrator().run(self.catalog.list(), cancel).await
    }

    fn orchestrator(&self) -> RepairOrchestrator<'_, C> {
        RepairOrchestrator::new(self.channel.as_ref(), self.field.clone(), &self.config)
    }

    fn record(&self, file_id: &str) -> Result<&FileRecord, StorageError> {
        self.catalog
            .get(file_id)
            .ok_or_else(|| StorageError::FileNotFound(file_id.to_string()))
    }

    /// Forget a file; its fragments stay on the peers
    pub fn remove_from_catalog(&mut self, file_id: &str) -> Option<FileRecord> {
        self.catalog.remove(file_id)
    }

    /// Search files by name
    pub fn search(&self, query: &str) -> Vec<&FileRecord> {
        let query_lower = query.to_lowercase();
        self.catalog
            .list()
            .into_iter()
            .filter(|f| f.filename.to_lowercase().contains(&query_lower))
            .collect()
    }

    /// Total bytes of original data stored
    pub fn total_storage_used(&self) -> u64 {
        self.catalog.list().iter().map(|f| f.original_size).sum()
    }

    pub fn catalog(&self) -> &FileCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &RlncConfig {
        &self.config
    }

    pub fn channel(&self) -> &Arc<C> {
        &self.channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::p2p::LocalCluster;
    use crate::storage::RepairOutcome;

    fn manager(peers: usize) -> (FileManager<LocalCluster>, Arc<LocalCluster>) {
        let field = Arc::new(Gf256::new());
        let cluster = Arc::new(LocalCluster::new(peers, field.clone()));
        let config = RlncConfig {
            response_timeout_ms: 200,
            ..RlncConfig::default()
        };
        (
            FileManager::new(cluster.clone(), config).with_field(field),
            cluster,
        )
    }

    #[tokio::test]
    async fn test_store_and_get() {
        let (mut fm, _cluster) = manager(4);
        let data = b"The quick brown fox jumps over the lazy dog".to_vec();

        let record = fm.store_file("fox.txt", &data).await.unwrap();
        assert_eq!(fm.catalog().len(), 1);
        assert_eq!(fm.total_storage_used(), data.len() as u64);
        assert_eq!(fm.search("FOX").len(), 1);

        let got = fm.get_file(&record.file_id).await.unwrap();
        assert_eq!(got, data);
    }

    #[tokio::test]
    async fn test_unknown_file() {
        let (fm, _cluster) = manager(4);

        assert!(matches!(
            fm.get_file("missing").await,
            Err(StorageError::FileNotFound(_))
        ));
        assert!(matches!(
            fm.repair(&["missing".to_string()], &CancellationToken::new()).await,
            Err(StorageError::FileNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_repair_all_healthy() {
        let (mut fm, cluster) = manager(3);
        fm.store_file("a", b"first").await.unwrap();
        fm.store_file("b", b"second").await.unwrap();
        let writes = cluster.write_count();

        let report = fm.repair_all(&CancellationToken::new()).await;
        assert_eq!(report.files.len(), 2);
        assert!(report
            .files
            .iter()
            .all(|f| f.outcome == RepairOutcome::Healthy));
        assert_eq!(cluster.write_count(), writes);
    }

    #[tokio::test]
    async fn test_catalog_persists() {
        let dir = tempfile::tempdir().unwrap();
        let field = Arc::new(Gf256::new());
        let cluster = Arc::new(LocalCluster::new(3, field.clone()));
        let config = RlncConfig {
            data_path: dir.path().to_string_lossy().into_owned(),
            response_timeout_ms: 200,
            ..RlncConfig::default()
        };

        let mut fm = FileManager::open(cluster.clone(), config.clone())
            .await
            .unwrap()
            .with_field(field.clone());
        let record = fm.store_file("a.bin", &[7u8; 300]).await.unwrap();
        fm.save_catalog().await.unwrap();

        let reopened = FileManager::open(cluster, config)
            .await
            .unwrap()
            .with_field(field);
        assert_eq!(reopened.catalog().get(&record.file_id), Some(&record));
        assert_eq!(reopened.get_file(&record.file_id).await.unwrap(), vec![7u8; 300]);
    }

    #[tokio::test]
    async fn test_store_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        tokio::fs::write(&path, b"local file").await.unwrap();

        let (mut fm, _cluster) = manager(3);
        let record = fm.store_path(&path).await.unwrap();
        assert_eq!(record.filename, "notes.txt");
        assert_eq!(fm.get_file(&record.file_id).await.unwrap(), b"local file");
    }
}
