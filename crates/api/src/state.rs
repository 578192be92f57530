use std::sync::Arc;

use precinct_domain::evidence::EvidenceService;
use precinct_domain::media::{MediaPolicy, MediaService};
use precinct_domain::memory::{InMemoryBlobStore, InMemoryDocumentStore};
use precinct_domain::ports::blobs::BlobStore;
use precinct_domain::ports::db::DbAdapter;
use precinct_domain::ports::documents::DocumentStore;
use precinct_domain::records::RecordService;
use precinct_infra::config::AppConfig;
use precinct_infra::db::{DbConfig, SurrealAdapter};
use precinct_infra::repositories::{FsBlobStore, SurrealDocumentStore};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub evidence: EvidenceService,
    pub media: MediaService,
    pub records: RecordService,
    pub db_health: Option<Arc<dyn DbAdapter>>,
}

impl AppState {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let (documents, db_health): (Arc<dyn DocumentStore>, Option<Arc<dyn DbAdapter>>) =
            if config.uses_surreal() {
                let db_config = DbConfig::from_app_config(&config);
                let store = SurrealDocumentStore::new(&db_config).await?;
                let adapter = SurrealAdapter::new(db_config);
                (Arc::new(store), Some(Arc::new(adapter)))
            } else {
                tracing::warn!("using in-memory document store; data is lost on restart");
                (Arc::new(InMemoryDocumentStore::new()), None)
            };

        let blobs: Arc<dyn BlobStore> = if config.uses_fs_blobs() {
            Arc::new(FsBlobStore::new(&config.blob_root).await?)
        } else {
            Arc::new(InMemoryBlobStore::new())
        };

        tracing::info!(
            data_backend = %config.data_backend,
            blob_backend = %config.blob_backend,
            "storage backends ready"
        );
        Ok(Self::with_stores(config, documents, blobs, db_health))
    }

    pub fn with_stores(
        config: AppConfig,
        documents: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        db_health: Option<Arc<dyn DbAdapter>>,
    ) -> Self {
        let policy = MediaPolicy {
            max_upload_bytes: config.max_upload_bytes,
            max_upload_files: config.max_upload_files,
        };
        Self {
            evidence: EvidenceService::new(documents.clone()),
            media: MediaService::new(blobs, policy),
            records: RecordService::new(documents),
            db_health,
            config,
        }
    }

    #[cfg(test)]
    pub fn in_memory(config: AppConfig) -> Self {
        Self::with_stores(
            config,
            Arc::new(InMemoryDocumentStore::new()),
            Arc::new(InMemoryBlobStore::new()),
            None,
        )
    }
}
