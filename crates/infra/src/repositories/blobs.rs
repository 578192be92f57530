use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures_util::StreamExt;
use precinct_domain::DomainResult;
use precinct_domain::error::DomainError;
use precinct_domain::ports::BoxFuture;
use precinct_domain::ports::blobs::{
    BlobDownload, BlobMetadata, BlobStore, StoredBlob, is_valid_handle,
};
use precinct_domain::util::uuid_v7_without_dashes;
use tokio::fs;
use tokio_util::io::ReaderStream;

/// Stores each blob as `<handle>.bin` with a `<handle>.json` metadata sidecar
/// under a single root directory.
#[derive(Clone, Debug)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub async fn new(root: impl Into<PathBuf>) -> DomainResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(|err| {
            DomainError::Persistence(format!(
                "failed to create blob root {}: {err}",
                root.display()
            ))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn body_path(&self, handle: &str) -> PathBuf {
        self.root.join(format!("{handle}.bin"))
    }

    fn metadata_path(&self, handle: &str) -> PathBuf {
        self.root.join(format!("{handle}.json"))
    }
}

fn io_error(action: &str, err: std::io::Error) -> DomainError {
    DomainError::Persistence(format!("blob {action} failed: {err}"))
}

impl BlobStore for FsBlobStore {
    fn upload(
        &self,
        name: &str,
        bytes: Bytes,
        metadata: BlobMetadata,
    ) -> BoxFuture<'_, DomainResult<StoredBlob>> {
        let name = name.to_string();
        Box::pin(async move {
            let handle = uuid_v7_without_dashes();
            let sidecar = serde_json::to_vec(&metadata).map_err(|err| {
                DomainError::Persistence(format!("failed to encode blob metadata: {err}"))
            })?;
            fs::write(self.body_path(&handle), &bytes)
                .await
                .map_err(|err| io_error("write", err))?;
            // The sidecar is written last; a blob without one is treated as absent.
            fs::write(self.metadata_path(&handle), sidecar)
                .await
                .map_err(|err| io_error("write", err))?;
            tracing::debug!(handle, name, size = bytes.len(), "blob written");
            Ok(StoredBlob::for_handle(handle))
        })
    }

    fn download(&self, handle: &str) -> BoxFuture<'_, DomainResult<Option<BlobDownload>>> {
        let handle = handle.to_string();
        Box::pin(async move {
            if !is_valid_handle(&handle) {
                return Ok(None);
            }
            let sidecar = match fs::read(self.metadata_path(&handle)).await {
                Ok(sidecar) => sidecar,
                Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
                Err(err) => return Err(io_error("read", err)),
            };
            let metadata: BlobMetadata = serde_json::from_slice(&sidecar).map_err(|err| {
                DomainError::Persistence(format!("corrupt blob metadata for {handle}: {err}"))
            })?;
            let file = match fs::File::open(self.body_path(&handle)).await {
                Ok(file) => file,
                Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
                Err(err) => return Err(io_error("open", err)),
            };
            let body = ReaderStream::new(file)
                .map(|chunk| chunk.map_err(|err| io_error("read", err)))
                .boxed();
            Ok(Some(BlobDownload { metadata, body }))
        })
    }
}
