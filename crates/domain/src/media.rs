use std::sync::Arc;

use bytes::Bytes;

use crate::DomainResult;
use crate::error::DomainError;
use crate::evidence::{DEFAULT_CONTENT_TYPE, MediaFile};
use crate::ports::blobs::{BlobDownload, BlobMetadata, BlobStore, MEDIA_URL_PREFIX};
use crate::util::{content_digest, now_ms};

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_MAX_UPLOAD_FILES: usize = 10;
/// Headroom per request for multipart boundaries and part headers.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// `max_upload_bytes` bounds each file; `max_upload_files` bounds how many
/// files one upload request may carry.
#[derive(Clone, Debug)]
pub struct MediaPolicy {
    pub max_upload_bytes: usize,
    pub max_upload_files: usize,
}

impl Default for MediaPolicy {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_upload_files: DEFAULT_MAX_UPLOAD_FILES,
        }
    }
}

impl MediaPolicy {
    /// Largest request body an upload carrying the maximum number of files,
    /// each at the per-file ceiling, can produce.
    pub fn request_body_limit(&self) -> usize {
        self.max_upload_bytes
            .saturating_mul(self.max_upload_files.max(1))
            .saturating_add(MULTIPART_OVERHEAD_BYTES)
    }
}

/// One file taken off the wire, not yet stored.
#[derive(Clone, Debug)]
pub struct PendingMedia {
    pub name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Moves media bytes into the blob store. Attaching the result to an evidence
/// record is a separate call on `EvidenceService`, so no record is held while
/// bytes are in flight.
#[derive(Clone)]
pub struct MediaService {
    blobs: Arc<dyn BlobStore>,
    policy: MediaPolicy,
}

impl MediaService {
    pub fn new(blobs: Arc<dyn BlobStore>, policy: MediaPolicy) -> Self {
        Self { blobs, policy }
    }

    pub fn policy(&self) -> &MediaPolicy {
        &self.policy
    }

    pub async fn upload(
        &self,
        name: &str,
        content_type: Option<&str>,
        bytes: Bytes,
    ) -> DomainResult<MediaFile> {
        self.check(name, &bytes)?;
        self.store(name.trim(), content_type, bytes).await
    }

    /// Stores a batch only after every file in it passes the checks, so a
    /// rejected batch leaves nothing behind in the blob store.
    pub async fn upload_all(&self, files: Vec<PendingMedia>) -> DomainResult<Vec<MediaFile>> {
        if files.is_empty() {
            return Err(DomainError::Validation("no files uploaded".into()));
        }
        if files.len() > self.policy.max_upload_files {
            return Err(DomainError::Validation(format!(
                "at most {} files per upload",
                self.policy.max_upload_files
            )));
        }
        for file in &files {
            self.check(&file.name, &file.bytes)?;
        }

        let mut stored = Vec::with_capacity(files.len());
        for file in files {
            let media = self
                .store(file.name.trim(), file.content_type.as_deref(), file.bytes)
                .await?;
            stored.push(media);
        }
        Ok(stored)
    }

    fn check(&self, name: &str, bytes: &Bytes) -> DomainResult<()> {
        if name.trim().is_empty() {
            return Err(DomainError::Validation("file name is required".into()));
        }
        if bytes.is_empty() {
            return Err(DomainError::Validation("no file uploaded".into()));
        }
        if bytes.len() > self.policy.max_upload_bytes {
            return Err(DomainError::PayloadTooLarge {
                size: bytes.len(),
                limit: self.policy.max_upload_bytes,
            });
        }
        Ok(())
    }

    async fn store(
        &self,
        name: &str,
        content_type: Option<&str>,
        bytes: Bytes,
    ) -> DomainResult<MediaFile> {
        let content_type = content_type
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        let sha256 = content_digest(&bytes);
        let metadata = BlobMetadata {
            content_type: content_type.clone(),
            original_name: name.to_string(),
            uploaded_at_ms: now_ms(),
            size: bytes.len() as u64,
            sha256: sha256.clone(),
        };
        let stored = self.blobs.upload(name, bytes, metadata).await?;
        tracing::info!(handle = %stored.handle, name, content_type = %content_type, "media stored");

        Ok(MediaFile {
            name: name.to_string(),
            url: stored.url,
            content_type: Some(content_type),
            sha256: Some(sha256),
        })
    }

    /// Fills the digest and content type of a reference to stored media from
    /// the blob's own metadata. References to media outside this store carry
    /// no digest.
    pub async fn resolve(&self, file: MediaFile) -> DomainResult<MediaFile> {
        let Some(handle) = file.url.strip_prefix(MEDIA_URL_PREFIX) else {
            return Ok(MediaFile {
                sha256: None,
                ..file
            });
        };
        let metadata = match self.blobs.download(handle).await? {
            Some(download) => download.metadata,
            None => {
                return Err(DomainError::Validation(format!(
                    "media {} is not in the store",
                    file.url
                )));
            }
        };
        Ok(MediaFile {
            content_type: Some(metadata.content_type),
            sha256: Some(metadata.sha256),
            ..file
        })
    }

    pub async fn download(&self, handle: &str) -> DomainResult<BlobDownload> {
        self.blobs
            .download(handle)
            .await?
            .ok_or(DomainError::NotFound)
    }
}
