use bytes::Bytes;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::ports::BoxFuture;

pub const MEDIA_URL_PREFIX: &str = "/v1/media/";

pub type BlobStream = BoxStream<'static, DomainResult<Bytes>>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobMetadata {
    pub content_type: String,
    pub original_name: String,
    pub uploaded_at_ms: i64,
    pub size: u64,
    pub sha256: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBlob {
    pub handle: String,
    pub url: String,
}

impl StoredBlob {
    pub fn for_handle(handle: impl Into<String>) -> Self {
        let handle = handle.into();
        let url = format!("{MEDIA_URL_PREFIX}{handle}");
        Self { handle, url }
    }
}

pub struct BlobDownload {
    pub metadata: BlobMetadata,
    pub body: BlobStream,
}

/// Handles are minted by the store itself; anything else is treated as absent.
pub fn is_valid_handle(handle: &str) -> bool {
    !handle.is_empty() && handle.len() <= 64 && handle.chars().all(|ch| ch.is_ascii_alphanumeric())
}

#[allow(clippy::needless_pass_by_value)]
pub trait BlobStore: Send + Sync {
    fn upload(
        &self,
        name: &str,
        bytes: Bytes,
        metadata: BlobMetadata,
    ) -> BoxFuture<'_, DomainResult<StoredBlob>>;

    fn download(&self, handle: &str) -> BoxFuture<'_, DomainResult<Option<BlobDownload>>>;
}
