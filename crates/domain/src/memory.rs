//! Process-local adapters used by tests and the `memory` backends.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::DomainResult;
use crate::ports::BoxFuture;
use crate::ports::blobs::{
    BlobDownload, BlobMetadata, BlobStore, StoredBlob, is_valid_handle,
};
use crate::ports::documents::{
    Aggregation, Document, DocumentStore, Filter, GroupCount, ID_FIELD, Sort, UpdatePatch,
};
use crate::util::uuid_v7_without_dashes;

/// Collections are kept in insertion order. Every write takes the collection
/// map's write lock, which makes `update_one` pushes atomic per document.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    collections: Arc<RwLock<HashMap<String, Vec<Document>>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> BoxFuture<'_, DomainResult<Option<Document>>> {
        let collection = collection.to_string();
        let filter = filter.clone();
        let collections = self.collections.clone();
        Box::pin(async move {
            filter.validate()?;
            let collections = collections.read().await;
            Ok(collections
                .get(&collection)
                .and_then(|docs| docs.iter().find(|doc| filter.matches(doc)))
                .cloned())
        })
    }

    fn find(
        &self,
        collection: &str,
        filter: &Filter,
        sort: Option<&Sort>,
    ) -> BoxFuture<'_, DomainResult<Vec<Document>>> {
        let collection = collection.to_string();
        let filter = filter.clone();
        let sort = sort.cloned();
        let collections = self.collections.clone();
        Box::pin(async move {
            filter.validate()?;
            let collections = collections.read().await;
            let mut docs: Vec<Document> = collections
                .get(&collection)
                .map(|docs| {
                    docs.iter()
                        .filter(|doc| filter.matches(doc))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            if let Some(sort) = sort {
                docs.sort_by(|left, right| sort.compare(left, right));
            }
            Ok(docs)
        })
    }

    fn insert_one(
        &self,
        collection: &str,
        mut document: Document,
    ) -> BoxFuture<'_, DomainResult<String>> {
        let collection = collection.to_string();
        let collections = self.collections.clone();
        Box::pin(async move {
            let id = uuid_v7_without_dashes();
            document.insert(ID_FIELD.to_string(), Value::String(id.clone()));
            let mut collections = collections.write().await;
            collections.entry(collection).or_default().push(document);
            Ok(id)
        })
    }

    fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &UpdatePatch,
    ) -> BoxFuture<'_, DomainResult<u64>> {
        let collection = collection.to_string();
        let filter = filter.clone();
        let patch = patch.clone();
        let collections = self.collections.clone();
        Box::pin(async move {
            filter.validate()?;
            patch.validate()?;
            if patch.is_empty() {
                return Ok(0);
            }
            let mut collections = collections.write().await;
            let Some(document) = collections
                .get_mut(&collection)
                .and_then(|docs| docs.iter_mut().find(|doc| filter.matches(doc)))
            else {
                return Ok(0);
            };
            let mut updated = document.clone();
            let changed = patch.apply_to(&mut updated)?;
            *document = updated;
            Ok(u64::from(changed))
        })
    }

    fn delete_one(&self, collection: &str, filter: &Filter) -> BoxFuture<'_, DomainResult<u64>> {
        let collection = collection.to_string();
        let filter = filter.clone();
        let collections = self.collections.clone();
        Box::pin(async move {
            filter.validate()?;
            let mut collections = collections.write().await;
            let Some(docs) = collections.get_mut(&collection) else {
                return Ok(0);
            };
            match docs.iter().position(|doc| filter.matches(doc)) {
                Some(index) => {
                    docs.remove(index);
                    Ok(1)
                }
                None => Ok(0),
            }
        })
    }

    fn aggregate(
        &self,
        collection: &str,
        aggregation: &Aggregation,
    ) -> BoxFuture<'_, DomainResult<Vec<GroupCount>>> {
        let collection = collection.to_string();
        let aggregation = aggregation.clone();
        let collections = self.collections.clone();
        Box::pin(async move {
            let collections = collections.read().await;
            let docs = collections
                .get(&collection)
                .map(Vec::as_slice)
                .unwrap_or_default();
            match aggregation {
                Aggregation::Count => Ok(vec![GroupCount {
                    key: Value::Null,
                    count: docs.len() as u64,
                }]),
                Aggregation::CountBy { field } => {
                    crate::ports::documents::validate_field_name(&field)?;
                    let mut groups: Vec<GroupCount> = Vec::new();
                    for doc in docs {
                        let key = doc.get(&field).cloned().unwrap_or(Value::Null);
                        match groups.iter_mut().find(|group| group.key == key) {
                            Some(group) => group.count += 1,
                            None => groups.push(GroupCount { key, count: 1 }),
                        }
                    }
                    Ok(groups)
                }
            }
        })
    }
}

#[derive(Clone, Default)]
pub struct InMemoryBlobStore {
    blobs: Arc<RwLock<HashMap<String, (BlobMetadata, Bytes)>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn blob_count(&self) -> usize {
        self.blobs.read().await.len()
    }
}

impl BlobStore for InMemoryBlobStore {
    fn upload(
        &self,
        _name: &str,
        bytes: Bytes,
        metadata: BlobMetadata,
    ) -> BoxFuture<'_, DomainResult<StoredBlob>> {
        let blobs = self.blobs.clone();
        Box::pin(async move {
            let handle = uuid_v7_without_dashes();
            blobs
                .write()
                .await
                .insert(handle.clone(), (metadata, bytes));
            Ok(StoredBlob::for_handle(handle))
        })
    }

    fn download(&self, handle: &str) -> BoxFuture<'_, DomainResult<Option<BlobDownload>>> {
        let handle = handle.to_string();
        let blobs = self.blobs.clone();
        Box::pin(async move {
            if !is_valid_handle(&handle) {
                return Ok(None);
            }
            let blobs = blobs.read().await;
            Ok(blobs.get(&handle).cloned().map(|(metadata, bytes)| {
                let body = futures_util::stream::once(async move { Ok(bytes) }).boxed();
                BlobDownload { metadata, body }
            }))
        })
    }
}
