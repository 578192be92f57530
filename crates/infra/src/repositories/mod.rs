mod blobs;
mod documents;

pub use blobs::FsBlobStore;
pub use documents::SurrealDocumentStore;
