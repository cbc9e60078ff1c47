//! Storage abstraction for Pagewise.
//!
//! The [`FragmentStore`] trait defines the storage operations needed by the
//! ingestion and answering pipelines, so the core can run against SQLite
//! (app crate) or memory (tests).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{DocumentRecord, Fragment};

/// Abstract storage backend for documents and their fragment pools.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_document`](FragmentStore::upsert_document) | Insert or update a document record |
/// | [`find_document_by_hash`](FragmentStore::find_document_by_hash) | Detect a re-upload |
/// | [`get_document`](FragmentStore::get_document) | Look up one document |
/// | [`list_documents`](FragmentStore::list_documents) | All documents, newest first |
/// | [`clear_fragments`](FragmentStore::clear_fragments) | Drop a document's fragment pool |
/// | [`insert_fragments`](FragmentStore::insert_fragments) | Append one batch atomically |
/// | [`list_fragments`](FragmentStore::list_fragments) | The pool, by page then insertion order |
/// | [`count_fragments`](FragmentStore::count_fragments) | Pool size |
///
/// Batches become visible as they are committed; a reader may observe a
/// partially ingested pool.
#[async_trait]
pub trait FragmentStore: Send + Sync {
    async fn upsert_document(&self, doc: &DocumentRecord) -> Result<()>;

    async fn find_document_by_hash(&self, dedup_hash: &str) -> Result<Option<DocumentRecord>>;

    async fn get_document(&self, id: &str) -> Result<Option<DocumentRecord>>;

    async fn list_documents(&self) -> Result<Vec<DocumentRecord>>;

    /// Remove every fragment of a document. Returns how many were removed.
    async fn clear_fragments(&self, document_id: &str) -> Result<u64>;

    async fn insert_fragments(&self, fragments: &[Fragment]) -> Result<()>;

    async fn list_fragments(&self, document_id: &str) -> Result<Vec<Fragment>>;

    async fn count_fragments(&self, document_id: &str) -> Result<u64>;
}
