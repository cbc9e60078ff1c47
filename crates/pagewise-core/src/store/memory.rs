//! In-memory [`FragmentStore`] implementation for testing.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock` for thread safety.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{DocumentRecord, Fragment};

use super::FragmentStore;

/// In-memory store for tests and embedding the engine without SQLite.
pub struct InMemoryFragmentStore {
    docs: RwLock<HashMap<String, DocumentRecord>>,
    fragments: RwLock<Vec<Fragment>>,
}

impl InMemoryFragmentStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            fragments: RwLock::new(Vec::new()),
        }
    }

    fn docs(&self) -> Result<RwLockReadGuard<'_, HashMap<String, DocumentRecord>>> {
        self.docs.read().map_err(|_| anyhow!("document map lock poisoned"))
    }

    fn docs_mut(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, DocumentRecord>>> {
        self.docs.write().map_err(|_| anyhow!("document map lock poisoned"))
    }

    fn fragments(&self) -> Result<RwLockReadGuard<'_, Vec<Fragment>>> {
        self.fragments.read().map_err(|_| anyhow!("fragment lock poisoned"))
    }

    fn fragments_mut(&self) -> Result<RwLockWriteGuard<'_, Vec<Fragment>>> {
        self.fragments.write().map_err(|_| anyhow!("fragment lock poisoned"))
    }
}

impl Default for InMemoryFragmentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FragmentStore for InMemoryFragmentStore {
    async fn upsert_document(&self, doc: &DocumentRecord) -> Result<()> {
        self.docs_mut()?.insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    async fn find_document_by_hash(&self, dedup_hash: &str) -> Result<Option<DocumentRecord>> {
        Ok(self
            .docs()?
            .values()
            .find(|d| d.dedup_hash == dedup_hash)
            .cloned())
    }

    async fn get_document(&self, id: &str) -> Result<Option<DocumentRecord>> {
        Ok(self.docs()?.get(id).cloned())
    }

    async fn list_documents(&self) -> Result<Vec<DocumentRecord>> {
        let mut docs: Vec<DocumentRecord> = self.docs()?.values().cloned().collect();
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(docs)
    }

    async fn clear_fragments(&self, document_id: &str) -> Result<u64> {
        let mut fragments = self.fragments_mut()?;
        let before = fragments.len();
        fragments.retain(|f| f.document_id != document_id);
        Ok((before - fragments.len()) as u64)
    }

    async fn insert_fragments(&self, batch: &[Fragment]) -> Result<()> {
        self.fragments_mut()?.extend_from_slice(batch);
        Ok(())
    }

    async fn list_fragments(&self, document_id: &str) -> Result<Vec<Fragment>> {
        let mut out: Vec<Fragment> = self
            .fragments()?
            .iter()
            .filter(|f| f.document_id == document_id)
            .cloned()
            .collect();
        // Stable: insertion order is kept within a page.
        out.sort_by_key(|f| f.page_number);
        Ok(out)
    }

    async fn count_fragments(&self, document_id: &str) -> Result<u64> {
        Ok(self
            .fragments()?
            .iter()
            .filter(|f| f.document_id == document_id)
            .count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::make_fragment;
    use chrono::{Duration, Utc};

    fn doc(id: &str, hash: &str) -> DocumentRecord {
        DocumentRecord {
            id: id.to_string(),
            title: format!("Doc {}", id),
            source: "test".to_string(),
            page_count: 3,
            dedup_hash: hash.to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_documents_roundtrip_and_dedup_lookup() {
        let store = InMemoryFragmentStore::new();
        store.upsert_document(&doc("a", "h1")).await.unwrap();
        let mut newer = doc("b", "h2");
        newer.created_at = Utc::now() + Duration::seconds(5);
        store.upsert_document(&newer).await.unwrap();

        assert_eq!(store.get_document("a").await.unwrap().unwrap().dedup_hash, "h1");
        assert_eq!(store.find_document_by_hash("h2").await.unwrap().unwrap().id, "b");
        assert!(store.find_document_by_hash("zz").await.unwrap().is_none());
        let ids: Vec<String> = store
            .list_documents()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_fragments_ordered_by_page_then_insertion() {
        let store = InMemoryFragmentStore::new();
        let batch1 = vec![
            make_fragment("a", 2, None, "p2-first"),
            make_fragment("a", 1, None, "p1-first"),
        ];
        let batch2 = vec![
            make_fragment("a", 2, None, "p2-second"),
            make_fragment("other", 1, None, "elsewhere"),
        ];
        store.insert_fragments(&batch1).await.unwrap();
        store.insert_fragments(&batch2).await.unwrap();

        let contents: Vec<String> = store
            .list_fragments("a")
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.content)
            .collect();
        assert_eq!(contents, vec!["p1-first", "p2-first", "p2-second"]);
        assert_eq!(store.count_fragments("a").await.unwrap(), 3);

        assert_eq!(store.clear_fragments("a").await.unwrap(), 3);
        assert_eq!(store.count_fragments("a").await.unwrap(), 0);
        assert_eq!(store.count_fragments("other").await.unwrap(), 1);
    }
}
