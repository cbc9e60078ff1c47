//! SQLite-backed [`FragmentStore`] implementation.
//!
//! Fragments carry an `ordinal` assigned at insert time (per document,
//! increasing), so a pool reads back by page and then in the order it was
//! written. Each `insert_fragments` call is one transaction.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use pagewise_core::models::{DocumentRecord, Fragment};
use pagewise_core::store::FragmentStore;

/// SQLite implementation of the [`FragmentStore`] trait.
pub struct SqliteFragmentStore {
    pool: SqlitePool,
}

impl SqliteFragmentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn document_from_row(row: &SqliteRow) -> DocumentRecord {
    let created_at: i64 = row.get("created_at");
    let page_count: i64 = row.get("page_count");
    DocumentRecord {
        id: row.get("id"),
        title: row.get("title"),
        source: row.get("source"),
        page_count: page_count.max(0) as u32,
        dedup_hash: row.get("dedup_hash"),
        created_at: DateTime::<Utc>::from_timestamp(created_at, 0).unwrap_or_default(),
    }
}

const DOCUMENT_COLUMNS: &str = "id, title, source, page_count, dedup_hash, created_at";

#[async_trait]
impl FragmentStore for SqliteFragmentStore {
    async fn upsert_document(&self, doc: &DocumentRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, title, source, page_count, dedup_hash, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                source = excluded.source,
                page_count = excluded.page_count,
                dedup_hash = excluded.dedup_hash
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.title)
        .bind(&doc.source)
        .bind(i64::from(doc.page_count))
        .bind(&doc.dedup_hash)
        .bind(doc.created_at.timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_document_by_hash(&self, dedup_hash: &str) -> Result<Option<DocumentRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE dedup_hash = ?",
            DOCUMENT_COLUMNS
        ))
        .bind(dedup_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(document_from_row))
    }

    async fn get_document(&self, id: &str) -> Result<Option<DocumentRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE id = ?",
            DOCUMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(document_from_row))
    }

    async fn list_documents(&self) -> Result<Vec<DocumentRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM documents ORDER BY created_at DESC, id ASC",
            DOCUMENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(document_from_row).collect())
    }

    async fn clear_fragments(&self, document_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM fragments WHERE document_id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_fragments(&self, fragments: &[Fragment]) -> Result<()> {
        if fragments.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        let mut next_ordinal: HashMap<&str, i64> = HashMap::new();

        for fragment in fragments {
            let doc_id = fragment.document_id.as_str();
            let ordinal = match next_ordinal.get(doc_id) {
                Some(n) => *n,
                None => {
                    sqlx::query_scalar::<_, i64>(
                        "SELECT COALESCE(MAX(ordinal) + 1, 0) FROM fragments WHERE document_id = ?",
                    )
                    .bind(doc_id)
                    .fetch_one(&mut *tx)
                    .await?
                }
            };
            next_ordinal.insert(doc_id, ordinal + 1);

            sqlx::query(
                r#"
                INSERT INTO fragments (id, document_id, page_number, ordinal, section_title, content)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&fragment.id)
            .bind(doc_id)
            .bind(i64::from(fragment.page_number))
            .bind(ordinal)
            .bind(&fragment.section_title)
            .bind(&fragment.content)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_fragments(&self, document_id: &str) -> Result<Vec<Fragment>> {
        let rows = sqlx::query(
            r#"
            SELECT id, document_id, page_number, section_title, content
            FROM fragments
            WHERE document_id = ?
            ORDER BY page_number ASC, ordinal ASC
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let page: i64 = row.get("page_number");
                Fragment {
                    id: row.get("id"),
                    document_id: row.get("document_id"),
                    page_number: page.max(0) as u32,
                    section_title: row.get("section_title"),
                    content: row.get("content"),
                }
            })
            .collect())
    }

    async fn count_fragments(&self, document_id: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM fragments WHERE document_id = ?")
            .bind(document_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}
