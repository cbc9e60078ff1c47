//! Ingestion pipeline orchestration.
//!
//! Coordinates the full flow for one document:
//!
//! ```text
//! LayoutSource ──(page batches)──▶ linearize ──▶ Enricher ──▶ fragment_page
//!                                                                  │
//!                          FragmentStore ◀──(storage batches)──────┘
//! ```
//!
//! Progress moves through `uploading → analyzing → chunking → storing →
//! complete`. A layout-analysis or storage failure aborts the run, evicts
//! the progress entry and surfaces as [`PagewiseError::Upstream`]. Figure
//! enrichment failures never abort: the figure keeps a stub block.

use std::path::Path;
use std::time::Instant;

use anyhow::anyhow;
use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info};
use uuid::Uuid;

use pagewise_core::chunk::fragment_page;
use pagewise_core::figures::linearize;
use pagewise_core::models::{DocumentRecord, Fragment, PageLayout};
use pagewise_core::progress::{ProgressObserver, ProgressStage, ProgressTracker};

use crate::error::{PagewiseError, PagewiseResult};
use crate::layout::{parse_source, LayoutSource};
use crate::services::Services;

/// One document to ingest.
pub struct IngestRequest<'a> {
    pub title: String,
    /// Where the document came from (a path or an upload label).
    pub source: String,
    /// SHA-256 of the source bytes; see [`dedup_hash`].
    pub dedup_hash: String,
    pub layout: &'a dyn LayoutSource,
}

/// Counts reported after a successful ingestion.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    pub document_id: String,
    pub pages: usize,
    pub fragments: usize,
    pub figures: usize,
    pub templated: usize,
    pub inferred: usize,
    pub failed: usize,
}

/// Hex SHA-256 of the document's source bytes.
pub fn dedup_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn storage(e: anyhow::Error) -> PagewiseError {
    PagewiseError::upstream("storage", e)
}

fn analysis(e: anyhow::Error) -> PagewiseError {
    PagewiseError::upstream("layout analysis", e)
}

/// Validate the request and create (or reuse, by hash) its document record.
///
/// Bytes seen before keep their document id; the new title and source
/// replace the old ones and the old fragments are replaced once storing
/// begins.
pub async fn register_document(
    services: &Services,
    request: &IngestRequest<'_>,
) -> PagewiseResult<DocumentRecord> {
    let title = request.title.trim();
    if title.is_empty() {
        return Err(PagewiseError::invalid("title must not be empty"));
    }
    let page_count = request.layout.page_count();
    if page_count == 0 {
        return Err(PagewiseError::invalid("document has no pages"));
    }
    let page_count = u32::try_from(page_count)
        .map_err(|_| PagewiseError::invalid("document has too many pages"))?;

    let existing = services
        .store
        .find_document_by_hash(&request.dedup_hash)
        .await
        .map_err(storage)?;

    let document = match existing {
        Some(previous) => {
            info!(document_id = %previous.id, "re-ingesting known document");
            DocumentRecord {
                title: title.to_string(),
                source: request.source.clone(),
                page_count,
                ..previous
            }
        }
        None => DocumentRecord {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            source: request.source.clone(),
            page_count,
            dedup_hash: request.dedup_hash.clone(),
            created_at: Utc::now(),
        },
    };

    services
        .store
        .upsert_document(&document)
        .await
        .map_err(storage)?;
    Ok(document)
}

/// Register and ingest a document in one call.
pub async fn ingest_document(
    services: &Services,
    request: &IngestRequest<'_>,
    observer: Option<&dyn ProgressObserver>,
) -> PagewiseResult<IngestSummary> {
    let document = register_document(services, request).await?;
    ingest_registered(services, &document, request.layout, observer).await
}

/// Run the pipeline for an already registered document.
///
/// Picks up a progress entry recorded when the upload was accepted, so
/// elapsed time counts from acceptance.
pub async fn ingest_registered(
    services: &Services,
    document: &DocumentRecord,
    layout: &dyn LayoutSource,
    observer: Option<&dyn ProgressObserver>,
) -> PagewiseResult<IngestSummary> {
    let started = Instant::now();
    let mut tracker = ProgressTracker::resume(&document.id, services.progress.as_ref(), observer);

    match run_pipeline(services, document, layout, &mut tracker).await {
        Ok(summary) => {
            info!(
                document_id = %summary.document_id,
                pages = summary.pages,
                fragments = summary.fragments,
                figures = summary.figures,
                templated = summary.templated,
                inferred = summary.inferred,
                failed = summary.failed,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "ingestion complete"
            );
            Ok(summary)
        }
        Err(e) => {
            error!(document_id = %document.id, error = %e, "ingestion aborted");
            tracker.abort();
            Err(e)
        }
    }
}

async fn run_pipeline(
    services: &Services,
    document: &DocumentRecord,
    layout: &dyn LayoutSource,
    tracker: &mut ProgressTracker<'_>,
) -> PagewiseResult<IngestSummary> {
    let pages = analyze_pages(services, layout, tracker).await?;
    let total_pages = pages.len();

    let mut summary = IngestSummary {
        document_id: document.id.clone(),
        pages: total_pages,
        ..IngestSummary::default()
    };

    let mut fragments: Vec<Fragment> = Vec::new();
    for (i, (page_number, page)) in pages.iter().enumerate() {
        let linear = linearize(page)
            .map_err(|e| analysis(e.context(format!("page {}", page_number))))?;
        let enriched = services
            .enricher
            .enrich_page(&linear, services.inference.as_ref())
            .await;

        summary.figures += linear.figures.len();
        summary.templated += enriched.count("templated");
        summary.inferred += enriched.count("inferred");
        summary.failed += enriched.count("failed");

        let page_fragments = fragment_page(
            &document.id,
            *page_number,
            &enriched.text,
            &linear.headings,
            &services.window,
        );
        debug!(
            page = page_number,
            figures = linear.figures.len(),
            fragments = page_fragments.len(),
            "page chunked"
        );
        fragments.extend(page_fragments);

        tracker.step(
            ProgressStage::Chunking,
            i + 1,
            total_pages,
            format!("Chunked {} of {} pages", i + 1, total_pages),
        );
    }
    summary.fragments = fragments.len();

    store_fragments(services, document, &fragments, tracker).await?;

    tracker.complete(format!(
        "Ingested {} pages into {} fragments",
        summary.pages, summary.fragments
    ));
    Ok(summary)
}

/// Request layouts in `page_batch_size` batches and number pages globally.
async fn analyze_pages(
    services: &Services,
    layout: &dyn LayoutSource,
    tracker: &mut ProgressTracker<'_>,
) -> PagewiseResult<Vec<(u32, PageLayout)>> {
    let total = layout.page_count();
    let batch_size = services.ingest.page_batch_size.max(1);
    let mut pages = Vec::with_capacity(total);

    tracker.advance(ProgressStage::Analyzing, 0, "Analyzing page layout");

    let mut start = 0;
    while start < total {
        let end = (start + batch_size).min(total);
        let batch = layout.analyze(start..end).await.map_err(analysis)?;
        if batch.len() != end - start {
            return Err(analysis(anyhow!(
                "requested pages {}..{} but received {} layouts",
                start + 1,
                end,
                batch.len()
            )));
        }
        for (local, page) in batch.into_iter().enumerate() {
            pages.push(((start + local + 1) as u32, page));
        }
        debug!(first = start + 1, last = end, "analyzed page batch");
        tracker.step(
            ProgressStage::Analyzing,
            end,
            total,
            format!("Analyzed {} of {} pages", end, total),
        );
        start = end;
    }

    Ok(pages)
}

/// Replace the document's fragments, one transaction per storage batch.
async fn store_fragments(
    services: &Services,
    document: &DocumentRecord,
    fragments: &[Fragment],
    tracker: &mut ProgressTracker<'_>,
) -> PagewiseResult<()> {
    let cleared = services
        .store
        .clear_fragments(&document.id)
        .await
        .map_err(storage)?;
    if cleared > 0 {
        info!(document_id = %document.id, cleared, "replacing previous fragments");
    }

    let total = fragments.len();
    if total == 0 {
        tracker.step(ProgressStage::Storing, 0, 0, "No fragments to store");
        return Ok(());
    }

    let mut stored = 0;
    for batch in fragments.chunks(services.ingest.storage_batch_size.max(1)) {
        services
            .store
            .insert_fragments(batch)
            .await
            .map_err(storage)?;
        stored += batch.len();
        tracker.step(
            ProgressStage::Storing,
            stored,
            total,
            format!("Stored {} of {} fragments", stored, total),
        );
    }
    Ok(())
}

/// Ingest a file from disk (`.json` layouts, `.pdf`, or text).
///
/// The title defaults to the file stem.
pub async fn ingest_file(
    services: &Services,
    path: &Path,
    title: Option<String>,
    observer: Option<&dyn ProgressObserver>,
) -> PagewiseResult<IngestSummary> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| PagewiseError::invalid(format!("cannot read {}: {}", path.display(), e)))?;
    let layout = parse_source(path, &bytes).map_err(analysis)?;

    let title = title.unwrap_or_else(|| {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string())
    });
    let request = IngestRequest {
        title,
        source: path.display().to_string(),
        dedup_hash: dedup_hash(&bytes),
        layout: &layout,
    };
    ingest_document(services, &request, observer).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::layout::StaticLayout;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use pagewise_core::inference::{InferenceProvider, Prompt};
    use pagewise_core::models::{LayoutFigure, LayoutLine, LayoutTable, TableCell};
    use pagewise_core::progress::{ProgressStore, ProgressSnapshot};
    use pagewise_core::store::memory::InMemoryFragmentStore;
    use pagewise_core::store::FragmentStore;
    use std::ops::Range;
    use std::sync::{Arc, Mutex};

    struct Offline;

    #[async_trait]
    impl InferenceProvider for Offline {
        fn name(&self) -> &str {
            "offline"
        }
        async fn complete(&self, _prompt: &Prompt) -> Result<String> {
            bail!("offline")
        }
    }

    /// Serves pages but fails every batch starting at `fail_from`.
    struct Flaky {
        inner: StaticLayout,
        fail_from: usize,
    }

    #[async_trait]
    impl LayoutSource for Flaky {
        fn page_count(&self) -> usize {
            self.inner.page_count()
        }
        async fn analyze(&self, pages: Range<usize>) -> Result<Vec<PageLayout>> {
            if pages.start >= self.fail_from {
                bail!("layout service unavailable");
            }
            self.inner.analyze(pages).await
        }
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(ProgressStage, u8)>>,
    }

    impl ProgressObserver for Recorder {
        fn observe(&self, _document_id: &str, snapshot: &ProgressSnapshot) {
            self.seen
                .lock()
                .unwrap()
                .push((snapshot.stage, snapshot.progress));
        }
    }

    fn services(batch: usize) -> Services {
        let toml = format!(
            "[db]\npath = \"unused.sqlite\"\n[ingest]\npage_batch_size = {}\nstorage_batch_size = 2\n",
            batch
        );
        let config = parse_config(&toml).unwrap();
        Services::new(
            &config,
            Arc::new(InMemoryFragmentStore::new()),
            Arc::new(Offline),
        )
        .unwrap()
    }

    fn text_pages(n: usize) -> StaticLayout {
        let text: Vec<String> = (1..=n).map(|i| format!("Body text of page {}.", i)).collect();
        StaticLayout::from_text(&text.join("\x0c"))
    }

    fn request<'a>(layout: &'a dyn LayoutSource, hash: &str) -> IngestRequest<'a> {
        IngestRequest {
            title: "Notes".to_string(),
            source: "notes.txt".to_string(),
            dedup_hash: hash.to_string(),
            layout,
        }
    }

    #[test]
    fn test_dedup_hash_is_sha256_hex() {
        assert_eq!(
            dedup_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_pages_numbered_across_batches() {
        let services = services(2);
        let layout = text_pages(5);
        let summary = ingest_document(&services, &request(&layout, "h"), None)
            .await
            .unwrap();
        assert_eq!(summary.pages, 5);

        let pool = services
            .store
            .list_fragments(&summary.document_id)
            .await
            .unwrap();
        let pages: Vec<u32> = pool.iter().map(|f| f.page_number).collect();
        assert_eq!(pages, vec![1, 2, 3, 4, 5]);
        assert_eq!(pool[2].content, "Body text of page 3.");
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_completes() {
        let services = services(2);
        let layout = text_pages(3);
        let recorder = Recorder::default();
        let summary = ingest_document(&services, &request(&layout, "h"), Some(&recorder))
            .await
            .unwrap();

        let seen = recorder.seen.lock().unwrap().clone();
        assert_eq!(seen.first(), Some(&(ProgressStage::Uploading, 0)));
        assert_eq!(seen.last(), Some(&(ProgressStage::Complete, 100)));
        assert!(seen.windows(2).all(|w| w[0].0 <= w[1].0 && w[0].1 <= w[1].1));
        assert!(seen.contains(&(ProgressStage::Analyzing, 40)));
        assert!(seen.contains(&(ProgressStage::Chunking, 70)));
        assert!(seen.contains(&(ProgressStage::Storing, 95)));

        let state = services.progress.get(&summary.document_id).unwrap();
        assert_eq!(state.stage, ProgressStage::Complete);
    }

    #[tokio::test]
    async fn test_analysis_failure_evicts_progress() {
        let services = services(2);
        let layout = Flaky {
            inner: text_pages(4),
            fail_from: 2,
        };
        let document = register_document(&services, &request(&layout, "h"))
            .await
            .unwrap();
        let err = ingest_registered(&services, &document, &layout, None)
            .await
            .unwrap_err();

        assert_eq!(err.code(), "upstream_error");
        assert!(err.to_string().contains("layout analysis"));
        assert!(services.progress.get(&document.id).is_none());
        assert_eq!(services.store.count_fragments(&document.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_malformed_table_aborts_ingestion() {
        let services = services(5);
        let page = PageLayout {
            lines: vec![LayoutLine::plain("Quarterly figures.")],
            tables: vec![LayoutTable {
                row_count: 1,
                column_count: 1,
                cells: vec![TableCell {
                    row_index: usize::MAX,
                    column_index: 0,
                    content: "overflow".to_string(),
                }],
            }],
            ..PageLayout::default()
        };
        let layout = StaticLayout::new(vec![page]);
        let document = register_document(&services, &request(&layout, "table"))
            .await
            .unwrap();
        let err = ingest_registered(&services, &document, &layout, None)
            .await
            .unwrap_err();

        assert_eq!(err.code(), "upstream_error");
        assert!(err.to_string().contains("layout analysis"));
        assert!(services.progress.get(&document.id).is_none());
        assert_eq!(services.store.count_fragments(&document.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reingest_replaces_fragments() {
        let services = services(5);
        let layout = text_pages(2);
        let first = ingest_document(&services, &request(&layout, "same"), None)
            .await
            .unwrap();
        let second = ingest_document(&services, &request(&layout, "same"), None)
            .await
            .unwrap();

        assert_eq!(first.document_id, second.document_id);
        assert_eq!(services.store.list_documents().await.unwrap().len(), 1);
        assert_eq!(
            services.store.count_fragments(&first.document_id).await.unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn test_failed_enrichment_keeps_stub_and_continues() {
        let services = services(5);
        let page = PageLayout {
            lines: vec![LayoutLine::plain("Some prose about sunsets.")],
            figures: vec![LayoutFigure {
                caption: Some("Figure 1: Colours".to_string()),
                bounding_box: None,
            }],
            ..PageLayout::default()
        };
        let layout = StaticLayout::new(vec![page]);
        let summary = ingest_document(&services, &request(&layout, "fig"), None)
            .await
            .unwrap();

        assert_eq!(summary.figures, 1);
        assert_eq!(summary.failed, 1);
        let pool = services
            .store
            .list_fragments(&summary.document_id)
            .await
            .unwrap();
        assert!(pool
            .iter()
            .any(|f| f.content.contains("Graph analysis could not be completed")));
    }

    #[tokio::test]
    async fn test_rejects_empty_title_and_empty_document() {
        let services = services(5);
        let layout = text_pages(1);
        let mut req = request(&layout, "h");
        req.title = "   ".to_string();
        let err = ingest_document(&services, &req, None).await.unwrap_err();
        assert_eq!(err.code(), "bad_request");

        let empty = StaticLayout::new(Vec::new());
        let err = ingest_document(&services, &request(&empty, "e"), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no pages"));
    }
}
