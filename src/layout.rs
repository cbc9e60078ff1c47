//! Layout sources: where structured page layouts come from.
//!
//! A [`LayoutSource`] reports a page count and analyses a half-open page
//! range, so ingestion can request pages in batches. Three formats are
//! supported out of the box:
//!
//! | Extension | Source |
//! |-----------|--------|
//! | `.json` | Pre-analysed layouts: `[PageLayout]` or `{ "pages": [PageLayout] }` |
//! | `.pdf` | Per-page text via `lopdf`; lines only, no figure regions |
//! | anything else | UTF-8 text, pages separated by form feed (`\x0c`) |

use std::ops::Range;
use std::path::Path;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use pagewise_core::models::PageLayout;

/// Provider of page layouts for one document.
#[async_trait]
pub trait LayoutSource: Send + Sync {
    fn page_count(&self) -> usize;

    /// Layouts for `pages` (0-based, half-open), in page order.
    async fn analyze(&self, pages: Range<usize>) -> Result<Vec<PageLayout>>;
}

/// Layouts already held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticLayout {
    pages: Vec<PageLayout>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LayoutFile {
    Pages(Vec<PageLayout>),
    Wrapped { pages: Vec<PageLayout> },
}

impl StaticLayout {
    pub fn new(pages: Vec<PageLayout>) -> Self {
        Self { pages }
    }

    /// Parse pre-analysed layout JSON.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let file: LayoutFile =
            serde_json::from_slice(bytes).with_context(|| "Failed to parse layout JSON")?;
        let pages = match file {
            LayoutFile::Pages(pages) => pages,
            LayoutFile::Wrapped { pages } => pages,
        };
        Ok(Self { pages })
    }

    /// Plain text, one page per form-feed-separated section.
    pub fn from_text(text: &str) -> Self {
        let pages = text.split('\x0c').map(PageLayout::from_text).collect();
        Self { pages }
    }

    /// Extract per-page text from a PDF.
    pub fn from_pdf(bytes: &[u8]) -> Result<Self> {
        let doc = lopdf::Document::load_mem(bytes).with_context(|| "Failed to parse PDF")?;
        let mut pages = Vec::new();
        for (number, _) in doc.get_pages() {
            let text = doc
                .extract_text(&[number])
                .with_context(|| format!("Failed to extract text from PDF page {}", number))?;
            pages.push(PageLayout::from_text(&text));
        }
        debug!(pages = pages.len(), "extracted PDF text");
        Ok(Self { pages })
    }

    pub fn pages(&self) -> &[PageLayout] {
        &self.pages
    }
}

#[async_trait]
impl LayoutSource for StaticLayout {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    async fn analyze(&self, pages: Range<usize>) -> Result<Vec<PageLayout>> {
        if pages.start > pages.end || pages.end > self.pages.len() {
            bail!(
                "page range {}..{} out of bounds for {} pages",
                pages.start,
                pages.end,
                self.pages.len()
            );
        }
        Ok(self.pages[pages].to_vec())
    }
}

/// Pick a parser by file extension.
pub fn parse_source(path: &Path, bytes: &[u8]) -> Result<StaticLayout> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("json") => StaticLayout::from_json(bytes),
        Some("pdf") => StaticLayout::from_pdf(bytes),
        _ => {
            let text = std::str::from_utf8(bytes)
                .with_context(|| format!("{} is not valid UTF-8 text", path.display()))?;
            Ok(StaticLayout::from_text(text))
        }
    }
}
