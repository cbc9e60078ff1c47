//! Core data models shared by the ingestion and query pipelines.
//!
//! Page layout types mirror the JSON emitted by a layout-analysis service
//! (camelCase keys). [`Fragment`] is the unit of retrieval; everything else
//! is transient.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Axis-aligned box in page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    /// Grow the box by `ratio` of its own size on every side.
    pub fn expanded(&self, ratio: f64) -> BoundingBox {
        let dx = self.width * ratio;
        let dy = self.height * ratio;
        BoundingBox {
            x: self.x - dx,
            y: self.y - dy,
            width: self.width + 2.0 * dx,
            height: self.height + 2.0 * dy,
        }
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.x <= other.x + other.width
            && other.x <= self.x + self.width
            && self.y <= other.y + other.height
            && other.y <= self.y + self.height
    }
}

/// A single line of recognized text on a page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutLine {
    pub text: String,
    #[serde(default)]
    pub bounding_box: Option<BoundingBox>,
    /// Paragraph role reported by the layout service (`title`, `sectionHeading`, ...).
    #[serde(default)]
    pub role: Option<String>,
}

impl LayoutLine {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bounding_box: None,
            role: None,
        }
    }

    pub fn is_positioned(&self) -> bool {
        self.bounding_box.is_some()
    }

    pub fn is_heading(&self) -> bool {
        matches!(
            self.role.as_deref(),
            Some("title") | Some("sectionHeading")
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableCell {
    pub row_index: usize,
    pub column_index: usize,
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutTable {
    pub row_count: usize,
    pub column_count: usize,
    #[serde(default)]
    pub cells: Vec<TableCell>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutFigure {
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub bounding_box: Option<BoundingBox>,
}

/// Structured layout of one page, as produced by layout analysis.
///
/// `page_number` is informational only; the ingestion pipeline assigns
/// absolute page numbers from the page's position in the document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageLayout {
    #[serde(default)]
    pub page_number: Option<u32>,
    #[serde(default)]
    pub lines: Vec<LayoutLine>,
    #[serde(default)]
    pub tables: Vec<LayoutTable>,
    #[serde(default)]
    pub figures: Vec<LayoutFigure>,
}

impl PageLayout {
    /// A page made of unpositioned lines only.
    pub fn from_text(text: &str) -> Self {
        Self {
            page_number: None,
            lines: text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(LayoutLine::plain)
                .collect(),
            tables: Vec::new(),
            figures: Vec::new(),
        }
    }
}

/// A figure element the layout could not see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MissingElement {
    AxisLabels,
    Legend,
    Title,
}

impl fmt::Display for MissingElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MissingElement::AxisLabels => "axis labels",
            MissingElement::Legend => "legend",
            MissingElement::Title => "title",
        };
        f.write_str(label)
    }
}

/// A figure found on a page, before enrichment.
#[derive(Debug, Clone, PartialEq)]
pub struct FigureRecord {
    pub caption: String,
    pub visible_elements: Vec<String>,
    pub missing_elements: BTreeSet<MissingElement>,
    pub needs_inference: bool,
}

/// An addressable slice of document text. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fragment {
    pub id: String,
    pub document_id: String,
    /// Absolute, 1-based page number in the source document.
    pub page_number: u32,
    pub section_title: Option<String>,
    pub content: String,
}

/// A stored document. Fragments reference it by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub id: String,
    pub title: String,
    pub source: String,
    pub page_count: u32,
    /// SHA-256 of the source bytes, used to detect re-uploads.
    pub dedup_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Signals extracted from a user question.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryContext {
    pub page_hint: Option<u32>,
    pub graph_intent: bool,
    /// Lower-cased alphabetic terms of length ≥ 4.
    pub keywords: BTreeSet<String>,
}
