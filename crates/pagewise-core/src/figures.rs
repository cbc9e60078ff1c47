//! Figure extraction, fallback graph detection, and page linearization.
//!
//! A page is linearized in reading order: lines, then tables, then figures.
//! Tables and figures are wrapped in marker blocks so later stages can find
//! them by pattern:
//!
//! ```text
//! [TABLE 1]
//! Year | Output
//! [END TABLE 1]
//! [FIGURE 1]
//! Caption: Cost curves
//! Visible elements: MC | ATC | Q
//! Missing elements: legend
//! [END FIGURE 1]
//! ```
//!
//! Figure and table indices are 1-based and local to the page.
//!
//! Layout services frequently report no figure objects for unlabeled
//! academic diagrams. When a page has none, [`detect_implied_figure`] looks
//! for graph-like cues in the raw lines and synthesizes one pseudo-figure.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use anyhow::{bail, Result};
use regex::Regex;

use crate::chunk::Heading;
use crate::models::{
    FigureRecord, LayoutFigure, LayoutLine, LayoutTable, MissingElement, PageLayout,
};

/// Caption used when the layout reports a figure without one.
pub const PLACEHOLDER_CAPTION: &str = "Untitled figure";
/// Caption of the pseudo-figure synthesized by the fallback detector.
pub const IMPLIED_CAPTION: &str = "Implied graph detected.";

/// Fraction of a figure's size added on every side when matching nearby lines.
const NEARBY_MARGIN: f64 = 0.1;

static AXIS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[xyz][\s-]?axis\b|\b(horizontal|vertical)\b").expect("valid regex")
});
static LEGEND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(legend|key)\b").expect("valid regex"));
static SINGLE_LETTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]$").expect("valid regex"));
static EQUATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]{1,3}\s*=\s*\S").expect("valid regex"));
static GRAPH_WORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(figure|fig\.|graph|chart|diagram)\b").expect("valid regex")
});
static GRAPH_PHRASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(under monopsony|supply and demand|marginal (cost|revenue|product)|equilibrium (price|wage|quantity)|production possibilit|phase diagram|free[- ]body diagram|titration curve|energy profile|growth curve)",
    )
    .expect("valid regex")
});
static FIGURE_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[FIGURE (\d+)\]").expect("valid regex"));

/// Build a [`FigureRecord`] for one figure region on a page.
pub fn extract_figure(figure: &LayoutFigure, lines: &[LayoutLine]) -> FigureRecord {
    let caption = figure
        .caption
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(PLACEHOLDER_CAPTION)
        .to_string();

    let positioned: Vec<&LayoutLine> = lines.iter().filter(|l| l.is_positioned()).collect();
    let nearby: Vec<&LayoutLine> = match figure.bounding_box {
        Some(region) => {
            let grown = region.expanded(NEARBY_MARGIN);
            positioned
                .iter()
                .copied()
                .filter(|l| l.bounding_box.is_some_and(|b| b.intersects(&grown)))
                .collect()
        }
        None => positioned.clone(),
    };
    let chosen = if nearby.is_empty() { positioned } else { nearby };

    let visible_elements: Vec<String> = chosen
        .iter()
        .map(|l| l.text.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    let has_caption = figure.caption.as_deref().is_some_and(|c| !c.trim().is_empty());
    let caption_text = if has_caption { caption.as_str() } else { "" };

    let mut missing = BTreeSet::new();
    let has_axis = AXIS_RE.is_match(caption_text)
        || visible_elements.iter().any(|t| AXIS_RE.is_match(t));
    if !has_axis {
        missing.insert(MissingElement::AxisLabels);
    }
    let has_legend = LEGEND_RE.is_match(caption_text)
        || visible_elements.iter().any(|t| LEGEND_RE.is_match(t));
    if !has_legend {
        missing.insert(MissingElement::Legend);
    }
    let has_title = caption_text.chars().count() > 10
        || visible_elements.iter().any(|t| t.chars().count() > 20);
    if !has_title {
        missing.insert(MissingElement::Title);
    }

    FigureRecord {
        caption,
        visible_elements,
        needs_inference: !missing.is_empty(),
        missing_elements: missing,
    }
}

/// True when a line looks like part of a graph that layout analysis missed.
pub fn is_graph_cue(line: &str) -> bool {
    let line = line.trim();
    SINGLE_LETTER_RE.is_match(line)
        || EQUATION_RE.is_match(line)
        || GRAPH_WORD_RE.is_match(line)
        || GRAPH_PHRASE_RE.is_match(line)
}

/// Synthesize a single pseudo-figure when any line carries a graph cue.
pub fn detect_implied_figure(lines: &[LayoutLine]) -> Option<FigureRecord> {
    if !lines.iter().any(|l| is_graph_cue(&l.text)) {
        return None;
    }
    Some(FigureRecord {
        caption: IMPLIED_CAPTION.to_string(),
        visible_elements: lines
            .iter()
            .map(|l| l.text.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        missing_elements: [
            MissingElement::AxisLabels,
            MissingElement::Legend,
            MissingElement::Title,
        ]
        .into_iter()
        .collect(),
        needs_inference: true,
    })
}

/// All figures on a page, falling back to an implied figure when the
/// layout reports none.
pub fn figures_for_page(page: &PageLayout) -> Vec<FigureRecord> {
    if page.figures.is_empty() {
        return detect_implied_figure(&page.lines).into_iter().collect();
    }
    page.figures
        .iter()
        .map(|f| extract_figure(f, &page.lines))
        .collect()
}

/// Render a table as a `[TABLE n]` block, one row per line.
///
/// Only rows and columns that hold at least one cell are rendered, so the
/// output is bounded by the number of cells whatever counts the layout
/// declares. A cell outside the declared `rowCount` × `columnCount` grid is
/// an error.
pub fn render_table(index: usize, table: &LayoutTable) -> Result<String> {
    let mut rows: BTreeMap<usize, BTreeMap<usize, &str>> = BTreeMap::new();
    let mut columns = BTreeSet::new();
    for cell in &table.cells {
        if cell.row_index >= table.row_count || cell.column_index >= table.column_count {
            bail!(
                "table {} cell ({}, {}) is outside its {}x{} grid",
                index,
                cell.row_index,
                cell.column_index,
                table.row_count,
                table.column_count
            );
        }
        columns.insert(cell.column_index);
        rows.entry(cell.row_index)
            .or_default()
            .insert(cell.column_index, cell.content.trim());
    }

    let mut out = format!("[TABLE {}]\n", index);
    for cells in rows.values() {
        let row: Vec<&str> = columns
            .iter()
            .map(|c| cells.get(c).copied().unwrap_or(""))
            .collect();
        out.push_str(&row.join(" | "));
        out.push('\n');
    }
    out.push_str(&format!("[END TABLE {}]", index));
    Ok(out)
}

/// Render a figure as a `[FIGURE n]` block without interpretation.
pub fn render_figure(index: usize, figure: &FigureRecord) -> String {
    let mut out = format!("[FIGURE {}]\nCaption: {}\n", index, figure.caption);
    if !figure.visible_elements.is_empty() {
        out.push_str(&format!(
            "Visible elements: {}\n",
            figure.visible_elements.join(" | ")
        ));
    }
    if !figure.missing_elements.is_empty() {
        let missing: Vec<String> = figure.missing_elements.iter().map(|m| m.to_string()).collect();
        out.push_str(&format!("Missing elements: {}\n", missing.join(", ")));
    }
    out.push_str(&format!("[END FIGURE {}]", index));
    out
}

/// A page flattened to text, plus what is needed to enrich and chunk it.
#[derive(Debug, Clone)]
pub struct LinearPage {
    /// Full text: lines, tables, then figure blocks.
    pub text: String,
    /// Lines only; the "surrounding text" handed to classification.
    pub prose: String,
    pub figures: Vec<FigureRecord>,
    pub headings: Vec<Heading>,
}

/// Flatten a page in reading order (lines → tables → figures).
///
/// Fails when a table's cells do not fit its declared grid.
pub fn linearize(page: &PageLayout) -> Result<LinearPage> {
    let mut text = String::new();
    let mut headings = Vec::new();
    let mut char_len = 0usize;

    for line in &page.lines {
        let trimmed = line.text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if line.is_heading() {
            headings.push(Heading {
                offset: char_len,
                text: trimmed.to_string(),
            });
        }
        text.push_str(trimmed);
        text.push('\n');
        char_len += trimmed.chars().count() + 1;
    }
    let prose = text.trim_end().to_string();

    for (i, table) in page.tables.iter().enumerate() {
        text.push_str(&render_table(i + 1, table)?);
        text.push('\n');
    }

    let figures = figures_for_page(page);
    for (i, figure) in figures.iter().enumerate() {
        text.push_str(&render_figure(i + 1, figure));
        text.push('\n');
    }

    Ok(LinearPage {
        text: text.trim_end().to_string(),
        prose,
        figures,
        headings,
    })
}

/// Insert `interpretation` immediately before `[END FIGURE index]`.
///
/// Returns `None` when the page text has no such marker.
pub fn splice_interpretation(text: &str, index: usize, interpretation: &str) -> Option<String> {
    let end_marker = format!("[END FIGURE {}]", index);
    let pos = text.find(&end_marker)?;
    let mut out = String::with_capacity(text.len() + interpretation.len() + 1);
    out.push_str(&text[..pos]);
    out.push_str(interpretation.trim_end());
    out.push('\n');
    out.push_str(&text[pos..]);
    Some(out)
}

/// A complete `[FIGURE n] … [END FIGURE n]` block found in text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FigureBlock<'a> {
    pub index: usize,
    pub byte_offset: usize,
    pub text: &'a str,
}

/// Find every complete figure block. Unterminated blocks are skipped.
pub fn figure_blocks(text: &str) -> Vec<FigureBlock<'_>> {
    let mut blocks = Vec::new();
    for caps in FIGURE_OPEN_RE.captures_iter(text) {
        let (Some(whole), Some(num)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let Ok(index) = num.as_str().parse::<usize>() else {
            continue;
        };
        let end_marker = format!("[END FIGURE {}]", index);
        if let Some(rel) = text[whole.end()..].find(&end_marker) {
            let end = whole.end() + rel + end_marker.len();
            blocks.push(FigureBlock {
                index,
                byte_offset: whole.start(),
                text: &text[whole.start()..end],
            });
        }
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BoundingBox, TableCell};

    fn positioned(text: &str, x: f64, y: f64) -> LayoutLine {
        LayoutLine {
            text: text.to_string(),
            bounding_box: Some(BoundingBox {
                x,
                y,
                width: 1.0,
                height: 0.2,
            }),
            role: None,
        }
    }

    #[test]
    fn test_caption_placeholder() {
        let rec = extract_figure(&LayoutFigure::default(), &[]);
        assert_eq!(rec.caption, PLACEHOLDER_CAPTION);
        assert!(rec.needs_inference);
        assert_eq!(rec.missing_elements.len(), 3);
    }

    #[test]
    fn test_complete_figure_needs_no_inference() {
        let figure = LayoutFigure {
            caption: Some("Figure 3: Legend shows demand shift".to_string()),
            bounding_box: None,
        };
        let lines = vec![positioned("x-axis: quantity", 1.0, 1.0)];
        let rec = extract_figure(&figure, &lines);
        assert!(rec.missing_elements.is_empty());
        assert!(!rec.needs_inference);
    }

    #[test]
    fn test_only_nearby_lines_are_visible() {
        let figure = LayoutFigure {
            caption: None,
            bounding_box: Some(BoundingBox {
                x: 0.0,
                y: 0.0,
                width: 2.0,
                height: 2.0,
            }),
        };
        let lines = vec![
            positioned("MC", 0.5, 0.5),
            positioned("far away footnote", 8.0, 9.0),
            LayoutLine::plain("unpositioned"),
        ];
        let rec = extract_figure(&figure, &lines);
        assert_eq!(rec.visible_elements, vec!["MC".to_string()]);
    }

    #[test]
    fn test_graph_cues() {
        assert!(is_graph_cue("W"));
        assert!(is_graph_cue("MC = 2Q + 5"));
        assert!(is_graph_cue("See the chart below"));
        assert!(is_graph_cue("Labor Market Under Monopsony"));
        assert!(!is_graph_cue("An ordinary sentence about wages."));
        assert!(!is_graph_cue("AB"));
    }

    #[test]
    fn test_fallback_synthesizes_single_figure() {
        let page = PageLayout::from_text("Some prose.\nW\nMore prose.");
        let figs = figures_for_page(&page);
        assert_eq!(figs.len(), 1);
        assert_eq!(figs[0].caption, IMPLIED_CAPTION);
        assert_eq!(figs[0].visible_elements.len(), 3);
        assert_eq!(figs[0].missing_elements.len(), 3);
    }

    #[test]
    fn test_no_cues_no_figure() {
        let page = PageLayout::from_text("Plain paragraph.\nAnother plain one.");
        assert!(figures_for_page(&page).is_empty());
    }

    #[test]
    fn test_render_table() {
        let table = LayoutTable {
            row_count: 2,
            column_count: 2,
            cells: vec![
                TableCell {
                    row_index: 0,
                    column_index: 0,
                    content: "Year".into(),
                },
                TableCell {
                    row_index: 0,
                    column_index: 1,
                    content: "GDP".into(),
                },
                TableCell {
                    row_index: 1,
                    column_index: 0,
                    content: "2020".into(),
                },
                TableCell {
                    row_index: 1,
                    column_index: 1,
                    content: "21.0".into(),
                },
            ],
        };
        assert_eq!(
            render_table(1, &table).unwrap(),
            "[TABLE 1]\nYear | GDP\n2020 | 21.0\n[END TABLE 1]"
        );
    }

    #[test]
    fn test_render_table_rejects_cells_outside_grid() {
        let table = LayoutTable {
            row_count: 1,
            column_count: 1,
            cells: vec![TableCell {
                row_index: usize::MAX,
                column_index: 0,
                content: "x".into(),
            }],
        };
        assert!(render_table(1, &table).is_err());

        let page = PageLayout {
            tables: vec![table],
            ..Default::default()
        };
        assert!(linearize(&page).is_err());
    }

    #[test]
    fn test_render_table_ignores_oversized_declared_grid() {
        let table = LayoutTable {
            row_count: 1_000_000_000_000,
            column_count: 1_000_000_000_000,
            cells: vec![
                TableCell {
                    row_index: 7,
                    column_index: 900_000,
                    content: "a".into(),
                },
                TableCell {
                    row_index: 7,
                    column_index: 3,
                    content: "b".into(),
                },
                TableCell {
                    row_index: 500_000_000,
                    column_index: 3,
                    content: "c".into(),
                },
            ],
        };
        assert_eq!(
            render_table(2, &table).unwrap(),
            "[TABLE 2]\nb | a\nc | \n[END TABLE 2]"
        );
    }

    #[test]
    fn test_linearize_reading_order_and_headings() {
        let page = PageLayout {
            page_number: None,
            lines: vec![
                LayoutLine {
                    text: "Cost Theory".into(),
                    bounding_box: None,
                    role: Some("sectionHeading".into()),
                },
                LayoutLine::plain("Firms minimize cost."),
            ],
            tables: vec![LayoutTable {
                row_count: 1,
                column_count: 1,
                cells: vec![TableCell {
                    row_index: 0,
                    column_index: 0,
                    content: "Q".into(),
                }],
            }],
            figures: vec![LayoutFigure {
                caption: Some("Average cost".into()),
                bounding_box: None,
            }],
        };
        let linear = linearize(&page).unwrap();
        let table_pos = linear.text.find("[TABLE 1]").unwrap();
        let figure_pos = linear.text.find("[FIGURE 1]").unwrap();
        assert!(linear.text.find("Firms").unwrap() < table_pos);
        assert!(table_pos < figure_pos);
        assert_eq!(linear.headings.len(), 1);
        assert_eq!(linear.headings[0].offset, 0);
        assert_eq!(linear.prose, "Cost Theory\nFirms minimize cost.");
    }

    #[test]
    fn test_splice_before_end_marker() {
        let text = "[FIGURE 1]\nCaption: A\n[END FIGURE 1]";
        let spliced =
            splice_interpretation(text, 1, "[GRAPH STRUCTURE]\nx\n[END GRAPH STRUCTURE]").unwrap();
        assert!(spliced.contains("[END GRAPH STRUCTURE]\n[END FIGURE 1]"));
        assert!(splice_interpretation(text, 2, "y").is_none());
    }

    #[test]
    fn test_figure_blocks_found() {
        let text = "intro\n[FIGURE 1]\na\n[END FIGURE 1]\nmid\n[FIGURE 2]\nb\n[END FIGURE 2]\n[FIGURE 3]\nno end";
        let blocks = figure_blocks(text);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].index, 1);
        assert!(blocks[1].text.ends_with("[END FIGURE 2]"));
        assert_eq!(&text[blocks[0].byte_offset..blocks[0].byte_offset + 10], "[FIGURE 1]");
    }
}
