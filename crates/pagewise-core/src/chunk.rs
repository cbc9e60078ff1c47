//! Sliding-window text chunker.
//!
//! Splits a page's text into overlapping, fixed-size windows measured in
//! characters (not bytes), then wraps each window into a [`Fragment`]
//! carrying the page number and the section heading in effect at the
//! window's start.
//!
//! # Algorithm
//!
//! 1. Clamp `overlap` to `size - 1` and compute `step = max(1, size - overlap)`.
//! 2. Starting at offset 0, emit `text[start .. start + size]` while
//!    `start < len(text)`, advancing `start += step`.
//! 3. After the first window, stop early when the remaining text is shorter
//!    than `size × min_tail_ratio` (a tiny tail is dropped rather than
//!    emitted as a noisy fragment). A ratio of `0.0` keeps every tail.
//!
//! Windows are produced lazily by [`Windows`], which borrows the input and
//! holds only a cursor. Calling [`SlidingWindow::windows`] again with the
//! same text always yields the same sequence.
//!
//! # Example
//!
//! ```rust
//! use pagewise_core::chunk::SlidingWindow;
//!
//! let window = SlidingWindow::new(4, 1).unwrap().with_min_tail_ratio(0.0);
//! let parts: Vec<&str> = window.windows("abcdefghij").map(|w| w.content).collect();
//! assert_eq!(parts, vec!["abcd", "defg", "ghij", "j"]);
//! ```

use anyhow::{bail, Result};
use uuid::Uuid;

use crate::figures::figure_blocks;
use crate::models::Fragment;

/// Default window size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default overlap between consecutive windows, in characters.
pub const DEFAULT_OVERLAP: usize = 150;
/// Default tail policy: drop a trailing window shorter than 10% of `size`.
pub const DEFAULT_MIN_TAIL_RATIO: f64 = 0.1;

/// Chunking parameters. Cheap to copy; holds no per-text state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlidingWindow {
    size: usize,
    overlap: usize,
    min_tail_ratio: f64,
}

impl SlidingWindow {
    /// Build a window of `size` characters with `overlap` characters shared
    /// between neighbours. `overlap` is silently clamped to `size - 1`.
    pub fn new(size: usize, overlap: usize) -> Result<Self> {
        if size == 0 {
            bail!("chunk size must be > 0");
        }
        Ok(Self {
            size,
            overlap: overlap.min(size - 1),
            min_tail_ratio: DEFAULT_MIN_TAIL_RATIO,
        })
    }

    /// Set the tail policy. Values are clamped into `[0.0, 1.0)`.
    pub fn with_min_tail_ratio(mut self, ratio: f64) -> Self {
        self.min_tail_ratio = if ratio.is_finite() {
            ratio.clamp(0.0, 0.999)
        } else {
            0.0
        };
        self
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// The effective (clamped) overlap.
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    pub fn step(&self) -> usize {
        (self.size - self.overlap).max(1)
    }

    pub fn min_tail_ratio(&self) -> f64 {
        self.min_tail_ratio
    }

    /// Lazily iterate over the windows of `text`.
    pub fn windows<'a>(&self, text: &'a str) -> Windows<'a> {
        Windows {
            text,
            size: self.size,
            step: self.step(),
            min_tail: self.size as f64 * self.min_tail_ratio,
            total_chars: text.chars().count(),
            start_char: 0,
            start_byte: 0,
        }
    }
}

impl Default for SlidingWindow {
    fn default() -> Self {
        Self {
            size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
            min_tail_ratio: DEFAULT_MIN_TAIL_RATIO,
        }
    }
}

/// Convenience wrapper: `chunk(text, size, overlap)` with the default tail policy.
pub fn chunk(text: &str, size: usize, overlap: usize) -> Result<Windows<'_>> {
    Ok(SlidingWindow::new(size, overlap)?.windows(text))
}

/// One emitted window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window<'a> {
    /// Start offset in characters.
    pub start: usize,
    pub content: &'a str,
}

/// Pull-based window producer. Cloning it forks the cursor.
#[derive(Debug, Clone)]
pub struct Windows<'a> {
    text: &'a str,
    size: usize,
    step: usize,
    min_tail: f64,
    total_chars: usize,
    start_char: usize,
    start_byte: usize,
}

impl<'a> Iterator for Windows<'a> {
    type Item = Window<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.start_char >= self.total_chars {
            return None;
        }
        let remaining = self.total_chars - self.start_char;
        if self.start_char > 0 && (remaining as f64) < self.min_tail {
            self.start_char = self.total_chars;
            self.start_byte = self.text.len();
            return None;
        }

        let rest = &self.text[self.start_byte..];
        let end_byte = self.start_byte + byte_offset_of_char(rest, self.size);
        let window = Window {
            start: self.start_char,
            content: &self.text[self.start_byte..end_byte],
        };

        self.start_byte += byte_offset_of_char(rest, self.step);
        self.start_char = (self.start_char + self.step).min(self.total_chars);
        Some(window)
    }
}

/// Byte offset of the `n`-th character of `s`, or `s.len()` past the end.
fn byte_offset_of_char(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

/// A heading line and the character offset where it starts in page text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub offset: usize,
    pub text: String,
}

/// The heading in effect at `offset`: the last one starting at or before it.
pub fn section_at(headings: &[Heading], offset: usize) -> Option<String> {
    headings
        .iter()
        .take_while(|h| h.offset <= offset)
        .last()
        .map(|h| h.text.clone())
}

/// Turn one page's (already enriched) text into fragments.
///
/// Emits every window of the page, then one dedicated fragment per
/// `[FIGURE n] … [END FIGURE n]` block so a figure's full marker block is
/// always retrievable in one piece, whatever the window size.
pub fn fragment_page(
    document_id: &str,
    page_number: u32,
    text: &str,
    headings: &[Heading],
    window: &SlidingWindow,
) -> Vec<Fragment> {
    let mut fragments: Vec<Fragment> = window
        .windows(text)
        .filter(|w| !w.content.trim().is_empty())
        .map(|w| {
            make_fragment(
                document_id,
                page_number,
                section_at(headings, w.start),
                w.content,
            )
        })
        .collect();

    for block in figure_blocks(text) {
        let char_offset = text[..block.byte_offset].chars().count();
        fragments.push(make_fragment(
            document_id,
            page_number,
            section_at(headings, char_offset),
            block.text,
        ));
    }

    fragments
}

/// Create a single [`Fragment`] with a fresh UUID.
pub fn make_fragment(
    document_id: &str,
    page_number: u32,
    section_title: Option<String>,
    content: &str,
) -> Fragment {
    Fragment {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        page_number,
        section_title,
        content: content.to_string(),
    }
}
