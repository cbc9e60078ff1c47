//! Candidate filtering by page window.

use crate::models::Fragment;

/// Pages within one of `hint`, never below page 1.
pub fn page_window(hint: u32) -> std::ops::RangeInclusive<u32> {
    hint.saturating_sub(1).max(1)..=hint.saturating_add(1)
}

/// Narrow the fragment pool to the hinted page and its neighbours.
///
/// Fails open: with no hint, or when no fragment falls in the window, the
/// whole pool is returned.
pub fn filter_candidates<'a>(all: &'a [Fragment], page_hint: Option<u32>) -> Vec<&'a Fragment> {
    let Some(hint) = page_hint else {
        return all.iter().collect();
    };
    let window = page_window(hint);
    let filtered: Vec<&Fragment> = all
        .iter()
        .filter(|f| window.contains(&f.page_number))
        .collect();
    if filtered.is_empty() {
        all.iter().collect()
    } else {
        filtered
    }
}
