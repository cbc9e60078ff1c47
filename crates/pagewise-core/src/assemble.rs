//! Context assembly under a character budget.

use crate::models::Fragment;

pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 6000;

const SEPARATOR: &str = "\n\n";

/// `[Page n] content`
pub fn format_block(fragment: &Fragment) -> String {
    format!("[Page {}] {}", fragment.page_number, fragment.content)
}

/// The assembled context and which fragments made it in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssembledContext {
    pub text: String,
    /// Number of leading fragments of the ranked input that were kept.
    pub used: usize,
    /// Distinct pages of the kept fragments, in order of first appearance.
    pub pages: Vec<u32>,
}

/// Greedily pack ranked fragments into `max_chars`.
///
/// Blocks are taken in order. The first block that would overflow the
/// remaining budget (counting the two-character separator before every
/// block but the first) is skipped and packing stops; no later, smaller
/// fragment is pulled in to fill the gap. Lengths are in characters.
pub fn assemble<'a, I>(ranked: I, max_chars: usize) -> AssembledContext
where
    I: IntoIterator<Item = &'a Fragment>,
{
    let mut out = AssembledContext::default();
    let mut len = 0usize;
    for fragment in ranked {
        let block = format_block(fragment);
        let sep = if out.used == 0 { 0 } else { SEPARATOR.len() };
        let cost = block.chars().count() + sep;
        if len + cost > max_chars {
            break;
        }
        if sep > 0 {
            out.text.push_str(SEPARATOR);
        }
        out.text.push_str(&block);
        len += cost;
        out.used += 1;
        if !out.pages.contains(&fragment.page_number) {
            out.pages.push(fragment.page_number);
        }
    }
    out
}

/// Convenience wrapper returning only the context text.
pub fn assemble_context<'a, I>(ranked: I, max_chars: usize) -> String
where
    I: IntoIterator<Item = &'a Fragment>,
{
    assemble(ranked, max_chars).text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::make_fragment;

    fn frag(page: u32, len: usize) -> Fragment {
        make_fragment("doc", page, None, &"x".repeat(len))
    }

    #[test]
    fn test_empty_input() {
        let out = assemble(std::iter::empty(), 100);
        assert_eq!(out.text, "");
        assert_eq!(out.used, 0);
    }

    #[test]
    fn test_format_and_join() {
        let a = make_fragment("doc", 2, None, "alpha");
        let b = make_fragment("doc", 5, None, "beta");
        let text = assemble_context([&a, &b], 6000);
        assert_eq!(text, "[Page 2] alpha\n\n[Page 5] beta");
    }

    #[test]
    fn test_never_exceeds_budget() {
        let fragments: Vec<Fragment> = (1..=20).map(|p| frag(p, 37 * p as usize)).collect();
        for max in [0, 10, 50, 200, 1000, 6000] {
            let text = assemble_context(&fragments, max);
            assert!(text.chars().count() <= max, "budget {} exceeded", max);
        }
    }

    #[test]
    fn test_skip_and_stop() {
        // "[Page 1] " is 9 chars.
        let big = frag(1, 50);
        let small = frag(2, 1);
        let first = frag(3, 10);
        let out = assemble([&first, &big, &small], 40);
        assert_eq!(out.used, 1);
        assert_eq!(out.pages, vec![3]);
        assert!(!out.text.contains("[Page 2]"));
    }

    #[test]
    fn test_exact_fit_is_kept() {
        let a = frag(1, 11); // 20 chars formatted
        let b = frag(2, 9); // 18 + 2 separator
        let out = assemble([&a, &b], 40);
        assert_eq!(out.used, 2);
        assert_eq!(out.text.chars().count(), 40);
    }

    #[test]
    fn test_dropping_last_kept_preserves_prefix() {
        let fragments: Vec<Fragment> = (1..=6).map(|p| frag(p, 30)).collect();
        let full = assemble(&fragments, 150);
        assert!(full.used >= 2);
        let shorter = assemble(&fragments[..full.used - 1], 150);
        assert!(full.text.starts_with(&shorter.text));
        assert_eq!(shorter.used, full.used - 1);
    }

    #[test]
    fn test_multibyte_counted_in_chars() {
        let f = make_fragment("doc", 1, None, &"é".repeat(11));
        let out = assemble([&f], 20);
        assert_eq!(out.used, 1);
    }
}
