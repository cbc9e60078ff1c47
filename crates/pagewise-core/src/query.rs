//! Question analysis: page hint, graph intent and keywords.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::QueryContext;

static PAGE_HINT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)page\s+(\d{1,3})").expect("valid regex"));

static GRAPH_INTENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(figures?|figs?|graphs?|charts?|diagrams?|plots?|curves?|illustrations?|images?|visuals?|visualization)\b",
    )
    .expect("valid regex")
});

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z]{4,}").expect("valid regex"));

/// Page number mentioned in the question, e.g. "what is on page 12?".
pub fn page_hint(question: &str) -> Option<u32> {
    PAGE_HINT_RE
        .captures(question)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

pub fn has_graph_intent(question: &str) -> bool {
    GRAPH_INTENT_RE.is_match(question)
}

/// Alphabetic runs of length ≥ 4 from the lower-cased question.
pub fn keywords(question: &str) -> BTreeSet<String> {
    let lowered = question.to_lowercase();
    WORD_RE
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Derive the [`QueryContext`] for a question. An explicit hint wins over
/// one found in the text.
pub fn analyze(question: &str, explicit_page_hint: Option<u32>) -> QueryContext {
    QueryContext {
        page_hint: explicit_page_hint.or_else(|| page_hint(question)),
        graph_intent: has_graph_intent(question),
        keywords: keywords(question),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_hint_from_text() {
        assert_eq!(page_hint("What does page 12 say?"), Some(12));
        assert_eq!(page_hint("Explain PAGE   7 please"), Some(7));
        assert_eq!(page_hint("page 3 and page 9"), Some(3));
        assert_eq!(page_hint("pages are long"), None);
    }

    #[test]
    fn test_page_hint_takes_first_three_digits_of_any_match() {
        assert_eq!(page_hint("see page 1234"), Some(123));
        assert_eq!(page_hint("the webpage 5 shows"), Some(5));
    }

    #[test]
    fn test_explicit_hint_wins() {
        let ctx = analyze("what is on page 4?", Some(9));
        assert_eq!(ctx.page_hint, Some(9));
        assert_eq!(analyze("what is on page 4?", None).page_hint, Some(4));
    }

    #[test]
    fn test_graph_intent() {
        assert!(has_graph_intent("Explain the graph on page 3"));
        assert!(has_graph_intent("What do the curves show?"));
        assert!(has_graph_intent("Describe Figure 2"));
        assert!(has_graph_intent("any visual here?"));
        assert!(!has_graph_intent("Summarize the argument about wages"));
        assert!(!has_graph_intent("Is this configured?"));
    }

    #[test]
    fn test_keywords_are_deduplicated_lowercase() {
        let kw = keywords("Wage wage WAGE and the MRP of labor markets");
        let expected: BTreeSet<String> = ["wage", "labor", "markets"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(kw, expected);
    }
}
