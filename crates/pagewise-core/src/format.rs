//! Answer post-processing into light markup.
//!
//! Bullets become `•` lines, `**bold**` becomes `<strong>`, known header
//! labels get their own paragraph, and blank-line runs are capped.

use std::sync::LazyLock;

use regex::Regex;

/// Labels rendered as paragraph headers when a line starts with `Label:`.
pub const HEADER_LABELS: &[&str] = &[
    "Graph Type",
    "Axes",
    "X-Axis",
    "Y-Axis",
    "Curves",
    "Key Insight",
    "Interpretation",
    "Summary",
    "Answer",
    "Explanation",
    "Note",
];

const MAX_BLANK_RUN: usize = 2;

static BULLET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:\d+\.|[-*•])\s+(.*)$").expect("valid regex"));

static BOLD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*").expect("valid regex"));

static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    let labels: Vec<String> = HEADER_LABELS.iter().map(|l| regex::escape(l)).collect();
    Regex::new(&format!(
        r"(?i)^\s*(?:\*\*)?({})(?:\*\*)?\s*:\s*(?:\*\*)?\s*(.*)$",
        labels.join("|")
    ))
    .expect("valid regex")
});

fn bold(text: &str) -> String {
    BOLD_RE.replace_all(text, "<strong>$1</strong>").into_owned()
}

fn push_blank(out: &mut Vec<String>) {
    if out.last().is_some_and(|l| !l.is_empty()) {
        out.push(String::new());
    }
}

/// Normalize raw model output.
pub fn format_answer(raw: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut in_bullets = false;

    for line in raw.lines() {
        let line = line.trim_end();

        if let Some(caps) = HEADER_RE.captures(line) {
            let label = caps.get(1).map_or("", |m| m.as_str());
            let rest = caps.get(2).map_or("", |m| m.as_str()).trim();
            push_blank(&mut out);
            if rest.is_empty() {
                out.push(format!("<strong>{}:</strong>", label));
            } else {
                out.push(format!("<strong>{}:</strong> {}", label, bold(rest)));
            }
            out.push(String::new());
            in_bullets = false;
            continue;
        }

        if let Some(caps) = BULLET_RE.captures(line) {
            let item = caps.get(1).map_or("", |m| m.as_str()).trim();
            if !in_bullets {
                push_blank(&mut out);
            }
            out.push(format!("• {}", bold(item)));
            in_bullets = true;
            continue;
        }

        if line.trim().is_empty() {
            out.push(String::new());
        } else {
            out.push(bold(line));
            in_bullets = false;
        }
    }

    let mut collapsed: Vec<String> = Vec::with_capacity(out.len());
    let mut blank_run = 0usize;
    for line in out {
        if line.is_empty() {
            blank_run += 1;
            if blank_run > MAX_BLANK_RUN {
                continue;
            }
        } else {
            blank_run = 0;
        }
        collapsed.push(line);
    }

    let start = collapsed.iter().position(|l| !l.is_empty());
    let end = collapsed.iter().rposition(|l| !l.is_empty());
    match (start, end) {
        (Some(s), Some(e)) => collapsed[s..=e].join("\n"),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_then_bullets() {
        let out = format_answer("**Axes:** x and y\n- a\n- b");
        assert_eq!(out, "<strong>Axes:</strong> x and y\n\n• a\n• b");
        assert!(!out.contains("\n\n\n\n"));
    }

    #[test]
    fn test_bullet_styles_normalized() {
        let out = format_answer("Points:\n1. one\n* two\n• three\n-four");
        assert_eq!(out, "Points:\n\n• one\n• two\n• three\n-four");
    }

    #[test]
    fn test_bold_spans() {
        assert_eq!(
            format_answer("The **MFC** lies above **supply**."),
            "The <strong>MFC</strong> lies above <strong>supply</strong>."
        );
    }

    #[test]
    fn test_header_gets_own_paragraph() {
        let out = format_answer("Intro line\nKey Insight: wages fall\nAfter");
        assert_eq!(
            out,
            "Intro line\n\n<strong>Key Insight:</strong> wages fall\n\nAfter"
        );
    }

    #[test]
    fn test_blank_runs_capped_and_trimmed() {
        let out = format_answer("\n\n\nA\n\n\n\n\nB\n\n\n");
        assert_eq!(out, "A\n\n\nB");
    }

    #[test]
    fn test_empty() {
        assert_eq!(format_answer(""), "");
        assert_eq!(format_answer("\n\n"), "");
    }
}
