//! Relevance ranking: TF-IDF over the candidate pool plus a graph boost.
//!
//! # Scoring
//!
//! For each candidate fragment `f` and query keyword `k`:
//!
//! ```text
//! tf(k, f) = whole-word, case-insensitive occurrences of k in f
//! idf(k)   = ln((N + 1) / (df(k) + 1))     N = candidates, df = candidates containing k
//! score(f) = Σ tf(k, f) × idf(k)  [+ graph_boost if graph intent and f carries a marker]
//! ```
//!
//! A marker is a `[GRAPH STRUCTURE]` or `[FIGURE n]` tag in the content.
//!
//! # Selection
//!
//! - Graph intent: the top `graph_marker_limit` marker fragments (ties go to
//!   the hinted page) followed by the top `graph_text_limit` others.
//! - Otherwise: up to `text_limit` fragments with a positive score. When
//!   nothing scores, one representative per page (best score, then longest),
//!   pages ascending.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::enrich::GRAPH_OPEN;
use crate::models::{Fragment, QueryContext};

static FIGURE_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[FIGURE \d+\]").expect("valid regex"));

pub const DEFAULT_GRAPH_BOOST: f64 = 10.0;

/// Ranking tuning parameters, decoupled from application config.
#[derive(Debug, Clone)]
pub struct RetrievalParams {
    /// Added to marker-bearing fragments under graph intent.
    pub graph_boost: f64,
    /// Marker fragments kept under graph intent.
    pub graph_marker_limit: usize,
    /// Non-marker fragments kept under graph intent.
    pub graph_text_limit: usize,
    /// Fragments kept without graph intent.
    pub text_limit: usize,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            graph_boost: DEFAULT_GRAPH_BOOST,
            graph_marker_limit: 5,
            graph_text_limit: 3,
            text_limit: 3,
        }
    }
}

/// A candidate with its scores.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredFragment<'a> {
    pub fragment: &'a Fragment,
    /// TF-IDF relevance alone.
    pub relevance: f64,
    /// Relevance plus any graph boost; the ranking key.
    pub score: f64,
    pub has_marker: bool,
}

/// Whether the content carries a graph or figure marker.
pub fn has_marker(content: &str) -> bool {
    content.contains(GRAPH_OPEN) || FIGURE_MARKER_RE.is_match(content)
}

fn term_counts(content: &str) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for token in content
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        *counts.entry(token.to_string()).or_insert(0) += 1;
    }
    counts
}

/// TF-IDF relevance of each candidate, in input order.
pub fn tf_idf_scores(candidates: &[&Fragment], keywords: &[String]) -> Vec<f64> {
    let counts: Vec<HashMap<String, usize>> =
        candidates.iter().map(|f| term_counts(&f.content)).collect();
    let n = candidates.len() as f64;

    let idf: Vec<f64> = keywords
        .iter()
        .map(|k| {
            let df = counts.iter().filter(|c| c.contains_key(k)).count() as f64;
            ((n + 1.0) / (df + 1.0)).ln()
        })
        .collect();

    counts
        .iter()
        .map(|c| {
            keywords
                .iter()
                .zip(&idf)
                .map(|(k, idf)| c.get(k).copied().unwrap_or(0) as f64 * idf)
                .sum()
        })
        .collect()
}

/// Score every candidate. Output order matches input order.
pub fn score_candidates<'a>(
    candidates: &[&'a Fragment],
    ctx: &QueryContext,
    params: &RetrievalParams,
) -> Vec<ScoredFragment<'a>> {
    let keywords: Vec<String> = ctx.keywords.iter().cloned().collect();
    let relevance = tf_idf_scores(candidates, &keywords);
    candidates
        .iter()
        .zip(relevance)
        .map(|(fragment, relevance)| {
            let has_marker = has_marker(&fragment.content);
            let boost = if ctx.graph_intent && has_marker {
                params.graph_boost
            } else {
                0.0
            };
            ScoredFragment {
                fragment,
                relevance,
                score: relevance + boost,
                has_marker,
            }
        })
        .collect()
}

fn by_score_desc(a: &ScoredFragment<'_>, b: &ScoredFragment<'_>) -> Ordering {
    b.score.total_cmp(&a.score)
}

/// Apply the selection policy to scored candidates. Best first.
pub fn select<'a>(
    mut scored: Vec<ScoredFragment<'a>>,
    ctx: &QueryContext,
    params: &RetrievalParams,
) -> Vec<ScoredFragment<'a>> {
    if ctx.graph_intent {
        let on_hint = |s: &ScoredFragment<'_>| Some(s.fragment.page_number) == ctx.page_hint;
        let (mut markers, mut others): (Vec<_>, Vec<_>) =
            scored.into_iter().partition(|s| s.has_marker);
        markers.sort_by(|a, b| by_score_desc(a, b).then_with(|| on_hint(b).cmp(&on_hint(a))));
        others.sort_by(by_score_desc);
        markers.truncate(params.graph_marker_limit);
        others.truncate(params.graph_text_limit);
        markers.extend(others);
        return markers;
    }

    scored.sort_by(by_score_desc);
    let positive: Vec<ScoredFragment<'a>> = scored
        .iter()
        .filter(|s| s.score > 0.0)
        .take(params.text_limit)
        .cloned()
        .collect();
    if !positive.is_empty() {
        return positive;
    }

    let mut per_page: BTreeMap<u32, ScoredFragment<'a>> = BTreeMap::new();
    for s in scored {
        match per_page.get(&s.fragment.page_number) {
            Some(best)
                if best
                    .score
                    .total_cmp(&s.score)
                    .then_with(|| {
                        best.fragment
                            .content
                            .chars()
                            .count()
                            .cmp(&s.fragment.content.chars().count())
                    })
                    .is_ge() => {}
            _ => {
                per_page.insert(s.fragment.page_number, s);
            }
        }
    }
    per_page.into_values().collect()
}

/// Score and select candidates for a question.
pub fn rank<'a>(
    candidates: &[&'a Fragment],
    ctx: &QueryContext,
    params: &RetrievalParams,
) -> Vec<ScoredFragment<'a>> {
    select(score_candidates(candidates, ctx, params), ctx, params)
}
