//! Figure enrichment: templated or inferred graph interpretations.
//!
//! Each figure is classified against the template catalog using the page's
//! surrounding text plus the figure's visible elements. A confident match
//! renders a deterministic block from the template; anything else goes to an
//! [`InferenceProvider`] with a fixed structured prompt. Every outcome is a
//! `[GRAPH STRUCTURE] … [END GRAPH STRUCTURE]` block that the caller splices
//! into the page text before the figure's `[END FIGURE n]` marker.
//!
//! Figures are enriched strictly one after another. A failed inference call
//! yields [`EnrichmentOutcome::Failed`] and never stops the remaining figures.

use tracing::{debug, warn};

use crate::catalog::{Catalog, Classification, GraphTemplate};
use crate::figures::{splice_interpretation, LinearPage, PLACEHOLDER_CAPTION};
use crate::inference::{InferenceProvider, Prompt};
use crate::models::FigureRecord;

pub const GRAPH_OPEN: &str = "[GRAPH STRUCTURE]";
pub const GRAPH_CLOSE: &str = "[END GRAPH STRUCTURE]";

/// Minimum keyword hits for a template to be trusted.
pub const DEFAULT_MIN_TEMPLATE_SCORE: usize = 2;
/// Cap on surrounding text sent with an inference prompt, in characters.
pub const DEFAULT_CONTEXT_CHARS: usize = 1500;

pub const INFERRED_NOTICE: &str =
    "Note: no matching graph template was found; this interpretation was inferred and may be incomplete.";

const SYSTEM_PROMPT: &str = "You describe graphs and diagrams from academic documents. \
Only report what the provided elements and text support.";

/// How a figure's interpretation was produced.
#[derive(Debug, Clone, PartialEq)]
pub enum EnrichmentOutcome {
    /// Rendered from a matched catalog template.
    Templated(String),
    /// Produced by the inference provider.
    Inferred(String),
    /// Inference failed; carries the reason.
    Failed(String),
}

impl EnrichmentOutcome {
    /// The marker-delimited block to splice into page text.
    pub fn render(&self) -> String {
        match self {
            EnrichmentOutcome::Templated(block) => block.clone(),
            EnrichmentOutcome::Inferred(body) => format!(
                "{}\n{}\n{}\n{}",
                GRAPH_OPEN,
                body.trim(),
                INFERRED_NOTICE,
                GRAPH_CLOSE
            ),
            EnrichmentOutcome::Failed(reason) => format!(
                "{}\nGraph analysis could not be completed: {}\n{}",
                GRAPH_OPEN, reason, GRAPH_CLOSE
            ),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            EnrichmentOutcome::Templated(_) => "templated",
            EnrichmentOutcome::Inferred(_) => "inferred",
            EnrichmentOutcome::Failed(_) => "failed",
        }
    }
}

/// Render a template as a graph structure block.
pub fn render_template(template: &GraphTemplate) -> String {
    let mut out = String::new();
    out.push_str(GRAPH_OPEN);
    out.push('\n');
    out.push_str(&format!(
        "Graph Type: {} ({})\n",
        template.title, template.domain
    ));
    out.push_str("Axes:\n");
    out.push_str(&format!("  X-Axis: {}\n", template.axes.x));
    out.push_str(&format!("  Y-Axis: {}\n", template.axes.y));
    out.push_str("Curves:\n");
    for (i, curve) in template.curves.iter().enumerate() {
        out.push_str(&format!(
            "  {}. {} ({}): {}\n",
            i + 1,
            curve.name,
            curve.slope,
            curve.meaning
        ));
    }
    out.push_str(&format!("Key Insight: {}\n", template.insight));
    out.push_str(GRAPH_CLOSE);
    out
}

/// Truncate to at most `max` characters on a char boundary.
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((byte, _)) => &text[..byte],
        None => text,
    }
}

/// Result of enriching every figure on a page.
#[derive(Debug, Clone)]
pub struct EnrichedPage {
    /// Page text with interpretations spliced in.
    pub text: String,
    pub outcomes: Vec<EnrichmentOutcome>,
}

impl EnrichedPage {
    pub fn count(&self, kind: &str) -> usize {
        self.outcomes.iter().filter(|o| o.kind() == kind).count()
    }
}

pub struct Enricher {
    catalog: Catalog,
    min_template_score: usize,
    context_chars: usize,
}

impl Enricher {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            min_template_score: DEFAULT_MIN_TEMPLATE_SCORE,
            context_chars: DEFAULT_CONTEXT_CHARS,
        }
    }

    pub fn with_min_template_score(mut self, score: usize) -> Self {
        self.min_template_score = score.max(1);
        self
    }

    pub fn with_context_chars(mut self, chars: usize) -> Self {
        self.context_chars = chars;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Classify the combined figure and surrounding text.
    pub fn classify(&self, figure: &FigureRecord, surrounding: &str) -> Option<Classification> {
        let mut combined = String::new();
        if figure.caption != PLACEHOLDER_CAPTION {
            combined.push_str(&figure.caption);
            combined.push('\n');
        }
        combined.push_str(surrounding);
        for element in &figure.visible_elements {
            combined.push('\n');
            combined.push_str(element);
        }
        self.catalog.classify(&combined)
    }

    /// The structured prompt used when no template matches.
    pub fn inference_prompt(&self, figure: &FigureRecord, surrounding: &str) -> Prompt {
        let visible = if figure.visible_elements.is_empty() {
            "(none)".to_string()
        } else {
            figure.visible_elements.join(" | ")
        };
        let missing = if figure.missing_elements.is_empty() {
            "(none)".to_string()
        } else {
            figure
                .missing_elements
                .iter()
                .map(|m| m.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        let user = format!(
            "A figure was detected on a document page.\n\n\
             Graph elements detected:\n\
             - Caption: {}\n\
             - Visible elements: {}\n\
             - Missing elements: {}\n\n\
             Surrounding text:\n{}\n\n\
             Instructions:\n\
             1. Name the graph type and what each axis measures.\n\
             2. Enumerate every visible curve or line with its slope and meaning. Do not skip any.\n\
             3. State the key insight the figure conveys.\n\
             If something cannot be read from the elements or text above, answer \"cannot determine\" instead of guessing.",
            figure.caption,
            visible,
            missing,
            truncate_chars(surrounding, self.context_chars)
        );
        Prompt::new(user).with_system(SYSTEM_PROMPT)
    }

    /// Interpret one figure.
    pub async fn enrich(
        &self,
        figure: &FigureRecord,
        surrounding: &str,
        provider: &dyn InferenceProvider,
    ) -> EnrichmentOutcome {
        if let Some(c) = self.classify(figure, surrounding) {
            if c.match_score >= self.min_template_score {
                debug!(
                    domain = %c.domain,
                    template = %c.template_name,
                    score = c.match_score,
                    "figure matched template"
                );
                return EnrichmentOutcome::Templated(render_template(&c.template));
            }
        }

        let prompt = self.inference_prompt(figure, surrounding);
        match provider.complete(&prompt).await {
            Ok(text) if !text.trim().is_empty() => EnrichmentOutcome::Inferred(text),
            Ok(_) => {
                warn!(provider = provider.name(), "inference returned empty interpretation");
                EnrichmentOutcome::Failed("empty response from inference provider".to_string())
            }
            Err(e) => {
                warn!(provider = provider.name(), error = %e, "figure inference failed");
                EnrichmentOutcome::Failed(format!("{:#}", e))
            }
        }
    }

    /// Enrich every figure of a linearized page, in order, and splice each
    /// interpretation before its `[END FIGURE n]` marker.
    pub async fn enrich_page(
        &self,
        page: &LinearPage,
        provider: &dyn InferenceProvider,
    ) -> EnrichedPage {
        let mut text = page.text.clone();
        let mut outcomes = Vec::with_capacity(page.figures.len());
        for (i, figure) in page.figures.iter().enumerate() {
            let outcome = self.enrich(figure, &page.prose, provider).await;
            if let Some(spliced) = splice_interpretation(&text, i + 1, &outcome.render()) {
                text = spliced;
            }
            outcomes.push(outcome);
        }
        EnrichedPage { text, outcomes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::figures::linearize;
    use crate::models::{LayoutLine, MissingElement, PageLayout};
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Canned {
        reply: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl Canned {
        fn ok(reply: &'static str) -> Self {
            Self { reply: Some(reply), calls: AtomicUsize::new(0) }
        }
        fn failing() -> Self {
            Self { reply: None, calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl InferenceProvider for Canned {
        fn name(&self) -> &str {
            "canned"
        }
        async fn complete(&self, _prompt: &Prompt) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.reply {
                Some(r) => Ok(r.to_string()),
                None => bail!("connection refused"),
            }
        }
    }

    fn figure(elements: &[&str]) -> FigureRecord {
        FigureRecord {
            caption: PLACEHOLDER_CAPTION.to_string(),
            visible_elements: elements.iter().map(|s| s.to_string()).collect(),
            missing_elements: BTreeSet::from([MissingElement::Legend]),
            needs_inference: true,
        }
    }

    #[tokio::test]
    async fn test_templated_when_score_reaches_threshold() {
        let enricher = Enricher::new(Catalog::builtin());
        let provider = Canned::ok("unused");
        let outcome = enricher
            .enrich(&figure(&["W"]), "Labor Market Under Monopsony", &provider)
            .await;
        let EnrichmentOutcome::Templated(block) = &outcome else {
            panic!("expected templated outcome, got {:?}", outcome);
        };
        assert!(block.starts_with(GRAPH_OPEN));
        assert!(block.ends_with(GRAPH_CLOSE));
        assert!(block.contains("Graph Type: Labor Market Under Monopsony"));
        assert!(block.contains("  3. Marginal Revenue Product"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_single_keyword_falls_back_to_inference() {
        let enricher = Enricher::new(Catalog::builtin());
        let provider = Canned::ok("Graph Type: unknown\nCurves: cannot determine");
        let outcome = enricher
            .enrich(&figure(&["Q"]), "A discussion of monopsony.", &provider)
            .await;
        assert!(matches!(outcome, EnrichmentOutcome::Inferred(_)));
        let rendered = outcome.render();
        assert!(rendered.contains("cannot determine"));
        assert!(rendered.contains(INFERRED_NOTICE));
        assert!(rendered.ends_with(GRAPH_CLOSE));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_inference_failure_yields_stub() {
        let enricher = Enricher::new(Catalog::builtin());
        let provider = Canned::failing();
        let outcome = enricher.enrich(&figure(&["X"]), "", &provider).await;
        let EnrichmentOutcome::Failed(reason) = &outcome else {
            panic!("expected failure, got {:?}", outcome);
        };
        assert!(reason.contains("connection refused"));
        assert!(outcome.render().contains("Graph analysis could not be completed"));
    }

    #[test]
    fn test_prompt_caps_surrounding_text() {
        let enricher = Enricher::new(Catalog::builtin()).with_context_chars(10);
        let prompt = enricher.inference_prompt(&figure(&["A", "B"]), &"é".repeat(50));
        assert!(prompt.user.contains(&"é".repeat(10)));
        assert!(!prompt.user.contains(&"é".repeat(11)));
        assert!(prompt.user.contains("Visible elements: A | B"));
        assert!(prompt.user.contains("cannot determine"));
        assert!(prompt.system.is_some());
    }

    #[test]
    fn test_render_template_lists_curves_in_order() {
        let catalog = Catalog::builtin();
        let t = catalog.get("economics", "cost-curves").unwrap();
        let block = render_template(t);
        let mc = block.find("1. Marginal Cost").unwrap();
        let atc = block.find("2. Average Total Cost").unwrap();
        assert!(mc < atc);
        assert!(block.contains("Key Insight: "));
    }

    #[tokio::test]
    async fn test_enrich_page_splices_before_end_marker() {
        let page = PageLayout {
            lines: vec![
                LayoutLine::plain("Labor Market Under Monopsony"),
                LayoutLine::plain("W"),
            ],
            ..Default::default()
        };
        let linear = linearize(&page).unwrap();
        assert_eq!(linear.figures.len(), 1);
        let enricher = Enricher::new(Catalog::builtin());
        let enriched = enricher.enrich_page(&linear, &Canned::failing()).await;
        assert_eq!(enriched.count("templated"), 1);
        let graph = enriched.text.find(GRAPH_CLOSE).unwrap();
        let end = enriched.text.find("[END FIGURE 1]").unwrap();
        assert!(graph < end);
        let figure_at = enriched.text.find("[FIGURE 1]").unwrap();
        assert!(figure_at < enriched.text.find(GRAPH_OPEN).unwrap());
    }
}
