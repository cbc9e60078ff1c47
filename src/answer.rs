//! Answering pipeline: question → context → model → formatted answer.
//!
//! [`build_context`] runs query analysis, candidate filtering, ranking and
//! assembly against a document's fragment pool. [`answer_question`] adds
//! the inference call and formats the reply. Conversation history is
//! accepted on the wire but not used.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use pagewise_core::assemble::{assemble, AssembledContext};
use pagewise_core::format::format_answer;
use pagewise_core::inference::Prompt;
use pagewise_core::models::QueryContext;
use pagewise_core::query::analyze;
use pagewise_core::rank::rank;
use pagewise_core::retrieve::filter_candidates;

use crate::error::{PagewiseError, PagewiseResult};
use crate::services::Services;

const ANSWER_SYSTEM_PROMPT: &str = "You answer questions about a document using only the \
provided page excerpts. Cite page numbers when they help. Blocks between [GRAPH STRUCTURE] \
and [END GRAPH STRUCTURE] describe figures: use them to explain axes, curves and what the \
figure shows. If the excerpts do not contain the answer, say so.";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub document_id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub page_hint: Option<u32>,
    /// Accepted for compatibility; ignored.
    #[serde(default)]
    pub conversation_history: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatAnswer {
    pub answer: String,
    /// Pages that contributed to the context, in ranking order.
    pub pages: Vec<u32>,
    pub graph_intent: bool,
    pub fragments_used: usize,
}

/// Context assembled for one question.
#[derive(Debug, Clone)]
pub struct PreparedContext {
    pub query: QueryContext,
    pub context: AssembledContext,
    /// Size of the document's fragment pool.
    pub pool_size: usize,
}

/// Validate the request and assemble the context for it.
pub async fn build_context(
    services: &Services,
    request: &ChatRequest,
) -> PagewiseResult<PreparedContext> {
    let document_id = request.document_id.trim();
    if document_id.is_empty() {
        return Err(PagewiseError::invalid("documentId must not be empty"));
    }
    if request.message.trim().is_empty() {
        return Err(PagewiseError::invalid("message must not be empty"));
    }

    let document = services
        .store
        .get_document(document_id)
        .await
        .map_err(|e| PagewiseError::upstream("storage", e))?
        .ok_or_else(|| PagewiseError::DocumentNotFound(document_id.to_string()))?;

    let pool = services
        .store
        .list_fragments(&document.id)
        .await
        .map_err(|e| PagewiseError::upstream("storage", e))?;
    if pool.is_empty() {
        return Err(PagewiseError::EmptyFragmentPool(document.id));
    }

    let query = analyze(&request.message, request.page_hint);
    let candidates = filter_candidates(&pool, query.page_hint);
    let ranked = rank(&candidates, &query, &services.retrieval.params());
    let context = assemble(
        ranked.iter().map(|s| s.fragment),
        services.retrieval.max_context_chars,
    );

    debug!(
        document_id = %document.id,
        pool = pool.len(),
        candidates = candidates.len(),
        ranked = ranked.len(),
        used = context.used,
        graph_intent = query.graph_intent,
        page_hint = ?query.page_hint,
        "context assembled"
    );

    Ok(PreparedContext {
        query,
        context,
        pool_size: pool.len(),
    })
}

fn answer_prompt(question: &str, context: &str) -> Prompt {
    let context = if context.is_empty() {
        "(no excerpts fit the context budget)"
    } else {
        context
    };
    Prompt::new(format!(
        "Document excerpts:\n\n{}\n\nQuestion: {}",
        context,
        question.trim()
    ))
    .with_system(ANSWER_SYSTEM_PROMPT)
}

/// Answer a question about one document.
pub async fn answer_question(
    services: &Services,
    request: &ChatRequest,
) -> PagewiseResult<ChatAnswer> {
    let prepared = build_context(services, request).await?;
    let prompt = answer_prompt(&request.message, &prepared.context.text);

    let raw = services
        .inference
        .complete(&prompt)
        .await
        .map_err(|e| PagewiseError::upstream("inference", e))?;
    if raw.trim().is_empty() {
        return Err(PagewiseError::upstream(
            "inference",
            anyhow::anyhow!("empty answer from {}", services.inference.name()),
        ));
    }

    info!(
        document_id = %request.document_id.trim(),
        fragments = prepared.context.used,
        graph_intent = prepared.query.graph_intent,
        "question answered"
    );

    Ok(ChatAnswer {
        answer: format_answer(&raw),
        pages: prepared.context.pages,
        graph_intent: prepared.query.graph_intent,
        fragments_used: prepared.context.used,
    })
}
