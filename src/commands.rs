//! CLI command implementations. Results go to stdout; logs and progress
//! go to stderr.

use std::path::Path;

use anyhow::Result;

use pagewise_core::catalog::Catalog;
use pagewise_core::enrich::render_template;

use crate::answer::{answer_question, build_context, ChatRequest};
use crate::config::Config;
use crate::ingest::ingest_file;
use crate::progress::ProgressMode;
use crate::services::Services;

/// `pagewise ingest <path>`
pub async fn run_ingest(
    config: &Config,
    path: &Path,
    title: Option<String>,
    mode: ProgressMode,
) -> Result<()> {
    let services = Services::from_config(config).await?;
    let observer = mode.observer();
    let summary = ingest_file(&services, path, title, observer.as_deref()).await?;

    println!("Ingested {} as {}", path.display(), summary.document_id);
    println!(
        "  pages: {}  fragments: {}  figures: {} ({} templated, {} inferred, {} failed)",
        summary.pages,
        summary.fragments,
        summary.figures,
        summary.templated,
        summary.inferred,
        summary.failed
    );
    Ok(())
}

/// `pagewise documents`
pub async fn run_documents(config: &Config) -> Result<()> {
    let services = Services::from_config(config).await?;
    let documents = services.store.list_documents().await?;
    if documents.is_empty() {
        println!("No documents.");
        return Ok(());
    }
    for doc in documents {
        let fragments = services.store.count_fragments(&doc.id).await?;
        println!("{}  {}", doc.id, doc.title);
        println!(
            "    pages: {}  fragments: {}  ingested: {}",
            doc.page_count,
            fragments,
            doc.created_at.format("%Y-%m-%d %H:%M")
        );
        println!("    source: {}", doc.source);
        println!();
    }
    Ok(())
}

fn chat_request(document_id: &str, question: &str, page: Option<u32>) -> ChatRequest {
    ChatRequest {
        document_id: document_id.to_string(),
        message: question.to_string(),
        page_hint: page,
        conversation_history: None,
    }
}

/// `pagewise context <document-id> <question>`: the context a question
/// would be answered from, without calling the model.
pub async fn run_context(
    config: &Config,
    document_id: &str,
    question: &str,
    page: Option<u32>,
) -> Result<()> {
    let services = Services::from_config(config).await?;
    let prepared = build_context(&services, &chat_request(document_id, question, page)).await?;

    let hint = prepared
        .query
        .page_hint
        .map_or_else(|| "none".to_string(), |p| p.to_string());
    println!(
        "graph intent: {}  page hint: {}  fragments: {} of {}",
        if prepared.query.graph_intent { "yes" } else { "no" },
        hint,
        prepared.context.used,
        prepared.pool_size
    );
    println!();
    if prepared.context.text.is_empty() {
        println!("(empty context)");
    } else {
        println!("{}", prepared.context.text);
    }
    Ok(())
}

/// `pagewise ask <document-id> <question>`
pub async fn run_ask(
    config: &Config,
    document_id: &str,
    question: &str,
    page: Option<u32>,
) -> Result<()> {
    let services = Services::from_config(config).await?;
    let answer = answer_question(&services, &chat_request(document_id, question, page)).await?;

    println!("{}", answer.answer);
    println!();
    let pages: Vec<String> = answer.pages.iter().map(|p| p.to_string()).collect();
    println!("pages: {}", pages.join(", "));
    Ok(())
}

/// `pagewise classify <text>`
pub fn run_classify(catalog: &Catalog, text: &str) {
    match catalog.classify(text) {
        Some(c) => {
            println!("{}/{} (score {})", c.domain, c.template_name, c.match_score);
            println!();
            println!("{}", render_template(&c.template));
        }
        None => println!("No template matched."),
    }
}

/// `pagewise templates`
pub fn run_templates(catalog: &Catalog) {
    for template in catalog.templates() {
        println!(
            "{:<40} {} ({} keywords, {} curves)",
            template.id(),
            template.title,
            template.keywords.len(),
            template.curves.len()
        );
    }
}
