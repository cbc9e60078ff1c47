//! Library-level ingestion and answering against a real SQLite file.

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;

use pagewise::answer::{answer_question, build_context, ChatRequest};
use pagewise::config::parse_config;
use pagewise::db::connect_path;
use pagewise::ingest::ingest_file;
use pagewise::migrate::migrate;
use pagewise::services::Services;
use pagewise::sqlite_store::SqliteFragmentStore;
use pagewise_core::enrich::{GRAPH_CLOSE, GRAPH_OPEN, INFERRED_NOTICE};
use pagewise_core::inference::{InferenceProvider, Prompt};

/// Answers figure prompts with a fixed description and chat prompts with
/// a short markdown answer.
struct Stub {
    calls: AtomicUsize,
}

#[async_trait]
impl InferenceProvider for Stub {
    fn name(&self) -> &str {
        "stub"
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if prompt.user.contains("Graph elements detected") {
            Ok("Graph Type: Bar chart of rainfall by month".to_string())
        } else {
            Ok("**Answer:** Rainfall peaks in July.\n1. July\n2. August".to_string())
        }
    }
}

const LAYOUT: &str = r#"{
  "pages": [
    {
      "lines": [
        { "text": "Climate of the Region", "role": "title",
          "boundingBox": { "x": 0.1, "y": 0.05, "width": 0.8, "height": 0.05 } },
        { "text": "Rainfall varies strongly through the year.",
          "boundingBox": { "x": 0.1, "y": 0.12, "width": 0.8, "height": 0.04 } },
        { "text": "Monthly rainfall (mm), x-axis: month",
          "boundingBox": { "x": 0.2, "y": 0.45, "width": 0.5, "height": 0.03 } }
      ],
      "tables": [
        { "rowCount": 2, "columnCount": 2, "cells": [
          { "rowIndex": 0, "columnIndex": 0, "content": "Month" },
          { "rowIndex": 0, "columnIndex": 1, "content": "mm" },
          { "rowIndex": 1, "columnIndex": 0, "content": "July" },
          { "rowIndex": 1, "columnIndex": 1, "content": "210" }
        ] }
      ],
      "figures": [
        { "caption": "Figure 1: Rainfall by month",
          "boundingBox": { "x": 0.2, "y": 0.3, "width": 0.5, "height": 0.2 } }
      ]
    },
    { "lines": [ { "text": "Temperatures are mild in winter." } ] }
  ]
}"#;

async fn setup(dir: &TempDir) -> (Services, Arc<Stub>) {
    let db_path = dir.path().join("data/pagewise.sqlite");
    let config = parse_config(&format!(
        "[db]\npath = \"{}\"\n[ingest]\npage_batch_size = 1\n",
        db_path.display()
    ))
    .unwrap();

    let pool = connect_path(&db_path).await.unwrap();
    migrate(&pool).await.unwrap();
    let stub = Arc::new(Stub {
        calls: AtomicUsize::new(0),
    });
    let services = Services::new(
        &config,
        Arc::new(SqliteFragmentStore::new(pool)),
        stub.clone(),
    )
    .unwrap();
    (services, stub)
}

#[tokio::test]
async fn test_layout_file_is_enriched_and_stored() {
    let dir = TempDir::new().unwrap();
    let (services, stub) = setup(&dir).await;
    let path = dir.path().join("climate.json");
    fs::write(&path, LAYOUT).unwrap();

    let summary = ingest_file(&services, &path, None, None).await.unwrap();
    assert_eq!(summary.pages, 2);
    assert_eq!(summary.figures, 1);
    assert_eq!(summary.inferred, 1);
    assert_eq!(stub.calls.load(Ordering::SeqCst), 1);

    let document = services
        .store
        .get_document(&summary.document_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(document.title, "climate");
    assert_eq!(document.page_count, 2);

    let pool = services
        .store
        .list_fragments(&summary.document_id)
        .await
        .unwrap();
    let figure = pool
        .iter()
        .find(|f| f.content.starts_with("[FIGURE 1]"))
        .expect("dedicated figure fragment");
    assert_eq!(figure.page_number, 1);
    assert_eq!(figure.section_title.as_deref(), Some("Climate of the Region"));
    assert!(figure.content.contains("Caption: Figure 1: Rainfall by month"));
    assert!(figure.content.contains("Visible elements: Monthly rainfall (mm), x-axis: month"));

    let open = figure.content.find(GRAPH_OPEN).unwrap();
    let notice = figure.content.find(INFERRED_NOTICE).unwrap();
    let close = figure.content.find(GRAPH_CLOSE).unwrap();
    assert!(open < notice && notice < close);
    assert!(figure.content.trim_end().ends_with("[END FIGURE 1]"));

    let table = "[TABLE 1]\nMonth | mm\nJuly | 210\n[END TABLE 1]";
    assert!(pool.iter().any(|f| f.content.contains(table)));
    assert!(pool.iter().any(|f| f.page_number == 2));
}

#[tokio::test]
async fn test_chat_over_stored_document() {
    let dir = TempDir::new().unwrap();
    let (services, _) = setup(&dir).await;
    let path = dir.path().join("climate.json");
    fs::write(&path, LAYOUT).unwrap();
    let summary = ingest_file(&services, &path, Some("Climate".to_string()), None)
        .await
        .unwrap();

    let request = ChatRequest {
        document_id: summary.document_id.clone(),
        message: "What does the chart show about rainfall?".to_string(),
        page_hint: None,
        conversation_history: None,
    };

    let prepared = build_context(&services, &request).await.unwrap();
    assert!(prepared.query.graph_intent);
    assert!(prepared.context.text.starts_with("[Page 1]"));
    assert!(prepared.context.text.chars().count() <= 6000);

    let answer = answer_question(&services, &request).await.unwrap();
    assert_eq!(
        answer.answer,
        "<strong>Answer:</strong> Rainfall peaks in July.\n\n• July\n• August"
    );
    assert_eq!(answer.pages.first(), Some(&1));
}

#[tokio::test]
async fn test_reingest_replaces_sqlite_fragments() {
    let dir = TempDir::new().unwrap();
    let (services, _) = setup(&dir).await;
    let path = dir.path().join("climate.json");
    fs::write(&path, LAYOUT).unwrap();

    let first = ingest_file(&services, &path, None, None).await.unwrap();
    let second = ingest_file(&services, &path, None, None).await.unwrap();
    assert_eq!(first.document_id, second.document_id);
    assert_eq!(
        services
            .store
            .count_fragments(&first.document_id)
            .await
            .unwrap() as usize,
        second.fragments
    );
}
