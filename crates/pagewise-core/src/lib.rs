//! # Pagewise Core
//!
//! The retrieval-and-enrichment engine behind Pagewise: data models,
//! sliding-window chunking, figure extraction with a fallback detector,
//! the graph template catalog and classifier, figure enrichment, query
//! analysis, candidate filtering, relevance ranking, context assembly and
//! answer formatting.
//!
//! This crate contains no SQLite, HTTP server, or filesystem I/O. Storage
//! and the generative inference step are reached through the
//! [`store::FragmentStore`] and [`inference::InferenceProvider`] traits,
//! implemented by the application crate.
//!
//! ## Data Flow
//!
//! ```text
//!  ingestion                              query
//!  ─────────                              ─────
//!  PageLayout ─▶ figures::linearize       question ─▶ query::analyze
//!      │             │                                   │
//!      │        Catalog::classify                  retrieve::filter_candidates
//!      │             │                                   │
//!      │        enrich::Enricher                   rank::rank
//!      │             │                                   │
//!      └──────▶ chunk::SlidingWindow              assemble::assemble_context
//!                    │                                   │
//!                Fragment pool ───────────────────▶ (answering step)
//!                                                        │
//!                                                  format::format_answer
//! ```

pub mod assemble;
pub mod catalog;
pub mod chunk;
pub mod enrich;
pub mod figures;
pub mod format;
pub mod inference;
pub mod models;
pub mod progress;
pub mod query;
pub mod rank;
pub mod retrieve;
pub mod store;
