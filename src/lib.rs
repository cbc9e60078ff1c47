//! # Pagewise
//!
//! Page-aware document ingestion, figure enrichment and context assembly
//! for question answering over long documents.
//!
//! The engine itself (chunking, figure detection, the graph template
//! catalog, ranking, assembly, formatting) lives in `pagewise-core`. This
//! crate wires it to SQLite, layout sources, inference providers, a CLI
//! and an HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────────────┐   ┌──────────┐
//! │ LayoutSource │──▶│ Ingest pipeline     │──▶│  SQLite  │
//! │ JSON/PDF/Txt │   │ enrich + chunk      │   │fragments │
//! └──────────────┘   └─────────────────────┘   └────┬─────┘
//!                                                   │
//!                      ┌────────────────────────────┤
//!                      ▼                            ▼
//!                 ┌──────────┐               ┌────────────┐
//!                 │   CLI    │               │ HTTP (chat │
//!                 │(pagewise)│               │ + progress)│
//!                 └──────────┘               └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`error`] | Error taxonomy shared by the pipelines and the API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite fragment store |
//! | [`layout`] | Layout sources (JSON, PDF, text) |
//! | [`inference`] | OpenAI / Ollama / disabled providers |
//! | [`services`] | Shared pipeline dependencies |
//! | [`ingest`] | Ingestion pipeline |
//! | [`answer`] | Answering pipeline |
//! | [`progress`] | CLI progress rendering |
//! | [`commands`] | CLI command implementations |
//! | [`server`] | HTTP API |

pub mod answer;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod inference;
pub mod ingest;
pub mod layout;
pub mod migrate;
pub mod progress;
pub mod server;
pub mod services;
pub mod sqlite_store;
