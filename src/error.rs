//! Error taxonomy surfaced by the ingestion and answering pipelines.
//!
//! Validation failures are reported immediately. Upstream failures (layout
//! analysis, inference, storage) are reported as-is; nothing is retried.
//! Template non-matches and context-budget overflow are not errors.

use thiserror::Error;

/// Generic message shown to chat users when answering fails.
pub const CHAT_FALLBACK_MESSAGE: &str = "I encountered an error while answering your question.";

#[derive(Debug, Error)]
pub enum PagewiseError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("document {0} has no fragments")]
    EmptyFragmentPool(String),

    #[error("{service} failed: {source:#}")]
    Upstream {
        service: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl PagewiseError {
    pub fn upstream(service: &'static str, source: anyhow::Error) -> Self {
        Self::Upstream { service, source }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) | Self::EmptyFragmentPool(_) => "bad_request",
            Self::DocumentNotFound(_) => "not_found",
            Self::Upstream { .. } => "upstream_error",
            Self::Internal(_) => "internal",
        }
    }
}

pub type PagewiseResult<T> = std::result::Result<T, PagewiseError>;
