use serde::{Deserialize, Serialize};
use std::fmt;

use super::history::HistoryEntry;

// ===== PIPELINE VALUES =====

/// Which tier produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    Pattern,
    Llm,
    Agent,
}

impl fmt::Display for ClassificationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClassificationSource::Pattern => "pattern",
            ClassificationSource::Llm => "llm",
            ClassificationSource::Agent => "agent",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub needs_retrieval: bool,
    pub source: ClassificationSource,
}

impl ClassificationResult {
    pub fn new(needs_retrieval: bool, source: ClassificationSource) -> Self {
        Self {
            needs_retrieval,
            source,
        }
    }
}

/// Context assembled from the index. Empty context with a zero count means nothing
/// relevant was found (or the lookup failed).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub context: String,
    pub document_count: usize,
}

impl RetrievalResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.document_count == 0
    }
}

/// What `query()` returns and what the response cache stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub answer: String,
    pub doc_count: usize,
    /// True when the retrieval path ran, even if it found nothing.
    pub retrieval_attempted: bool,
}

// ===== HTTP MODELS =====

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub doc_count: usize,
    pub retrieval_attempted: bool,
    /// Clients should not append redirect answers to their history.
    pub is_redirect: bool,
}
