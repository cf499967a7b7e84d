//! Classification-gated retrieval-augmented generation.
//!
//! A question first goes through a cheap keyword filter and, when that is
//! undecided, an LLM (or single-tool agent) verdict on whether it needs
//! documentation. Only then is the vector index queried. Answers are memoized
//! per normalized question.

pub mod config;
pub mod handlers;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Settings;
pub use models::{ConversationHistory, HistoryEntry, QueryOutcome};
pub use services::RagOrchestrator;
pub use utils::RagError;
