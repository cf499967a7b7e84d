use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use super::{is_affirmative, ClassificationGate, QueryClassifier};
use crate::models::{recent, ClassificationResult, ClassificationSource, HistoryEntry};
use crate::services::providers::LlmProvider;
use crate::utils::RagError;

/// Keyword pre-filter, then cache, then a single YES/NO question to the LLM.
pub struct PatternLlmClassifier {
    gate: ClassificationGate,
    llm: Arc<dyn LlmProvider>,
    domain: String,
    history_questions: usize,
}

impl PatternLlmClassifier {
    pub(crate) fn new(
        gate: ClassificationGate,
        llm: Arc<dyn LlmProvider>,
        domain: &str,
        history_questions: usize,
    ) -> Self {
        Self {
            gate,
            llm,
            domain: domain.to_string(),
            history_questions,
        }
    }

    pub(crate) fn build_prompt(&self, question: &str, history: &[HistoryEntry]) -> String {
        let domain = &self.domain;
        let recent_questions = recent(history, self.history_questions)
            .iter()
            .map(|h| format!("Q: {}", h.question))
            .collect::<Vec<_>>()
            .join("\n");

        let mut prompt = String::new();
        if !recent_questions.is_empty() {
            prompt.push_str("Recent conversation:\n");
            prompt.push_str(&recent_questions);
            prompt.push_str("\n\n");
        }

        prompt.push_str(&format!(
            r#"Does this question require retrieving {domain} documentation to answer properly?

Question: {question}

Answer YES if the question asks about:
- {domain} features, capabilities, architecture or usage
- Vector databases, vector search, embeddings or indexing
- A follow-up to a recent technical question

Answer NO if the question is:
- A greeting, thanks, or casual conversation
- About resuming, continuing, or summarizing the conversation
- About topics unrelated to databases, vectors, or data storage

Answer ONLY "YES" or "NO".

Answer (YES/NO):"#
        ));

        prompt
    }

    async fn ask_llm(&self, question: &str, history: &[HistoryEntry]) -> anyhow::Result<bool> {
        let prompt = self.build_prompt(question, history);
        let response = self.llm.invoke(&prompt).await?;
        debug!("LLM classification response: {:?}", response.trim());
        Ok(is_affirmative(&response))
    }
}

#[async_trait]
impl QueryClassifier for PatternLlmClassifier {
    async fn classify(
        &self,
        question: &str,
        history: &[HistoryEntry],
    ) -> Result<ClassificationResult, RagError> {
        let start = Instant::now();

        if let Some(result) = self.gate.pre_classify(question) {
            return Ok(result);
        }

        let verdict = self.ask_llm(question, history).await;
        let result = self
            .gate
            .settle(question, verdict, ClassificationSource::Llm)?;

        info!(
            "LLM classification: needs_retrieval={} ({}ms)",
            result.needs_retrieval,
            start.elapsed().as_millis()
        );

        Ok(result)
    }
}
