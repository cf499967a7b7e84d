use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::config::GeneratorConfig;
use crate::models::{extract_user_name, recent, HistoryEntry, RedirectMarkers};
use crate::services::providers::LlmProvider;
use crate::utils::text::truncate_chars;
use crate::utils::RagError;

/// Questions containing any of these get the previous exchanges in their prompt.
pub const HISTORY_KEYWORDS: &[&str] = &[
    "resume",
    "summarize",
    "summary",
    "conversation",
    "continue",
    "discuss",
    "talked about",
];

/// Builds prompts for the three answer shapes and runs them through the LLM.
#[derive(Clone)]
pub struct ResponseGenerator {
    llm: Arc<dyn LlmProvider>,
    domain: String,
    history_window: usize,
    answer_preview_chars: usize,
    include_history_in_rag: bool,
    markers: RedirectMarkers,
}

impl ResponseGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>, config: &GeneratorConfig) -> Self {
        let (first, second) = &config.redirect_markers;
        Self {
            llm,
            domain: config.domain.clone(),
            history_window: config.history_window,
            answer_preview_chars: config.answer_preview_chars,
            include_history_in_rag: config.include_history_in_rag,
            markers: RedirectMarkers::new(first.as_str(), second.as_str()),
        }
    }

    pub fn markers(&self) -> &RedirectMarkers {
        &self.markers
    }

    /// True iff the answer carries both redirect markers. Callers must not append
    /// such answers to their history.
    pub fn is_redirect(&self, response: &str) -> bool {
        self.markers.is_redirect(response)
    }

    /// The sentence the model is told to use for off-topic questions.
    pub fn redirect_sentence(&self) -> String {
        format!(
            "{} {domain} database questions. {} about other topics. Please ask about {domain} features, usage, or technical details.",
            self.markers.first,
            self.markers.second,
            domain = self.domain
        )
    }

    pub async fn generate_with_context(
        &self,
        question: &str,
        context: &str,
        history: &[HistoryEntry],
    ) -> Result<String, RagError> {
        let prompt = self.rag_prompt(question, context, history);
        self.invoke("rag", &prompt).await
    }

    pub async fn generate_direct(
        &self,
        question: &str,
        history: &[HistoryEntry],
    ) -> Result<String, RagError> {
        let prompt = if self.wants_history(question, history) {
            debug!("Including history for summary request: {} item(s)", history.len());
            self.direct_prompt_with_history(question, history)
        } else {
            self.direct_prompt(question, history)
        };
        self.invoke("direct", &prompt).await
    }

    async fn invoke(&self, shape: &str, prompt: &str) -> Result<String, RagError> {
        let start = Instant::now();
        let response = self
            .llm
            .invoke(prompt)
            .await
            .map_err(RagError::generation)?;

        info!(
            "Generated {} answer in {}ms ({} chars)",
            shape,
            start.elapsed().as_millis(),
            response.len()
        );
        Ok(response)
    }

    fn wants_history(&self, question: &str, history: &[HistoryEntry]) -> bool {
        if history.is_empty() {
            return false;
        }
        let question = question.to_lowercase();
        HISTORY_KEYWORDS.iter().any(|k| question.contains(k))
    }

    fn name_line(history: &[HistoryEntry]) -> String {
        extract_user_name(history)
            .map(|name| format!("Address the user as {}.\n\n", name))
            .unwrap_or_default()
    }

    /// `Q:`/`A:` lines for the last `history_window` entries, answers shortened.
    fn history_block(&self, history: &[HistoryEntry]) -> String {
        recent(history, self.history_window)
            .iter()
            .map(|h| {
                format!(
                    "Q: {}\nA: {}",
                    h.question,
                    truncate_chars(&h.answer, self.answer_preview_chars)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn rag_prompt(&self, question: &str, context: &str, history: &[HistoryEntry]) -> String {
        let domain = &self.domain;
        let name_line = Self::name_line(history);
        let history_section = if self.include_history_in_rag && !history.is_empty() {
            format!("Previous conversation:\n{}\n\n", self.history_block(history))
        } else {
            String::new()
        };

        format!(
            r#"You are a {domain} database expert. Answer questions about {domain} using the provided context.

{name_line}{history_section}Context: {context}

Question: {question}

Provide a comprehensive answer based on the context. Include relevant details, examples, and explanations to fully address the question. If the question is about {domain}, use the context to give a complete and informative response.

Answer:"#
        )
    }

    pub fn direct_prompt_with_history(&self, question: &str, history: &[HistoryEntry]) -> String {
        let domain = &self.domain;
        let name_line = Self::name_line(history);
        let history_text = self.history_block(history);
        let redirect = self.redirect_sentence();

        format!(
            r#"{name_line}Previous conversation:
{history_text}

Question: {question}

If asked to resume, continue, or summarize the conversation, respond with:
"Here's what we discussed: [list each topic from the conversation history above]"

Otherwise:
- If greeting: respond with friendly greeting and offer to help with {domain} questions
- If about {domain}: answer directly
- If NOT about {domain}: "{redirect}"

Answer:"#
        )
    }

    pub fn direct_prompt(&self, question: &str, history: &[HistoryEntry]) -> String {
        let domain = &self.domain;
        let name_line = Self::name_line(history);
        let redirect = self.redirect_sentence();

        format!(
            r#"{name_line}Question: {question}

You are specialized in {domain} database questions only.

If this is a greeting (hello, hi, etc.), respond with a friendly greeting and offer to help with {domain} questions.
If this is a personal instruction (like setting preferences), acknowledge it politely.
If the question is about {domain}, answer it directly.
If the question is NOT about {domain}, respond: "{redirect}"

Answer:"#
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::providers::MockLlmProvider;
    use std::sync::Mutex;

    fn generator(llm: MockLlmProvider) -> ResponseGenerator {
        ResponseGenerator::new(Arc::new(llm), &GeneratorConfig::default())
    }

    /// LLM mock that records every prompt it sees.
    fn capturing_llm(reply: &'static str) -> (MockLlmProvider, Arc<Mutex<Vec<String>>>) {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let sink = prompts.clone();
        let mut llm = MockLlmProvider::new();
        llm.expect_invoke().returning(move |p| {
            sink.lock().unwrap().push(p.to_string());
            Ok(reply.to_string())
        });
        (llm, prompts)
    }

    fn long_history(n: usize) -> Vec<HistoryEntry> {
        (0..n)
            .map(|i| HistoryEntry::new(format!("question-{:02}", i), format!("answer-{:02}", i)))
            .collect()
    }

    #[tokio::test]
    async fn test_summary_request_uses_last_three_entries() {
        let (llm, prompts) = capturing_llm("Here's what we discussed: ...");
        let generator = generator(llm);

        generator
            .generate_direct("Can you summarize our conversation?", &long_history(10))
            .await
            .unwrap();

        let prompt = prompts.lock().unwrap()[0].clone();
        for i in 0..7 {
            assert!(!prompt.contains(&format!("question-{:02}", i)));
        }
        for i in 7..10 {
            assert!(prompt.contains(&format!("Q: question-{:02}", i)));
            assert!(prompt.contains(&format!("A: answer-{:02}", i)));
        }
    }

    #[tokio::test]
    async fn test_long_answers_are_truncated() {
        let (llm, prompts) = capturing_llm("ok");
        let generator = generator(llm);
        let history = vec![HistoryEntry::new("What is Milvus?", "x".repeat(250))];

        generator.generate_direct("resume please", &history).await.unwrap();

        let prompt = prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains(&format!("A: {}...", "x".repeat(100))));
        assert!(!prompt.contains(&"x".repeat(101)));
    }

    #[tokio::test]
    async fn test_plain_direct_question_has_no_history() {
        let (llm, prompts) = capturing_llm("Hello!");
        let generator = generator(llm);

        generator
            .generate_direct("Hello", &long_history(2))
            .await
            .unwrap();

        let prompt = prompts.lock().unwrap()[0].clone();
        assert!(!prompt.contains("question-00"));
        assert!(!prompt.contains("Previous conversation"));
        assert!(prompt.contains("friendly greeting"));
    }

    #[tokio::test]
    async fn test_summary_without_history_uses_plain_prompt() {
        let (llm, prompts) = capturing_llm("Nothing yet.");
        let generator = generator(llm);

        generator.generate_direct("summarize", &[]).await.unwrap();

        assert!(!prompts.lock().unwrap()[0].contains("Previous conversation"));
    }

    #[tokio::test]
    async fn test_name_is_injected() {
        let (llm, prompts) = capturing_llm("Hi Alice!");
        let generator = generator(llm);
        let history = vec![HistoryEntry::new("My name is Alice. Remember that.", "Got it.")];

        generator.generate_direct("Hello again", &history).await.unwrap();
        generator
            .generate_with_context("What is an index?", "ctx", &history)
            .await
            .unwrap();

        let prompts = prompts.lock().unwrap();
        assert!(prompts[0].contains("Address the user as Alice."));
        assert!(prompts[1].contains("Address the user as Alice."));
    }

    #[test]
    fn test_rag_prompt_excludes_history_by_default() {
        let generator = generator(MockLlmProvider::new());
        let prompt = generator.rag_prompt(
            "What is an index?",
            "Indexes speed up search.",
            &long_history(3),
        );

        assert!(prompt.contains("Context: Indexes speed up search."));
        assert!(prompt.contains("Question: What is an index?"));
        assert!(prompt.starts_with("You are a Milvus database expert."));
        assert!(!prompt.contains("question-02"));
    }

    #[test]
    fn test_rag_prompt_with_history_enabled() {
        let config = GeneratorConfig {
            include_history_in_rag: true,
            ..Default::default()
        };
        let generator = ResponseGenerator::new(Arc::new(MockLlmProvider::new()), &config);
        let prompt = generator.rag_prompt("And then?", "ctx", &long_history(5));

        assert!(prompt.contains("Previous conversation:"));
        assert!(prompt.contains("Q: question-04"));
        assert!(!prompt.contains("question-01"));
    }

    #[test]
    fn test_redirect_sentence_is_detected() {
        let generator = generator(MockLlmProvider::new());
        let sentence = generator.redirect_sentence();

        assert!(generator.is_redirect(&sentence));
        assert!(generator.direct_prompt("Who won the match?", &[]).contains(&sentence));
        assert!(!generator.is_redirect("Milvus supports HNSW indexes."));
    }

    #[tokio::test]
    async fn test_llm_failure_is_generation_error() {
        let mut llm = MockLlmProvider::new();
        llm.expect_invoke()
            .returning(|_| Err(anyhow::anyhow!("503 from upstream")));

        let err = generator(llm)
            .generate_with_context("q", "ctx", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Generation(_)));
    }
}
