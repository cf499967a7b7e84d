use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::config::Settings;
use crate::models::{ClassificationResult, HistoryEntry, QueryOutcome};
use crate::services::cache::{CacheStats, MemoCache};
use crate::services::classifier::{build_classifier, QueryClassifier};
use crate::services::generator::ResponseGenerator;
use crate::services::providers::{EmbeddingProvider, LlmProvider, VectorIndex};
use crate::services::retriever::Retriever;
use crate::utils::{normalize, RagError};

/// Public entry point: cache, classify, optionally retrieve, generate, cache.
///
/// `Send + Sync`; share it behind an `Arc`. Each call runs its stages in order and
/// spawns nothing.
pub struct RagOrchestrator {
    classifier: Arc<dyn QueryClassifier>,
    retriever: Retriever,
    generator: ResponseGenerator,
    classification_cache: MemoCache<ClassificationResult>,
    response_cache: MemoCache<QueryOutcome>,
    key_includes_history: bool,
}

impl RagOrchestrator {
    pub fn new(
        classifier: Arc<dyn QueryClassifier>,
        retriever: Retriever,
        generator: ResponseGenerator,
        classification_cache: MemoCache<ClassificationResult>,
        response_cache: MemoCache<QueryOutcome>,
        key_includes_history: bool,
    ) -> Self {
        Self {
            classifier,
            retriever,
            generator,
            classification_cache,
            response_cache,
            key_includes_history,
        }
    }

    /// Wire every component from settings around the given collaborators.
    pub fn from_settings(
        settings: &Settings,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        llm: Arc<dyn LlmProvider>,
    ) -> Result<Self, RagError> {
        let classification_cache = MemoCache::from_config("classification", &settings.cache);
        let response_cache = MemoCache::from_config("response", &settings.cache);

        let classifier = build_classifier(
            &settings.classifier,
            &settings.generator.domain,
            llm.clone(),
            classification_cache.clone(),
        )?;

        let retriever = Retriever::new(
            embedder,
            index,
            settings.milvus.collection_name.clone(),
            settings.retrieval.clone(),
        )?;

        let generator = ResponseGenerator::new(llm, &settings.generator);

        info!(
            "RAG orchestrator ready (collection: {}, classifier: {:?})",
            settings.milvus.collection_name, settings.classifier.strategy
        );

        Ok(Self::new(
            classifier,
            retriever,
            generator,
            classification_cache,
            response_cache,
            settings.cache.key_includes_history,
        ))
    }

    pub fn generator(&self) -> &ResponseGenerator {
        &self.generator
    }

    /// Classification and response cache statistics, in that order.
    pub fn cache_stats(&self) -> (CacheStats, CacheStats) {
        (self.classification_cache.stats(), self.response_cache.stats())
    }

    fn cache_key(&self, question: &str, history: &[HistoryEntry]) -> String {
        let key = normalize(question);
        if !self.key_includes_history {
            return key;
        }

        let mut hasher = DefaultHasher::new();
        history.hash(&mut hasher);
        format!("{}#{:016x}", key, hasher.finish())
    }

    /// Answer a question. Returns the answer, how many documents backed it, and
    /// whether retrieval ran at all.
    ///
    /// With the default cache keying, a repeated question returns the first stored
    /// outcome whatever the history.
    pub async fn query(
        &self,
        question: &str,
        history: &[HistoryEntry],
    ) -> Result<QueryOutcome, RagError> {
        let start = Instant::now();
        let key = self.cache_key(question, history);

        debug!("CACHE_CHECK");
        if let Some(cached) = self.response_cache.get(&key) {
            info!("Cache hit ({}ms)", start.elapsed().as_millis());
            return Ok(cached);
        }

        debug!("CLASSIFY");
        let classification = self.classifier.classify(question, history).await?;
        debug!(
            "Classified needs_retrieval={} via {}",
            classification.needs_retrieval, classification.source
        );

        let outcome = if classification.needs_retrieval {
            debug!("RETRIEVE");
            let retrieval = self.retriever.retrieve(question).await;

            debug!("GENERATE_RAG with {} document(s)", retrieval.document_count);
            let answer = self
                .generator
                .generate_with_context(question, &retrieval.context, history)
                .await?;

            QueryOutcome {
                answer,
                doc_count: retrieval.document_count,
                retrieval_attempted: true,
            }
        } else {
            debug!("GENERATE_DIRECT");
            let answer = self.generator.generate_direct(question, history).await?;

            QueryOutcome {
                answer,
                doc_count: 0,
                retrieval_attempted: false,
            }
        };

        debug!("CACHE_WRITE");
        self.response_cache.insert(key, outcome.clone());

        info!(
            "Query answered: {} document(s), retrieval_attempted={} ({}ms)",
            outcome.doc_count,
            outcome.retrieval_attempted,
            start.elapsed().as_millis()
        );

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GeneratorConfig, RetrievalConfig};
    use crate::models::ClassificationSource;
    use crate::services::providers::{
        MockEmbeddingProvider, MockLlmProvider, MockVectorIndex, SearchHit,
    };
    use async_trait::async_trait;

    /// Classifier stub with a fixed verdict.
    struct FixedClassifier(bool);

    #[async_trait]
    impl QueryClassifier for FixedClassifier {
        async fn classify(
            &self,
            _question: &str,
            _history: &[HistoryEntry],
        ) -> Result<ClassificationResult, RagError> {
            Ok(ClassificationResult::new(self.0, ClassificationSource::Llm))
        }
    }

    fn embedder() -> MockEmbeddingProvider {
        let mut embedder = MockEmbeddingProvider::new();
        embedder.expect_embed().returning(|_| Ok(vec![0.5; 4]));
        embedder
    }

    fn index_with(hits: Vec<&'static str>) -> MockVectorIndex {
        let mut index = MockVectorIndex::new();
        index.expect_search().returning(move |_| {
            Ok(hits
                .iter()
                .map(|t| SearchHit {
                    text: t.to_string(),
                    score: 0.9,
                })
                .collect())
        });
        index
    }

    fn orchestrator(
        classifier: Arc<dyn QueryClassifier>,
        index: MockVectorIndex,
        llm: MockLlmProvider,
        key_includes_history: bool,
    ) -> RagOrchestrator {
        let retriever = Retriever::new(
            Arc::new(embedder()),
            Arc::new(index),
            "milvus_docs",
            RetrievalConfig::default(),
        )
        .unwrap();
        let generator = ResponseGenerator::new(Arc::new(llm), &GeneratorConfig::default());

        RagOrchestrator::new(
            classifier,
            retriever,
            generator,
            MemoCache::new("classification"),
            MemoCache::new("response"),
            key_includes_history,
        )
    }

    #[tokio::test]
    async fn test_retrieval_path() {
        let mut llm = MockLlmProvider::new();
        llm.expect_invoke()
            .withf(|p: &str| p.contains("Context: Milvus stores vectors in segments."))
            .times(1)
            .returning(|_| Ok("Milvus stores vectors in segments.".to_string()));

        let o = orchestrator(
            Arc::new(FixedClassifier(true)),
            index_with(vec!["Milvus stores vectors in segments."]),
            llm,
            false,
        );

        let outcome = o.query("How does Milvus store vectors?", &[]).await.unwrap();
        assert_eq!(outcome.doc_count, 1);
        assert!(outcome.retrieval_attempted);
    }

    #[tokio::test]
    async fn test_empty_retrieval_still_answers() {
        let mut llm = MockLlmProvider::new();
        llm.expect_invoke()
            .times(1)
            .returning(|_| Ok("I could not find anything specific.".to_string()));

        let o = orchestrator(Arc::new(FixedClassifier(true)), index_with(vec![]), llm, false);

        let outcome = o.query("What is a partition key?", &[]).await.unwrap();
        assert!(!outcome.answer.is_empty());
        assert_eq!(outcome.doc_count, 0);
        assert!(outcome.retrieval_attempted);
    }

    #[tokio::test]
    async fn test_direct_path_skips_retrieval() {
        let mut index = MockVectorIndex::new();
        index.expect_search().times(0);

        let mut llm = MockLlmProvider::new();
        llm.expect_invoke()
            .times(1)
            .returning(|_| Ok("Hello! How can I help with Milvus?".to_string()));

        let o = orchestrator(Arc::new(FixedClassifier(false)), index, llm, false);

        let outcome = o.query("Hello", &[]).await.unwrap();
        assert_eq!(outcome.doc_count, 0);
        assert!(!outcome.retrieval_attempted);
    }

    #[tokio::test]
    async fn test_repeated_question_is_served_from_cache() {
        let mut llm = MockLlmProvider::new();
        llm.expect_invoke()
            .times(1)
            .returning(|_| Ok("first answer".to_string()));

        let o = orchestrator(
            Arc::new(FixedClassifier(true)),
            index_with(vec!["doc"]),
            llm,
            false,
        );

        let h1: Vec<HistoryEntry> = vec![];
        let h2 = vec![HistoryEntry::new("My name is Bob", "Hi Bob")];

        let first = o.query("What is Milvus?", &h1).await.unwrap();
        let second = o.query("  what is MILVUS? ", &h2).await.unwrap();

        assert_eq!(first, second);
        let (_, response_stats) = o.cache_stats();
        assert_eq!(response_stats.entries, 1);
        assert_eq!(response_stats.hits, 1);
    }

    #[tokio::test]
    async fn test_history_keyed_cache_recomputes() {
        let mut llm = MockLlmProvider::new();
        llm.expect_invoke()
            .times(2)
            .returning(|_| Ok("answer".to_string()));

        let o = orchestrator(Arc::new(FixedClassifier(false)), MockVectorIndex::new(), llm, true);

        let h2 = vec![HistoryEntry::new("My name is Bob", "Hi Bob")];
        o.query("What is Milvus?", &[]).await.unwrap();
        o.query("What is Milvus?", &h2).await.unwrap();
        // same history again is a hit
        o.query("what is milvus?", &h2).await.unwrap();

        assert_eq!(o.cache_stats().1.entries, 2);
    }

    #[tokio::test]
    async fn test_generation_failure_is_not_cached() {
        let mut llm = MockLlmProvider::new();
        llm.expect_invoke()
            .returning(|_| Err(anyhow::anyhow!("model crashed")));

        let o = orchestrator(Arc::new(FixedClassifier(false)), MockVectorIndex::new(), llm, false);

        let err = o.query("Hello", &[]).await.unwrap_err();
        assert!(matches!(err, RagError::Generation(_)));
        assert_eq!(o.cache_stats().1.entries, 0);
    }

    #[tokio::test]
    async fn test_classifier_and_generator_share_llm() {
        // pattern miss -> LLM says NO -> direct answer, two calls total
        let mut llm = MockLlmProvider::new();
        llm.expect_invoke()
            .withf(|p: &str| p.contains("Answer (YES/NO):"))
            .times(1)
            .returning(|_| Ok("NO".to_string()));
        llm.expect_invoke()
            .withf(|p: &str| !p.contains("Answer (YES/NO):"))
            .times(1)
            .returning(|_| Ok("Could you clarify which feature?".to_string()));

        let llm: Arc<dyn LlmProvider> = Arc::new(llm);
        let classification_cache = MemoCache::new("classification");
        let classifier = build_classifier(
            &Default::default(),
            "Milvus",
            llm.clone(),
            classification_cache.clone(),
        )
        .unwrap();

        let mut index = MockVectorIndex::new();
        index.expect_search().times(0);
        let retriever = Retriever::new(
            Arc::new(embedder()),
            Arc::new(index),
            "milvus_docs",
            RetrievalConfig::default(),
        )
        .unwrap();

        let o = RagOrchestrator::new(
            classifier,
            retriever,
            ResponseGenerator::new(llm, &GeneratorConfig::default()),
            classification_cache,
            MemoCache::new("response"),
            false,
        );

        let outcome = o.query("Tell me more about its features", &[]).await.unwrap();
        assert!(!outcome.retrieval_attempted);
        assert_eq!(o.cache_stats().0.entries, 1);
    }
}
