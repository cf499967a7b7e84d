//! Query classification: does this question need documents from the index?
//!
//! Both strategies share the same first two tiers (keyword pre-filter, then the
//! classification cache) and differ only in how they consult the LLM.

mod pattern_llm;
mod patterns;
mod tool_calling;

pub use pattern_llm::PatternLlmClassifier;
pub use patterns::{PatternSet, DEFAULT_NO_RETRIEVAL_PATTERNS, DEFAULT_RETRIEVAL_PATTERNS};
pub use tool_calling::ToolCallingClassifier;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{ClassificationFailurePolicy, ClassifierConfig, ClassifierStrategy};
use crate::models::{ClassificationResult, ClassificationSource, HistoryEntry};
use crate::services::cache::MemoCache;
use crate::services::providers::LlmProvider;
use crate::utils::{normalize, RagError};

#[async_trait]
pub trait QueryClassifier: Send + Sync {
    async fn classify(
        &self,
        question: &str,
        history: &[HistoryEntry],
    ) -> Result<ClassificationResult, RagError>;
}

/// LLM verdict parser: any "YES", case-insensitive, anywhere in the text.
pub fn is_affirmative(text: &str) -> bool {
    text.to_uppercase().contains("YES")
}

/// Build the configured strategy over a shared classification cache.
pub fn build_classifier(
    config: &ClassifierConfig,
    domain: &str,
    llm: Arc<dyn LlmProvider>,
    cache: MemoCache<ClassificationResult>,
) -> Result<Arc<dyn QueryClassifier>, RagError> {
    let patterns = PatternSet::from_config(config)?;
    let gate = ClassificationGate::new(patterns, cache, config.on_failure);

    let classifier: Arc<dyn QueryClassifier> = match config.strategy {
        ClassifierStrategy::PatternLlm => Arc::new(PatternLlmClassifier::new(
            gate,
            llm,
            domain,
            config.history_questions,
        )),
        ClassifierStrategy::ToolCalling => Arc::new(ToolCallingClassifier::new(
            gate,
            llm,
            domain,
            config.agent_max_iterations,
        )),
    };

    Ok(classifier)
}

/// Pattern and cache tiers plus the failure policy, shared by every strategy.
#[derive(Clone)]
pub(crate) struct ClassificationGate {
    patterns: PatternSet,
    cache: MemoCache<ClassificationResult>,
    on_failure: ClassificationFailurePolicy,
}

impl ClassificationGate {
    pub(crate) fn new(
        patterns: PatternSet,
        cache: MemoCache<ClassificationResult>,
        on_failure: ClassificationFailurePolicy,
    ) -> Self {
        Self {
            patterns,
            cache,
            on_failure,
        }
    }

    pub(crate) fn patterns(&self) -> &PatternSet {
        &self.patterns
    }

    /// Decision from the cheap tiers, if any.
    pub(crate) fn pre_classify(&self, question: &str) -> Option<ClassificationResult> {
        if let Some(needs_retrieval) = self.patterns.match_question(question) {
            return Some(ClassificationResult::new(
                needs_retrieval,
                ClassificationSource::Pattern,
            ));
        }

        let key = normalize(question);
        self.cache.get(&key).inspect(|cached| {
            debug!(
                "Classification cache hit: needs_retrieval={} ({})",
                cached.needs_retrieval, cached.source
            );
        })
    }

    /// Cache a fresh LLM-tier verdict, or apply the failure policy.
    pub(crate) fn settle(
        &self,
        question: &str,
        verdict: anyhow::Result<bool>,
        source: ClassificationSource,
    ) -> Result<ClassificationResult, RagError> {
        match verdict {
            Ok(needs_retrieval) => {
                let result = ClassificationResult::new(needs_retrieval, source);
                self.cache.insert(normalize(question), result);
                Ok(result)
            }
            Err(e) => match self.on_failure {
                ClassificationFailurePolicy::Propagate => Err(RagError::classification(e)),
                ClassificationFailurePolicy::SkipRetrieval => {
                    warn!("Classification failed, answering without retrieval: {}", e);
                    Ok(ClassificationResult::new(false, source))
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_affirmative() {
        assert!(is_affirmative("YES"));
        assert!(is_affirmative("yes."));
        assert!(is_affirmative("Answer: Yes, it needs docs"));
        assert!(!is_affirmative("NO"));
        assert!(!is_affirmative(""));
    }

    #[test]
    fn test_gate_pattern_tier() {
        let gate = ClassificationGate::new(
            PatternSet::default(),
            MemoCache::new("classification"),
            ClassificationFailurePolicy::Propagate,
        );

        let result = gate.pre_classify("Hello").unwrap();
        assert!(!result.needs_retrieval);
        assert_eq!(result.source, ClassificationSource::Pattern);

        assert!(gate.pre_classify("Tell me more about its features").is_none());
    }

    #[test]
    fn test_gate_settle_caches_success_only() {
        let cache = MemoCache::new("classification");
        let gate = ClassificationGate::new(
            PatternSet::default(),
            cache.clone(),
            ClassificationFailurePolicy::SkipRetrieval,
        );

        let failed = gate
            .settle("What about it?", Err(anyhow::anyhow!("timeout")), ClassificationSource::Llm)
            .unwrap();
        assert!(!failed.needs_retrieval);
        assert!(cache.is_empty());

        gate.settle("  What About It? ", Ok(true), ClassificationSource::Llm)
            .unwrap();
        assert_eq!(
            cache.get("what about it?"),
            Some(ClassificationResult::new(true, ClassificationSource::Llm))
        );

        let cached = gate.pre_classify("what about it?").unwrap();
        assert!(cached.needs_retrieval);
    }

    #[test]
    fn test_gate_propagate_policy() {
        let gate = ClassificationGate::new(
            PatternSet::default(),
            MemoCache::new("classification"),
            ClassificationFailurePolicy::Propagate,
        );

        let err = gate
            .settle(
                "What about it?",
                Err(anyhow::anyhow!("connection refused")),
                ClassificationSource::Llm,
            )
            .unwrap_err();
        assert!(matches!(err, RagError::Classification(_)));
    }
}
