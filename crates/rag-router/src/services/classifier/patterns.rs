use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use crate::config::ClassifierConfig;
use crate::utils::RagError;

/// Greetings, small talk, conversation management and personal instructions.
pub const DEFAULT_NO_RETRIEVAL_PATTERNS: &[&str] = &[
    // Weather / small talk
    "weather",
    "temperature",
    "rain",
    "sunny",
    "cloudy",
    "philosophy",
    "politics",
    "interdependence",
    // Greetings
    "hello",
    "hi",
    "thanks",
    "thank you",
    "bye",
    "goodbye",
    // Conversation management
    "resume",
    "conversation",
    "summarize",
    "continue",
    "anything else",
    "another subject",
    "different topic",
    // Personal instructions
    "my name is",
    "from now on",
    "always include",
];

/// Domain vocabulary that always needs documentation.
pub const DEFAULT_RETRIEVAL_PATTERNS: &[&str] = &[
    "milvus",
    "vector",
    "database",
    "collection",
    "search",
    "retrieve",
    "embedding",
    "index",
    "schema",
];

/// Terms up to this length match exactly, without a plural suffix.
const MAX_EXACT_TERM_CHARS: usize = 3;

static DEFAULT_PATTERNS: LazyLock<PatternSet> = LazyLock::new(|| {
    PatternSet::new(DEFAULT_NO_RETRIEVAL_PATTERNS, DEFAULT_RETRIEVAL_PATTERNS)
        .expect("built-in patterns compile")
});

/// Compile a term list into one case-insensitive alternation.
///
/// Terms match whole words. Terms longer than three characters also take a plural
/// suffix ("vector" hits "vectors"); short ones match exactly, so "hi" hits neither
/// "his" nor "high".
fn compile(terms: &[impl AsRef<str>]) -> Result<Option<Regex>, regex::Error> {
    let (short, long): (Vec<String>, Vec<String>) = terms
        .iter()
        .map(|t| t.as_ref().trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .partition(|t| t.chars().count() <= MAX_EXACT_TERM_CHARS);

    let mut branches = Vec::with_capacity(2);
    if !long.is_empty() {
        branches.push(format!(r"\b(?:{})(?:s|es)?\b", alternation(&long)));
    }
    if !short.is_empty() {
        branches.push(format!(r"\b(?:{})\b", alternation(&short)));
    }

    if branches.is_empty() {
        return Ok(None);
    }

    Regex::new(&format!("(?i){}", branches.join("|"))).map(Some)
}

fn alternation(terms: &[String]) -> String {
    terms
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|")
}

/// Deterministic keyword pre-filter.
#[derive(Debug, Clone)]
pub struct PatternSet {
    no_retrieval: Option<Regex>,
    retrieval: Option<Regex>,
}

impl PatternSet {
    pub fn new(
        no_retrieval: &[impl AsRef<str>],
        retrieval: &[impl AsRef<str>],
    ) -> Result<Self, RagError> {
        let no_retrieval = compile(no_retrieval)
            .map_err(|e| RagError::Configuration(format!("invalid no-retrieval pattern: {}", e)))?;
        let retrieval = compile(retrieval)
            .map_err(|e| RagError::Configuration(format!("invalid retrieval pattern: {}", e)))?;

        Ok(Self {
            no_retrieval,
            retrieval,
        })
    }

    /// Built-in lists, replaced per side by any list set in config.
    pub fn from_config(config: &ClassifierConfig) -> Result<Self, RagError> {
        match (&config.no_retrieval_patterns, &config.retrieval_patterns) {
            (None, None) => Ok(Self::default()),
            (no, yes) => {
                let no: Vec<String> = no
                    .clone()
                    .unwrap_or_else(|| to_owned(DEFAULT_NO_RETRIEVAL_PATTERNS));
                let yes: Vec<String> = yes
                    .clone()
                    .unwrap_or_else(|| to_owned(DEFAULT_RETRIEVAL_PATTERNS));
                Self::new(&no, &yes)
            }
        }
    }

    /// `Some(false)` on a no-retrieval hit, `Some(true)` on a retrieval hit,
    /// `None` when neither list matches. No-retrieval wins when both match.
    pub fn match_question(&self, question: &str) -> Option<bool> {
        if let Some(m) = self.no_retrieval.as_ref().and_then(|re| re.find(question)) {
            debug!("No-retrieval pattern matched: {:?}", m.as_str());
            return Some(false);
        }

        if let Some(m) = self.retrieval.as_ref().and_then(|re| re.find(question)) {
            debug!("Retrieval pattern matched: {:?}", m.as_str());
            return Some(true);
        }

        None
    }

    /// Verdict string returned by the `classify_query` agent tool.
    ///
    /// Retrieval terms are checked first here; an undecided question is a NO.
    pub fn tool_verdict(&self, question: &str, domain: &str) -> String {
        if self.retrieval.as_ref().is_some_and(|re| re.is_match(question)) {
            return format!("YES - {} technical query", domain);
        }
        if self.no_retrieval.as_ref().is_some_and(|re| re.is_match(question)) {
            return "NO - off-topic or social".to_string();
        }
        format!("NO - not clearly {}-related", domain)
    }
}

impl Default for PatternSet {
    fn default() -> Self {
        DEFAULT_PATTERNS.clone()
    }
}

fn to_owned(terms: &[&str]) -> Vec<String> {
    terms.iter().map(|t| t.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greetings_skip_retrieval() {
        let patterns = PatternSet::default();
        assert_eq!(patterns.match_question("Hello"), Some(false));
        assert_eq!(patterns.match_question("hi there!"), Some(false));
        assert_eq!(patterns.match_question("Thanks a lot"), Some(false));
        assert_eq!(patterns.match_question("What's the weather like?"), Some(false));
        assert_eq!(patterns.match_question("My name is Alice"), Some(false));
    }

    #[test]
    fn test_domain_terms_need_retrieval() {
        let patterns = PatternSet::default();
        assert_eq!(
            patterns.match_question("How does Milvus store vectors?"),
            Some(true)
        );
        assert_eq!(patterns.match_question("Explain HNSW indexes"), Some(true));
        assert_eq!(patterns.match_question("What is a SCHEMA?"), Some(true));
    }

    #[test]
    fn test_no_pattern_wins() {
        let patterns = PatternSet::default();
        assert_eq!(
            patterns.match_question("Hello, can you summarize the Milvus index docs?"),
            Some(false)
        );
    }

    #[test]
    fn test_word_boundaries() {
        let patterns = PatternSet::default();
        // "hi" must not fire inside other words
        assert_eq!(patterns.match_question("Is this high throughput?"), None);
        assert_eq!(patterns.match_question("What about training data?"), None);
    }

    #[test]
    fn test_short_terms_take_no_plural() {
        let patterns = PatternSet::default();
        assert_eq!(
            patterns.match_question("How is his collection indexed?"),
            Some(true)
        );
        assert_eq!(patterns.match_question("Any clues in his notes?"), None);
        // longer terms still accept plurals
        assert_eq!(patterns.match_question("Please continues"), Some(false));
        assert_eq!(patterns.match_question("Any schemas to share?"), Some(true));
    }

    #[test]
    fn test_pronoun_follow_up_is_undecided() {
        let patterns = PatternSet::default();
        assert_eq!(patterns.match_question("Tell me more about its features"), None);
    }

    #[test]
    fn test_configured_lists_replace_defaults() {
        let config = ClassifierConfig {
            retrieval_patterns: Some(vec!["qdrant".to_string()]),
            ..Default::default()
        };
        let patterns = PatternSet::from_config(&config).unwrap();

        assert_eq!(patterns.match_question("Qdrant payloads"), Some(true));
        assert_eq!(patterns.match_question("Milvus payloads"), None);
        // no-retrieval side keeps the defaults
        assert_eq!(patterns.match_question("hello"), Some(false));
    }

    #[test]
    fn test_empty_lists_never_match() {
        let patterns = PatternSet::new(&[] as &[&str], &[] as &[&str]).unwrap();
        assert_eq!(patterns.match_question("hello milvus"), None);
    }

    #[test]
    fn test_special_characters_are_literal() {
        let patterns = PatternSet::new(&["c++"], &["a.b"]).unwrap();
        assert_eq!(patterns.match_question("axb"), None);
        assert_eq!(patterns.match_question("a.b"), Some(true));
    }

    #[test]
    fn test_tool_verdict() {
        let patterns = PatternSet::default();
        assert_eq!(
            patterns.tool_verdict("milvus collections", "Milvus"),
            "YES - Milvus technical query"
        );
        assert_eq!(
            patterns.tool_verdict("let's talk politics", "Milvus"),
            "NO - off-topic or social"
        );
        assert_eq!(
            patterns.tool_verdict("tell me more about its features", "Milvus"),
            "NO - not clearly Milvus-related"
        );
    }
}
