use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::utils::text::capitalize;

/// One prior exchange. Entries are appended in chronological order and never edited.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub question: String,
    pub answer: String,
}

impl HistoryEntry {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// The two substrings that together mark an off-topic redirect answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectMarkers {
    pub first: String,
    pub second: String,
}

impl RedirectMarkers {
    pub fn new(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self {
            first: first.into(),
            second: second.into(),
        }
    }

    /// Both markers must be present; one alone is an ordinary answer.
    pub fn is_redirect(&self, response: &str) -> bool {
        response.contains(&self.first) && response.contains(&self.second)
    }
}

impl Default for RedirectMarkers {
    fn default() -> Self {
        Self::new("I'm specialized in", "I don't have information")
    }
}

/// Caller-owned conversation log.
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    entries: Vec<HistoryEntry>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an exchange unless the answer is a redirect.
    /// Returns whether the exchange was stored.
    pub fn record(
        &mut self,
        question: impl Into<String>,
        answer: impl Into<String>,
        markers: &RedirectMarkers,
    ) -> bool {
        let answer = answer.into();
        if markers.is_redirect(&answer) {
            return false;
        }
        self.entries.push(HistoryEntry::new(question, answer));
        true
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<HistoryEntry>> for ConversationHistory {
    fn from(entries: Vec<HistoryEntry>) -> Self {
        Self { entries }
    }
}

/// The last `n` entries, oldest first.
pub fn recent(history: &[HistoryEntry], n: usize) -> &[HistoryEntry] {
    &history[history.len().saturating_sub(n)..]
}

static MY_NAME_IS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bmy name is\b").expect("valid regex"));

static I_AM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bi am\b").expect("valid regex"));

/// Name the user gave most recently, scanning newest-first.
///
/// Per question, "my name is" is tried before "i am". The name is the first word
/// after the phrase, cut at `.` or `,`, stripped of trailing punctuation and
/// capitalized.
pub fn extract_user_name(history: &[HistoryEntry]) -> Option<String> {
    history.iter().rev().find_map(|entry| {
        let question = entry.question.to_lowercase();
        let rest = MY_NAME_IS_RE
            .find(&question)
            .or_else(|| I_AM_RE.find(&question))
            .map(|m| &question[m.end()..])?;

        let word = rest
            .split(['.', ','])
            .next()?
            .split_whitespace()
            .next()?
            .trim_end_matches(|c: char| !c.is_alphanumeric());

        if word.is_empty() {
            None
        } else {
            Some(capitalize(word))
        }
    })
}
