pub mod history;
pub mod query;

pub use history::{
    extract_user_name, recent, ConversationHistory, HistoryEntry, RedirectMarkers,
};
pub use query::{
    ClassificationResult, ClassificationSource, QueryOutcome, QueryRequest, QueryResponse,
    RetrievalResult,
};
