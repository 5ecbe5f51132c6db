//! Error taxonomy for the query path.
//!
//! Everything below the orchestrator is rendered to text for the model
//! via `Display`; only [`RagError::ModelInvocation`] is surfaced to the
//! caller of a query as a hard error. A filter that matches nothing is not
//! an error at all: it is an empty [`SearchResults`](crate::vector_store::SearchResults).

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RagError {
    /// Fuzzy course resolution produced no title (empty catalog).
    #[error("No course found matching '{0}'")]
    Resolution(String),

    /// Backend or embedding failure during add/search.
    #[error("Search error: {0}")]
    Store(String),

    /// The language model call itself failed (network, auth, rate limit).
    #[error("Model invocation failed: {0}")]
    ModelInvocation(String),
}

impl RagError {
    pub fn store(err: impl std::fmt::Display) -> Self {
        RagError::Store(err.to_string())
    }

    pub fn model(err: impl std::fmt::Display) -> Self {
        RagError::ModelInvocation(err.to_string())
    }
}
