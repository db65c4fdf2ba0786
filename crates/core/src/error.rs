//! Error types for the contextweave domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum, wrapped by [`Error`].

use thiserror::Error;

/// The top-level error type for all contextweave operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Model / embedding transport ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Vector, skills, internet, conversation and language-pack stores ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Context assembly ---
    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Store '{store}' unavailable: {reason}")]
    Unavailable { store: String, reason: String },

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Corrupt entry at {path}: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),
}

/// Failures of the assembly pipeline itself.
#[derive(Debug, Clone, Error)]
pub enum ContextError {
    /// Source blocks leave no room for the history and generation.
    ///
    /// `breakdown` lists each source block with its token count, in the order
    /// the blocks were assembled.
    #[error("{}", format_budget_error(.available_space, .ctx_size, .reserved, .consumed, .breakdown))]
    InsufficientContextBudget {
        available_space: i64,
        ctx_size: usize,
        reserved: usize,
        consumed: usize,
        breakdown: Vec<(String, usize)>,
    },

    #[error("Message {0} not found in discussion")]
    MessageNotFound(String),

    #[error("Discussion '{0}' has no messages")]
    EmptyDiscussion(String),

    #[error("The default language '{0}' cannot be deleted")]
    DefaultLanguageDeletion(String),
}

impl ContextError {
    /// The source block consuming the most tokens, if any.
    pub fn dominant_consumer(&self) -> Option<(&str, usize)> {
        match self {
            ContextError::InsufficientContextBudget { breakdown, .. } => breakdown
                .iter()
                .max_by_key(|(_, tokens)| *tokens)
                .map(|(name, tokens)| (name.as_str(), *tokens)),
            _ => None,
        }
    }
}

fn format_budget_error(
    available_space: &i64,
    ctx_size: &usize,
    reserved: &usize,
    consumed: &usize,
    breakdown: &[(String, usize)],
) -> String {
    let parts: Vec<String> = breakdown
        .iter()
        .filter(|(_, tokens)| *tokens > 0)
        .map(|(name, tokens)| format!("{name}={tokens}"))
        .collect();
    let dominant = breakdown
        .iter()
        .max_by_key(|(_, tokens)| *tokens)
        .map(|(name, tokens)| format!(", largest consumer is {name} ({tokens} tokens)"))
        .unwrap_or_default();
    format!(
        "Insufficient context budget: {available_space} tokens left of {ctx_size} \
         (reserved {reserved}, consumed {consumed}; sources: {}){dominant}",
        parts.join(", ")
    )
}
