//! # contextweave Core
//!
//! Domain types, collaborator traits, and error definitions for the
//! contextweave context-assembly engine. This crate has **no framework
//! dependencies**: it defines the contracts the engine consumes.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (tokenizer, language model, vector stores,
//! skills library, web search, conversation and language-pack storage) is a
//! trait here. Implementations live in their respective crates, so the
//! engine can be driven by real backends or by in-memory stubs in tests.

pub mod error;
pub mod knowledge;
pub mod language;
pub mod message;
pub mod personality;
pub mod progress;
pub mod provider;
pub mod tokenizer;

// Re-export key types at crate root for ergonomics
pub use error::{ContextError, Error, ProviderError, Result, StoreError};
pub use knowledge::{
    DocumentInfo, InternetSearch, KnowledgeChunk, SkillEntry, SkillMatch, SkillsStore, VectorStore,
};
pub use language::{normalize_language, LanguagePackEntry, LanguagePackStore};
pub use message::{ConversationStore, Message, SenderType, Visibility};
pub use personality::{replace_keys, Personality};
pub use progress::{NoopProgress, ProgressBus, ProgressEvent, ProgressReporter, StepPhase, TracingProgress};
pub use provider::{Embedder, GenerationRequest, GenerationResponse, LanguageModel, Usage};
pub use tokenizer::{CharTokenizer, Tokenizer};
