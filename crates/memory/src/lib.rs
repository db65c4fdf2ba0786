//! Store implementations for contextweave.
//!
//! - [`FileLanguagePackStore`] / [`InMemoryLanguagePackStore`]: language-pack cache storage
//! - [`InMemoryVectorStore`]: chunked document search
//! - [`SkillsLibrary`]: prior learnings, optionally mirrored to JSONL
//! - [`InMemoryConversationStore`]: discussions by client id

pub mod conversation;
pub mod document_store;
pub mod file_backend;
pub mod in_memory;
pub mod skills;
pub mod vector;

pub use conversation::InMemoryConversationStore;
pub use document_store::{chunk_text, InMemoryVectorStore};
pub use file_backend::FileLanguagePackStore;
pub use in_memory::InMemoryLanguagePackStore;
pub use skills::SkillsLibrary;
pub use vector::{bag_of_words, cosine_similarity, rank_by_similarity, Vectorizer};
