//! Model and search backends for contextweave.
//!
//! All language models implement `contextweave_core::LanguageModel`.
//! [`build_from_config`] selects the backends once from configuration.

#[cfg(feature = "hf-tokenizer")]
pub mod hf_tokenizer;
pub mod openai_compat;
pub mod router;
pub mod web_search;

#[cfg(feature = "hf-tokenizer")]
pub use hf_tokenizer::HfTokenizer;
pub use openai_compat::OpenAiCompatModel;
pub use router::{build_from_config, Backends};
pub use web_search::DuckDuckGoSearch;
