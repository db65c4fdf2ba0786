//! HuggingFace `tokenizer.json` adapter (behind the `hf-tokenizer` feature).
//!
//! Gives exact token counts for models whose vocabulary is published as a
//! HuggingFace tokenizer file.

use contextweave_core::error::ProviderError;
use contextweave_core::tokenizer::Tokenizer;
use std::path::Path;
use tracing::{debug, warn};

pub struct HfTokenizer {
    name: String,
    inner: tokenizers::Tokenizer,
}

impl HfTokenizer {
    pub fn from_file(path: &Path) -> Result<Self, ProviderError> {
        let inner = tokenizers::Tokenizer::from_file(path)
            .map_err(|e| ProviderError::NotConfigured(format!("Failed to load tokenizer: {e}")))?;
        debug!(path = %path.display(), "HuggingFace tokenizer loaded");
        Ok(Self {
            name: format!("hf:{}", path.display()),
            inner,
        })
    }
}

impl Tokenizer for HfTokenizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn tokenize(&self, text: &str) -> Vec<u32> {
        match self.inner.encode(text, false) {
            Ok(encoding) => encoding.get_ids().to_vec(),
            Err(e) => {
                warn!(error = %e, "Tokenization failed, counting characters instead");
                text.chars().map(u32::from).collect()
            }
        }
    }

    fn detokenize(&self, tokens: &[u32]) -> String {
        self.inner.decode(tokens, false).unwrap_or_else(|e| {
            warn!(error = %e, "Detokenization failed");
            String::new()
        })
    }
}
