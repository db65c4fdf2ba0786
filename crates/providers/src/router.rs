//! Backend selection: builds the model, embedder, tokenizer and web search
//! from configuration.
//!
//! The backend is a closed set of variants ([`ModelBackend`]) resolved once
//! here; the engine only ever sees trait objects.

use std::sync::Arc;

use contextweave_config::{AppConfig, ModelBackend, VectorizerKind};
use contextweave_core::error::ProviderError;
use contextweave_core::knowledge::InternetSearch;
use contextweave_core::provider::{Embedder, LanguageModel};
use contextweave_core::tokenizer::{CharTokenizer, Tokenizer};
use contextweave_memory::Vectorizer;
use tracing::{info, warn};

use crate::openai_compat::OpenAiCompatModel;
use crate::web_search::DuckDuckGoSearch;

/// Everything the engine needs from the outside world, built once.
#[derive(Clone)]
pub struct Backends {
    pub model: Arc<dyn LanguageModel>,
    pub embedder: Arc<dyn Embedder>,
    pub tokenizer: Arc<dyn Tokenizer>,
    pub internet: Option<Arc<dyn InternetSearch>>,
}

impl Backends {
    /// The vectorizer configured for document stores.
    pub fn vectorizer(&self, kind: VectorizerKind) -> Vectorizer {
        match kind {
            VectorizerKind::BagOfWords => Vectorizer::bag_of_words(),
            VectorizerKind::Embeddings => Vectorizer::Embeddings(Arc::clone(&self.embedder)),
        }
    }
}

/// Build backends from configuration.
pub fn build_from_config(config: &AppConfig) -> Result<Backends, ProviderError> {
    let settings = &config.provider;
    let base_url = settings.resolved_api_url().ok_or_else(|| {
        ProviderError::NotConfigured("provider.api_url is required for the custom backend".into())
    })?;

    let api_key = match (settings.kind, &settings.api_key) {
        (_, Some(key)) => key.clone(),
        (ModelBackend::Ollama, None) => "ollama".into(),
        (kind, None) => {
            warn!(provider = kind.as_str(), "No API key configured");
            String::new()
        }
    };

    let client = Arc::new(
        OpenAiCompatModel::new(settings.kind.as_str(), &base_url, api_key, &settings.model)?
            .with_embedding_model(&settings.embedding_model),
    );
    info!(provider = settings.kind.as_str(), model = %settings.model, url = %base_url, "Model backend ready");

    let tokenizer = build_tokenizer(config)?;

    let internet: Option<Arc<dyn InternetSearch>> = if config.activate_internet_search {
        let mut search = DuckDuckGoSearch::new(Arc::clone(&tokenizer))
            .map_err(|e| ProviderError::NotConfigured(e.to_string()))?
            .with_limits(5, config.rag_chunk_size, config.rag_n_chunks);
        if config.activate_internet_pages_judgement {
            search = search.with_judge(client.clone());
        }
        Some(Arc::new(search))
    } else {
        None
    };

    Ok(Backends {
        model: client.clone(),
        embedder: client,
        tokenizer,
        internet,
    })
}

#[cfg(feature = "hf-tokenizer")]
fn build_tokenizer(config: &AppConfig) -> Result<Arc<dyn Tokenizer>, ProviderError> {
    match &config.provider.tokenizer_path {
        Some(path) => Ok(Arc::new(crate::hf_tokenizer::HfTokenizer::from_file(path)?)),
        None => Ok(Arc::new(CharTokenizer)),
    }
}

#[cfg(not(feature = "hf-tokenizer"))]
fn build_tokenizer(config: &AppConfig) -> Result<Arc<dyn Tokenizer>, ProviderError> {
    if let Some(path) = &config.provider.tokenizer_path {
        warn!(
            path = %path.display(),
            "tokenizer_path set but built without the hf-tokenizer feature, counting characters"
        );
    }
    Ok(Arc::new(CharTokenizer))
}
