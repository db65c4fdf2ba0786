//! Configuration loading, validation, and management for contextweave.
//!
//! Loads configuration from `~/.contextweave/config.toml` with environment
//! variable overrides. Validates all settings at startup.
//!
//! Option names follow the flat `snake_case` keys of the discussion
//! settings they mirror (`ctx_size`, `rag_n_chunks`, ...); header templates,
//! the model backend and mounted databases live in nested tables.

use contextweave_core::Personality;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Tokens the budget allocator keeps free below `ctx_size` for any single block.
pub const MIN_CTX_SIZE: usize = 512;

/// The root configuration structure.
///
/// Maps directly to `~/.contextweave/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    // ── Budget ───────────────────────────────────────────────────────────
    /// Model context window in tokens
    #[serde(default = "default_ctx_size")]
    pub ctx_size: usize,

    /// Tokens reserved for the answer when the caller does not ask for a size
    #[serde(default = "default_max_n_predict")]
    pub max_n_predict: usize,

    // ── Document retrieval ───────────────────────────────────────────────
    /// Chunks to collect across all mounted stores
    #[serde(default = "default_rag_n_chunks")]
    pub rag_n_chunks: usize,

    /// Final cap after sorting; `rag_n_chunks` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rag_n_neighbors: Option<usize>,

    #[serde(default = "default_rag_max_n_hops")]
    pub rag_max_n_hops: usize,

    /// Ask the model to verify each chunk's relevance
    #[serde(default)]
    pub rag_activate_multi_hops: bool,

    /// Reformulate the user prompt into a search query first
    #[serde(default)]
    pub rag_build_keys_words: bool,

    #[serde(default = "default_rag_min_correspondance")]
    pub rag_min_correspondance: f32,

    /// Inject whole documents instead of searching
    #[serde(default)]
    pub rag_deactivate: bool,

    /// Include title and path lines with every chunk
    #[serde(default = "default_true")]
    pub rag_put_chunk_informations_into_context: bool,

    /// Summarise each document against the query instead of chunk search
    #[serde(default)]
    pub contextual_summary: bool,

    /// Characters per chunk when ingesting documents
    #[serde(default = "default_rag_chunk_size")]
    pub rag_chunk_size: usize,

    #[serde(default)]
    pub rag_vectorizer: VectorizerKind,

    // ── Internet ─────────────────────────────────────────────────────────
    #[serde(default)]
    pub activate_internet_search: bool,

    /// Ask the model whether a search is needed before crafting a query
    #[serde(default)]
    pub internet_activate_search_decision: bool,

    #[serde(default = "default_true")]
    pub internet_quick_search: bool,

    #[serde(default)]
    pub activate_internet_pages_judgement: bool,

    /// Trailing characters of the discussion shown to auxiliary prompts
    #[serde(default = "default_discussion_window_chars")]
    pub discussion_window_chars: usize,

    // ── Skills ───────────────────────────────────────────────────────────
    #[serde(default)]
    pub activate_skills_lib: bool,

    #[serde(default = "default_skills_top_k")]
    pub skills_top_k: usize,

    // ── Discussion ───────────────────────────────────────────────────────
    #[serde(default)]
    pub use_model_name_in_discussions: bool,

    #[serde(default)]
    pub positive_boost: String,

    #[serde(default)]
    pub negative_boost: String,

    #[serde(default)]
    pub fun_mode: bool,

    #[serde(default = "default_user_name")]
    pub user_name: String,

    #[serde(default)]
    pub user_description: String,

    #[serde(default)]
    pub use_user_informations_in_discussion: bool,

    /// Session language; the personality's own language when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_language: Option<String>,

    /// Root of the language-pack cache
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_packs_dir: Option<PathBuf>,

    /// Personality definition file (TOML); a generic assistant when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personality_file: Option<PathBuf>,

    // ── Tables ───────────────────────────────────────────────────────────
    #[serde(default)]
    pub templates: PromptTemplates,

    #[serde(default)]
    pub provider: ProviderSettings,

    #[serde(default)]
    pub rag_databases: Vec<RagDatabaseConfig>,
}

fn default_ctx_size() -> usize {
    4096
}
fn default_max_n_predict() -> usize {
    512
}
fn default_rag_n_chunks() -> usize {
    4
}
fn default_rag_max_n_hops() -> usize {
    3
}
fn default_rag_min_correspondance() -> f32 {
    0.0
}
fn default_rag_chunk_size() -> usize {
    512
}
fn default_discussion_window_chars() -> usize {
    2048
}
fn default_skills_top_k() -> usize {
    3
}
fn default_user_name() -> String {
    "user".into()
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("ctx_size", &self.ctx_size)
            .field("max_n_predict", &self.max_n_predict)
            .field("rag_n_chunks", &self.rag_n_chunks)
            .field("rag_n_neighbors", &self.rag_n_neighbors)
            .field("rag_max_n_hops", &self.rag_max_n_hops)
            .field("rag_activate_multi_hops", &self.rag_activate_multi_hops)
            .field("rag_vectorizer", &self.rag_vectorizer)
            .field("activate_internet_search", &self.activate_internet_search)
            .field("activate_skills_lib", &self.activate_skills_lib)
            .field("current_language", &self.current_language)
            .field("provider", &self.provider)
            .field("rag_databases", &self.rag_databases)
            .finish_non_exhaustive()
    }
}

// ── Prompt templates ─────────────────────────────────────────────────────

/// Header and separator markers used to frame every prompt section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplates {
    #[serde(default = "default_start_header")]
    pub start_header_id_template: String,
    #[serde(default = "default_end_header")]
    pub end_header_id_template: String,
    #[serde(default = "default_system_message")]
    pub system_message_template: String,
    #[serde(default = "default_separator")]
    pub separator_template: String,
    #[serde(default = "default_start_header")]
    pub start_user_header_id_template: String,
    #[serde(default = "default_end_header")]
    pub end_user_header_id_template: String,
    #[serde(default = "default_start_header")]
    pub start_ai_header_id_template: String,
    #[serde(default = "default_end_header")]
    pub end_ai_header_id_template: String,
}

fn default_start_header() -> String {
    "!@>".into()
}
fn default_end_header() -> String {
    ": ".into()
}
fn default_system_message() -> String {
    "system".into()
}
fn default_separator() -> String {
    "\n".into()
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            start_header_id_template: default_start_header(),
            end_header_id_template: default_end_header(),
            system_message_template: default_system_message(),
            separator_template: default_separator(),
            start_user_header_id_template: default_start_header(),
            end_user_header_id_template: default_end_header(),
            start_ai_header_id_template: default_start_header(),
            end_ai_header_id_template: default_end_header(),
        }
    }
}

impl PromptTemplates {
    /// `!@>system: `
    pub fn system_full_header(&self) -> String {
        format!(
            "{}{}{}",
            self.start_header_id_template, self.system_message_template, self.end_header_id_template
        )
    }

    /// A system-level header carrying a custom name.
    pub fn system_custom_header(&self, name: &str) -> String {
        format!("{}{}{}", self.start_header_id_template, name, self.end_header_id_template)
    }

    /// A section header framed like a user turn.
    pub fn custom_header(&self, name: &str) -> String {
        format!(
            "{}{}{}",
            self.start_user_header_id_template, name, self.end_user_header_id_template
        )
    }

    pub fn user_full_header(&self, name: &str) -> String {
        self.custom_header(name)
    }

    pub fn ai_full_header(&self, name: &str) -> String {
        format!(
            "{}{}{}",
            self.start_ai_header_id_template, name, self.end_ai_header_id_template
        )
    }
}

// ── Backends ─────────────────────────────────────────────────────────────

/// The model endpoint family, chosen once at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelBackend {
    #[default]
    OpenAi,
    OpenRouter,
    Ollama,
    /// Any OpenAI-compatible endpoint at `api_url`
    Custom,
}

impl ModelBackend {
    pub fn default_api_url(&self) -> Option<&'static str> {
        match self {
            ModelBackend::OpenAi => Some("https://api.openai.com/v1"),
            ModelBackend::OpenRouter => Some("https://openrouter.ai/api/v1"),
            ModelBackend::Ollama => Some("http://localhost:11434/v1"),
            ModelBackend::Custom => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelBackend::OpenAi => "openai",
            ModelBackend::OpenRouter => "openrouter",
            ModelBackend::Ollama => "ollama",
            ModelBackend::Custom => "custom",
        }
    }
}

impl std::str::FromStr for ModelBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(ModelBackend::OpenAi),
            "openrouter" => Ok(ModelBackend::OpenRouter),
            "ollama" => Ok(ModelBackend::Ollama),
            "custom" => Ok(ModelBackend::Custom),
            other => Err(ConfigError::ValidationError(format!(
                "unknown provider '{other}' (expected openai, openrouter, ollama or custom)"
            ))),
        }
    }
}

/// How document chunks are turned into vectors for search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorizerKind {
    /// Local hashed bag-of-words vectors; no network
    #[default]
    BagOfWords,
    /// Vectors from the provider's embeddings endpoint
    Embeddings,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub kind: ModelBackend,

    /// Overrides the backend's default URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// HuggingFace `tokenizer.json` for exact token counts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenizer_path: Option<PathBuf>,
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            kind: ModelBackend::default(),
            api_url: None,
            api_key: None,
            model: default_model(),
            embedding_model: default_embedding_model(),
            tokenizer_path: None,
        }
    }
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("kind", &self.kind)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("embedding_model", &self.embedding_model)
            .field("tokenizer_path", &self.tokenizer_path)
            .finish()
    }
}

impl ProviderSettings {
    /// Configured URL, or the backend default.
    pub fn resolved_api_url(&self) -> Option<String> {
        self.api_url
            .clone()
            .or_else(|| self.kind.default_api_url().map(String::from))
    }
}

/// A document database that can be mounted into a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagDatabaseConfig {
    pub name: String,

    /// Directory of text documents to index
    pub path: PathBuf,

    #[serde(default = "default_true")]
    pub mounted: bool,
}

// ── Loading ──────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from the default path (`~/.contextweave/config.toml`).
    ///
    /// Falls back to defaults if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply `CONTEXTWEAVE_*` environment variables on top of the file values.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if self.provider.api_key.is_none() {
            self.provider.api_key = std::env::var("CONTEXTWEAVE_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("CONTEXTWEAVE_PROVIDER") {
            self.provider.kind = provider.parse()?;
        }

        if let Ok(model) = std::env::var("CONTEXTWEAVE_MODEL") {
            self.provider.model = model;
        }

        if let Ok(ctx) = std::env::var("CONTEXTWEAVE_CTX_SIZE") {
            self.ctx_size = ctx.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!("CONTEXTWEAVE_CTX_SIZE is not a number: {ctx}"))
            })?;
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".contextweave")
    }

    /// Where language packs are cached.
    pub fn language_packs_root(&self) -> PathBuf {
        self.language_packs_dir
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("personalities"))
    }

    /// Final chunk cap after ranking.
    pub fn n_neighbors(&self) -> usize {
        self.rag_n_neighbors.unwrap_or(self.rag_n_chunks)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ctx_size <= MIN_CTX_SIZE {
            return Err(ConfigError::ValidationError(format!(
                "ctx_size must be greater than {MIN_CTX_SIZE}"
            )));
        }

        if self.max_n_predict >= self.ctx_size {
            return Err(ConfigError::ValidationError(
                "max_n_predict must be smaller than ctx_size".into(),
            ));
        }

        if self.rag_n_chunks == 0 || self.rag_max_n_hops == 0 {
            return Err(ConfigError::ValidationError(
                "rag_n_chunks and rag_max_n_hops must be at least 1".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.rag_min_correspondance) {
            return Err(ConfigError::ValidationError(
                "rag_min_correspondance must be between 0.0 and 1.0".into(),
            ));
        }

        if self.provider.kind == ModelBackend::Custom && self.provider.api_url.is_none() {
            return Err(ConfigError::ValidationError(
                "provider.api_url is required for the custom backend".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
    }

    /// The configured personality, or the generic assistant.
    pub fn personality(&self) -> Result<Personality, ConfigError> {
        match &self.personality_file {
            Some(path) => load_personality(path),
            None => Ok(Personality::default_personality()),
        }
    }

    /// Generate a default config TOML string (for `config init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ctx_size: default_ctx_size(),
            max_n_predict: default_max_n_predict(),
            rag_n_chunks: default_rag_n_chunks(),
            rag_n_neighbors: None,
            rag_max_n_hops: default_rag_max_n_hops(),
            rag_activate_multi_hops: false,
            rag_build_keys_words: false,
            rag_min_correspondance: default_rag_min_correspondance(),
            rag_deactivate: false,
            rag_put_chunk_informations_into_context: true,
            contextual_summary: false,
            rag_chunk_size: default_rag_chunk_size(),
            rag_vectorizer: VectorizerKind::default(),
            activate_internet_search: false,
            internet_activate_search_decision: false,
            internet_quick_search: true,
            activate_internet_pages_judgement: false,
            discussion_window_chars: default_discussion_window_chars(),
            activate_skills_lib: false,
            skills_top_k: default_skills_top_k(),
            use_model_name_in_discussions: false,
            positive_boost: String::new(),
            negative_boost: String::new(),
            fun_mode: false,
            user_name: default_user_name(),
            user_description: String::new(),
            use_user_informations_in_discussion: false,
            current_language: None,
            language_packs_dir: None,
            personality_file: None,
            templates: PromptTemplates::default(),
            provider: ProviderSettings::default(),
            rag_databases: vec![],
        }
    }
}

/// Read a personality definition from a TOML file.
pub fn load_personality(path: &Path) -> Result<Personality, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ctx_size, 4096);
        assert_eq!(config.provider.kind, ModelBackend::OpenAi);
        assert_eq!(config.n_neighbors(), config.rag_n_chunks);
    }

    #[test]
    fn config_roundtrip_toml() {
        let mut config = AppConfig::default();
        config.rag_databases.push(RagDatabaseConfig {
            name: "notes".into(),
            path: PathBuf::from("/data/notes"),
            mounted: false,
        });
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.ctx_size, config.ctx_size);
        assert_eq!(parsed.rag_databases, config.rag_databases);
        assert_eq!(parsed.templates, config.templates);
    }

    #[test]
    fn flat_keys_parse() {
        let toml_str = r#"
ctx_size = 8192
rag_n_chunks = 5
rag_n_neighbors = 3
rag_max_n_hops = 2
fun_mode = true
positive_boost = "Be thorough."

[templates]
separator_template = "\n\n"

[provider]
kind = "ollama"
model = "mistral"

[[rag_databases]]
name = "manuals"
path = "/srv/manuals"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.ctx_size, 8192);
        assert_eq!(config.n_neighbors(), 3);
        assert!(config.fun_mode);
        assert_eq!(config.templates.separator_template, "\n\n");
        assert_eq!(config.templates.start_header_id_template, "!@>");
        assert_eq!(config.provider.kind, ModelBackend::Ollama);
        assert_eq!(
            config.provider.resolved_api_url().as_deref(),
            Some("http://localhost:11434/v1")
        );
        assert!(config.rag_databases[0].mounted);
    }

    #[test]
    fn small_context_rejected() {
        let config = AppConfig {
            ctx_size: 256,
            max_n_predict: 64,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn generation_reservation_must_fit() {
        let config = AppConfig {
            max_n_predict: 4096,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn custom_backend_requires_url() {
        let mut config = AppConfig::default();
        config.provider.kind = ModelBackend::Custom;
        assert!(config.validate().is_err());
        config.provider.api_url = Some("http://localhost:8080/v1".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().max_n_predict, 512);
    }

    #[test]
    fn backend_parses_case_insensitively() {
        assert_eq!("OpenRouter".parse::<ModelBackend>().unwrap(), ModelBackend::OpenRouter);
        assert!("anthropic".parse::<ModelBackend>().is_err());
    }

    #[test]
    fn debug_redacts_api_key() {
        let mut config = AppConfig::default();
        config.provider.api_key = Some("sk-secret".into());
        let out = format!("{config:?}");
        assert!(!out.contains("sk-secret"));
        assert!(out.contains("[REDACTED]"));
    }

    #[test]
    fn headers_render_from_templates() {
        let t = PromptTemplates::default();
        assert_eq!(t.system_full_header(), "!@>system: ");
        assert_eq!(t.custom_header("Documentation"), "!@>Documentation: ");
        assert_eq!(t.ai_full_header("lolly"), "!@>lolly: ");
    }

    #[test]
    fn personality_file_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("personality.toml");
        std::fs::write(
            &path,
            "id = \"lolly\"\nname = \"Lolly\"\nconditioning = \"Be nice\"\nlanguage = \"english\"\n",
        )
        .unwrap();
        let config = AppConfig {
            personality_file: Some(path),
            ..AppConfig::default()
        };
        let p = config.personality().unwrap();
        assert_eq!(p.id, "lolly");
        assert_eq!(p.conditioning, "Be nice");
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("ctx_size = 4096"));
        assert!(toml_str.contains("[templates]"));
    }
}
