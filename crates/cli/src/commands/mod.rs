//! CLI subcommands and the session wiring they share.

pub mod assemble;
pub mod config_cmd;
pub mod languages;

use std::path::Path;
use std::sync::Arc;

use contextweave_config::AppConfig;
use contextweave_core::ConversationStore;
use contextweave_engine::{ContextPipeline, StoreMounts};
use contextweave_memory::{FileLanguagePackStore, InMemoryVectorStore, SkillsLibrary};
use contextweave_providers::{build_from_config, Backends};
use tracing::{info, warn};

pub type CmdResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Load the configuration, from `path` when given.
pub fn load_config(path: Option<&Path>) -> CmdResult<AppConfig> {
    let config = match path {
        Some(path) => {
            let mut config = AppConfig::load_from(path)?;
            config.apply_env_overrides()?;
            config.validate()?;
            config
        }
        None => AppConfig::load()?,
    };
    Ok(config)
}

/// Build a pipeline over `conversations` with every configured backend,
/// database and the skills library attached.
pub async fn build_pipeline(
    config: AppConfig,
    conversations: Arc<dyn ConversationStore>,
) -> CmdResult<(ContextPipeline, Backends)> {
    let backends = build_from_config(&config)?;
    let personality = config.personality()?;
    let languages = Arc::new(FileLanguagePackStore::new(config.language_packs_root()));

    let mounts = StoreMounts::new();
    for db in &config.rag_databases {
        let store = Arc::new(InMemoryVectorStore::new(
            db.name.clone(),
            backends.vectorizer(config.rag_vectorizer),
            Arc::clone(&backends.tokenizer),
            config.rag_chunk_size,
        ));
        match store.load_directory(&db.path).await {
            Ok(count) => info!(database = %db.name, documents = count, "Database indexed"),
            Err(e) => {
                warn!(database = %db.name, error = %e, "Skipping unreadable database");
                continue;
            }
        }
        if db.mounted {
            mounts.mount(db.name.clone(), store).await;
        } else {
            mounts.register(db.name.clone(), store).await;
        }
    }

    let skills = if config.activate_skills_lib {
        let path = AppConfig::config_dir().join("skills.jsonl");
        Some(SkillsLibrary::open(path, backends.vectorizer(config.rag_vectorizer)).await?)
    } else {
        None
    };

    let mut pipeline = ContextPipeline::new(
        config,
        personality,
        Arc::clone(&backends.model),
        Arc::clone(&backends.tokenizer),
        conversations,
        languages,
    )
    .with_mounts(mounts);
    if let Some(search) = &backends.internet {
        pipeline = pipeline.with_internet(Arc::clone(search));
    }
    if let Some(skills) = skills {
        pipeline = pipeline.with_skills(Arc::new(skills));
    }
    Ok((pipeline, backends))
}
