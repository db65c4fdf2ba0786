//! `contextweave languages`: Language pack management.

use std::path::Path;
use std::sync::Arc;

use clap::Subcommand;
use contextweave_config::AppConfig;
use contextweave_core::{normalize_language, TracingProgress};
use contextweave_memory::InMemoryConversationStore;

use super::{build_pipeline, load_config, CmdResult};

#[derive(Debug, Subcommand)]
pub enum LanguagesAction {
    /// List the personality's languages, default first
    List,

    /// Make a language current, translating the personality if needed
    Set {
        language: String,

        /// Only warm the cache; leave the config file untouched
        #[arg(long)]
        no_save: bool,
    },

    /// Delete a cached language pack
    Delete { language: String },
}

pub async fn run(action: LanguagesAction) -> CmdResult {
    let config_path = AppConfig::config_dir().join("config.toml");
    let config = load_config(None)?;
    let (pipeline, _) = build_pipeline(config.clone(), Arc::new(InMemoryConversationStore::new())).await?;
    let personality = pipeline.personality();
    let cache = pipeline.languages();

    match action {
        LanguagesAction::List => {
            let current = config.current_language.as_deref().and_then(normalize_language);
            for language in cache.list_languages(personality).await? {
                let marker = if Some(&language) == current.as_ref() { "*" } else { " " };
                println!("{marker} {language}");
            }
        }
        LanguagesAction::Set { language, no_save } => {
            let selected = cache
                .select_language(&language)
                .await
                .ok_or_else(|| format!("not a valid language name: {language:?}"))?;
            let resolved = cache
                .resolve(personality, Some(&selected), &pipeline.tasks(), &TracingProgress)
                .await;
            println!("Language: {} ({:?})", resolved.language, resolved.source);
            if !resolved.welcome_message.is_empty() {
                println!("{}", resolved.welcome_message);
            }
            if !no_save {
                save_language(config, &config_path, Some(&selected))?;
                println!("Saved to {}", config_path.display());
            }
        }
        LanguagesAction::Delete { language } => {
            if cache.delete_language(personality, &language).await? {
                println!("Deleted language pack {language}");
            } else {
                println!("No language pack for {language}");
            }
            let was_current = config.current_language.as_deref().and_then(normalize_language)
                == normalize_language(&language);
            if was_current {
                save_language(config, &config_path, None)?;
                println!("Current language reset to the personality default");
            }
        }
    }
    Ok(())
}

fn save_language(mut config: AppConfig, path: &Path, language: Option<&str>) -> CmdResult {
    config.current_language = language.map(str::to_string);
    // Never write an environment-provided key back to disk
    config.provider.api_key = AppConfig::load_from(path)?.provider.api_key;
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, toml::to_string_pretty(&config)?)?;
    Ok(())
}
