//! `contextweave config`: Configuration management commands.

use clap::Subcommand;
use contextweave_config::AppConfig;

use super::CmdResult;

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the configuration file path
    Path,
    /// Check the configuration for problems
    Validate,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn run(action: ConfigAction) -> CmdResult {
    match action {
        ConfigAction::Show => show(),
        ConfigAction::Path => path(),
        ConfigAction::Validate => validate(),
        ConfigAction::Init { force } => init(force),
    }
}

fn validate() -> CmdResult {
    println!("🔍 Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let warnings = warnings(&config);
            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!("   Provider:   {}", config.provider.kind.as_str());
            println!("   Model:      {}", config.provider.model);
            println!("   Context:    {} tokens ({} reserved)", config.ctx_size, config.max_n_predict);
            println!(
                "   Databases:  {} ({} mounted)",
                config.rag_databases.len(),
                config.rag_databases.iter().filter(|d| d.mounted).count()
            );
            println!(
                "   Language:   {}",
                config.current_language.as_deref().unwrap_or("personality default")
            );
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

/// Non-fatal problems worth reporting.
fn warnings(config: &AppConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    if !config.has_api_key() {
        warnings.push("No API key set (set CONTEXTWEAVE_API_KEY or OPENAI_API_KEY)".to_string());
    }
    if config.max_n_predict > config.ctx_size / 2 {
        warnings.push(format!(
            "max_n_predict ({}) reserves more than half of the context window",
            config.max_n_predict
        ));
    }
    for db in config.rag_databases.iter().filter(|d| !d.path.is_dir()) {
        warnings.push(format!("Database '{}' path {} is not a directory", db.name, db.path.display()));
    }
    if let Some(path) = config.personality_file.as_ref().filter(|p| !p.exists()) {
        warnings.push(format!("Personality file {} does not exist", path.display()));
    }
    warnings
}

fn show() -> CmdResult {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

fn path() -> CmdResult {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}

fn init(force: bool) -> CmdResult {
    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() && !force {
        return Err(format!("{} already exists (use --force to overwrite)", config_path.display()).into());
    }
    std::fs::create_dir_all(AppConfig::config_dir())?;
    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("✅ Wrote {}", config_path.display());
    Ok(())
}
