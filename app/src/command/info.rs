use chatrs_config::{API_KEY_ENV, Config, StorageBackend};
use chatrs_core::Role;

/// Strategy for displaying configuration information.
///
/// Prints the provider settings (API key masked), agent defaults, trimming
/// rules and storage backend.
#[derive(Debug, Clone, Copy)]
pub struct InfoStrategy;

impl super::CommandStrategy for InfoStrategy {
    type Input = ();

    async fn execute(&self, _input: Self::Input) -> anyhow::Result<()> {
        let config = Config::load()?;

        println!("=== chatrs Configuration ===\n");

        println!("Provider:");
        let api_key = config.api_key().map_or_else(|_| "(not set)".to_string(), mask_key);
        println!("  OpenAI API Key: {api_key}");
        if std::env::var(API_KEY_ENV).is_ok() {
            println!("  (overridden by {API_KEY_ENV})");
        }
        println!("  Base URL: {}", config.providers.openai.base_url);
        println!();

        let defaults = &config.agents.defaults;
        println!("Agent Defaults:");
        println!(
            "  Model: {}",
            defaults.model.as_deref().unwrap_or("(provider default)")
        );
        println!("  Language: {}", defaults.language);
        if let Some(temperature) = defaults.temperature {
            println!("  Temperature: {temperature}");
        }
        if let Some(max_tokens) = defaults.max_tokens {
            println!("  Max Tokens: {max_tokens}");
        }
        if let Some(ref prompt) = defaults.system_prompt {
            println!("  System Prompt: {}", truncate(prompt, 60));
        }
        if let Some(ref template) = defaults.directive_template {
            println!("  Directive Template: {}", truncate(template, 60));
        }
        println!();

        let trimming = &config.trimming;
        println!("History Trimming:");
        println!("  Max Tokens: {}", trimming.max_tokens);
        println!("  Strategy: {:?}", trimming.strategy);
        println!("  Include System: {}", trimming.include_system);
        println!("  Allow Partial: {}", trimming.allow_partial);
        println!(
            "  Start On: {}",
            trimming.start_on.map_or("(any)", Role::as_str)
        );
        println!();

        println!("Storage:");
        match config.storage.backend {
            StorageBackend::Memory => println!("  Backend: memory"),
            StorageBackend::Sqlite => {
                println!("  Backend: sqlite");
                println!("  Path: {}", config.storage.database_path()?.display());
            }
        }

        Ok(())
    }
}

fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "***".to_string()
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
