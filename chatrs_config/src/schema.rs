use anyhow::Context;
use chatrs_core::TrimConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable that overrides `providers.openai.api_key`.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

const CONFIG_DIR: &str = "chatrs";
const CONFIG_FILE: &str = "config.json";
const SESSIONS_DB: &str = "sessions.db";

const CONFIG_TEMPLATE: &str = r#"{
  "agents": {
    "defaults": {
      "model": "gpt-4o-mini",
      "language": "English",
      "temperature": 0.7,
      "system_prompt": null
    }
  },
  "trimming": {
    "max_tokens": 1024,
    "strategy": "last",
    "include_system": true,
    "allow_partial": false,
    "start_on": "human"
  },
  "providers": {
    "openai": {
      "api_key": "your-openai-api-key-here",
      "base_url": "https://api.openai.com/v1"
    }
  },
  "storage": {
    "backend": "sqlite"
  }
}"#;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub agents: AgentsConfig,
    #[serde(default)]
    pub trimming: TrimConfig,
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AgentsConfig {
    pub defaults: AgentDefaults,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AgentDefaults {
    /// Model name; the provider's default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Response language for turns that do not name one
    #[serde(default = "AgentDefaults::default_language")]
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Completion length limit sent to the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Directive template; must contain `{language}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directive_template: Option<String>,
}

impl AgentDefaults {
    fn default_language() -> String {
        "English".to_string()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub openai: ProviderConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "ProviderConfig::default_base_url")]
    pub base_url: String,
}

impl ProviderConfig {
    fn default_base_url() -> String {
        "https://api.openai.com/v1".to_string()
    }
}

/// Where session logs live.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local; sessions vanish on exit
    #[default]
    Memory,
    /// SQLite database file
    Sqlite,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Database file; defaults to `sessions.db` in the config directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn database_path(&self) -> anyhow::Result<PathBuf> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => Ok(Config::config_dir()?.join(SESSIONS_DB)),
        }
    }
}

impl Config {
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        Ok(dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Cannot find home directory"))?
            .join(CONFIG_DIR))
    }

    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE))
    }

    /// Load `~/chatrs/config.json`, then apply the `OPENAI_API_KEY` override.
    pub fn load() -> anyhow::Result<Self> {
        let config = Self::load_from(&Self::config_path()?)?;
        Ok(config.with_api_key_override(std::env::var(API_KEY_ENV).ok()))
    }

    pub fn load_from(config_path: &Path) -> anyhow::Result<Self> {
        if !config_path.exists() {
            anyhow::bail!(
                "Config file not found at: {}. Please run 'chatrs init' to create config.",
                config_path.display()
            );
        }

        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file {}", config_path.display()))?;

        debug!("Loaded config from {}", config_path.display());
        Ok(config)
    }

    /// Replace the file's API key with `key` when it is set and non-empty.
    #[must_use]
    pub fn with_api_key_override(mut self, key: Option<String>) -> Self {
        if let Some(key) = key.filter(|k| !k.trim().is_empty()) {
            debug!("Using API key from {}", API_KEY_ENV);
            self.providers.openai.api_key = key;
        }
        self
    }

    /// The provider API key, or an error if none is configured.
    pub fn api_key(&self) -> anyhow::Result<&str> {
        let key = self.providers.openai.api_key.trim();
        if key.is_empty() || key == "your-openai-api-key-here" {
            anyhow::bail!(
                "No API key configured. Set {API_KEY_ENV} or edit providers.openai.api_key in {}",
                Self::config_path()
                    .map_or_else(|_| CONFIG_FILE.to_string(), |p| p.display().to_string())
            );
        }
        Ok(key)
    }

    pub fn ensure_config_dir() -> anyhow::Result<PathBuf> {
        let config_dir = Self::config_dir()?;
        std::fs::create_dir_all(&config_dir)?;
        Ok(config_dir)
    }

    pub fn create_config() -> anyhow::Result<()> {
        let config_dir = Self::ensure_config_dir()?;
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            anyhow::bail!(
                "Config file already exists at: {}. Please edit it directly.",
                config_path.display()
            );
        }

        std::fs::write(&config_path, CONFIG_TEMPLATE)?;

        println!("✅ Created config file at: {}", config_path.display());
        println!();
        println!("📝 Next steps:");
        println!("   1. Edit the config file and add your OpenAI API key (or set {API_KEY_ENV})");
        println!("   2. Run 'chatrs chat' to start a conversation");
        println!();
        println!("🔧 Configuration options:");
        println!("   - agents.defaults.language: Default response language");
        println!("   - trimming.max_tokens: Token budget for the history sent to the model");
        println!("   - storage.backend: 'memory' or 'sqlite'");
        println!();
        Ok(())
    }
}
