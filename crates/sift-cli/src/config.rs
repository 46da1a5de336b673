//! Layered configuration: defaults, config file, environment, CLI flags.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use sift_core::DEFAULT_MAX_STEPS;
use sift_providers::DEFAULT_BASE_URL;
use sift_tools::web::{DEFAULT_MAX_CHARS, DEFAULT_SEARCH_ENDPOINT};

/// Environment variables read without a prefix.
const RAW_ENV_KEYS: &[&str] = &["OPENAI_API_KEY", "SERPER_API_KEY", "MODEL_NAME", "TEMPERATURE"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub openai_api_key: Option<String>,

    #[serde(default)]
    pub serper_api_key: Option<String>,

    /// Chat model used for reasoning
    pub model_name: String,

    pub temperature: f32,

    /// Reasoning turns allowed per research call
    pub max_steps: usize,

    /// OpenAI-compatible API base URL
    pub base_url: String,

    pub search_endpoint: String,

    /// Character cap on text returned by the page reader
    pub max_page_chars: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            serper_api_key: None,
            model_name: "gpt-4".to_string(),
            temperature: 0.1,
            max_steps: DEFAULT_MAX_STEPS,
            base_url: DEFAULT_BASE_URL.to_string(),
            search_endpoint: DEFAULT_SEARCH_ENDPOINT.to_string(),
            max_page_chars: DEFAULT_MAX_CHARS,
        }
    }
}

/// Values given on the command line. Unset flags leave lower layers alone.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// API keys checked before any research starts.
#[derive(Debug, Clone)]
pub struct ApiKeys {
    pub openai: String,
    pub serper: String,
}

impl Config {
    /// Load configuration from the user config file, environment and flags.
    pub fn load(overrides: &Overrides) -> Result<Self> {
        let file = Self::config_path().ok().filter(|p| p.exists());
        Self::figment(file.as_deref(), overrides)
            .extract()
            .context("Invalid configuration")
    }

    pub fn figment(file: Option<&Path>, overrides: &Overrides) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        if let Some(path) = file {
            figment = figment.merge(Toml::file(path));
        }

        figment
            .merge(Env::raw().only(RAW_ENV_KEYS))
            .merge(Env::prefixed("SIFT_"))
            .merge(Serialized::defaults(overrides))
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("sift").join("config.toml"))
    }

    /// Both API keys, or an error naming the first one missing.
    pub fn api_keys(&self) -> Result<ApiKeys> {
        Ok(ApiKeys {
            openai: require(&self.openai_api_key, "OPENAI_API_KEY")?,
            serper: require(&self.serper_api_key, "SERPER_API_KEY")?,
        })
    }

    /// Human-readable summary with secrets masked.
    pub fn display(&self) -> String {
        let config_file = Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| "(unknown)".to_string());

        [
            "Configuration:".to_string(),
            format!("  Config file: {}", config_file),
            format!("  OPENAI_API_KEY: {}", mask(&self.openai_api_key)),
            format!("  SERPER_API_KEY: {}", mask(&self.serper_api_key)),
            format!("  Model: {}", self.model_name),
            format!("  Temperature: {}", self.temperature),
            format!("  Max steps: {}", self.max_steps),
            format!("  Base URL: {}", self.base_url),
            format!("  Search endpoint: {}", self.search_endpoint),
            format!("  Max page chars: {}", self.max_page_chars),
        ]
        .join("\n")
    }
}

fn require(value: &Option<String>, name: &str) -> Result<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Missing required environment variable: {}", name))
}

fn mask(value: &Option<String>) -> String {
    match value.as_deref().map(str::trim) {
        None | Some("") => "(not set)".to_string(),
        Some(v) if v.chars().count() <= 8 => "****".to_string(),
        Some(v) => {
            let prefix: String = v.chars().take(4).collect();
            format!("{}****", prefix)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn extract(file: Option<&Path>, overrides: &Overrides) -> figment::error::Result<Config> {
        Config::figment(file, overrides).extract()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.model_name, "gpt-4");
        assert_eq!(config.temperature, 0.1);
        assert_eq!(config.max_steps, 15);
        assert_eq!(config.base_url, "https://api.openai.com/v1");
        assert_eq!(config.search_endpoint, "https://google.serper.dev/search");
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                    model_name = "gpt-4o"
                    temperature = 0.5
                    max_steps = 8
                "#,
            )?;
            jail.set_env("OPENAI_API_KEY", "sk-test-openai");
            jail.set_env("SERPER_API_KEY", "serper-test");
            jail.set_env("TEMPERATURE", "0.3");

            let config = extract(Some(Path::new("config.toml")), &Overrides::default())?;
            assert_eq!(config.model_name, "gpt-4o");
            assert_eq!(config.temperature, 0.3);
            assert_eq!(config.max_steps, 8);
            assert_eq!(config.openai_api_key.as_deref(), Some("sk-test-openai"));

            let keys = config.api_keys().map_err(|e| e.to_string())?;
            assert_eq!(keys.serper, "serper-test");
            Ok(())
        });
    }

    #[test]
    fn test_prefixed_env_and_flags() {
        Jail::expect_with(|jail| {
            jail.set_env("MODEL_NAME", "gpt-4-turbo");
            jail.set_env("SIFT_MAX_STEPS", "4");
            jail.set_env("SIFT_MAX_PAGE_CHARS", "2000");

            let config = extract(None, &Overrides::default())?;
            assert_eq!(config.model_name, "gpt-4-turbo");
            assert_eq!(config.max_steps, 4);
            assert_eq!(config.max_page_chars, 2000);

            let overrides = Overrides {
                model_name: Some("local-model".to_string()),
                max_steps: Some(2),
                ..Default::default()
            };
            let config = extract(None, &overrides)?;
            assert_eq!(config.model_name, "local-model");
            assert_eq!(config.max_steps, 2);
            assert_eq!(config.max_page_chars, 2000);
            Ok(())
        });
    }

    #[test]
    fn test_missing_keys() {
        Jail::expect_with(|jail| {
            jail.set_env("OPENAI_API_KEY", "");
            jail.set_env("SERPER_API_KEY", "serper-test");

            let config = extract(None, &Overrides::default())?;
            let err = config.api_keys().unwrap_err();
            assert_eq!(
                err.to_string(),
                "Missing required environment variable: OPENAI_API_KEY"
            );
            Ok(())
        });

        let config = Config {
            openai_api_key: Some("sk".to_string()),
            ..Config::default()
        };
        assert_eq!(
            config.api_keys().unwrap_err().to_string(),
            "Missing required environment variable: SERPER_API_KEY"
        );
    }

    #[test]
    fn test_display_masks_keys() {
        let config = Config {
            openai_api_key: Some("sk-abcdefghijklmnop".to_string()),
            serper_api_key: None,
            ..Config::default()
        };
        let display = config.display();
        assert!(display.contains("OPENAI_API_KEY: sk-a****"));
        assert!(!display.contains("abcdefghijklmnop"));
        assert!(display.contains("SERPER_API_KEY: (not set)"));
        assert!(display.contains("Model: gpt-4"));
    }
}
