use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default system prompt, aimed at answering multiple-choice quiz questions
const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a quiz expert and a helpful assistant. \
I will send you a question and multiple choice option(s). Your task:
1. Provide only the correct answer choice, the option number(s) (e.g., \"A\", \"1\") and the full text of the option.
2. If multiple options are correct (mentioned in question), list all correct choices separated by commas.
3. Do NOT include any explanation or reasoning, just the answer itself.
4. Always respond in English.";

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the Ollama host
    pub ollama_url: String,

    /// Base URL of the speech-to-text sidecar
    pub speech_url: String,

    /// Base URL of the OCR sidecar
    pub ocr_url: String,

    /// Model used when the UI does not pick one
    pub default_model: String,

    /// Models offered in the UI selector; free-form entries are still allowed
    pub model_suggestions: Vec<String>,

    /// System prompt seeded into every fresh transcript
    pub system_prompt: String,

    /// Languages passed to the OCR engine
    pub ocr_languages: Vec<String>,

    /// Web server binding
    pub server: ServerConfig,
}

/// Web server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 7860 }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            ollama_url: "http://localhost:11434".to_string(),
            speech_url: "http://localhost:8178".to_string(),
            ocr_url: "http://localhost:8899".to_string(),
            default_model: "deepseek-r1:1.5b".to_string(),
            model_suggestions: vec![
                "deepseek-r1:1.5b".to_string(),
                "deepseek-r1:8b".to_string(),
                "deepseek-r1:14b".to_string(),
            ],
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            ocr_languages: vec!["en".to_string()],
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from ~/.parley/config.toml. On first run the
    /// defaults are written out so there is a file to edit.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            Self::load_from(&path)
        } else {
            let config = Config::default();
            config.save_to(&path)?;
            Ok(config)
        }
    }

    fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path)
            .context("Failed to read config file")?;
        toml::from_str(&content)
            .context("Failed to parse config file")
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;
        fs::write(path, content)
            .context("Failed to write config file")?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not find home directory")?;
        Ok(home.join(".parley").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete() {
        let config = Config::default();

        assert!(!config.model_suggestions.is_empty());
        assert!(config.model_suggestions.contains(&config.default_model));
        assert!(config.system_prompt.contains("quiz expert"));
        assert!(!config.ocr_languages.is_empty());
        assert_ne!(config.server.port, 0);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn save_and_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.default_model = "llama3.2:3b".to_string();
        config.server.port = 9000;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "default_model = \"qwen3:4b\"\n").unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.default_model, "qwen3:4b");
        assert_eq!(loaded.ollama_url, Config::default().ollama_url);
        assert_eq!(loaded.server, ServerConfig::default());
    }
}
