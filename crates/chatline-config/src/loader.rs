use std::path::{Path, PathBuf};

use chatline_common::{Error, Result};
use tracing::{debug, info};

use crate::model::AppConfig;

const CONFIG_FILE: &str = "config.yml";

/// Locates, parses and validates `config.yml`.
pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    /// Loader rooted at `~/.chatline`.
    pub fn new() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("could not resolve home directory".to_string()))?;
        Ok(Self::with_dir(home.join(".chatline")))
    }

    pub fn with_dir(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    /// Load the default config file, falling back to defaults when absent.
    pub fn load(&self) -> Result<AppConfig> {
        let path = self.config_path();
        let mut config = if path.exists() {
            Self::parse_file(&path)?
        } else {
            info!("no config file at {}, using defaults", path.display());
            AppConfig::default()
        };
        apply_env_overrides(&mut config, |key| std::env::var(key).ok());
        self.fill_paths(&mut config);
        validate(&config)?;
        Ok(config)
    }

    /// Load an explicit config file. Missing files are an error here.
    pub fn load_from(&self, path: &Path) -> Result<AppConfig> {
        let mut config = Self::parse_file(path)?;
        apply_env_overrides(&mut config, |key| std::env::var(key).ok());
        self.fill_paths(&mut config);
        validate(&config)?;
        Ok(config)
    }

    fn parse_file(path: &Path) -> Result<AppConfig> {
        info!("loading config from {}", path.display());
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        serde_yaml::from_str(&raw)
            .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))
    }

    fn fill_paths(&self, config: &mut AppConfig) {
        if config.database.path.is_none() {
            config.database.path = Some(self.config_dir.join("chatline.db"));
        }
        if config.cache.dir.is_none() {
            config.cache.dir = Some(self.config_dir.join("cache"));
        }
    }
}

/// Apply `CHATLINE_*` overrides on top of the file values.
pub fn apply_env_overrides(config: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(provider) = lookup("CHATLINE_LLM_PROVIDER") {
        debug!("llm provider overridden from environment");
        config.llm.provider = provider;
    }
    if let Some(model) = lookup("CHATLINE_LLM_MODEL") {
        config.llm.model = model;
    }
    if let Some(base_url) = lookup("CHATLINE_LLM_BASE_URL") {
        config.llm.base_url = Some(base_url);
    }
    if let Some(path) = lookup("CHATLINE_DATABASE_PATH") {
        config.database.path = Some(PathBuf::from(path));
    }
    if let Some(max) = lookup("CHATLINE_RATE_LIMIT_MAX_REQUESTS").and_then(|v| v.parse().ok()) {
        config.rate_limit.max_requests = max;
    }
}

pub fn validate(config: &AppConfig) -> Result<()> {
    if !matches!(config.llm.provider.as_str(), "anthropic" | "openai") {
        return Err(Error::Config(format!(
            "unsupported llm provider '{}'",
            config.llm.provider
        )));
    }
    if config.rate_limit.max_requests == 0 || config.rate_limit.window_secs == 0 {
        return Err(Error::Config(
            "rate_limit.max_requests and rate_limit.window_secs must be positive".to_string(),
        ));
    }
    if config.history.max_turns == 0 || config.history.max_bytes < 2 {
        return Err(Error::Config(
            "history.max_turns must be positive and history.max_bytes at least 2".to_string(),
        ));
    }
    if config.generation.max_attempts == 0 {
        return Err(Error::Config(
            "generation.max_attempts must be at least 1".to_string(),
        ));
    }
    if config.generation.max_input_chars == 0 || config.generation.max_output_chars == 0 {
        return Err(Error::Config(
            "generation input/output limits must be positive".to_string(),
        ));
    }
    if config.pagination.page_size == 0 {
        return Err(Error::Config("pagination.page_size must be at least 1".to_string()));
    }
    for kind in config.profiles.keys() {
        if !matches!(kind.as_str(), "default" | "scripted") {
            return Err(Error::Config(format!("unknown profile kind '{kind}'")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn missing_file_yields_defaults_with_resolved_paths() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::with_dir(dir.path());
        let config = loader.load().expect("defaults should load");

        assert_eq!(config.rate_limit.max_requests, 10);
        assert_eq!(config.generation.max_attempts, 3);
        assert_eq!(
            config.database.path.as_deref(),
            Some(dir.path().join("chatline.db").as_path())
        );
        assert_eq!(
            config.cache.dir.as_deref(),
            Some(dir.path().join("cache").as_path())
        );
    }

    #[test]
    fn partial_file_keeps_defaults_for_unset_fields() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.yml"),
            "history:\n  max_turns: 5\nprofiles:\n  scripted:\n    instructions: Be a phisher.\n    script:\n      - question: who are you?\n        answer: IT support\n",
        )
        .unwrap();

        let config = ConfigLoader::with_dir(dir.path()).load().unwrap();
        assert_eq!(config.history.max_turns, 5);
        assert_eq!(config.history.max_bytes, 8_000);
        let scripted = config.profiles.get("scripted").unwrap();
        assert_eq!(scripted.script.len(), 1);
        assert_eq!(scripted.script[0].answer, "IT support");
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.yml"), "pagination:\n  page_size: 0\n").unwrap();
        let err = ConfigLoader::with_dir(dir.path()).load().unwrap_err();
        assert!(err.to_string().contains("page_size"));

        let mut config = AppConfig::default();
        config.llm.provider = "mystery".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("CHATLINE_LLM_PROVIDER", "openai"),
            ("CHATLINE_RATE_LIMIT_MAX_REQUESTS", "3"),
        ]);
        let mut config = AppConfig::default();
        apply_env_overrides(&mut config, |key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.llm.resolved_api_key_env(), "OPENAI_API_KEY");
        assert_eq!(config.rate_limit.max_requests, 3);
    }
}
