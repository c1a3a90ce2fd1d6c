use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Top-level configuration, read from `config.yml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmProviderConfig,
    pub rate_limit: RateLimitConfig,
    pub history: HistoryConfig,
    pub generation: GenerationConfig,
    pub pagination: PaginationConfig,
    pub cache: CacheConfig,
    pub storage: StorageConfig,
    /// Instruction profiles keyed by counterpart kind (`default`, `scripted`).
    pub profiles: BTreeMap<String, ProfileConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file holding turns, contacts and profiles. Defaults to
    /// `<config dir>/chatline.db`.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmProviderConfig {
    /// `anthropic` or `openai`.
    pub provider: String,
    pub model: String,
    pub api_key: Option<String>,
    /// Environment variable consulted when `api_key` is unset.
    pub api_key_env: Option<String>,
    pub base_url: Option<String>,
    pub max_tokens: u32,
    pub temperature: Option<f64>,
    pub request_timeout_secs: u64,
}

impl Default for LlmProviderConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-3-5-haiku-latest".to_string(),
            api_key: None,
            api_key_env: None,
            base_url: None,
            max_tokens: 512,
            temperature: Some(0.7),
            request_timeout_secs: 30,
        }
    }
}

impl LlmProviderConfig {
    pub fn resolved_api_key_env(&self) -> String {
        self.api_key_env.clone().unwrap_or_else(|| match self.provider.as_str() {
            "openai" => "OPENAI_API_KEY".to_string(),
            _ => "ANTHROPIC_API_KEY".to_string(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Calls admitted per actor per window.
    pub max_requests: u32,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub max_turns: usize,
    /// Upper bound on the serialized JSON size of the history sent upstream.
    pub max_bytes: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_turns: 20,
            max_bytes: 8_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub max_input_chars: usize,
    pub max_output_chars: usize,
    pub max_attempts: u32,
    /// Delay before retry `n` is `n * backoff_step_ms`.
    pub backoff_step_ms: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_input_chars: 500,
            max_output_chars: 1_000,
            max_attempts: 3,
            backoff_step_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    pub page_size: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self { page_size: 20 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory for persisted cache snapshots. Defaults to
    /// `<config dir>/cache`.
    pub dir: Option<PathBuf>,
    /// Keep the cache in memory only.
    pub ephemeral: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    pub instructions: String,
    pub script: Vec<ScriptedExchangeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedExchangeConfig {
    pub question: String,
    pub answer: String,
}
