use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chatline_agents::{
    AnthropicProvider, GenerationLimits, HistoryWindow, LlmProvider, OpenAiProvider, RetryPolicy,
};
use chatline_common::CounterpartKind;
use chatline_config::{AppConfig, LlmProviderConfig, ProfileConfig};
use chatline_conversation::{
    BroadcastNotifier, CacheStorage, ChatSurfaces, JsonFileStorage, MemoryStorage,
    PipelineSettings, SharedServices, Surface,
};
use chatline_db::{CounterpartProfile, ScriptedExchange};
use chatline_security::{IdentityProvider, RateLimiter, StaticIdentity};
use tracing::{info, warn};

/// Wire both chat surfaces from a loaded config.
pub fn build_surfaces(config: &AppConfig, actor: Option<String>) -> Result<ChatSurfaces> {
    let provider = build_provider(&config.llm)?;

    let identity: Arc<dyn IdentityProvider> = Arc::new(match actor {
        Some(actor) => StaticIdentity::signed_in(actor),
        None => StaticIdentity::signed_out(),
    });

    let services = SharedServices {
        identity,
        admission: Arc::new(RateLimiter::new(
            config.rate_limit.max_requests,
            Duration::from_secs(config.rate_limit.window_secs),
        )),
        notifier: Arc::new(BroadcastNotifier::new(64)),
    };

    let cache_storage: Arc<dyn CacheStorage> = match (&config.cache.dir, config.cache.ephemeral) {
        (Some(dir), false) => Arc::new(
            JsonFileStorage::new(dir)
                .with_context(|| format!("failed to prepare cache dir {}", dir.display()))?,
        ),
        _ => Arc::new(MemoryStorage::new()),
    };

    let surfaces = ChatSurfaces::open(
        config.database.path.as_deref(),
        provider,
        cache_storage,
        services,
        &pipeline_settings(config),
    )?;

    seed_profiles(&surfaces, config)?;
    Ok(surfaces)
}

pub fn build_provider(llm: &LlmProviderConfig) -> Result<Arc<dyn LlmProvider>> {
    let api_key = match &llm.api_key {
        Some(key) => key.clone(),
        None => {
            let env_var = llm.resolved_api_key_env();
            std::env::var(&env_var).unwrap_or_else(|_| {
                warn!("{env_var} is not set; provider calls will be rejected");
                String::new()
            })
        }
    };

    let provider: Arc<dyn LlmProvider> = match llm.provider.as_str() {
        "anthropic" => {
            let mut provider = AnthropicProvider::new(api_key);
            if let Some(base_url) = &llm.base_url {
                provider = provider.with_base_url(base_url.clone());
            }
            Arc::new(provider)
        }
        "openai" => Arc::new(OpenAiProvider::new(api_key, llm.base_url.clone())),
        other => anyhow::bail!("unsupported provider '{other}'"),
    };
    info!(provider = provider.provider_id(), model = %llm.model, "provider configured");
    Ok(provider)
}

pub fn pipeline_settings(config: &AppConfig) -> PipelineSettings {
    PipelineSettings {
        model: config.llm.model.clone(),
        max_tokens: Some(config.llm.max_tokens),
        temperature: config.llm.temperature,
        provider_timeout: Duration::from_secs(config.llm.request_timeout_secs),
        window: HistoryWindow::new(config.history.max_turns, config.history.max_bytes),
        retry: RetryPolicy::linear(
            config.generation.max_attempts,
            Duration::from_millis(config.generation.backoff_step_ms),
        ),
        limits: GenerationLimits {
            max_input_chars: config.generation.max_input_chars,
            max_output_chars: config.generation.max_output_chars,
        },
        page_size: config.pagination.page_size,
        storage_timeout: Duration::from_secs(config.storage.timeout_secs),
    }
}

/// Write the configured instruction profiles into every surface's store.
fn seed_profiles(surfaces: &ChatSurfaces, config: &AppConfig) -> Result<()> {
    if config.profiles.is_empty() {
        warn!("no counterpart profiles configured; replies will be unavailable");
    }
    for (kind, profile) in &config.profiles {
        let kind: CounterpartKind = kind.parse()?;
        let profile = to_profile(profile);
        for surface in Surface::ALL {
            surfaces.store(surface).put_profile(kind, &profile)?;
        }
    }
    Ok(())
}

fn to_profile(config: &ProfileConfig) -> CounterpartProfile {
    CounterpartProfile {
        instructions: config.instructions.clone(),
        script: config
            .script
            .iter()
            .map(|exchange| ScriptedExchange {
                question: exchange.question.clone(),
                answer: exchange.answer.clone(),
            })
            .collect(),
    }
}
