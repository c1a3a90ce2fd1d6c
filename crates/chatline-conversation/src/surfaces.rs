use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chatline_agents::{GenerationLimits, HistoryWindow, LlmProvider, ReplyGenerator, RetryPolicy};
use chatline_common::{Error, Result};
use chatline_db::SqliteTurnStore;
use tracing::info;

use crate::cache::ClientCache;
use crate::orchestrator::{ConversationOrchestrator, SharedServices};
use crate::persistence::CacheStorage;

/// The two chat surfaces of the game. Each has its own store namespace,
/// cache namespace and counterpart profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Surface {
    Direct,
    Messenger,
}

impl Surface {
    pub const ALL: [Surface; 2] = [Surface::Direct, Surface::Messenger];

    pub fn namespace(&self) -> &'static str {
        match self {
            Surface::Direct => "dm",
            Surface::Messenger => "im",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Surface::Direct => "direct",
            Surface::Messenger => "messenger",
        }
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Surface {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "direct" | "dm" => Ok(Surface::Direct),
            "messenger" | "im" => Ok(Surface::Messenger),
            other => Err(Error::General(format!("unknown surface '{other}'"))),
        }
    }
}

/// Tunables applied identically to both surfaces.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub provider_timeout: Duration,
    pub window: HistoryWindow,
    pub retry: RetryPolicy,
    pub limits: GenerationLimits,
    pub page_size: usize,
    pub storage_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            model: "claude-3-5-haiku-latest".to_string(),
            max_tokens: Some(512),
            temperature: Some(0.7),
            provider_timeout: Duration::from_secs(30),
            window: HistoryWindow::new(20, 8000),
            retry: RetryPolicy::default(),
            limits: GenerationLimits::default(),
            page_size: 20,
            storage_timeout: Duration::from_secs(10),
        }
    }
}

struct SurfaceHandle {
    store: Arc<SqliteTurnStore>,
    orchestrator: ConversationOrchestrator,
}

/// Both surfaces, built from one generic pipeline. The provider, the rate
/// limiter and the identity provider are shared; stores, caches and
/// profiles are per surface.
pub struct ChatSurfaces {
    direct: SurfaceHandle,
    messenger: SurfaceHandle,
}

impl ChatSurfaces {
    /// Open both surfaces against one SQLite database, or private in-memory
    /// stores when `database` is `None`.
    pub fn open(
        database: Option<&Path>,
        provider: Arc<dyn LlmProvider>,
        cache_storage: Arc<dyn CacheStorage>,
        services: SharedServices,
        settings: &PipelineSettings,
    ) -> Result<Self> {
        let build = |surface: Surface| -> Result<SurfaceHandle> {
            let namespace = surface.namespace();
            let store = Arc::new(match database {
                Some(path) => SqliteTurnStore::open(path, namespace)?,
                None => SqliteTurnStore::in_memory(namespace)?,
            });

            let generator = ReplyGenerator::new(
                Arc::clone(&provider),
                Arc::clone(&store) as Arc<dyn chatline_db::ProfileResolver>,
                settings.model.clone(),
            )
            .with_window(settings.window)
            .with_retry(settings.retry)
            .with_limits(settings.limits)
            .with_sampling(settings.max_tokens, settings.temperature)
            .with_timeout(settings.provider_timeout);

            let cache = Arc::new(ClientCache::restore(namespace, Arc::clone(&cache_storage)));

            let orchestrator = ConversationOrchestrator::new(
                Arc::clone(&store) as Arc<dyn chatline_db::TurnStore>,
                Arc::new(generator),
                cache,
                services.clone(),
            )
            .with_page_size(settings.page_size)
            .with_storage_timeout(settings.storage_timeout);

            info!(%surface, namespace, "chat surface ready");
            Ok(SurfaceHandle {
                store,
                orchestrator,
            })
        };

        Ok(Self {
            direct: build(Surface::Direct)?,
            messenger: build(Surface::Messenger)?,
        })
    }

    fn handle(&self, surface: Surface) -> &SurfaceHandle {
        match surface {
            Surface::Direct => &self.direct,
            Surface::Messenger => &self.messenger,
        }
    }

    pub fn get(&self, surface: Surface) -> &ConversationOrchestrator {
        &self.handle(surface).orchestrator
    }

    /// The surface's store, for seeding profiles.
    pub fn store(&self, surface: Surface) -> &Arc<SqliteTurnStore> {
        &self.handle(surface).store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surfaces_parse_and_map_to_namespaces() {
        assert_eq!("direct".parse::<Surface>().unwrap(), Surface::Direct);
        assert_eq!("IM".parse::<Surface>().unwrap(), Surface::Messenger);
        assert!("email".parse::<Surface>().is_err());

        let namespaces: Vec<_> = Surface::ALL.iter().map(Surface::namespace).collect();
        assert_eq!(namespaces, ["dm", "im"]);
    }
}
