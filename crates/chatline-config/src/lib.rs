pub mod loader;
pub mod model;

pub use loader::ConfigLoader;
pub use model::{
    AppConfig, CacheConfig, DatabaseConfig, GenerationConfig, HistoryConfig, LlmProviderConfig,
    PaginationConfig, ProfileConfig, RateLimitConfig, ScriptedExchangeConfig, StorageConfig,
};
