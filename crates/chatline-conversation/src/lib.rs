pub mod cache;
pub mod notify;
pub mod orchestrator;
pub mod persistence;
pub mod surfaces;

pub use cache::{CacheEntry, CacheKey, ClientCache};
pub use notify::{BroadcastNotifier, NoopNotifier, Notifier, TurnNotification};
pub use orchestrator::{ConversationOrchestrator, SendOutcome, SharedServices};
pub use persistence::{CacheSnapshot, CacheStorage, JsonFileStorage, MemoryStorage};
pub use surfaces::{ChatSurfaces, PipelineSettings, Surface};
