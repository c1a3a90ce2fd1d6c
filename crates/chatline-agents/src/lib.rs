pub mod providers;
pub mod retry;
pub mod runtime;
pub mod window;

pub use providers::{
    AnthropicProvider, ChatMessage, ChatRole, LlmProvider, LlmRequest, LlmResponse,
    OpenAiProvider, Usage,
};
pub use retry::{Backoff, RetryPolicy};
pub use runtime::{GenerationLimits, ReplyGenerator, parse_reply};
pub use window::HistoryWindow;
