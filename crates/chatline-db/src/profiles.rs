use async_trait::async_trait;
use chatline_common::{CounterpartKind, Result};
use serde::{Deserialize, Serialize};

/// Static per-counterpart configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterpartProfile {
    /// System-level guidance handed to the generative provider.
    pub instructions: String,
    /// Canned question/answer pairs. Also read by the quiz submission flow.
    #[serde(default)]
    pub script: Vec<ScriptedExchange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptedExchange {
    pub question: String,
    pub answer: String,
}

/// Looks up the instruction profile for a counterpart kind.
#[async_trait]
pub trait ProfileResolver: Send + Sync {
    async fn resolve(&self, kind: CounterpartKind) -> Result<Option<CounterpartProfile>>;
}
