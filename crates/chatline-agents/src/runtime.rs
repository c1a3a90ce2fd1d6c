use std::sync::Arc;
use std::time::Duration;

use chatline_common::{ActorId, CounterpartKind, Error, Result, Turn, TurnRole};
use chatline_db::{CounterpartProfile, ProfileResolver};
use chatline_security::InputValidator;
use tracing::{debug, info, instrument, warn};

use crate::providers::{ChatMessage, ChatRole, LlmProvider, LlmRequest};
use crate::retry::RetryPolicy;
use crate::window::HistoryWindow;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const REPLY_FORMAT_INSTRUCTION: &str = "Respond only with a JSON object of the form \
{\"reply\": \"<your message>\"}. Do not add any other text.";

/// Character bounds applied to text entering and leaving the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationLimits {
    pub max_input_chars: usize,
    pub max_output_chars: usize,
}

impl Default for GenerationLimits {
    fn default() -> Self {
        Self {
            max_input_chars: 500,
            max_output_chars: 1000,
        }
    }
}

/// Produces counterpart replies: profile lookup, history windowing, one
/// provider call per attempt, response validation and bounded retry.
///
/// Every error leaving [`ReplyGenerator::generate_reply`] is a taxonomy
/// variant; provider-specific failures never escape.
pub struct ReplyGenerator {
    provider: Arc<dyn LlmProvider>,
    profiles: Arc<dyn ProfileResolver>,
    window: HistoryWindow,
    retry: RetryPolicy,
    limits: GenerationLimits,
    model: String,
    max_tokens: Option<u32>,
    temperature: Option<f64>,
    timeout: Duration,
}

impl ReplyGenerator {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        profiles: Arc<dyn ProfileResolver>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            profiles,
            window: HistoryWindow::new(20, 8000),
            retry: RetryPolicy::default(),
            limits: GenerationLimits::default(),
            model: model.into(),
            max_tokens: None,
            temperature: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_window(mut self, window: HistoryWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_limits(mut self, limits: GenerationLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_sampling(mut self, max_tokens: Option<u32>, temperature: Option<f64>) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn provider_id(&self) -> &str {
        self.provider.provider_id()
    }

    pub fn limits(&self) -> GenerationLimits {
        self.limits
    }

    /// Whether the provider's endpoint answers. Unreachable is `Ok(false)`.
    pub async fn health_check(&self) -> Result<bool> {
        self.provider.health_check().await
    }

    /// Generate the counterpart's reply to `input`, given the turns that
    /// preceded it.
    #[instrument(
        skip(self, input, history),
        fields(provider = self.provider.provider_id(), history_len = history.len())
    )]
    pub async fn generate_reply(
        &self,
        actor: &ActorId,
        input: &str,
        history: &[Turn],
        kind: CounterpartKind,
    ) -> Result<String> {
        let input = InputValidator::validate_message(input, self.limits.max_input_chars)?;

        let profile = self
            .profiles
            .resolve(kind)
            .await
            .map_err(Error::into_taxonomy)?
            .ok_or_else(|| {
                Error::ServiceUnavailable(format!("no instruction profile for '{kind}'"))
            })?;

        let windowed = self.window.optimize(history);
        debug!(
            kept = windowed.len(),
            dropped = history.len() - windowed.len(),
            "history windowed"
        );

        let request = LlmRequest {
            model: self.model.clone(),
            messages: build_messages(&windowed, &input),
            system: Some(build_system_prompt(&profile)),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            json_response: true,
        };

        let reply = self
            .retry
            .run(|attempt| self.attempt(&request, attempt))
            .await?;

        info!(reply_chars = reply.chars().count(), "reply generated");
        Ok(InputValidator::truncate_chars(
            &reply,
            self.limits.max_output_chars,
        ))
    }

    async fn attempt(&self, request: &LlmRequest, attempt: u32) -> Result<String> {
        let response = tokio::time::timeout(self.timeout, self.provider.complete(request))
            .await
            .map_err(|_| {
                Error::ServiceUnavailable(format!(
                    "provider '{}' timed out after {:?}",
                    self.provider.provider_id(),
                    self.timeout
                ))
            })?
            .map_err(|e| {
                warn!(attempt, "provider call failed: {e}");
                e.into_taxonomy()
            })?;

        parse_reply(&response.text)
    }
}

/// Validate a provider body and pull out its reply text.
///
/// The body must be a JSON object with a non-empty string `reply` field.
/// A surrounding Markdown code fence is tolerated.
pub fn parse_reply(raw: &str) -> Result<String> {
    let body = strip_code_fence(raw);

    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| Error::MalformedResponse(format!("response is not JSON: {e}")))?;

    let object = value
        .as_object()
        .ok_or_else(|| Error::MalformedResponse("response is not a JSON object".to_string()))?;

    let reply = object
        .get("reply")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::MalformedResponse("missing string field 'reply'".to_string()))?;

    let reply = InputValidator::sanitize(reply);
    if reply.is_empty() {
        return Err(Error::MalformedResponse("reply is empty".to_string()));
    }
    Ok(reply)
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") on the opening fence line.
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn build_system_prompt(profile: &CounterpartProfile) -> String {
    let mut prompt = profile.instructions.trim().to_string();

    if !profile.script.is_empty() {
        prompt.push_str("\n\nReference answers for questions you may be asked:");
        for exchange in &profile.script {
            prompt.push_str(&format!(
                "\nQ: {}\nA: {}",
                exchange.question.trim(),
                exchange.answer.trim()
            ));
        }
    }

    prompt.push_str("\n\n");
    prompt.push_str(REPLY_FORMAT_INSTRUCTION);
    prompt
}

/// Map stored turns onto provider roles and append the new input.
///
/// Local turns are skipped. Consecutive turns from the same side are merged
/// and a leading counterpart turn is dropped, since providers expect the
/// exchange to open with the user and alternate from there.
fn build_messages(history: &[Turn], input: &str) -> Vec<ChatMessage> {
    let mut messages: Vec<ChatMessage> = Vec::with_capacity(history.len() + 1);

    let turns = history
        .iter()
        .filter(|turn| !turn.local)
        .map(|turn| {
            let role = match turn.role {
                TurnRole::Actor => ChatRole::User,
                TurnRole::Counterpart => ChatRole::Assistant,
            };
            (role, turn.text.as_str())
        })
        .chain(std::iter::once((ChatRole::User, input)));

    for (role, text) in turns {
        match messages.last_mut() {
            Some(last) if last.role == role => {
                last.content.push_str("\n\n");
                last.content.push_str(text);
            }
            None if role == ChatRole::Assistant => {}
            _ => messages.push(ChatMessage {
                role,
                content: text.to_string(),
            }),
        }
    }

    messages
}
