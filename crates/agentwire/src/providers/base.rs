use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::errors::{ProviderError, ProviderResult};
use crate::models::message::{Message, MessageContent, ThinkingContent, ToolUse};

/// Maximum number of tokens every adapter asks the backend to generate
pub const MAX_OUTPUT_TOKENS: u32 = 8192;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(input_tokens: u32, output_tokens: u32, total_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }
}

/// Read a token count from a usage object, treating anything missing or unusable as zero
pub(crate) fn token_count(usage: Option<&serde_json::Value>, key: &str) -> u32 {
    usage
        .and_then(|usage| usage.get(key))
        .and_then(|v| v.as_u64())
        .map(|v| u32::try_from(v).unwrap_or(u32::MAX))
        .unwrap_or(0)
}

/// The translated reply of a backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponse {
    pub content_blocks: Vec<MessageContent>,
    pub token_usage: Usage,
}

impl AgentResponse {
    /// The reply as an assistant message, ready to be appended to the history
    pub fn into_message(self) -> Message {
        Message {
            role: crate::models::role::Role::Assistant,
            content: self.content_blocks,
        }
    }
}

/// A model a backend is known to serve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub provider: &'static str,
    pub name: &'static str,
    pub title: &'static str,
    pub context_window: u32,
}

/// Collects the pieces of a backend reply and emits them in the canonical order:
/// text, thinking, tool uses, then the refusal rendered as text.
#[derive(Debug, Default)]
pub(crate) struct ResponseBlocks {
    text: String,
    thinking: Vec<ThinkingContent>,
    tool_uses: Vec<ToolUse>,
    refusal: Option<String>,
}

impl ResponseBlocks {
    pub fn push_text(&mut self, text: &str) {
        self.text.push_str(text);
    }

    pub fn push_thinking<S: Into<String>, T: Into<String>>(&mut self, reasoning: S, signature: T) {
        let reasoning = reasoning.into();
        if !reasoning.is_empty() {
            self.thinking.push(ThinkingContent {
                reasoning,
                signature: signature.into(),
            });
        }
    }

    pub fn push_tool_use(&mut self, tool_use: ToolUse) {
        self.tool_uses.push(tool_use);
    }

    pub fn set_refusal<S: Into<String>>(&mut self, refusal: S) {
        let refusal = refusal.into();
        if !refusal.is_empty() {
            self.refusal = Some(refusal);
        }
    }

    pub fn into_blocks(self) -> Vec<MessageContent> {
        let mut blocks = Vec::new();
        if !self.text.is_empty() {
            blocks.push(MessageContent::text(self.text));
        }
        blocks.extend(self.thinking.into_iter().map(MessageContent::Thinking));
        blocks.extend(self.tool_uses.into_iter().map(MessageContent::ToolUse));
        if let Some(refusal) = self.refusal {
            blocks.push(MessageContent::text(format!("Refusal: {}", refusal)));
        }
        blocks
    }
}

/// Log the outcome of an invocation the way the agent loop expects to see it:
/// cancellation is routine, anything else is an error worth reporting.
pub(crate) fn log_outcome<T>(provider: &str, result: ProviderResult<T>) -> ProviderResult<T> {
    match &result {
        Err(ProviderError::Cancelled) => tracing::info!("{} request aborted", provider),
        Err(ProviderError::Transport(e)) => tracing::error!("{} error: {}", provider, e),
        Ok(_) => {}
    }
    result
}

/// Base trait for LLM backends (Anthropic, OpenAI, Gemini, Qwen)
///
/// Implementations are stateless across calls apart from their immutable
/// connection configuration and tool catalogue, so one instance may serve
/// concurrent invocations.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Human readable backend name used in logs and errors
    fn name(&self) -> &'static str;

    /// Models this backend is known to serve
    fn models(&self) -> &'static [ModelInfo] {
        &[]
    }

    /// Translate the conversation, send it to `model` and translate the reply back.
    ///
    /// The tool catalogue is attached only when `use_tools` is set. Triggering `cancel`
    /// aborts the in-flight request and yields [`ProviderError::Cancelled`].
    async fn generate_message(
        &self,
        system: &str,
        messages: &[Message],
        model: &str,
        use_tools: bool,
        cancel: CancellationToken,
    ) -> ProviderResult<AgentResponse>;
}
