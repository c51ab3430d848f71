use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::base::{log_outcome, token_count, AgentResponse, Provider, ResponseBlocks, Usage, MAX_OUTPUT_TOKENS};
use super::configs::AnthropicProviderConfig;
use super::transport;
use super::utils::describe_user_action;
use crate::errors::{ProviderResult, TransportError};
use crate::models::content::{Content, ImageContent};
use crate::models::message::{Message, MessageContent, ToolUse, UserActionContent};
use crate::models::role::Role;
use crate::models::tool::ToolCatalogue;

const PROVIDER_NAME: &str = "Anthropic";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const REFUSAL_TEXT: &str = "The model declined to respond to this request";

pub struct AnthropicProvider {
    client: Client,
    config: AnthropicProviderConfig,
    tools: ToolCatalogue,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicProviderConfig, tools: ToolCatalogue) -> Result<Self> {
        let client = transport::build_client()?;
        Ok(Self {
            client,
            config,
            tools,
        })
    }

    fn get_usage(data: &Value) -> Usage {
        let usage = data.get("usage");
        let input_tokens = token_count(usage, "input_tokens");
        let output_tokens = token_count(usage, "output_tokens");
        Usage::new(
            input_tokens,
            output_tokens,
            input_tokens.saturating_add(output_tokens),
        )
    }

    async fn post(&self, payload: &Value, cancel: &CancellationToken) -> ProviderResult<Value> {
        let url = format!("{}/v1/messages", self.config.host.trim_end_matches('/'));

        let request = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(payload);

        transport::send(request, cancel, check_anthropic_error).await
    }

    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        model: &str,
        use_tools: bool,
        cancel: &CancellationToken,
    ) -> ProviderResult<AgentResponse> {
        let anthropic_messages = messages_to_anthropic_spec(messages);
        tracing::debug!(
            "Sending {} messages to {} model {}",
            anthropic_messages.len(),
            PROVIDER_NAME,
            model
        );

        let mut payload = json!({
            "model": model,
            "max_tokens": MAX_OUTPUT_TOKENS,
            "messages": anthropic_messages,
        });
        if !system.is_empty() {
            payload["system"] = json!(system);
        }
        if use_tools && !self.tools.is_empty() {
            payload["tools"] = json!(tools_to_anthropic_spec(&self.tools));
        }

        let response = self.post(&payload, cancel).await?;

        let content_blocks = anthropic_response_to_content(&response)?;
        Ok(AgentResponse {
            content_blocks,
            token_usage: Self::get_usage(&response),
        })
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn generate_message(
        &self,
        system: &str,
        messages: &[Message],
        model: &str,
        use_tools: bool,
        cancel: CancellationToken,
    ) -> ProviderResult<AgentResponse> {
        log_outcome(
            PROVIDER_NAME,
            self.complete(system, messages, model, use_tools, &cancel).await,
        )
    }
}

fn convert_image(image: &ImageContent) -> Value {
    json!({
        "type": "image",
        "source": {
            "type": "base64",
            "media_type": image.media_type,
            "data": image.data,
        }
    })
}

/// Append a block to the last turn when it has the same role, otherwise open a new turn
fn push_block(turns: &mut Vec<Value>, role: Role, block: Value) {
    if let Some(last) = turns.last_mut() {
        if last["role"] == role.as_str() {
            if let Some(content) = last["content"].as_array_mut() {
                content.push(block);
                return;
            }
        }
    }
    turns.push(json!({
        "role": role.as_str(),
        "content": [block],
    }));
}

/// Map an Anthropic error envelope to a transport error
pub fn check_anthropic_error(response: &Value) -> Result<(), TransportError> {
    let Some(error) = response.get("error").filter(|e| !e.is_null()) else {
        return Ok(());
    };
    let message = error
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or("Unknown error")
        .to_string();
    if message.contains("prompt is too long") {
        return Err(TransportError::ContextLengthExceeded(message));
    }
    Err(TransportError::Api {
        provider: PROVIDER_NAME,
        message,
    })
}

/// Convert the canonical history to Anthropic's messages specification
pub fn messages_to_anthropic_spec(messages: &[Message]) -> Vec<Value> {
    let mut anthropic_messages = Vec::new();

    for message in messages {
        if message.is_user_action_only() {
            for action in message.user_actions() {
                let block = match action {
                    UserActionContent::ToolUse(tool_use) => json!({
                        "type": "text",
                        "text": describe_user_action(tool_use),
                    }),
                    UserActionContent::Image(image) => convert_image(image),
                };
                anthropic_messages.push(json!({"role": "user", "content": [block]}));
            }
            continue;
        }

        // Turns produced by one canonical message; a role switch inside it opens a new turn
        let mut turns = Vec::new();
        for content in &message.content {
            match content {
                MessageContent::Text(text) => push_block(
                    &mut turns,
                    message.role,
                    json!({"type": "text", "text": text.text}),
                ),
                MessageContent::Image(image) => {
                    push_block(&mut turns, Role::User, convert_image(image))
                }
                MessageContent::ToolUse(tool_use) => push_block(
                    &mut turns,
                    Role::Assistant,
                    json!({
                        "type": "tool_use",
                        "id": tool_use.id,
                        "name": tool_use.name,
                        "input": tool_use.input,
                    }),
                ),
                MessageContent::Thinking(thinking) => push_block(
                    &mut turns,
                    Role::Assistant,
                    json!({
                        "type": "thinking",
                        "thinking": thinking.reasoning,
                        "signature": thinking.signature,
                    }),
                ),
                MessageContent::ToolResult(result) => {
                    let content: Vec<Value> = result
                        .content
                        .iter()
                        .map(|content| match content {
                            Content::Text(text) => json!({"type": "text", "text": text.text}),
                            Content::Image(image) => convert_image(image),
                        })
                        .collect();
                    push_block(
                        &mut turns,
                        Role::User,
                        json!({
                            "type": "tool_result",
                            "tool_use_id": result.tool_use_id,
                            "content": content,
                            "is_error": result.is_error,
                        }),
                    );
                }
                MessageContent::UserAction(_) => {}
            }
        }
        anthropic_messages.extend(turns);
    }

    anthropic_messages
}

/// Convert the tool catalogue to Anthropic's tool specification
pub fn tools_to_anthropic_spec(catalogue: &ToolCatalogue) -> Vec<Value> {
    catalogue
        .tools()
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "input_schema": tool.input_schema,
            })
        })
        .collect()
}

/// Convert an Anthropic messages response to canonical content blocks
pub fn anthropic_response_to_content(
    response: &Value,
) -> Result<Vec<MessageContent>, TransportError> {
    let content = response
        .get("content")
        .and_then(|c| c.as_array())
        .ok_or(TransportError::NoValidResponse(PROVIDER_NAME))?;

    let mut blocks = ResponseBlocks::default();
    let mut texts = Vec::new();

    for block in content {
        match block.get("type").and_then(|t| t.as_str()) {
            Some("text") => {
                if let Some(text) = block.get("text").and_then(|t| t.as_str()) {
                    texts.push(text);
                }
            }
            Some("thinking") => {
                let reasoning = block["thinking"].as_str().unwrap_or_default();
                let signature = block["signature"].as_str().unwrap_or(reasoning);
                blocks.push_thinking(reasoning, signature);
            }
            Some("tool_use") => {
                let input = match block.get("input") {
                    Some(input) if !input.is_null() => input.clone(),
                    _ => json!({}),
                };
                blocks.push_tool_use(ToolUse {
                    id: block["id"].as_str().unwrap_or_default().to_string(),
                    name: block["name"].as_str().unwrap_or_default().to_string(),
                    input,
                    signature: None,
                });
            }
            other => {
                tracing::warn!("{}: skipping unsupported content block {:?}", PROVIDER_NAME, other);
            }
        }
    }

    blocks.push_text(&texts.join("\n"));
    if response.get("stop_reason").and_then(|r| r.as_str()) == Some("refusal") {
        blocks.set_refusal(REFUSAL_TEXT);
    }

    Ok(blocks.into_blocks())
}
