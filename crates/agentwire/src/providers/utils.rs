//! Translation to and from the OpenAI chat completions format, shared by every
//! OpenAI-compatible backend.
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::base::{token_count, ResponseBlocks, Usage};
use crate::errors::TransportError;
use crate::models::content::ImageContent;
use crate::models::message::{Message, MessageContent, ToolUse, UserActionContent};
use crate::models::role::Role;
use crate::models::tool::ToolCatalogue;

/// How a backend accepts the model's reasoning on replayed assistant turns
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReasoningFormat {
    /// Reasoning travels in the `reasoning_content` field of an assistant turn
    ReasoningContent,
    /// The backend has no slot for reasoning; thinking blocks are not sent
    Omit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    System {
        content: String,
    },
    User {
        content: ChatContent,
    },
    Assistant {
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<ChatToolCall>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reasoning_content: Option<String>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

impl ChatMessage {
    fn assistant_text(text: &str) -> Self {
        ChatMessage::Assistant {
            content: Some(text.to_string()),
            tool_calls: None,
            reasoning_content: None,
        }
    }

    fn user_image(image: &ImageContent) -> Self {
        ChatMessage::User {
            content: ChatContent::Parts(vec![ChatContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: image.data_uri(),
                    detail: ImageDetail::High,
                },
            }]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChatContent {
    Text(String),
    Parts(Vec<ChatContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageUrl {
    pub url: String,
    pub detail: ImageDetail,
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageDetail {
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub kind: String,
    pub function: ChatFunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatFunctionCall {
    pub name: String,
    /// JSON document encoded as a string; some servers send null for argument-less calls
    #[serde(default)]
    pub arguments: Option<String>,
}

fn function_type() -> String {
    "function".to_string()
}

/// The parts of a chat completion response the adapters read; usage is read separately
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletion {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    #[serde(default)]
    pub message: Option<ChatResponseMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub reasoning_content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ChatToolCall>>,
    #[serde(default)]
    pub refusal: Option<String>,
}

/// Convert the system prompt and canonical history to chat completion messages
pub fn messages_to_openai_spec(
    system: &str,
    messages: &[Message],
    reasoning_format: ReasoningFormat,
) -> Vec<ChatMessage> {
    let mut chat_messages = vec![ChatMessage::System {
        content: system.to_string(),
    }];

    for message in messages {
        if message.is_user_action_only() {
            for action in message.user_actions() {
                chat_messages.push(match action {
                    UserActionContent::ToolUse(tool_use) => ChatMessage::User {
                        content: ChatContent::Text(describe_user_action(tool_use)),
                    },
                    UserActionContent::Image(image) => ChatMessage::user_image(image),
                });
            }
            continue;
        }

        for content in &message.content {
            match content {
                MessageContent::Text(text) => chat_messages.push(match message.role {
                    Role::User => ChatMessage::User {
                        content: ChatContent::Text(text.text.clone()),
                    },
                    Role::Assistant => ChatMessage::assistant_text(&text.text),
                }),
                MessageContent::Image(image) => chat_messages.push(ChatMessage::user_image(image)),
                MessageContent::ToolUse(tool_use) => chat_messages.push(ChatMessage::Assistant {
                    content: None,
                    tool_calls: Some(vec![ChatToolCall {
                        id: tool_use.id.clone(),
                        kind: function_type(),
                        function: ChatFunctionCall {
                            name: tool_use.name.clone(),
                            arguments: Some(tool_use.input.to_string()),
                        },
                    }]),
                    reasoning_content: None,
                }),
                MessageContent::Thinking(thinking) => {
                    if reasoning_format == ReasoningFormat::ReasoningContent {
                        chat_messages.push(ChatMessage::Assistant {
                            content: None,
                            tool_calls: None,
                            reasoning_content: Some(thinking.reasoning.clone()),
                        });
                    }
                }
                MessageContent::ToolResult(result) => {
                    if let Some(text) = result.as_text() {
                        chat_messages.push(ChatMessage::Tool {
                            tool_call_id: result.tool_use_id.clone(),
                            content: text,
                        });
                    }
                }
                // Only meaningful when the whole message is made of user actions
                MessageContent::UserAction(_) => {}
            }
        }
    }

    chat_messages
}

/// Render a replayed user action as an instruction the model can read
pub fn describe_user_action(tool_use: &ToolUse) -> String {
    let input = serde_json::to_string_pretty(&tool_use.input).unwrap_or_default();
    format!("User performed action: {}\n{}", tool_use.name, input)
}

/// Convert the tool catalogue to OpenAI's API tool specification
pub fn tools_to_openai_spec(catalogue: &ToolCatalogue) -> Vec<Value> {
    catalogue
        .tools()
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.input_schema,
                }
            })
        })
        .collect()
}

/// Extract the first choice's message; an envelope without one is a transport failure
pub fn first_message(
    provider: &'static str,
    response: &Value,
) -> Result<ChatResponseMessage, TransportError> {
    let completion: ChatCompletion = serde_json::from_value(response.clone())?;
    completion
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .ok_or(TransportError::NoValidResponse(provider))
}

/// Convert a chat completion message to canonical content blocks
pub fn openai_message_to_content(provider: &str, message: ChatResponseMessage) -> Vec<MessageContent> {
    let mut blocks = ResponseBlocks::default();

    if let Some(text) = &message.content {
        blocks.push_text(text);
    }
    if let Some(reasoning) = message.reasoning_content {
        blocks.push_thinking(reasoning.clone(), reasoning);
    }
    for tool_call in message.tool_calls.unwrap_or_default() {
        if tool_call.kind != "function" {
            continue;
        }
        let arguments = tool_call.function.arguments.as_deref().unwrap_or_default();
        let input = parse_tool_arguments(provider, arguments);
        blocks.push_tool_use(ToolUse {
            id: tool_call.id,
            name: tool_call.function.name,
            input,
            signature: None,
        });
    }
    if let Some(refusal) = message.refusal {
        blocks.set_refusal(refusal);
    }

    blocks.into_blocks()
}

/// Parse tool call arguments, falling back to an empty object when they are not valid JSON
pub fn parse_tool_arguments(provider: &str, arguments: &str) -> Value {
    let arguments = if arguments.is_empty() { "{}" } else { arguments };
    match serde_json::from_str::<Value>(arguments) {
        Ok(input) => input,
        Err(e) => {
            tracing::warn!(
                "{}: failed to parse tool call arguments ({}): {}",
                provider,
                e,
                arguments
            );
            json!({})
        }
    }
}

/// Normalize chat completion usage; missing counts are zero
pub fn get_openai_usage(response: &Value) -> Usage {
    let usage = response.get("usage");
    Usage::new(
        token_count(usage, "prompt_tokens"),
        token_count(usage, "completion_tokens"),
        token_count(usage, "total_tokens"),
    )
}

/// Map a chat completion error envelope to a transport error
pub fn check_openai_error(provider: &'static str, response: &Value) -> Result<(), TransportError> {
    let Some(error) = response.get("error").filter(|e| !e.is_null()) else {
        return Ok(());
    };
    let message = error
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or("Unknown error")
        .to_string();

    match error.get("code").and_then(|c| c.as_str()) {
        Some("context_length_exceeded") | Some("string_above_max_length") => {
            Err(TransportError::ContextLengthExceeded(message))
        }
        _ => Err(TransportError::Api { provider, message }),
    }
}
