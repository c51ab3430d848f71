use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::base::{log_outcome, token_count, AgentResponse, Provider, ResponseBlocks, Usage, MAX_OUTPUT_TOKENS};
use super::configs::GoogleProviderConfig;
use super::transport;
use super::utils::describe_user_action;
use crate::errors::{ProviderResult, TransportError};
use crate::models::content::ImageContent;
use crate::models::message::{Message, MessageContent, ToolUse, UserActionContent};
use crate::models::role::Role;
use crate::models::tool::ToolCatalogue;

const PROVIDER_NAME: &str = "Gemini";

/// Finish reasons that mean the candidate was withheld rather than completed
const BLOCKED_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "RECITATION",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<GeminiContent>,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub max_output_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiContent {
    #[serde(default = "default_role")]
    pub role: String,
    // Missing when the candidate stops early, e.g. on MAX_TOKENS
    #[serde(default)]
    pub parts: Vec<Part>,
}

fn default_role() -> String {
    "model".to_string()
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Marks `text` as a reasoning summary rather than visible output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,
}

impl Part {
    fn text<S: Into<String>>(text: S) -> Self {
        Part {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    fn image(image: &ImageContent) -> Self {
        Part {
            inline_data: Some(InlineData {
                mime_type: image.media_type.clone(),
                data: image.data.clone(),
            }),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub response: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<GeminiContent>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

pub struct GoogleProvider {
    client: Client,
    config: GoogleProviderConfig,
    tools: ToolCatalogue,
}

impl GoogleProvider {
    pub fn new(config: GoogleProviderConfig, tools: ToolCatalogue) -> Result<Self> {
        let client = transport::build_client()?;
        Ok(Self {
            client,
            config,
            tools,
        })
    }

    /// Gemini reports reasoning tokens apart from visible output; both count as output here
    fn get_usage(data: &Value) -> Usage {
        let usage = data.get("usageMetadata");
        Usage::new(
            token_count(usage, "promptTokenCount"),
            token_count(usage, "candidatesTokenCount")
                .saturating_add(token_count(usage, "thoughtsTokenCount")),
            token_count(usage, "totalTokenCount"),
        )
    }

    async fn post(
        &self,
        model: &str,
        payload: &GenerateContentRequest,
        cancel: &CancellationToken,
    ) -> ProviderResult<Value> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.host.trim_end_matches('/'),
            model
        );

        let request = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(payload);

        transport::send(request, cancel, check_gemini_error).await
    }

    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        model: &str,
        use_tools: bool,
        cancel: &CancellationToken,
    ) -> ProviderResult<AgentResponse> {
        let payload = GenerateContentRequest {
            contents: messages_to_gemini_spec(messages),
            system_instruction: (!system.is_empty()).then(|| GeminiContent {
                role: "user".to_string(),
                parts: vec![Part::text(system)],
            }),
            generation_config: GenerationConfig {
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
            tools: (use_tools && !self.tools.is_empty()).then(|| tools_to_gemini_spec(&self.tools)),
        };
        tracing::debug!(
            "Sending {} contents to {} model {}",
            payload.contents.len(),
            PROVIDER_NAME,
            model
        );

        let response = self.post(model, &payload, cancel).await?;

        let content_blocks = gemini_response_to_content(&response)?;
        Ok(AgentResponse {
            content_blocks,
            token_usage: Self::get_usage(&response),
        })
    }
}

#[async_trait]
impl Provider for GoogleProvider {
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

fn gemini_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "model",
    }
}

fn push_part(contents: &mut Vec<GeminiContent>, role: &str, part: Part) {
    if let Some(last) = contents.last_mut() {
        if last.role == role {
            last.parts.push(part);
            return;
        }
    }
    contents.push(GeminiContent {
        role: role.to_string(),
        parts: vec![part],
    });
}

/// Convert the canonical history to Gemini contents
///
/// Function responses are addressed by name, so each tool result looks up the
/// name of the tool use it answers from earlier in the history.
pub fn messages_to_gemini_spec(messages: &[Message]) -> Vec<GeminiContent> {
    let mut tool_names: HashMap<&str, &str> = HashMap::new();
    let mut contents = Vec::new();

    for message in messages {
        if message.is_user_action_only() {
            for action in message.user_actions() {
                let part = match action {
                    UserActionContent::ToolUse(tool_use) => Part::text(describe_user_action(tool_use)),
                    UserActionContent::Image(image) => Part::image(image),
                };
                contents.push(GeminiContent {
                    role: "user".to_string(),
                    parts: vec![part],
                });
            }
            continue;
        }

        let mut turns = Vec::new();
        for content in &message.content {
            match content {
                MessageContent::Text(text) => {
                    push_part(&mut turns, gemini_role(message.role), Part::text(text.text.clone()))
                }
                MessageContent::Image(image) => push_part(&mut turns, "user", Part::image(image)),
                MessageContent::ToolUse(tool_use) => {
                    tool_names.insert(&tool_use.id, &tool_use.name);
                    push_part(
                        &mut turns,
                        "model",
                        Part {
                            function_call: Some(FunctionCall {
                                id: Some(tool_use.id.clone()),
                                name: tool_use.name.clone(),
                                args: tool_use.input.clone(),
                            }),
                            thought_signature: tool_use.signature.clone(),
                            ..Default::default()
                        },
                    )
                }
                MessageContent::Thinking(thinking) => push_part(
                    &mut turns,
                    "model",
                    Part {
                        text: Some(thinking.reasoning.clone()),
                        thought: Some(true),
                        thought_signature: Some(thinking.signature.clone())
                            .filter(|s| !s.is_empty() && *s != thinking.reasoning),
                        ..Default::default()
                    },
                ),
                MessageContent::ToolResult(result) => {
                    let Some(name) = tool_names.get(result.tool_use_id.as_str()) else {
                        tracing::warn!(
                            "{}: dropping tool result for unknown tool use {}",
                            PROVIDER_NAME,
                            result.tool_use_id
                        );
                        continue;
                    };
                    let output = result.as_text().unwrap_or_default();
                    let response = if result.is_error {
                        json!({"error": output})
                    } else {
                        json!({"output": output})
                    };
                    push_part(
                        &mut turns,
                        "user",
                        Part {
                            function_response: Some(FunctionResponse {
                                id: Some(result.tool_use_id.clone()),
                                name: name.to_string(),
                                response,
                            }),
                            ..Default::default()
                        },
                    )
                }
                MessageContent::UserAction(_) => {}
            }
        }
        contents.extend(turns);
    }

    contents
}

/// Map a Gemini error envelope to a transport error
pub fn check_gemini_error(response: &Value) -> Result<(), TransportError> {
    let Some(error) = response.get("error").filter(|e| !e.is_null()) else {
        return Ok(());
    };
    let message = error
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or("Unknown error")
        .to_string();
    // Gemini reports an oversized prompt as INVALID_ARGUMENT with a token count message
    if message.contains("exceeds the maximum number of tokens") {
        return Err(TransportError::ContextLengthExceeded(message));
    }
    Err(TransportError::Api {
        provider: PROVIDER_NAME,
        message,
    })
}

/// Convert the tool catalogue to a Gemini function declaration tool
pub fn tools_to_gemini_spec(catalogue: &ToolCatalogue) -> Vec<Value> {
    let declarations: Vec<Value> = catalogue
        .tools()
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.input_schema,
            })
        })
        .collect();

    vec![json!({ "functionDeclarations": declarations })]
}

/// Convert a generateContent response to canonical content blocks
pub fn gemini_response_to_content(response: &Value) -> Result<Vec<MessageContent>, TransportError> {
    let parsed: GenerateContentResponse = serde_json::from_value(response.clone())?;
    let mut blocks = ResponseBlocks::default();

    let Some(candidate) = parsed.candidates.into_iter().next() else {
        // A prompt blocked before generation yields no candidates but explains why
        if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
            blocks.set_refusal(format!("prompt blocked ({})", reason));
            return Ok(blocks.into_blocks());
        }
        return Err(TransportError::NoValidResponse(PROVIDER_NAME));
    };

    for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
        if let Some(call) = part.function_call {
            let input = if call.args.is_null() { json!({}) } else { call.args };
            blocks.push_tool_use(ToolUse {
                id: call.id.unwrap_or_else(|| format!("call_{}", Uuid::new_v4().simple())),
                name: call.name,
                input,
                signature: part.thought_signature,
            });
        } else if let Some(text) = part.text {
            if part.thought.unwrap_or(false) {
                let signature = part.thought_signature.unwrap_or_else(|| text.clone());
                blocks.push_thinking(text, signature);
            } else {
                blocks.push_text(&text);
            }
        }
    }

    if let Some(reason) = candidate
        .finish_reason
        .filter(|reason| BLOCKED_FINISH_REASONS.contains(&reason.as_str()))
    {
        blocks.set_refusal(format!("response blocked ({})", reason));
    }

    Ok(blocks.into_blocks())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProviderError;
    use crate::models::content::Content;
    use crate::models::tool::Tool;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup_mock_server(response: ResponseTemplate) -> (MockServer, GoogleProvider) {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
            .and(header("x-goog-api-key", "test_api_key"))
            .respond_with(response)
            .mount(&mock_server)
            .await;

        let config = GoogleProviderConfig {
            host: mock_server.uri(),
            api_key: "test_api_key".to_string(),
        };
        let tools = ToolCatalogue::new(vec![Tool::new(
            "computer_click_mouse",
            "Click the mouse",
            json!({"type": "object", "properties": {"button": {"type": "string"}}}),
        )])
        .unwrap();

        let provider = GoogleProvider::new(config, tools).unwrap();
        (mock_server, provider)
    }

    #[test]
    fn test_messages_to_gemini_spec_tool_exchange() {
        let messages = vec![
            Message::user().with_text("Click it"),
            Message::assistant().with_tool_use("call_1", "computer_click_mouse", json!({"button": "left"})),
            Message::user().with_tool_result(
                "call_1",
                vec![Content::text("clicked"), Content::image("abc", "image/png")],
                false,
            ),
        ];

        let contents = serde_json::to_value(messages_to_gemini_spec(&messages)).unwrap();

        assert_eq!(
            contents,
            json!([
                {"role": "user", "parts": [{"text": "Click it"}]},
                {"role": "model", "parts": [{"functionCall": {
                    "id": "call_1", "name": "computer_click_mouse", "args": {"button": "left"}
                }}]},
                {"role": "user", "parts": [{"functionResponse": {
                    "id": "call_1",
                    "name": "computer_click_mouse",
                    "response": {"output": "clicked\n[Screenshot provided]"}
                }}]}
            ])
        );
    }

    #[test]
    fn test_unknown_tool_result_is_skipped() {
        let messages = vec![Message::user().with_tool_result("missing", vec![Content::text("x")], true)];
        assert!(messages_to_gemini_spec(&messages).is_empty());
    }

    #[test]
    fn test_user_actions_flatten() {
        let message = Message::user().with_user_action(vec![
            UserActionContent::Image(ImageContent {
                data: "abc".to_string(),
                media_type: "image/png".to_string(),
            }),
            UserActionContent::ToolUse(ToolUse {
                id: "ua".to_string(),
                name: "computer_scroll".to_string(),
                input: json!({"direction": "down"}),
                signature: None,
            }),
        ]);

        let contents = messages_to_gemini_spec(&[message]);

        assert_eq!(contents.len(), 2);
        assert_eq!(
            contents[0].parts[0].inline_data,
            Some(InlineData {
                mime_type: "image/png".to_string(),
                data: "abc".to_string(),
            })
        );
        assert!(contents[1].parts[0]
            .text
            .as_deref()
            .unwrap()
            .starts_with("User performed action: computer_scroll\n"));
    }

    #[test]
    fn test_gemini_response_order() -> anyhow::Result<()> {
        let response = json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        {"functionCall": {"name": "computer_click_mouse", "args": {"button": "left"}}},
                        {"text": "weighing options", "thought": true},
                        {"text": "Clicking "},
                        {"text": "now"}
                    ]
                },
                "finishReason": "SAFETY"
            }]
        });

        let content = gemini_response_to_content(&response)?;

        assert_eq!(content.len(), 4);
        assert_eq!(content[0].as_text(), Some("Clicking now"));
        assert_eq!(content[1].as_thinking().unwrap().reasoning, "weighing options");
        let tool_use = content[2].as_tool_use().unwrap();
        assert!(tool_use.id.starts_with("call_"));
        assert_eq!(tool_use.input, json!({"button": "left"}));
        assert_eq!(content[3].as_text(), Some("Refusal: response blocked (SAFETY)"));
        Ok(())
    }

    #[test]
    fn test_function_call_signature_is_replayed() -> anyhow::Result<()> {
        let response = json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{
                        "functionCall": {"id": "call_7", "name": "computer_click_mouse", "args": {}},
                        "thoughtSignature": "c2lnbmF0dXJl"
                    }]
                }
            }]
        });

        let content = gemini_response_to_content(&response)?;
        let tool_use = content[0].as_tool_use().unwrap();
        assert_eq!(tool_use.signature.as_deref(), Some("c2lnbmF0dXJl"));

        let replay = vec![Message {
            role: Role::Assistant,
            content,
        }];
        let contents = serde_json::to_value(messages_to_gemini_spec(&replay))?;
        assert_eq!(
            contents,
            json!([{"role": "model", "parts": [{
                "thoughtSignature": "c2lnbmF0dXJl",
                "functionCall": {"id": "call_7", "name": "computer_click_mouse", "args": {}}
            }]}])
        );
        Ok(())
    }

    #[test]
    fn test_blocked_prompt_is_refusal() -> anyhow::Result<()> {
        let response = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        let content = gemini_response_to_content(&response)?;
        assert_eq!(content, vec![MessageContent::text("Refusal: prompt blocked (SAFETY)")]);
        Ok(())
    }

    #[test]
    fn test_no_candidates_is_no_valid_response() {
        let err = gemini_response_to_content(&json!({"candidates": []})).unwrap_err();
        assert_eq!(err.to_string(), "No valid response from Gemini");
    }

    #[test]
    fn test_check_gemini_error() {
        let too_long = json!({"error": {
            "code": 400,
            "status": "INVALID_ARGUMENT",
            "message": "The input token count (1200000) exceeds the maximum number of tokens allowed (1048576)."
        }});
        assert!(matches!(
            check_gemini_error(&too_long),
            Err(TransportError::ContextLengthExceeded(_))
        ));

        let denied = json!({"error": {"code": 403, "message": "API key not valid"}});
        assert_eq!(
            check_gemini_error(&denied).unwrap_err().to_string(),
            "Gemini API error: API key not valid"
        );
        assert!(check_gemini_error(&json!({"candidates": []})).is_ok());
    }

    #[test]
    fn test_get_usage() {
        let response = json!({"usageMetadata": {
            "promptTokenCount": 3,
            "candidatesTokenCount": 2,
            "thoughtsTokenCount": 17,
            "totalTokenCount": 22
        }});
        assert_eq!(GoogleProvider::get_usage(&response), Usage::new(3, 19, 22));
        assert_eq!(GoogleProvider::get_usage(&json!({})), Usage::default());
    }

    #[tokio::test]
    async fn test_complete_basic() -> anyhow::Result<()> {
        let (_, provider) = setup_mock_server(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Hello there"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 5, "totalTokenCount": 17}
        })))
        .await;

        let response = provider
            .generate_message(
                "You are a helpful assistant.",
                &[Message::user().with_text("Hello?")],
                "gemini-2.5-flash",
                true,
                CancellationToken::new(),
            )
            .await?;

        assert_eq!(response.content_blocks, vec![MessageContent::text("Hello there")]);
        assert_eq!(response.token_usage, Usage::new(12, 5, 17));
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_request_shape() -> anyhow::Result<()> {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-pro:generateContent"))
            .and(body_partial_json(json!({
                "systemInstruction": {"parts": [{"text": "sys"}]},
                "generationConfig": {"maxOutputTokens": 8192},
                "tools": [{"functionDeclarations": [{"name": "computer_click_mouse"}]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "ok"}]}}]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let provider = GoogleProvider::new(
            GoogleProviderConfig {
                host: mock_server.uri(),
                api_key: "k".to_string(),
            },
            ToolCatalogue::new(vec![Tool::new(
                "computer_click_mouse",
                "Click the mouse",
                json!({"type": "object"}),
            )])?,
        )?;

        provider
            .generate_message("sys", &[], "gemini-2.5-pro", true, CancellationToken::new())
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_before_send() {
        let (_, provider) = setup_mock_server(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": "too late"}]}}]
        })))
        .await;

        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = provider
            .generate_message("sys", &[], "gemini-2.5-flash", false, cancel)
            .await;
        assert!(matches!(result, Err(ProviderError::Cancelled)));
    }
}
