use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::base::{log_outcome, AgentResponse, ModelInfo, Provider, MAX_OUTPUT_TOKENS};
use super::configs::QwenProviderConfig;
use super::transport;
use super::utils::{
    check_openai_error, first_message, get_openai_usage, messages_to_openai_spec,
    openai_message_to_content, tools_to_openai_spec, ChatCompletionRequest, ReasoningFormat,
};
use crate::errors::ProviderResult;
use crate::models::message::Message;
use crate::models::tool::ToolCatalogue;

const PROVIDER_NAME: &str = "Qwen";

pub const QWEN_MODELS: &[ModelInfo] = &[
    ModelInfo {
        provider: "qwen",
        name: "qwen-turbo",
        title: "Qwen Turbo",
        context_window: 8192,
    },
    ModelInfo {
        provider: "qwen",
        name: "qwen-plus",
        title: "Qwen Plus",
        context_window: 32768,
    },
    ModelInfo {
        provider: "qwen",
        name: "qwen-max",
        title: "Qwen Max",
        context_window: 131072,
    },
    ModelInfo {
        provider: "qwen",
        name: "qwen-max-longcontext",
        title: "Qwen Max Long Context",
        context_window: 131072,
    },
];

pub const QWEN_DEFAULT_MODEL: &str = "qwen-turbo";

/// Qwen served through DashScope's OpenAI-compatible chat completions endpoint
pub struct QwenProvider {
    client: Client,
    config: QwenProviderConfig,
    tools: ToolCatalogue,
}

impl QwenProvider {
    pub fn new(config: QwenProviderConfig, tools: ToolCatalogue) -> Result<Self> {
        let client = transport::build_client()?;
        Ok(Self {
            client,
            config,
            tools,
        })
    }

    fn build_request(
        &self,
        system: &str,
        messages: &[Message],
        model: &str,
        use_tools: bool,
    ) -> ChatCompletionRequest {
        let tools = (use_tools && !self.tools.is_empty()).then(|| tools_to_openai_spec(&self.tools));

        ChatCompletionRequest {
            model: model.to_string(),
            messages: messages_to_openai_spec(system, messages, ReasoningFormat::ReasoningContent),
            max_tokens: MAX_OUTPUT_TOKENS,
            tools,
        }
    }

    async fn post(
        &self,
        payload: &ChatCompletionRequest,
        cancel: &CancellationToken,
    ) -> ProviderResult<Value> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let request = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(payload);

        transport::send(request, cancel, |body| check_openai_error(PROVIDER_NAME, body)).await
    }

    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        model: &str,
        use_tools: bool,
        cancel: &CancellationToken,
    ) -> ProviderResult<AgentResponse> {
        let payload = self.build_request(system, messages, model, use_tools);
        tracing::debug!(
            "Sending {} messages to {} model {}",
            payload.messages.len(),
            PROVIDER_NAME,
            model
        );

        let response = self.post(&payload, cancel).await?;

        let message = first_message(PROVIDER_NAME, &response)?;
        Ok(AgentResponse {
            content_blocks: openai_message_to_content(PROVIDER_NAME, message),
            token_usage: get_openai_usage(&response),
        })
    }
}

#[async_trait]
impl Provider for QwenProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn models(&self) -> &'static [ModelInfo] {
        QWEN_MODELS
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ProviderError, TransportError};
    use crate::models::content::Content;
    use crate::models::message::{MessageContent, ToolUse, UserActionContent};
    use crate::models::tool::Tool;
    use crate::providers::base::Usage;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn catalogue() -> ToolCatalogue {
        ToolCatalogue::new(vec![Tool::new(
            "computer_screenshot",
            "Take a screenshot of the desktop",
            json!({"type": "object", "properties": {}}),
        )])
        .unwrap()
    }

    async fn setup_mock_server(response: ResponseTemplate) -> (MockServer, QwenProvider) {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/compatible-mode/v1/chat/completions"))
            .and(header("authorization", "Bearer test_api_key"))
            .respond_with(response)
            .mount(&mock_server)
            .await;

        let config = QwenProviderConfig {
            base_url: format!("{}/compatible-mode/v1/", mock_server.uri()),
            api_key: "test_api_key".to_string(),
        };

        let provider = QwenProvider::new(config, catalogue()).unwrap();
        (mock_server, provider)
    }

    #[test]
    fn test_build_request() {
        let config = QwenProviderConfig {
            base_url: "http://localhost".to_string(),
            api_key: "k".to_string(),
        };
        let provider = QwenProvider::new(config, catalogue()).unwrap();
        let messages = vec![Message::user().with_text("Hello?")];

        let with_tools = serde_json::to_value(provider.build_request("sys", &messages, "qwen-max", true)).unwrap();
        assert_eq!(with_tools["model"], "qwen-max");
        assert_eq!(with_tools["max_tokens"], 8192);
        assert_eq!(with_tools["messages"][0], json!({"role": "system", "content": "sys"}));
        assert_eq!(with_tools["tools"][0]["function"]["name"], "computer_screenshot");

        let without_tools = serde_json::to_value(provider.build_request("sys", &messages, "qwen-max", false)).unwrap();
        assert!(without_tools.get("tools").is_none());
    }

    #[test]
    fn test_models() {
        assert_eq!(QWEN_MODELS.len(), 4);
        let default = QWEN_MODELS
            .iter()
            .find(|model| model.name == QWEN_DEFAULT_MODEL)
            .unwrap();
        assert_eq!(default.title, "Qwen Turbo");
        assert_eq!(default.context_window, 8192);
    }

    #[tokio::test]
    async fn test_complete_basic() -> anyhow::Result<()> {
        let response_body = json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "Hello! How can I assist you today?",
                    "tool_calls": null
                },
                "finish_reason": "stop"
            }],
            "usage": {
                "prompt_tokens": 12,
                "completion_tokens": 5,
                "total_tokens": 17
            }
        });

        let (_, provider) =
            setup_mock_server(ResponseTemplate::new(200).set_body_json(response_body)).await;

        let messages = vec![Message::user().with_text("Hello?")];
        let response = provider
            .generate_message(
                "You are a helpful assistant.",
                &messages,
                "qwen-turbo",
                true,
                CancellationToken::new(),
            )
            .await?;

        assert_eq!(
            response.content_blocks,
            vec![MessageContent::text("Hello! How can I assist you today?")]
        );
        assert_eq!(response.token_usage, Usage::new(12, 5, 17));
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_sends_translated_history() -> anyhow::Result<()> {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({
                "model": "qwen-plus",
                "max_tokens": 8192,
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "User performed action: computer_type_text\n{\n  \"text\": \"hi\"\n}"},
                    {"role": "tool", "tool_call_id": "call_1", "content": "done\n[Screenshot provided]"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "ok"}}]
            })))
            .mount(&mock_server)
            .await;

        let provider = QwenProvider::new(
            QwenProviderConfig {
                base_url: mock_server.uri(),
                api_key: "k".to_string(),
            },
            ToolCatalogue::empty(),
        )?;

        let messages = vec![
            Message::user().with_user_action(vec![UserActionContent::ToolUse(ToolUse {
                id: "ua".to_string(),
                name: "computer_type_text".to_string(),
                input: json!({"text": "hi"}),
                signature: None,
            })]),
            Message::user().with_tool_result(
                "call_1",
                vec![Content::text("done"), Content::image("abc", "image/png")],
                false,
            ),
        ];

        let response = provider
            .generate_message("sys", &messages, "qwen-plus", true, CancellationToken::new())
            .await?;

        assert_eq!(response.content_blocks, vec![MessageContent::text("ok")]);
        assert_eq!(response.token_usage, Usage::default());
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_tool_use_with_reasoning() -> anyhow::Result<()> {
        let response_body = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "reasoning_content": "I should look at the screen first",
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": {"name": "computer_screenshot", "arguments": "{}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 20, "completion_tokens": 15, "total_tokens": 35}
        });

        let (_, provider) =
            setup_mock_server(ResponseTemplate::new(200).set_body_json(response_body)).await;

        let response = provider
            .generate_message(
                "sys",
                &[Message::user().with_text("What is on screen?")],
                "qwen-max",
                true,
                CancellationToken::new(),
            )
            .await?;

        assert_eq!(response.content_blocks.len(), 2);
        assert_eq!(
            response.content_blocks[0].as_thinking().unwrap().reasoning,
            "I should look at the screen first"
        );
        let tool_use = response.content_blocks[1].as_tool_use().unwrap();
        assert_eq!(tool_use.id, "call_abc");
        assert_eq!(tool_use.name, "computer_screenshot");
        assert_eq!(tool_use.input, json!({}));
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_tool_use_with_null_arguments() -> anyhow::Result<()> {
        let response_body = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "c1",
                        "type": "function",
                        "function": {"name": "computer_screenshot", "arguments": null}
                    }]
                }
            }]
        });

        let (_, provider) =
            setup_mock_server(ResponseTemplate::new(200).set_body_json(response_body)).await;

        let response = provider
            .generate_message(
                "sys",
                &[Message::user().with_text("Take a screenshot")],
                "qwen-max",
                true,
                CancellationToken::new(),
            )
            .await?;

        let tool_use = response.content_blocks[0].as_tool_use().unwrap();
        assert_eq!(tool_use.id, "c1");
        assert_eq!(tool_use.input, json!({}));
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_choices_is_transport_failure() {
        let (_, provider) = setup_mock_server(
            ResponseTemplate::new(200).set_body_json(json!({"choices": [], "usage": {}})),
        )
        .await;

        let err = provider
            .generate_message("sys", &[], "qwen-turbo", false, CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ProviderError::Transport(TransportError::NoValidResponse("Qwen"))
        ));
    }

    #[tokio::test]
    async fn test_server_error() {
        let (_, provider) = setup_mock_server(ResponseTemplate::new(500)).await;

        let err = provider
            .generate_message("sys", &[], "qwen-turbo", false, CancellationToken::new())
            .await
            .unwrap_err();

        assert!(!err.is_cancelled());
        assert!(err.to_string().contains("Server error: 500"));
    }

    #[tokio::test]
    async fn test_cancel_in_flight() {
        let (_, provider) = setup_mock_server(
            ResponseTemplate::new(200)
                .set_body_json(json!({"choices": [{"message": {"content": "late"}}]}))
                .set_delay(Duration::from_secs(30)),
        )
        .await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result = provider
            .generate_message("sys", &[], "qwen-turbo", false, cancel)
            .await;

        assert!(matches!(result, Err(ProviderError::Cancelled)));
    }
}
