use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::base::{log_outcome, AgentResponse, Provider, MAX_OUTPUT_TOKENS};
use super::configs::OpenAiProviderConfig;
use super::transport;
use super::utils::{
    check_openai_error, first_message, get_openai_usage, messages_to_openai_spec,
    openai_message_to_content, tools_to_openai_spec, ChatCompletionRequest, ReasoningFormat,
};
use crate::errors::ProviderResult;
use crate::models::message::Message;
use crate::models::tool::ToolCatalogue;

const PROVIDER_NAME: &str = "OpenAI";

pub struct OpenAiProvider {
    client: Client,
    config: OpenAiProviderConfig,
    tools: ToolCatalogue,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiProviderConfig, tools: ToolCatalogue) -> Result<Self> {
        let client = transport::build_client()?;
        Ok(Self {
            client,
            config,
            tools,
        })
    }

    async fn post(
        &self,
        payload: &ChatCompletionRequest,
        cancel: &CancellationToken,
    ) -> ProviderResult<Value> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.host.trim_end_matches('/')
        );

        let request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
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
        // OpenAI rejects reasoning replayed on assistant turns, so thinking stays local
        let payload = ChatCompletionRequest {
            model: model.to_string(),
            messages: messages_to_openai_spec(system, messages, ReasoningFormat::Omit),
            max_tokens: MAX_OUTPUT_TOKENS,
            tools: (use_tools && !self.tools.is_empty()).then(|| tools_to_openai_spec(&self.tools)),
        };
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
impl Provider for OpenAiProvider {
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
