use async_trait::async_trait;
use std::sync::Arc;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::errors::{ProviderError, ProviderResult};
use crate::models::message::{Message, MessageContent};
use crate::providers::base::{AgentResponse, Provider, Usage};

/// A mock provider that returns pre-configured responses for testing
pub struct MockProvider {
    responses: Arc<Mutex<Vec<Vec<MessageContent>>>>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of responses
    pub fn new(responses: Vec<Vec<MessageContent>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &'static str {
        "Mock"
    }

    async fn generate_message(
        &self,
        _system: &str,
        _messages: &[Message],
        _model: &str,
        _use_tools: bool,
        cancel: CancellationToken,
    ) -> ProviderResult<AgentResponse> {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        let mut responses = self.responses.lock().unwrap();
        let content_blocks = if responses.is_empty() {
            // Return empty response if no more pre-configured responses
            Vec::new()
        } else {
            responses.remove(0)
        };
        Ok(AgentResponse {
            content_blocks,
            token_usage: Usage::default(),
        })
    }
}

