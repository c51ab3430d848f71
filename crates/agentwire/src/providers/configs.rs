use anyhow::{anyhow, Result};
use std::env;

pub const ANTHROPIC_HOST: &str = "https://api.anthropic.com";
pub const OPENAI_HOST: &str = "https://api.openai.com";
pub const GOOGLE_HOST: &str = "https://generativelanguage.googleapis.com";
pub const QWEN_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";

/// Placeholder key used when the Qwen key is absent, so the adapter can still be built
const QWEN_PLACEHOLDER_KEY: &str = "dummy";

// Unified enum to wrap different provider configurations
#[derive(Debug, Clone)]
pub enum ProviderConfig {
    Anthropic(AnthropicProviderConfig),
    OpenAi(OpenAiProviderConfig),
    Google(GoogleProviderConfig),
    Qwen(QwenProviderConfig),
}

pub trait EnvConfig {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self>
    where
        Self: Sized;

    /// Helper function to get environment variables with error handling
    fn get_env(key: &str, required: bool, default: Option<String>) -> Result<Option<String>> {
        match env::var(key) {
            Ok(value) => Ok(Some(value)),
            Err(env::VarError::NotPresent) if !required => Ok(default),
            Err(env::VarError::NotPresent) => Err(anyhow!(
                "Environment variable '{}' is required but not set.",
                key
            )),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnthropicProviderConfig {
    pub host: String,
    pub api_key: String,
}

impl EnvConfig for AnthropicProviderConfig {
    fn from_env() -> Result<Self> {
        let api_key = Self::get_env("ANTHROPIC_API_KEY", true, None)?
            .ok_or_else(|| anyhow!("Anthropic API key should be present"))?;
        let host = Self::get_env("ANTHROPIC_HOST", false, Some(ANTHROPIC_HOST.to_string()))?
            .unwrap_or_else(|| ANTHROPIC_HOST.to_string());

        Ok(Self { host, api_key })
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiProviderConfig {
    pub host: String,
    pub api_key: String,
}

impl EnvConfig for OpenAiProviderConfig {
    fn from_env() -> Result<Self> {
        let api_key = Self::get_env("OPENAI_API_KEY", true, None)?
            .ok_or_else(|| anyhow!("OpenAI API key should be present"))?;
        let host = Self::get_env("OPENAI_HOST", false, Some(OPENAI_HOST.to_string()))?
            .unwrap_or_else(|| OPENAI_HOST.to_string());

        Ok(Self { host, api_key })
    }
}

#[derive(Debug, Clone)]
pub struct GoogleProviderConfig {
    pub host: String,
    pub api_key: String,
}

impl EnvConfig for GoogleProviderConfig {
    fn from_env() -> Result<Self> {
        let api_key = Self::get_env("GEMINI_API_KEY", true, None)?
            .ok_or_else(|| anyhow!("Gemini API key should be present"))?;
        let host = Self::get_env("GEMINI_HOST", false, Some(GOOGLE_HOST.to_string()))?
            .unwrap_or_else(|| GOOGLE_HOST.to_string());

        Ok(Self { host, api_key })
    }
}

/// Qwen through the DashScope OpenAI-compatible endpoint.
/// `base_url` already carries the API version segment.
#[derive(Debug, Clone)]
pub struct QwenProviderConfig {
    pub base_url: String,
    pub api_key: String,
}

impl EnvConfig for QwenProviderConfig {
    fn from_env() -> Result<Self> {
        let api_key = match Self::get_env("QWEN_API_KEY", false, None)? {
            Some(key) if !key.is_empty() => key,
            _ => {
                tracing::warn!("QWEN_API_KEY is not set. The Qwen provider will not work properly.");
                QWEN_PLACEHOLDER_KEY.to_string()
            }
        };
        let base_url = match Self::get_env("QWEN_BASE_URL", false, None)? {
            Some(url) if !url.is_empty() => url,
            _ => QWEN_BASE_URL.to_string(),
        };

        Ok(Self { base_url, api_key })
    }
}
