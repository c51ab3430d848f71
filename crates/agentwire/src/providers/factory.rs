use super::{
    anthropic::AnthropicProvider,
    base::Provider,
    configs::{
        AnthropicProviderConfig, EnvConfig, GoogleProviderConfig, OpenAiProviderConfig,
        ProviderConfig, QwenProviderConfig,
    },
    google::GoogleProvider,
    openai::OpenAiProvider,
    qwen::QwenProvider,
};
use crate::models::tool::ToolCatalogue;
use anyhow::Result;
use strum_macros::{Display, EnumIter, EnumString};

#[derive(EnumIter, EnumString, Display, Debug, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "lowercase")]
pub enum ProviderType {
    Anthropic,
    OpenAi,
    Google,
    Qwen,
}

impl ProviderConfig {
    /// Load the configuration of the given backend from the environment
    pub fn from_env(provider_type: ProviderType) -> Result<Self> {
        Ok(match provider_type {
            ProviderType::Anthropic => ProviderConfig::Anthropic(AnthropicProviderConfig::from_env()?),
            ProviderType::OpenAi => ProviderConfig::OpenAi(OpenAiProviderConfig::from_env()?),
            ProviderType::Google => ProviderConfig::Google(GoogleProviderConfig::from_env()?),
            ProviderType::Qwen => ProviderConfig::Qwen(QwenProviderConfig::from_env()?),
        })
    }

    pub fn provider_type(&self) -> ProviderType {
        match self {
            ProviderConfig::Anthropic(_) => ProviderType::Anthropic,
            ProviderConfig::OpenAi(_) => ProviderType::OpenAi,
            ProviderConfig::Google(_) => ProviderType::Google,
            ProviderConfig::Qwen(_) => ProviderType::Qwen,
        }
    }
}

pub fn get_provider(config: ProviderConfig, tools: ToolCatalogue) -> Result<Box<dyn Provider>> {
    match config {
        ProviderConfig::Anthropic(anthropic_config) => {
            Ok(Box::new(AnthropicProvider::new(anthropic_config, tools)?))
        }
        ProviderConfig::OpenAi(openai_config) => Ok(Box::new(OpenAiProvider::new(openai_config, tools)?)),
        ProviderConfig::Google(google_config) => Ok(Box::new(GoogleProvider::new(google_config, tools)?)),
        ProviderConfig::Qwen(qwen_config) => Ok(Box::new(QwenProvider::new(qwen_config, tools)?)),
    }
}
