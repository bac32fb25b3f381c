use super::{base::Provider, configs::ProviderConfig, openai::OpenAiProvider};
use anyhow::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    OpenAi,
    Ollama,
}

impl From<&ProviderConfig> for ProviderType {
    fn from(config: &ProviderConfig) -> Self {
        match config {
            ProviderConfig::OpenAi(_) => ProviderType::OpenAi,
            ProviderConfig::Ollama(_) => ProviderType::Ollama,
        }
    }
}

pub fn get_provider(config: ProviderConfig) -> Result<Box<dyn Provider>> {
    match config {
        ProviderConfig::OpenAi(openai_config) => Ok(Box::new(OpenAiProvider::new(openai_config)?)),
        // Ollama serves the same streaming chat completions API, without auth
        ProviderConfig::Ollama(ollama_config) => {
            Ok(Box::new(OpenAiProvider::from_ollama(ollama_config)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::configs::{OllamaProviderConfig, OLLAMA_HOST, OLLAMA_MODEL};

    #[test]
    fn test_ollama_config_builds_provider() {
        let config = ProviderConfig::Ollama(OllamaProviderConfig {
            host: OLLAMA_HOST.to_string(),
            model: OLLAMA_MODEL.to_string(),
            temperature: None,
            max_tokens: None,
        });
        assert_eq!(ProviderType::from(&config), ProviderType::Ollama);
        assert!(get_provider(config).is_ok());
    }
}
