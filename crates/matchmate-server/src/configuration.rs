use crate::error::{to_env_var, ConfigError};
use config::{Config, Environment};
use matchmate::agent::AgentConfig;
use matchmate::providers::{
    configs::{
        OllamaProviderConfig, OpenAiProviderConfig, ProviderConfig, OLLAMA_HOST, OLLAMA_MODEL,
        OPENAI_HOST, OPENAI_MODEL,
    },
    factory::ProviderType,
};
use serde::Deserialize;
use std::net::{AddrParseError, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum ProviderSettings {
    OpenAi {
        #[serde(default = "default_openai_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_openai_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
    },
    Ollama {
        #[serde(default = "default_ollama_host")]
        host: String,
        #[serde(default = "default_ollama_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
    },
}

impl ProviderSettings {
    pub fn provider_type(&self) -> ProviderType {
        match self {
            ProviderSettings::OpenAi { .. } => ProviderType::OpenAi,
            ProviderSettings::Ollama { .. } => ProviderType::Ollama,
        }
    }

    pub fn into_config(self) -> ProviderConfig {
        match self {
            ProviderSettings::OpenAi {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            } => ProviderConfig::OpenAi(OpenAiProviderConfig {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            }),
            ProviderSettings::Ollama {
                host,
                model,
                temperature,
                max_tokens,
            } => ProviderConfig::Ollama(OllamaProviderConfig {
                host,
                model,
                temperature,
                max_tokens,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_generation_timeout_secs")]
    pub generation_timeout_secs: u64,
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default = "default_max_concurrent_tools")]
    pub max_concurrent_tools: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            generation_timeout_secs: default_generation_timeout_secs(),
            tool_timeout_secs: default_tool_timeout_secs(),
            max_concurrent_tools: default_max_concurrent_tools(),
        }
    }
}

impl AgentSettings {
    pub fn to_config(&self) -> AgentConfig {
        AgentConfig {
            generation_timeout: Duration::from_secs(self.generation_timeout_secs),
            tool_timeout: Duration::from_secs(self.tool_timeout_secs),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DataSettings {
    #[serde(default = "default_opportunities_path")]
    pub opportunities_path: PathBuf,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            opportunities_path: default_opportunities_path(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub provider: ProviderSettings,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub data: DataSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            .add_source(
                Environment::with_prefix("MATCHMATE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let result: Result<Self, config::ConfigError> = config.try_deserialize();

        match result {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                if let Some(field) = missing_field(&err.to_string()) {
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(&field),
                    })
                } else if let config::ConfigError::NotFound(field) = &err {
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }
}

/// Pull the settings path out of "missing field `x`" (optionally "for key `y`")
fn missing_field(message: &str) -> Option<String> {
    let rest = message.strip_prefix("missing field `")?;
    let (field, rest) = rest.split_once('`')?;

    if let Some((key, _)) = rest
        .strip_prefix(" for key `")
        .and_then(|r| r.split_once('`'))
    {
        return Some(format!("{}.{}", key, field));
    }

    // Only the provider table has required fields
    match field {
        "type" | "api_key" => Some(format!("provider.{}", field)),
        other => Some(other.to_string()),
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_openai_host() -> String {
    OPENAI_HOST.to_string()
}

fn default_openai_model() -> String {
    OPENAI_MODEL.to_string()
}

fn default_ollama_host() -> String {
    OLLAMA_HOST.to_string()
}

fn default_ollama_model() -> String {
    OLLAMA_MODEL.to_string()
}

fn default_generation_timeout_secs() -> u64 {
    60
}

fn default_tool_timeout_secs() -> u64 {
    15
}

fn default_max_concurrent_tools() -> usize {
    8
}

fn default_opportunities_path() -> PathBuf {
    PathBuf::from("data/opportunities.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clean_env() {
        for (key, _) in env::vars() {
            if key.starts_with("MATCHMATE_") {
                env::remove_var(&key);
            }
        }
    }

    #[test]
    #[serial]
    fn test_default_settings() {
        clean_env();
        env::set_var("MATCHMATE_PROVIDER__TYPE", "openai");
        env::set_var("MATCHMATE_PROVIDER__API_KEY", "test-key");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.agent.generation_timeout_secs, 60);
        assert_eq!(settings.agent.tool_timeout_secs, 15);
        assert_eq!(settings.agent.max_concurrent_tools, 8);
        assert_eq!(
            settings.data.opportunities_path,
            PathBuf::from("data/opportunities.json")
        );
        assert_eq!(settings.provider.provider_type(), ProviderType::OpenAi);

        if let ProviderSettings::OpenAi {
            host,
            api_key,
            model,
            temperature,
            max_tokens,
        } = settings.provider
        {
            assert_eq!(host, "https://api.openai.com");
            assert_eq!(api_key, "test-key");
            assert_eq!(model, "gpt-4o-mini");
            assert_eq!(temperature, None);
            assert_eq!(max_tokens, None);
        } else {
            panic!("Expected OpenAI provider");
        }

        clean_env();
    }

    #[test]
    #[serial]
    fn test_ollama_settings() {
        clean_env();
        env::set_var("MATCHMATE_PROVIDER__TYPE", "ollama");
        env::set_var("MATCHMATE_PROVIDER__MODEL", "llama3.1");
        env::set_var("MATCHMATE_PROVIDER__TEMPERATURE", "0.2");

        let settings = Settings::new().unwrap();
        if let ProviderSettings::Ollama {
            host,
            model,
            temperature,
            max_tokens,
        } = settings.provider
        {
            assert_eq!(host, "http://localhost:11434");
            assert_eq!(model, "llama3.1");
            assert_eq!(temperature, Some(0.2));
            assert_eq!(max_tokens, None);
        } else {
            panic!("Expected Ollama provider");
        }

        clean_env();
    }

    #[test]
    #[serial]
    fn test_environment_override() {
        clean_env();
        env::set_var("MATCHMATE_SERVER__PORT", "8080");
        env::set_var("MATCHMATE_PROVIDER__TYPE", "openai");
        env::set_var("MATCHMATE_PROVIDER__API_KEY", "test-key");
        env::set_var("MATCHMATE_PROVIDER__HOST", "https://custom.openai.com");
        env::set_var("MATCHMATE_AGENT__GENERATION_TIMEOUT_SECS", "30");
        env::set_var("MATCHMATE_AGENT__TOOL_TIMEOUT_SECS", "5");
        env::set_var("MATCHMATE_AGENT__MAX_CONCURRENT_TOOLS", "2");
        env::set_var("MATCHMATE_DATA__OPPORTUNITIES_PATH", "/srv/opportunities.json");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.agent.max_concurrent_tools, 2);
        assert_eq!(
            settings.data.opportunities_path,
            PathBuf::from("/srv/opportunities.json")
        );

        let agent = settings.agent.to_config();
        assert_eq!(agent.generation_timeout, Duration::from_secs(30));
        assert_eq!(agent.tool_timeout, Duration::from_secs(5));

        match settings.provider.into_config() {
            ProviderConfig::OpenAi(config) => {
                assert_eq!(config.host, "https://custom.openai.com");
                assert_eq!(config.api_key, "test-key");
            }
            other => panic!("Expected OpenAI provider, got {:?}", other),
        }

        clean_env();
    }

    #[test]
    #[serial]
    fn test_missing_provider_names_the_variable() {
        clean_env();

        match Settings::new() {
            Err(ConfigError::MissingEnvVar { env_var }) => {
                assert!(env_var.starts_with("MATCHMATE_PROVIDER"), "{}", env_var)
            }
            other => panic!("Expected a missing variable error, got {:?}", other),
        }

        env::set_var("MATCHMATE_PROVIDER__TYPE", "openai");
        match Settings::new() {
            Err(ConfigError::MissingEnvVar { env_var }) => {
                assert_eq!(env_var, "MATCHMATE_PROVIDER__API_KEY")
            }
            other => panic!("Expected a missing variable error, got {:?}", other),
        }

        clean_env();
    }

    #[test]
    fn test_missing_field_parsing() {
        assert_eq!(missing_field("missing field `type`"), Some("provider.type".into()));
        assert_eq!(
            missing_field("missing field `model` for key `provider`"),
            Some("provider.model".into())
        );
        assert_eq!(missing_field("invalid type: string"), None);
    }

    #[test]
    fn test_socket_addr_conversion() {
        let server_settings = ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 3000,
        };
        let addr = server_settings.socket_addr().unwrap();
        assert_eq!(addr.to_string(), "127.0.0.1:3000");

        let invalid = ServerSettings {
            host: "not a host".to_string(),
            port: 3000,
        };
        assert!(invalid.socket_addr().is_err());
    }
}
