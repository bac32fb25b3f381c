use anyhow::{anyhow, Result};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;

use super::base::{Provider, ProviderStream};
use super::configs::{OllamaProviderConfig, OpenAiProviderConfig};
use super::utils::{
    check_openai_context_length_error, extract_sse_api_error_message, tools_to_openai_spec,
    turns_to_openai_spec, OpenAiStreamState,
};
use crate::models::tool::Tool;
use crate::models::turn::Turn;

/// Streaming client for OpenAI-compatible chat completion endpoints
pub struct OpenAiProvider {
    client: Client,
    host: String,
    api_key: Option<String>,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<i32>,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiProviderConfig) -> Result<Self> {
        Ok(Self {
            client: Self::client()?,
            host: config.host,
            api_key: Some(config.api_key),
            model: config.model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    pub fn from_ollama(config: OllamaProviderConfig) -> Result<Self> {
        Ok(Self {
            client: Self::client()?,
            host: config.host,
            api_key: None,
            model: config.model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    fn client() -> Result<Client> {
        // Only the connection is bounded here; generation deadlines belong to the orchestrator
        Ok(Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?)
    }

    fn payload(&self, system: &str, turns: &[Turn], tools: &[Tool]) -> Result<Value> {
        let mut payload = json!({
            "model": self.model,
            "messages": turns_to_openai_spec(system, turns),
            "stream": true,
        });

        let object = payload
            .as_object_mut()
            .ok_or_else(|| anyhow!("payload is not an object"))?;
        if !tools.is_empty() {
            object.insert("tools".to_string(), json!(tools_to_openai_spec(tools)?));
        }
        if let Some(temp) = self.temperature {
            object.insert("temperature".to_string(), json!(temp));
        }
        if let Some(tokens) = self.max_tokens {
            object.insert("max_tokens".to_string(), json!(tokens));
        }

        Ok(payload)
    }

    async fn post(&self, payload: Value) -> Result<Response> {
        let url = format!("{}/v1/chat/completions", self.host.trim_end_matches('/'));

        let mut request = self.client.post(&url).json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }
        let response = request.send().await?;

        match response.status() {
            StatusCode::OK => Ok(response),
            status if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 => {
                Err(anyhow!("Server error: {}", status))
            }
            status => {
                let body: Value = response.json().await.unwrap_or(Value::Null);
                if let Some(error) = body.get("error") {
                    if let Some(err) = check_openai_context_length_error(error) {
                        return Err(err.into());
                    }
                    return Err(anyhow!("OpenAI API error ({}): {}", status, error));
                }
                Err(anyhow!("Request failed: {}", status))
            }
        }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn stream(&self, system: &str, turns: &[Turn], tools: &[Tool]) -> Result<ProviderStream> {
        let payload = self.payload(system, turns, tools)?;
        let response = self.post(payload).await?;
        let mut events = response.bytes_stream().eventsource();

        let stream = async_stream::stream! {
            let mut state = OpenAiStreamState::new();
            let mut done = false;

            while let Some(event) = events.next().await {
                let event = match event {
                    Ok(event) => event,
                    Err(e) => {
                        yield Err(anyhow!("SSE stream error: {}", e));
                        return;
                    }
                };

                if event.data == "[DONE]" {
                    done = true;
                    break;
                }

                let chunk: Value = match serde_json::from_str(&event.data) {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(anyhow!("SSE parsing error: {}, data: {}", e, event.data));
                        return;
                    }
                };

                if let Some(message) = extract_sse_api_error_message(&chunk) {
                    yield Err(anyhow!("SSE API error: {}", message));
                    return;
                }

                for delta in state.apply(&chunk) {
                    yield Ok(delta);
                }
            }

            if !done && !state.finished() {
                yield Err(anyhow!("SSE stream closed before response completed"));
                return;
            }

            for event in state.finish() {
                yield Ok(event);
            }
        };

        Ok(Box::pin(stream))
    }
}
