//! OpenAI-compatible chat-completion client (the surface DeepInfra exposes).

use std::time::Duration;

use async_trait::async_trait;
use promobot_agent::{CompletionClient, CompletionError};
use promobot_core::config::LlmConfig;
use promobot_core::{Message, Role};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

#[derive(Clone)]
pub struct HttpCompletionClient {
    http: Client,
    base_url: String,
    model: String,
    temperature: f32,
    api_key: Option<SecretString>,
}

impl HttpCompletionClient {
    pub fn new(config: &LlmConfig) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            model: config.model.clone(),
            temperature: config.temperature,
            api_key: config.api_key.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, CompletionError> {
        let url = format!("{}/v1/openai/chat/completions", self.base_url);
        let body = ChatCompletionRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: messages
                .iter()
                .map(|message| WireMessage { role: wire_role(message.role), content: &message.text })
                .collect(),
        };

        let mut request = self.http.post(&url).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|error| CompletionError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CompletionError::Status { code: status.as_u16() });
        }

        let payload: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|error| CompletionError::MalformedResponse(error.to_string()))?;

        payload
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| {
                CompletionError::MalformedResponse("response contained no choices".to_owned())
            })
    }
}
