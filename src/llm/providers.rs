use super::{ChatMessage, LLM, LLMConfig, LLMProvider, LLMResponse};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

fn build_client(config: &LLMConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .build()?)
}

/// Provider for the chat completions wire format (LMStudio, OpenAI and compatibles)
pub struct ChatCompletionsProvider {
    config: LLMConfig,
    client: reqwest::Client,
    kind: LLMProvider,
    url: String,
}

#[derive(Debug, Serialize)]
struct CompletionsRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionsResponse {
    choices: Vec<CompletionsChoice>,
    usage: Option<CompletionsUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionsChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionsUsage {
    total_tokens: u32,
}

impl ChatCompletionsProvider {
    /// Local LMStudio server; no key, endpoint required
    pub fn lm_studio(config: LLMConfig) -> Result<Self> {
        let url = config
            .endpoint
            .clone()
            .ok_or_else(|| anyhow!("LMStudio endpoint not configured"))?;
        let client = build_client(&config)?;

        Ok(Self {
            config,
            client,
            kind: LLMProvider::LMStudio,
            url,
        })
    }

    /// OpenAI, or a compatible API when `endpoint` is set
    pub fn openai(config: LLMConfig) -> Result<Self> {
        if config.api_key.is_none() {
            return Err(anyhow!("OpenAI API key required"));
        }

        let url = config
            .endpoint
            .clone()
            .unwrap_or_else(|| OPENAI_CHAT_URL.to_string());
        let client = build_client(&config)?;

        Ok(Self {
            config,
            client,
            kind: LLMProvider::OpenAI,
            url,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Model listing URL next to the completions endpoint
    pub fn models_url(&self) -> String {
        self.url.replace("/chat/completions", "/models")
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(api_key) => request.bearer_auth(api_key),
            None => request,
        }
    }
}

#[async_trait]
impl LLM for ChatCompletionsProvider {
    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<LLMResponse> {
        let request = CompletionsRequest {
            model: &self.config.model,
            messages: &messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        debug!("Sending {} messages to {:?} at {}", messages.len(), self.kind, self.url);

        let response = self
            .authorize(self.client.post(&self.url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("{:?} API error {}: {}", self.kind, status, text));
        }

        let body: CompletionsResponse = response.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("No response from {:?}", self.kind))?;

        Ok(LLMResponse {
            content,
            tokens_used: body.usage.map(|u| u.total_tokens),
        })
    }

    async fn is_available(&self) -> bool {
        match self.authorize(self.client.get(self.models_url())).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    fn provider_type(&self) -> LLMProvider {
        self.kind.clone()
    }
}

/// Gemini provider implementation
pub struct GeminiProvider {
    config: LLMConfig,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Debug, Deserialize)]
struct GeminiUsage {
    #[serde(rename = "totalTokenCount")]
    total_token_count: u32,
}

impl GeminiProvider {
    pub fn new(config: LLMConfig) -> Result<Self> {
        if config.api_key.is_none() {
            return Err(anyhow!("Gemini API key required"));
        }

        let client = build_client(&config)?;
        Ok(Self { config, client })
    }

    /// System messages become the system instruction; the rest become user turns
    fn build_request(&self, messages: &[ChatMessage]) -> GeminiRequest {
        let system_text = messages
            .iter()
            .filter(|msg| msg.role == "system")
            .map(|msg| msg.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let contents = messages
            .iter()
            .filter(|msg| msg.role != "system")
            .map(|msg| GeminiContent {
                role: Some(if msg.role == "assistant" { "model" } else { "user" }.to_string()),
                parts: vec![GeminiPart {
                    text: msg.content.clone(),
                }],
            })
            .collect();

        GeminiRequest {
            system_instruction: (!system_text.is_empty()).then(|| GeminiContent {
                role: None,
                parts: vec![GeminiPart { text: system_text }],
            }),
            contents,
            generation_config: GeminiGenerationConfig {
                max_output_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
            },
        }
    }
}

#[async_trait]
impl LLM for GeminiProvider {
    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<LLMResponse> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| anyhow!("Gemini API key not configured"))?;

        let request = self.build_request(&messages);
        let url = format!("{}/{}:generateContent", GEMINI_BASE_URL, self.config.model);

        debug!("Sending request to Gemini model {}", self.config.model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Gemini API error {}: {}", status, text));
        }

        let body: GeminiResponse = response.json().await?;
        let content = body
            .candidates
            .first()
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<String>()
            })
            .ok_or_else(|| anyhow!("No response from Gemini"))?;

        Ok(LLMResponse {
            content,
            tokens_used: body.usage_metadata.map(|u| u.total_token_count),
        })
    }

    async fn is_available(&self) -> bool {
        let Some(api_key) = &self.config.api_key else {
            return false;
        };

        match self
            .client
            .get(GEMINI_BASE_URL)
            .header("x-goog-api-key", api_key)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    fn provider_type(&self) -> LLMProvider {
        LLMProvider::Gemini
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyed(provider: LLMProvider) -> LLMConfig {
        LLMConfig {
            provider,
            api_key: Some("key".to_string()),
            endpoint: None,
            ..LLMConfig::default()
        }
    }

    #[test]
    fn test_cloud_providers_require_key() {
        assert!(ChatCompletionsProvider::openai(LLMConfig::default()).is_err());
        assert!(GeminiProvider::new(LLMConfig::default()).is_err());
    }

    #[test]
    fn test_lm_studio_requires_endpoint() {
        let config = LLMConfig {
            endpoint: None,
            ..LLMConfig::default()
        };
        assert!(ChatCompletionsProvider::lm_studio(config).is_err());

        let provider = ChatCompletionsProvider::lm_studio(LLMConfig::default()).unwrap();
        assert_eq!(provider.models_url(), "http://localhost:1234/v1/models");
        assert_eq!(provider.provider_type(), LLMProvider::LMStudio);
    }

    #[test]
    fn test_openai_endpoint_override() {
        let provider = ChatCompletionsProvider::openai(keyed(LLMProvider::OpenAI)).unwrap();
        assert_eq!(provider.url(), OPENAI_CHAT_URL);

        let mut config = keyed(LLMProvider::OpenAI);
        config.endpoint = Some("https://llm.example.com/v1/chat/completions".to_string());
        let provider = ChatCompletionsProvider::openai(config).unwrap();
        assert_eq!(provider.models_url(), "https://llm.example.com/v1/models");
    }

    #[test]
    fn test_gemini_request_splits_system_prompt() {
        let provider = GeminiProvider::new(keyed(LLMProvider::Gemini)).unwrap();
        let request = provider.build_request(&[
            ChatMessage::system("be terse"),
            ChatMessage::user("hello"),
        ]);

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "be terse");
        assert_eq!(json["contents"].as_array().unwrap().len(), 1);
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 1024);
    }
}
