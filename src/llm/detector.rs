/// Ad detection over a chat LLM
use super::{create_llm, ChatMessage, LLMConfig, LLM};
use crate::collaborators::{AiProvider, DetectionRequest};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tracing::{debug, info};

const DETECTION_PROMPT: &str = r#"You review video subtitles and decide whether the video contains a sponsored advertisement segment.

Input is JSON with the video title, the pinned comment, facts about links in the pinned comment, and the subtitles keyed by line index.

A segment counts as an ad only if the creator promotes a product, app, shop or service in exchange for sponsorship. Product reviews and the creator's own channel announcements do not count.

Reply with a single JSON object and nothing else:
{"exist": <true|false>, "good_name": ["<advertised product>", ...], "index_lists": [[<first line index>, <last line index>], ...]}

Use an empty index_lists when there is no ad."#;

const RESTRICTED_SUFFIX: &str = r#"

The pinned comment links an official product listing. The advertised products are listed in "good_names"; only mark segments that promote these products."#;

const PRODUCT_NAME_PROMPT: &str = "Extract the name of the advertised product from the text. Reply with the product name only, no quotes or explanation.";

/// [`AiProvider`] backed by any configured LLM
pub struct LlmAdDetector {
    llm: Box<dyn LLM>,
}

impl LlmAdDetector {
    /// Create a detector for the configured provider
    pub fn new(config: &LLMConfig) -> Result<Self> {
        let llm = create_llm(config)?;
        info!("✅ Ad detector initialized with {:?} provider", config.provider);
        Ok(Self { llm })
    }

    pub fn with_llm(llm: Box<dyn LLM>) -> Self {
        Self { llm }
    }

    pub async fn is_available(&self) -> bool {
        self.llm.is_available().await
    }

    /// Messages sent for a detection request
    pub fn build_messages(request: &DetectionRequest) -> Result<Vec<ChatMessage>> {
        let system = match request.good_names {
            Some(_) => format!("{}{}", DETECTION_PROMPT, RESTRICTED_SUFFIX),
            None => DETECTION_PROMPT.to_string(),
        };
        let payload = serde_json::to_string_pretty(request)?;

        Ok(vec![ChatMessage::system(system), ChatMessage::user(payload)])
    }
}

#[async_trait]
impl AiProvider for LlmAdDetector {
    async fn detect(&self, request: &DetectionRequest) -> Result<String> {
        let messages = Self::build_messages(request)?;
        debug!(
            "Requesting ad detection for \"{}\" with {} caption lines",
            request.title,
            request.captions.len()
        );

        let response = self.llm.chat(messages).await?;
        if let Some(tokens) = response.tokens_used {
            debug!("Detection used {} tokens", tokens);
        }
        Ok(response.content)
    }

    async fn extract_product_name(&self, ad_text: &str) -> Result<String> {
        let messages = vec![ChatMessage::system(PRODUCT_NAME_PROMPT), ChatMessage::user(ad_text)];
        let response = self.llm.chat(messages).await?;

        let name = response
            .content
            .trim()
            .trim_matches(|c: char| matches!(c, '"' | '\'' | '“' | '”' | '`'))
            .trim()
            .to_string();

        if name.is_empty() {
            return Err(anyhow!("Empty product name returned"));
        }
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LLMProvider, LLMResponse};
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    struct ScriptedLlm {
        reply: String,
        seen: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
    }

    #[async_trait]
    impl LLM for ScriptedLlm {
        async fn chat(&self, messages: Vec<ChatMessage>) -> Result<LLMResponse> {
            self.seen.lock().unwrap().push(messages);
            Ok(LLMResponse {
                content: self.reply.clone(),
                tokens_used: Some(42),
            })
        }

        async fn is_available(&self) -> bool {
            true
        }

        fn provider_type(&self) -> LLMProvider {
            LLMProvider::LMStudio
        }
    }

    fn scripted_detector(reply: &str) -> (LlmAdDetector, Arc<Mutex<Vec<Vec<ChatMessage>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let llm = ScriptedLlm {
            reply: reply.to_string(),
            seen: seen.clone(),
        };
        (LlmAdDetector::with_llm(Box::new(llm)), seen)
    }

    fn request() -> DetectionRequest {
        DetectionRequest {
            title: "Desk setup tour".to_string(),
            top_comment: Some("Keyboard link below".to_string()),
            link_messages: BTreeMap::new(),
            captions: BTreeMap::from([(0, "hi".to_string()), (1, "this keyboard".to_string())]),
            good_names: None,
        }
    }

    #[tokio::test]
    async fn test_detect_returns_raw_reply() {
        let (detector, seen) = scripted_detector("```json\n{\"exist\": false}\n```");
        let reply = detector.detect(&request()).await.unwrap();
        assert!(reply.starts_with("```json"));

        let calls = seen.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][0].role, "system");
        assert!(calls[0][1].content.contains("Desk setup tour"));
        assert!(calls[0][1].content.contains("this keyboard"));
    }

    #[test]
    fn test_restricted_payload_carries_product_names() {
        let mut restricted = request();
        restricted.good_names = Some(vec!["Keyboard K2".to_string()]);

        let messages = LlmAdDetector::build_messages(&restricted).unwrap();
        assert!(messages[0].content.contains("good_names"));
        assert!(messages[1].content.contains("Keyboard K2"));

        let messages = LlmAdDetector::build_messages(&request()).unwrap();
        assert!(!messages[1].content.contains("good_names"));
    }

    #[tokio::test]
    async fn test_extract_product_name_strips_quotes() {
        let (detector, _) = scripted_detector("  \"Keyboard K2\"\n");
        assert_eq!(detector.extract_product_name("ad text").await.unwrap(), "Keyboard K2");

        let (detector, _) = scripted_detector("  ");
        assert!(detector.extract_product_name("ad text").await.is_err());
    }
}
