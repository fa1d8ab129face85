use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use risepal_core::config::{LlmConfig, LlmProvider};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const ANTHROPIC_DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_OUTPUT_TOKENS: u32 = 512;

#[derive(Clone, Debug)]
enum Endpoint {
    /// `/chat/completions` as served by OpenAI and by Ollama's compatibility layer.
    ChatCompletions { url: String },
    AnthropicMessages { url: String },
}

/// Completion client for the hosted providers. Transport failures, 429 and 5xx
/// responses are retried with exponential backoff up to `max_retries` times.
pub struct HttpLlmClient {
    client: reqwest::Client,
    endpoint: Endpoint,
    model: String,
    api_key: Option<SecretString>,
    max_retries: u32,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .context("failed to build completion http client")?;

        let base_url = config.base_url.as_deref().map(|url| url.trim_end_matches('/'));
        let endpoint = match config.provider {
            LlmProvider::OpenAi => Endpoint::ChatCompletions {
                url: format!("{}/chat/completions", base_url.unwrap_or(OPENAI_DEFAULT_BASE_URL)),
            },
            LlmProvider::Ollama => {
                let base = base_url.ok_or_else(|| anyhow!("llm.base_url is required for ollama"))?;
                let base = if base.ends_with("/v1") { base.to_string() } else { format!("{base}/v1") };
                Endpoint::ChatCompletions { url: format!("{base}/chat/completions") }
            }
            LlmProvider::Anthropic => Endpoint::AnthropicMessages {
                url: format!("{}/v1/messages", base_url.unwrap_or(ANTHROPIC_DEFAULT_BASE_URL)),
            },
        };

        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            max_retries: config.max_retries,
        })
    }

    fn request(&self, prompt: &str) -> reqwest::RequestBuilder {
        match &self.endpoint {
            Endpoint::ChatCompletions { url } => {
                let body = json!({
                    "model": self.model,
                    "temperature": 0.2,
                    "messages": [{ "role": "user", "content": prompt }],
                });
                let builder = self.client.post(url).json(&body);
                match &self.api_key {
                    Some(key) => builder.bearer_auth(key.expose_secret()),
                    None => builder,
                }
            }
            Endpoint::AnthropicMessages { url } => {
                let body = json!({
                    "model": self.model,
                    "max_tokens": MAX_OUTPUT_TOKENS,
                    "messages": [{ "role": "user", "content": prompt }],
                });
                let key = self.api_key.as_ref().map(|key| key.expose_secret().to_string());
                self.client
                    .post(url)
                    .header("x-api-key", key.unwrap_or_default())
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .json(&body)
            }
        }
    }

    fn parse(&self, body: &str) -> Result<String> {
        let text = match &self.endpoint {
            Endpoint::ChatCompletions { .. } => {
                let parsed: ChatCompletionResponse =
                    serde_json::from_str(body).context("malformed chat completion response")?;
                parsed
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.message.content)
                    .ok_or_else(|| anyhow!("chat completion response had no content"))?
            }
            Endpoint::AnthropicMessages { .. } => {
                let parsed: AnthropicResponse =
                    serde_json::from_str(body).context("malformed anthropic response")?;
                parsed
                    .content
                    .into_iter()
                    .filter(|block| block.kind == "text")
                    .filter_map(|block| block.text)
                    .collect::<Vec<_>>()
                    .join("")
            }
        };

        if text.trim().is_empty() {
            bail!("completion service returned an empty answer");
        }
        Ok(text)
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut attempt = 0u32;
        loop {
            let outcome = self.request(prompt).send().await;
            let retryable = match outcome {
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.context("failed to read completion body")?;
                    if status.is_success() {
                        return self.parse(&body);
                    }
                    if status.as_u16() != 429 && !status.is_server_error() {
                        bail!("completion service returned HTTP {}: {}", status.as_u16(), body);
                    }
                    anyhow!("completion service returned HTTP {}", status.as_u16())
                }
                Err(error) => anyhow!(error).context("completion transport failure"),
            };

            if attempt >= self.max_retries {
                return Err(retryable);
            }
            attempt += 1;
            tracing::warn!(
                event_name = "llm.request.retry",
                attempt,
                error = %retryable,
                "retrying completion request"
            );
            tokio::time::sleep(Duration::from_millis(250 * 2u64.pow(attempt.min(5)))).await;
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Clone, Debug)]
enum ScriptedResponse {
    Text(String),
    Failure(String),
}

struct ScriptRule {
    marker: String,
    responses: Vec<ScriptedResponse>,
    cursor: AtomicUsize,
}

/// Deterministic client for tests and offline runs. Each rule matches prompts
/// containing its marker and plays its responses in order, repeating the last
/// one once exhausted. The first matching rule wins.
#[derive(Default)]
pub struct ScriptedLlmClient {
    rules: Vec<ScriptRule>,
    fallback: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, marker: impl Into<String>, response: impl Into<String>) -> Self {
        self.push(marker.into(), ScriptedResponse::Text(response.into()))
    }

    pub fn failing_on(self, marker: impl Into<String>, error: impl Into<String>) -> Self {
        self.push(marker.into(), ScriptedResponse::Failure(error.into()))
    }

    pub fn with_fallback(mut self, response: impl Into<String>) -> Self {
        self.fallback = Some(response.into());
        self
    }

    /// Every prompt received so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        match self.prompts.lock() {
            Ok(prompts) => prompts.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn calls_matching(&self, marker: &str) -> usize {
        self.prompts().iter().filter(|prompt| prompt.contains(marker)).count()
    }

    fn push(mut self, marker: String, response: ScriptedResponse) -> Self {
        match self.rules.iter_mut().find(|rule| rule.marker == marker) {
            Some(rule) => rule.responses.push(response),
            None => self.rules.push(ScriptRule {
                marker,
                responses: vec![response],
                cursor: AtomicUsize::new(0),
            }),
        }
        self
    }

    fn record(&self, prompt: &str) {
        match self.prompts.lock() {
            Ok(mut prompts) => prompts.push(prompt.to_string()),
            Err(poisoned) => poisoned.into_inner().push(prompt.to_string()),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.record(prompt);

        let Some(rule) = self.rules.iter().find(|rule| prompt.contains(&rule.marker)) else {
            return self.fallback.clone().ok_or_else(|| anyhow!("no scripted response for prompt"));
        };

        let index = rule.cursor.fetch_add(1, Ordering::SeqCst).min(rule.responses.len() - 1);
        match &rule.responses[index] {
            ScriptedResponse::Text(text) => Ok(text.clone()),
            ScriptedResponse::Failure(error) => Err(anyhow!(error.clone())),
        }
    }
}
