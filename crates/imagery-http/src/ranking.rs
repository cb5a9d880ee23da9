//! OpenAI-compatible chat-completions ranking client.
//!
//! Sends the rendered ranking prompt as one user message, asks for a JSON
//! object back and parses it with [`parse_ranking_reply`]. Token usage comes
//! from the response's `usage` block; cost is priced per million tokens.

use std::time::Duration;

use async_trait::async_trait;
use imagery_core::curator::{parse_ranking_reply, render_ranking_prompt};
use imagery_core::{ConfigError, RankingError, RankingRequest, RankingService, RawRankingResponse, Usage};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::env_parse;
use crate::error::{ranking_error, Result};

const SYSTEM_PROMPT: &str =
    "You are a photo editor for a games publication. You answer with JSON only.";

/// Endpoint, model and pricing for the ranking client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRankingConfig {
    /// Base URL up to and including the API version, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
    pub temperature: f32,
    pub max_tokens: u32,
    /// USD per million prompt tokens.
    pub input_price_per_million: f64,
    /// USD per million completion tokens.
    pub output_price_per_million: f64,
}

impl Default for ChatRankingConfig {
    fn default() -> Self {
        ChatRankingConfig {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            timeout: Duration::from_secs(90),
            temperature: 0.2,
            max_tokens: 4096,
            input_price_per_million: 0.15,
            output_price_per_million: 0.60,
        }
    }
}

impl ChatRankingConfig {
    /// Defaults overridden by `IMAGERY_RANKING_*` variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("IMAGERY_RANKING_BASE_URL") {
            if !url.trim().is_empty() {
                config.base_url = url.trim().to_string();
            }
        }
        config.api_key = std::env::var("IMAGERY_RANKING_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());
        if let Ok(model) = std::env::var("IMAGERY_RANKING_MODEL") {
            if !model.trim().is_empty() {
                config.model = model.trim().to_string();
            }
        }
        if let Some(secs) = env_parse::<u64>("IMAGERY_RANKING_TIMEOUT_SECS") {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(t) = env_parse::<f32>("IMAGERY_RANKING_TEMPERATURE") {
            config.temperature = t;
        }
        if let Some(n) = env_parse::<u32>("IMAGERY_RANKING_MAX_TOKENS") {
            config.max_tokens = n;
        }
        if let Some(p) = env_parse::<f64>("IMAGERY_RANKING_INPUT_PRICE") {
            config.input_price_per_million = p;
        }
        if let Some(p) = env_parse::<f64>("IMAGERY_RANKING_OUTPUT_PRICE") {
            config.output_price_per_million = p;
        }
        config
    }

    pub fn new(base_url: &str, model: &str) -> Self {
        ChatRankingConfig {
            base_url: base_url.to_string(),
            model: model.to_string(),
            ..Self::default()
        }
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = Some(api_key.to_string());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_prices(mut self, input_per_million: f64, output_per_million: f64) -> Self {
        self.input_price_per_million = input_per_million;
        self.output_price_per_million = output_per_million;
        self
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        url::Url::parse(&self.base_url).map_err(|e| ConfigError::Invalid {
            field: "ranking.base_url",
            reason: e.to_string(),
        })?;
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "ranking.model",
                reason: "must not be empty".to_string(),
            });
        }
        if self.input_price_per_million < 0.0 || self.output_price_per_million < 0.0 {
            return Err(ConfigError::Invalid {
                field: "ranking.prices",
                reason: "must not be negative".to_string(),
            });
        }
        Ok(())
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    pub fn cost_usd(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        (prompt_tokens as f64 * self.input_price_per_million
            + completion_tokens as f64 * self.output_price_per_million)
            / 1_000_000.0
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// [`RankingService`] over a chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct ChatRankingClient {
    config: ChatRankingConfig,
    client: reqwest::Client,
}

impl ChatRankingClient {
    pub fn new(config: ChatRankingConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("article-imagery/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()?;
        Ok(ChatRankingClient { config, client })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(ChatRankingConfig::from_env())
    }

    pub fn config(&self) -> &ChatRankingConfig {
        &self.config
    }

    fn request_body(
        &self,
        request: &RankingRequest,
    ) -> std::result::Result<serde_json::Value, RankingError> {
        let prompt = render_ranking_prompt(request)?;
        Ok(json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
        }))
    }

    fn interpret(&self, completion: ChatCompletion) -> std::result::Result<RawRankingResponse, RankingError> {
        let usage = completion.usage.unwrap_or_default();
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| RankingError::InvalidReply("completion has no message content".to_string()))?;

        let mut response = parse_ranking_reply(&content)?;
        response.usage = Usage {
            calls: 0,
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            cost_usd: self
                .config
                .cost_usd(usage.prompt_tokens, usage.completion_tokens),
        };
        Ok(response)
    }
}

#[async_trait]
impl RankingService for ChatRankingClient {
    #[instrument(skip_all, fields(model = %self.config.model, slots = request.slot_count()))]
    async fn rank(
        &self,
        request: RankingRequest,
    ) -> std::result::Result<RawRankingResponse, RankingError> {
        let mut http = self
            .client
            .post(self.config.endpoint())
            .json(&self.request_body(&request)?);
        if let Some(key) = &self.config.api_key {
            http = http.bearer_auth(key);
        }

        let response = http.send().await.map_err(ranking_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(err) => {
                    debug!(error = %err, "could not read error body");
                    String::new()
                }
            };
            let excerpt: String = body.chars().take(200).collect();
            warn!(status = status.as_u16(), body = %excerpt, "ranking endpoint returned an error");
            return Err(RankingError::Unavailable(format!(
                "status {}: {excerpt}",
                status.as_u16()
            )));
        }

        let completion: ChatCompletion = response.json().await.map_err(ranking_error)?;
        let parsed = self.interpret(completion)?;
        debug!(
            hero = parsed.hero.len(),
            sections = parsed.sections.len(),
            input_tokens = parsed.usage.input_tokens,
            output_tokens = parsed.usage.output_tokens,
            "ranking reply parsed"
        );
        Ok(parsed)
    }
}
