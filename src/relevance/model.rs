// src/relevance/model.rs
//! Model-backed scorer: asks a chat-completion endpoint for a number in [0,1].
//! Any failure falls back to the keyword scorer; it never reports a made-up 0.0.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{anon_hash, KeywordScorer, Relevance, RelevanceScorer};
use crate::error::{FeedError, FeedResult};
use crate::ingest::types::CanonicalItem;

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const BODY_PROMPT_CHARS: usize = 1500;

/// Low-level model call, separated so tests can swap in a fake.
pub trait ModelClient: Send + Sync + 'static {
    fn rate<'a>(&'a self, prompt: &'a str) -> Pin<Box<dyn Future<Output = FeedResult<f64>> + Send + 'a>>;
    fn name(&self) -> &'static str;
}

/// OpenAI Chat Completions client. Requires `OPENAI_API_KEY`.
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(model_override: Option<&str>) -> Self {
        let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        // Builder only fails on TLS backend init; fall back to defaults then.
        let http = reqwest::Client::builder()
            .user_agent("newsfeed-ranker/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            http,
            api_key,
            model: model_override.unwrap_or(DEFAULT_MODEL).to_string(),
        }
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl ModelClient for OpenAiClient {
    fn rate<'a>(&'a self, prompt: &'a str) -> Pin<Box<dyn Future<Output = FeedResult<f64>> + Send + 'a>> {
        Box::pin(async move {
            if !self.has_api_key() {
                return Err(FeedError::ScoringFailure("OPENAI_API_KEY not set".into()));
            }

            #[derive(Serialize)]
            struct Msg<'a> {
                role: &'a str,
                content: &'a str,
            }
            #[derive(Serialize)]
            struct Req<'a> {
                model: &'a str,
                messages: Vec<Msg<'a>>,
                temperature: f32,
                max_tokens: u32,
            }
            #[derive(Deserialize)]
            struct Resp {
                choices: Vec<Choice>,
            }
            #[derive(Deserialize)]
            struct Choice {
                message: ChoiceMsg,
            }
            #[derive(Deserialize)]
            struct ChoiceMsg {
                content: String,
            }

            let sys = "You rate the relevance of news items for an IT manager. Relevant: security incidents, major outages, critical software bugs or updates, IT disruptions. Return only a number between 0.0 and 1.0.";
            let req = Req {
                model: &self.model,
                messages: vec![
                    Msg {
                        role: "system",
                        content: sys,
                    },
                    Msg {
                        role: "user",
                        content: prompt,
                    },
                ],
                temperature: 0.0,
                max_tokens: 8,
            };

            let resp = self
                .http
                .post("https://api.openai.com/v1/chat/completions")
                .bearer_auth(&self.api_key)
                .json(&req)
                .send()
                .await
                .map_err(|e| FeedError::ScoringFailure(format!("request: {e}")))?;
            if !resp.status().is_success() {
                return Err(FeedError::ScoringFailure(format!("status {}", resp.status())));
            }
            let body: Resp = resp
                .json()
                .await
                .map_err(|e| FeedError::ScoringFailure(format!("decode: {e}")))?;
            let content = body
                .choices
                .first()
                .map(|c| c.message.content.as_str())
                .unwrap_or("");
            parse_model_score(content)
                .ok_or_else(|| FeedError::ScoringFailure(format!("unparsable reply {content:?}")))
        })
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// First numeric token of the reply, clamped to [0,1]. Non-finite → None.
pub fn parse_model_score(reply: &str) -> Option<f64> {
    reply
        .split(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))
        .map(|t| t.trim_end_matches('.'))
        .filter(|t| !t.is_empty())
        .find_map(|t| t.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, 1.0))
}

fn prompt_for(item: &CanonicalItem) -> String {
    let body: String = item.body.chars().take(BODY_PROMPT_CHARS).collect();
    format!("Source: {}\nTitle: {}\nBody: {}", item.source, item.title, body)
}

pub struct ModelScorer {
    client: Arc<dyn ModelClient>,
    fallback: KeywordScorer,
}

impl ModelScorer {
    pub fn new(client: Arc<dyn ModelClient>, fallback: KeywordScorer) -> Self {
        Self { client, fallback }
    }
}

#[async_trait::async_trait]
impl RelevanceScorer for ModelScorer {
    async fn score(&self, item: &CanonicalItem) -> Relevance {
        let prompt = prompt_for(item);
        match self.client.rate(&prompt).await {
            Ok(score) => Relevance {
                score,
                reasons: vec![format!("model:{}", self.client.name())],
                ..Relevance::default()
            },
            Err(e) => {
                warn!(
                    target: "relevance",
                    id = %anon_hash(&item.title),
                    error = %e,
                    provider = self.client.name(),
                    "model scoring failed; using keyword fallback"
                );
                counter!("newsfeed_scorer_fallback_total").increment(1);
                let mut rel = self.fallback.score(item).await;
                rel.reasons.push("fallback:keyword".into());
                rel
            }
        }
    }

    fn name(&self) -> &'static str {
        "model"
    }
}
