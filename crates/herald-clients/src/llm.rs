//! OpenAI-compatible chat completions client.

use std::sync::OnceLock;

use async_trait::async_trait;
use herald_pipeline::{CollaboratorError, GenerationRequest, Generator, Snapshot};
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::http::{build_client, handle_response, trim_base};
use crate::{ClientError, HttpTimeouts, prompts};

/// Extract a 1-10 score from a model reply.
///
/// A reply that is just a number is taken as is. Otherwise an "N/10" or
/// "N out of 10" rating wins, then the last integer in the text, since
/// replies tend to restate the scale before giving the score. The result is
/// clamped into range; `None` means the reply holds no integer.
pub fn parse_score(reply: &str) -> Option<u8> {
    static RATING: OnceLock<Regex> = OnceLock::new();
    static INTEGER: OnceLock<Regex> = OnceLock::new();
    let rating = RATING.get_or_init(|| Regex::new(r"(-?\d+)\s*(?:/|out of)\s*10\b").unwrap());
    let integer = INTEGER.get_or_init(|| Regex::new(r"-?\d+").unwrap());

    let bare = reply.trim().trim_end_matches('.');
    let digits = if integer.find(bare).is_some_and(|m| m.as_str() == bare) {
        bare
    } else if let Some(captures) = rating.captures(reply) {
        captures.get(1)?.as_str()
    } else {
        integer.find_iter(reply).last()?.as_str()
    };
    Some(clamp_score(digits))
}

fn clamp_score(digits: &str) -> u8 {
    let value = match digits.parse::<i64>() {
        Ok(v) => v,
        // Too many digits to fit; the sign decides which end to clamp to.
        Err(_) if digits.starts_with('-') => i64::MIN,
        Err(_) => i64::MAX,
    };
    value.clamp(1, 10) as u8
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

/// Chat completions client implementing [`Generator`].
#[derive(Debug, Clone)]
pub struct LlmClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl LlmClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeouts: HttpTimeouts,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            http: build_client(timeouts)?,
            base_url: trim_base(base_url),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.9,
        })
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Send one system + user exchange and return the reply text.
    #[tracing::instrument(skip_all, fields(model = %self.model, prompt_len = prompt.len()))]
    pub async fn complete(&self, prompt: &str) -> Result<String, ClientError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: prompts::PERSONA,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.temperature,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let body: ChatResponse = handle_response(response).await?;

        let reply = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ClientError::InvalidResponse("completion has no content".to_string()))?;
        debug!(reply_len = reply.len(), "completion received");
        Ok(reply)
    }
}

#[async_trait]
impl Generator for LlmClient {
    async fn synthesize_short_term(
        &self,
        snapshot: &Snapshot,
        prior_context: &[String],
    ) -> Result<String, CollaboratorError> {
        Ok(self
            .complete(&prompts::short_term_memory(snapshot, prior_context))
            .await?)
    }

    async fn generate_post(
        &self,
        request: GenerationRequest<'_>,
    ) -> Result<String, CollaboratorError> {
        Ok(self.complete(&prompts::post(request)).await?)
    }

    async fn score_significance(&self, content: &str) -> Result<i64, CollaboratorError> {
        let reply = self.complete(&prompts::significance(content)).await?;
        parse_score(&reply).map(i64::from).ok_or_else(|| {
            CollaboratorError::InvalidResponse(format!("no score in reply {:?}", reply))
        })
    }
}
