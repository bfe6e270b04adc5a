//! OpenAI-compatible embeddings client.

use async_trait::async_trait;
use herald_pipeline::{CollaboratorError, Embedder, Embedding};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::http::{build_client, handle_response, trim_base};
use crate::{ClientError, HttpTimeouts};

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl EmbeddingClient {
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
        })
    }

    pub async fn create(&self, text: &str) -> Result<Embedding, ClientError> {
        let response = self
            .http
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .await?;
        let body: EmbeddingResponse = handle_response(response).await?;
        body.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| ClientError::InvalidResponse("no embedding returned".to_string()))
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Embedding, CollaboratorError> {
        Ok(self.create(text).await?)
    }
}
