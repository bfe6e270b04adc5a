//! Fallback publishing channel: the logged-in web session.

use async_trait::async_trait;
use herald_pipeline::{CollaboratorError, FallbackChannel, MediaAttachment};
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::http::build_client;
use crate::{ClientError, HttpTimeouts};

/// Cookies and tokens of a logged-in web session.
#[derive(Debug, Clone)]
pub struct SessionCredentials {
    /// `auth_token` cookie.
    pub auth_token: String,
    /// `ct0` cookie, echoed back as the CSRF header.
    pub csrf_token: String,
    /// Public bearer token of the web client.
    pub web_bearer: String,
}

/// Posts through the web client's `CreateTweet` GraphQL mutation.
///
/// The raw response body is handed back untouched; a body that is not JSON
/// becomes `Value::Null`.
#[derive(Debug, Clone)]
pub struct XSessionPublisher {
    http: Client,
    endpoint: String,
    credentials: SessionCredentials,
}

impl XSessionPublisher {
    /// `endpoint` is the full mutation URL, `.../graphql/<query id>/CreateTweet`.
    pub fn new(
        endpoint: impl Into<String>,
        credentials: SessionCredentials,
        timeouts: HttpTimeouts,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            http: build_client(timeouts)?,
            endpoint: endpoint.into(),
            credentials,
        })
    }

    fn mutation(&self, content: &str, media: Option<&MediaAttachment>) -> Value {
        let media_entities: Vec<Value> = media
            .map(|m| json!({"media_id": m.media_id, "tagged_users": []}))
            .into_iter()
            .collect();
        json!({
            "variables": {
                "tweet_text": content,
                "dark_request": false,
                "media": {
                    "media_entities": media_entities,
                    "possibly_sensitive": false
                },
                "semantic_annotation_ids": []
            },
            "queryId": query_id(&self.endpoint)
        })
    }

    /// Send the mutation and return the response body as JSON.
    pub async fn create_post(
        &self,
        content: &str,
        media: Option<&MediaAttachment>,
    ) -> Result<Value, ClientError> {
        let creds = &self.credentials;
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&creds.web_bearer)
            .header(
                "cookie",
                format!("auth_token={}; ct0={}", creds.auth_token, creds.csrf_token),
            )
            .header("x-csrf-token", &creds.csrf_token)
            .header("x-twitter-auth-type", "OAuth2Session")
            .header("x-twitter-active-user", "yes")
            .json(&self.mutation(content, media))
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        debug!(status = status.as_u16(), body_len = text.len(), "session post response");
        if !status.is_success() {
            warn!(status = status.as_u16(), "session channel returned error status");
        }
        Ok(serde_json::from_str(&text).unwrap_or(Value::Null))
    }
}

/// The GraphQL query id is the path segment before the operation name.
fn query_id(endpoint: &str) -> &str {
    endpoint
        .trim_end_matches('/')
        .rsplit('/')
        .nth(1)
        .unwrap_or_default()
}

#[async_trait]
impl FallbackChannel for XSessionPublisher {
    async fn publish(
        &self,
        content: &str,
        media: Option<&MediaAttachment>,
    ) -> Result<Value, CollaboratorError> {
        match self.create_post(content, media).await {
            Ok(body) => Ok(body),
            Err(e) => {
                warn!(error = %e, "session channel request failed");
                Ok(Value::Null)
            }
        }
    }
}
