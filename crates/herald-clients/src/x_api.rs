//! Primary publishing channel: the official posting API.

use async_trait::async_trait;
use herald_pipeline::{CollaboratorError, MediaAttachment, PrimaryChannel};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::http::{build_client, handle_response, trim_base};
use crate::{ClientError, HttpTimeouts};

#[derive(Debug, Serialize)]
struct CreatePost<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    media: Option<PostMedia<'a>>,
}

#[derive(Debug, Serialize)]
struct PostMedia<'a> {
    media_ids: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
struct CreatePostResponse {
    data: Option<CreatedPost>,
}

#[derive(Debug, Deserialize)]
struct CreatedPost {
    id: String,
}

/// Posts through `POST /2/tweets` with a user access token.
#[derive(Debug, Clone)]
pub struct XApiPublisher {
    http: Client,
    base_url: String,
    access_token: String,
}

impl XApiPublisher {
    pub fn new(
        base_url: impl Into<String>,
        access_token: impl Into<String>,
        timeouts: HttpTimeouts,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            http: build_client(timeouts)?,
            base_url: trim_base(base_url),
            access_token: access_token.into(),
        })
    }

    /// Create a post and return its id.
    pub async fn create_post(
        &self,
        text: &str,
        media: Option<&MediaAttachment>,
    ) -> Result<String, ClientError> {
        let body = CreatePost {
            text,
            media: media.map(|m| PostMedia {
                media_ids: [m.media_id.as_str()],
            }),
        };
        let response = self
            .http
            .post(format!("{}/2/tweets", self.base_url))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;
        let created: CreatePostResponse = handle_response(response).await?;
        created
            .data
            .map(|d| d.id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ClientError::InvalidResponse("response has no post id".to_string()))
    }
}

#[async_trait]
impl PrimaryChannel for XApiPublisher {
    async fn publish(
        &self,
        content: &str,
        media: Option<&MediaAttachment>,
    ) -> Result<Option<String>, CollaboratorError> {
        match self.create_post(content, media).await {
            Ok(id) => {
                info!(post_id = %id, "API accepted post");
                Ok(Some(id))
            }
            Err(e) => {
                warn!(error = %e, "API rejected post");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn publisher(server: &MockServer) -> XApiPublisher {
        XApiPublisher::new(server.uri(), "user-token", HttpTimeouts::default()).unwrap()
    }

    #[tokio::test]
    async fn test_publish_returns_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/tweets"))
            .and(header("authorization", "Bearer user-token"))
            .and(body_json(json!({"text": "gm"})))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(json!({"data": {"id": "1850", "text": "gm"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let id = publisher(&server).publish("gm", None).await.unwrap();
        assert_eq!(id.as_deref(), Some("1850"));
    }

    #[tokio::test]
    async fn test_publish_attaches_media() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/tweets"))
            .and(body_json(json!({"text": "gm", "media": {"media_ids": ["m-9"]}})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"data": {"id": "7"}})))
            .expect(1)
            .mount(&server)
            .await;

        let media = MediaAttachment {
            media_id: "m-9".to_string(),
        };
        let id = publisher(&server).publish("gm", Some(&media)).await.unwrap();
        assert_eq!(id.as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn test_rejection_is_none_not_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/tweets"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "title": "Forbidden",
                "detail": "You are not permitted to perform this action."
            })))
            .mount(&server)
            .await;

        assert_eq!(publisher(&server).publish("gm", None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_id_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/tweets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"errors": []})))
            .mount(&server)
            .await;

        assert_eq!(publisher(&server).publish("gm", None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_none() {
        let publisher =
            XApiPublisher::new("http://127.0.0.1:1", "token", HttpTimeouts::default()).unwrap();
        assert_eq!(publisher.publish("gm", None).await.unwrap(), None);
    }
}
