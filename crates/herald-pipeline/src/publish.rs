//! Two-tier publishing: primary channel first, fallback channel on rejection.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};

use crate::{
    Channel, CollaboratorError, FallbackChannel, MediaAttachment, PrimaryChannel, bounded,
};

/// Result of one publish attempt across both channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// A channel accepted the post.
    Published { channel: Channel, post_id: String },
    /// Both channels rejected the post.
    Failed,
}

/// Identifier extracted from a fallback response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackId {
    Found(String),
    NotFound,
}

/// Extract the post identifier from a fallback response.
///
/// Follows `data.create_tweet.tweet_results.result.rest_id`. A missing level,
/// a level of the wrong type, or an empty id all map to [`FallbackId::NotFound`].
pub fn extract_fallback_id(response: &Value) -> FallbackId {
    response
        .get("data")
        .and_then(|v| v.get("create_tweet"))
        .and_then(|v| v.get("tweet_results"))
        .and_then(|v| v.get("result"))
        .and_then(|v| v.get("rest_id"))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(|id| FallbackId::Found(id.to_string()))
        .unwrap_or(FallbackId::NotFound)
}

/// Publishes through the primary channel, then the fallback channel.
///
/// Each channel is tried at most once per call.
pub struct PublishCoordinator {
    primary: Arc<dyn PrimaryChannel>,
    fallback: Arc<dyn FallbackChannel>,
    call_timeout: Duration,
}

impl PublishCoordinator {
    pub fn new(
        primary: Arc<dyn PrimaryChannel>,
        fallback: Arc<dyn FallbackChannel>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            primary,
            fallback,
            call_timeout,
        }
    }

    /// Publish `content`, returning which channel accepted it.
    ///
    /// Rejection by both channels is [`PublishOutcome::Failed`], not an error.
    /// A timeout counts as a rejection for that channel; any other error
    /// propagates.
    #[tracing::instrument(skip_all, fields(content_len = content.len(), has_media = media.is_some()))]
    pub async fn publish(
        &self,
        content: &str,
        media: Option<&MediaAttachment>,
    ) -> Result<PublishOutcome, CollaboratorError> {
        let primary = bounded(
            "publish_primary",
            self.call_timeout,
            self.primary.publish(content, media),
        )
        .await;

        match rejected_on_timeout(primary, None)? {
            Some(post_id) if !post_id.is_empty() => {
                info!(post_id = %post_id, "published via primary channel");
                return Ok(PublishOutcome::Published {
                    channel: Channel::Primary,
                    post_id,
                });
            }
            _ => warn!("primary channel rejected post, attempting fallback"),
        }

        let response = bounded(
            "publish_fallback",
            self.call_timeout,
            self.fallback.publish(content, media),
        )
        .await;

        match extract_fallback_id(&rejected_on_timeout(response, Value::Null)?) {
            FallbackId::Found(post_id) => {
                info!(post_id = %post_id, "published via fallback channel");
                Ok(PublishOutcome::Published {
                    channel: Channel::Fallback,
                    post_id,
                })
            }
            FallbackId::NotFound => {
                warn!("fallback channel rejected post, both channels exhausted");
                Ok(PublishOutcome::Failed)
            }
        }
    }
}

/// Map a timed-out channel call to the channel's "rejected" value.
fn rejected_on_timeout<T>(
    result: Result<T, CollaboratorError>,
    rejected: T,
) -> Result<T, CollaboratorError> {
    match result {
        Err(CollaboratorError::Timeout { call, after }) => {
            warn!(call, timeout_secs = after.as_secs(), "publish channel timed out");
            Ok(rejected)
        }
        other => other,
    }
}
