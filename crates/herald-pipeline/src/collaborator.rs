//! Interfaces of the external systems a run depends on.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::{
    CollaboratorError, Embedding, MediaAttachment, MemoryRecord, NewPost, PostRecord, Snapshot,
    UserRecord,
};

/// Source of external signal data and of the readiness value.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Gather the current data snapshot.
    async fn collect_snapshot(&self) -> Result<Snapshot, CollaboratorError>;

    /// Current readiness value (e.g. wallet balance).
    async fn check_readiness(&self) -> Result<f64, CollaboratorError>;
}

/// Inputs for generating a post.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub short_term: &'a str,
    pub long_term: &'a [MemoryRecord],
    pub formatted_snapshot: &'a str,
    pub prior_posts: &'a [String],
}

/// The generative model.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Summarize the snapshot into a short-term memory.
    async fn synthesize_short_term(
        &self,
        snapshot: &Snapshot,
        prior_context: &[String],
    ) -> Result<String, CollaboratorError>;

    /// Produce post content.
    async fn generate_post(
        &self,
        request: GenerationRequest<'_>,
    ) -> Result<String, CollaboratorError>;

    /// Rate the content's significance on a 1-10 scale.
    async fn score_significance(&self, content: &str) -> Result<i64, CollaboratorError>;
}

/// Turns text into embeddings.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Embedding, CollaboratorError>;
}

/// Long-term memory with similarity retrieval.
#[async_trait]
pub trait Memory: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Embedding, CollaboratorError>;

    async fn retrieve_relevant(
        &self,
        embedding: &Embedding,
    ) -> Result<Vec<MemoryRecord>, CollaboratorError>;

    async fn store(
        &self,
        content: &str,
        embedding: &Embedding,
        significance: u8,
    ) -> Result<(), CollaboratorError>;
}

/// The primary (API) publishing channel.
///
/// `Ok(None)` means the channel rejected the post; `Err` is reserved for
/// unexpected failures.
#[async_trait]
pub trait PrimaryChannel: Send + Sync {
    async fn publish(
        &self,
        content: &str,
        media: Option<&MediaAttachment>,
    ) -> Result<Option<String>, CollaboratorError>;
}

/// The fallback (session) publishing channel.
///
/// Returns the raw response body; the caller extracts the identifier.
#[async_trait]
pub trait FallbackChannel: Send + Sync {
    async fn publish(
        &self,
        content: &str,
        media: Option<&MediaAttachment>,
    ) -> Result<serde_json::Value, CollaboratorError>;
}

/// Optional media rendering for generated content.
#[async_trait]
pub trait MediaRenderer: Send + Sync {
    async fn render(&self, content: &str) -> Result<Option<MediaAttachment>, CollaboratorError>;
}

/// Durable record of the posting identity and its posts.
#[async_trait]
pub trait PostLedger: Send + Sync {
    /// Open a short-lived session scoped to one run.
    async fn open_session(&self) -> Result<Box<dyn LedgerSession>, CollaboratorError>;
}

/// A unit-of-work handle on the ledger, released when dropped.
#[async_trait]
pub trait LedgerSession: Send {
    /// Look up the user, creating it if missing.
    async fn ensure_user(&mut self, username: &str) -> Result<UserRecord, CollaboratorError>;

    /// Most recent posts by `username`, newest first.
    async fn recent_posts(
        &mut self,
        username: &str,
        limit: usize,
    ) -> Result<Vec<PostRecord>, CollaboratorError>;

    /// Append a post record.
    async fn append_post(&mut self, post: NewPost) -> Result<PostRecord, CollaboratorError>;
}

/// Await a collaborator call, turning an elapsed timeout into
/// [`CollaboratorError::Timeout`].
pub async fn bounded<T, F>(call: &'static str, after: Duration, fut: F) -> Result<T, CollaboratorError>
where
    F: Future<Output = Result<T, CollaboratorError>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(CollaboratorError::Timeout { call, after }),
    }
}
