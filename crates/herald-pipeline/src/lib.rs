//! Content pipeline for Herald.
//!
//! A run collects external data, checks a readiness gate, builds short-term
//! and long-term memory context, generates a post, scores it, and then
//! conditionally persists and publishes it. External systems sit behind the
//! traits in [`collaborator`]; the binary wires in concrete clients.

pub mod collaborator;
mod config;
mod error;
mod executor;
mod publish;
mod supervisor;
mod types;

#[cfg(test)]
mod fakes;

pub use collaborator::{
    DataSource, Embedder, FallbackChannel, GenerationRequest, Generator, LedgerSession,
    MediaRenderer, Memory, PostLedger, PrimaryChannel, bounded,
};
pub use config::{
    DEFAULT_CALL_TIMEOUT_SECS, DEFAULT_GATE_THRESHOLD, DEFAULT_MEMORY_THRESHOLD,
    DEFAULT_PRIOR_POSTS_LIMIT, DEFAULT_PUBLISH_THRESHOLD, DEFAULT_USERNAME, PipelineConfig,
};
pub use error::{CollaboratorError, PipelineError};
pub use executor::{Pipeline, strip_wrapping_quotes};
pub use publish::{FallbackId, PublishCoordinator, PublishOutcome, extract_fallback_id};
pub use supervisor::{RunDisposition, RunReport, RunSupervisor};
pub use types::{
    Channel, ChannelUsed, Embedding, MediaAttachment, MemoryRecord, NewPost, PipelineResult,
    PostRecord, RunOutcome, RunProgress, RunStep, SignalItem, Snapshot, UserRecord,
};
