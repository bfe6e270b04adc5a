//! Pipeline types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A vector embedding of some text.
pub type Embedding = Vec<f32>;

/// External signal data gathered at the start of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// When the data was collected.
    pub collected_at: DateTime<Utc>,
    /// Individual observations.
    pub items: Vec<SignalItem>,
}

/// One observation inside a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalItem {
    pub label: String,
    pub detail: String,
}

impl Snapshot {
    /// Render the snapshot as a numbered list for prompts.
    pub fn format_for_prompt(&self) -> String {
        if self.items.is_empty() {
            return "(no external data)".to_string();
        }
        self.items
            .iter()
            .enumerate()
            .map(|(i, item)| format!("{}. {}: {}", i + 1, item.label, item.detail))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A memory retrieved from long-term storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub content: String,
    pub significance: u8,
    /// Similarity to the query embedding, when known.
    pub relevance: Option<f32>,
    pub created_at: DateTime<Utc>,
}

/// Media that has already been uploaded and can be referenced by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAttachment {
    pub media_id: String,
}

/// The posting identity in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
}

/// A post to append to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub user_id: i64,
    pub username: String,
    pub content: String,
    pub external_id: String,
    pub channel: Channel,
}

/// A post stored in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: String,
    pub user_id: i64,
    pub username: String,
    pub content: String,
    pub external_id: String,
    pub channel: Channel,
    pub created_at: DateTime<Utc>,
}

/// One of the two publishing paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// The official API channel.
    Primary,
    /// The logged-in session channel.
    Fallback,
}

impl Channel {
    /// Tag stored alongside post records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Primary => "primary",
            Channel::Fallback => "fallback",
        }
    }

    /// Parse a stored tag.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "primary" => Some(Channel::Primary),
            "fallback" => Some(Channel::Fallback),
            _ => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which channel delivered a run's post, if any.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelUsed {
    Primary,
    Fallback,
    #[default]
    None,
}

impl From<Channel> for ChannelUsed {
    fn from(channel: Channel) -> Self {
        match channel {
            Channel::Primary => ChannelUsed::Primary,
            Channel::Fallback => ChannelUsed::Fallback,
        }
    }
}

impl fmt::Display for ChannelUsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChannelUsed::Primary => "primary",
            ChannelUsed::Fallback => "fallback",
            ChannelUsed::None => "none",
        })
    }
}

/// Summary of a run that got past the readiness gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    /// Significance rating, 1-10.
    pub significance_score: u8,
    /// Identifier returned by the channel that published the post.
    pub post_id: Option<String>,
    pub channel_used: ChannelUsed,
    pub persisted_to_memory: bool,
    /// The generated content.
    pub content: String,
}

/// How a run that did not fail ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Readiness was below the threshold; nothing was generated.
    GateClosed { readiness: f64, threshold: f64 },
    /// Content was generated and scored.
    Completed(PipelineResult),
}

/// Steps of a run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStep {
    OpenSession,
    CollectData,
    CheckReadiness,
    LoadPriorPosts,
    SynthesizeMemory,
    EmbedMemory,
    RetrieveMemories,
    Generate,
    Score,
    RenderMedia,
    Persist,
    Publish,
    RecordPost,
}

impl fmt::Display for RunStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStep::OpenSession => "open_session",
            RunStep::CollectData => "collect_data",
            RunStep::CheckReadiness => "check_readiness",
            RunStep::LoadPriorPosts => "load_prior_posts",
            RunStep::SynthesizeMemory => "synthesize_memory",
            RunStep::EmbedMemory => "embed_memory",
            RunStep::RetrieveMemories => "retrieve_memories",
            RunStep::Generate => "generate",
            RunStep::Score => "score",
            RunStep::RenderMedia => "render_media",
            RunStep::Persist => "persist",
            RunStep::Publish => "publish",
            RunStep::RecordPost => "record_post",
        };
        f.write_str(name)
    }
}

/// Diagnostics the supervisor reads when a run fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunProgress {
    /// The last step that finished successfully.
    pub last_completed: Option<RunStep>,
    /// The significance score, once reached.
    pub score: Option<u8>,
}

impl RunProgress {
    pub fn complete(&mut self, step: RunStep) {
        self.last_completed = Some(step);
    }
}
