//! In-memory collaborators for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use crate::{
    CollaboratorError, DataSource, Embedding, FallbackChannel, GenerationRequest, Generator,
    LedgerSession, MediaAttachment, MediaRenderer, Memory, MemoryRecord, NewPost, PostLedger,
    PostRecord, PrimaryChannel, SignalItem, Snapshot, UserRecord,
};

/// Ordered record of collaborator calls shared between fakes.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<&'static str>>>);

impl CallLog {
    pub fn push(&self, call: &'static str) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|c| **c == call).count()
    }

    pub fn position(&self, call: &str) -> Option<usize> {
        self.0.lock().unwrap().iter().position(|c| *c == call)
    }
}

pub struct FakeDataSource {
    pub readiness: f64,
    pub log: CallLog,
}

#[async_trait]
impl DataSource for FakeDataSource {
    async fn collect_snapshot(&self) -> Result<Snapshot, CollaboratorError> {
        self.log.push("collect_snapshot");
        Ok(Snapshot {
            collected_at: Utc::now(),
            items: vec![SignalItem {
                label: "balance".to_string(),
                detail: format!("{} SOL", self.readiness),
            }],
        })
    }

    async fn check_readiness(&self) -> Result<f64, CollaboratorError> {
        self.log.push("check_readiness");
        Ok(self.readiness)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorFault {
    None,
    Synthesize,
    Generate,
    Score,
    Panic,
}

pub struct FakeGenerator {
    pub post: String,
    pub score: i64,
    pub fault: GeneratorFault,
    pub log: CallLog,
    pub prior_seen: Mutex<Vec<String>>,
}

impl FakeGenerator {
    pub fn new(post: &str, score: i64, log: CallLog) -> Self {
        Self {
            post: post.to_string(),
            score,
            fault: GeneratorFault::None,
            log,
            prior_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fault(mut self, fault: GeneratorFault) -> Self {
        self.fault = fault;
        self
    }
}

#[async_trait]
impl Generator for FakeGenerator {
    async fn synthesize_short_term(
        &self,
        _snapshot: &Snapshot,
        prior_context: &[String],
    ) -> Result<String, CollaboratorError> {
        self.log.push("synthesize_short_term");
        *self.prior_seen.lock().unwrap() = prior_context.to_vec();
        if self.fault == GeneratorFault::Synthesize {
            return Err(CollaboratorError::Unavailable("model offline".to_string()));
        }
        Ok("markets are quiet".to_string())
    }

    async fn generate_post(
        &self,
        _request: GenerationRequest<'_>,
    ) -> Result<String, CollaboratorError> {
        self.log.push("generate_post");
        match self.fault {
            GeneratorFault::Generate => {
                Err(CollaboratorError::Unavailable("model offline".to_string()))
            }
            GeneratorFault::Panic => panic!("generator blew up"),
            _ => Ok(self.post.clone()),
        }
    }

    async fn score_significance(&self, _content: &str) -> Result<i64, CollaboratorError> {
        self.log.push("score_significance");
        if self.fault == GeneratorFault::Score {
            return Err(CollaboratorError::InvalidResponse("no digits".to_string()));
        }
        Ok(self.score)
    }
}

#[derive(Default)]
pub struct FakeMemory {
    pub log: CallLog,
    pub fail_store: bool,
    pub stored: Mutex<Vec<(String, u8)>>,
}

#[async_trait]
impl Memory for FakeMemory {
    async fn embed(&self, text: &str) -> Result<Embedding, CollaboratorError> {
        self.log.push("embed");
        Ok(vec![text.len() as f32, 1.0])
    }

    async fn retrieve_relevant(
        &self,
        _embedding: &Embedding,
    ) -> Result<Vec<MemoryRecord>, CollaboratorError> {
        self.log.push("retrieve_relevant");
        Ok(vec![MemoryRecord {
            content: "an older thought".to_string(),
            significance: 8,
            relevance: Some(0.9),
            created_at: Utc::now(),
        }])
    }

    async fn store(
        &self,
        content: &str,
        _embedding: &Embedding,
        significance: u8,
    ) -> Result<(), CollaboratorError> {
        self.log.push("store");
        if self.fail_store {
            return Err(CollaboratorError::Unavailable("disk full".to_string()));
        }
        self.stored
            .lock()
            .unwrap()
            .push((content.to_string(), significance));
        Ok(())
    }
}

enum PrimaryBehavior {
    Returning(Option<String>),
    Failing,
    Hanging,
}

pub struct FakePrimary {
    behavior: PrimaryBehavior,
    calls: AtomicUsize,
    log: CallLog,
}

impl FakePrimary {
    pub fn returning(id: Option<&str>) -> Self {
        Self::with(PrimaryBehavior::Returning(id.map(str::to_string)))
    }

    pub fn failing() -> Self {
        Self::with(PrimaryBehavior::Failing)
    }

    pub fn hanging() -> Self {
        Self::with(PrimaryBehavior::Hanging)
    }

    fn with(behavior: PrimaryBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
            log: CallLog::default(),
        }
    }

    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PrimaryChannel for FakePrimary {
    async fn publish(
        &self,
        _content: &str,
        _media: Option<&MediaAttachment>,
    ) -> Result<Option<String>, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.push("publish_primary");
        match &self.behavior {
            PrimaryBehavior::Returning(id) => Ok(id.clone()),
            PrimaryBehavior::Failing => Err(CollaboratorError::Other(
                "signing key rejected".to_string().into(),
            )),
            PrimaryBehavior::Hanging => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(None)
            }
        }
    }
}

pub struct FakeFallback {
    response: Value,
    calls: AtomicUsize,
    log: CallLog,
}

impl FakeFallback {
    pub fn returning(response: Value) -> Self {
        Self {
            response,
            calls: AtomicUsize::new(0),
            log: CallLog::default(),
        }
    }

    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FallbackChannel for FakeFallback {
    async fn publish(
        &self,
        _content: &str,
        _media: Option<&MediaAttachment>,
    ) -> Result<Value, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.push("publish_fallback");
        Ok(self.response.clone())
    }
}

pub struct FakeRenderer {
    pub fail: bool,
    pub log: CallLog,
}

#[async_trait]
impl MediaRenderer for FakeRenderer {
    async fn render(&self, _content: &str) -> Result<Option<MediaAttachment>, CollaboratorError> {
        self.log.push("render");
        if self.fail {
            return Err(CollaboratorError::Unavailable("renderer crashed".to_string()));
        }
        Ok(Some(MediaAttachment {
            media_id: "media-1".to_string(),
        }))
    }
}

/// Shared state behind [`FakeLedger`] sessions.
#[derive(Debug, Default)]
pub struct LedgerState {
    pub users: Vec<UserRecord>,
    pub posts: Vec<PostRecord>,
    pub opened: usize,
    pub released: usize,
}

#[derive(Default, Clone)]
pub struct FakeLedger {
    pub state: Arc<Mutex<LedgerState>>,
    pub fail_open: bool,
}

impl FakeLedger {
    pub fn posts(&self) -> Vec<PostRecord> {
        self.state.lock().unwrap().posts.clone()
    }

    pub fn seed_post(&self, username: &str, content: &str) {
        let mut state = self.state.lock().unwrap();
        let user_id = ensure_user(&mut state, username).id;
        let id = format!("seed-{}", state.posts.len());
        state.posts.push(PostRecord {
            id,
            user_id,
            username: username.to_string(),
            content: content.to_string(),
            external_id: "0".to_string(),
            channel: crate::Channel::Primary,
            created_at: Utc::now(),
        });
    }
}

fn ensure_user(state: &mut LedgerState, username: &str) -> UserRecord {
    if let Some(user) = state.users.iter().find(|u| u.username == username) {
        return user.clone();
    }
    let user = UserRecord {
        id: state.users.len() as i64 + 1,
        username: username.to_string(),
    };
    state.users.push(user.clone());
    user
}

#[async_trait]
impl PostLedger for FakeLedger {
    async fn open_session(&self) -> Result<Box<dyn LedgerSession>, CollaboratorError> {
        if self.fail_open {
            return Err(CollaboratorError::Unavailable("database locked".to_string()));
        }
        self.state.lock().unwrap().opened += 1;
        Ok(Box::new(FakeSession {
            state: Arc::clone(&self.state),
        }))
    }
}

pub struct FakeSession {
    state: Arc<Mutex<LedgerState>>,
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.released += 1;
        }
    }
}

#[async_trait]
impl LedgerSession for FakeSession {
    async fn ensure_user(&mut self, username: &str) -> Result<UserRecord, CollaboratorError> {
        Ok(ensure_user(&mut self.state.lock().unwrap(), username))
    }

    async fn recent_posts(
        &mut self,
        username: &str,
        limit: usize,
    ) -> Result<Vec<PostRecord>, CollaboratorError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .posts
            .iter()
            .rev()
            .filter(|p| p.username == username)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn append_post(&mut self, post: NewPost) -> Result<PostRecord, CollaboratorError> {
        let mut state = self.state.lock().unwrap();
        let record = PostRecord {
            id: format!("post-{}", state.posts.len() + 1),
            user_id: post.user_id,
            username: post.username,
            content: post.content,
            external_id: post.external_id,
            channel: post.channel,
            created_at: Utc::now(),
        };
        state.posts.push(record.clone());
        Ok(record)
    }
}
