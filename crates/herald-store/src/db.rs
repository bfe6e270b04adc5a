//! SQLite post ledger.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use herald_pipeline::{
    Channel, CollaboratorError, LedgerSession, NewPost, PostLedger, PostRecord, UserRecord,
};
use rusqlite::{Connection, params};
use tracing::{debug, info};

use crate::StoreError;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        email TEXT,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS posts (
        id TEXT PRIMARY KEY,
        user_id INTEGER NOT NULL REFERENCES users(id),
        username TEXT NOT NULL,
        content TEXT NOT NULL,
        kind TEXT NOT NULL DEFAULT 'post',
        external_id TEXT NOT NULL,
        channel TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_posts_username ON posts(username, created_at);

    CREATE TABLE IF NOT EXISTS memories (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        content TEXT NOT NULL,
        embedding BLOB NOT NULL,
        significance INTEGER NOT NULL,
        created_at TEXT NOT NULL
    );
";

/// Open a connection and make sure the schema exists.
pub(crate) fn connect(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA busy_timeout=5000;",
    )?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

pub(crate) fn parse_timestamp(
    table: &'static str,
    raw: &str,
) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            table,
            reason: format!("bad timestamp {:?}: {}", raw, e),
        })
}

/// SQLite-backed post ledger.
///
/// Each run gets its own [`StoreSession`] with a fresh connection.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    /// Open or create the database at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        connect(&path)?;
        info!(path = %path.display(), "store initialized");
        Ok(Self { path })
    }

    /// Open a session without going through the [`PostLedger`] seam.
    pub fn session(&self) -> Result<StoreSession, StoreError> {
        Ok(StoreSession {
            conn: connect(&self.path)?,
        })
    }
}

#[async_trait]
impl PostLedger for Store {
    async fn open_session(&self) -> Result<Box<dyn LedgerSession>, CollaboratorError> {
        Ok(Box::new(self.session()?))
    }
}

/// One run's unit of work against the ledger. The connection closes on drop.
pub struct StoreSession {
    conn: Connection,
}

impl StoreSession {
    /// Look up `username`, inserting it on first use.
    pub fn ensure_user(&self, username: &str) -> Result<UserRecord, StoreError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO users (username, created_at) VALUES (?1, ?2)",
            params![username, Utc::now().to_rfc3339()],
        )?;
        let id = self.conn.query_row(
            "SELECT id FROM users WHERE username = ?1",
            params![username],
            |row| row.get(0),
        )?;
        Ok(UserRecord {
            id,
            username: username.to_string(),
        })
    }

    /// Most recent posts by `username`, newest first.
    pub fn recent_posts(
        &self,
        username: &str,
        limit: usize,
    ) -> Result<Vec<PostRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, username, content, external_id, channel, created_at
             FROM posts
             WHERE username = ?1
             ORDER BY rowid DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![username, limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut posts = Vec::new();
        for row in rows {
            let (id, user_id, username, content, external_id, channel, created_at) = row?;
            let channel = Channel::parse(&channel).ok_or_else(|| StoreError::Corrupt {
                table: "posts",
                reason: format!("unknown channel {:?}", channel),
            })?;
            posts.push(PostRecord {
                id,
                user_id,
                username,
                content,
                external_id,
                channel,
                created_at: parse_timestamp("posts", &created_at)?,
            });
        }
        Ok(posts)
    }

    /// Append a post. Records are never updated in place.
    pub fn append_post(&self, post: NewPost) -> Result<PostRecord, StoreError> {
        let record = PostRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: post.user_id,
            username: post.username,
            content: post.content,
            external_id: post.external_id,
            channel: post.channel,
            created_at: Utc::now(),
        };
        self.conn.execute(
            "INSERT INTO posts (id, user_id, username, content, external_id, channel, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.id,
                record.user_id,
                record.username,
                record.content,
                record.external_id,
                record.channel.as_str(),
                record.created_at.to_rfc3339(),
            ],
        )?;
        debug!(id = %record.id, channel = %record.channel, "post appended");
        Ok(record)
    }

    pub fn count_posts(&self) -> Result<usize, StoreError> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM posts", [], |row| row.get::<_, usize>(0))?)
    }
}

#[async_trait]
impl LedgerSession for StoreSession {
    async fn ensure_user(&mut self, username: &str) -> Result<UserRecord, CollaboratorError> {
        Ok(StoreSession::ensure_user(self, username)?)
    }

    async fn recent_posts(
        &mut self,
        username: &str,
        limit: usize,
    ) -> Result<Vec<PostRecord>, CollaboratorError> {
        Ok(StoreSession::recent_posts(self, username, limit)?)
    }

    async fn append_post(&mut self, post: NewPost) -> Result<PostRecord, CollaboratorError> {
        Ok(StoreSession::append_post(self, post)?)
    }
}
