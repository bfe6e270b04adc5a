//! Command-line and environment configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use herald_clients::{HttpTimeouts, SessionCredentials};
use herald_pipeline::{
    DEFAULT_CALL_TIMEOUT_SECS, DEFAULT_GATE_THRESHOLD, DEFAULT_MEMORY_THRESHOLD,
    DEFAULT_PRIOR_POSTS_LIMIT, DEFAULT_PUBLISH_THRESHOLD, DEFAULT_USERNAME, PipelineConfig,
};
use herald_scheduler::{
    DEFAULT_ACTIVATION_HORIZON_SECS, DEFAULT_ACTIVE_POLL_MILLIS, DEFAULT_IDLE_POLL_SECS,
    DEFAULT_MAX_TRIGGER_OFFSET_SECS, DEFAULT_MAX_WINDOW_SECS, DEFAULT_MIN_TRIGGER_OFFSET_SECS,
    DEFAULT_MIN_WINDOW_SECS, DurationRange, SchedulePolicy,
};
use herald_store::DEFAULT_RETRIEVE_LIMIT;

/// Parse boolean from environment variable, accepting common truthy values.
/// Accepts "1", "true", "yes", "on" (case-insensitive) as true.
/// Accepts "0", "false", "no", "off", "" (case-insensitive) as false.
pub fn parse_bool_env(s: &str) -> Result<bool, String> {
    match s.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(format!(
            "invalid boolean value '{}', expected 1/true/yes/on or 0/false/no/off",
            s
        )),
    }
}

/// Settings shared by every subcommand: storage, collaborators, pipeline policy.
#[derive(Debug, Clone, Args)]
pub struct AgentArgs {
    /// SQLite database path
    #[arg(long, env = "HERALD_DB_PATH", default_value = "herald.db")]
    pub db_path: PathBuf,

    /// Base URL of the OpenAI-compatible chat API
    #[arg(long, env = "HERALD_LLM_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub llm_base_url: String,

    /// API key for the chat API
    #[arg(long, env = "HERALD_LLM_API_KEY", hide_env_values = true)]
    pub llm_api_key: String,

    /// Chat model name
    #[arg(long, env = "HERALD_LLM_MODEL", default_value = "gpt-4o-mini")]
    pub llm_model: String,

    /// Sampling temperature for generation
    #[arg(long, env = "HERALD_LLM_TEMPERATURE", default_value_t = 0.9)]
    pub llm_temperature: f32,

    /// Base URL of the embeddings API
    #[arg(
        long,
        env = "HERALD_EMBEDDING_BASE_URL",
        default_value = "https://api.openai.com/v1"
    )]
    pub embedding_base_url: String,

    /// API key for the embeddings API
    #[arg(long, env = "HERALD_EMBEDDING_API_KEY", hide_env_values = true)]
    pub embedding_api_key: String,

    /// Embedding model name
    #[arg(
        long,
        env = "HERALD_EMBEDDING_MODEL",
        default_value = "text-embedding-3-small"
    )]
    pub embedding_model: String,

    /// Base URL of the posting API (primary channel)
    #[arg(long, env = "HERALD_X_API_BASE_URL", default_value = "https://api.x.com")]
    pub x_api_base_url: String,

    /// User access token for the posting API
    #[arg(long, env = "HERALD_X_ACCESS_TOKEN", hide_env_values = true)]
    pub x_access_token: String,

    /// CreateTweet GraphQL endpoint (fallback channel)
    #[arg(
        long,
        env = "HERALD_X_SESSION_ENDPOINT",
        default_value = "https://x.com/i/api/graphql/a1p9RWpkYKBjWv_I3WzS-A/CreateTweet"
    )]
    pub x_session_endpoint: String,

    /// `auth_token` cookie of the logged-in session
    #[arg(long, env = "HERALD_X_AUTH_TOKEN", hide_env_values = true)]
    pub x_auth_token: String,

    /// `ct0` cookie of the logged-in session
    #[arg(long, env = "HERALD_X_CSRF_TOKEN", hide_env_values = true)]
    pub x_csrf_token: String,

    /// Bearer token of the web client
    #[arg(long, env = "HERALD_X_WEB_BEARER", hide_env_values = true)]
    pub x_web_bearer: String,

    /// Solana JSON-RPC endpoint
    #[arg(
        long,
        env = "HERALD_SOLANA_RPC_URL",
        default_value = "https://api.mainnet-beta.solana.com"
    )]
    pub solana_rpc_url: String,

    /// Public key of the wallet whose balance gates runs
    #[arg(long, env = "HERALD_WALLET_ADDRESS")]
    pub wallet_address: String,

    /// Username of the posting identity in the ledger
    #[arg(long, env = "HERALD_USERNAME", default_value = DEFAULT_USERNAME)]
    pub username: String,

    /// Minimum wallet balance (SOL) for a run to proceed
    #[arg(long, env = "HERALD_GATE_THRESHOLD", default_value_t = DEFAULT_GATE_THRESHOLD)]
    pub gate_threshold: f64,

    /// Minimum significance score for long-term memory
    #[arg(long, env = "HERALD_MEMORY_THRESHOLD", default_value_t = DEFAULT_MEMORY_THRESHOLD)]
    pub memory_threshold: u8,

    /// Minimum significance score for publishing
    #[arg(long, env = "HERALD_PUBLISH_THRESHOLD", default_value_t = DEFAULT_PUBLISH_THRESHOLD)]
    pub publish_threshold: u8,

    /// Upper bound on any single collaborator call, in seconds
    #[arg(long, env = "HERALD_CALL_TIMEOUT", default_value_t = DEFAULT_CALL_TIMEOUT_SECS)]
    pub call_timeout: u64,

    /// HTTP request timeout for the clients, in seconds
    #[arg(long, env = "HERALD_HTTP_TIMEOUT", default_value = "60")]
    pub http_timeout: u64,

    /// Number of recent posts fed back as context
    #[arg(long, env = "HERALD_PRIOR_POSTS", default_value_t = DEFAULT_PRIOR_POSTS_LIMIT)]
    pub prior_posts: usize,

    /// Number of long-term memories retrieved per run
    #[arg(long, env = "HERALD_MEMORY_LIMIT", default_value_t = DEFAULT_RETRIEVE_LIMIT)]
    pub memory_limit: usize,
}

impl AgentArgs {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            gate_threshold: self.gate_threshold,
            memory_threshold: self.memory_threshold,
            publish_threshold: self.publish_threshold,
            username: self.username.clone(),
            call_timeout: Duration::from_secs(self.call_timeout),
            prior_posts_limit: self.prior_posts,
        }
    }

    pub fn http_timeouts(&self) -> HttpTimeouts {
        HttpTimeouts {
            request: Duration::from_secs(self.http_timeout),
            ..HttpTimeouts::default()
        }
    }

    pub fn session_credentials(&self) -> SessionCredentials {
        SessionCredentials {
            auth_token: self.x_auth_token.clone(),
            csrf_token: self.x_csrf_token.clone(),
            web_bearer: self.x_web_bearer.clone(),
        }
    }
}

/// Timing of the activation-window scheduler.
#[derive(Debug, Clone, Args)]
pub struct ScheduleArgs {
    /// Latest activation after going idle, in seconds
    #[arg(long, env = "HERALD_ACTIVATION_HORIZON", default_value_t = DEFAULT_ACTIVATION_HORIZON_SECS)]
    pub activation_horizon: u64,

    /// Shortest active window, in seconds
    #[arg(long, env = "HERALD_MIN_WINDOW", default_value_t = DEFAULT_MIN_WINDOW_SECS)]
    pub min_window: u64,

    /// Longest active window, in seconds
    #[arg(long, env = "HERALD_MAX_WINDOW", default_value_t = DEFAULT_MAX_WINDOW_SECS)]
    pub max_window: u64,

    /// Shortest gap between runs inside a window, in seconds
    #[arg(long, env = "HERALD_MIN_TRIGGER_OFFSET", default_value_t = DEFAULT_MIN_TRIGGER_OFFSET_SECS)]
    pub min_trigger_offset: u64,

    /// Longest gap between runs inside a window, in seconds
    #[arg(long, env = "HERALD_MAX_TRIGGER_OFFSET", default_value_t = DEFAULT_MAX_TRIGGER_OFFSET_SECS)]
    pub max_trigger_offset: u64,

    /// Poll interval while idle, in seconds
    #[arg(long, env = "HERALD_IDLE_POLL", default_value_t = DEFAULT_IDLE_POLL_SECS)]
    pub idle_poll: u64,

    /// Poll interval inside a window, in milliseconds
    #[arg(long, env = "HERALD_ACTIVE_POLL_MS", default_value_t = DEFAULT_ACTIVE_POLL_MILLIS)]
    pub active_poll_ms: u64,

    /// Skip the run normally performed at start-up
    #[arg(
        long,
        env = "HERALD_NO_INITIAL_RUN",
        value_parser = parse_bool_env,
        num_args = 0..=1,
        default_value = "false",
        default_missing_value = "true"
    )]
    pub no_initial_run: bool,
}

impl ScheduleArgs {
    pub fn policy(&self) -> SchedulePolicy {
        SchedulePolicy {
            activation_horizon: DurationRange::from_secs(0, self.activation_horizon),
            window_duration: DurationRange::from_secs(self.min_window, self.max_window),
            trigger_offset: DurationRange::from_secs(
                self.min_trigger_offset,
                self.max_trigger_offset,
            ),
            idle_poll: Duration::from_secs(self.idle_poll),
            active_poll: Duration::from_millis(self.active_poll_ms),
        }
    }
}
