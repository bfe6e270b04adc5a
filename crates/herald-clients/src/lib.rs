//! Concrete collaborators for Herald.
//!
//! Each client wraps one external HTTP service and implements one of the
//! collaborator traits from `herald-pipeline`.

mod embedding;
mod error;
mod http;
mod llm;
pub mod prompts;
mod solana;
mod x_api;
mod x_session;

pub use embedding::EmbeddingClient;
pub use error::ClientError;
pub use http::HttpTimeouts;
pub use llm::{LlmClient, parse_score};
pub use solana::SolanaRpcClient;
pub use x_api::XApiPublisher;
pub use x_session::{SessionCredentials, XSessionPublisher};
