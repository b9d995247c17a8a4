//! Concrete HTTP-backed adapters for the remote issue-tracker API, the
//! embedding provider, and the completion provider, built around a plain
//! `reqwest::Client`. Rate-limit header parsing lives in its own module so
//! `triage-core` never needs to know about `reqwest::header::HeaderMap`.

mod client;
mod completer;
mod embedder;
mod error;
mod rate_limit;

pub use client::GithubClient;
pub use completer::HttpCompleter;
pub use embedder::HttpEmbedder;
pub use error::GithubError;
pub use rate_limit::{parse_rate_limit, retry_after_secs};
