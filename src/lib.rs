//! Concurrent processing backbone for issue-tracker triage.
//!
//! One Poller per watched repository publishes `IssueEvent`s onto a shared
//! Broker; a single Pipeline subscribes and serializes dedup, classification,
//! logging, and notification for each event. Everything here is storage- and
//! transport-agnostic: concrete adapters (SQLite store, GitHub client, chat
//! webhooks) live in sibling crates and are wired together by the CLI binary
//! through [`wiring::supervise`].

pub mod broker;
pub mod capabilities;
pub mod classify;
pub mod dedup;
pub mod error;
pub mod pipeline;
pub mod poller;
pub mod rate_limit;
pub mod retry;
pub mod similarity;
pub mod store;
pub mod wiring;

pub use error::{Error, Result};
