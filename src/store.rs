//! Durable store contract — the narrow persistence interface
//! the rest of the core depends on. Concrete implementations (e.g.
//! `triage-store-sqlite::SqliteStore`) live in their own crates; the core
//! never constructs rows itself, only calls through this trait object.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use triage_protocol::{Issue, IssueEmbedding, NewIssue, NewTriageLogEntry, Repo, RepoStats};

use crate::error::Error;

#[async_trait]
pub trait Store: Send + Sync {
    async fn get_repo_by_owner_repo(&self, owner: &str, name: &str) -> Result<Repo, Error>;

    async fn create_repo(&self, owner: &str, name: &str) -> Result<Repo, Error>;

    /// Convenience built on the two above: look up `(owner, name)`,
    /// creating the row lazily if absent on first reference.
    async fn find_or_create_repo(&self, owner: &str, name: &str) -> Result<Repo, Error> {
        match self.get_repo_by_owner_repo(owner, name).await {
            Ok(repo) => Ok(repo),
            Err(Error::NotFound(_)) => self.create_repo(owner, name).await,
            Err(err) => Err(err),
        }
    }

    async fn update_poll_state(
        &self,
        repo_id: i64,
        polled_at: DateTime<Utc>,
        etag: Option<&str>,
    ) -> Result<(), Error>;

    /// Upsert keyed by `(repo_id, number)`; replaces title/body/body_hash/
    /// state/author/labels/updated_at. Never touches the embedding columns.
    async fn upsert_issue(&self, repo_id: i64, issue: &NewIssue) -> Result<(), Error>;

    async fn get_issue(&self, repo_id: i64, number: i64) -> Result<Issue, Error>;

    /// Rows with a non-empty stored embedding only.
    async fn get_embeddings_for_repo(&self, repo_id: i64) -> Result<Vec<IssueEmbedding>, Error>;

    /// Atomically sets embedding bytes, model, `embedded_at = now()`, and
    /// `body_hash`.
    async fn update_embedding_with_hash(
        &self,
        repo_id: i64,
        number: i64,
        bytes: &[u8],
        model: &str,
        body_hash: &str,
    ) -> Result<(), Error>;

    /// `has_embedding` is true iff the stored embedding bytes are non-empty.
    async fn get_issue_embedding_hash(
        &self,
        repo_id: i64,
        number: i64,
    ) -> Result<(String, bool), Error>;

    async fn log_triage_action(&self, entry: NewTriageLogEntry) -> Result<(), Error>;

    async fn list_repos(&self) -> Result<Vec<Repo>, Error>;

    async fn get_all_repo_stats(&self) -> Result<Vec<RepoStats>, Error>;
}
