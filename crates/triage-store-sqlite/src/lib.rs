//! SQLite-backed implementation of [`triage_core::store::Store`].
//!
//! A single-file rusqlite wrapper with WAL pragmas and an
//! `include_str!`-embedded schema, with queries split across per-entity
//! modules (`repo`, `issue`, `triage_log`). Concurrent writers are
//! serialized behind a single `Mutex<Connection>`; each operation runs on a
//! blocking-pool thread via `spawn_blocking` since `rusqlite` is a
//! synchronous API.

mod error;
mod issue;
mod repo;
mod triage_log;

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::Connection;

use triage_core::error::Error;
use triage_core::store::Store;
use triage_protocol::{Issue, IssueEmbedding, NewIssue, NewTriageLogEntry, Repo, RepoStats};

pub use error::{DbError, DbResult};

const SCHEMA_SQL: &str = include_str!("schema.sql");

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> DbResult<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL; \
             PRAGMA wal_autocheckpoint=1000; PRAGMA foreign_keys=ON;",
        )?;
        conn.execute_batch(SCHEMA_SQL)?;
        let store = SqliteStore {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.integrity_check()?;
        Ok(store)
    }

    fn integrity_check(&self) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        let result: String = conn.pragma_query_value(None, "integrity_check", |row| row.get(0))?;
        if result != "ok" {
            return Err(DbError::IntegrityCheckFailed(result));
        }
        Ok(())
    }

    /// Backing file size in bytes, for the `status` command. `0` for an
    /// in-memory store.
    pub async fn database_size_bytes(&self) -> DbResult<u64> {
        let conn = self.conn.clone();
        run_blocking(conn, |conn| {
            let path: Option<String> = conn.query_row("PRAGMA database_list", [], |row| row.get(2)).ok();
            Ok(match path {
                Some(path) if !path.is_empty() => std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0),
                _ => 0,
            })
        })
        .await
    }
}

/// Runs a synchronous closure against the shared connection on the blocking
/// pool, so no `await` point ever holds the mutex.
async fn run_blocking<T, F>(conn: Arc<Mutex<Connection>>, f: F) -> DbResult<T>
where
    F: FnOnce(&Connection) -> DbResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let conn = conn.lock().unwrap();
        f(&conn)
    })
    .await?
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_repo_by_owner_repo(&self, owner: &str, name: &str) -> Result<Repo, Error> {
        let (owner, name) = (owner.to_owned(), name.to_owned());
        run_blocking(self.conn.clone(), move |conn| repo::get_by_owner_repo(conn, &owner, &name))
            .await
            .map_err(Error::from)
    }

    async fn create_repo(&self, owner: &str, name: &str) -> Result<Repo, Error> {
        let (owner, name) = (owner.to_owned(), name.to_owned());
        run_blocking(self.conn.clone(), move |conn| repo::create(conn, &owner, &name))
            .await
            .map_err(Error::from)
    }

    async fn update_poll_state(
        &self,
        repo_id: i64,
        polled_at: DateTime<Utc>,
        etag: Option<&str>,
    ) -> Result<(), Error> {
        let etag = etag.map(str::to_owned);
        run_blocking(self.conn.clone(), move |conn| {
            repo::update_poll_state(conn, repo_id, polled_at, etag.as_deref())
        })
        .await
        .map_err(Error::from)
    }

    async fn upsert_issue(&self, repo_id: i64, issue: &NewIssue) -> Result<(), Error> {
        let issue = issue.clone();
        run_blocking(self.conn.clone(), move |conn| issue::upsert(conn, repo_id, &issue))
            .await
            .map_err(Error::from)
    }

    async fn get_issue(&self, repo_id: i64, number: i64) -> Result<Issue, Error> {
        run_blocking(self.conn.clone(), move |conn| issue::get(conn, repo_id, number))
            .await
            .map_err(Error::from)
    }

    async fn get_embeddings_for_repo(&self, repo_id: i64) -> Result<Vec<IssueEmbedding>, Error> {
        run_blocking(self.conn.clone(), move |conn| issue::get_embeddings_for_repo(conn, repo_id))
            .await
            .map_err(Error::from)
    }

    async fn update_embedding_with_hash(
        &self,
        repo_id: i64,
        number: i64,
        bytes: &[u8],
        model: &str,
        body_hash: &str,
    ) -> Result<(), Error> {
        let bytes = bytes.to_vec();
        let model = model.to_owned();
        let body_hash = body_hash.to_owned();
        run_blocking(self.conn.clone(), move |conn| {
            issue::update_embedding_with_hash(conn, repo_id, number, &bytes, &model, &body_hash)
        })
        .await
        .map_err(Error::from)
    }

    async fn get_issue_embedding_hash(&self, repo_id: i64, number: i64) -> Result<(String, bool), Error> {
        run_blocking(self.conn.clone(), move |conn| issue::get_embedding_hash(conn, repo_id, number))
            .await
            .map_err(Error::from)
    }

    async fn log_triage_action(&self, entry: NewTriageLogEntry) -> Result<(), Error> {
        run_blocking(self.conn.clone(), move |conn| triage_log::log(conn, entry))
            .await
            .map_err(Error::from)
    }

    async fn list_repos(&self) -> Result<Vec<Repo>, Error> {
        run_blocking(self.conn.clone(), repo::list).await.map_err(Error::from)
    }

    async fn get_all_repo_stats(&self) -> Result<Vec<RepoStats>, Error> {
        run_blocking(self.conn.clone(), triage_log::get_all_repo_stats)
            .await
            .map_err(Error::from)
    }
}
