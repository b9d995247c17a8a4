use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use triage_core::error::Error;
use triage_core::store::Store;
use triage_protocol::{Issue, IssueEmbedding, NewIssue, NewTriageLogEntry, Repo, RepoStats};

/// An in-memory [`Store`] double, grounded on the same CRUD surface the
/// SQLite implementation exposes. Good enough for pipeline/poller/dedup
/// tests that don't care about durability.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    repos: Vec<Repo>,
    next_repo_id: i64,
    issues: HashMap<(i64, i64), Issue>,
    log: Vec<NewTriageLogEntry>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore {
            inner: Mutex::new(Inner {
                next_repo_id: 1,
                ..Default::default()
            }),
        }
    }

    pub fn logged_entries(&self) -> Vec<NewTriageLogEntry> {
        self.inner.lock().unwrap().log.clone()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_repo_by_owner_repo(&self, owner: &str, name: &str) -> Result<Repo, Error> {
        self.inner
            .lock()
            .unwrap()
            .repos
            .iter()
            .find(|r| r.owner == owner && r.name == name)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("repo {owner}/{name}")))
    }

    async fn create_repo(&self, owner: &str, name: &str) -> Result<Repo, Error> {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_repo_id;
        inner.next_repo_id += 1;
        let repo = Repo {
            id,
            owner: owner.to_owned(),
            name: name.to_owned(),
            last_polled_at: None,
            etag: None,
            created_at: Utc::now(),
        };
        inner.repos.push(repo.clone());
        Ok(repo)
    }

    async fn update_poll_state(
        &self,
        repo_id: i64,
        polled_at: DateTime<Utc>,
        etag: Option<&str>,
    ) -> Result<(), Error> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(repo) = inner.repos.iter_mut().find(|r| r.id == repo_id) {
            repo.last_polled_at = Some(polled_at);
            repo.etag = etag.map(str::to_owned);
        }
        Ok(())
    }

    async fn upsert_issue(&self, repo_id: i64, issue: &NewIssue) -> Result<(), Error> {
        let hash = triage_core::similarity::content_hash(&issue.title, &issue.body);
        let mut inner = self.inner.lock().unwrap();
        let existing = inner.issues.get(&(repo_id, issue.number)).cloned();
        inner.issues.insert(
            (repo_id, issue.number),
            Issue {
                id: existing.as_ref().map_or(issue.number, |e| e.id),
                repo_id,
                number: issue.number,
                title: issue.title.clone(),
                body: issue.body.clone(),
                body_hash: hash,
                state: issue.state.clone(),
                author: issue.author.clone(),
                labels: issue.labels.clone(),
                created_at: issue.created_at,
                updated_at: issue.updated_at,
                embedding: existing.as_ref().and_then(|e| e.embedding.clone()),
                embedding_model: existing.as_ref().map_or(String::new(), |e| e.embedding_model.clone()),
                embedded_at: existing.as_ref().and_then(|e| e.embedded_at),
            },
        );
        Ok(())
    }

    async fn get_issue(&self, repo_id: i64, number: i64) -> Result<Issue, Error> {
        self.inner
            .lock()
            .unwrap()
            .issues
            .get(&(repo_id, number))
            .cloned()
            .ok_or_else(|| Error::not_found(format!("issue {repo_id}#{number}")))
    }

    async fn get_embeddings_for_repo(&self, repo_id: i64) -> Result<Vec<IssueEmbedding>, Error> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .issues
            .values()
            .filter(|issue| issue.repo_id == repo_id && issue.embedding.as_ref().is_some_and(|e| !e.is_empty()))
            .map(|issue| IssueEmbedding {
                number: issue.number,
                bytes: issue.embedding.clone().unwrap_or_default(),
                model: issue.embedding_model.clone(),
            })
            .collect())
    }

    async fn update_embedding_with_hash(
        &self,
        repo_id: i64,
        number: i64,
        bytes: &[u8],
        model: &str,
        body_hash: &str,
    ) -> Result<(), Error> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(issue) = inner.issues.get_mut(&(repo_id, number)) {
            issue.embedding = Some(bytes.to_vec());
            issue.embedding_model = model.to_owned();
            issue.embedded_at = Some(Utc::now());
            issue.body_hash = body_hash.to_owned();
        }
        Ok(())
    }

    async fn get_issue_embedding_hash(&self, repo_id: i64, number: i64) -> Result<(String, bool), Error> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .issues
            .get(&(repo_id, number))
            .map(|issue| (issue.body_hash.clone(), issue.embedding.as_ref().is_some_and(|e| !e.is_empty())))
            .unwrap_or_default())
    }

    async fn log_triage_action(&self, entry: NewTriageLogEntry) -> Result<(), Error> {
        self.inner.lock().unwrap().log.push(entry);
        Ok(())
    }

    async fn list_repos(&self) -> Result<Vec<Repo>, Error> {
        Ok(self.inner.lock().unwrap().repos.clone())
    }

    async fn get_all_repo_stats(&self) -> Result<Vec<RepoStats>, Error> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .repos
            .iter()
            .map(|repo| {
                let issues: Vec<_> = inner.issues.values().filter(|i| i.repo_id == repo.id).collect();
                RepoStats {
                    repo_id: repo.id,
                    issue_count: issues.len() as i64,
                    embedded_count: issues
                        .iter()
                        .filter(|i| i.embedding.as_ref().is_some_and(|e| !e.is_empty()))
                        .count() as i64,
                    classified_distinct_count: inner
                        .log
                        .iter()
                        .filter(|e| e.repo_id == repo.id && !e.suggested_labels.is_empty())
                        .count() as i64,
                }
            })
            .collect())
    }
}
