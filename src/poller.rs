//! Poller: per-repo polling loop, conditional-request pagination,
//! change detection against the durable store, `IssueEvent` publication.
//!
//! `RemoteApi` abstracts the issue-tracker HTTP surface so `triage-core`
//! never depends on `reqwest` directly; `triage-github::GithubClient`
//! implements it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use triage_protocol::{ChangeType, Issue, IssueEvent, NewIssue, RateLimitInfo};

use crate::broker::Broker;
use crate::error::Error;
use crate::rate_limit;
use crate::store::Store;

/// One page of fetched issues plus the pagination/conditional-request
/// metadata the poll cycle needs.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub issues: Vec<FetchedIssue>,
    pub etag: Option<String>,
    pub rate_limit: RateLimitInfo,
    pub has_next_page: bool,
}

#[derive(Debug, Clone)]
pub struct FetchedIssue {
    pub number: i64,
    pub title: String,
    pub body: String,
    pub state: String,
    pub author: String,
    pub labels: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_pull_request: bool,
}

pub enum FetchOutcome {
    NotModified,
    Page(FetchedPage),
}

/// What the remote call reported, abstracted away from any particular HTTP
/// status-code/header shape so the retry policy below stays free of
/// `reqwest` types.
pub enum FetchError {
    RateLimited {
        info: RateLimitInfo,
        retry_after_secs: Option<u64>,
    },
    ServerError,
    Other(Error),
}

#[async_trait::async_trait]
pub trait RemoteApi: Send + Sync {
    async fn fetch_issues_page(
        &self,
        owner: &str,
        repo: &str,
        since: Option<DateTime<Utc>>,
        etag: Option<&str>,
        page: u32,
    ) -> Result<FetchOutcome, FetchError>;

    async fn now(&self) -> i64;
}

const MAX_FETCH_ATTEMPTS: u32 = 3;
const PAGE_SIZE: u32 = 100;
const WATERMARK_GUARD: chrono::Duration = chrono::Duration::minutes(2);

/// `fetch_issues_with_retry`. 304 returns immediately; 403/429
/// sleep for `handle_rate_limit_error`'s computed wait and retry without
/// counting against the attempt cap; 5xx retries with `backoff(attempt-1)`;
/// anything else propagates without retrying.
pub async fn fetch_issues_with_retry(
    api: &dyn RemoteApi,
    owner: &str,
    repo: &str,
    since: Option<DateTime<Utc>>,
    etag: Option<&str>,
    page: u32,
    cancel: &CancellationToken,
) -> Result<FetchOutcome, Error> {
    let mut attempt = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        match api.fetch_issues_page(owner, repo, since, etag, page).await {
            Ok(outcome) => return Ok(outcome),
            Err(FetchError::RateLimited {
                info,
                retry_after_secs,
            }) => {
                let now = api.now().await;
                let wait = rate_limit::handle_rate_limit_error(429, &info, retry_after_secs, now)
                    .unwrap_or(Duration::from_secs(60));
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                }
                // Rate-limit sleeps do not count against the retry cap.
            }
            Err(FetchError::ServerError) => {
                attempt += 1;
                if attempt >= MAX_FETCH_ATTEMPTS {
                    return Err(Error::Transport(format!(
                        "server error fetching {owner}/{repo} after {attempt} attempts"
                    )));
                }
                tokio::select! {
                    _ = tokio::time::sleep(rate_limit::backoff(attempt - 1)) => {}
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                }
            }
            Err(FetchError::Other(err)) => return Err(err),
        }
    }
}

/// Order-independent label-set comparison, used to detect `LabelsChanged`.
fn labels_differ(a: &[String], b: &[String]) -> bool {
    let mut a_sorted = a.to_vec();
    let mut b_sorted = b.to_vec();
    a_sorted.sort();
    b_sorted.sort();
    a_sorted != b_sorted
}

/// `diff_snapshot`: compares a stored snapshot against a freshly
/// fetched issue. Never returns an empty vector — an issue with none of the
/// tracked fields changed is labeled `Other`.
fn diff_snapshot(stored: &Issue, incoming: &FetchedIssue, body_hash: &str) -> Vec<ChangeType> {
    let mut changes = Vec::new();
    if stored.title != incoming.title {
        changes.push(ChangeType::TitleEdited);
    }
    if stored.body_hash != body_hash {
        changes.push(ChangeType::BodyEdited);
    }
    if stored.state != incoming.state {
        changes.push(ChangeType::StateChanged);
    }
    if labels_differ(&stored.labels, &incoming.labels) {
        changes.push(ChangeType::LabelsChanged);
    }
    if changes.is_empty() {
        changes.push(ChangeType::Other);
    }
    changes
}

pub struct Poller {
    api: Arc<dyn RemoteApi>,
    store: Arc<dyn Store>,
    broker: Broker<IssueEvent>,
    owner: String,
    repo: String,
}

impl Poller {
    pub fn new(
        api: Arc<dyn RemoteApi>,
        store: Arc<dyn Store>,
        broker: Broker<IssueEvent>,
        owner: impl Into<String>,
        repo: impl Into<String>,
    ) -> Self {
        Poller {
            api,
            store,
            broker,
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// `diff_and_publish`.
    async fn diff_and_publish(&self, repo_id: i64, incoming: &FetchedIssue) -> Result<(), Error> {
        let body_hash = crate::similarity::content_hash(&incoming.title, &incoming.body);

        let changes = match self.store.get_issue(repo_id, incoming.number).await {
            Ok(stored) => diff_snapshot(&stored, incoming, &body_hash),
            Err(Error::NotFound(_)) => vec![ChangeType::New],
            Err(err) => return Err(err),
        };

        let full_name = self.full_name();
        for change in changes.into_iter().filter(|c| c.is_actionable()) {
            let issue = Issue {
                id: 0,
                repo_id,
                number: incoming.number,
                title: incoming.title.clone(),
                body: incoming.body.clone(),
                body_hash: body_hash.clone(),
                state: incoming.state.clone(),
                author: incoming.author.clone(),
                labels: incoming.labels.clone(),
                created_at: incoming.created_at,
                updated_at: incoming.updated_at,
                embedding: None,
                embedding_model: String::new(),
                embedded_at: None,
            };
            self.broker
                .publish(
                    "issue_event",
                    IssueEvent {
                        repo_full_name: full_name.clone(),
                        issue,
                        change,
                    },
                )
                .await;
        }

        self.store
            .upsert_issue(
                repo_id,
                &NewIssue {
                    number: incoming.number,
                    title: incoming.title.clone(),
                    body: incoming.body.clone(),
                    state: incoming.state.clone(),
                    author: incoming.author.clone(),
                    labels: incoming.labels.clone(),
                    created_at: incoming.created_at,
                    updated_at: incoming.updated_at,
                },
            )
            .await
    }

    /// One poll cycle: ensure the repo row exists, paginate, diff, publish,
    /// advance the watermark.
    async fn poll(&self, cancel: &CancellationToken) -> Result<(), Error> {
        let repo = self.store.find_or_create_repo(&self.owner, &self.repo).await?;
        let since = repo.last_polled_at;
        let etag = repo.etag.clone();

        let mut page = 1u32;
        let mut max_updated_at: Option<DateTime<Utc>> = None;
        let mut new_etag: Option<String> = None;
        let mut saw_any_issue = false;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let first_page = page == 1;
            let outcome = fetch_issues_with_retry(
                self.api.as_ref(),
                &self.owner,
                &self.repo,
                since,
                if first_page { etag.as_deref() } else { None },
                page,
                cancel,
            )
            .await?;

            let fetched = match outcome {
                FetchOutcome::NotModified if first_page => return Ok(()),
                FetchOutcome::NotModified => break,
                FetchOutcome::Page(fetched_page) => fetched_page,
            };

            if first_page {
                new_etag = fetched.etag.clone();
            }

            if rate_limit::should_throttle(&fetched.rate_limit) {
                let now = self.api.now().await;
                let wait = rate_limit::wait_duration(&fetched.rate_limit, now);
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                }
            }

            for issue in &fetched.issues {
                if issue.is_pull_request {
                    continue;
                }
                saw_any_issue = true;
                self.diff_and_publish(repo.id, issue).await?;
                max_updated_at = Some(match max_updated_at {
                    Some(current) if current >= issue.updated_at => current,
                    _ => issue.updated_at,
                });
            }

            if !fetched.has_next_page {
                break;
            }
            page += 1;
        }

        match (saw_any_issue, max_updated_at) {
            (true, Some(watermark)) => {
                let advanced = watermark - WATERMARK_GUARD;
                self.store
                    .update_poll_state(repo.id, advanced, new_etag.as_deref().or(etag.as_deref()))
                    .await?;
            }
            (false, _) if new_etag.is_some() && new_etag != etag => {
                let fallback = repo.last_polled_at.unwrap_or_else(Utc::now);
                self.store
                    .update_poll_state(repo.id, fallback, new_etag.as_deref())
                    .await?;
            }
            _ => {}
        }

        Ok(())
    }

    /// `run(ctx, interval)`.
    pub async fn run(&self, cancel: CancellationToken, interval: Duration) -> Result<(), Error> {
        if let Err(err) = self.poll(&cancel).await {
            if matches!(err, Error::Cancelled) {
                return Err(err);
            }
            warn!(repo = %self.full_name(), error = %err, "poll cycle failed");
        }

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    match self.poll(&cancel).await {
                        Ok(()) => {}
                        Err(Error::Cancelled) => return Err(Error::Cancelled),
                        Err(err) => warn!(repo = %self.full_name(), error = %err, "poll cycle failed"),
                    }
                }
                _ = cancel.cancelled() => {
                    info!(repo = %self.full_name(), "poller stopping");
                    return Err(Error::Cancelled);
                }
            }
        }
    }
}
