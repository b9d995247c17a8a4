//! `GithubClient`: the concrete [`triage_core::poller::RemoteApi`] backing
//! the poller's issue-list pagination, conditional requests, and rate-limit
//! header extraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;

use triage_core::poller::{FetchError, FetchOutcome, FetchedIssue, FetchedPage, RemoteApi};

use crate::rate_limit::{parse_rate_limit, retry_after_secs};

const PER_PAGE: u32 = 100;

pub struct GithubClient {
    http: reqwest::Client,
    base_url: String,
}

impl GithubClient {
    pub fn new(token: &str) -> Result<Self, reqwest::Error> {
        Self::with_base_url("https://api.github.com", token)
    }

    pub fn with_base_url(base_url: &str, token: &str) -> Result<Self, reqwest::Error> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&format!("Bearer {token}"))
                .unwrap_or_else(|_| reqwest::header::HeaderValue::from_static("")),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("triage-github"),
        );
        let http = reqwest::Client::builder().default_headers(headers).build()?;
        Ok(GithubClient {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawIssue {
    number: i64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    state: String,
    user: RawUser,
    #[serde(default)]
    labels: Vec<RawLabel>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RawLabel {
    name: String,
}

impl GithubClient {
    /// Fetches a single issue by number — the `check`/`apply` CLI commands'
    /// entry point, outside the poller's paginated `RemoteApi` contract.
    pub async fn fetch_issue(
        &self,
        owner: &str,
        repo: &str,
        number: i64,
    ) -> Result<FetchedIssue, crate::error::GithubError> {
        let response = self
            .http
            .get(format!("{}/repos/{owner}/{repo}/issues/{number}", self.base_url))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(crate::error::GithubError::UnexpectedStatus(status.as_u16()));
        }
        let raw: RawIssue = response.json().await?;
        Ok(raw_to_fetched(raw))
    }

    /// Adds labels to an issue — the `apply` CLI command's remote-write
    /// step. Never removes existing labels.
    pub async fn add_labels(
        &self,
        owner: &str,
        repo: &str,
        number: i64,
        labels: &[String],
    ) -> Result<(), crate::error::GithubError> {
        let response = self
            .http
            .post(format!(
                "{}/repos/{owner}/{repo}/issues/{number}/labels",
                self.base_url
            ))
            .json(&serde_json::json!({ "labels": labels }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(crate::error::GithubError::UnexpectedStatus(status.as_u16()));
        }
        Ok(())
    }
}

fn raw_to_fetched(raw: RawIssue) -> FetchedIssue {
    FetchedIssue {
        number: raw.number,
        title: raw.title,
        body: raw.body.unwrap_or_default(),
        state: raw.state,
        author: raw.user.login,
        labels: raw.labels.into_iter().map(|l| l.name).collect(),
        created_at: raw.created_at,
        updated_at: raw.updated_at,
        is_pull_request: raw.pull_request.is_some(),
    }
}

#[async_trait]
impl RemoteApi for GithubClient {
    async fn fetch_issues_page(
        &self,
        owner: &str,
        repo: &str,
        since: Option<DateTime<Utc>>,
        etag: Option<&str>,
        page: u32,
    ) -> Result<FetchOutcome, FetchError> {
        let mut request = self
            .http
            .get(format!("{}/repos/{owner}/{repo}/issues", self.base_url))
            .query(&[
                ("state", "all".to_owned()),
                ("sort", "updated".to_owned()),
                ("direction", "asc".to_owned()),
                ("per_page", PER_PAGE.to_string()),
                ("page", page.to_string()),
            ]);

        if let Some(since) = since {
            request = request.query(&[("since", since.to_rfc3339())]);
        }
        if let Some(etag) = etag {
            request = request.header(reqwest::header::IF_NONE_MATCH, etag);
        }

        let response = request
            .send()
            .await
            .map_err(|err| FetchError::Other(crate::error::GithubError::Reqwest(err).into()))?;

        let status = response.status();
        let headers = response.headers().clone();

        if status == StatusCode::NOT_MODIFIED {
            return Ok(FetchOutcome::NotModified);
        }
        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::FORBIDDEN {
            return Err(FetchError::RateLimited {
                info: parse_rate_limit(&headers),
                retry_after_secs: retry_after_secs(&headers),
            });
        }
        if status.is_server_error() {
            return Err(FetchError::ServerError);
        }
        if !status.is_success() {
            return Err(FetchError::Other(
                crate::error::GithubError::UnexpectedStatus(status.as_u16()).into(),
            ));
        }

        let has_next_page = headers
            .get(reqwest::header::LINK)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|link| link.contains("rel=\"next\""));
        let etag = headers
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let raw_issues: Vec<RawIssue> = response.json().await.map_err(|err| {
            FetchError::Other(crate::error::GithubError::Reqwest(err).into())
        })?;

        let issues = raw_issues.into_iter().map(raw_to_fetched).collect();

        Ok(FetchOutcome::Page(FetchedPage {
            issues,
            etag,
            rate_limit: parse_rate_limit(&headers),
            has_next_page,
        }))
    }

    async fn now(&self) -> i64 {
        Utc::now().timestamp()
    }
}
