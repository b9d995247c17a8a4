//! `scan owner/repo`: lists every open issue, upserts each into
//! the store, then runs `process_single_issue` over all of them through a
//! bounded worker pool, and prints a summary.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use triage_core::pipeline::Pipeline;
use triage_core::poller::{fetch_issues_with_retry, FetchOutcome, RemoteApi};
use triage_protocol::{ChangeType, Issue, IssueEvent, NewIssue};

use crate::app;
use crate::config::Config;

pub async fn run(config: &Config, owner: &str, name: &str, workers: usize) -> Result<(), triage_core::Error> {
    let app = app::build(config)?;
    let repo = app.store.find_or_create_repo(owner, name).await?;
    let cancel = CancellationToken::new();

    let mut open_issues = Vec::new();
    let mut page = 1u32;
    loop {
        let outcome = fetch_issues_with_retry(app.github.as_ref(), owner, name, None, None, page, &cancel).await?;
        let fetched = match outcome {
            FetchOutcome::NotModified => break,
            FetchOutcome::Page(page) => page,
        };
        for issue in &fetched.issues {
            if !issue.is_pull_request && issue.state == "open" {
                open_issues.push(issue.clone());
            }
        }
        if !fetched.has_next_page {
            break;
        }
        page += 1;
    }
    info!(count = open_issues.len(), "fetched open issues");

    for issue in &open_issues {
        app.store
            .upsert_issue(
                repo.id,
                &NewIssue {
                    number: issue.number,
                    title: issue.title.clone(),
                    body: issue.body.clone(),
                    state: issue.state.clone(),
                    author: issue.author.clone(),
                    labels: issue.labels.clone(),
                    created_at: issue.created_at,
                    updated_at: issue.updated_at,
                },
            )
            .await?;
    }

    let repo_full_name = format!("{owner}/{name}");
    let broker = triage_core::broker::Broker::new();
    let pipeline = Arc::new(Pipeline::new(
        app.dedup,
        app.classifier,
        None,
        app.store.clone(),
        broker,
        config.default_labels.clone(),
        config.overrides.clone(),
    ));

    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut handles = Vec::new();
    for issue in open_issues {
        let permit = semaphore.clone().acquire_owned().await.expect("semaphore not closed");
        let pipeline = pipeline.clone();
        let repo_full_name = repo_full_name.clone();
        let repo_id = repo.id;
        handles.push(tokio::spawn(async move {
            let _permit = permit;
            let body_hash = triage_core::similarity::content_hash(&issue.title, &issue.body);
            let event = IssueEvent {
                repo_full_name,
                issue: Issue {
                    id: 0,
                    repo_id,
                    number: issue.number,
                    title: issue.title,
                    body: issue.body,
                    body_hash,
                    state: issue.state,
                    author: issue.author,
                    labels: issue.labels,
                    created_at: issue.created_at,
                    updated_at: issue.updated_at,
                    embedding: None,
                    embedding_model: String::new(),
                    embedded_at: None,
                },
                change: ChangeType::New,
            };
            pipeline.process_single_issue(event, false).await
        }));
    }

    let mut processed = 0usize;
    let mut failed = 0usize;
    for handle in handles {
        match handle.await {
            Ok(Ok(())) => processed += 1,
            Ok(Err(err)) => {
                failed += 1;
                warn!(error = %err, "scan: an issue failed to process");
            }
            Err(join_err) => {
                failed += 1;
                warn!(error = %join_err, "scan: worker task panicked");
            }
        }
    }

    println!("scan complete for {repo_full_name}: {processed} processed, {failed} failed");
    Ok(())
}
