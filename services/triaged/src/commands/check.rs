//! `check owner/repo#N`: fetches one issue and runs it through
//! dedup/classify/log, without notification.

use triage_core::pipeline::Pipeline;
use triage_protocol::{ChangeType, Issue, IssueEvent, NewIssue};

use crate::app;
use crate::config::Config;

pub async fn run(config: &Config, owner: &str, name: &str, number: i64) -> Result<(), triage_core::Error> {
    let app = app::build(config)?;
    let repo = app.store.find_or_create_repo(owner, name).await?;

    let fetched = app
        .github
        .fetch_issue(owner, name, number)
        .await
        .map_err(triage_core::Error::from)?;

    app.store
        .upsert_issue(
            repo.id,
            &NewIssue {
                number: fetched.number,
                title: fetched.title.clone(),
                body: fetched.body.clone(),
                state: fetched.state.clone(),
                author: fetched.author.clone(),
                labels: fetched.labels.clone(),
                created_at: fetched.created_at,
                updated_at: fetched.updated_at,
            },
        )
        .await?;

    let body_hash = triage_core::similarity::content_hash(&fetched.title, &fetched.body);
    let event = IssueEvent {
        repo_full_name: format!("{owner}/{name}"),
        issue: Issue {
            id: 0,
            repo_id: repo.id,
            number: fetched.number,
            title: fetched.title,
            body: fetched.body,
            body_hash,
            state: fetched.state,
            author: fetched.author,
            labels: fetched.labels,
            created_at: fetched.created_at,
            updated_at: fetched.updated_at,
            embedding: None,
            embedding_model: String::new(),
            embedded_at: None,
        },
        change: ChangeType::New,
    };

    let broker = triage_core::broker::Broker::new();
    let pipeline = Pipeline::new(
        app.dedup,
        app.classifier,
        None,
        app.store.clone(),
        broker,
        config.default_labels.clone(),
        config.overrides.clone(),
    );
    pipeline.process_single_issue(event, false).await?;

    let stored = app.store.get_issue(repo.id, number).await?;
    println!(
        "checked {owner}/{name}#{number}: title={:?} state={} labels={:?} embedded={}",
        stored.title,
        stored.state,
        stored.labels,
        stored.embedded_at.is_some()
    );
    Ok(())
}
