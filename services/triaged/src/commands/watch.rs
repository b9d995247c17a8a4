//! `watch [owner/repo ...]`: starts one Poller per named repo
//! (or every configured repo if none are named) plus the Pipeline, and
//! runs until Ctrl+C/SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use triage_core::broker::Broker;
use triage_core::pipeline::Pipeline;
use triage_core::poller::{Poller, RemoteApi};

use crate::app;
use crate::config::Config;

pub async fn run(
    config: &Config,
    repos: &[String],
    interval: Duration,
    notify: &str,
    dry_run: bool,
) -> Result<(), triage_core::Error> {
    let app = app::build(config)?;
    let notifier = if dry_run {
        info!("dry-run: notifications disabled");
        None
    } else {
        app::build_notifier(config, notify)?
    };

    let selected: Vec<(String, String)> = if repos.is_empty() {
        config.repos.iter().map(|r| (r.owner.clone(), r.name.clone())).collect()
    } else {
        repos
            .iter()
            .map(|s| crate::commands::parse_repo_ref(s))
            .collect::<Result<Vec<_>, _>>()
            .map_err(triage_core::Error::bad_input)?
    };
    if selected.is_empty() {
        return Err(triage_core::Error::bad_input("no repos to watch: pass some or configure them"));
    }

    let broker: Broker<triage_protocol::IssueEvent> = Broker::new();
    let root_cancel = CancellationToken::new();

    let mut pollers = Vec::new();
    for (owner, name) in &selected {
        let api: Arc<dyn RemoteApi> = app.github.clone();
        let poller = Arc::new(Poller::new(api, app.store.clone(), broker.clone(), owner.clone(), name.clone()));
        pollers.push((poller, interval));
        info!(repo = format!("{owner}/{name}").as_str(), "watching");
    }

    let pipeline = Arc::new(Pipeline::new(
        app.dedup,
        app.classifier,
        notifier,
        app.store.clone(),
        broker,
        config.default_labels.clone(),
        config.overrides.clone(),
    ));

    let supervisor_cancel = root_cancel.clone();
    let supervisor = tokio::spawn(async move {
        triage_core::wiring::supervise(supervisor_cancel, pipeline, pollers).await;
    });

    crate::signals::wait_for_shutdown().await;
    root_cancel.cancel();
    supervisor.await.map_err(|err| triage_core::Error::Fatal(err.to_string()))?;

    Ok(())
}
