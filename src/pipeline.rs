//! Pipeline: the broker subscriber that serializes dedup,
//! classification, logging, and notification for each actionable
//! `IssueEvent`, with bounded-drain graceful shutdown.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use triage_protocol::{IssueEvent, NewTriageLogEntry, RepoOverride, TriageAction};

use crate::broker::Broker;
use crate::capabilities::Notifier;
use crate::classify::Classifier;
use crate::dedup::DedupEngine;
use crate::error::Error;
use crate::store::Store;

/// Hard ceiling on in-flight event processing once shutdown begins.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);
const STEP_RETRY_ATTEMPTS: i64 = 3;

pub struct Pipeline {
    dedup: DedupEngine,
    classifier: Option<Classifier>,
    notifier: Option<Arc<dyn Notifier>>,
    store: Arc<dyn Store>,
    broker: Broker<IssueEvent>,
    labels: BTreeMap<String, String>,
    overrides: HashMap<String, RepoOverride>,
}

impl Pipeline {
    pub fn new(
        dedup: DedupEngine,
        classifier: Option<Classifier>,
        notifier: Option<Arc<dyn Notifier>>,
        store: Arc<dyn Store>,
        broker: Broker<IssueEvent>,
        labels: BTreeMap<String, String>,
        overrides: HashMap<String, RepoOverride>,
    ) -> Self {
        Pipeline {
            dedup,
            classifier,
            notifier,
            store,
            broker,
            labels,
            overrides,
        }
    }

    /// `run(ctx)`. Subscribes once; processes events one at a
    /// time in receive order. Cancellation stops accepting new events but
    /// lets the current one finish on a detached, drain-timeout-bounded
    /// context; a closed subscription (no more publishers) ends the loop
    /// cleanly.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), Error> {
        let mut subscription = self.broker.subscribe(cancel.clone()).await;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("pipeline stopping, no further events will be accepted");
                    return Err(Error::Cancelled);
                }
                event = subscription.recv() => {
                    let Some(event) = event else {
                        info!("pipeline subscription closed, draining complete");
                        return Ok(());
                    };
                    self.handle_event(event.payload).await;
                }
            }
        }
    }

    /// `process_single_issue` — the one-shot entry point `scan`/`check` drive
    /// directly, outside the broker subscription loop. `notify` lets `check`
    /// run the full dedup/classify/log path without delivering a
    /// notification.
    pub async fn process_single_issue(&self, event: IssueEvent, notify: bool) -> Result<(), Error> {
        self.process_issue_inner(event, notify).await
    }

    /// `handle_event`: filters to the actionable change subset,
    /// runs the event on a detached drain-bounded deadline, logs
    /// start/completion/duration.
    async fn handle_event(&self, event: IssueEvent) {
        if !event.change.is_actionable() {
            return;
        }

        let repo_full_name = event.repo_full_name.clone();
        let issue_number = event.issue.number;
        let started = std::time::Instant::now();
        info!(repo = %repo_full_name, issue = issue_number, "processing issue event");

        match tokio::time::timeout(DRAIN_TIMEOUT, self.process_issue_inner(event, true)).await {
            Ok(Ok(_)) => {
                info!(
                    repo = %repo_full_name,
                    issue = issue_number,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "issue event processed"
                );
            }
            Ok(Err(err)) => {
                warn!(
                    repo = %repo_full_name,
                    issue = issue_number,
                    error = %err,
                    "issue event processing failed"
                );
            }
            Err(_) => {
                warn!(
                    repo = %repo_full_name,
                    issue = issue_number,
                    "issue event processing aborted at drain deadline"
                );
            }
        }
    }

    /// `process_issue`: runs dedup, classification, and logging in order,
    /// then notification last. `notify` gates the final
    /// notification step only; dedup, classification, and logging always run.
    async fn process_issue_inner(&self, event: IssueEvent, notify: bool) -> Result<(), Error> {
        let (owner, name) = event
            .repo_full_name
            .split_once('/')
            .ok_or_else(|| Error::bad_input(format!("malformed repo name: {}", event.repo_full_name)))?;
        let repo = self.store.find_or_create_repo(owner, name).await?;

        let override_entry = self.overrides.get(&event.repo_full_name);
        let threshold_override = override_entry.map_or(0.0, |o| o.similarity_threshold);
        let custom_prompt = override_entry.map_or("", |o| o.custom_prompt.as_str());
        let override_labels: Option<BTreeMap<String, String>> = override_entry
            .filter(|o| !o.labels.is_empty())
            .map(|o| o.labels.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
        let labels: &BTreeMap<String, String> = override_labels.as_ref().unwrap_or(&self.labels);

        let never_cancelled = CancellationToken::new();
        let dedup_result = crate::retry::run(&never_cancelled, STEP_RETRY_ATTEMPTS, || {
            self.dedup.check_duplicate(repo.id, &event.issue, threshold_override)
        })
        .await
        .unwrap_or_else(|err| {
            warn!(repo = %event.repo_full_name, issue = event.issue.number, error = %err, "dedup step failed, proceeding with no duplicates");
            triage_protocol::DedupResult {
                is_duplicate: false,
                candidates: vec![],
            }
        });
        let is_duplicate = dedup_result.is_duplicate;

        let classification = if !is_duplicate && self.classifier.is_some() && !labels.is_empty() {
            let classifier = self.classifier.as_ref().unwrap();
            match crate::retry::run(&never_cancelled, STEP_RETRY_ATTEMPTS, || {
                classifier.classify(&event.repo_full_name, labels, &event.issue, custom_prompt)
            })
            .await
            {
                Ok(result) => Some(result),
                Err(err) => {
                    warn!(repo = %event.repo_full_name, issue = event.issue.number, error = %err, "classify step failed, proceeding with no labels");
                    None
                }
            }
        } else {
            None
        };

        let duplicate_of = dedup_result
            .candidates
            .iter()
            .map(|c| format!("#{}", c.issue_number))
            .collect::<Vec<_>>()
            .join(", ");
        let suggested_labels = classification
            .as_ref()
            .map(|c| {
                c.labels
                    .iter()
                    .map(|l| l.label.clone())
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .unwrap_or_default();
        let reasoning = classification.as_ref().map(|c| c.reasoning.clone()).unwrap_or_default();

        self.store
            .log_triage_action(NewTriageLogEntry {
                repo_id: repo.id,
                issue_number: event.issue.number,
                action: if is_duplicate {
                    TriageAction::Duplicate
                } else {
                    TriageAction::Triaged
                },
                duplicate_of,
                suggested_labels,
                reasoning,
                notified_via: String::new(),
                human_decision: String::new(),
            })
            .await?;

        if let (true, Some(notifier), Some(classification)) = (notify, &self.notifier, &classification) {
            let result = crate::retry::run(&never_cancelled, STEP_RETRY_ATTEMPTS, || {
                notifier.notify(classification)
            })
            .await;
            if let Err(err) = result {
                warn!(repo = %event.repo_full_name, issue = event.issue.number, error = %err, "notify step failed");
            }
        }

        Ok(())
    }
}
