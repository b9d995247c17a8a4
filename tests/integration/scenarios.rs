//! End-to-end scenarios exercised through the public `triage_core` API
//! plus `triage-test-support`'s fakes — no real network or disk I/O
//! anywhere in this file.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use triage_core::broker::Broker;
use triage_core::capabilities::Completer;
use triage_core::classify::Classifier;
use triage_core::dedup::DedupEngine;
use triage_core::error::Error;
use triage_core::pipeline::Pipeline;
use triage_core::poller::{FetchError, FetchedPage, Poller};
use triage_core::similarity;
use triage_core::store::Store;
use triage_protocol::{ChangeType, Issue, IssueEvent, NewIssue, RateLimitInfo};
use triage_test_support::{CannedCompleter, CannedEmbedder, MockRemoteApi, RecordingNotifier};

fn new_issue(number: i64, title: &str, body: &str) -> Issue {
    Issue {
        id: number,
        repo_id: 1,
        number,
        title: title.to_owned(),
        body: body.to_owned(),
        body_hash: String::new(),
        state: "open".to_owned(),
        author: "alice".to_owned(),
        labels: vec![],
        created_at: Utc::now(),
        updated_at: Utc::now(),
        embedding: None,
        embedding_model: String::new(),
        embedded_at: None,
    }
}

/// A [`Completer`] that panics if ever invoked — used to assert the
/// classifier is skipped entirely on the duplicate-detection path.
struct PanicCompleter;
#[async_trait]
impl Completer for PanicCompleter {
    async fn complete(&self, _prompt: &str) -> Result<String, Error> {
        panic!("classifier should not be invoked for a duplicate issue");
    }
}

#[tokio::test]
async fn s1_new_issue_is_triaged_logged_and_notified() {
    let store: Arc<dyn Store> = Arc::new(triage_test_support::InMemoryStore::new());
    let repo = store.find_or_create_repo("acme", "widgets").await.unwrap();
    // The Poller would have upserted the raw issue row before publishing
    // the event; replicate that here so the post-pipeline read-back sees
    // both the row and the embedding the dedup step attaches to it.
    store
        .upsert_issue(
            repo.id,
            &NewIssue {
                number: 1,
                title: "App crashes on startup".to_owned(),
                body: "Details".to_owned(),
                state: "open".to_owned(),
                author: "alice".to_owned(),
                labels: vec![],
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
        )
        .await
        .unwrap();

    let embedder = Arc::new(CannedEmbedder::new(3));
    let dedup = DedupEngine::new(embedder, store.clone());
    let classifier = Classifier::new(Arc::new(CannedCompleter::new(
        r#"{"labels": ["bug"], "confidence": 0.92, "reasoning": "clear bug"}"#,
    )));
    let notifier = Arc::new(RecordingNotifier::new());
    let broker: Broker<IssueEvent> = Broker::new();
    let labels = BTreeMap::from([
        ("bug".to_owned(), "confirmed bug".to_owned()),
        ("feature".to_owned(), "feature request".to_owned()),
        ("question".to_owned(), "support question".to_owned()),
    ]);

    let pipeline = Pipeline::new(
        dedup,
        Some(classifier),
        Some(notifier.clone()),
        store.clone(),
        broker,
        labels,
        HashMap::new(),
    );

    let event = IssueEvent {
        repo_full_name: "acme/widgets".to_owned(),
        issue: new_issue(1, "App crashes on startup", "Details"),
        change: ChangeType::New,
    };
    pipeline.process_single_issue(event, true).await.unwrap();

    let notified = notifier.notified();
    assert_eq!(notified.len(), 1);
    assert_eq!(notified[0].labels[0].label, "bug");
    assert_eq!(
        notified[0].labels[0].confidence_level,
        triage_protocol::ConfidenceLevel::Suggested
    );

    let stored = store.get_issue(repo.id, 1).await.unwrap();
    assert!(stored.embedding.as_ref().is_some_and(|e| !e.is_empty()));
    assert!(!stored.body_hash.is_empty());
}

#[tokio::test]
async fn s2_duplicate_is_detected_and_classifier_is_skipped() {
    let store: Arc<dyn Store> = Arc::new(triage_test_support::InMemoryStore::new());
    let repo = store.find_or_create_repo("acme", "widgets").await.unwrap();

    store
        .update_embedding_with_hash(
            repo.id,
            1,
            &similarity::encode(&[0.9, 0.1, 0.0]),
            "test-model",
            "seed-hash-1",
        )
        .await
        .unwrap();

    let embedder = Arc::new(CannedEmbedder::new(3));
    embedder.seed("Crashes again\n\nmore detail", vec![0.89, 0.12, 0.01]);
    let dedup = DedupEngine::new(embedder, store.clone()).with_threshold(0.9);
    let classifier = Classifier::new(Arc::new(PanicCompleter));
    let broker: Broker<IssueEvent> = Broker::new();
    let labels = BTreeMap::from([("bug".to_owned(), "confirmed bug".to_owned())]);

    let pipeline = Pipeline::new(dedup, Some(classifier), None, store.clone(), broker, labels, HashMap::new());

    let event = IssueEvent {
        repo_full_name: "acme/widgets".to_owned(),
        issue: new_issue(2, "Crashes again", "more detail"),
        change: ChangeType::New,
    };
    pipeline.process_single_issue(event, false).await.unwrap();
}

#[tokio::test]
async fn s3_per_repo_threshold_override_widens_or_narrows_the_duplicate_window() {
    // Part A: override of 0.5 turns a ~0.78-cosine pair into a duplicate
    // even though the engine default (0.99) would not.
    let store: Arc<dyn Store> = Arc::new(triage_test_support::InMemoryStore::new());
    let repo = store.find_or_create_repo("acme", "widgets").await.unwrap();
    store
        .update_embedding_with_hash(repo.id, 1, &similarity::encode(&[0.9, 0.1, 0.0, 0.0]), "", "h1")
        .await
        .unwrap();
    let embedder = Arc::new(CannedEmbedder::new(4));
    embedder.seed("Incoming\n\nbody", vec![0.7, 0.7, 0.0, 0.0]);
    let dedup = DedupEngine::new(embedder, store.clone()).with_threshold(0.99);

    let mut issue = new_issue(2, "Incoming", "body");
    issue.repo_id = repo.id;
    let result = dedup.check_duplicate(repo.id, &issue, 0.5).await.unwrap();
    assert!(result.is_duplicate, "override of 0.5 should catch a ~0.78-cosine pair");

    // Part B: no override (0.0 means "use engine default") and an
    // orthogonal pair stays non-duplicate under the default 0.9 threshold.
    let store_b: Arc<dyn Store> = Arc::new(triage_test_support::InMemoryStore::new());
    let repo_b = store_b.find_or_create_repo("acme", "gadgets").await.unwrap();
    store_b
        .update_embedding_with_hash(repo_b.id, 1, &similarity::encode(&[1.0, 0.0]), "", "h1")
        .await
        .unwrap();
    let embedder_b = Arc::new(CannedEmbedder::new(2));
    embedder_b.seed("Other\n\nbody", vec![0.0, 1.0]);
    let dedup_b = DedupEngine::new(embedder_b, store_b.clone()).with_threshold(0.9);
    let mut issue_b = new_issue(2, "Other", "body");
    issue_b.repo_id = repo_b.id;
    let result_b = dedup_b.check_duplicate(repo_b.id, &issue_b, 0.0).await.unwrap();
    assert!(!result_b.is_duplicate, "orthogonal vectors must not trip the default threshold");
}

#[tokio::test]
async fn s4_not_modified_publishes_nothing_and_leaves_poll_state_untouched() {
    let store: Arc<dyn Store> = Arc::new(triage_test_support::InMemoryStore::new());
    let repo = store.find_or_create_repo("acme", "widgets").await.unwrap();
    store.update_poll_state(repo.id, Utc::now(), Some("abc")).await.unwrap();
    let stored_before = store.get_repo_by_owner_repo("acme", "widgets").await.unwrap();

    let api = Arc::new(MockRemoteApi::new());
    api.push_not_modified();

    let broker: Broker<IssueEvent> = Broker::new();
    let cancel = CancellationToken::new();
    let mut sub = broker.subscribe(cancel.clone()).await;

    let poller = Arc::new(Poller::new(api, store.clone(), broker, "acme", "widgets"));
    let poller_clone = poller.clone();
    let cancel_clone = cancel.clone();
    let handle = tokio::spawn(async move { poller_clone.run(cancel_clone, Duration::from_secs(600)).await });

    tokio::time::sleep(Duration::from_millis(30)).await;
    cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;

    assert!(tokio::time::timeout(Duration::from_millis(20), sub.recv()).await.is_err());
    let stored_after = store.get_repo_by_owner_repo("acme", "widgets").await.unwrap();
    assert_eq!(stored_after.etag.as_deref(), Some("abc"));
    assert_eq!(stored_after.last_polled_at, stored_before.last_polled_at);
}

#[tokio::test]
async fn s5_rate_limited_first_call_still_completes_the_cycle_and_advances_watermark() {
    let store: Arc<dyn Store> = Arc::new(triage_test_support::InMemoryStore::new());
    store.find_or_create_repo("acme", "widgets").await.unwrap();

    let api = Arc::new(MockRemoteApi::new());
    api.push_error(FetchError::RateLimited {
        info: RateLimitInfo::default(),
        retry_after_secs: Some(0),
    });
    let updated_at = Utc::now();
    api.push_page(FetchedPage {
        issues: vec![
            triage_core::poller::FetchedIssue {
                number: 1,
                title: "First".to_owned(),
                body: "body".to_owned(),
                state: "open".to_owned(),
                author: "alice".to_owned(),
                labels: vec![],
                created_at: updated_at,
                updated_at,
                is_pull_request: false,
            },
            triage_core::poller::FetchedIssue {
                number: 2,
                title: "Second".to_owned(),
                body: "body".to_owned(),
                state: "open".to_owned(),
                author: "bob".to_owned(),
                labels: vec![],
                created_at: updated_at,
                updated_at,
                is_pull_request: false,
            },
        ],
        etag: Some("new-etag".to_owned()),
        rate_limit: RateLimitInfo::default(),
        has_next_page: false,
    });

    let broker: Broker<IssueEvent> = Broker::new();
    let cancel = CancellationToken::new();
    let mut sub = broker.subscribe(cancel.clone()).await;

    let poller = Arc::new(Poller::new(api, store.clone(), broker, "acme", "widgets"));
    let poller_clone = poller.clone();
    let cancel_clone = cancel.clone();
    let handle = tokio::spawn(async move { poller_clone.run(cancel_clone, Duration::from_secs(600)).await });

    let first = tokio::time::timeout(Duration::from_secs(5), sub.recv())
        .await
        .expect("first event should arrive")
        .unwrap();
    let second = tokio::time::timeout(Duration::from_secs(5), sub.recv())
        .await
        .expect("second event should arrive")
        .unwrap();
    assert!(matches!(first.payload.change, ChangeType::New));
    assert!(matches!(second.payload.change, ChangeType::New));

    cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;

    let repo_after = store.get_repo_by_owner_repo("acme", "widgets").await.unwrap();
    assert!(repo_after.last_polled_at.is_some());
}

#[tokio::test]
async fn s6_cancellation_mid_event_drains_the_in_flight_log_write() {
    struct SlowEmbedder;
    #[async_trait]
    impl triage_core::capabilities::Embedder for SlowEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, Error> {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(vec![1.0, 0.0])
        }
    }

    let concrete_store = Arc::new(triage_test_support::InMemoryStore::new());
    let store: Arc<dyn Store> = concrete_store.clone();
    store.find_or_create_repo("acme", "widgets").await.unwrap();

    let dedup = DedupEngine::new(Arc::new(SlowEmbedder), store.clone());
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
    broker
        .publish(
            "issue_event",
            IssueEvent {
                repo_full_name: "acme/widgets".to_owned(),
                issue: new_issue(1, "Slow embed", "body"),
                change: ChangeType::New,
            },
        )
        .await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();

    // A second event published after cancellation must never be processed:
    // the broker tears down the subscription, so this is a no-op publish.
    broker
        .publish(
            "issue_event",
            IssueEvent {
                repo_full_name: "acme/widgets".to_owned(),
                issue: new_issue(2, "Too late", "body"),
                change: ChangeType::New,
            },
        )
        .await;

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("pipeline.run should return promptly")
        .unwrap();
    assert!(matches!(result, Err(Error::Cancelled)));

    let logged = concrete_store.logged_entries();
    assert_eq!(logged.len(), 1, "only the in-flight event should have been logged");
    assert_eq!(logged[0].issue_number, 1);
}
