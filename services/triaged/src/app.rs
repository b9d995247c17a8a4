//! Wires the config-resolved settings into the concrete adapters
//! (`SqliteStore`, `GithubClient`, `HttpEmbedder`, `HttpCompleter`,
//! `triage-notify`'s webhook notifiers) and the `triage-core` engines built
//! on top of them. Each command builds the slice of this it needs.

use std::sync::Arc;

use triage_core::capabilities::{Embedder, MultiNotifier, Notifier};
use triage_core::classify::Classifier;
use triage_core::dedup::DedupEngine;
use triage_core::store::Store;
use triage_github::GithubClient;
use triage_store_sqlite::SqliteStore;

use crate::config::Config;

pub struct App {
    pub store: Arc<dyn Store>,
    pub github: Arc<GithubClient>,
    pub dedup: DedupEngine,
    pub classifier: Option<Classifier>,
}

/// Builds the store/client/dedup/classifier bundle every command needs.
/// Fatal configuration errors (missing tokens, unopenable store) surface
/// here so the CLI can map them to a non-zero exit code before doing any
/// network or pipeline work.
pub fn build(config: &Config) -> Result<App, triage_core::Error> {
    if let Some(parent) = config.store_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|err| triage_core::Error::Fatal(format!("creating store directory: {err}")))?;
        }
    }
    let store: Arc<dyn Store> = Arc::new(
        SqliteStore::open(&config.store_path)
            .map_err(|err| triage_core::Error::Fatal(format!("opening store: {err}")))?,
    );

    if config.github_token.is_empty() {
        return Err(triage_core::Error::Fatal("github_token is not configured".into()));
    }
    let github = Arc::new(
        GithubClient::new(&config.github_token)
            .map_err(|err| triage_core::Error::Fatal(format!("building GitHub client: {err}")))?,
    );

    if config.embedding_api_key.is_empty() || config.embedding_api_base.is_empty() {
        return Err(triage_core::Error::Fatal(
            "embedding_api_base/embedding_api_key are not configured".into(),
        ));
    }
    let mut embedder = triage_github::HttpEmbedder::new(&config.embedding_api_base, &config.embedding_api_key);
    if let Some(model) = &config.embedding_model {
        embedder = embedder.with_model(model);
    }
    let embedder: Arc<dyn Embedder> = Arc::new(embedder);

    let dedup = DedupEngine::new(embedder, store.clone())
        .with_threshold(config.similarity_threshold)
        .with_max_candidates(config.max_duplicates)
        .with_max_chars(config.embed_max_chars);

    let classifier = if config.completion_api_key.is_empty() || config.completion_api_base.is_empty() {
        None
    } else {
        let mut completer =
            triage_github::HttpCompleter::new(&config.completion_api_base, &config.completion_api_key);
        if let Some(model) = &config.completion_model {
            completer = completer.with_model(model);
        }
        Some(
            Classifier::new(Arc::new(completer))
                .with_timeout(std::time::Duration::from_secs(config.request_timeout_secs)),
        )
    };

    Ok(App {
        store,
        github,
        dedup,
        classifier,
    })
}

/// Builds the notifier for `watch`'s `--notify` flag. `""` means no
/// notifier at all; `"both"` fans out to every configured webhook.
pub fn build_notifier(config: &Config, notify: &str) -> Result<Option<Arc<dyn Notifier>>, triage_core::Error> {
    let want_slack = matches!(notify, "slack" | "both");
    let want_discord = matches!(notify, "discord" | "both");

    if !want_slack && !want_discord {
        return Ok(None);
    }

    let mut notifiers: Vec<Box<dyn Notifier>> = Vec::new();
    if want_slack {
        if config.slack_webhook_url.is_empty() {
            return Err(triage_core::Error::Fatal("slack_webhook_url is not configured".into()));
        }
        notifiers.push(Box::new(triage_notify::SlackNotifier::new(&config.slack_webhook_url)));
    }
    if want_discord {
        if config.discord_webhook_url.is_empty() {
            return Err(triage_core::Error::Fatal(
                "discord_webhook_url is not configured".into(),
            ));
        }
        notifiers.push(Box::new(triage_notify::DiscordNotifier::new(&config.discord_webhook_url)));
    }

    if notifiers.len() == 1 {
        return Ok(Some(Arc::from(notifiers.pop().unwrap())));
    }
    Ok(Some(Arc::new(MultiNotifier::new(notifiers))))
}
