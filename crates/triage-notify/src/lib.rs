//! Chat webhook [`Notifier`] adapters. Each posts a provider-specific JSON
//! payload built from a [`ClassificationResult`]; `triage_core`'s
//! `MultiNotifier` fans a result out to however many of these are
//! configured.

use async_trait::async_trait;
use serde_json::json;

use triage_core::capabilities::Notifier;
use triage_core::error::Error;
use triage_protocol::ClassificationResult;

/// HTTP client timeout for webhook deliveries.
const CLIENT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

fn summary_text(result: &ClassificationResult) -> String {
    let labels = if result.labels.is_empty() {
        "no labels suggested".to_owned()
    } else {
        result
            .labels
            .iter()
            .map(|l| l.label.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!(
        "Triage result: {labels} (confidence {:.2}, {:?}) — {}",
        result.confidence, result.confidence_level, result.reasoning
    )
}

fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(CLIENT_TIMEOUT)
        .build()
        .unwrap_or_default()
}

pub struct SlackNotifier {
    http: reqwest::Client,
    webhook_url: String,
}

impl SlackNotifier {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        SlackNotifier {
            http: build_client(),
            webhook_url: webhook_url.into(),
        }
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn notify(&self, result: &ClassificationResult) -> Result<(), Error> {
        let payload = json!({ "text": summary_text(result) });
        let response = self
            .http
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|err| Error::Transport(format!("slack webhook: {err}")))?;
        if !response.status().is_success() {
            return Err(Error::Transport(format!(
                "slack webhook returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

pub struct DiscordNotifier {
    http: reqwest::Client,
    webhook_url: String,
}

impl DiscordNotifier {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        DiscordNotifier {
            http: build_client(),
            webhook_url: webhook_url.into(),
        }
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn notify(&self, result: &ClassificationResult) -> Result<(), Error> {
        let payload = json!({ "content": summary_text(result) });
        let response = self
            .http
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|err| Error::Transport(format!("discord webhook: {err}")))?;
        if !response.status().is_success() {
            return Err(Error::Transport(format!(
                "discord webhook returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_protocol::{ConfidenceLevel, LabelSuggestion};

    #[test]
    fn summary_text_lists_labels_and_confidence() {
        let result = ClassificationResult {
            labels: vec![LabelSuggestion {
                label: "bug".to_owned(),
                confidence: 0.92,
                confidence_level: ConfidenceLevel::Suggested,
            }],
            confidence: 0.92,
            reasoning: "crash on startup".to_owned(),
            confidence_level: ConfidenceLevel::Suggested,
        };
        let text = summary_text(&result);
        assert!(text.contains("bug"));
        assert!(text.contains("crash on startup"));
    }

    #[test]
    fn summary_text_handles_no_labels() {
        let result = ClassificationResult {
            labels: vec![],
            confidence: 0.0,
            reasoning: "unclear".to_owned(),
            confidence_level: ConfidenceLevel::Uncertain,
        };
        assert!(summary_text(&result).contains("no labels suggested"));
    }
}
