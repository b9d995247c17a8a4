//! The three small capability interfaces the core calls through (spec
//! §4.6/§4.7/§6, design note in §9): `Embedder`, `Completer`, `Notifier`.
//! Concrete HTTP-backed implementations live in `triage-github` and
//! `triage-notify`; the core only ever holds `Arc<dyn Trait>`.

use async_trait::async_trait;

use triage_protocol::ClassificationResult;

use crate::error::Error;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, Error>;
}

#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, Error>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, result: &ClassificationResult) -> Result<(), Error>;
}

/// Fan-out combinator: invokes every child notifier even if earlier ones
/// error, and joins their errors so a caller can inspect each one.
pub struct MultiNotifier {
    notifiers: Vec<Box<dyn Notifier>>,
}

impl MultiNotifier {
    pub fn new(notifiers: Vec<Box<dyn Notifier>>) -> Self {
        MultiNotifier { notifiers }
    }
}

#[async_trait]
impl Notifier for MultiNotifier {
    async fn notify(&self, result: &ClassificationResult) -> Result<(), Error> {
        let mut errors = Vec::new();
        for notifier in &self.notifiers {
            if let Err(err) = notifier.notify(result).await {
                errors.push(err);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::join(errors))
        }
    }
}
