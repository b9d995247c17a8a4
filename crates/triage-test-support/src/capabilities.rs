use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use triage_core::capabilities::{Completer, Embedder, Notifier};
use triage_core::error::Error;
use triage_protocol::ClassificationResult;

/// Returns a fixed vector for seeded text, `[1.0, 0.0, ...]` otherwise.
pub struct CannedEmbedder {
    seeded: Mutex<HashMap<String, Vec<f32>>>,
    dimensions: usize,
}

impl CannedEmbedder {
    pub fn new(dimensions: usize) -> Self {
        CannedEmbedder {
            seeded: Mutex::new(HashMap::new()),
            dimensions,
        }
    }

    pub fn seed(&self, text: impl Into<String>, vector: Vec<f32>) {
        self.seeded.lock().unwrap().insert(text.into(), vector);
    }
}

#[async_trait]
impl Embedder for CannedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, Error> {
        if let Some(vector) = self.seeded.lock().unwrap().get(text) {
            return Ok(vector.clone());
        }
        let mut vector = vec![0.0; self.dimensions];
        if !vector.is_empty() {
            vector[0] = 1.0;
        }
        Ok(vector)
    }
}

/// Always returns the same scripted raw completion text.
pub struct CannedCompleter {
    response: String,
}

impl CannedCompleter {
    pub fn new(response: impl Into<String>) -> Self {
        CannedCompleter {
            response: response.into(),
        }
    }
}

#[async_trait]
impl Completer for CannedCompleter {
    async fn complete(&self, _prompt: &str) -> Result<String, Error> {
        Ok(self.response.clone())
    }
}

/// Records every [`ClassificationResult`] it's asked to notify about.
#[derive(Default)]
pub struct RecordingNotifier {
    notified: Mutex<Vec<ClassificationResult>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        RecordingNotifier::default()
    }

    pub fn notified(&self) -> Vec<ClassificationResult> {
        self.notified.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, result: &ClassificationResult) -> Result<(), Error> {
        self.notified.lock().unwrap().push(result.clone());
        Ok(())
    }
}
