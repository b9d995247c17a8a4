//! `HttpEmbedder`: an OpenAI-compatible embeddings endpoint adapter for
//! [`triage_core::capabilities::Embedder`].

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use triage_core::capabilities::Embedder;
use triage_core::error::Error;

const DEFAULT_MODEL: &str = "text-embedding-3-small";

pub struct HttpEmbedder {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl HttpEmbedder {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        HttpEmbedder {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_owned(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, Error> {
        let response = self
            .http
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.model, "input": text }))
            .send()
            .await
            .map_err(|err| Error::Transport(err.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimit { retry_after_secs: 60 });
        }
        if !status.is_success() {
            return Err(Error::Transport(format!("embeddings endpoint returned {status}")));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|err| Error::InvalidResponse(err.to_string()))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|datum| datum.embedding)
            .ok_or_else(|| Error::InvalidResponse("embeddings response carried no data".to_owned()))
    }
}
