//! `HttpCompleter`: an OpenAI-compatible chat-completions adapter for
//! [`triage_core::capabilities::Completer`].

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use triage_core::capabilities::Completer;
use triage_core::error::Error;

const DEFAULT_MODEL: &str = "gpt-4o-mini";

pub struct HttpCompleter {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl HttpCompleter {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        HttpCompleter {
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
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: String,
}

#[async_trait]
impl Completer for HttpCompleter {
    async fn complete(&self, prompt: &str) -> Result<String, Error> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": [{"role": "user", "content": prompt}],
                "temperature": 0.1,
            }))
            .send()
            .await
            .map_err(|err| Error::Transport(err.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimit { retry_after_secs: 60 });
        }
        if !status.is_success() {
            return Err(Error::Transport(format!("completions endpoint returned {status}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| Error::InvalidResponse(err.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| Error::InvalidResponse("completion response carried no choices".to_owned()))
    }
}
