use thiserror::Error;

#[derive(Debug, Error)]
pub enum GithubError {
    #[error("HTTP transport: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    UnexpectedStatus(u16),
    #[error("malformed response body: {0}")]
    MalformedBody(String),
}

impl From<GithubError> for triage_core::Error {
    fn from(err: GithubError) -> Self {
        match err {
            GithubError::Reqwest(err) if err.is_timeout() => {
                triage_core::Error::Timeout(err.to_string())
            }
            GithubError::MalformedBody(msg) => triage_core::Error::InvalidResponse(msg),
            other => triage_core::Error::Transport(other.to_string()),
        }
    }
}
