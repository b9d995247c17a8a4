use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("integrity check failed: {0}")]
    IntegrityCheckFailed(String),
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("row not found: {0}")]
    NotFound(String),
    #[error("blocking task join failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type DbResult<T> = Result<T, DbError>;

impl From<DbError> for triage_core::Error {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(what) => triage_core::Error::NotFound(what),
            other => triage_core::Error::Fatal(other.to_string()),
        }
    }
}
