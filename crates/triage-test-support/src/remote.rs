use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use triage_core::poller::{FetchError, FetchOutcome, FetchedPage, RemoteApi};

/// A scriptable [`RemoteApi`] double: each call to `fetch_issues_page` pops
/// the next outcome off a queue, grounded on the scripted-response style of
/// a mock device client. Panics if the script runs dry, since that means a
/// test exercised more fetch calls than it accounted for.
pub struct MockRemoteApi {
    script: Mutex<Vec<Result<FetchOutcome, FetchError>>>,
    now: i64,
}

impl MockRemoteApi {
    pub fn new() -> Self {
        MockRemoteApi {
            script: Mutex::new(Vec::new()),
            now: 0,
        }
    }

    pub fn with_now(now: i64) -> Self {
        MockRemoteApi {
            script: Mutex::new(Vec::new()),
            now,
        }
    }

    /// Queues an outcome. Calls consume the queue in FIFO order.
    pub fn push_page(&self, page: FetchedPage) {
        self.script.lock().unwrap().push(Ok(FetchOutcome::Page(page)));
    }

    pub fn push_not_modified(&self) {
        self.script.lock().unwrap().push(Ok(FetchOutcome::NotModified));
    }

    pub fn push_error(&self, err: FetchError) {
        self.script.lock().unwrap().push(Err(err));
    }
}

impl Default for MockRemoteApi {
    fn default() -> Self {
        MockRemoteApi::new()
    }
}

#[async_trait]
impl RemoteApi for MockRemoteApi {
    async fn fetch_issues_page(
        &self,
        _owner: &str,
        _repo: &str,
        _since: Option<DateTime<Utc>>,
        _etag: Option<&str>,
        _page: u32,
    ) -> Result<FetchOutcome, FetchError> {
        let mut script = self.script.lock().unwrap();
        if script.is_empty() {
            panic!("MockRemoteApi script exhausted");
        }
        script.remove(0)
    }

    async fn now(&self) -> i64 {
        self.now
    }
}
