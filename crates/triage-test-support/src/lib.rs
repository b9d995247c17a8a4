//! In-memory test doubles for `triage_core`'s `Store`, `Embedder`,
//! `Completer`, `Notifier`, and `RemoteApi` traits, shared across
//! `triage-core`, adapter crates, and the integration test suite.

pub mod capabilities;
pub mod remote;
pub mod store;

pub use capabilities::{CannedCompleter, CannedEmbedder, RecordingNotifier};
pub use remote::MockRemoteApi;
pub use store::InMemoryStore;
