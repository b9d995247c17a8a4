// triage-protocol: shared data-model and in-flight message types.
//
// These types are the vocabulary every other crate in the workspace shares:
// the durable-store row shapes (`Repo`, `Issue`, `TriageLogEntry`), the
// broker payload (`IssueEvent`), and the small value types the dedup engine
// and classifier pass between each other. Nothing here talks to a database
// or an HTTP client — those live in `triage-store-sqlite` and `triage-github`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Repo
// ---------------------------------------------------------------------------

/// A watched issue-tracker repository, identified by `(owner, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repo {
    pub id: i64,
    pub owner: String,
    pub name: String,
    pub last_polled_at: Option<DateTime<Utc>>,
    /// Opaque conditional-request validator returned by the remote API.
    pub etag: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Repo {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

// ---------------------------------------------------------------------------
// Issue
// ---------------------------------------------------------------------------

/// A single tracked issue, belonging to one [`Repo`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: i64,
    pub repo_id: i64,
    pub number: i64,
    pub title: String,
    pub body: String,
    /// SHA-256 hex digest of `title || "\n\n" || body`; reflects the content
    /// the stored embedding (if any) was computed from.
    pub body_hash: String,
    pub state: String,
    pub author: String,
    pub labels: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<u8>>,
    #[serde(default)]
    pub embedding_model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedded_at: Option<DateTime<Utc>>,
}

/// A read-shape projection over [`Issue`] used by the dedup engine to
/// enumerate candidates without pulling full issue bodies back out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueEmbedding {
    pub number: i64,
    pub bytes: Vec<u8>,
    pub model: String,
}

/// A new issue as received from the remote API, not yet assigned a
/// database `id`. Produced by the poller's response-to-domain conversion,
/// consumed by `upsert_issue`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIssue {
    pub number: i64,
    pub title: String,
    pub body: String,
    pub state: String,
    pub author: String,
    pub labels: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Change detection / in-flight event
// ---------------------------------------------------------------------------

/// What kind of change the poller observed between the stored snapshot and
/// the freshly fetched issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeType {
    New,
    TitleEdited,
    BodyEdited,
    StateChanged,
    LabelsChanged,
    Other,
}

impl ChangeType {
    /// `{New, TitleEdited, BodyEdited}` — the subset the pipeline acts on.
    pub fn is_actionable(self) -> bool {
        matches!(
            self,
            ChangeType::New | ChangeType::TitleEdited | ChangeType::BodyEdited
        )
    }
}

/// A detected change, published by a Poller and consumed by the Pipeline.
/// Never persisted — this is purely an in-flight broker payload.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueEvent {
    /// `"owner/name"`.
    pub repo_full_name: String,
    pub issue: Issue,
    pub change: ChangeType,
}

// ---------------------------------------------------------------------------
// Triage log
// ---------------------------------------------------------------------------

/// One append-only row recording the outcome of processing a single event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageLogEntry {
    pub id: i64,
    pub repo_id: i64,
    pub issue_number: i64,
    pub action: TriageAction,
    /// `"#12, #45"` style text; empty when there were no duplicates.
    pub duplicate_of: String,
    /// Comma-joined label names; empty when no labels were suggested.
    pub suggested_labels: String,
    pub reasoning: String,
    pub notified_via: String,
    pub human_decision: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageAction {
    Triaged,
    Duplicate,
    ApplyLabels,
}

impl TriageAction {
    pub fn as_str(self) -> &'static str {
        match self {
            TriageAction::Triaged => "triaged",
            TriageAction::Duplicate => "duplicate",
            TriageAction::ApplyLabels => "apply_labels",
        }
    }
}

// ---------------------------------------------------------------------------
// Dedup
// ---------------------------------------------------------------------------

/// One candidate duplicate, with its cosine similarity score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DuplicateCandidate {
    pub issue_number: i64,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DedupResult {
    pub is_duplicate: bool,
    pub candidates: Vec<DuplicateCandidate>,
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Suggested,
    Possible,
    Uncertain,
}

impl ConfidenceLevel {
    pub fn from_confidence(confidence: f32) -> Self {
        if confidence >= 0.9 {
            ConfidenceLevel::Suggested
        } else if confidence >= 0.7 {
            ConfidenceLevel::Possible
        } else {
            ConfidenceLevel::Uncertain
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelSuggestion {
    pub label: String,
    pub confidence: f32,
    pub confidence_level: ConfidenceLevel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub labels: Vec<LabelSuggestion>,
    pub confidence: f32,
    pub reasoning: String,
    pub confidence_level: ConfidenceLevel,
}

// ---------------------------------------------------------------------------
// Rate limiting
// ---------------------------------------------------------------------------

/// Parsed `X-RateLimit-*` headers from a remote API response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RateLimitInfo {
    pub remaining: Option<i64>,
    /// Epoch seconds at which the limit window resets.
    pub reset_at: Option<i64>,
}

/// A [`TriageLogEntry`] not yet assigned an `id`/`created_at`, as produced
/// by the pipeline and handed to `Store::log_triage_action`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTriageLogEntry {
    pub repo_id: i64,
    pub issue_number: i64,
    pub action: TriageAction,
    pub duplicate_of: String,
    pub suggested_labels: String,
    pub reasoning: String,
    pub notified_via: String,
    pub human_decision: String,
}

/// Per-repo aggregate counts for the `status` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RepoStats {
    pub repo_id: i64,
    pub issue_count: i64,
    pub embedded_count: i64,
    pub classified_distinct_count: i64,
}

// ---------------------------------------------------------------------------
// Per-repo pipeline overrides
// ---------------------------------------------------------------------------

/// Per-repo overrides loaded from config; absence of an entry means "use
/// the engine/classifier defaults".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepoOverride {
    pub custom_prompt: String,
    /// `0.0` means "use the engine's configured threshold".
    pub similarity_threshold: f32,
    pub labels: std::collections::HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_type_actionable_subset_matches_spec() {
        assert!(ChangeType::New.is_actionable());
        assert!(ChangeType::TitleEdited.is_actionable());
        assert!(ChangeType::BodyEdited.is_actionable());
        assert!(!ChangeType::StateChanged.is_actionable());
        assert!(!ChangeType::LabelsChanged.is_actionable());
        assert!(!ChangeType::Other.is_actionable());
    }

    #[test]
    fn confidence_level_buckets_are_inclusive_on_the_high_side() {
        assert_eq!(ConfidenceLevel::from_confidence(0.9), ConfidenceLevel::Suggested);
        assert_eq!(ConfidenceLevel::from_confidence(0.89999), ConfidenceLevel::Possible);
        assert_eq!(ConfidenceLevel::from_confidence(0.7), ConfidenceLevel::Possible);
        assert_eq!(ConfidenceLevel::from_confidence(0.69999), ConfidenceLevel::Uncertain);
    }

    #[test]
    fn triage_action_as_str_matches_persisted_strings() {
        assert_eq!(TriageAction::Triaged.as_str(), "triaged");
        assert_eq!(TriageAction::Duplicate.as_str(), "duplicate");
        assert_eq!(TriageAction::ApplyLabels.as_str(), "apply_labels");
    }
}
