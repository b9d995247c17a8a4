//! Dedup engine: content-hash-gated embedding, cosine-similarity
//! scoring, ranked candidate selection.

use std::sync::Arc;

use triage_protocol::{DedupResult, DuplicateCandidate, Issue};

use crate::capabilities::Embedder;
use crate::error::Error;
use crate::similarity;
use crate::store::Store;

const DEFAULT_THRESHOLD: f32 = 0.85;
const DEFAULT_MAX_CANDIDATES: usize = 3;
const DEFAULT_MAX_CHARS: usize = 8_000;

pub struct DedupEngine {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn Store>,
    threshold: f32,
    max_candidates: usize,
    max_chars: usize,
}

impl DedupEngine {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn Store>) -> Self {
        DedupEngine {
            embedder,
            store,
            threshold: DEFAULT_THRESHOLD,
            max_candidates: DEFAULT_MAX_CANDIDATES,
            max_chars: DEFAULT_MAX_CHARS,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_max_candidates(mut self, max_candidates: usize) -> Self {
        self.max_candidates = max_candidates;
        self
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    /// Concatenate `title + "\n\n" + body`, truncating to `max_chars` total
    /// while always keeping the `title + "\n\n"` prefix intact (truncating
    /// the title itself only if it alone exceeds `max_chars`). An empty body
    /// yields the (possibly truncated) title alone.
    pub fn compose_text(&self, title: &str, body: &str) -> String {
        if body.is_empty() {
            return truncate_chars(title, self.max_chars);
        }

        if title.chars().count() >= self.max_chars {
            return truncate_chars(title, self.max_chars);
        }

        let prefix = format!("{title}\n\n");
        let prefix_len = prefix.chars().count();
        let budget = self.max_chars.saturating_sub(prefix_len);
        let body_truncated = truncate_chars(body, budget);
        format!("{prefix}{body_truncated}")
    }

    /// `check_duplicate`: content-hash gate, embed-or-reuse,
    /// cosine-rank against the repo's stored embeddings.
    ///
    /// `threshold_override` of `> 0.0` takes precedence over the engine's
    /// configured threshold; `0.0` (or negative) means "use the default".
    pub async fn check_duplicate(
        &self,
        repo_id: i64,
        issue: &Issue,
        threshold_override: f32,
    ) -> Result<DedupResult, Error> {
        let effective_threshold = if threshold_override > 0.0 {
            threshold_override
        } else {
            self.threshold
        };

        let hash = similarity::content_hash(&issue.title, &issue.body);

        let current_embedding = match self
            .store
            .get_issue_embedding_hash(repo_id, issue.number)
            .await
        {
            Ok((stored_hash, has_embedding))
                if has_embedding && !hash.is_empty() && stored_hash == hash =>
            {
                let embeddings = self.store.get_embeddings_for_repo(repo_id).await?;
                embeddings
                    .into_iter()
                    .find(|e| e.number == issue.number)
                    .map(|e| similarity::decode(&e.bytes))
            }
            _ => None,
        };

        let current_embedding = match current_embedding {
            Some(v) => v,
            None => {
                let text = self.compose_text(&issue.title, &issue.body);
                let vec = self
                    .embedder
                    .embed(&text)
                    .await
                    .map_err(|err| Error::EmbeddingFailed(Box::new(err)))?;
                self.store
                    .update_embedding_with_hash(
                        repo_id,
                        issue.number,
                        &similarity::encode(&vec),
                        "",
                        &hash,
                    )
                    .await?;
                vec
            }
        };

        let mut candidates = Vec::new();
        for entry in self.store.get_embeddings_for_repo(repo_id).await? {
            if entry.number == issue.number {
                continue;
            }
            let other = similarity::decode(&entry.bytes);
            let score = match similarity::cosine(&current_embedding, &other) {
                Ok(score) => score,
                Err(Error::DimensionMismatch { .. }) => continue,
                Err(err) => return Err(err),
            };
            if score >= effective_threshold {
                candidates.push(DuplicateCandidate {
                    issue_number: entry.number,
                    score,
                });
            }
        }

        candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        candidates.truncate(self.max_candidates);

        Ok(DedupResult {
            is_duplicate: !candidates.is_empty(),
            candidates,
        })
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
