//! `status`: prints per-repo issue/embedding/classification
//! counts plus the store's on-disk size. Opens the store directly rather
//! than going through `app::build`, since this command never talks to
//! GitHub or the embedding/completion APIs.

use triage_core::store::Store;
use triage_store_sqlite::SqliteStore;

use crate::config::Config;

pub async fn run(config: &Config) -> Result<(), triage_core::Error> {
    let store = SqliteStore::open(&config.store_path)
        .map_err(|err| triage_core::Error::Fatal(format!("opening store: {err}")))?;

    let repos = store.list_repos().await?;
    let stats = store.get_all_repo_stats().await?;
    let size_bytes = store
        .database_size_bytes()
        .await
        .map_err(|err| triage_core::Error::Fatal(format!("reading store size: {err}")))?;

    if repos.is_empty() {
        println!("no repos tracked yet");
    }
    for repo in &repos {
        let full_name = format!("{}/{}", repo.owner, repo.name);
        let repo_stats = stats.iter().find(|s| s.repo_id == repo.id).copied().unwrap_or_default();
        println!(
            "{full_name}: {} issues, {} embedded, {} distinct classifications",
            repo_stats.issue_count, repo_stats.embedded_count, repo_stats.classified_distinct_count
        );
    }
    println!("store size: {size_bytes} bytes");
    Ok(())
}
