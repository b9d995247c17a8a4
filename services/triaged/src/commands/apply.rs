//! `apply owner/repo#N label...`: calls the remote API to add
//! labels to an issue and appends a `TriageLog` row recording the human's
//! approval, independent of whatever the pipeline previously suggested.

use triage_protocol::{NewTriageLogEntry, TriageAction};

use crate::app;
use crate::config::Config;

pub async fn run(
    config: &Config,
    owner: &str,
    name: &str,
    number: i64,
    labels: &[String],
) -> Result<(), triage_core::Error> {
    if labels.is_empty() {
        return Err(triage_core::Error::bad_input("apply needs at least one label"));
    }

    let app = app::build(config)?;
    let repo = app.store.find_or_create_repo(owner, name).await?;

    app.github
        .add_labels(owner, name, number, labels)
        .await
        .map_err(triage_core::Error::from)?;

    app.store
        .log_triage_action(NewTriageLogEntry {
            repo_id: repo.id,
            issue_number: number,
            action: TriageAction::ApplyLabels,
            duplicate_of: String::new(),
            suggested_labels: labels.join(","),
            reasoning: String::new(),
            notified_via: String::new(),
            human_decision: "approved".to_owned(),
        })
        .await?;

    println!("applied labels {labels:?} to {owner}/{name}#{number}");
    Ok(())
}
