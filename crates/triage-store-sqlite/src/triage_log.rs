use chrono::Utc;
use rusqlite::{params, Connection};

use triage_protocol::{NewTriageLogEntry, RepoStats};

use crate::error::DbResult;

pub fn log(conn: &Connection, entry: NewTriageLogEntry) -> DbResult<()> {
    conn.execute(
        "INSERT INTO triage_log
            (repo_id, issue_number, action, duplicate_of, suggested_labels,
             reasoning, notified_via, human_decision, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            entry.repo_id,
            entry.issue_number,
            entry.action.as_str(),
            entry.duplicate_of,
            entry.suggested_labels,
            entry.reasoning,
            entry.notified_via,
            entry.human_decision,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn get_all_repo_stats(conn: &Connection) -> DbResult<Vec<RepoStats>> {
    let mut stmt = conn.prepare(
        "SELECT
            r.id,
            COUNT(DISTINCT i.id) AS issue_count,
            COUNT(DISTINCT CASE WHEN i.embedding IS NOT NULL AND length(i.embedding) > 0 THEN i.id END) AS embedded_count,
            COUNT(DISTINCT CASE WHEN t.suggested_labels != '' THEN t.issue_number END) AS classified_distinct_count
         FROM repos r
         LEFT JOIN issues i ON i.repo_id = r.id
         LEFT JOIN triage_log t ON t.repo_id = r.id
         GROUP BY r.id
         ORDER BY r.id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(RepoStats {
            repo_id: row.get(0)?,
            issue_count: row.get(1)?,
            embedded_count: row.get(2)?,
            classified_distinct_count: row.get(3)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}
