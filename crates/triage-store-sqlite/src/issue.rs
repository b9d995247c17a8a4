use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use triage_protocol::{Issue, IssueEmbedding, NewIssue};

use crate::error::{DbError, DbResult};

pub fn upsert(conn: &Connection, repo_id: i64, issue: &NewIssue) -> DbResult<()> {
    let labels = serde_json::to_string(&issue.labels).expect("Vec<String> always serializes");
    let body_hash = triage_core::similarity::content_hash(&issue.title, &issue.body);
    conn.execute(
        "INSERT INTO issues
            (repo_id, number, title, body, body_hash, state, author, labels, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT (repo_id, number) DO UPDATE SET
            title = excluded.title,
            body = excluded.body,
            body_hash = excluded.body_hash,
            state = excluded.state,
            author = excluded.author,
            labels = excluded.labels,
            updated_at = excluded.updated_at",
        params![
            repo_id,
            issue.number,
            issue.title,
            issue.body,
            body_hash,
            issue.state,
            issue.author,
            labels,
            issue.created_at.to_rfc3339(),
            issue.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, repo_id: i64, number: i64) -> DbResult<Issue> {
    conn.query_row(
        "SELECT id, repo_id, number, title, body, body_hash, state, author, labels,
                created_at, updated_at, embedding, embedding_model, embedded_at
         FROM issues WHERE repo_id = ?1 AND number = ?2",
        params![repo_id, number],
        row_to_issue,
    )
    .optional()?
    .ok_or_else(|| DbError::NotFound(format!("issue {repo_id}#{number}")))
}

pub fn get_embeddings_for_repo(conn: &Connection, repo_id: i64) -> DbResult<Vec<IssueEmbedding>> {
    let mut stmt = conn.prepare(
        "SELECT number, embedding, embedding_model FROM issues
         WHERE repo_id = ?1 AND embedding IS NOT NULL AND length(embedding) > 0",
    )?;
    let rows = stmt.query_map(params![repo_id], |row| {
        Ok(IssueEmbedding {
            number: row.get(0)?,
            bytes: row.get(1)?,
            model: row.get(2)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn update_embedding_with_hash(
    conn: &Connection,
    repo_id: i64,
    number: i64,
    bytes: &[u8],
    model: &str,
    body_hash: &str,
) -> DbResult<()> {
    conn.execute(
        "UPDATE issues SET embedding = ?1, embedding_model = ?2, embedded_at = ?3, body_hash = ?4
         WHERE repo_id = ?5 AND number = ?6",
        params![
            bytes,
            model,
            Utc::now().to_rfc3339(),
            body_hash,
            repo_id,
            number,
        ],
    )?;
    Ok(())
}

pub fn get_embedding_hash(conn: &Connection, repo_id: i64, number: i64) -> DbResult<(String, bool)> {
    conn.query_row(
        "SELECT body_hash, embedding IS NOT NULL AND length(embedding) > 0
         FROM issues WHERE repo_id = ?1 AND number = ?2",
        params![repo_id, number],
        |row| Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?)),
    )
    .optional()
    .map(|opt| opt.unwrap_or_default())
    .map_err(DbError::from)
}

fn row_to_issue(row: &rusqlite::Row) -> rusqlite::Result<Issue> {
    let labels: String = row.get(8)?;
    let created_at: String = row.get(9)?;
    let updated_at: String = row.get(10)?;
    let embedded_at: Option<String> = row.get(13)?;
    Ok(Issue {
        id: row.get(0)?,
        repo_id: row.get(1)?,
        number: row.get(2)?,
        title: row.get(3)?,
        body: row.get(4)?,
        body_hash: row.get(5)?,
        state: row.get(6)?,
        author: row.get(7)?,
        labels: serde_json::from_str(&labels).unwrap_or_default(),
        created_at: parse_rfc3339(&created_at),
        updated_at: parse_rfc3339(&updated_at),
        embedding: row.get(11)?,
        embedding_model: row.get(12)?,
        embedded_at: embedded_at.map(|s| parse_rfc3339(&s)),
    })
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
