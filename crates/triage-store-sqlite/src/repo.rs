use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use triage_protocol::Repo;

use crate::error::{DbError, DbResult};

pub fn get_by_owner_repo(conn: &Connection, owner: &str, name: &str) -> DbResult<Repo> {
    conn.query_row(
        "SELECT id, owner, name, last_polled_at, etag, created_at
         FROM repos WHERE owner = ?1 AND name = ?2",
        params![owner, name],
        row_to_repo,
    )
    .optional()?
    .ok_or_else(|| DbError::NotFound(format!("repo {owner}/{name}")))
}

pub fn create(conn: &Connection, owner: &str, name: &str) -> DbResult<Repo> {
    let now = Utc::now();
    conn.execute(
        "INSERT INTO repos (owner, name, created_at) VALUES (?1, ?2, ?3)",
        params![owner, name, now.to_rfc3339()],
    )?;
    let id = conn.last_insert_rowid();
    Ok(Repo {
        id,
        owner: owner.to_owned(),
        name: name.to_owned(),
        last_polled_at: None,
        etag: None,
        created_at: now,
    })
}

pub fn update_poll_state(
    conn: &Connection,
    repo_id: i64,
    polled_at: DateTime<Utc>,
    etag: Option<&str>,
) -> DbResult<()> {
    conn.execute(
        "UPDATE repos SET last_polled_at = ?1, etag = ?2 WHERE id = ?3",
        params![polled_at.to_rfc3339(), etag, repo_id],
    )?;
    Ok(())
}

pub fn list(conn: &Connection) -> DbResult<Vec<Repo>> {
    let mut stmt = conn.prepare(
        "SELECT id, owner, name, last_polled_at, etag, created_at FROM repos ORDER BY owner, name",
    )?;
    let rows = stmt.query_map([], row_to_repo)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn row_to_repo(row: &rusqlite::Row) -> rusqlite::Result<Repo> {
    let last_polled_at: Option<String> = row.get(3)?;
    let created_at: String = row.get(5)?;
    Ok(Repo {
        id: row.get(0)?,
        owner: row.get(1)?,
        name: row.get(2)?,
        last_polled_at: last_polled_at.and_then(|s| parse_rfc3339(&s)),
        etag: row.get(4)?,
        created_at: parse_rfc3339(&created_at).unwrap_or_else(Utc::now),
    })
}

fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
