//! Job repository. A row's existence marks a job as queued or in progress.

use rusqlite::{OptionalExtension, Row, params};

use super::{Database, DatabaseError};

#[derive(Debug, Clone)]
pub struct JobRow {
    pub job_key: String,
    pub created_at: String,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            job_key: row.get("job_key")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Creates the job row unless it already exists. Returns `true` when a row
/// was inserted.
pub fn ensure(db: &Database, job_key: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO jobs (job_key) VALUES (?1)",
            params![job_key],
        )?;
        Ok(inserted == 1)
    })
}

pub fn exists(db: &Database, job_key: &str) -> Result<bool, DatabaseError> {
    Ok(find_by_key(db, job_key)?.is_some())
}

pub fn find_by_key(db: &Database, job_key: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT job_key, created_at FROM jobs WHERE job_key = ?1",
                params![job_key],
                JobRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}
