//! Uploaded file repository.

use rusqlite::{OptionalExtension, Row, params};

use super::{Database, DatabaseError};

#[derive(Debug, Clone)]
pub struct UploadedFileRow {
    pub upload_key: String,
    /// Storage location of the uploaded file as a web-root relative URL,
    /// e.g. `/uploads/<key>/bins.zip`.
    pub file_input: String,
    pub created_at: String,
}

impl UploadedFileRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            upload_key: row.get("upload_key")?,
            file_input: row.get("file_input")?,
            created_at: row.get("created_at")?,
        })
    }
}

pub fn insert(db: &Database, upload_key: &str, file_input: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO uploaded_files (upload_key, file_input) VALUES (?1, ?2)",
            params![upload_key, file_input],
        )?;
        Ok(())
    })
}

pub fn find_by_key(
    db: &Database,
    upload_key: &str,
) -> Result<Option<UploadedFileRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT upload_key, file_input, created_at FROM uploaded_files WHERE upload_key = ?1",
                params![upload_key],
                UploadedFileRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}
