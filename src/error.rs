use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::db::DatabaseError;

#[derive(Debug, Error, Diagnostic)]
pub enum PhenError {
    #[error("invalid assembly accession: {0}")]
    InvalidAssemblyAccession(String),

    #[error("invalid job key: {0}")]
    InvalidJobKey(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Entrez request failed: {0}")]
    EntrezHttp(String),

    #[error("Entrez returned status {status}: {message}")]
    EntrezStatus { status: u16, message: String },

    #[error("genome transfer failed: {0}")]
    TransferHttp(String),

    #[error("genome server returned status {status}: {message}")]
    TransferStatus { status: u16, message: String },

    #[error("downloaded genome is not a valid gzip stream: {0}")]
    CorruptDownload(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error(transparent)]
    #[diagnostic(code(phendb::database))]
    Database(#[from] DatabaseError),

    #[error("uploaded file not found: {0}")]
    UploadNotFound(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("bin not found in database: {0}")]
    #[diagnostic(help("the pipeline registers bins on success; check its log folder"))]
    BinNotFound(String),

    #[error("job {0} is already queued or running")]
    JobAlreadyQueued(String),

    #[error("job queue {0} is shut down")]
    QueueClosed(String),

    #[error("timed out after {seconds}s waiting for job {job_id}")]
    WaitTimeout { job_id: String, seconds: u64 },

    #[error("pipeline job {job_id} did not succeed: {reason}")]
    JobFailed { job_id: String, reason: String },

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("dispatch thread panicked for upload {0}")]
    DispatchPanicked(String),
}
