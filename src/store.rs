use std::fs;
use std::io;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::{Builder, TempDir};

use crate::domain::JobKey;
use crate::error::PhenError;

/// Directory layout below the installation base directory.
#[derive(Debug, Clone)]
pub struct Store {
    base_dir: Utf8PathBuf,
}

impl Store {
    pub fn new(base_dir: Utf8PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &Utf8Path {
        &self.base_dir
    }

    pub fn database_path(&self) -> Utf8PathBuf {
        self.base_dir.join("data").join("phendb.db")
    }

    /// Folder the precalculation genomes are published to.
    pub fn precalc_input_dir(&self) -> Utf8PathBuf {
        self.base_dir
            .join("data")
            .join("uploads")
            .join(crate::domain::PRECALC_JOB_KEY)
    }

    pub fn results_root(&self) -> Utf8PathBuf {
        self.base_dir.join("data").join("results")
    }

    pub fn job_output_dir(&self, key: &JobKey) -> Utf8PathBuf {
        self.results_root().join(key.results_dir_name())
    }

    pub fn job_log_dir(&self, key: &JobKey) -> Utf8PathBuf {
        self.job_output_dir(key).join("logs")
    }

    pub fn pipeline_script(&self) -> Utf8PathBuf {
        self.base_dir
            .join("source")
            .join("pipeline")
            .join("picaPipeline.nf")
    }

    /// Root that uploaded-file URLs are relative to.
    pub fn web_server_dir(&self) -> Utf8PathBuf {
        self.base_dir.join("source").join("web_server")
    }

    pub fn upload_dir(&self, key: &JobKey) -> Utf8PathBuf {
        self.web_server_dir().join("uploads").join(key.as_str())
    }

    /// Creates the output folder of a job together with its `logs` folder.
    pub fn ensure_job_dirs(&self, key: &JobKey) -> Result<(Utf8PathBuf, Utf8PathBuf), PhenError> {
        let output = self.job_output_dir(key);
        let logs = self.job_log_dir(key);
        fs::create_dir_all(logs.as_std_path())
            .map_err(|err| PhenError::Filesystem(format!("create {logs}: {err}")))?;
        Ok((output, logs))
    }

    /// Staging directory on the same filesystem as `target`, so the final
    /// publish is a rename.
    pub fn staging_dir_for(target: &Utf8Path) -> Result<TempDir, PhenError> {
        let parent = target
            .parent()
            .ok_or_else(|| PhenError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| PhenError::Filesystem(err.to_string()))?;
        Builder::new()
            .prefix(".phendb-staging")
            .tempdir_in(parent.as_std_path())
            .map_err(|err| PhenError::Filesystem(err.to_string()))
    }

    /// Replaces `target` with the staged directory.
    pub fn publish_dir(staged: TempDir, target: &Utf8Path) -> Result<(), PhenError> {
        let staged_path = staged.keep();
        atomic_rename_dir(&staged_path, target.as_std_path()).map_err(|err| {
            let _ = fs::remove_dir_all(&staged_path);
            PhenError::Filesystem(format!("publish {target}: {err}"))
        })
    }

    pub fn copy_file_atomic(source: &Path, dest: &Utf8Path) -> Result<(), PhenError> {
        let parent = dest
            .parent()
            .ok_or_else(|| PhenError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| PhenError::Filesystem(err.to_string()))?;
        let temp = Builder::new()
            .prefix(".phendb-file")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| PhenError::Filesystem(err.to_string()))?;
        fs::copy(source, temp.path()).map_err(|err| {
            PhenError::Filesystem(format!("copy {}: {err}", source.display()))
        })?;
        temp.persist(dest.as_std_path())
            .map_err(|err| PhenError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

pub fn atomic_rename_dir(from: &Path, to: &Path) -> io::Result<()> {
    if to.exists() {
        fs::remove_dir_all(to)?;
    }
    fs::rename(from, to)
}
