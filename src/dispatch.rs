use std::path::{Component, Path};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::config::Settings;
use crate::db::upload_repo::{self, UploadedFileRow};
use crate::db::{Database, job_repo};
use crate::domain::JobKey;
use crate::error::PhenError;
use crate::queue::{JobQueue, PipelineCall, QueuedJob};
use crate::store::Store;

/// Sends interactively uploaded data to the pipeline without blocking the
/// caller.
#[derive(Clone)]
pub struct UploadDispatcher {
    db: Database,
    store: Store,
    queue: Arc<dyn JobQueue>,
    pica_cutoff: f64,
    node_offs: String,
    timeout: Duration,
}

impl UploadDispatcher {
    pub fn new(db: Database, store: Store, queue: Arc<dyn JobQueue>, settings: &Settings) -> Self {
        Self {
            db,
            store,
            queue,
            pica_cutoff: settings.pica_cutoff,
            node_offs: settings.node_offs.clone(),
            timeout: settings.upload_timeout,
        }
    }

    /// Resolves, prepares and enqueues the upload on a separate thread.
    pub fn dispatch(&self, key: JobKey) -> JoinHandle<Result<QueuedJob, PhenError>> {
        let dispatcher = self.clone();
        thread::spawn(move || {
            let result = dispatcher.submit(&key);
            if let Err(err) = &result {
                tracing::error!(upload = %key, error = %err, "dispatch failed");
            }
            result
        })
    }

    pub fn submit(&self, key: &JobKey) -> Result<QueuedJob, PhenError> {
        let upload = upload_repo::find_by_key(&self.db, key.as_str())?
            .ok_or_else(|| PhenError::UploadNotFound(key.to_string()))?;
        let input_dir = self.input_dir_for(&upload)?;
        tracing::info!(upload = %key, input = %input_dir, "dispatching upload");

        let (output_dir, _logs) = self.store.ensure_job_dirs(key)?;
        job_repo::ensure(&self.db, key.as_str())?;

        let call = PipelineCall {
            library_path: self.store.web_server_dir(),
            pipeline_script: self.store.pipeline_script(),
            input_dir,
            output_dir,
            pica_cutoff: self.pica_cutoff,
            node_offs: self.node_offs.clone(),
        };
        self.queue.enqueue(key, call, self.timeout)
    }

    /// Folder holding the uploaded file, from its web-root relative URL.
    pub fn input_dir_for(&self, upload: &UploadedFileRow) -> Result<Utf8PathBuf, PhenError> {
        let relative = Utf8Path::new(upload.file_input.trim_start_matches('/'))
            .parent()
            .unwrap_or(Utf8Path::new(""));
        let escapes = relative
            .as_std_path()
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(PhenError::Filesystem(format!(
                "upload location escapes web root: {}",
                upload.file_input
            )));
        }
        Ok(self.store.web_server_dir().join(relative))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadReceipt {
    pub key: JobKey,
    pub file_input: String,
}

/// Copies `source` into the upload area under a fresh key and records it.
pub fn register_upload(
    db: &Database,
    store: &Store,
    source: &Path,
) -> Result<UploadReceipt, PhenError> {
    let file_name = source
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            PhenError::Filesystem(format!("invalid upload file name: {}", source.display()))
        })?;
    let key = JobKey::generate();
    let dest = store.upload_dir(&key).join(file_name);
    Store::copy_file_atomic(source, &dest)?;

    let file_input = format!("/uploads/{}/{file_name}", key.as_str());
    upload_repo::insert(db, key.as_str(), &file_input)?;
    tracing::info!(upload = %key, file = file_name, "upload registered");
    Ok(UploadReceipt { key, file_input })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::config::{Config, ConfigLoader};
    use crate::queue::{JobOutcome, LocalQueue, PipelineRunner};

    struct OkRunner;

    impl PipelineRunner for OkRunner {
        fn run(&self, _job_id: &str, _call: &PipelineCall, _timeout: Duration) -> JobOutcome {
            JobOutcome::Finished { exit_code: 0 }
        }
    }

    fn dispatcher(base: &Utf8Path) -> (UploadDispatcher, Database) {
        let settings = ConfigLoader::resolve_config(Config {
            base_dir: Some(base.to_string()),
            ..Config::default()
        })
        .unwrap();
        let db = Database::open_in_memory().unwrap();
        let queue = Arc::new(LocalQueue::new("phenDB", Arc::new(OkRunner), 1));
        let dispatcher =
            UploadDispatcher::new(db.clone(), Store::new(base.to_path_buf()), queue, &settings);
        (dispatcher, db)
    }

    #[test]
    fn input_dir_is_parent_of_upload_url() {
        let (dispatcher, _db) = dispatcher(Utf8Path::new("/apps/phenDB"));
        let upload = UploadedFileRow {
            upload_key: "k".to_string(),
            file_input: "/uploads/k/bins.zip".to_string(),
            created_at: String::new(),
        };
        assert_eq!(
            dispatcher.input_dir_for(&upload).unwrap(),
            "/apps/phenDB/source/web_server/uploads/k"
        );

        let escaping = UploadedFileRow {
            file_input: "/uploads/../../etc/passwd".to_string(),
            ..upload
        };
        assert!(dispatcher.input_dir_for(&escaping).is_err());
    }

    #[test]
    fn unknown_upload_fails_on_dispatch_thread() {
        let temp = tempfile::tempdir().unwrap();
        let base = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let (dispatcher, _db) = dispatcher(&base);

        let handle = dispatcher.dispatch("missing".parse().unwrap());
        let result = handle.join().unwrap();
        assert_matches!(result, Err(PhenError::UploadNotFound(_)));
    }

    #[test]
    fn registered_upload_is_dispatched() {
        let temp = tempfile::tempdir().unwrap();
        let base = Utf8PathBuf::from_path_buf(temp.path().join("phendb")).unwrap();
        let (dispatcher, db) = dispatcher(&base);
        let source = temp.path().join("bins.zip");
        std::fs::write(&source, b"PK").unwrap();

        let receipt = register_upload(&db, &Store::new(base.clone()), &source).unwrap();
        assert!(
            base.join("source/web_server")
                .join(receipt.file_input.trim_start_matches('/'))
                .exists()
        );

        let job = dispatcher.dispatch(receipt.key.clone()).join().unwrap().unwrap();
        assert_eq!(job.id(), receipt.key.as_str());
        let outcome = job
            .wait(Duration::from_millis(10), Duration::from_secs(5))
            .unwrap();
        assert!(outcome.is_success());
        assert!(base.join("data/results").join(receipt.key.results_dir_name()).join("logs").exists());
        assert!(job_repo::exists(&db, receipt.key.as_str()).unwrap());
    }
}
