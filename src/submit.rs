use crate::config::Settings;
use crate::db::{Database, job_repo};
use crate::domain::JobKey;
use crate::error::PhenError;
use crate::queue::{JobOutcome, JobQueue, PipelineCall};
use crate::store::Store;

/// Records the precalculation job row once. Returns `true` on first creation.
pub fn ensure_precalc_job(db: &Database) -> Result<bool, PhenError> {
    let created = job_repo::ensure(db, JobKey::precalc().as_str())?;
    if created {
        tracing::info!(job = %JobKey::precalc(), "precalculation job recorded");
    }
    Ok(created)
}

pub fn precalc_call(store: &Store, settings: &Settings) -> PipelineCall {
    let key = JobKey::precalc();
    PipelineCall {
        library_path: store.web_server_dir(),
        pipeline_script: store.pipeline_script(),
        input_dir: store.precalc_input_dir(),
        output_dir: store.job_output_dir(&key),
        pica_cutoff: settings.pica_cutoff,
        node_offs: settings.node_offs.clone(),
    }
}

/// Submits the precalculation run and blocks until the queue reports its
/// outcome or the configured wait limit passes.
pub fn submit_precalc(
    db: &Database,
    queue: &dyn JobQueue,
    store: &Store,
    settings: &Settings,
) -> Result<JobOutcome, PhenError> {
    ensure_precalc_job(db)?;
    let job = queue.enqueue(
        &JobKey::precalc(),
        precalc_call(store, settings),
        settings.precalc_timeout,
    )?;
    tracing::info!(queue = queue.name(), job = job.id(), "waiting for precalculation result");
    job.wait(settings.poll_interval, settings.wait_limit)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use camino::Utf8PathBuf;

    use super::*;
    use crate::config::{Config, ConfigLoader};
    use crate::queue::{LocalQueue, PipelineRunner};

    struct RecordingRunner;

    impl PipelineRunner for RecordingRunner {
        fn run(&self, job_id: &str, call: &PipelineCall, _timeout: Duration) -> JobOutcome {
            assert_eq!(job_id, "PHENDB_PRECALC");
            assert!(call.input_dir.ends_with("data/uploads/PHENDB_PRECALC"));
            JobOutcome::Finished { exit_code: 0 }
        }
    }

    fn settings() -> Settings {
        let mut settings = ConfigLoader::resolve_config(Config {
            base_dir: Some("/apps/phenDB".to_string()),
            ..Config::default()
        })
        .unwrap();
        settings.poll_interval = Duration::from_millis(10);
        settings.wait_limit = Duration::from_secs(5);
        settings
    }

    #[test]
    fn precalc_call_uses_layout() {
        let settings = settings();
        let store = Store::new(Utf8PathBuf::from("/apps/phenDB"));
        let call = precalc_call(&store, &settings);
        assert_eq!(
            call.output_dir,
            "/apps/phenDB/data/results/PHENDB_PRECALC_results"
        );
        assert_eq!(call.pica_cutoff, 0.5);
        assert_eq!(call.node_offs, "");
    }

    #[test]
    fn submit_records_job_then_waits_for_result() {
        let db = Database::open_in_memory().unwrap();
        let settings = settings();
        let store = Store::new(settings.base_dir.clone());
        let queue = LocalQueue::new("phenDB", Arc::new(RecordingRunner), 1);

        let outcome = submit_precalc(&db, &queue, &store, &settings).unwrap();
        assert!(outcome.is_success());
        assert!(job_repo::exists(&db, "PHENDB_PRECALC").unwrap());

        assert!(!ensure_precalc_job(&db).unwrap());
        queue.shutdown();
    }
}
