//! Named background queue for pipeline work.
//!
//! Work units are keyed by job id; at most one unit per id is queued or
//! running at a time. Callers get a [`QueuedJob`] handle whose result is
//! `None` until a worker has finished the unit.

use std::collections::HashSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use crossbeam_channel::{Receiver, Sender, unbounded};
use serde::Serialize;

use crate::domain::JobKey;
use crate::error::PhenError;

const CHILD_POLL: Duration = Duration::from_millis(200);

/// Arguments of one pipeline invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineCall {
    /// Prepended to `PYTHONPATH` for the pipeline's helper scripts.
    pub library_path: Utf8PathBuf,
    pub pipeline_script: Utf8PathBuf,
    pub input_dir: Utf8PathBuf,
    pub output_dir: Utf8PathBuf,
    pub pica_cutoff: f64,
    pub node_offs: String,
}

impl PipelineCall {
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            self.pipeline_script.to_string(),
            "--inputfolder".to_string(),
            self.input_dir.to_string(),
            "--outdir".to_string(),
            self.output_dir.to_string(),
            "--accuracy_cutoff".to_string(),
            self.pica_cutoff.to_string(),
        ];
        if !self.node_offs.is_empty() {
            args.push("--omit_nodes".to_string());
            args.push(self.node_offs.clone());
        }
        args
    }

    pub fn log_dir(&self) -> Utf8PathBuf {
        self.output_dir.join("logs")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Finished { exit_code: i32 },
    TimedOut,
    Failed { reason: String },
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Finished { exit_code: 0 })
    }

    pub fn describe(&self) -> String {
        match self {
            JobOutcome::Finished { exit_code } => format!("exited with code {exit_code}"),
            JobOutcome::TimedOut => "exceeded its time limit".to_string(),
            JobOutcome::Failed { reason } => reason.clone(),
        }
    }
}

pub trait PipelineRunner: Send + Sync {
    fn run(&self, job_id: &str, call: &PipelineCall, timeout: Duration) -> JobOutcome;

    /// Asks the current and any later runs to stop as soon as possible.
    fn cancel(&self) {}
}

pub trait JobQueue: Send + Sync {
    fn name(&self) -> &str;
    fn enqueue(
        &self,
        job_id: &JobKey,
        call: PipelineCall,
        timeout: Duration,
    ) -> Result<QueuedJob, PhenError>;
}

/// Handle on an enqueued unit of work.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    id: String,
    slot: Arc<Mutex<Option<JobOutcome>>>,
}

impl QueuedJob {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            slot: Arc::new(Mutex::new(None)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn result(&self) -> Option<JobOutcome> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn complete(&self, outcome: JobOutcome) {
        *self
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(outcome);
    }

    /// Polls every `poll` until a result is available or `limit` has passed.
    pub fn wait(&self, poll: Duration, limit: Duration) -> Result<JobOutcome, PhenError> {
        let started = Instant::now();
        loop {
            if let Some(outcome) = self.result() {
                return Ok(outcome);
            }
            let elapsed = started.elapsed();
            if elapsed >= limit {
                return Err(PhenError::WaitTimeout {
                    job_id: self.id.clone(),
                    seconds: limit.as_secs(),
                });
            }
            thread::sleep(poll.min(limit - elapsed));
        }
    }
}

struct QueuedWork {
    job: QueuedJob,
    call: PipelineCall,
    timeout: Duration,
}

/// In-process queue served by a fixed pool of worker threads.
pub struct LocalQueue {
    name: String,
    sender: Sender<QueuedWork>,
    workers: Vec<JoinHandle<()>>,
    active: Arc<Mutex<HashSet<String>>>,
    runner: Arc<dyn PipelineRunner>,
}

impl LocalQueue {
    /// # Panics
    /// Panics if `worker_count` is 0.
    pub fn new(name: &str, runner: Arc<dyn PipelineRunner>, worker_count: usize) -> Self {
        assert!(worker_count > 0, "worker_count must be > 0");
        let (sender, receiver) = unbounded::<QueuedWork>();
        let active = Arc::new(Mutex::new(HashSet::new()));

        let workers = (0..worker_count)
            .map(|worker_id| {
                let receiver = receiver.clone();
                let runner = Arc::clone(&runner);
                let active = Arc::clone(&active);
                thread::spawn(move || run_worker(worker_id, receiver, runner, active))
            })
            .collect();

        tracing::info!(queue = name, workers = worker_count, "queue started");

        Self {
            name: name.to_string(),
            sender,
            workers,
            active,
            runner,
        }
    }

    /// Stops accepting work and waits for queued units to finish.
    pub fn shutdown(self) {
        drop(self.sender);
        for (i, worker) in self.workers.into_iter().enumerate() {
            if worker.join().is_err() {
                tracing::error!(worker = i, "queue worker panicked");
            }
        }
        tracing::info!(queue = %self.name, "queue stopped");
    }

    /// Cancels the running unit and everything still queued, then stops.
    pub fn abort(self) {
        tracing::warn!(queue = %self.name, "aborting queued and running jobs");
        self.runner.cancel();
        self.shutdown();
    }
}

impl JobQueue for LocalQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn enqueue(
        &self,
        job_id: &JobKey,
        call: PipelineCall,
        timeout: Duration,
    ) -> Result<QueuedJob, PhenError> {
        let id = job_id.as_str();
        {
            let mut active = self
                .active
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if !active.insert(id.to_string()) {
                return Err(PhenError::JobAlreadyQueued(id.to_string()));
            }
        }

        let job = QueuedJob::new(id);
        let work = QueuedWork {
            job: job.clone(),
            call,
            timeout,
        };
        if self.sender.send(work).is_err() {
            self.active
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .remove(id);
            return Err(PhenError::QueueClosed(self.name.clone()));
        }
        tracing::info!(queue = %self.name, job = id, timeout_s = timeout.as_secs(), "job enqueued");
        Ok(job)
    }
}

fn run_worker(
    worker_id: usize,
    receiver: Receiver<QueuedWork>,
    runner: Arc<dyn PipelineRunner>,
    active: Arc<Mutex<HashSet<String>>>,
) {
    tracing::debug!(worker = worker_id, "queue worker started");
    while let Ok(work) = receiver.recv() {
        let id = work.job.id().to_string();
        tracing::info!(worker = worker_id, job = %id, "job started");
        let outcome = runner.run(&id, &work.call, work.timeout);
        tracing::info!(worker = worker_id, job = %id, outcome = %outcome.describe(), "job finished");
        active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&id);
        work.job.complete(outcome);
    }
    tracing::debug!(worker = worker_id, "queue worker stopped");
}

/// Runs the workflow engine as a child process, logging into the call's
/// `logs` folder.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    program: String,
    leading_args: Vec<String>,
    cancelled: Arc<AtomicBool>,
}

impl ProcessRunner {
    pub fn new(program: &str, leading_args: Vec<String>) -> Self {
        Self {
            program: program.to_string(),
            leading_args,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn nextflow(program: &str) -> Self {
        Self::new(program, vec!["run".to_string()])
    }

    fn resolve_program(&self) -> Option<PathBuf> {
        let path = Path::new(&self.program);
        if path.components().count() > 1 {
            return path.exists().then(|| path.to_path_buf());
        }
        find_in_path(&self.program)
    }

    fn spawn_and_wait(
        &self,
        program: &Path,
        call: &PipelineCall,
        timeout: Duration,
    ) -> Result<JobOutcome, PhenError> {
        let log_dir = call.log_dir();
        fs::create_dir_all(log_dir.as_std_path())
            .map_err(|err| PhenError::Filesystem(format!("create {log_dir}: {err}")))?;
        let log_path = log_dir.join("pipeline.log");
        let stdout =
            File::create(log_path.as_std_path()).map_err(|err| PhenError::Filesystem(err.to_string()))?;
        let stderr = stdout
            .try_clone()
            .map_err(|err| PhenError::Filesystem(err.to_string()))?;

        let mut search_path = vec![call.library_path.clone().into_std_path_buf()];
        if let Some(existing) = std::env::var_os("PYTHONPATH") {
            search_path.extend(std::env::split_paths(&existing));
        }
        let python_path = std::env::join_paths(search_path)
            .map_err(|err| PhenError::Filesystem(err.to_string()))?;

        let mut child = Command::new(program)
            .args(&self.leading_args)
            .args(call.args())
            .env("PYTHONPATH", python_path)
            .current_dir(call.output_dir.as_std_path())
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .spawn()
            .map_err(|err| PhenError::Filesystem(format!("spawn {}: {err}", program.display())))?;

        let started = Instant::now();
        loop {
            let status = child
                .try_wait()
                .map_err(|err| PhenError::Filesystem(err.to_string()))?;
            if let Some(status) = status {
                return Ok(JobOutcome::Finished {
                    exit_code: status.code().unwrap_or(-1),
                });
            }
            if started.elapsed() >= timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Ok(JobOutcome::TimedOut);
            }
            if self.cancelled.load(Ordering::SeqCst) {
                let _ = child.kill();
                let _ = child.wait();
                return Ok(JobOutcome::Failed {
                    reason: "cancelled".to_string(),
                });
            }
            thread::sleep(CHILD_POLL);
        }
    }
}

impl PipelineRunner for ProcessRunner {
    fn run(&self, job_id: &str, call: &PipelineCall, timeout: Duration) -> JobOutcome {
        if self.cancelled.load(Ordering::SeqCst) {
            return JobOutcome::Failed {
                reason: "cancelled".to_string(),
            };
        }
        let Some(program) = self.resolve_program() else {
            return JobOutcome::Failed {
                reason: PhenError::MissingTool(self.program.clone()).to_string(),
            };
        };
        match self.spawn_and_wait(&program, call, timeout) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(job = job_id, error = %err, "pipeline could not be run");
                JobOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.exists() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.exists() {
            return Some(plain);
        }
    }
    None
}
