//! The scheduled precalculation run: find newly released reference genomes,
//! publish them to the precalculation input folder, run the pipeline on them
//! and annotate the resulting bins with their catalog taxonomy.

use std::time::{Duration, Instant};

use chrono::NaiveDate;
use serde::Serialize;

use crate::annotate::annotate_precalc_bins;
use crate::catalog::{CatalogClient, ReleaseWindow, latest_reference_genomes, release_window};
use crate::config::Settings;
use crate::db::Database;
use crate::domain::{GenomeRecord, JobKey};
use crate::error::PhenError;
use crate::fetcher::{FetchedGenome, GenomeSource, fetch_genomes};
use crate::queue::JobQueue;
use crate::store::Store;
use crate::submit::submit_precalc;

#[derive(Debug, Clone, Default)]
pub struct PrecalcOptions {
    /// Query the catalog only; nothing is downloaded or submitted.
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PrecalcStatus {
    NoNewGenomes,
    NothingFetched,
    DryRun,
    Annotated { bins: usize },
}

#[derive(Debug, Clone, Serialize)]
pub struct PrecalcReport {
    pub window_from: NaiveDate,
    pub window_to: NaiveDate,
    pub genomes: Vec<GenomeRecord>,
    pub fetched: Vec<FetchedGenome>,
    pub result: PrecalcStatus,
}

impl PrecalcReport {
    fn new(window: &ReleaseWindow, genomes: Vec<GenomeRecord>, result: PrecalcStatus) -> Self {
        Self {
            window_from: window.from,
            window_to: window.to,
            genomes,
            fetched: Vec::new(),
            result,
        }
    }
}

pub struct Precalc<C: CatalogClient, G: GenomeSource> {
    settings: Settings,
    store: Store,
    db: Database,
    catalog: C,
    source: G,
}

impl<C: CatalogClient, G: GenomeSource> Precalc<C, G> {
    pub fn new(settings: Settings, store: Store, db: Database, catalog: C, source: G) -> Self {
        Self {
            settings,
            store,
            db,
            catalog,
            source,
        }
    }

    /// Runs one precalculation cycle for genomes released in the
    /// `days_back` days up to `today`.
    ///
    /// A pipeline run that does not succeed is reported as
    /// [`PhenError::JobFailed`]; bins are only annotated after success.
    pub fn run(
        &self,
        queue: &dyn JobQueue,
        today: NaiveDate,
        options: &PrecalcOptions,
        sink: &dyn ProgressSink,
    ) -> Result<PrecalcReport, PhenError> {
        let started = Instant::now();
        let key = JobKey::precalc();
        if !options.dry_run {
            self.store.ensure_job_dirs(&key)?;
        }

        let window = release_window(today, self.settings.days_back)?;
        sink.event(ProgressEvent {
            message: format!("phase=Search; releases {} to {}", window.from, window.to),
            elapsed: None,
        });
        let genomes = latest_reference_genomes(&self.catalog, &window)?;
        sink.event(ProgressEvent {
            message: format!("phase=Search; {} new reference genomes", genomes.len()),
            elapsed: Some(started.elapsed()),
        });

        if genomes.is_empty() {
            tracing::info!("no new reference genomes released");
            return Ok(PrecalcReport::new(&window, genomes, PrecalcStatus::NoNewGenomes));
        }
        if options.dry_run {
            return Ok(PrecalcReport::new(&window, genomes, PrecalcStatus::DryRun));
        }

        sink.event(ProgressEvent {
            message: format!("phase=Fetch; {}", self.store.precalc_input_dir()),
            elapsed: Some(started.elapsed()),
        });
        let fetched = fetch_genomes(&self.source, &genomes, &self.store.precalc_input_dir())?;
        if fetched.is_empty() {
            tracing::warn!(genomes = genomes.len(), "no genome could be fetched");
            return Ok(PrecalcReport::new(&window, genomes, PrecalcStatus::NothingFetched));
        }

        sink.event(ProgressEvent {
            message: format!("phase=Pipeline; {} genomes queued on {}", fetched.len(), queue.name()),
            elapsed: Some(started.elapsed()),
        });
        let outcome = submit_precalc(&self.db, queue, &self.store, &self.settings)?;
        if !outcome.is_success() {
            return Err(PhenError::JobFailed {
                job_id: key.to_string(),
                reason: outcome.describe(),
            });
        }

        let records: Vec<GenomeRecord> = fetched.iter().map(|f| f.record.clone()).collect();
        let bins = annotate_precalc_bins(&self.db, &records)?;
        sink.event(ProgressEvent {
            message: format!("phase=Annotate; {bins} bins"),
            elapsed: Some(started.elapsed()),
        });

        let mut report = PrecalcReport::new(&window, genomes, PrecalcStatus::Annotated { bins });
        report.fetched = fetched;
        Ok(report)
    }
}
