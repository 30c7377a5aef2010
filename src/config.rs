use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::error::PhenError;

pub const DEFAULT_CONFIG_FILE: &str = "phendb.json";

const DEFAULT_QUEUE: &str = "phenDB";
const DEFAULT_DAYS_BACK: u32 = 60;
const DEFAULT_PICA_CUTOFF: f64 = 0.5;
const DEFAULT_ENTREZ_EMAIL: &str = "test@test.com";
const DEFAULT_ENTREZ_RETMAX: u32 = 10_000;
const DEFAULT_PIPELINE_PROGRAM: &str = "nextflow";
const DEFAULT_POLL_SECS: u64 = 10;
const DEFAULT_PRECALC_TIMEOUT_SECS: u64 = 72 * 60 * 60;
const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 5000;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub base_dir: Option<String>,
    #[serde(default)]
    pub queue_name: Option<String>,
    #[serde(default)]
    pub days_back: Option<u32>,
    #[serde(default)]
    pub pica_cutoff: Option<f64>,
    #[serde(default)]
    pub node_offs: Option<String>,
    #[serde(default)]
    pub entrez_email: Option<String>,
    #[serde(default)]
    pub entrez_retmax: Option<u32>,
    #[serde(default)]
    pub pipeline_program: Option<String>,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,
    #[serde(default)]
    pub wait_limit_secs: Option<u64>,
    #[serde(default)]
    pub precalc_timeout_secs: Option<u64>,
    #[serde(default)]
    pub upload_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub base_dir: Utf8PathBuf,
    pub queue_name: String,
    pub days_back: u32,
    pub pica_cutoff: f64,
    pub node_offs: String,
    pub entrez_email: String,
    pub entrez_retmax: u32,
    pub pipeline_program: String,
    pub workers: usize,
    pub poll_interval: Duration,
    /// Upper bound on how long a caller blocks waiting for a job result.
    pub wait_limit: Duration,
    pub precalc_timeout: Duration,
    pub upload_timeout: Duration,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `phendb.json` in the working directory when present.
    /// Without either, every setting takes its default.
    pub fn resolve(path: Option<&str>) -> Result<Settings, PhenError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            tracing::debug!("no {DEFAULT_CONFIG_FILE} found, using defaults");
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| PhenError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| PhenError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<Settings, PhenError> {
        let base_dir = match config.base_dir {
            Some(dir) => Utf8PathBuf::from(dir),
            None => default_base_dir()?,
        };

        let pica_cutoff = config.pica_cutoff.unwrap_or(DEFAULT_PICA_CUTOFF);
        if !(0.0..=1.0).contains(&pica_cutoff) {
            return Err(PhenError::InvalidConfig(format!(
                "pica_cutoff must lie in [0, 1], got {pica_cutoff}"
            )));
        }

        let workers = config.workers.unwrap_or(1);
        if workers == 0 {
            return Err(PhenError::InvalidConfig(
                "workers must be at least 1".to_string(),
            ));
        }

        let poll_secs = config.poll_interval_secs.unwrap_or(DEFAULT_POLL_SECS);
        if poll_secs == 0 {
            return Err(PhenError::InvalidConfig(
                "poll_interval_secs must be at least 1".to_string(),
            ));
        }

        let precalc_timeout = config
            .precalc_timeout_secs
            .unwrap_or(DEFAULT_PRECALC_TIMEOUT_SECS);

        Ok(Settings {
            base_dir,
            queue_name: config
                .queue_name
                .unwrap_or_else(|| DEFAULT_QUEUE.to_string()),
            days_back: config.days_back.unwrap_or(DEFAULT_DAYS_BACK),
            pica_cutoff,
            node_offs: config.node_offs.unwrap_or_default(),
            entrez_email: config
                .entrez_email
                .unwrap_or_else(|| DEFAULT_ENTREZ_EMAIL.to_string()),
            entrez_retmax: config.entrez_retmax.unwrap_or(DEFAULT_ENTREZ_RETMAX),
            pipeline_program: config
                .pipeline_program
                .unwrap_or_else(|| DEFAULT_PIPELINE_PROGRAM.to_string()),
            workers,
            poll_interval: Duration::from_secs(poll_secs),
            wait_limit: Duration::from_secs(config.wait_limit_secs.unwrap_or(precalc_timeout)),
            precalc_timeout: Duration::from_secs(precalc_timeout),
            upload_timeout: Duration::from_secs(
                config
                    .upload_timeout_secs
                    .unwrap_or(DEFAULT_UPLOAD_TIMEOUT_SECS),
            ),
        })
    }
}

fn default_base_dir() -> Result<Utf8PathBuf, PhenError> {
    if let Ok(dir) = std::env::var("PHENDB_BASEDIR") {
        if !dir.trim().is_empty() {
            return Ok(Utf8PathBuf::from(dir.trim()));
        }
    }
    BaseDirs::new()
        .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.data_dir().join("phendb")).ok())
        .ok_or_else(|| PhenError::Filesystem("unable to resolve base directory".to_string()))
}
