use std::io::{self, Write};

use serde::Serialize;

use crate::dispatch::UploadReceipt;
use crate::precalc::{PrecalcReport, ProgressEvent, ProgressSink};
use crate::queue::JobOutcome;
use crate::table::{ModelInfo, ResultTable};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatchResult {
    pub job: String,
    pub queue: String,
    pub outcome: Option<JobOutcome>,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_precalc(report: &PrecalcReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_table(table: &ResultTable) -> io::Result<()> {
        Self::print_json(table)
    }

    pub fn print_models(models: &[ModelInfo]) -> io::Result<()> {
        Self::print_json(&models)
    }

    pub fn print_dispatch(result: &DispatchResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_upload(receipt: &UploadReceipt) -> io::Result<()> {
        Self::print_json(receipt)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Forwards progress to the log on stderr.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => {
                tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message)
            }
            None => tracing::info!("{}", event.message),
        }
    }
}
