use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use phendb::catalog::EntrezHttpClient;
use phendb::config::{ConfigLoader, Settings};
use phendb::db::Database;
use phendb::dispatch::{UploadDispatcher, register_upload};
use phendb::domain::JobKey;
use phendb::error::PhenError;
use phendb::fetcher::HttpGenomeSource;
use phendb::output::{DispatchResult, JsonOutput, LogSink, OutputMode};
use phendb::precalc::{Precalc, PrecalcOptions, PrecalcReport, PrecalcStatus, ProgressSink};
use phendb::queue::{JobQueue, LocalQueue, ProcessRunner};
use phendb::store::Store;
use phendb::table::{build_result_table, model_catalog};

#[derive(Parser)]
#[command(name = "phendb")]
#[command(about = "Precalculation and job dispatch for phenotype prediction on genomic bins")]
#[command(version, author)]
struct Cli {
    /// Path to the JSON config (defaults to ./phendb.json when present).
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch newly released reference genomes and run the pipeline on them")]
    Precalc(PrecalcArgs),
    #[command(about = "Send an uploaded file to the pipeline")]
    Dispatch(DispatchArgs),
    #[command(about = "Register a local file as a new upload")]
    Upload(UploadArgs),
    #[command(about = "Print the result table of a job")]
    Table(TableArgs),
    #[command(about = "List trait models")]
    Models,
}

#[derive(Args)]
struct PrecalcArgs {
    /// Look back this many days for new releases.
    #[arg(long)]
    days: Option<u32>,

    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct DispatchArgs {
    key: String,

    /// Report the pipeline outcome and fail if the run did not succeed.
    #[arg(long)]
    wait: bool,
}

#[derive(Args)]
struct UploadArgs {
    file: PathBuf,
}

#[derive(Args)]
struct TableArgs {
    job: String,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<PhenError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &PhenError) -> u8 {
    match error {
        PhenError::UploadNotFound(_)
        | PhenError::JobNotFound(_)
        | PhenError::BinNotFound(_)
        | PhenError::ConfigRead(_) => 2,
        PhenError::EntrezHttp(_)
        | PhenError::EntrezStatus { .. }
        | PhenError::TransferHttp(_)
        | PhenError::TransferStatus { .. }
        | PhenError::CorruptDownload(_)
        | PhenError::MissingTool(_) => 3,
        PhenError::JobFailed { .. } | PhenError::WaitTimeout { .. } => 4,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let settings = ConfigLoader::resolve(cli.config.as_deref())?;
    let store = Store::new(settings.base_dir.clone());
    let db = Database::open(store.database_path().as_std_path()).map_err(PhenError::from)?;

    match cli.command {
        Commands::Precalc(args) => run_precalc(args, settings, store, db, output_mode),
        Commands::Dispatch(args) => run_dispatch(args, settings, store, db, output_mode),
        Commands::Upload(args) => {
            let receipt = register_upload(&db, &store, &args.file)?;
            match output_mode {
                OutputMode::NonInteractive => JsonOutput::print_upload(&receipt).into_diagnostic(),
                OutputMode::Interactive => {
                    println!("registered upload {} ({})", receipt.key, receipt.file_input);
                    Ok(())
                }
            }
        }
        Commands::Table(args) => {
            let job: JobKey = args.job.parse()?;
            let table = build_result_table(&db, &job)?;
            match output_mode {
                OutputMode::NonInteractive => JsonOutput::print_table(&table).into_diagnostic(),
                OutputMode::Interactive => {
                    println!("Bin\tModel\tPrediction\tp-value\tAccuracy");
                    for row in &table.rows {
                        println!(
                            "{}\t{}\t{}\t{:.3}\t{:.3}",
                            row.bin_alias,
                            row.model_name,
                            row.prediction,
                            row.pica_pval,
                            row.accuracy
                        );
                    }
                    Ok(())
                }
            }
        }
        Commands::Models => {
            let models = model_catalog(&db)?;
            match output_mode {
                OutputMode::NonInteractive => JsonOutput::print_models(&models).into_diagnostic(),
                OutputMode::Interactive => {
                    for model in &models {
                        println!("{}\t{}", model.name, model.description);
                    }
                    Ok(())
                }
            }
        }
    }
}

fn start_queue(settings: &Settings) -> Arc<LocalQueue> {
    let runner = Arc::new(ProcessRunner::nextflow(&settings.pipeline_program));
    Arc::new(LocalQueue::new(
        &settings.queue_name,
        runner,
        settings.workers,
    ))
}

fn stop_queue(queue: Arc<LocalQueue>) {
    match Arc::try_unwrap(queue) {
        Ok(queue) => queue.shutdown(),
        Err(_) => tracing::warn!("queue still shared at exit; pending jobs are abandoned"),
    }
}

fn abort_queue(queue: Arc<LocalQueue>) {
    match Arc::try_unwrap(queue) {
        Ok(queue) => queue.abort(),
        Err(_) => tracing::warn!("queue still shared at exit; running jobs are not cancelled"),
    }
}

fn run_precalc(
    args: PrecalcArgs,
    mut settings: Settings,
    store: Store,
    db: Database,
    output_mode: OutputMode,
) -> miette::Result<()> {
    if let Some(days) = args.days {
        settings.days_back = days;
    }
    let catalog = EntrezHttpClient::new(&settings.entrez_email, settings.entrez_retmax)?;
    let source = HttpGenomeSource::new()?;
    let queue = start_queue(&settings);
    let precalc = Precalc::new(settings, store, db, catalog, source);

    let options = PrecalcOptions {
        dry_run: args.dry_run,
    };
    let today = chrono::Local::now().date_naive();
    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Interactive => &LogSink,
        OutputMode::NonInteractive => &JsonOutput,
    };
    let result = precalc.run(queue.as_ref(), today, &options, sink);
    match &result {
        Err(PhenError::WaitTimeout { .. }) => abort_queue(queue),
        _ => stop_queue(queue),
    }
    let report = result?;

    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_precalc(&report).into_diagnostic(),
        OutputMode::Interactive => {
            print_precalc_summary(&report);
            Ok(())
        }
    }
}

fn print_precalc_summary(report: &PrecalcReport) {
    println!(
        "releases {} to {}: {} new reference genomes",
        report.window_from,
        report.window_to,
        report.genomes.len()
    );
    match &report.result {
        PrecalcStatus::NoNewGenomes => println!("nothing to do"),
        PrecalcStatus::DryRun => {
            for genome in &report.genomes {
                println!(
                    "  {} {} (taxid {})",
                    genome.assembly_id, genome.species_name, genome.tax_id
                );
            }
        }
        PrecalcStatus::NothingFetched => println!("no genome could be fetched"),
        PrecalcStatus::Annotated { bins } => {
            println!("fetched {} genomes, annotated {bins} bins", report.fetched.len());
        }
    }
}

fn run_dispatch(
    args: DispatchArgs,
    settings: Settings,
    store: Store,
    db: Database,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let key: JobKey = args.key.parse()?;
    let queue = start_queue(&settings);
    let shared: Arc<dyn JobQueue> = queue.clone();
    let dispatcher = UploadDispatcher::new(db, store, shared, &settings);

    let handle = dispatcher.dispatch(key.clone());
    drop(dispatcher);
    let joined = handle
        .join()
        .map_err(|_| PhenError::DispatchPanicked(key.to_string()));
    let job = match joined.and_then(|result| result) {
        Ok(job) => job,
        Err(err) => {
            stop_queue(queue);
            return Err(err.into());
        }
    };

    let outcome = if args.wait {
        match job.wait(settings.poll_interval, settings.upload_timeout) {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                abort_queue(queue);
                return Err(err.into());
            }
        }
    } else {
        None
    };
    stop_queue(queue);

    let result = DispatchResult {
        job: job.id().to_string(),
        queue: settings.queue_name.clone(),
        outcome: outcome.clone(),
    };
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_dispatch(&result).into_diagnostic()?,
        OutputMode::Interactive => match &outcome {
            Some(outcome) => println!("job {} {}", result.job, outcome.describe()),
            None => println!("job {} dispatched on {}", result.job, result.queue),
        },
    }

    match outcome {
        Some(outcome) if !outcome.is_success() => Err(PhenError::JobFailed {
            job_id: key.to_string(),
            reason: outcome.describe(),
        }
        .into()),
        _ => Ok(()),
    }
}
