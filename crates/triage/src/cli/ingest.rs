//! Ingest command - add one acquisition to a case

use crate::cli::error::HelpfulError;
use crate::cli::output::print_table;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use tracing::info;
use triage::ingest::{
    AddAcquisitionTask, CancellationToken, IngestOutcome, IngestRequest, LogProgress,
    ProcessorResult, ProgressMonitor, RegisterImageIngestor,
};
use triage_db::{CaseBlackboard, CaseDb};

#[derive(Debug, Clone)]
pub struct IngestArgs {
    pub source: PathBuf,
    pub dest: PathBuf,
    pub case: Option<PathBuf>,
    pub device_id: Option<String>,
    pub time_zone: String,
    pub settings: Option<PathBuf>,
    pub json: bool,
}

pub fn run(args: IngestArgs) -> anyhow::Result<()> {
    let settings = super::load_settings(args.settings.as_deref())?;
    if !args.source.exists() {
        return Err(HelpfulError::path_not_found(&args.source).into());
    }
    if !args.source.is_dir() {
        return Err(HelpfulError::not_a_directory(&args.source).into());
    }

    let case_path = args
        .case
        .clone()
        .unwrap_or_else(|| triage_logging::triage_home().join("case.sqlite3"));
    let db = CaseDb::open(&case_path)
        .map_err(|e| HelpfulError::case_unavailable(&case_path, &e.to_string()))?;
    let device_id = args
        .device_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    info!(case = %case_path.display(), device_id = %device_id, "Starting ingestion");
    let task = AddAcquisitionTask::new(
        IngestRequest {
            device_id,
            time_zone: args.time_zone.clone(),
            source_dir: args.source.clone(),
            dest_dir: args.dest.clone(),
        },
        db.clone(),
        Arc::new(CaseBlackboard::new(db)),
        Arc::new(RegisterImageIngestor),
        settings,
    );
    install_cancel_handler(task.cancel_token())?;

    let progress: Arc<dyn ProgressMonitor> = if args.json {
        Arc::new(LogProgress)
    } else {
        Arc::new(|text: &str| eprintln!("{}", text))
    };
    let (tx, rx) = mpsc::channel();
    let handle = task.spawn(progress, move |outcome| {
        let _ = tx.send(outcome);
    })?;
    let outcome = rx
        .recv()
        .map_err(|_| anyhow::anyhow!("Ingestion worker exited without reporting"))?;
    if handle.join().is_err() {
        anyhow::bail!("Ingestion worker panicked");
    }

    report(&args, &outcome)?;
    if outcome.result == ProcessorResult::CriticalErrors {
        return Err(HelpfulError::ingest_failed(&args.source, &outcome.errors).into());
    }
    Ok(())
}

fn report(args: &IngestArgs, outcome: &IngestOutcome) -> anyhow::Result<()> {
    if args.json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }

    println!("Result: {}", outcome.result);
    for err in &outcome.errors {
        println!("  {}", err);
    }
    if !outcome.data_sources.is_empty() {
        println!();
        let rows = outcome
            .data_sources
            .iter()
            .map(|ds| {
                vec![
                    ds.id.to_string(),
                    ds.name.clone(),
                    ds.kind.as_str().to_string(),
                    ds.device_id.clone(),
                    ds.time_zone.clone(),
                ]
            })
            .collect();
        print_table(&["ID", "NAME", "KIND", "DEVICE", "TIME ZONE"], rows);
    }
    Ok(())
}

/// First interrupt cancels the run; a second one exits.
fn install_cancel_handler(token: CancellationToken) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use signal_hook::consts::{SIGINT, SIGTERM};
        use signal_hook::iterator::Signals;

        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        std::thread::spawn(move || {
            for sig in signals.forever() {
                if token.cancel() {
                    info!("Received signal {}, cancelling ingestion...", sig);
                    eprintln!("Cancelling, press Ctrl+C again to abort");
                } else {
                    std::process::exit(130);
                }
            }
        });
    }

    #[cfg(windows)]
    {
        ctrlc::set_handler(move || {
            if token.cancel() {
                info!("Received Ctrl+C, cancelling ingestion...");
                eprintln!("Cancelling, press Ctrl+C again to abort");
            } else {
                std::process::exit(130);
            }
        })?;
    }

    Ok(())
}
