//! triage - logical-imager acquisition ingestion and rule triage

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use triage_logging::{init_logging, LogConfig};

mod cli;

#[derive(Parser, Debug)]
#[command(name = "triage", about = "Ingest logical-imager acquisitions and triage files by rule")]
struct Cli {
    /// Enable verbose logging (info/debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate rule configurations and match them against files
    Rules {
        #[command(subcommand)]
        action: cli::rules::RulesAction,
    },
    /// List acquisitions under a directory
    Acquisitions {
        dir: PathBuf,
        /// Ingest settings (TOML)
        #[arg(long, env = "TRIAGE_SETTINGS")]
        settings: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Copy an acquisition into a case and add its evidence
    Ingest {
        /// Acquisition directory written by the imager
        #[arg(long)]
        source: PathBuf,
        /// Where the acquisition is copied to
        #[arg(long)]
        dest: PathBuf,
        /// Case database (default: $TRIAGE_HOME/case.sqlite3)
        #[arg(long, env = "TRIAGE_CASE")]
        case: Option<PathBuf>,
        /// Device id recorded on new data sources (default: random UUID)
        #[arg(long)]
        device_id: Option<String>,
        #[arg(long, default_value = "UTC")]
        time_zone: String,
        /// Ingest settings (TOML)
        #[arg(long, env = "TRIAGE_SETTINGS")]
        settings: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
}

fn run_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Rules { action } => cli::rules::run(action),
        Commands::Acquisitions {
            dir,
            settings,
            json,
        } => cli::acquisitions::run(cli::acquisitions::AcquisitionsArgs {
            dir,
            settings,
            json,
        }),
        Commands::Ingest {
            source,
            dest,
            case,
            device_id,
            time_zone,
            settings,
            json,
        } => cli::ingest::run(cli::ingest::IngestArgs {
            source,
            dest,
            case,
            device_id,
            time_zone,
            settings,
            json,
        }),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_logging(LogConfig {
        app_name: "triage",
        verbose: cli.verbose,
    }) {
        eprintln!("Warning: failed to initialize logging: {}", err);
    }

    match run_command(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{:?}", err);
            ExitCode::from(1)
        }
    }
}
