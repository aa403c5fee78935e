//! Acquisitions command - list logical-imager runs under a directory

use crate::cli::error::HelpfulError;
use crate::cli::output::print_table;
use std::path::{Path, PathBuf};
use triage::ingest::{list_acquisitions, IngestSettings};

#[derive(Debug, Clone)]
pub struct AcquisitionsArgs {
    pub dir: PathBuf,
    pub settings: Option<PathBuf>,
    pub json: bool,
}

pub fn run(args: AcquisitionsArgs) -> anyhow::Result<()> {
    let settings = super::load_settings(args.settings.as_deref())?;
    list(&args.dir, &settings, args.json)
}

fn list(dir: &Path, settings: &IngestSettings, json: bool) -> anyhow::Result<()> {
    if !dir.exists() {
        return Err(HelpfulError::path_not_found(dir).into());
    }
    if !dir.is_dir() {
        return Err(HelpfulError::not_a_directory(dir).into());
    }

    let found = list_acquisitions(dir, settings)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&found)?);
        return Ok(());
    }

    if found.is_empty() {
        println!("No acquisitions found in {}", dir.display());
        println!();
        println!(
            "An acquisition is a directory containing {}.",
            settings.results_file
        );
        return Ok(());
    }

    let rows = found
        .iter()
        .map(|acq| {
            let mode = if !acq.virtual_disks.is_empty() {
                format!("{} virtual disk(s)", acq.virtual_disks.len())
            } else if acq.has_root {
                "extracted files".to_string()
            } else {
                "no images".to_string()
            };
            vec![
                acq.path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default(),
                acq.host.clone().unwrap_or_else(|| "-".to_string()),
                acq.collected_at
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".to_string()),
                mode,
                if acq.has_users_file { "yes" } else { "no" }.to_string(),
            ]
        })
        .collect();

    print_table(&["ACQUISITION", "HOST", "COLLECTED", "EVIDENCE", "USERS"], rows);
    println!();
    println!("{} acquisitions", found.len());
    Ok(())
}
