//! CLI module for triage

pub mod acquisitions;
pub mod error;
pub mod ingest;
pub mod output;
pub mod rules;

use error::HelpfulError;
use std::path::Path;
use triage::ingest::IngestSettings;

/// Settings from `path`, or defaults when no file is given.
pub fn load_settings(path: Option<&Path>) -> Result<IngestSettings, HelpfulError> {
    match path {
        None => Ok(IngestSettings::default()),
        Some(path) if !path.is_file() => Err(HelpfulError::path_not_found(path)),
        Some(path) => IngestSettings::load(path).map_err(|e| {
            HelpfulError::new(e.to_string())
                .with_context(format!("Settings file: {}", path.display()))
                .with_suggestion("TRY: Remove unknown keys or fix value types in the TOML file")
        }),
    }
}
