//! Ingestion settings

use super::error::IngestError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Names and knobs used by an ingestion run, loadable from TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSettings {
    /// File suffixes that mark a virtual-disk image in the acquisition root
    #[serde(default = "default_virtual_disk_extensions")]
    pub virtual_disk_extensions: Vec<String>,

    /// How often the orchestrator wakes while waiting on image ingestion
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_results_file")]
    pub results_file: String,

    /// Optional report, skipped when absent
    #[serde(default = "default_users_file")]
    pub users_file: String,

    /// Extracted-file tree used when there are no images
    #[serde(default = "default_root_dir")]
    pub root_dir: String,

    #[serde(default = "default_report_module")]
    pub report_module: String,

    #[serde(default = "default_artifact_module")]
    pub artifact_module: String,
}

fn default_virtual_disk_extensions() -> Vec<String> {
    vec![".vhd".to_string()]
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_results_file() -> String {
    "SearchResults.txt".to_string()
}

fn default_users_file() -> String {
    "users.txt".to_string()
}

fn default_root_dir() -> String {
    "root".to_string()
}

fn default_report_module() -> String {
    "LogicalImager".to_string()
}

fn default_artifact_module() -> String {
    "Logical Imager".to_string()
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            virtual_disk_extensions: default_virtual_disk_extensions(),
            poll_interval_ms: default_poll_interval_ms(),
            results_file: default_results_file(),
            users_file: default_users_file(),
            root_dir: default_root_dir(),
            report_module: default_report_module(),
            artifact_module: default_artifact_module(),
        }
    }
}

impl IngestSettings {
    /// Load settings from a TOML file
    pub fn load(path: &Path) -> Result<Self, IngestError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| IngestError::Settings(e.to_string()))
    }

    /// Save settings to a TOML file
    pub fn save(&self, path: &Path) -> Result<(), IngestError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| IngestError::Settings(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Case-sensitive suffix match against the configured extensions.
    pub fn is_virtual_disk(&self, file_name: &str) -> bool {
        self.virtual_disk_extensions
            .iter()
            .any(|ext| file_name.ends_with(ext.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = IngestSettings::default();
        assert_eq!(settings.results_file, "SearchResults.txt");
        assert_eq!(settings.poll_interval(), Duration::from_secs(1));
        assert!(settings.is_virtual_disk("sparse_image.vhd"));
        assert!(!settings.is_virtual_disk("sparse_image.VHD"));
        assert!(!settings.is_virtual_disk("sparse_image.vhdx"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let settings: IngestSettings = toml::from_str(
            r#"
            virtual_disk_extensions = [".vhd", ".vhdx"]
            poll_interval_ms = 50
            "#,
        )
        .unwrap();
        assert!(settings.is_virtual_disk("a.vhdx"));
        assert_eq!(settings.poll_interval(), Duration::from_millis(50));
        assert_eq!(settings.root_dir, "root");
        assert_eq!(settings.artifact_module, "Logical Imager");
    }

    #[test]
    fn test_save_and_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ingest.toml");
        let mut settings = IngestSettings::default();
        settings.users_file = "accounts.txt".to_string();
        settings.save(&path).unwrap();
        assert_eq!(IngestSettings::load(&path).unwrap(), settings);
    }

    #[test]
    fn test_bad_toml_is_settings_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ingest.toml");
        std::fs::write(&path, "poll_interval_ms = \"soon\"").unwrap();
        assert!(matches!(
            IngestSettings::load(&path),
            Err(IngestError::Settings(_))
        ));
    }
}
