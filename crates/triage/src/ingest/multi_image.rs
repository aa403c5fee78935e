//! Sub-task that ingests each virtual disk as its own image data source.

use super::cancel::CancellationToken;
use super::error::{IngestError, Result};
use super::outcome::IngestOutcome;
use super::progress::ProgressMonitor;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use tracing::{error, info, warn};
use triage_db::{CaseDb, DataSource};

/// Boundary to the disk-image parser.
///
/// Implementations add one image (and whatever files they can read from it)
/// to the case and can remove it again.
pub trait ImageIngestor: Send + Sync {
    fn add_image(
        &self,
        db: &CaseDb,
        device_id: &str,
        image_path: &Path,
        time_zone: &str,
    ) -> Result<DataSource>;

    /// Remove an image added by [`ImageIngestor::add_image`].
    fn revert(&self, db: &CaseDb, data_source: &DataSource) -> Result<()> {
        db.delete_data_source(data_source.id)?;
        Ok(())
    }
}

/// Registers each image as a data source without reading its contents.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegisterImageIngestor;

impl ImageIngestor for RegisterImageIngestor {
    fn add_image(
        &self,
        db: &CaseDb,
        device_id: &str,
        image_path: &Path,
        time_zone: &str,
    ) -> Result<DataSource> {
        let name = image_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| image_path.to_string_lossy().to_string());
        let data_source = db.add_image_data_source(
            device_id,
            &name,
            time_zone,
            &[image_path.to_string_lossy().to_string()],
        )?;
        Ok(data_source)
    }
}

/// Adds a list of images, all or nothing.
pub struct MultiImageTask {
    pub db: CaseDb,
    pub ingestor: Arc<dyn ImageIngestor>,
    pub device_id: String,
    pub time_zone: String,
    pub image_paths: Vec<PathBuf>,
    pub progress: Arc<dyn ProgressMonitor>,
    pub cancel: CancellationToken,
}

impl MultiImageTask {
    /// Add every image in order.
    ///
    /// The first failure or an observed cancellation reverts every image
    /// added so far and yields a critical outcome with no data sources.
    pub fn run(self) -> IngestOutcome {
        let mut added: Vec<DataSource> = Vec::new();
        let mut errors = Vec::new();
        let mut cancelled = false;

        for path in &self.image_paths {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            self.progress
                .set_progress_text(&format!("Adding image {}", path.display()));
            match self
                .ingestor
                .add_image(&self.db, &self.device_id, path, &self.time_zone)
            {
                Ok(data_source) => {
                    info!(data_source_id = data_source.id, image = %path.display(), "Added image");
                    added.push(data_source);
                }
                Err(err) => {
                    error!(image = %path.display(), error = %err, "Failed to add image");
                    errors.push(format!("Failed to add image {}: {}", path.display(), err));
                    break;
                }
            }
        }
        if !cancelled && errors.is_empty() && self.cancel.is_cancelled() {
            cancelled = true;
        }

        if errors.is_empty() && !cancelled {
            return IngestOutcome::success(added);
        }

        for data_source in added.iter().rev() {
            if let Err(err) = self.ingestor.revert(&self.db, data_source) {
                warn!(data_source_id = data_source.id, error = %err, "Failed to revert image");
                errors.push(format!(
                    "Failed to revert data source {}: {}",
                    data_source.name, err
                ));
            }
        }
        if cancelled {
            errors.push(IngestError::Cancelled.to_string());
        }
        IngestOutcome::critical(errors)
    }

    /// Run on a named worker thread. The receiver yields exactly one outcome.
    pub fn spawn(self) -> io::Result<mpsc::Receiver<IngestOutcome>> {
        let (tx, rx) = mpsc::sync_channel(1);
        std::thread::Builder::new()
            .name("triage-images".to_string())
            .spawn(move || {
                let outcome = self.run();
                let _ = tx.send(outcome);
            })?;
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::outcome::ProcessorResult;
    use std::sync::Mutex;

    /// Fails on any path whose file name contains "bad".
    struct FlakyIngestor;

    impl ImageIngestor for FlakyIngestor {
        fn add_image(
            &self,
            db: &CaseDb,
            device_id: &str,
            image_path: &Path,
            time_zone: &str,
        ) -> Result<DataSource> {
            if image_path.to_string_lossy().contains("bad") {
                return Err(IngestError::SubTask("unreadable image".to_string()));
            }
            RegisterImageIngestor.add_image(db, device_id, image_path, time_zone)
        }
    }

    fn task(db: &CaseDb, ingestor: Arc<dyn ImageIngestor>, paths: &[&str]) -> MultiImageTask {
        MultiImageTask {
            db: db.clone(),
            ingestor,
            device_id: "dev".to_string(),
            time_zone: "UTC".to_string(),
            image_paths: paths.iter().map(PathBuf::from).collect(),
            progress: Arc::new(|_: &str| {}),
            cancel: CancellationToken::new(),
        }
    }

    #[test]
    fn test_adds_every_image() {
        let db = CaseDb::open_in_memory().unwrap();
        let outcome = task(&db, Arc::new(RegisterImageIngestor), &["/a/one.vhd", "/a/two.vhd"]).run();

        assert_eq!(outcome.result, ProcessorResult::NoErrors);
        let names: Vec<&str> = outcome.data_sources.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["one.vhd", "two.vhd"]);
        let paths = db.image_paths().unwrap();
        assert_eq!(paths[&outcome.data_sources[0].id], vec!["/a/one.vhd".to_string()]);
    }

    #[test]
    fn test_failure_reverts_added_images() {
        let db = CaseDb::open_in_memory().unwrap();
        let outcome = task(&db, Arc::new(FlakyIngestor), &["/a/one.vhd", "/a/bad.vhd", "/a/three.vhd"]).run();

        assert_eq!(outcome.result, ProcessorResult::CriticalErrors);
        assert!(outcome.data_sources.is_empty());
        assert!(outcome.errors[0].contains("bad.vhd"));
        assert!(db.list_data_sources().unwrap().is_empty());
    }

    #[test]
    fn test_cancel_between_images_reverts() {
        let db = CaseDb::open_in_memory().unwrap();
        let cancel = CancellationToken::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut task = task(&db, Arc::new(RegisterImageIngestor), &["/a/one.vhd", "/a/two.vhd"]);
        task.cancel = cancel.clone();
        let progress_seen = seen.clone();
        task.progress = Arc::new(move |text: &str| {
            progress_seen.lock().unwrap().push(text.to_string());
            if text.ends_with("one.vhd") {
                cancel.cancel();
            }
        });

        let outcome = task.run();
        assert_eq!(outcome.result, ProcessorResult::CriticalErrors);
        assert_eq!(outcome.errors, vec!["Ingestion cancelled".to_string()]);
        assert!(db.list_data_sources().unwrap().is_empty());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_spawn_delivers_one_outcome() {
        let db = CaseDb::open_in_memory().unwrap();
        let rx = task(&db, Arc::new(RegisterImageIngestor), &["/a/one.vhd"])
            .spawn()
            .unwrap();
        let outcome = rx.recv().unwrap();
        assert_eq!(outcome.data_sources.len(), 1);
        assert!(rx.recv().is_err());
    }
}
