//! Ingestion of one logical-imager acquisition into a case.
//!
//! The run copies the acquisition, registers its reports, adds the evidence
//! either as virtual-disk images (on a sub-task thread) or as one local-files
//! data source, then tags the manifest hits as interesting files.

use super::cancel::CancellationToken;
use super::copy::copy_dir_recursive;
use super::error::{IngestError, ManifestError};
use super::importer::{import_local_files, LocalImport};
use super::interesting::{tag_interesting_files, LookupMode, TaggingJob};
use super::multi_image::{ImageIngestor, MultiImageTask};
use super::outcome::{IngestOutcome, ProcessorResult};
use super::phase::{IngestPhase, PhaseTracker};
use super::progress::ProgressMonitor;
use super::settings::IngestSettings;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{error, info, info_span, warn};
use triage_db::{Blackboard, CaseDb, DataSource};

/// What to ingest and where the copy goes.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub device_id: String,
    pub time_zone: String,
    /// Acquisition directory as produced by the imager
    pub source_dir: PathBuf,
    /// Case-local copy of the acquisition
    pub dest_dir: PathBuf,
}

/// Single-use ingestion task for one acquisition.
pub struct AddAcquisitionTask {
    request: IngestRequest,
    db: CaseDb,
    blackboard: Arc<dyn Blackboard>,
    ingestor: Arc<dyn ImageIngestor>,
    settings: IngestSettings,
    cancel: CancellationToken,
    phase: PhaseTracker,
}

/// Handle to a task running on its own thread.
pub struct IngestHandle {
    cancel: CancellationToken,
    phase: PhaseTracker,
    thread: JoinHandle<()>,
}

impl IngestHandle {
    /// Request cancellation. Safe from any thread; repeated calls are no-ops.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn phase(&self) -> IngestPhase {
        self.phase.get()
    }

    pub fn join(self) -> std::thread::Result<()> {
        self.thread.join()
    }
}

/// Early exit carrying the outcome to report.
type Step<T> = std::result::Result<T, IngestOutcome>;

impl AddAcquisitionTask {
    pub fn new(
        request: IngestRequest,
        db: CaseDb,
        blackboard: Arc<dyn Blackboard>,
        ingestor: Arc<dyn ImageIngestor>,
        settings: IngestSettings,
    ) -> Self {
        Self {
            request,
            db,
            blackboard,
            ingestor,
            settings,
            cancel: CancellationToken::new(),
            phase: PhaseTracker::new(),
        }
    }

    /// Token observed by this task and its sub-task.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn phase(&self) -> PhaseTracker {
        self.phase.clone()
    }

    /// Run to completion on the calling thread. `done` is invoked exactly once.
    pub fn run<F>(self, progress: Arc<dyn ProgressMonitor>, done: F)
    where
        F: FnOnce(IngestOutcome),
    {
        let span = info_span!(
            "ingest",
            device_id = %self.request.device_id,
            source = %self.request.source_dir.display()
        );
        let _guard = span.enter();

        let outcome = match self.execute(&progress) {
            Ok(outcome) | Err(outcome) => outcome,
        };

        let terminal = if self.cancel.is_cancelled() {
            IngestPhase::Cancelled
        } else if outcome.result == ProcessorResult::CriticalErrors {
            IngestPhase::Failed
        } else {
            IngestPhase::Completed
        };
        self.phase.set(terminal);
        info!(
            result = %outcome.result,
            errors = outcome.errors.len(),
            data_sources = outcome.data_sources.len(),
            phase = %terminal,
            "Ingestion finished"
        );
        done(outcome);
    }

    /// Run on a dedicated worker thread.
    pub fn spawn<F>(self, progress: Arc<dyn ProgressMonitor>, done: F) -> io::Result<IngestHandle>
    where
        F: FnOnce(IngestOutcome) + Send + 'static,
    {
        let cancel = self.cancel.clone();
        let phase = self.phase.clone();
        let thread = std::thread::Builder::new()
            .name("triage-ingest".to_string())
            .spawn(move || self.run(progress, done))?;
        Ok(IngestHandle {
            cancel,
            phase,
            thread,
        })
    }

    fn execute(&self, progress: &Arc<dyn ProgressMonitor>) -> Step<IngestOutcome> {
        let src = self.request.source_dir.as_path();
        let dest = self.request.dest_dir.as_path();
        let mut errors = Vec::new();

        self.phase.set(IngestPhase::Copying);
        progress.set_progress_text(&format!(
            "Copying image from {} to {}",
            src.display(),
            dest.display()
        ));
        match copy_dir_recursive(src, dest) {
            Ok(files) => {
                info!(files, "Copied acquisition");
                progress.set_progress_text("Done copying");
            }
            Err(source) => {
                let err = IngestError::Copy {
                    src: src.to_path_buf(),
                    dest: dest.to_path_buf(),
                    source,
                };
                error!(error = %err, "Copy failed, continuing");
                errors.push(err.to_string());
            }
        }

        if self.cancel.is_cancelled() {
            self.discard_copy(dest);
            return Err(cancelled(errors));
        }

        self.phase.set(IngestPhase::Reporting);
        let acquisition_name = file_name(src);
        let results_path = dest.join(&self.settings.results_file);
        if !results_path.is_file() {
            let err = ManifestError::Missing {
                file: self.settings.results_file.clone(),
                dir: dest.to_path_buf(),
            };
            return Err(critical(errors, err.into()));
        }
        self.add_report(&results_path, &acquisition_name, progress.as_ref())
            .map_err(|err| critical(errors.clone(), err))?;
        let users_path = dest.join(&self.settings.users_file);
        if users_path.is_file() {
            self.add_report(&users_path, &acquisition_name, progress.as_ref())
                .map_err(|err| critical(errors.clone(), err))?;
        }

        self.phase.set(IngestPhase::DetectingImageMode);
        let dest = canonical(dest).map_err(|err| critical(errors.clone(), err))?;
        let virtual_disks = self
            .virtual_disks(&dest)
            .map_err(|err| critical(errors.clone(), err))?;

        if self.cancel.is_cancelled() {
            return Err(cancelled(errors));
        }

        let (mode, mut outcome) = if virtual_disks.is_empty() {
            info!(dest = %dest.display(), "No virtual disks, importing extracted files");
            let data_source =
                self.import_local(&dest, &results_path, &acquisition_name, progress.as_ref(), &errors)?;
            (LookupMode::LocalFiles, IngestOutcome::success(vec![data_source]))
        } else {
            info!(images = virtual_disks.len(), "Ingesting virtual disks");
            let sub = self.ingest_virtual_disks(virtual_disks, progress, &errors)?;
            (LookupMode::VirtualDisk, sub)
        };

        self.phase.set(IngestPhase::TaggingInterestingFiles);
        progress.set_progress_text("Adding search results as interesting files");
        let job = TaggingJob {
            dest_dir: &dest,
            manifest_path: &results_path,
            mode,
            root_dir: &self.settings.root_dir,
            module: &self.settings.artifact_module,
        };
        match tag_interesting_files(&self.db, self.blackboard.as_ref(), &job, &self.cancel) {
            Ok(summary) if summary.cancelled => {
                warn!(created = summary.created, "Tagging cancelled, keeping data sources");
                errors.push(IngestError::Cancelled.to_string());
            }
            Ok(summary) => {
                info!(rows = summary.rows, created = summary.created, "Tagged interesting files");
                progress.set_progress_text("Done adding search results as interesting files");
            }
            Err(err) => {
                let err = IngestError::Tagging(err.to_string());
                error!(error = %err, "Tagging failed, keeping data sources");
                errors.push(err.to_string());
            }
        }

        errors.append(&mut outcome.errors);
        outcome.errors = errors;
        if !outcome.errors.is_empty() {
            outcome.escalate(ProcessorResult::NoncriticalErrors);
        }
        Ok(outcome)
    }

    fn add_report(
        &self,
        path: &Path,
        acquisition_name: &str,
        progress: &dyn ProgressMonitor,
    ) -> Result<(), IngestError> {
        progress.set_progress_text(&format!("Adding {} to report", path.display()));
        let name = format!("{} {}", file_name(path), acquisition_name);
        self.db
            .add_report(path, &self.settings.report_module, &name)
            .map_err(|err| IngestError::Report {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })?;
        progress.set_progress_text(&format!("Done adding {} to report", path.display()));
        Ok(())
    }

    /// Virtual-disk files directly under `dest`, canonical and sorted.
    fn virtual_disks(&self, dest: &Path) -> Result<Vec<PathBuf>, IngestError> {
        let mut disks = Vec::new();
        for entry in fs::read_dir(dest)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if entry.file_type()?.is_file() && self.settings.is_virtual_disk(&name) {
                disks.push(canonical(&entry.path())?);
            }
        }
        disks.sort();
        Ok(disks)
    }

    fn import_local(
        &self,
        dest: &Path,
        manifest_path: &Path,
        acquisition_name: &str,
        progress: &dyn ProgressMonitor,
        errors: &[String],
    ) -> Step<DataSource> {
        if !dest.join(&self.settings.root_dir).is_dir() {
            return Err(critical(
                errors.to_vec(),
                IngestError::RootMissing(dest.to_path_buf()),
            ));
        }

        self.phase.set(IngestPhase::ImportingLocalFiles);
        progress.set_progress_text("Adding extracted files");
        let import = LocalImport {
            dest_dir: dest,
            manifest_path,
            device_id: &self.request.device_id,
            name: acquisition_name,
            time_zone: &self.request.time_zone,
            root_dir: &self.settings.root_dir,
        };
        match import_local_files(&self.db, &import, &self.cancel) {
            Ok(data_source) => {
                progress.set_progress_text("Done adding extracted files");
                Ok(data_source)
            }
            Err(IngestError::Cancelled) => Err(cancelled(errors.to_vec())),
            Err(err) => Err(critical(errors.to_vec(), err)),
        }
    }

    /// Hand the images to the sub-task and wait for its single report.
    fn ingest_virtual_disks(
        &self,
        image_paths: Vec<PathBuf>,
        progress: &Arc<dyn ProgressMonitor>,
        errors: &[String],
    ) -> Step<IngestOutcome> {
        self.phase.set(IngestPhase::IngestingVirtualDisks);
        let task = MultiImageTask {
            db: self.db.clone(),
            ingestor: self.ingestor.clone(),
            device_id: self.request.device_id.clone(),
            time_zone: self.request.time_zone.clone(),
            image_paths,
            progress: progress.clone(),
            cancel: self.cancel.clone(),
        };
        let rx = task.spawn().map_err(|err| {
            critical(errors.to_vec(), IngestError::SubTask(err.to_string()))
        })?;

        let mut relayed = false;
        let sub = loop {
            match rx.recv_timeout(self.settings.poll_interval()) {
                Ok(outcome) => break outcome,
                Err(RecvTimeoutError::Timeout) => {
                    if self.cancel.is_cancelled() && !relayed {
                        info!("Cancellation relayed to image sub-task, waiting for it to finish");
                        relayed = true;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    break IngestOutcome::critical(vec![IngestError::SubTask(
                        "worker exited without reporting".to_string(),
                    )
                    .to_string()]);
                }
            }
        };

        if sub.result == ProcessorResult::CriticalErrors {
            let mut all = errors.to_vec();
            all.extend(sub.errors);
            return Err(IngestOutcome::critical(all));
        }
        Ok(sub)
    }

    fn discard_copy(&self, dest: &Path) {
        info!(dest = %dest.display(), "Ingestion cancelled before any case write, removing copy");
        if dest.exists() {
            if let Err(err) = fs::remove_dir_all(dest) {
                warn!(dest = %dest.display(), error = %err, "Failed to remove copied acquisition");
            }
        }
    }
}

fn critical(mut errors: Vec<String>, err: IngestError) -> IngestOutcome {
    error!(error = %err, "Ingestion failed");
    errors.push(err.to_string());
    IngestOutcome::critical(errors)
}

fn cancelled(mut errors: Vec<String>) -> IngestOutcome {
    info!("Ingestion cancelled");
    errors.push(IngestError::Cancelled.to_string());
    IngestOutcome::critical(errors)
}

fn canonical(path: &Path) -> Result<PathBuf, IngestError> {
    fs::canonicalize(path)
        .map_err(|_| IngestError::CanonicalPath(path.display().to_string()))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
