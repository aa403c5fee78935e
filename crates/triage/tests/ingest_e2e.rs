//! End-to-end ingestion runs against a real case database.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use triage::ingest::{
    tag_interesting_files, AddAcquisitionTask, CancellationToken, ImageIngestor, IngestError,
    IngestOutcome, IngestPhase, IngestRequest, IngestSettings, LookupMode, ProcessorResult,
    ProgressMonitor, TaggingJob,
};
use triage_db::{
    AttributeType, CaseBlackboard, CaseDb, DataSource, DataSourceKind, FileFilter, FileTimes,
    NewFile,
};

const ACQUISITION: &str = "Logical_Imager_HOST_20190718_14_05_33";
const HEADER: &str = "vhd\toffset\tmeta\tstatus\tset\trule\tdesc\tname\tparent\textracted\tcrtime\tmtime\tatime\tctime\n";

/// Registers each image with one file, `foo.txt` at metadata address 5.
struct FixtureIngestor;

impl ImageIngestor for FixtureIngestor {
    fn add_image(
        &self,
        db: &CaseDb,
        device_id: &str,
        image_path: &Path,
        time_zone: &str,
    ) -> triage::ingest::Result<DataSource> {
        let name = image_path.file_name().unwrap().to_string_lossy().to_string();
        let path = image_path.to_string_lossy().to_string();
        let data_source = db.transaction(|tx| {
            let ds = CaseDb::add_image_data_source_in(tx, device_id, &name, time_zone, &[path])?;
            CaseDb::add_file(
                tx,
                ds.id,
                &NewFile {
                    name: "foo.txt".to_string(),
                    parent_path: "/sub".to_string(),
                    meta_addr: Some(5),
                    size: 3,
                    times: FileTimes::default(),
                },
            )?;
            Ok::<_, triage_db::BackendError>(ds)
        })?;
        Ok(data_source)
    }
}

/// Adds the image, then cancels the run and stays busy past several polls.
struct CancellingIngestor {
    token: Mutex<Option<CancellationToken>>,
    added: Mutex<Vec<String>>,
}

impl ImageIngestor for CancellingIngestor {
    fn add_image(
        &self,
        db: &CaseDb,
        device_id: &str,
        image_path: &Path,
        time_zone: &str,
    ) -> triage::ingest::Result<DataSource> {
        let data_source = FixtureIngestor.add_image(db, device_id, image_path, time_zone)?;
        self.added.lock().unwrap().push(data_source.name.clone());
        if let Some(token) = self.token.lock().unwrap().as_ref() {
            token.cancel();
        }
        std::thread::sleep(std::time::Duration::from_millis(100));
        Ok(data_source)
    }
}

struct BrokenIngestor;

impl ImageIngestor for BrokenIngestor {
    fn add_image(
        &self,
        _db: &CaseDb,
        _device_id: &str,
        image_path: &Path,
        _time_zone: &str,
    ) -> triage::ingest::Result<DataSource> {
        Err(IngestError::SubTask(format!(
            "cannot parse {}",
            image_path.display()
        )))
    }
}

struct Fixture {
    _tmp: TempDir,
    source: PathBuf,
    dest: PathBuf,
    db: CaseDb,
}

impl Fixture {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("acquisitions").join(ACQUISITION);
        fs::create_dir_all(&source).unwrap();
        let dest = tmp.path().join("case").join(ACQUISITION);
        let db = CaseDb::open(tmp.path().join("case").join("case.sqlite3")).unwrap();
        Self {
            _tmp: tmp,
            source,
            dest,
            db,
        }
    }

    fn manifest(&self, rows: &[&str]) {
        let mut text = HEADER.to_string();
        for row in rows {
            text.push_str(row);
            text.push('\n');
        }
        fs::write(self.source.join("SearchResults.txt"), text).unwrap();
    }

    fn file(&self, rel: &str, contents: &str) {
        let path = self.source.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn task(&self, ingestor: Arc<dyn ImageIngestor>) -> AddAcquisitionTask {
        let settings = IngestSettings {
            poll_interval_ms: 10,
            ..IngestSettings::default()
        };
        AddAcquisitionTask::new(
            IngestRequest {
                device_id: "device-1".to_string(),
                time_zone: "UTC".to_string(),
                source_dir: self.source.clone(),
                dest_dir: self.dest.clone(),
            },
            self.db.clone(),
            Arc::new(CaseBlackboard::new(self.db.clone())),
            ingestor,
            settings,
        )
    }

    fn run(&self, task: AddAcquisitionTask, progress: Arc<dyn ProgressMonitor>) -> IngestOutcome {
        let mut result = None;
        task.run(progress, |outcome| result = Some(outcome));
        result.unwrap()
    }
}

fn quiet() -> Arc<dyn ProgressMonitor> {
    Arc::new(|_: &str| {})
}

#[test]
fn virtual_disk_acquisition_posts_one_artifact() {
    let fx = Fixture::new();
    fx.manifest(&["img.vhd\t0\t5\tY\tSetA\tRule1\tdesc\tfoo.txt\tsub\tx\t100\t100\t100\t100"]);
    fx.file("img.vhd", "not really a disk");
    fx.file("users.txt", "bob\n");

    let outcome = fx.run(fx.task(Arc::new(FixtureIngestor)), quiet());

    assert_eq!(outcome.result, ProcessorResult::NoErrors, "{:?}", outcome.errors);
    assert!(outcome.errors.is_empty());
    assert_eq!(outcome.data_sources.len(), 1);
    assert_eq!(outcome.data_sources[0].kind, DataSourceKind::Image);

    let board = CaseBlackboard::new(fx.db.clone());
    let artifacts = board.list_artifacts().unwrap();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].attribute(AttributeType::SetName), Some("SetA"));
    assert_eq!(artifacts[0].attribute(AttributeType::Category), Some("Rule1"));

    let reports: Vec<String> = fx.db.list_reports().unwrap().into_iter().map(|r| r.name).collect();
    assert_eq!(
        reports,
        vec![
            format!("SearchResults.txt {}", ACQUISITION),
            format!("users.txt {}", ACQUISITION),
        ]
    );
}

#[test]
fn tagging_again_creates_no_duplicates() {
    let fx = Fixture::new();
    fx.manifest(&["img.vhd\t0\t5\tY\tSetA\tRule1\tdesc\tfoo.txt\tsub\tx\t1\t1\t1\t1"]);
    fx.file("img.vhd", "");
    let outcome = fx.run(fx.task(Arc::new(FixtureIngestor)), quiet());
    assert_eq!(outcome.result, ProcessorResult::NoErrors);

    let board = CaseBlackboard::new(fx.db.clone());
    let dest = fs::canonicalize(&fx.dest).unwrap();
    let manifest = dest.join("SearchResults.txt");
    let settings = IngestSettings::default();
    let summary = tag_interesting_files(
        &fx.db,
        &board,
        &TaggingJob {
            dest_dir: &dest,
            manifest_path: &manifest,
            mode: LookupMode::VirtualDisk,
            root_dir: &settings.root_dir,
            module: &settings.artifact_module,
        },
        &CancellationToken::new(),
    )
    .unwrap();

    assert_eq!(summary.rows, 1);
    assert_eq!(summary.created, 0);
    assert_eq!(board.list_artifacts().unwrap().len(), 1);
}

#[test]
fn local_files_are_imported_and_tagged() {
    let fx = Fixture::new();
    fx.manifest(&[
        "img.vhd\t0\t5\tY\tSetB\tRule2\tdesc\tnotes.txt\tUsers/bob\troot/extract/1\t10\t20\t30\t40",
    ]);
    fx.file("root/extract/1", "hello");

    let outcome = fx.run(fx.task(Arc::new(FixtureIngestor)), quiet());

    assert_eq!(outcome.result, ProcessorResult::NoErrors, "{:?}", outcome.errors);
    assert_eq!(outcome.data_sources.len(), 1);
    assert_eq!(outcome.data_sources[0].kind, DataSourceKind::LocalFiles);
    assert_eq!(outcome.data_sources[0].name, ACQUISITION);

    let files = fx
        .db
        .find_files(&FileFilter::ParentPath {
            name: "notes.txt".to_string(),
            parent_path: "/root/img.vhd/Users/bob".to_string(),
        })
        .unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].size, 5);
    assert_eq!(files[0].times.mtime, 20);

    let board = CaseBlackboard::new(fx.db.clone());
    let artifacts = board.artifacts_for_file(files[0].id).unwrap();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].attribute(AttributeType::Category), Some("Rule2"));
}

#[test]
fn short_manifest_row_is_critical_and_leaves_no_data_source() {
    let fx = Fixture::new();
    fx.manifest(&["img.vhd\t0\t5\tY\tSetA\tRule1\tdesc\tfoo.txt\tsub\tx\t1\t2\t3"]);
    fx.file("root/x", "");

    let outcome = fx.run(fx.task(Arc::new(FixtureIngestor)), quiet());

    assert_eq!(outcome.result, ProcessorResult::CriticalErrors);
    assert!(outcome.data_sources.is_empty());
    let last = outcome.errors.last().unwrap();
    assert!(last.contains("line 2"), "{}", last);
    assert!(last.contains("got 13"), "{}", last);
    assert!(last.contains("expecting 14"), "{}", last);
    assert!(fx.db.list_data_sources().unwrap().is_empty());
    assert_eq!(fx.db.file_count().unwrap(), 0);
}

#[test]
fn cancel_during_local_import_rolls_back_and_keeps_copy() {
    let fx = Fixture::new();
    fx.manifest(&["img.vhd\t0\t5\tY\tSetA\tRule1\tdesc\tfoo.txt\tsub\troot/x\t1\t2\t3\t4"]);
    fx.file("root/x", "");

    let task = fx.task(Arc::new(FixtureIngestor));
    let token = task.cancel_token();
    let phase = task.phase();
    let progress: Arc<dyn ProgressMonitor> = Arc::new(move |text: &str| {
        if text == "Adding extracted files" {
            token.cancel();
        }
    });

    let outcome = fx.run(task, progress);

    assert_eq!(outcome.result, ProcessorResult::CriticalErrors);
    assert_eq!(outcome.errors.last().map(String::as_str), Some("Ingestion cancelled"));
    assert!(outcome.data_sources.is_empty());
    assert!(fx.db.list_data_sources().unwrap().is_empty());
    assert!(fx.dest.is_dir());
    assert_eq!(phase.get(), IngestPhase::Cancelled);
}

#[test]
fn cancel_before_any_case_write_removes_copy() {
    let fx = Fixture::new();
    fx.manifest(&["img.vhd\t0\t5\tY\tSetA\tRule1\tdesc\tfoo.txt\tsub\tx\t1\t2\t3\t4"]);
    fx.file("root/x", "");

    let task = fx.task(Arc::new(FixtureIngestor));
    task.cancel_token().cancel();
    let outcome = fx.run(task, quiet());

    assert_eq!(outcome.result, ProcessorResult::CriticalErrors);
    assert_eq!(outcome.errors, vec!["Ingestion cancelled".to_string()]);
    assert!(!fx.dest.exists());
    assert!(fx.db.list_reports().unwrap().is_empty());
}

#[test]
fn missing_results_file_is_critical() {
    let fx = Fixture::new();
    fx.file("root/x", "");

    let outcome = fx.run(fx.task(Arc::new(FixtureIngestor)), quiet());

    assert_eq!(outcome.result, ProcessorResult::CriticalErrors);
    assert_eq!(
        outcome.errors,
        vec![format!("Cannot find SearchResults.txt in {}", fx.dest.display())]
    );
    assert!(fx.db.list_reports().unwrap().is_empty());
}

#[test]
fn missing_root_is_critical() {
    let fx = Fixture::new();
    fx.manifest(&[]);

    let outcome = fx.run(fx.task(Arc::new(FixtureIngestor)), quiet());

    assert_eq!(outcome.result, ProcessorResult::CriticalErrors);
    assert!(outcome.errors[0].ends_with("does not contain any images"));
    assert!(fx.db.list_data_sources().unwrap().is_empty());
}

#[test]
fn failed_image_is_critical() {
    let fx = Fixture::new();
    fx.manifest(&[]);
    fx.file("a.vhd", "");

    let outcome = fx.run(fx.task(Arc::new(BrokenIngestor)), quiet());

    assert_eq!(outcome.result, ProcessorResult::CriticalErrors);
    assert!(outcome.data_sources.is_empty());
    assert!(outcome.errors.iter().any(|e| e.contains("a.vhd")));
}

#[test]
fn cancel_during_virtual_disks_reverts_images_before_reporting() {
    let fx = Fixture::new();
    fx.manifest(&["a.vhd\t0\t5\tY\tSetA\tRule1\tdesc\tfoo.txt\tsub\tx\t1\t1\t1\t1"]);
    fx.file("a.vhd", "");
    fx.file("b.vhd", "");

    let ingestor = Arc::new(CancellingIngestor {
        token: Mutex::new(None),
        added: Mutex::new(Vec::new()),
    });
    let task = fx.task(ingestor.clone());
    *ingestor.token.lock().unwrap() = Some(task.cancel_token());
    let phase = task.phase();

    let mut calls = 0;
    let mut result = None;
    task.run(quiet(), |outcome| {
        calls += 1;
        result = Some(outcome);
    });
    let outcome = result.unwrap();

    assert_eq!(calls, 1);
    assert_eq!(*ingestor.added.lock().unwrap(), vec!["a.vhd".to_string()]);
    assert_eq!(outcome.result, ProcessorResult::CriticalErrors);
    assert_eq!(outcome.errors.last().map(String::as_str), Some("Ingestion cancelled"));
    assert!(outcome.data_sources.is_empty());
    assert!(fx.db.list_data_sources().unwrap().is_empty());
    assert!(fx.dest.is_dir());
    assert_eq!(phase.get(), IngestPhase::Cancelled);
}

#[test]
fn tagging_failure_keeps_data_source() {
    let fx = Fixture::new();
    fx.manifest(&["other.vhd\t0\t5\tY\tSetA\tRule1\tdesc\tfoo.txt\tsub\tx\t1\t1\t1\t1"]);
    fx.file("img.vhd", "");

    let outcome = fx.run(fx.task(Arc::new(FixtureIngestor)), quiet());

    assert_eq!(outcome.result, ProcessorResult::NoncriticalErrors);
    assert_eq!(outcome.data_sources.len(), 1);
    assert!(outcome.errors[0].starts_with("Failed to add interesting files: "));
    assert_eq!(fx.db.list_data_sources().unwrap().len(), 1);
}

#[test]
fn spawned_run_reports_progress_in_order() {
    let fx = Fixture::new();
    fx.manifest(&["img.vhd\t0\t5\tY\tSetA\tRule1\tdesc\tfoo.txt\tsub\tx\t1\t1\t1\t1"]);
    fx.file("img.vhd", "");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let progress: Arc<dyn ProgressMonitor> = Arc::new(move |text: &str| {
        sink.lock().unwrap().push(text.to_string());
    });
    let (tx, rx) = std::sync::mpsc::channel();
    let handle = fx
        .task(Arc::new(FixtureIngestor))
        .spawn(progress, move |outcome| tx.send(outcome).unwrap())
        .unwrap();

    let outcome = rx.recv().unwrap();
    handle.join().unwrap();
    assert_eq!(outcome.result, ProcessorResult::NoErrors);

    let seen = seen.lock().unwrap();
    assert!(seen[0].starts_with("Copying image from "));
    assert_eq!(seen[1], "Done copying");
    assert_eq!(
        seen.last().map(String::as_str),
        Some("Done adding search results as interesting files")
    );
    assert!(seen.iter().any(|t| t.starts_with("Adding image ")));
}
