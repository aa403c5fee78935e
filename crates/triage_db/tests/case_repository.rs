//! Case repository behaviour across reopen and transaction boundaries.

use tempfile::TempDir;
use triage_db::{
    ArtifactType, Attribute, BackendError, Blackboard, CaseBlackboard, CaseDb, DataSourceKind,
    FileFilter, FileTimes, LocalFile, LocalFileImporter,
};

#[test]
fn case_survives_reopen() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("case.sqlite3");
    let extracted = tmp.path().join("f1");
    std::fs::write(&extracted, b"abc").unwrap();

    let ds_id = {
        let db = CaseDb::open(&path).unwrap();
        let ds = db
            .transaction(|tx| {
                let ds = CaseDb::add_local_files_data_source(tx, "dev-1", "acq", "UTC")?;
                LocalFileImporter::new(&ds).add_local_file(
                    tx,
                    &LocalFile {
                        local_path: extracted.clone(),
                        name: "foo.txt".to_string(),
                        parent_path: "root/img.vhd/sub".to_string(),
                        times: FileTimes {
                            crtime: 1,
                            mtime: 2,
                            atime: 3,
                            ctime: 4,
                        },
                    },
                )?;
                Ok::<_, BackendError>(ds)
            })
            .unwrap();
        ds.id
    };

    let db = CaseDb::open(&path).unwrap();
    let sources = db.list_data_sources().unwrap();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].id, ds_id);
    assert_eq!(sources[0].kind, DataSourceKind::LocalFiles);
    assert_eq!(sources[0].device_id, "dev-1");

    let files = db.files_in_data_source(ds_id).unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].full_path(), "/root/img.vhd/sub/foo.txt");
    assert_eq!(files[0].times.mtime, 2);
}

#[test]
fn failed_import_leaves_nothing_behind() {
    let tmp = TempDir::new().unwrap();
    let db = CaseDb::open(tmp.path().join("case.sqlite3")).unwrap();

    let result: Result<(), BackendError> = db.transaction(|tx| {
        let ds = CaseDb::add_local_files_data_source(tx, "dev", "acq", "UTC")?;
        let mut importer = LocalFileImporter::new(&ds);
        importer.add_local_file(
            tx,
            &LocalFile {
                local_path: tmp.path().join("missing"),
                name: "a".to_string(),
                parent_path: "root/x".to_string(),
                times: FileTimes::default(),
            },
        )?;
        Err(BackendError::invalid_input("bad row"))
    });

    assert!(result.is_err());
    assert!(db.list_data_sources().unwrap().is_empty());
    let rows: i64 = db
        .connection()
        .query_scalar("SELECT COUNT(*) FROM files", &[])
        .unwrap();
    assert_eq!(rows, 0);
}

#[test]
fn blackboard_is_shared_between_clones() {
    let db = CaseDb::open_in_memory().unwrap();
    let ds = db
        .add_image_data_source("dev", "img.vhd", "UTC", &["/d/img.vhd".to_string()])
        .unwrap();
    let file_id = db
        .transaction(|tx| {
            CaseDb::add_file(
                tx,
                ds.id,
                &triage_db::NewFile {
                    name: "foo.txt".to_string(),
                    parent_path: "/sub/".to_string(),
                    meta_addr: Some(42),
                    size: 3,
                    times: FileTimes::default(),
                },
            )
        })
        .unwrap();

    let writer = CaseBlackboard::new(db.clone());
    let reader = CaseBlackboard::new(db.clone());
    let attrs = vec![
        Attribute::set_name("Logical Imager", "SetA"),
        Attribute::category("Logical Imager", "Rule1"),
    ];

    let handle = std::thread::spawn(move || {
        writer
            .new_artifact(file_id, ArtifactType::InterestingFileHit, attrs)
            .unwrap()
    });
    let artifact = handle.join().unwrap();

    assert!(reader
        .artifact_exists(file_id, ArtifactType::InterestingFileHit, &artifact.attributes)
        .unwrap());
    assert_eq!(
        db.find_files(&FileFilter::MetaAddress {
            data_source_id: ds.id,
            meta_addr: 42,
            name: "foo.txt".to_string(),
        })
        .unwrap()
        .len(),
        1
    );
}
