//! Typed case operations: data sources, files, image paths, reports.

use crate::backend::{DbConnection, DbRow, DbTransaction};
use crate::error::{BackendError, Result};
use crate::schema;
use crate::types::{
    normalize_parent_path, DataSource, DataSourceKind, FileFilter, FileRecord, FileTimes, NewFile,
    Report,
};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

const FILE_COLUMNS: &str = "id, data_source_id, name, parent_path, meta_addr, is_dir, size, \
                            crtime, mtime, atime, ctime, local_path";

/// The case repository.
///
/// Cheap to clone; clones share the same connection.
#[derive(Debug, Clone)]
pub struct CaseDb {
    conn: DbConnection,
}

impl CaseDb {
    /// Open or create a case database, creating tables as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Self {
            conn: DbConnection::open(path)?,
        };
        schema::ensure_schema(&db.conn)?;
        info!(path = %path.display(), "Case database opened");
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: DbConnection::open_in_memory()?,
        };
        schema::ensure_schema(&db.conn)?;
        Ok(db)
    }

    /// Escape hatch for queries without a typed method.
    pub fn connection(&self) -> &DbConnection {
        &self.conn
    }

    /// Run `op` inside one case transaction; see [`DbConnection::transaction`].
    pub fn transaction<T, E, F>(&self, op: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut DbTransaction<'_>) -> std::result::Result<T, E>,
        E: From<BackendError>,
    {
        self.conn.transaction(op)
    }

    // ------------------------------------------------------------------
    // Data sources
    // ------------------------------------------------------------------

    /// Register an image data source with its backing paths.
    pub fn add_image_data_source(
        &self,
        device_id: &str,
        name: &str,
        time_zone: &str,
        image_paths: &[String],
    ) -> Result<DataSource> {
        self.transaction(|tx| {
            Self::add_image_data_source_in(tx, device_id, name, time_zone, image_paths)
        })
    }

    /// Same as [`CaseDb::add_image_data_source`], inside a caller's transaction.
    pub fn add_image_data_source_in(
        tx: &mut DbTransaction<'_>,
        device_id: &str,
        name: &str,
        time_zone: &str,
        image_paths: &[String],
    ) -> Result<DataSource> {
        if image_paths.is_empty() {
            return Err(BackendError::invalid_input(
                "An image data source needs at least one path",
            ));
        }
        let data_source =
            insert_data_source(tx, DataSourceKind::Image, device_id, name, time_zone)?;
        for (sequence, path) in image_paths.iter().enumerate() {
            tx.execute(
                "INSERT INTO image_names (data_source_id, sequence, path) VALUES (?, ?, ?)",
                &[
                    data_source.id.into(),
                    (sequence as i64).into(),
                    path.as_str().into(),
                ],
            )?;
        }
        Ok(data_source)
    }

    /// Create a local-files data source inside a caller's transaction.
    pub fn add_local_files_data_source(
        tx: &mut DbTransaction<'_>,
        device_id: &str,
        name: &str,
        time_zone: &str,
    ) -> Result<DataSource> {
        insert_data_source(tx, DataSourceKind::LocalFiles, device_id, name, time_zone)
    }

    /// Register a file in a data source inside a caller's transaction.
    pub fn add_file(
        tx: &mut DbTransaction<'_>,
        data_source_id: i64,
        file: &NewFile,
    ) -> Result<i64> {
        tx.execute(
            "INSERT INTO files (data_source_id, name, parent_path, meta_addr, is_dir, size, \
             crtime, mtime, atime, ctime, local_path) VALUES (?, ?, ?, ?, 0, ?, ?, ?, ?, ?, NULL)",
            &[
                data_source_id.into(),
                file.name.as_str().into(),
                normalize_parent_path(&file.parent_path).into(),
                file.meta_addr.into(),
                file.size.into(),
                file.times.crtime.into(),
                file.times.mtime.into(),
                file.times.atime.into(),
                file.times.ctime.into(),
            ],
        )?;
        Ok(tx.last_insert_rowid())
    }

    pub fn list_data_sources(&self) -> Result<Vec<DataSource>> {
        self.conn
            .query_all(
                "SELECT id, kind, device_id, name, time_zone FROM data_sources ORDER BY id",
                &[],
            )?
            .iter()
            .map(data_source_from_row)
            .collect()
    }

    pub fn data_source(&self, id: i64) -> Result<Option<DataSource>> {
        self.conn
            .query_optional(
                "SELECT id, kind, device_id, name, time_zone FROM data_sources WHERE id = ?",
                &[id.into()],
            )?
            .as_ref()
            .map(data_source_from_row)
            .transpose()
    }

    /// Remove a data source and everything under it.
    pub fn delete_data_source(&self, id: i64) -> Result<()> {
        let deleted = self
            .conn
            .execute("DELETE FROM data_sources WHERE id = ?", &[id.into()])?;
        if deleted == 0 {
            return Err(BackendError::not_found(format!("data source {}", id)));
        }
        info!(data_source_id = id, "Data source deleted");
        Ok(())
    }

    /// Every image path, grouped by owning data source.
    pub fn image_paths(&self) -> Result<BTreeMap<i64, Vec<String>>> {
        let rows = self.conn.query_all(
            "SELECT data_source_id, path FROM image_names ORDER BY data_source_id, sequence",
            &[],
        )?;
        let mut out: BTreeMap<i64, Vec<String>> = BTreeMap::new();
        for row in rows {
            out.entry(row.get(0)?).or_default().push(row.get(1)?);
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Files
    // ------------------------------------------------------------------

    /// All files (and directories) matching a filter, in insertion order.
    pub fn find_files(&self, filter: &FileFilter) -> Result<Vec<FileRecord>> {
        let rows = match filter {
            FileFilter::MetaAddress {
                data_source_id,
                meta_addr,
                name,
            } => self.conn.query_all(
                &format!(
                    "SELECT {} FROM files WHERE data_source_id = ? AND meta_addr = ? AND name = ? \
                     ORDER BY id",
                    FILE_COLUMNS
                ),
                &[
                    (*data_source_id).into(),
                    (*meta_addr).into(),
                    name.as_str().into(),
                ],
            )?,
            FileFilter::ParentPath { name, parent_path } => self.conn.query_all(
                &format!(
                    "SELECT {} FROM files WHERE name = ? AND parent_path = ? ORDER BY id",
                    FILE_COLUMNS
                ),
                &[
                    name.as_str().into(),
                    normalize_parent_path(parent_path).into(),
                ],
            )?,
        };
        rows.iter().map(file_from_row).collect()
    }

    /// Regular files of one data source, directories excluded.
    pub fn files_in_data_source(&self, data_source_id: i64) -> Result<Vec<FileRecord>> {
        self.conn
            .query_all(
                &format!(
                    "SELECT {} FROM files WHERE data_source_id = ? AND is_dir = 0 ORDER BY id",
                    FILE_COLUMNS
                ),
                &[data_source_id.into()],
            )?
            .iter()
            .map(file_from_row)
            .collect()
    }

    pub fn file_count(&self) -> Result<i64> {
        self.conn
            .query_scalar("SELECT COUNT(*) FROM files WHERE is_dir = 0", &[])
    }

    // ------------------------------------------------------------------
    // Reports
    // ------------------------------------------------------------------

    pub fn add_report(&self, path: &Path, source_module: &str, name: &str) -> Result<Report> {
        let path_str = path.to_string_lossy().to_string();
        let id = self.transaction(|tx| {
            tx.execute(
                "INSERT INTO reports (path, source_module, name, created_at) VALUES (?, ?, ?, ?)",
                &[
                    path_str.as_str().into(),
                    source_module.into(),
                    name.into(),
                    now_secs().into(),
                ],
            )?;
            Ok::<_, BackendError>(tx.last_insert_rowid())
        })?;
        info!(path = %path_str, report = name, "Report added");
        Ok(Report {
            id,
            path: path_str,
            source_module: source_module.to_string(),
            name: name.to_string(),
        })
    }

    pub fn list_reports(&self) -> Result<Vec<Report>> {
        let rows = self.conn.query_all(
            "SELECT id, path, source_module, name FROM reports ORDER BY id",
            &[],
        )?;
        rows.iter()
            .map(|row| {
                Ok(Report {
                    id: row.get(0)?,
                    path: row.get(1)?,
                    source_module: row.get(2)?,
                    name: row.get(3)?,
                })
            })
            .collect()
    }
}

fn insert_data_source(
    tx: &mut DbTransaction<'_>,
    kind: DataSourceKind,
    device_id: &str,
    name: &str,
    time_zone: &str,
) -> Result<DataSource> {
    tx.execute(
        "INSERT INTO data_sources (kind, device_id, name, time_zone, created_at) \
         VALUES (?, ?, ?, ?, ?)",
        &[
            kind.as_str().into(),
            device_id.into(),
            name.into(),
            time_zone.into(),
            now_secs().into(),
        ],
    )?;
    Ok(DataSource {
        id: tx.last_insert_rowid(),
        kind,
        device_id: device_id.to_string(),
        name: name.to_string(),
        time_zone: time_zone.to_string(),
    })
}

fn data_source_from_row(row: &DbRow) -> Result<DataSource> {
    let kind: String = row.get(1)?;
    Ok(DataSource {
        id: row.get(0)?,
        kind: DataSourceKind::parse(&kind).ok_or_else(|| {
            BackendError::TypeConversion(format!("Unknown data source kind '{}'", kind))
        })?,
        device_id: row.get(2)?,
        name: row.get(3)?,
        time_zone: row.get(4)?,
    })
}

pub(crate) fn file_from_row(row: &DbRow) -> Result<FileRecord> {
    Ok(FileRecord {
        id: row.get(0)?,
        data_source_id: row.get(1)?,
        name: row.get(2)?,
        parent_path: row.get(3)?,
        meta_addr: row.get(4)?,
        is_dir: row.get(5)?,
        size: row.get(6)?,
        times: FileTimes {
            crtime: row.get(7)?,
            mtime: row.get(8)?,
            atime: row.get(9)?,
            ctime: row.get(10)?,
        },
        local_path: row.get(11)?,
    })
}

pub(crate) fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}
