//! Registration of extracted files under a local-files data source.

use crate::backend::DbTransaction;
use crate::case::now_secs;
use crate::error::Result;
use crate::types::{normalize_parent_path, DataSource, FileTimes};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, warn};

/// One extracted file to register.
#[derive(Debug, Clone)]
pub struct LocalFile {
    /// On-disk copy of the file
    pub local_path: PathBuf,
    pub name: String,
    /// Virtual parent path inside the data source, any separator style
    pub parent_path: String,
    pub times: FileTimes,
}

/// Adds files to one local-files data source, creating the virtual
/// directories of each parent path on first use.
///
/// Must be used with the transaction the data source was created in.
pub struct LocalFileImporter {
    data_source_id: i64,
    known_dirs: HashSet<String>,
}

impl LocalFileImporter {
    pub fn new(data_source: &DataSource) -> Self {
        Self {
            data_source_id: data_source.id,
            known_dirs: HashSet::new(),
        }
    }

    /// Register one file and return its id.
    pub fn add_local_file(&mut self, tx: &mut DbTransaction<'_>, file: &LocalFile) -> Result<i64> {
        let parent_path = normalize_parent_path(&file.parent_path);
        self.ensure_dirs(tx, &parent_path)?;

        let size = match std::fs::metadata(&file.local_path) {
            Ok(meta) => meta.len() as i64,
            Err(err) => {
                warn!(path = %file.local_path.display(), error = %err, "Extracted file unreadable, recording size 0");
                0
            }
        };

        tx.execute(
            "INSERT INTO files (data_source_id, name, parent_path, meta_addr, is_dir, size, \
             crtime, mtime, atime, ctime, local_path) VALUES (?, ?, ?, NULL, 0, ?, ?, ?, ?, ?, ?)",
            &[
                self.data_source_id.into(),
                file.name.as_str().into(),
                parent_path.as_str().into(),
                size.into(),
                file.times.crtime.into(),
                file.times.mtime.into(),
                file.times.atime.into(),
                file.times.ctime.into(),
                file.local_path.to_string_lossy().to_string().into(),
            ],
        )?;
        Ok(tx.last_insert_rowid())
    }

    fn ensure_dirs(&mut self, tx: &mut DbTransaction<'_>, parent_path: &str) -> Result<()> {
        if self.known_dirs.contains(parent_path) {
            return Ok(());
        }

        let mut prefix = String::from("/");
        for segment in parent_path.split('/').filter(|s| !s.is_empty()) {
            let full = format!("{}{}/", prefix, segment);
            if !self.known_dirs.contains(&full) {
                let existing: Option<i64> = tx
                    .query_optional(
                        "SELECT id FROM files WHERE data_source_id = ? AND name = ? \
                         AND parent_path = ? AND is_dir = 1",
                        &[
                            self.data_source_id.into(),
                            segment.into(),
                            prefix.as_str().into(),
                        ],
                    )?
                    .map(|row| row.get(0))
                    .transpose()?;
                if existing.is_none() {
                    let now = now_secs();
                    tx.execute(
                        "INSERT INTO files (data_source_id, name, parent_path, is_dir, size, \
                         crtime, mtime, atime, ctime) VALUES (?, ?, ?, 1, 0, ?, ?, ?, ?)",
                        &[
                            self.data_source_id.into(),
                            segment.into(),
                            prefix.as_str().into(),
                            now.into(),
                            now.into(),
                            now.into(),
                            now.into(),
                        ],
                    )?;
                    debug!(dir = %full, "Virtual directory created");
                }
                self.known_dirs.insert(full.clone());
            }
            prefix = full;
        }
        Ok(())
    }
}
