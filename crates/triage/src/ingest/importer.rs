//! Transactional import of an extracted-file tree as a local-files data source.

use super::cancel::CancellationToken;
use super::error::{IngestError, Result};
use super::manifest::ManifestReader;
use std::path::Path;
use tracing::{info, warn};
use triage_db::{CaseDb, DataSource, LocalFile, LocalFileImporter};

/// Parameters for [`import_local_files`].
#[derive(Debug, Clone)]
pub struct LocalImport<'a> {
    /// Acquisition copy; extracted paths in the manifest are relative to it
    pub dest_dir: &'a Path,
    pub manifest_path: &'a Path,
    pub device_id: &'a str,
    /// Name of the new data source
    pub name: &'a str,
    pub time_zone: &'a str,
    /// First component of every synthetic parent path
    pub root_dir: &'a str,
}

/// Synthetic parent path of a manifest row in local-file mode.
pub fn local_parent_path(root_dir: &str, vhd_filename: &str, parent_path: &str) -> String {
    format!("{}/{}/{}", root_dir, vhd_filename, parent_path)
}

/// Register every manifest row as a local file in one transaction.
///
/// Nothing is committed unless every row imports: a malformed row, a bad
/// timestamp, a repository error or a cancellation observed between rows
/// rolls the whole data source back.
pub fn import_local_files(
    db: &CaseDb,
    import: &LocalImport<'_>,
    cancel: &CancellationToken,
) -> Result<DataSource> {
    let reader = ManifestReader::open(import.manifest_path)?;

    let result = db.transaction(|tx| {
        let data_source = CaseDb::add_local_files_data_source(
            tx,
            import.device_id,
            import.name,
            import.time_zone,
        )?;
        let mut importer = LocalFileImporter::new(&data_source);

        let mut count = 0usize;
        for row in reader {
            if cancel.is_cancelled() {
                return Err(IngestError::Cancelled);
            }
            let row = row?;
            let times = row.times()?;
            importer.add_local_file(
                tx,
                &LocalFile {
                    local_path: import.dest_dir.join(&row.extracted_file_path),
                    name: row.filename.clone(),
                    parent_path: local_parent_path(
                        import.root_dir,
                        &row.vhd_filename,
                        &row.parent_path,
                    ),
                    times,
                },
            )?;
            count += 1;
        }

        Ok((data_source, count))
    });

    match result {
        Ok((data_source, count)) => {
            info!(
                data_source_id = data_source.id,
                files = count,
                "Imported extracted files"
            );
            Ok(data_source)
        }
        Err(err) => {
            warn!(error = %err, "Extracted file import rolled back");
            Err(err)
        }
    }
}
