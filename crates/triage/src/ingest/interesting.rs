//! Posting manifest hits as interesting-file artifacts.

use super::cancel::CancellationToken;
use super::error::{IngestError, Result};
use super::importer::local_parent_path;
use super::manifest::{ManifestReader, ManifestRow};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};
use triage_db::{Artifact, ArtifactType, Attribute, Blackboard, CaseDb, FileFilter};

/// How manifest rows are resolved to case files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupMode {
    /// Rows point into image data sources by metadata address
    VirtualDisk,
    /// Rows point at local files by synthetic parent path
    LocalFiles,
}

/// Parameters for [`tag_interesting_files`].
#[derive(Debug, Clone)]
pub struct TaggingJob<'a> {
    /// Acquisition copy, in the same form the image paths were registered
    pub dest_dir: &'a Path,
    pub manifest_path: &'a Path,
    pub mode: LookupMode,
    pub root_dir: &'a str,
    /// Module recorded on attributes and on the posted batch
    pub module: &'a str,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaggingSummary {
    /// Manifest rows processed
    pub rows: usize,
    /// Artifacts created and posted
    pub created: usize,
    /// Stopped early on cancellation
    pub cancelled: bool,
}

/// Create one interesting-file artifact per (file, rule set, rule) named by
/// the manifest, skipping ones that already exist, and post them as a
/// single batch.
///
/// Artifacts created before a cancellation or a row error are still posted.
pub fn tag_interesting_files(
    db: &CaseDb,
    blackboard: &dyn Blackboard,
    job: &TaggingJob<'_>,
    cancel: &CancellationToken,
) -> Result<TaggingSummary> {
    let image_ids = match job.mode {
        LookupMode::VirtualDisk => image_path_index(db)?,
        LookupMode::LocalFiles => HashMap::new(),
    };
    let reader = ManifestReader::open(job.manifest_path)?;

    let mut summary = TaggingSummary::default();
    let mut artifacts = Vec::new();
    let walked = (|| -> Result<()> {
        for row in reader {
            if cancel.is_cancelled() {
                info!(rows = summary.rows, "Tagging cancelled");
                summary.cancelled = true;
                return Ok(());
            }
            let row = row?;
            let filter = lookup_filter(job, &image_ids, &row)?;
            for file in db.find_files(&filter)? {
                if let Some(artifact) = tag_file(blackboard, job.module, file.id, &row)? {
                    artifacts.push(artifact);
                }
            }
            summary.rows += 1;
        }
        Ok(())
    })();

    summary.created = artifacts.len();
    if !artifacts.is_empty() {
        if let Err(err) = blackboard.post_artifacts(&artifacts, job.module) {
            warn!(error = %err, "Unable to post artifacts to blackboard");
            return Err(walked.err().unwrap_or(err.into()));
        }
    }
    walked?;

    debug!(rows = summary.rows, created = summary.created, "Tagged interesting files");
    Ok(summary)
}

/// Image path -> data source id, for every registered image path.
fn image_path_index(db: &CaseDb) -> Result<HashMap<String, i64>> {
    let mut index = HashMap::new();
    for (data_source_id, paths) in db.image_paths()? {
        for path in paths {
            index.insert(path, data_source_id);
        }
    }
    Ok(index)
}

fn lookup_filter(
    job: &TaggingJob<'_>,
    image_ids: &HashMap<String, i64>,
    row: &ManifestRow,
) -> Result<FileFilter> {
    match job.mode {
        LookupMode::VirtualDisk => {
            let image_path = job
                .dest_dir
                .join(&row.vhd_filename)
                .to_string_lossy()
                .to_string();
            let data_source_id = *image_ids
                .get(&image_path)
                .ok_or(IngestError::DataSourceNotFound(image_path))?;
            Ok(FileFilter::MetaAddress {
                data_source_id,
                meta_addr: row.meta_address_value()?,
                name: row.filename.clone(),
            })
        }
        LookupMode::LocalFiles => Ok(FileFilter::ParentPath {
            name: row.filename.clone(),
            parent_path: format!(
                "/{}",
                local_parent_path(job.root_dir, &row.vhd_filename, &row.parent_path)
            ),
        }),
    }
}

fn tag_file(
    blackboard: &dyn Blackboard,
    module: &str,
    file_id: i64,
    row: &ManifestRow,
) -> Result<Option<Artifact>> {
    let attributes = vec![
        Attribute::set_name(module, &row.rule_set_name),
        Attribute::category(module, &row.rule_name),
    ];
    if blackboard.artifact_exists(file_id, ArtifactType::InterestingFileHit, &attributes)? {
        return Ok(None);
    }
    let artifact =
        blackboard.new_artifact(file_id, ArtifactType::InterestingFileHit, attributes)?;
    Ok(Some(artifact))
}
