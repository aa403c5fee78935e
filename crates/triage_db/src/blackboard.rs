//! Blackboard: artifacts attached to case files.
//!
//! Artifacts are stored as soon as they are created so later duplicate
//! checks see them; posting marks a batch as published by a module.

use crate::backend::{DbRow, DbTransaction};
use crate::case::{now_secs, CaseDb};
use crate::error::{BackendError, Result};
use crate::types::{Artifact, ArtifactType, Attribute, AttributeType};
use tracing::info;

/// Artifact store consumed by ingestion.
///
/// Implementations must tolerate concurrent use from unrelated runs.
pub trait Blackboard: Send + Sync {
    /// True when one artifact of `artifact_type` on `file_id` carries every
    /// attribute in `attributes`.
    fn artifact_exists(
        &self,
        file_id: i64,
        artifact_type: ArtifactType,
        attributes: &[Attribute],
    ) -> Result<bool>;

    fn new_artifact(
        &self,
        file_id: i64,
        artifact_type: ArtifactType,
        attributes: Vec<Attribute>,
    ) -> Result<Artifact>;

    /// Publish a batch of artifacts on behalf of `module`.
    fn post_artifacts(&self, artifacts: &[Artifact], module: &str) -> Result<()>;
}

/// [`Blackboard`] backed by the case database.
#[derive(Debug, Clone)]
pub struct CaseBlackboard {
    db: CaseDb,
}

impl CaseBlackboard {
    pub fn new(db: CaseDb) -> Self {
        Self { db }
    }

    pub fn artifacts_for_file(&self, file_id: i64) -> Result<Vec<Artifact>> {
        self.db.transaction(|tx| {
            let rows = tx.query_all(
                "SELECT id, file_id, artifact_type FROM artifacts WHERE file_id = ? ORDER BY id",
                &[file_id.into()],
            )?;
            load_artifacts(tx, &rows)
        })
    }

    pub fn list_artifacts(&self) -> Result<Vec<Artifact>> {
        self.db.transaction(|tx| {
            let rows = tx.query_all(
                "SELECT id, file_id, artifact_type FROM artifacts ORDER BY id",
                &[],
            )?;
            load_artifacts(tx, &rows)
        })
    }

    /// Module that posted an artifact, `None` while unposted.
    pub fn posted_module(&self, artifact_id: i64) -> Result<Option<String>> {
        self.db
            .connection()
            .query_optional(
                "SELECT posted_module FROM artifacts WHERE id = ?",
                &[artifact_id.into()],
            )?
            .ok_or_else(|| BackendError::not_found(format!("artifact {}", artifact_id)))?
            .get(0)
    }
}

impl Blackboard for CaseBlackboard {
    fn artifact_exists(
        &self,
        file_id: i64,
        artifact_type: ArtifactType,
        attributes: &[Attribute],
    ) -> Result<bool> {
        let candidates = self.db.transaction(|tx| {
            let rows = tx.query_all(
                "SELECT id, file_id, artifact_type FROM artifacts \
                 WHERE file_id = ? AND artifact_type = ? ORDER BY id",
                &[file_id.into(), artifact_type.as_str().into()],
            )?;
            load_artifacts(tx, &rows)
        })?;

        Ok(candidates
            .iter()
            .any(|artifact| attributes.iter().all(|a| artifact.attributes.contains(a))))
    }

    fn new_artifact(
        &self,
        file_id: i64,
        artifact_type: ArtifactType,
        attributes: Vec<Attribute>,
    ) -> Result<Artifact> {
        let id = self.db.transaction(|tx| {
            tx.execute(
                "INSERT INTO artifacts (file_id, artifact_type, created_at) VALUES (?, ?, ?)",
                &[
                    file_id.into(),
                    artifact_type.as_str().into(),
                    now_secs().into(),
                ],
            )?;
            let id = tx.last_insert_rowid();
            for attribute in &attributes {
                tx.execute(
                    "INSERT INTO artifact_attributes (artifact_id, attribute_type, source_module, value) \
                     VALUES (?, ?, ?, ?)",
                    &[
                        id.into(),
                        attribute.attribute_type.as_str().into(),
                        attribute.source_module.as_str().into(),
                        attribute.value.as_str().into(),
                    ],
                )?;
            }
            Ok::<_, BackendError>(id)
        })?;

        Ok(Artifact {
            id,
            file_id,
            artifact_type,
            attributes,
        })
    }

    fn post_artifacts(&self, artifacts: &[Artifact], module: &str) -> Result<()> {
        if artifacts.is_empty() {
            return Ok(());
        }
        let posted_at = now_secs();
        self.db.transaction(|tx| {
            for artifact in artifacts {
                let updated = tx.execute(
                    "UPDATE artifacts SET posted_module = ?, posted_at = ? WHERE id = ?",
                    &[module.into(), posted_at.into(), artifact.id.into()],
                )?;
                if updated == 0 {
                    return Err(BackendError::not_found(format!("artifact {}", artifact.id)));
                }
            }
            Ok(())
        })?;
        info!(count = artifacts.len(), module, "Artifacts posted");
        Ok(())
    }
}

fn load_artifacts(tx: &mut DbTransaction<'_>, rows: &[DbRow]) -> Result<Vec<Artifact>> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let id: i64 = row.get(0)?;
        let type_name: String = row.get(2)?;
        let artifact_type = ArtifactType::parse(&type_name).ok_or_else(|| {
            BackendError::TypeConversion(format!("Unknown artifact type '{}'", type_name))
        })?;

        let mut attributes = Vec::new();
        for attr in tx.query_all(
            "SELECT attribute_type, source_module, value FROM artifact_attributes \
             WHERE artifact_id = ? ORDER BY rowid",
            &[id.into()],
        )? {
            let attr_name: String = attr.get(0)?;
            let attribute_type = AttributeType::parse(&attr_name).ok_or_else(|| {
                BackendError::TypeConversion(format!("Unknown attribute type '{}'", attr_name))
            })?;
            attributes.push(Attribute {
                attribute_type,
                source_module: attr.get(1)?,
                value: attr.get(2)?,
            });
        }

        out.push(Artifact {
            id,
            file_id: row.get(1)?,
            artifact_type,
            attributes,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FileTimes, NewFile};

    const MODULE: &str = "Logical Imager";

    fn board_with_file() -> (CaseBlackboard, i64) {
        let db = CaseDb::open_in_memory().unwrap();
        let file_id = db
            .transaction(|tx| {
                let ds = CaseDb::add_image_data_source_in(
                    tx,
                    "dev",
                    "img",
                    "UTC",
                    &["/x/img.vhd".to_string()],
                )?;
                CaseDb::add_file(
                    tx,
                    ds.id,
                    &NewFile {
                        name: "foo.txt".to_string(),
                        parent_path: "/".to_string(),
                        meta_addr: Some(7),
                        size: 1,
                        times: FileTimes::default(),
                    },
                )
            })
            .unwrap();
        (CaseBlackboard::new(db), file_id)
    }

    fn hit_attributes(set: &str, rule: &str) -> Vec<Attribute> {
        vec![Attribute::set_name(MODULE, set), Attribute::category(MODULE, rule)]
    }

    #[test]
    fn test_artifact_exists_requires_all_attributes() {
        let (board, file_id) = board_with_file();
        assert!(!board
            .artifact_exists(file_id, ArtifactType::InterestingFileHit, &hit_attributes("SetA", "Rule1"))
            .unwrap());

        board
            .new_artifact(file_id, ArtifactType::InterestingFileHit, hit_attributes("SetA", "Rule1"))
            .unwrap();

        assert!(board
            .artifact_exists(file_id, ArtifactType::InterestingFileHit, &hit_attributes("SetA", "Rule1"))
            .unwrap());
        assert!(!board
            .artifact_exists(file_id, ArtifactType::InterestingFileHit, &hit_attributes("SetA", "Rule2"))
            .unwrap());
    }

    #[test]
    fn test_post_marks_module() {
        let (board, file_id) = board_with_file();
        let artifact = board
            .new_artifact(file_id, ArtifactType::InterestingFileHit, hit_attributes("SetA", "Rule1"))
            .unwrap();
        assert_eq!(board.posted_module(artifact.id).unwrap(), None);

        board.post_artifacts(&[artifact.clone()], MODULE).unwrap();
        assert_eq!(
            board.posted_module(artifact.id).unwrap().as_deref(),
            Some(MODULE)
        );

        let stored = board.artifacts_for_file(file_id).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].attribute(AttributeType::SetName), Some("SetA"));
        assert_eq!(stored[0].attribute(AttributeType::Category), Some("Rule1"));
    }

    #[test]
    fn test_post_unknown_artifact_rolls_back_batch() {
        let (board, file_id) = board_with_file();
        let real = board
            .new_artifact(file_id, ArtifactType::InterestingFileHit, hit_attributes("SetA", "Rule1"))
            .unwrap();
        let bogus = Artifact {
            id: 9999,
            ..real.clone()
        };

        assert!(board.post_artifacts(&[real.clone(), bogus], MODULE).is_err());
        assert_eq!(board.posted_module(real.id).unwrap(), None);
    }
}
