//! Case database schema.
//!
//! All timestamps are INTEGER seconds since the Unix epoch, as they appear in
//! the acquisition manifest.

use crate::backend::DbConnection;
use crate::error::Result;

pub(crate) const CASE_SCHEMA_SQL: &str = r#"
-- Data sources: one row per ingested image or local-files container
CREATE TABLE IF NOT EXISTS data_sources (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL CHECK (kind IN ('image', 'local_files')),
    device_id TEXT NOT NULL,
    name TEXT NOT NULL,
    time_zone TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

-- Image paths backing image data sources (split images have several)
CREATE TABLE IF NOT EXISTS image_names (
    data_source_id INTEGER NOT NULL REFERENCES data_sources(id) ON DELETE CASCADE,
    sequence INTEGER NOT NULL,
    path TEXT NOT NULL,
    PRIMARY KEY (data_source_id, sequence)
);

-- Files and virtual directories inside data sources
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    data_source_id INTEGER NOT NULL REFERENCES data_sources(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    parent_path TEXT NOT NULL,               -- always "/a/b/" form
    meta_addr INTEGER,                       -- filesystem metadata address (images only)
    is_dir INTEGER NOT NULL DEFAULT 0,
    size INTEGER NOT NULL DEFAULT 0,
    crtime INTEGER NOT NULL DEFAULT 0,
    mtime INTEGER NOT NULL DEFAULT 0,
    atime INTEGER NOT NULL DEFAULT 0,
    ctime INTEGER NOT NULL DEFAULT 0,
    local_path TEXT                          -- on-disk copy for local files
);
CREATE INDEX IF NOT EXISTS idx_files_name_parent ON files(name, parent_path);
CREATE INDEX IF NOT EXISTS idx_files_source_meta ON files(data_source_id, meta_addr);

-- Reports registered with the case
CREATE TABLE IF NOT EXISTS reports (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL,
    source_module TEXT NOT NULL,
    name TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

-- Blackboard artifacts
CREATE TABLE IF NOT EXISTS artifacts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    artifact_type TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    posted_module TEXT,                      -- NULL until posted
    posted_at INTEGER
);
CREATE INDEX IF NOT EXISTS idx_artifacts_file_type ON artifacts(file_id, artifact_type);

CREATE TABLE IF NOT EXISTS artifact_attributes (
    artifact_id INTEGER NOT NULL REFERENCES artifacts(id) ON DELETE CASCADE,
    attribute_type TEXT NOT NULL,
    source_module TEXT NOT NULL,
    value TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_artifact_attributes_artifact ON artifact_attributes(artifact_id);
"#;

pub(crate) fn ensure_schema(conn: &DbConnection) -> Result<()> {
    conn.execute_batch(CASE_SCHEMA_SQL)
}
