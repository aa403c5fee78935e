//! Records stored in the case database.

use serde::{Deserialize, Serialize};

/// Kind of data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSourceKind {
    /// Disk image (e.g. a VHD produced by the collection tool)
    Image,
    /// Container of individually registered local files
    LocalFiles,
}

impl DataSourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::LocalFiles => "local_files",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "image" => Some(Self::Image),
            "local_files" => Some(Self::LocalFiles),
            _ => None,
        }
    }
}

/// A top-level unit of ingested evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSource {
    pub id: i64,
    pub kind: DataSourceKind,
    pub device_id: String,
    pub name: String,
    pub time_zone: String,
}

/// MAC-B timestamps, seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTimes {
    pub crtime: i64,
    pub mtime: i64,
    pub atime: i64,
    pub ctime: i64,
}

/// A file (or virtual directory) inside a data source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: i64,
    pub data_source_id: i64,
    pub name: String,
    /// Always `/a/b/` form; `/` for the data source root.
    pub parent_path: String,
    pub meta_addr: Option<i64>,
    pub is_dir: bool,
    pub size: i64,
    pub times: FileTimes,
    pub local_path: Option<String>,
}

impl FileRecord {
    /// Parent path joined with the name, e.g. `/root/img.vhd/sub/foo.txt`.
    pub fn full_path(&self) -> String {
        format!("{}{}", self.parent_path, self.name)
    }
}

/// A file to register in an image data source.
#[derive(Debug, Clone, Default)]
pub struct NewFile {
    pub name: String,
    pub parent_path: String,
    pub meta_addr: Option<i64>,
    pub size: i64,
    pub times: FileTimes,
}

/// Lookup filter for [`crate::CaseDb::find_files`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileFilter {
    /// Scoped to one image data source by metadata address and name
    MetaAddress {
        data_source_id: i64,
        meta_addr: i64,
        name: String,
    },
    /// Scoped by name and parent path across all data sources
    ParentPath { name: String, parent_path: String },
}

/// A report file registered with the case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub id: i64,
    pub path: String,
    pub source_module: String,
    pub name: String,
}

/// Blackboard artifact types produced by triage ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactType {
    InterestingFileHit,
}

impl ArtifactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InterestingFileHit => "TSK_INTERESTING_FILE_HIT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "TSK_INTERESTING_FILE_HIT" => Some(Self::InterestingFileHit),
            _ => None,
        }
    }
}

/// Attribute types attached to artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeType {
    /// Name of the rule set that flagged the file
    SetName,
    /// Name of the rule inside the set
    Category,
}

impl AttributeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SetName => "TSK_SET_NAME",
            Self::Category => "TSK_CATEGORY",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "TSK_SET_NAME" => Some(Self::SetName),
            "TSK_CATEGORY" => Some(Self::Category),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attribute {
    pub attribute_type: AttributeType,
    pub source_module: String,
    pub value: String,
}

impl Attribute {
    pub fn new(
        attribute_type: AttributeType,
        source_module: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            attribute_type,
            source_module: source_module.into(),
            value: value.into(),
        }
    }

    pub fn set_name(source_module: &str, value: &str) -> Self {
        Self::new(AttributeType::SetName, source_module, value)
    }

    pub fn category(source_module: &str, value: &str) -> Self {
        Self::new(AttributeType::Category, source_module, value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: i64,
    pub file_id: i64,
    pub artifact_type: ArtifactType,
    pub attributes: Vec<Attribute>,
}

impl Artifact {
    pub fn attribute(&self, attribute_type: AttributeType) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.attribute_type == attribute_type)
            .map(|a| a.value.as_str())
    }
}

/// Normalise a parent path to `/a/b/` form.
///
/// Both `/` and `\` separate segments; empty segments are dropped.
pub fn normalize_parent_path(path: &str) -> String {
    let segments: Vec<&str> = path
        .split(|c| c == '/' || c == '\\')
        .filter(|s| !s.is_empty())
        .collect();
    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", segments.join("/"))
    }
}
