//! Logical-imager acquisition directories.
//!
//! The imager names each run `Logical_Imager_<HOST>_<yyyymmdd>_<HH>_<MM>_<SS>`.

use super::error::{IngestError, Result};
use super::settings::IngestSettings;
use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// An acquisition directory found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Acquisition {
    pub path: PathBuf,
    /// Host name from the directory name, if it follows the imager's pattern
    pub host: Option<String>,
    pub collected_at: Option<NaiveDateTime>,
    pub has_users_file: bool,
    /// Virtual-disk file names directly under the directory
    pub virtual_disks: Vec<String>,
    pub has_root: bool,
}

/// Parses acquisition directory names.
pub struct AcquisitionNames {
    pattern: Regex,
}

impl AcquisitionNames {
    pub fn new() -> Result<Self> {
        let pattern = Regex::new(
            r"^Logical_Imager_(.+)_(\d{4})(\d{2})(\d{2})_(\d{2})_(\d{2})_(\d{2})$",
        )
        .map_err(|e| IngestError::Settings(e.to_string()))?;
        Ok(Self { pattern })
    }

    /// Host and collection time encoded in `name`.
    ///
    /// Returns `None` for names that do not follow the pattern or carry an
    /// impossible date.
    pub fn parse(&self, name: &str) -> Option<(String, NaiveDateTime)> {
        let caps = self.pattern.captures(name)?;
        let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
        let date = NaiveDate::from_ymd_opt(num(2)? as i32, num(3)?, num(4)?)?;
        let time = date.and_hms_opt(num(5)?, num(6)?, num(7)?)?;
        Some((caps[1].to_string(), time))
    }
}

/// Subdirectories of `dir` that contain a results manifest, sorted by path.
pub fn list_acquisitions(dir: &Path, settings: &IngestSettings) -> Result<Vec<Acquisition>> {
    let names = AcquisitionNames::new()?;
    let mut found = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() || !path.join(&settings.results_file).is_file() {
            continue;
        }

        let dir_name = entry.file_name().to_string_lossy().to_string();
        let parsed = names.parse(&dir_name);
        let mut virtual_disks = Vec::new();
        for child in fs::read_dir(&path)? {
            let child = child?;
            let name = child.file_name().to_string_lossy().to_string();
            if child.file_type()?.is_file() && settings.is_virtual_disk(&name) {
                virtual_disks.push(name);
            }
        }
        virtual_disks.sort();

        found.push(Acquisition {
            has_users_file: path.join(&settings.users_file).is_file(),
            has_root: path.join(&settings.root_dir).is_dir(),
            host: parsed.as_ref().map(|(host, _)| host.clone()),
            collected_at: parsed.map(|(_, at)| at),
            virtual_disks,
            path,
        });
    }

    found.sort_by(|a, b| a.path.cmp(&b.path));
    debug!(dir = %dir.display(), count = found.len(), "Listed acquisitions");
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_name() {
        let names = AcquisitionNames::new().unwrap();
        let (host, at) = names
            .parse("Logical_Imager_WIN_DESK_01_20190718_14_05_33")
            .unwrap();
        assert_eq!(host, "WIN_DESK_01");
        assert_eq!(at.to_string(), "2019-07-18 14:05:33");
    }

    #[test]
    fn test_parse_rejects_other_names() {
        let names = AcquisitionNames::new().unwrap();
        assert!(names.parse("Logical_Imager_HOST_2019071_14_05_33").is_none());
        assert!(names.parse("Imager_HOST_20190718_14_05_33").is_none());
        assert!(names.parse("Logical_Imager_HOST_20191318_14_05_33").is_none());
    }

    #[test]
    fn test_list_acquisitions() {
        let tmp = TempDir::new().unwrap();
        let settings = IngestSettings::default();

        let b = tmp.path().join("Logical_Imager_B_20200101_00_00_00");
        fs::create_dir_all(&b).unwrap();
        fs::write(b.join("SearchResults.txt"), "h\n").unwrap();
        fs::write(b.join("users.txt"), "").unwrap();
        fs::write(b.join("disk2.vhd"), "").unwrap();
        fs::write(b.join("disk1.vhd"), "").unwrap();

        let a = tmp.path().join("adhoc");
        fs::create_dir_all(a.join("root")).unwrap();
        fs::write(a.join("SearchResults.txt"), "h\n").unwrap();

        fs::create_dir_all(tmp.path().join("not_an_acquisition")).unwrap();

        let found = list_acquisitions(tmp.path(), &settings).unwrap();
        assert_eq!(found.len(), 2);

        assert_eq!(found[0].host.as_deref(), Some("B"));
        assert!(found[0].has_users_file);
        assert_eq!(found[0].virtual_disks, vec!["disk1.vhd", "disk2.vhd"]);

        assert_eq!(found[1].path, a);
        assert_eq!(found[1].host, None);
        assert!(found[1].has_root);
        assert!(found[1].virtual_disks.is_empty());
    }
}
