//! Rule matching against file facts.

use crate::model::{Config, DateRange, Rule, RuleSet, SizeRange};
use chrono::{DateTime, Utc};
use std::io;
use std::path::Path;

const SECONDS_PER_DAY: i64 = 86_400;

/// What the matcher knows about a file.
///
/// Timestamps are seconds since the Unix epoch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileFacts {
    pub name: String,
    /// Directory portion, `/` or `\` separated
    pub parent_path: String,
    pub size: i64,
    pub crtime: i64,
    pub mtime: i64,
    pub atime: i64,
    pub ctime: i64,
}

impl FileFacts {
    /// Read facts from filesystem metadata.
    ///
    /// Creation time falls back to modification time where the platform does
    /// not record it; likewise for the change time off Unix.
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        let seconds =
            |t: io::Result<std::time::SystemTime>| t.ok().map(|t| DateTime::<Utc>::from(t).timestamp());

        let mtime = seconds(meta.modified()).unwrap_or(0);
        let atime = seconds(meta.accessed()).unwrap_or(mtime);
        let crtime = seconds(meta.created()).unwrap_or(mtime);
        #[cfg(unix)]
        let ctime = {
            use std::os::unix::fs::MetadataExt;
            meta.ctime()
        };
        #[cfg(not(unix))]
        let ctime = mtime;

        Ok(Self {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            parent_path: path
                .parent()
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_default(),
            size: meta.len() as i64,
            crtime,
            mtime,
            atime,
            ctime,
        })
    }

    /// Text after the last `.` of the name, as stored.
    pub fn extension(&self) -> Option<&str> {
        self.name.rsplit_once('.').map(|(_, ext)| ext)
    }

    /// Components of the parent path.
    pub fn folders(&self) -> impl Iterator<Item = &str> {
        self.parent_path
            .split(|c| c == '/' || c == '\\')
            .filter(|s| !s.is_empty())
    }

    /// `/`-separated absolute path, e.g. `/x/y.txt`.
    pub fn full_path(&self) -> String {
        let mut out = String::new();
        for folder in self.folders() {
            out.push('/');
            out.push_str(folder);
        }
        out.push('/');
        out.push_str(&self.name);
        out
    }

    /// Latest of the four timestamps.
    pub fn latest_time(&self) -> i64 {
        self.crtime.max(self.mtime).max(self.atime).max(self.ctime)
    }
}

/// True if `file` satisfies every criterion of `rule`, evaluated now.
pub fn matches(rule: &Rule, file: &FileFacts) -> bool {
    matches_at(rule, file, Utc::now())
}

/// [`matches`] with an explicit clock for relative-date criteria.
pub fn matches_at(rule: &Rule, file: &FileFacts, now: DateTime<Utc>) -> bool {
    if !rule.full_paths.is_empty() {
        if !rule.full_paths.contains(&file.full_path()) {
            return false;
        }
    } else {
        if !rule.extensions.is_empty()
            && !file
                .extension()
                .map_or(false, |ext| rule.extensions.contains(ext))
        {
            return false;
        }
        if !rule.folder_names.is_empty()
            && !file.folders().any(|f| rule.folder_names.contains(f))
        {
            return false;
        }
        if !rule.file_names.is_empty() && !rule.file_names.contains(&file.name) {
            return false;
        }
    }

    size_matches(&rule.size_range, file.size) && date_matches(&rule.date_range, file, now)
}

fn size_matches(range: &SizeRange, size: i64) -> bool {
    range.min.map_or(true, |min| size >= min) && range.max.map_or(true, |max| size <= max)
}

fn date_matches(range: &DateRange, file: &FileFacts, now: DateTime<Utc>) -> bool {
    if range.is_empty() {
        return true;
    }
    let latest_day = file.latest_time().div_euclid(SECONDS_PER_DAY);

    let in_window = (range.min.is_some() || range.max.is_some())
        && range.min.map_or(true, |min| latest_day >= min)
        && range.max.map_or(true, |max| latest_day <= max);

    let old_enough = range.min_days.map_or(false, |min_days| {
        now.timestamp().div_euclid(SECONDS_PER_DAY) - latest_day >= min_days
    });

    in_window || old_enough
}

/// Every `(rule set, rule)` pair whose rule matches `file`, in document order.
pub fn evaluate<'a>(config: &'a Config, file: &FileFacts) -> Vec<(&'a RuleSet, &'a Rule)> {
    let now = Utc::now();
    config
        .rule_sets
        .iter()
        .flat_map(|set| set.rules.iter().map(move |rule| (set, rule)))
        .filter(|(_, rule)| matches_at(rule, file, now))
        .collect()
}
