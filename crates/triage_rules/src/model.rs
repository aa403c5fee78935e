//! Rule configuration model
//!
//! Serialises with the key names of the configuration document so a saved
//! configuration parses back to an equal value. Every key is written, with
//! `null` or `[]` for absent criteria, so a saved file parses the same way
//! whether or not rule defaults carry over between rules.

use crate::error::Result;
use crate::parser;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;

/// A parsed rule configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Config {
    #[serde(rename = "finalize-image-writer")]
    pub finalize_image_writer: bool,

    #[serde(rename = "rule-sets")]
    pub rule_sets: Vec<RuleSet>,
}

impl Config {
    /// Parse a configuration document from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let document: serde_json::Value = serde_json::from_str(text)?;
        parser::parse(&document)
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Save the configuration as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn find_rule_set(&self, set_name: &str) -> Option<&RuleSet> {
        self.rule_sets.iter().find(|s| s.set_name == set_name)
    }

    /// Total number of rules across all sets
    pub fn rule_count(&self) -> usize {
        self.rule_sets.iter().map(|s| s.rules.len()).sum()
    }
}

/// Named, ordered group of rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleSet {
    #[serde(rename = "set-name")]
    pub set_name: String,
    pub rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(set_name: impl Into<String>, rules: Vec<Rule>) -> Self {
        Self {
            set_name: set_name.into(),
            rules,
        }
    }

    /// First rule with the given name
    pub fn find(&self, rule_name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name == rule_name)
    }
}

/// A bag of criteria. Every present criterion must hold for a file to match;
/// a rule without criteria matches everything.
///
/// `full_paths` excludes `extensions`, `folder_names` and `file_names`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rule {
    #[serde(rename = "shouldAlert")]
    pub should_alert: bool,

    #[serde(rename = "shouldSave")]
    pub should_save: bool,

    pub name: String,

    pub description: Option<String>,

    pub extensions: BTreeSet<String>,

    #[serde(rename = "folder-names")]
    pub folder_names: BTreeSet<String>,

    #[serde(rename = "file-names")]
    pub file_names: BTreeSet<String>,

    #[serde(rename = "full-paths")]
    pub full_paths: BTreeSet<String>,

    #[serde(rename = "size-range")]
    pub size_range: SizeRange,

    #[serde(rename = "date-range")]
    pub date_range: DateRange,
}

impl Rule {
    /// Rule with default flags and no criteria.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            should_alert: true,
            should_save: false,
            name: name.into(),
            description: None,
            extensions: BTreeSet::new(),
            folder_names: BTreeSet::new(),
            file_names: BTreeSet::new(),
            full_paths: BTreeSet::new(),
            size_range: SizeRange::default(),
            date_range: DateRange::default(),
        }
    }

    pub fn has_criteria(&self) -> bool {
        !self.extensions.is_empty()
            || !self.folder_names.is_empty()
            || !self.file_names.is_empty()
            || !self.full_paths.is_empty()
            || !self.size_range.is_empty()
            || !self.date_range.is_empty()
    }
}

/// Inclusive size bounds in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SizeRange {
    pub min: Option<i64>,
    pub max: Option<i64>,
}

impl SizeRange {
    pub fn is_empty(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

/// Bounds on a file's latest timestamp. `min`/`max` are days since the Unix
/// epoch; `min_days` is a minimum age in days at match time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub min: Option<i64>,
    pub max: Option<i64>,
    #[serde(rename = "min-days")]
    pub min_days: Option<i64>,
}

impl DateRange {
    pub fn is_empty(&self) -> bool {
        self.min.is_none() && self.max.is_none() && self.min_days.is_none()
    }
}
