//! Closed-schema parser for rule configuration documents.
//!
//! The document is walked as a `serde_json::Value` rather than derived with
//! `Deserialize`: every unrecognised key is an error, and rule defaults follow
//! the [`CarryOver`] policy, neither of which a derive expresses.

use crate::error::{ConfigError, Result};
use crate::model::{Config, DateRange, Rule, RuleSet, SizeRange};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tracing::debug;

/// How rule fields carry between consecutive rules of one rule set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CarryOver {
    /// A rule starts from the previous rule's values in the same set; a
    /// field keeps its value until some later rule sets it again. Existing
    /// configuration files are written against this behaviour.
    #[default]
    Legacy,
    /// Every rule starts from the defaults.
    Reset,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    pub carry_over: CarryOver,
}

/// Parse a configuration document with default options.
pub fn parse(document: &Value) -> Result<Config> {
    parse_with(document, ParseOptions::default())
}

pub fn parse_with(document: &Value, options: ParseOptions) -> Result<Config> {
    let root = as_object(document, "configuration")?;

    let mut finalize_image_writer = false;
    let mut rule_sets_value = None;
    for (key, value) in root {
        match key.as_str() {
            "finalize-image-writer" => finalize_image_writer = as_bool(value, key)?,
            "rule-sets" => rule_sets_value = Some(value),
            _ => return Err(ConfigError::UnsupportedKey(key.clone())),
        }
    }

    let rule_sets_value = match rule_sets_value {
        Some(value) if !value.is_null() => value,
        _ => return Err(ConfigError::MissingRuleSets),
    };

    let mut rule_sets = Vec::new();
    for (index, element) in as_array(rule_sets_value, "rule-sets")?.iter().enumerate() {
        rule_sets.push(parse_rule_set(element, index, options)?);
    }

    debug!(
        rule_sets = rule_sets.len(),
        finalize_image_writer, "Parsed rule configuration"
    );
    Ok(Config {
        finalize_image_writer,
        rule_sets,
    })
}

fn parse_rule_set(element: &Value, index: usize, options: ParseOptions) -> Result<RuleSet> {
    let object = as_object(element, "rule-sets")?;
    let context = format!("Rule set #{}", index + 1);

    let mut set_name = None;
    let mut rules_value = None;
    for (key, value) in object {
        match key.as_str() {
            "set-name" => set_name = Some(as_string(value, key)?),
            "rules" => rules_value = Some(value),
            _ => return Err(ConfigError::UnsupportedKey(key.clone())),
        }
    }

    let set_name = set_name.ok_or_else(|| ConfigError::MissingField {
        context: context.clone(),
        field: "set-name".to_string(),
    })?;
    let rules_value = rules_value.ok_or_else(|| ConfigError::MissingField {
        context: format!("Rule set '{}'", set_name),
        field: "rules".to_string(),
    })?;

    // Defaults are scoped to one rule set.
    let mut draft = RuleDraft::default();
    let mut rules = Vec::new();
    for (rule_index, rule_value) in as_array(rules_value, "rules")?.iter().enumerate() {
        if options.carry_over == CarryOver::Reset {
            draft = RuleDraft::default();
        }
        for (key, value) in as_object(rule_value, "rules")? {
            draft.apply(key, value)?;
        }
        rules.push(draft.build(&set_name, rule_index)?);
    }

    Ok(RuleSet { set_name, rules })
}

/// Field values collected for one rule.
#[derive(Debug, Clone)]
struct RuleDraft {
    should_alert: bool,
    should_save: bool,
    name: Option<String>,
    description: Option<String>,
    extensions: BTreeSet<String>,
    folder_names: BTreeSet<String>,
    file_names: BTreeSet<String>,
    full_paths: BTreeSet<String>,
    size_range: SizeRange,
    date_range: DateRange,
}

impl Default for RuleDraft {
    fn default() -> Self {
        Self {
            should_alert: true,
            should_save: false,
            name: None,
            description: None,
            extensions: BTreeSet::new(),
            folder_names: BTreeSet::new(),
            file_names: BTreeSet::new(),
            full_paths: BTreeSet::new(),
            size_range: SizeRange::default(),
            date_range: DateRange::default(),
        }
    }
}

impl RuleDraft {
    fn apply(&mut self, key: &str, value: &Value) -> Result<()> {
        match key {
            "shouldAlert" => self.should_alert = as_bool(value, key)?,
            "shouldSave" => self.should_save = as_bool(value, key)?,
            "name" => self.name = optional(value, |v| as_string(v, key))?,
            "description" => self.description = optional(value, |v| as_string(v, key))?,
            "extensions" => self.extensions = as_string_set(value, key)?,
            "folder-names" => self.folder_names = as_string_set(value, key)?,
            "file-names" => self.file_names = as_string_set(value, key)?,
            "full-paths" => self.full_paths = as_string_set(value, key)?,
            "size-range" => {
                for (bound, v) in as_object(value, key)? {
                    match bound.as_str() {
                        "min" => self.size_range.min = optional(v, |v| as_int(v, bound))?,
                        "max" => self.size_range.max = optional(v, |v| as_int(v, bound))?,
                        _ => return Err(ConfigError::UnsupportedKey(bound.clone())),
                    }
                }
            }
            "date-range" => {
                for (bound, v) in as_object(value, key)? {
                    match bound.as_str() {
                        "min" => self.date_range.min = optional(v, |v| as_int(v, bound))?,
                        "max" => self.date_range.max = optional(v, |v| as_int(v, bound))?,
                        "min-days" => {
                            self.date_range.min_days = optional(v, |v| as_int(v, bound))?
                        }
                        _ => return Err(ConfigError::UnsupportedKey(bound.clone())),
                    }
                }
            }
            _ => return Err(ConfigError::UnsupportedKey(key.to_string())),
        }
        Ok(())
    }

    fn build(&self, set_name: &str, index: usize) -> Result<Rule> {
        let name = self.name.clone().ok_or_else(|| ConfigError::MissingField {
            context: format!("Rule #{} in set '{}'", index + 1, set_name),
            field: "name".to_string(),
        })?;

        if !self.full_paths.is_empty()
            && (!self.extensions.is_empty()
                || !self.folder_names.is_empty()
                || !self.file_names.is_empty())
        {
            return Err(ConfigError::FullPathsConflict { rule: name });
        }

        Ok(Rule {
            should_alert: self.should_alert,
            should_save: self.should_save,
            name,
            description: self.description.clone(),
            extensions: self.extensions.clone(),
            folder_names: self.folder_names.clone(),
            file_names: self.file_names.clone(),
            full_paths: self.full_paths.clone(),
            size_range: self.size_range,
            date_range: self.date_range,
        })
    }
}

// `null` clears an optional field.
fn optional<T>(value: &Value, read: impl FnOnce(&Value) -> Result<T>) -> Result<Option<T>> {
    if value.is_null() {
        Ok(None)
    } else {
        read(value).map(Some)
    }
}

fn as_object<'a>(value: &'a Value, key: &str) -> Result<&'a Map<String, Value>> {
    value.as_object().ok_or_else(|| ConfigError::InvalidType {
        key: key.to_string(),
        expected: "an object",
    })
}

fn as_array<'a>(value: &'a Value, key: &str) -> Result<&'a Vec<Value>> {
    value.as_array().ok_or_else(|| ConfigError::InvalidType {
        key: key.to_string(),
        expected: "an array",
    })
}

fn as_bool(value: &Value, key: &str) -> Result<bool> {
    value.as_bool().ok_or_else(|| ConfigError::InvalidType {
        key: key.to_string(),
        expected: "a boolean",
    })
}

fn as_int(value: &Value, key: &str) -> Result<i64> {
    value.as_i64().ok_or_else(|| ConfigError::InvalidType {
        key: key.to_string(),
        expected: "an integer",
    })
}

fn as_string(value: &Value, key: &str) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ConfigError::InvalidType {
            key: key.to_string(),
            expected: "a string",
        })
}

fn as_string_set(value: &Value, key: &str) -> Result<BTreeSet<String>> {
    if value.is_null() {
        return Ok(BTreeSet::new());
    }
    as_array(value, key)?
        .iter()
        .map(|item| as_string(item, key))
        .collect()
}
