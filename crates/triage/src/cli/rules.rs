//! Rules command - validate rule configurations and try them on files

use crate::cli::error::HelpfulError;
use crate::cli::output::{format_epoch, format_size, print_table};
use clap::Subcommand;
use std::path::{Path, PathBuf};
use triage_rules::{evaluate, parse_with, CarryOver, Config, FileFacts, ParseOptions, Rule};
use walkdir::WalkDir;

/// Subcommands for rule configurations
#[derive(Subcommand, Debug, Clone)]
pub enum RulesAction {
    /// Validate a configuration and list its rules
    Check {
        /// Rule configuration (JSON)
        config: PathBuf,
        #[arg(long)]
        json: bool,
        /// Start every rule from defaults instead of the previous rule's values
        #[arg(long)]
        reset_defaults: bool,
    },
    /// Report which rules match the files under a directory
    Match {
        config: PathBuf,
        dir: PathBuf,
        #[arg(long)]
        json: bool,
        #[arg(long)]
        reset_defaults: bool,
    },
}

/// Execute the rules command
pub fn run(action: RulesAction) -> anyhow::Result<()> {
    match action {
        RulesAction::Check {
            config,
            json,
            reset_defaults,
        } => check(&config, json, reset_defaults),
        RulesAction::Match {
            config,
            dir,
            json,
            reset_defaults,
        } => match_dir(&config, &dir, json, reset_defaults),
    }
}

fn load_config(path: &Path, reset_defaults: bool) -> Result<Config, HelpfulError> {
    if !path.is_file() {
        return Err(HelpfulError::path_not_found(path));
    }
    let text = std::fs::read_to_string(path)
        .map_err(|e| HelpfulError::invalid_rule_config(path, &e.to_string()))?;
    let document: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| HelpfulError::invalid_rule_config(path, &e.to_string()))?;
    let options = ParseOptions {
        carry_over: if reset_defaults {
            CarryOver::Reset
        } else {
            CarryOver::Legacy
        },
    };
    parse_with(&document, options).map_err(|e| HelpfulError::invalid_rule_config(path, &e.to_string()))
}

fn check(path: &Path, json: bool, reset_defaults: bool) -> anyhow::Result<()> {
    let config = load_config(path, reset_defaults)?;

    if json {
        println!("{}", config.to_json_pretty()?);
        return Ok(());
    }

    let mut rows = Vec::new();
    for set in &config.rule_sets {
        for rule in &set.rules {
            rows.push(vec![
                set.set_name.clone(),
                rule.name.clone(),
                describe_criteria(rule),
                if rule.should_save { "yes" } else { "no" }.to_string(),
                if rule.should_alert { "yes" } else { "no" }.to_string(),
            ]);
        }
    }

    print_table(&["RULE SET", "RULE", "CRITERIA", "SAVE", "ALERT"], rows);
    println!();
    println!(
        "{} rule sets, {} rules, finalize-image-writer: {}",
        config.rule_sets.len(),
        config.rule_count(),
        config.finalize_image_writer
    );
    Ok(())
}

fn describe_criteria(rule: &Rule) -> String {
    let join = |values: &std::collections::BTreeSet<String>| {
        values.iter().cloned().collect::<Vec<_>>().join(",")
    };
    let mut parts = Vec::new();
    if !rule.full_paths.is_empty() {
        parts.push(format!("full-paths={}", join(&rule.full_paths)));
    }
    if !rule.extensions.is_empty() {
        parts.push(format!("extensions={}", join(&rule.extensions)));
    }
    if !rule.file_names.is_empty() {
        parts.push(format!("file-names={}", join(&rule.file_names)));
    }
    if !rule.folder_names.is_empty() {
        parts.push(format!("folder-names={}", join(&rule.folder_names)));
    }
    if let Some(min) = rule.size_range.min {
        parts.push(format!("size>={}", min));
    }
    if let Some(max) = rule.size_range.max {
        parts.push(format!("size<={}", max));
    }
    if let Some(min) = rule.date_range.min {
        parts.push(format!("day>={}", min));
    }
    if let Some(max) = rule.date_range.max {
        parts.push(format!("day<={}", max));
    }
    if let Some(days) = rule.date_range.min_days {
        parts.push(format!("older-than={}d", days));
    }
    if parts.is_empty() {
        "(any file)".to_string()
    } else {
        parts.join(" ")
    }
}

fn match_dir(path: &Path, dir: &Path, json: bool, reset_defaults: bool) -> anyhow::Result<()> {
    let config = load_config(path, reset_defaults)?;
    if !dir.exists() {
        return Err(HelpfulError::path_not_found(dir).into());
    }
    if !dir.is_dir() {
        return Err(HelpfulError::not_a_directory(dir).into());
    }

    let mut hits = Vec::new();
    let mut scanned = 0usize;
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(error = %err, "Skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let facts = match FileFacts::from_path(entry.path()) {
            Ok(facts) => facts,
            Err(err) => {
                tracing::warn!(path = %entry.path().display(), error = %err, "Skipping file");
                continue;
            }
        };
        scanned += 1;
        for (set, rule) in evaluate(&config, &facts) {
            hits.push((entry.path().to_path_buf(), facts.clone(), set.set_name.clone(), rule.name.clone()));
        }
    }

    if json {
        let output: Vec<serde_json::Value> = hits
            .iter()
            .map(|(path, facts, set, rule)| {
                serde_json::json!({
                    "path": path.display().to_string(),
                    "size": facts.size,
                    "modified": facts.mtime,
                    "rule_set": set,
                    "rule": rule,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("No matches in {} files.", scanned);
        return Ok(());
    }

    let hit_count = hits.len();
    let rows = hits
        .into_iter()
        .map(|(path, facts, set, rule)| {
            vec![
                path.display().to_string(),
                format_size(facts.size.max(0) as u64),
                format_epoch(facts.mtime),
                set,
                rule,
            ]
        })
        .collect();
    print_table(&["PATH", "SIZE", "MODIFIED", "RULE SET", "RULE"], rows);
    println!();
    println!("{} matches in {} files", hit_count, scanned);
    Ok(())
}
