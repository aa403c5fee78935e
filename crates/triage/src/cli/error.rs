//! Helpful error types for CLI commands
//!
//! Every error includes:
//! - What went wrong
//! - Context about the situation
//! - Suggestions for how to fix it

use std::fmt;
use std::path::Path;

/// An error with helpful context and suggestions
#[derive(Debug)]
pub struct HelpfulError {
    /// The main error message
    pub message: String,
    /// Additional context about what was happening
    pub context: Option<String>,
    /// Suggestions for how to fix the error
    pub suggestions: Vec<String>,
}

impl HelpfulError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            suggestions: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_suggestions(
        mut self,
        suggestions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.suggestions.extend(suggestions.into_iter().map(|s| s.into()));
        self
    }

    // === Common error constructors ===

    /// Path does not exist
    pub fn path_not_found(path: &Path) -> Self {
        Self::new(format!("Path not found: {}", path.display()))
            .with_context("The specified path does not exist on the filesystem")
            .with_suggestions([
                format!("TRY: Check that the path exists: ls -la {}", path.display()),
                "TRY: Check for typos in the path".to_string(),
            ])
    }

    /// Path exists but is not a directory
    pub fn not_a_directory(path: &Path) -> Self {
        Self::new(format!("Not a directory: {}", path.display()))
            .with_context("This command expects a directory, not a file")
            .with_suggestion(format!(
                "TRY: Use the parent directory: {}",
                path.parent()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| ".".to_string())
            ))
    }

    /// Rule configuration failed to load or validate
    pub fn invalid_rule_config(path: &Path, details: &str) -> Self {
        Self::new(format!("Invalid rule configuration: {}", details))
            .with_context(format!("While loading {}", path.display()))
            .with_suggestions([
                "TRY: Top-level keys are finalize-image-writer and rule-sets".to_string(),
                "TRY: A rule may not combine full-paths with extensions, file-names or folder-names"
                    .to_string(),
                format!("TRY: Validate the JSON: python -m json.tool {}", path.display()),
            ])
    }

    /// Case database could not be opened
    pub fn case_unavailable(path: &Path, details: &str) -> Self {
        Self::new(format!("Cannot open case database: {}", details))
            .with_context(format!("Case file: {}", path.display()))
            .with_suggestions([
                format!("TRY: Check permissions on {}", path.display()),
                "TRY: Pass a different file with --case".to_string(),
            ])
    }

    /// Ingestion finished with critical errors
    pub fn ingest_failed(source: &Path, errors: &[String]) -> Self {
        let message = errors
            .last()
            .cloned()
            .unwrap_or_else(|| "Ingestion failed".to_string());
        let mut err = Self::new(message)
            .with_context(format!("Ingesting {}", source.display()));
        for earlier in errors.iter().rev().skip(1).rev() {
            err = err.with_suggestion(format!("EARLIER: {}", earlier));
        }
        err.with_suggestion(format!(
            "TRY: Check the acquisition layout: triage acquisitions {}",
            source
                .parent()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| ".".to_string())
        ))
    }
}

impl fmt::Display for HelpfulError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}", self.message)?;

        if let Some(ctx) = &self.context {
            writeln!(f, "CONTEXT: {}", ctx)?;
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            for suggestion in &self.suggestions {
                writeln!(f, "  {}", suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for HelpfulError {}
