//! Result reporting for ingestion runs.

use serde::Serialize;
use triage_db::DataSource;

/// Aggregate result code of a run, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessorResult {
    NoErrors,
    NoncriticalErrors,
    CriticalErrors,
}

impl ProcessorResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoErrors => "NO_ERRORS",
            Self::NoncriticalErrors => "NONCRITICAL_ERRORS",
            Self::CriticalErrors => "CRITICAL_ERRORS",
        }
    }
}

impl std::fmt::Display for ProcessorResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a run hands to its completion callback.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub result: ProcessorResult,
    pub errors: Vec<String>,
    pub data_sources: Vec<DataSource>,
}

impl IngestOutcome {
    pub fn success(data_sources: Vec<DataSource>) -> Self {
        Self {
            result: ProcessorResult::NoErrors,
            errors: Vec::new(),
            data_sources,
        }
    }

    /// Critical failure; no data sources survive.
    pub fn critical(errors: Vec<String>) -> Self {
        Self {
            result: ProcessorResult::CriticalErrors,
            errors,
            data_sources: Vec::new(),
        }
    }

    /// Raise the result code to at least `result`.
    pub fn escalate(&mut self, result: ProcessorResult) {
        self.result = self.result.max(result);
    }
}
