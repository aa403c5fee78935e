//! Observable phase of an ingestion run.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IngestPhase {
    Pending = 0,
    Copying = 1,
    Reporting = 2,
    DetectingImageMode = 3,
    IngestingVirtualDisks = 4,
    ImportingLocalFiles = 5,
    TaggingInterestingFiles = 6,
    Completed = 7,
    Cancelled = 8,
    Failed = 9,
}

impl IngestPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Copying,
            2 => Self::Reporting,
            3 => Self::DetectingImageMode,
            4 => Self::IngestingVirtualDisks,
            5 => Self::ImportingLocalFiles,
            6 => Self::TaggingInterestingFiles,
            7 => Self::Completed,
            8 => Self::Cancelled,
            9 => Self::Failed,
            _ => Self::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Copying => "copying",
            Self::Reporting => "reporting",
            Self::DetectingImageMode => "detecting_image_mode",
            Self::IngestingVirtualDisks => "ingesting_virtual_disks",
            Self::ImportingLocalFiles => "importing_local_files",
            Self::TaggingInterestingFiles => "tagging_interesting_files",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

impl fmt::Display for IngestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase cell shared between the worker and observers.
#[derive(Debug, Clone, Default)]
pub struct PhaseTracker {
    phase: Arc<AtomicU8>,
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> IngestPhase {
        IngestPhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    pub(crate) fn set(&self, phase: IngestPhase) {
        self.phase.store(phase as u8, Ordering::SeqCst);
    }
}
