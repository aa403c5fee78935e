//! Triage - logical-imager acquisition ingestion
//!
//! Library side of the `triage` binary.

pub mod ingest;

pub use ingest::{
    AddAcquisitionTask, CancellationToken, IngestOutcome, IngestRequest, IngestSettings,
    ProcessorResult,
};
