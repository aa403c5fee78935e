//! Acquisition ingestion.
//!
//! [`AddAcquisitionTask`] drives one run; the other modules are its steps
//! and are usable on their own.

pub mod acquisition;
pub mod cancel;
pub mod copy;
pub mod error;
pub mod importer;
pub mod interesting;
pub mod manifest;
pub mod multi_image;
pub mod orchestrator;
pub mod outcome;
pub mod phase;
pub mod progress;
pub mod settings;

pub use acquisition::{list_acquisitions, Acquisition, AcquisitionNames};
pub use cancel::CancellationToken;
pub use error::{IngestError, ManifestError, Result};
pub use importer::{import_local_files, LocalImport};
pub use interesting::{tag_interesting_files, LookupMode, TaggingJob, TaggingSummary};
pub use manifest::{ManifestReader, ManifestRow, FIELD_COUNT};
pub use multi_image::{ImageIngestor, MultiImageTask, RegisterImageIngestor};
pub use orchestrator::{AddAcquisitionTask, IngestHandle, IngestRequest};
pub use outcome::{IngestOutcome, ProcessorResult};
pub use phase::{IngestPhase, PhaseTracker};
pub use progress::{ChannelProgress, LogProgress, ProgressMonitor};
pub use settings::IngestSettings;
