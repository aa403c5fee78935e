//! Case repository for acquisition triage.
//!
//! This crate owns every read and write against a case: data sources, file
//! records, reports and blackboard artifacts. Other crates never touch
//! `rusqlite` directly.
//!
//! # Usage
//!
//! ```rust,ignore
//! use triage_db::{CaseDb, FileFilter};
//!
//! let db = CaseDb::open("case/case.sqlite3")?;
//! let images = db.image_paths()?;
//! let hits = db.find_files(&FileFilter::ParentPath {
//!     name: "foo.txt".into(),
//!     parent_path: "/root/img.vhd/sub/".into(),
//! })?;
//! ```

mod backend;
mod error;
mod schema;
mod types;

pub mod blackboard;
pub mod case;
pub mod local_files;

pub use backend::{DbConnection, DbRow, DbTransaction, DbValue, FromDbValue};
pub use blackboard::{Blackboard, CaseBlackboard};
pub use case::CaseDb;
pub use error::{BackendError, Result};
pub use local_files::{LocalFile, LocalFileImporter};
pub use types::*;
