//! Interesting-file rules: model, parser and matcher.
//!
//! A rule configuration is a JSON document of named rule sets. It is parsed
//! against a closed schema into a [`Config`]; [`matches`] and [`evaluate`]
//! decide which rules flag a file.

mod error;
pub mod matcher;
pub mod model;
pub mod parser;

pub use error::{ConfigError, Result};
pub use matcher::{evaluate, matches, matches_at, FileFacts};
pub use model::{Config, DateRange, Rule, RuleSet, SizeRange};
pub use parser::{parse, parse_with, CarryOver, ParseOptions};
