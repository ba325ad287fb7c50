//! Posting module
//!
//! Automated fee postings raised by other modules' domain events.

mod directory;
mod engine;
mod rules;

pub use directory::{DirectoryError, NoDirectory, StaticDirectory, SubjectDirectory};
pub use engine::{PostingEngine, PostingError, PostingOutcome};
pub use rules::{PostingRule, ResolvedPosting, RuleError, RuleTable, DEFAULT_CATEGORY};
