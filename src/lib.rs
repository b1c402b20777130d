//! # examgrade
//!
//! Grades free-response exam answers. Each answer is rendered into an
//! instructor's code template, the resulting program is run in Python or an
//! embedded Scheme, and doctest-style interactions are checked against it.

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Grading a whole roster
pub mod batch;
/// Classifying test output against expectations
pub mod compare;
/// Process-wide configuration
pub mod config;
/// Doctest transcript parsing
pub mod doctest;
/// Typed errors for the leaf components
pub mod error;
/// Loading programs under a deadline
pub mod executor;
/// Grading one student against one template
pub mod grade;
/// Child process helpers
pub mod process;
/// Python bindings
#[cfg(feature = "python")]
pub mod py;
/// Transcripts, snapshots and the aggregate report
pub mod report;
/// Language runtimes
pub mod runtime;
/// Snapshot service clients
pub mod snapshot;
/// Exam, roster and question sources
pub mod store;
/// Placeholder templates
pub mod template;
/// Shared data model
pub mod types;
