//! Streaming reconciliation of large tabular files.
//!
//! `recon_core` reconciles a *primary* and a *comparison* file, producing
//! an augmented copy of the primary where every row carries a verdict
//! (`Matched`, `Mismatched`, `Unmatched`) and human-readable reasons.
//! Neither file is assumed to fit in memory and the two need not be
//! sorted on the same key.
//!
//! The work is a three-stage streaming pipeline glued by a durable stream
//! substrate:
//!
//! 1. **Sectioning** -- each input file is cut into ordered, bounded
//!    sections published to its own subject, ending in an empty
//!    terminator section.
//! 2. **Matching** -- for every primary section a matcher replays the
//!    comparison subject through its own durable cursor and settles each
//!    primary row on its first identifier hit.
//! 3. **Reassembly** -- verdict-annotated sections are collected out of
//!    order and written as one contiguous CSV once the section set is
//!    complete.
//!
//! Termination needs no global signal: the primary terminator bounds the
//! fan-out, the comparison terminator bounds each matcher's scan, and the
//! reassembler's completeness predicate bounds the writer.
//!
//! # Entry point
//!
//! The main entry point is [`reconcile`], which takes the metadata stores,
//! a task id, and an output path, and drives every stage to completion:
//!
//! ```rust,ignore
//! use recon_core::stream::MemoryBroker;
//! use recon_core::task::{reconcile, CancelFlag, PipelineOptions};
//!
//! let broker = MemoryBroker::new();
//! let report = reconcile(
//!     &broker, &tasks, &files, "task-1",
//!     output_path, &PipelineOptions::default(), &CancelFlag::new(),
//! )?;
//! println!("wrote {} rows", report.rows_written);
//! ```
//!
//! The substrate is a seam: [`stream::StreamProvider`] is object-safe, and
//! [`stream::MemoryBroker`] is the in-process implementation used by the
//! CLI and the tests.

pub mod error;
pub mod matcher;
pub mod reassembler;
pub mod section;
pub mod sectioner;
pub mod stream;
pub mod task;

pub use error::Error;
pub use section::{ComparisonPair, FilePurpose, Row, RuleConfig, Section, Verdict};
pub use task::{reconcile, CancelFlag, FileDescriptor, PipelineOptions, ReconReport, ReconTask};
