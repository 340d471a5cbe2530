//! The section data model and its wire codec.
//!
//! A section is a contiguous, bounded slice of one input file. Sections are
//! the unit of exchange between every pipeline stage: the sectioner
//! produces them, matchers consume and annotate them, the reassembler
//! collects them back into a single output file.

pub mod codec;
pub mod types;

pub use types::{
    synthetic_headers, ComparisonPair, FilePurpose, Row, RuleConfig, Section, Verdict,
};
