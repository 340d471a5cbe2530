//! Fixture generation for reconciliation testing.
//!
//! Produces paired primary/comparison CSV files with a known expected
//! outcome (how many rows must come out `Matched`, `Mismatched`, and
//! `Unmatched`), so pipeline tests and benchmarks can assert against
//! ground truth instead of golden files.

pub mod generator;

pub use generator::{
    generate_fixture, generate_fixtures, standard_pairs, ExpectedCounts, Fixture, FixtureParams,
};
