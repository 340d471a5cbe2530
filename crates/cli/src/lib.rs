//! recon CLI -- reconcile tabular files and generate test fixtures.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use recon_core::sectioner::DEFAULT_SECTION_SIZE;
use recon_core::ComparisonPair;

#[derive(Debug, Parser)]
#[command(
    name = "recon",
    about = "Streaming reconciliation of large tabular files"
)]
pub struct App {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Reconcile a primary file against a comparison file
    Run(RunArgs),
    /// Generate paired CSV fixtures with known expected outcomes
    Generate(GenerateArgs),
}

#[derive(Debug, Parser)]
pub struct RunArgs {
    /// Primary CSV file; its rows drive the output
    #[arg(long)]
    pub primary: PathBuf,
    /// Comparison CSV file
    #[arg(long)]
    pub comparison: PathBuf,
    /// Where to write the reconciled CSV
    #[arg(long)]
    pub output: PathBuf,
    /// Comparison pair as P:C or P:C:id, with 0-based column indices;
    /// ":id" marks a row-identifier pair. Repeatable.
    #[arg(long = "pair", required = true, value_parser = parse_pair)]
    pub pairs: Vec<ComparisonPair>,
    /// Rows per section
    #[arg(long, default_value_t = DEFAULT_SECTION_SIZE)]
    pub section_size: usize,
    /// Treat the first record of each input as its header row
    #[arg(long)]
    pub has_header: bool,
    /// Field delimiter for both inputs
    #[arg(long, default_value = ",", value_parser = parse_delimiter)]
    pub delimiter: u8,
    /// Compare cells byte-for-byte instead of case-folded
    #[arg(long)]
    pub case_sensitive: bool,
    /// Trim and collapse whitespace before comparing
    #[arg(long)]
    pub ignore_whitespace: bool,
    /// Ceiling on concurrently running section matchers
    #[arg(long)]
    pub max_parallel: Option<usize>,
}

#[derive(Debug, Parser)]
pub struct GenerateArgs {
    /// Number of fixtures to generate
    #[arg(long, default_value_t = 1)]
    pub count: u64,
    /// Data rows per fixture
    #[arg(long)]
    pub rows: u64,
    /// Columns per row, key column included
    #[arg(long, default_value_t = 3)]
    pub columns: u64,
    /// Fraction of comparison rows with one perturbed value
    #[arg(long, default_value_t = 0.0)]
    pub mismatch_rate: f64,
    /// Fraction of primary rows missing from the comparison file
    #[arg(long, default_value_t = 0.0)]
    pub missing_rate: f64,
    /// Shuffle the comparison rows
    #[arg(long)]
    pub shuffle: bool,
    /// Output directory for fixture files
    #[arg(long)]
    pub output_dir: PathBuf,
}

/// Parse a `--pair` spec: `P:C` for an equality pair, `P:C:id` for a
/// row-identifier pair.
///
/// # Errors
///
/// A human-readable message for clap when the spec does not parse.
pub fn parse_pair(spec: &str) -> Result<ComparisonPair, String> {
    let parse_index = |part: &str| {
        part.parse::<usize>()
            .map_err(|_| format!("invalid column index [{part}] in pair [{spec}]"))
    };
    let parts: Vec<&str> = spec.split(':').collect();
    match parts.as_slice() {
        [primary, comparison] => Ok(ComparisonPair::equality(
            parse_index(primary)?,
            parse_index(comparison)?,
        )),
        [primary, comparison, marker] if *marker == "id" => Ok(ComparisonPair::identifier(
            parse_index(primary)?,
            parse_index(comparison)?,
        )),
        _ => Err(format!("invalid pair [{spec}], expected P:C or P:C:id")),
    }
}

/// Parse a `--delimiter` value: exactly one ASCII character.
///
/// # Errors
///
/// A human-readable message for clap otherwise.
pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value.as_bytes() {
        [byte] => Ok(*byte),
        _ => Err(format!(
            "delimiter must be a single ASCII character, got [{value}]"
        )),
    }
}
