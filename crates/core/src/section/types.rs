use core::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Reconciliation state of a single row.
///
/// A row enters the pipeline as `Pending`. The first identifier hit inside
/// its matcher freezes it as `Matched` or `Mismatched`; a row still
/// `Pending` when the matcher terminates is finalized as `Unmatched`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    #[default]
    Pending,
    Matched,
    Mismatched,
    Unmatched,
}

impl Verdict {
    /// A settled verdict is frozen for the rest of the section's scan.
    #[must_use]
    pub const fn is_settled(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl Display for Verdict {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let token = match self {
            Self::Pending => "Pending",
            Self::Matched => "Matched",
            Self::Mismatched => "Mismatched",
            Self::Unmatched => "Unmatched",
        };
        f.write_str(token)
    }
}

/// Which side of the reconciliation a file and its sections belong to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilePurpose {
    Primary,
    Comparison,
}

impl Display for FilePurpose {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Comparison => f.write_str("comparison"),
        }
    }
}

/// One input record with its reconciliation state.
///
/// `row_number` is the 0-based ordinal among the data records of the row's
/// file; a consumed header record does not take a number. Rows are created
/// by the sectioner and mutated only by the evaluator inside their owning
/// section.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub row_number: u64,
    /// The input record re-joined with the input delimiter.
    pub raw: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub verdict: Verdict,
    #[serde(default)]
    pub reasons: Vec<String>,
}

impl Row {
    #[must_use]
    pub const fn new(row_number: u64, raw: String, columns: Vec<String>) -> Self {
        Self {
            row_number,
            raw,
            columns,
            verdict: Verdict::Pending,
            reasons: Vec::new(),
        }
    }
}

/// A single comparison axiom between a primary column and a comparison
/// column.
///
/// The conjunction of all pairs with `is_row_identifier` set decides
/// whether two rows are the same logical record; the remaining pairs
/// decide `Matched` vs `Mismatched` once correspondence holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonPair {
    pub primary_column: usize,
    pub comparison_column: usize,
    #[serde(default)]
    pub is_row_identifier: bool,
}

impl ComparisonPair {
    /// A pair participating in the identifier predicate.
    #[must_use]
    pub const fn identifier(primary_column: usize, comparison_column: usize) -> Self {
        Self {
            primary_column,
            comparison_column,
            is_row_identifier: true,
        }
    }

    /// A pair participating in the equality predicate.
    #[must_use]
    pub const fn equality(primary_column: usize, comparison_column: usize) -> Self {
        Self {
            primary_column,
            comparison_column,
            is_row_identifier: false,
        }
    }
}

/// Knobs that alter textual equality during matching.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    /// Compare cells byte-for-byte; when unset, compare by Unicode
    /// lowercase folding.
    pub case_sensitive: bool,
    /// Trim leading/trailing whitespace and collapse internal runs to a
    /// single space before comparing.
    pub ignore_whitespace: bool,
    /// Reserved: also reconcile comparison against primary. Carried on the
    /// wire, currently ignored by the evaluator.
    pub reverse_direction: bool,
    /// Reserved: flag a primary row when several comparison rows satisfy
    /// the identifier predicate. Carried on the wire, currently ignored by
    /// the evaluator.
    pub detect_duplicates_in_comparison: bool,
}

/// A contiguous, bounded slice of one input file, published as one message.
///
/// `seq` is 1-based and strictly increasing within a file. Every file ends
/// with exactly one terminator section carrying the highest `seq`; its
/// `rows` may be empty even when earlier sections are partial-full.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub task_id: String,
    pub file_id: String,
    pub seq: u64,
    pub purpose: FilePurpose,
    #[serde(default)]
    pub rows: Vec<Row>,
    #[serde(default)]
    pub column_headers: Vec<String>,
    #[serde(default)]
    pub pairs: Vec<ComparisonPair>,
    #[serde(default)]
    pub config: RuleConfig,
    #[serde(default)]
    pub is_terminator: bool,
}

impl Section {
    /// True when no row of the section is still `Pending`; vacuously true
    /// for an empty section.
    #[must_use]
    pub fn all_rows_settled(&self) -> bool {
        self.rows.iter().all(|row| row.verdict.is_settled())
    }

    /// Deterministic section id, unique within a task.
    #[must_use]
    pub fn derive_id(file_id: &str, seq: u64) -> String {
        format!("{file_id}-{seq}")
    }
}

/// Header names used when a file does not declare a header row.
#[must_use]
pub fn synthetic_headers(width: usize) -> Vec<String> {
    (1..=width).map(|i| format!("column_{i}")).collect()
}
