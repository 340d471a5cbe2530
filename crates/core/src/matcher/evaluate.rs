//! The match evaluator: decide one primary row against one comparison row
//! under a declarative rule set.
//!
//! Pure function over borrowed data; no substrate, no mutation. The
//! identifier pairs decide whether the two rows are the same logical
//! record; the equality pairs decide Matched vs Mismatched once
//! correspondence holds. Pairs are examined in declaration order so that
//! repeated runs produce identical reasons.

use crate::error::Error;
use crate::section::{ComparisonPair, FilePurpose, Row, RuleConfig, Verdict};

/// Outcome of an identifier hit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RowMatch {
    pub verdict: Verdict,
    pub reasons: Vec<String>,
}

/// Evaluate `primary` against `comparison`.
///
/// Returns `None` when the rows are not the same logical record (some
/// identifier pair disagrees). Returns a [`RowMatch`] on an identifier
/// hit: `Mismatched` with a structured reason on the first disagreeing
/// equality pair, otherwise `Matched`.
///
/// An empty identifier set makes every comparison row a hit (degenerate
/// but valid); an empty equality set makes every hit a match. Empty cells
/// are legal values and compared as such.
///
/// `headers` are the primary section's column headers, used only to name
/// columns in reasons; an index beyond the list falls back to the
/// synthetic `column_N` name.
///
/// # Errors
///
/// [`Error::BadRuleConfig`] when a pair references a column outside
/// either row.
pub fn evaluate(
    primary: &Row,
    comparison: &Row,
    pairs: &[ComparisonPair],
    config: &RuleConfig,
    headers: &[String],
) -> Result<Option<RowMatch>, Error> {
    for pair in pairs.iter().filter(|pair| pair.is_row_identifier) {
        let (primary_value, comparison_value) = pair_values(primary, comparison, pair)?;
        if !cells_equal(primary_value, comparison_value, config) {
            return Ok(None);
        }
    }

    for pair in pairs.iter().filter(|pair| !pair.is_row_identifier) {
        let (primary_value, comparison_value) = pair_values(primary, comparison, pair)?;
        if !cells_equal(primary_value, comparison_value, config) {
            let reason = mismatch_reason(
                primary,
                comparison,
                pair,
                headers,
                primary_value,
                comparison_value,
            );
            return Ok(Some(RowMatch {
                verdict: Verdict::Mismatched,
                reasons: vec![reason],
            }));
        }
    }

    Ok(Some(RowMatch {
        verdict: Verdict::Matched,
        reasons: vec![format!(
            "RowMatchFound. PrimaryFileRow: [{}] ComparisonFileRow: [{}]",
            primary.row_number, comparison.row_number
        )],
    }))
}

fn pair_values<'rows>(
    primary: &'rows Row,
    comparison: &'rows Row,
    pair: &ComparisonPair,
) -> Result<(&'rows str, &'rows str), Error> {
    let primary_value =
        primary
            .columns
            .get(pair.primary_column)
            .ok_or(Error::BadRuleConfig {
                column: pair.primary_column,
                row_width: primary.columns.len(),
                side: FilePurpose::Primary,
            })?;
    let comparison_value =
        comparison
            .columns
            .get(pair.comparison_column)
            .ok_or(Error::BadRuleConfig {
                column: pair.comparison_column,
                row_width: comparison.columns.len(),
                side: FilePurpose::Comparison,
            })?;
    Ok((primary_value, comparison_value))
}

/// Textual cell equality under the rule config.
fn cells_equal(primary: &str, comparison: &str, config: &RuleConfig) -> bool {
    if config.case_sensitive && !config.ignore_whitespace {
        return primary == comparison;
    }
    normalize(primary, config) == normalize(comparison, config)
}

fn normalize(value: &str, config: &RuleConfig) -> String {
    let collapsed = if config.ignore_whitespace {
        value.split_whitespace().collect::<Vec<_>>().join(" ")
    } else {
        value.to_owned()
    };
    if config.case_sensitive {
        collapsed
    } else {
        collapsed.to_lowercase()
    }
}

fn header_name(headers: &[String], index: usize) -> String {
    headers
        .get(index)
        .cloned()
        .unwrap_or_else(|| format!("column_{}", index + 1))
}

fn mismatch_reason(
    primary: &Row,
    comparison: &Row,
    pair: &ComparisonPair,
    headers: &[String],
    primary_value: &str,
    comparison_value: &str,
) -> String {
    format!(
        "RowMismatchFound. PrimaryFileRow: [{}] PrimaryFileColumn: [{}] \
         ComparisonFileRow: [{}] ComparisonFileColumn: [{}] \
         PrimaryFile value: [{}] ComparisonFile value: [{}]",
        primary.row_number,
        header_name(headers, pair.primary_column),
        comparison.row_number,
        header_name(headers, pair.comparison_column),
        primary_value,
        comparison_value,
    )
}
