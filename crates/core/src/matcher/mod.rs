//! Matching: drive one primary section against the comparison stream.
//!
//! Each matcher opens its own durable cursor on the comparison subject, so
//! the substrate replays the whole comparison file for it from the
//! beginning. Comparison sections arrive in publish order; for every
//! primary row still pending, the first identifier hit wins and freezes
//! the row -- later comparison rows are never revisited, even when the
//! frozen verdict is Mismatched.
//!
//! The scan is bounded three ways, checked in order after each comparison
//! section: all primary rows frozen, comparison terminator seen, or the
//! transient fetch budget exhausted (which stalls only this section).

pub mod evaluate;

use core::time::Duration;

use hashbrown::HashSet;

pub use evaluate::{evaluate, RowMatch};

use crate::error::Error;
use crate::section::{codec, FilePurpose, Section, Verdict};
use crate::stream::{
    publish_with_retry, reassembly_subject, CursorGuard, StreamCursor, StreamProvider,
    COMPARISON_SECTIONS_STREAM, DEFAULT_PUBLISH_ATTEMPTS,
};
use crate::task::CancelFlag;

/// Reason attached to every row that outlives the comparison scan.
pub const NO_MATCH_REASON: &str = "no matching record found in the entire comparison file";

/// Retry budget for one substrate fetch loop.
#[derive(Clone, Copy, Debug)]
pub struct FetchBudget {
    /// Per-fetch deadline before the substrate reports `Transient`.
    pub deadline: Duration,
    /// Consecutive `Transient` results tolerated before giving up.
    pub attempts: u32,
}

impl Default for FetchBudget {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(2),
            attempts: 15,
        }
    }
}

/// Reconcile one primary section against the comparison subject and
/// publish the verdict-annotated result to the reassembly subject.
///
/// The comparison cursor (`match-{seq}-{file_id}`) is closed on every exit
/// path, including panics in the evaluator.
///
/// # Errors
///
/// [`Error::BadInput`] when either side has the wrong purpose,
/// [`Error::MatchStalled`] when the fetch budget runs out,
/// [`Error::Cancelled`] when the task is cancelled mid-scan, plus codec
/// and substrate failures.
pub fn match_section(
    mut primary: Section,
    provider: &dyn StreamProvider,
    comparison_file_id: &str,
    budget: FetchBudget,
    cancel: &CancelFlag,
) -> Result<Section, Error> {
    if primary.purpose != FilePurpose::Primary {
        return Err(Error::bad_input(format!(
            "section [{}] of file [{}] is not a primary section",
            primary.seq, primary.file_id
        )));
    }

    let consumer_id = format!("match-{}-{}", primary.seq, primary.file_id);
    let mut cursor = provider.open_cursor(
        COMPARISON_SECTIONS_STREAM,
        comparison_file_id,
        &consumer_id,
    )?;
    let _guard = CursorGuard::new(provider, consumer_id.clone());

    tracing::debug!(
        seq = primary.seq,
        file_id = %primary.file_id,
        rows = primary.rows.len(),
        "matcher started"
    );

    scan_comparison_stream(&mut primary, cursor.as_mut(), budget, cancel)?;
    finalize_pending_rows(&mut primary);

    let payload = codec::encode(&primary)?;
    publish_with_retry(
        provider,
        &reassembly_subject(&primary.task_id),
        &payload,
        DEFAULT_PUBLISH_ATTEMPTS,
    )?;
    tracing::debug!(seq = primary.seq, file_id = %primary.file_id, "matcher finished");
    Ok(primary)
}

fn scan_comparison_stream(
    primary: &mut Section,
    cursor: &mut dyn StreamCursor,
    budget: FetchBudget,
    cancel: &CancelFlag,
) -> Result<(), Error> {
    let mut seen: HashSet<u64> = HashSet::new();
    let mut attempts_left = budget.attempts.max(1);

    loop {
        if primary.all_rows_settled() {
            return Ok(());
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let payload = match cursor.next(budget.deadline) {
            Ok(payload) => {
                attempts_left = budget.attempts.max(1);
                payload
            }
            Err(crate::stream::Error::Transient) => {
                attempts_left -= 1;
                tracing::trace!(
                    seq = primary.seq,
                    attempts_left,
                    "no comparison section within the deadline"
                );
                if attempts_left == 0 {
                    return Err(Error::MatchStalled {
                        file_id: primary.file_id.clone(),
                        seq: primary.seq,
                    });
                }
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        let comparison = codec::decode(&payload)?;
        if comparison.purpose != FilePurpose::Comparison {
            return Err(Error::bad_input(format!(
                "section [{}] of file [{}] on the comparison subject is not a comparison section",
                comparison.seq, comparison.file_id
            )));
        }
        if !seen.insert(comparison.seq) {
            // At-least-once redelivery; already examined.
            continue;
        }

        tracing::trace!(
            primary_seq = primary.seq,
            comparison_seq = comparison.seq,
            "scanning comparison section"
        );
        scan_section(primary, &comparison)?;

        if primary.all_rows_settled() {
            return Ok(());
        }
        if comparison.is_terminator {
            return Ok(());
        }
    }
}

/// Scan one comparison section: the first identifier hit settles a
/// pending primary row and the rest of the comparison rows are skipped
/// for it.
fn scan_section(primary: &mut Section, comparison: &Section) -> Result<(), Error> {
    for row in primary.rows.iter_mut() {
        if row.verdict.is_settled() {
            continue;
        }
        for comparison_row in &comparison.rows {
            let found = evaluate(
                row,
                comparison_row,
                &primary.pairs,
                &primary.config,
                &primary.column_headers,
            )?;
            if let Some(found) = found {
                tracing::trace!(
                    primary_row = row.row_number,
                    comparison_row = comparison_row.row_number,
                    verdict = %found.verdict,
                    "row settled"
                );
                row.verdict = found.verdict;
                row.reasons.extend(found.reasons);
                break;
            }
        }
    }
    Ok(())
}

fn finalize_pending_rows(section: &mut Section) {
    for row in section.rows.iter_mut() {
        if !row.verdict.is_settled() {
            row.verdict = Verdict::Unmatched;
            row.reasons = vec![NO_MATCH_REASON.to_owned()];
        }
    }
}
