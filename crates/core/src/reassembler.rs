//! Reassembly: collect verdict-annotated sections out of order and emit a
//! single contiguous output file in original row order.
//!
//! Sections arrive on the task's reassembly subject in whatever order the
//! matchers finish. They are held in a seq-keyed map until the
//! completeness predicate holds: at least two sections received, the seq
//! set is exactly `{1..max}`, and the section at `max` is the terminator.
//! Nothing is written before that point, so a failed task never leaves a
//! partial output behind.

use core::time::Duration;
use std::io::{self, Write};

use hashbrown::HashMap;

use crate::error::Error;
use crate::section::{codec, Section};
use crate::stream::{reassembly_subject, CursorGuard, StreamProvider, REASSEMBLY_STREAM};
use crate::task::CancelFlag;

/// How long the reassembler waits for sections before declaring the task
/// stalled.
#[derive(Clone, Copy, Debug)]
pub struct ReassemblyBudget {
    /// Per-fetch deadline before the substrate reports `Transient`.
    pub fetch_deadline: Duration,
    /// Consecutive empty fetches tolerated before the task is stalled.
    /// Together with the deadline this is the task-level deadline.
    pub max_idle_fetches: u32,
}

impl Default for ReassemblyBudget {
    fn default() -> Self {
        Self {
            fetch_deadline: Duration::from_secs(2),
            max_idle_fetches: 150,
        }
    }
}

/// What was written, reported to the pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReassemblyReport {
    /// Sections received, terminator included.
    pub sections: u64,
    /// Data rows written, header excluded.
    pub rows_written: u64,
}

/// Collect one task's finished sections and write the reconciled CSV.
///
/// The reassembly cursor (`consumer_id = task_id`) is closed on every
/// exit path. Output reaches `sink` only after the completeness predicate
/// holds -- completion is all-or-nothing.
///
/// # Errors
///
/// [`Error::Stalled`] when the idle-fetch budget runs out before
/// completeness, [`Error::Cancelled`] on cancellation between fetches,
/// plus codec, substrate, and sink failures.
pub fn reassemble<W: Write>(
    provider: &dyn StreamProvider,
    task_id: &str,
    sink: &mut W,
    budget: ReassemblyBudget,
    cancel: &CancelFlag,
) -> Result<ReassemblyReport, Error> {
    let subject = reassembly_subject(task_id);
    let mut cursor = provider.open_cursor(REASSEMBLY_STREAM, &subject, task_id)?;
    let _guard = CursorGuard::new(provider, task_id);

    let mut by_seq: HashMap<u64, Section> = HashMap::new();
    let mut idle = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let payload = match cursor.next(budget.fetch_deadline) {
            Ok(payload) => {
                idle = 0;
                payload
            }
            Err(crate::stream::Error::Transient) => {
                idle += 1;
                if idle >= budget.max_idle_fetches.max(1) {
                    tracing::error!(
                        task_id,
                        sections = by_seq.len(),
                        "reassembly never reached completeness"
                    );
                    return Err(Error::Stalled {
                        task_id: task_id.to_owned(),
                    });
                }
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        let section = codec::decode(&payload)?;
        tracing::debug!(
            task_id,
            seq = section.seq,
            is_terminator = section.is_terminator,
            "reassembly section received"
        );
        // At-least-once substrate: the first arrival of a seq wins.
        by_seq.entry(section.seq).or_insert(section);

        if is_complete(&by_seq) {
            break;
        }
    }

    write_output(&by_seq, sink)
}

/// The completeness predicate: at least two sections, contiguous seq set
/// `{1..max}`, terminator at `max`.
fn is_complete(by_seq: &HashMap<u64, Section>) -> bool {
    if by_seq.len() < 2 {
        return false;
    }
    let Some(max_seq) = by_seq.keys().copied().max() else {
        return false;
    };
    if !(1..=max_seq).all(|seq| by_seq.contains_key(&seq)) {
        return false;
    }
    by_seq.get(&max_seq).is_some_and(|last| last.is_terminator)
}

fn write_output<W: Write>(
    by_seq: &HashMap<u64, Section>,
    sink: &mut W,
) -> Result<ReassemblyReport, Error> {
    let mut seqs: Vec<u64> = by_seq.keys().copied().collect();
    seqs.sort_unstable();

    let mut writer = csv::Writer::from_writer(Vec::new());

    let headers = seqs
        .first()
        .and_then(|seq| by_seq.get(seq))
        .map(|section| section.column_headers.clone())
        .unwrap_or_default();
    let mut header_record = headers;
    header_record.push("ReconResult".to_owned());
    header_record.push("ReconResultReasons".to_owned());
    writer.write_record(&header_record)?;

    let mut report = ReassemblyReport::default();
    for seq in seqs {
        let section = &by_seq[&seq];
        report.sections += 1;
        for row in &section.rows {
            let mut record = row.columns.clone();
            record.push(row.verdict.to_string());
            record.push(row.reasons.join(","));
            writer.write_record(&record)?;
            report.rows_written += 1;
        }
    }

    let data = writer
        .into_inner()
        .map_err(|err| Error::Io(io::Error::new(io::ErrorKind::Other, err.to_string())))?;
    sink.write_all(&data)?;
    sink.flush()?;

    tracing::debug!(
        sections = report.sections,
        rows = report.rows_written,
        "output written"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use crate::section::{FilePurpose, Row, RuleConfig, Verdict};

    use super::*;

    fn section(seq: u64, rows: Vec<Row>, is_terminator: bool) -> Section {
        Section {
            id: Section::derive_id("f", seq),
            task_id: "t".to_owned(),
            file_id: "f".to_owned(),
            seq,
            purpose: FilePurpose::Primary,
            rows,
            column_headers: vec!["id".to_owned(), "name".to_owned()],
            pairs: Vec::new(),
            config: RuleConfig::default(),
            is_terminator,
        }
    }

    fn settled_row(number: u64, verdict: Verdict, reasons: &[&str]) -> Row {
        let mut row = Row::new(
            number,
            format!("{number},x"),
            vec![number.to_string(), "x".to_owned()],
        );
        row.verdict = verdict;
        row.reasons = reasons.iter().map(|&r| r.to_owned()).collect();
        row
    }

    fn map(sections: Vec<Section>) -> HashMap<u64, Section> {
        sections.into_iter().map(|s| (s.seq, s)).collect()
    }

    #[test]
    fn completeness_requires_two_sections() {
        let only_terminator = map(vec![section(1, Vec::new(), true)]);
        assert!(!is_complete(&only_terminator));
    }

    #[test]
    fn completeness_requires_contiguity_from_one() {
        let missing_first = map(vec![
            section(2, Vec::new(), false),
            section(3, Vec::new(), true),
        ]);
        assert!(!is_complete(&missing_first));

        let gap = map(vec![
            section(1, Vec::new(), false),
            section(3, Vec::new(), true),
        ]);
        assert!(!is_complete(&gap));
    }

    #[test]
    fn completeness_requires_terminator_last() {
        let no_terminator = map(vec![
            section(1, Vec::new(), false),
            section(2, Vec::new(), false),
        ]);
        assert!(!is_complete(&no_terminator));

        let complete = map(vec![
            section(1, Vec::new(), false),
            section(2, Vec::new(), true),
        ]);
        assert!(is_complete(&complete));
    }

    #[test]
    fn output_preserves_seq_order_and_appends_verdict_columns() {
        let sections = map(vec![
            section(2, vec![settled_row(1, Verdict::Unmatched, &[crate::matcher::NO_MATCH_REASON])], false),
            section(1, vec![settled_row(0, Verdict::Matched, &["ok"])], false),
            section(3, Vec::new(), true),
        ]);
        let mut out = Vec::new();
        let report = write_output(&sections, &mut out).unwrap();
        assert_eq!(report.rows_written, 2);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "id,name,ReconResult,ReconResultReasons");
        assert_eq!(lines[1], "0,x,Matched,ok");
        assert!(lines[2].starts_with("1,x,Unmatched,"));
    }

    #[test]
    fn reasons_with_commas_are_quoted() {
        let sections = map(vec![
            section(
                1,
                vec![settled_row(0, Verdict::Mismatched, &["left, right", "second"])],
                false,
            ),
            section(2, Vec::new(), true),
        ]);
        let mut out = Vec::new();
        write_output(&sections, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(
            text.contains("\"left, right,second\""),
            "reasons must be CSV-quoted: {text}"
        );
    }
}
