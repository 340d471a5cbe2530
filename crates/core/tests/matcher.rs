//! Section matcher behavior: freeze-on-first-hit, terminator handling,
//! unmatched finalization, stall budget, and cursor hygiene.

mod common;

use common::{fast_fetch, make_section, publish_section};
use recon_core::matcher::{match_section, NO_MATCH_REASON};
use recon_core::section::codec;
use recon_core::stream::{
    reassembly_subject, MemoryBroker, StreamCursor, StreamProvider, COMPARISON_SECTIONS_STREAM,
    REASSEMBLY_STREAM,
};
use recon_core::{CancelFlag, Error, FilePurpose, Section, Verdict};

const COMPARISON_FILE: &str = "file-c";

fn ready_broker() -> MemoryBroker {
    let broker = MemoryBroker::new();
    broker
        .ensure_topic(COMPARISON_SECTIONS_STREAM, COMPARISON_FILE)
        .unwrap();
    broker
        .ensure_topic(REASSEMBLY_STREAM, &reassembly_subject("task-1"))
        .unwrap();
    broker
}

fn primary_section(rows: Vec<recon_core::Row>) -> Section {
    make_section("file-p", 1, FilePurpose::Primary, rows, false)
}

fn comparison_section(seq: u64, rows: Vec<recon_core::Row>, terminator: bool) -> Section {
    make_section(COMPARISON_FILE, seq, FilePurpose::Comparison, rows, terminator)
}

fn run(broker: &MemoryBroker, primary: Section) -> Result<Section, Error> {
    match_section(
        primary,
        broker,
        COMPARISON_FILE,
        fast_fetch(),
        &CancelFlag::new(),
    )
}

#[test]
fn rows_match_across_comparison_sections() {
    let broker = ready_broker();
    publish_section(
        &broker,
        COMPARISON_FILE,
        &comparison_section(1, rows![["2", "Bob", "20"]], false),
    );
    publish_section(
        &broker,
        COMPARISON_FILE,
        &comparison_section(2, rows![["1", "Alice", "10"]], false),
    );
    publish_section(&broker, COMPARISON_FILE, &comparison_section(3, rows![], true));

    let result = run(
        &broker,
        primary_section(rows![["1", "Alice", "10"], ["2", "Bob", "20"]]),
    )
    .unwrap();

    assert_eq!(result.rows[0].verdict, Verdict::Matched);
    assert_eq!(result.rows[1].verdict, Verdict::Matched);
    assert_eq!(broker.live_cursors(), 0, "matcher must close its cursor");
}

#[test]
fn pending_rows_are_finalized_unmatched_at_the_terminator() {
    let broker = ready_broker();
    publish_section(
        &broker,
        COMPARISON_FILE,
        &comparison_section(1, rows![["1", "Alice", "10"]], false),
    );
    publish_section(&broker, COMPARISON_FILE, &comparison_section(2, rows![], true));

    let result = run(
        &broker,
        primary_section(rows![["1", "Alice", "10"], ["9", "Nobody", "0"]]),
    )
    .unwrap();

    assert_eq!(result.rows[0].verdict, Verdict::Matched);
    assert_eq!(result.rows[1].verdict, Verdict::Unmatched);
    assert_eq!(result.rows[1].reasons, vec![NO_MATCH_REASON]);
}

#[test]
fn first_identifier_hit_freezes_the_row_even_on_mismatch() {
    let broker = ready_broker();
    // Same identifier twice: first with a wrong amount, later with the
    // right one. The first hit wins and the row stays Mismatched.
    publish_section(
        &broker,
        COMPARISON_FILE,
        &comparison_section(1, rows![["1", "Alice", "99"]], false),
    );
    publish_section(
        &broker,
        COMPARISON_FILE,
        &comparison_section(2, rows![["1", "Alice", "10"]], false),
    );
    publish_section(&broker, COMPARISON_FILE, &comparison_section(3, rows![], true));

    let result = run(&broker, primary_section(rows![["1", "Alice", "10"]])).unwrap();

    assert_eq!(result.rows[0].verdict, Verdict::Mismatched);
    assert_eq!(result.rows[0].reasons.len(), 1);
    assert!(result.rows[0].reasons[0].contains("[amount]"));
}

#[test]
fn first_matching_row_within_a_section_wins() {
    let broker = ready_broker();
    publish_section(
        &broker,
        COMPARISON_FILE,
        &comparison_section(
            1,
            rows![["1", "Alice", "10"], ["1", "Alice", "99"]],
            false,
        ),
    );
    publish_section(&broker, COMPARISON_FILE, &comparison_section(2, rows![], true));

    let result = run(&broker, primary_section(rows![["1", "Alice", "10"]])).unwrap();
    assert_eq!(result.rows[0].verdict, Verdict::Matched);
}

#[test]
fn matcher_stops_early_once_every_row_is_settled() {
    let broker = ready_broker();
    // No terminator published; the matcher must still finish because all
    // rows settle on the first section.
    publish_section(
        &broker,
        COMPARISON_FILE,
        &comparison_section(1, rows![["1", "Alice", "10"]], false),
    );

    let result = run(&broker, primary_section(rows![["1", "Alice", "10"]])).unwrap();
    assert_eq!(result.rows[0].verdict, Verdict::Matched);
}

#[test]
fn empty_primary_section_publishes_without_scanning() {
    let broker = ready_broker();
    // Nothing on the comparison subject at all.
    let result = run(&broker, primary_section(rows![])).unwrap();
    assert!(result.rows.is_empty());
    assert_eq!(broker.retained(&reassembly_subject("task-1")), Some(1));
}

#[test]
fn exhausted_fetch_budget_stalls_the_section() {
    let broker = ready_broker();
    let err = run(&broker, primary_section(rows![["1", "Alice", "10"]])).unwrap_err();
    assert!(matches!(err, Error::MatchStalled { seq: 1, .. }));
    assert_eq!(broker.live_cursors(), 0, "cursor must close on stall");
    assert_eq!(
        broker.retained(&reassembly_subject("task-1")),
        Some(0),
        "a stalled section publishes nothing"
    );
}

#[test]
fn exactly_one_reassembly_message_per_section() {
    let broker = ready_broker();
    publish_section(&broker, COMPARISON_FILE, &comparison_section(1, rows![], true));

    let result = run(&broker, primary_section(rows![["1", "Alice", "10"]])).unwrap();
    assert_eq!(result.seq, 1);

    let subject = reassembly_subject("task-1");
    assert_eq!(broker.retained(&subject), Some(1));

    // The published message is the section verbatim: rows mutated,
    // metadata unchanged.
    let mut cursor = broker
        .open_cursor(REASSEMBLY_STREAM, &subject, "check")
        .unwrap();
    let section = codec::decode(&cursor.next(fast_fetch().deadline).unwrap()).unwrap();
    assert_eq!(section.seq, 1);
    assert_eq!(section.file_id, "file-p");
    assert_eq!(section.rows[0].verdict, Verdict::Unmatched);
}

#[test]
fn non_primary_section_is_rejected() {
    let broker = ready_broker();
    let not_primary = make_section("file-c", 1, FilePurpose::Comparison, rows![], false);
    let err = run(&broker, not_primary).unwrap_err();
    assert!(matches!(err, Error::BadInput { .. }));
}

#[test]
fn wrong_purpose_on_the_comparison_subject_is_rejected() {
    let broker = ready_broker();
    let stray = make_section(COMPARISON_FILE, 1, FilePurpose::Primary, rows![], false);
    publish_section(&broker, COMPARISON_FILE, &stray);

    let err = run(&broker, primary_section(rows![["1", "Alice", "10"]])).unwrap_err();
    assert!(matches!(err, Error::BadInput { .. }));
    assert_eq!(broker.live_cursors(), 0);
}

#[test]
fn cancellation_stops_the_scan() {
    let broker = ready_broker();
    let cancel = CancelFlag::new();
    cancel.cancel();
    let err = match_section(
        primary_section(rows![["1", "Alice", "10"]]),
        &broker,
        COMPARISON_FILE,
        fast_fetch(),
        &cancel,
    )
    .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert_eq!(broker.live_cursors(), 0);
}

#[test]
fn redelivered_comparison_sections_are_deduped_by_seq() {
    let broker = ready_broker();
    // The same seq twice with different content: the second copy must be
    // ignored, so the row settles against the first.
    publish_section(
        &broker,
        COMPARISON_FILE,
        &comparison_section(1, rows![["1", "Alice", "99"]], false),
    );
    publish_section(
        &broker,
        COMPARISON_FILE,
        &comparison_section(1, rows![["2", "Bob", "20"]], false),
    );
    publish_section(&broker, COMPARISON_FILE, &comparison_section(2, rows![], true));

    let result = run(
        &broker,
        primary_section(rows![["1", "Alice", "10"], ["2", "Bob", "20"]]),
    )
    .unwrap();
    assert_eq!(result.rows[0].verdict, Verdict::Mismatched);
    // Row 2's only hit lived in the duplicate payload, which was skipped.
    assert_eq!(result.rows[1].verdict, Verdict::Unmatched);
}
