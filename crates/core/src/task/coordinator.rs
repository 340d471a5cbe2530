//! The reconciliation coordinator: fan primary sections out to matchers
//! and join them.
//!
//! One durable cursor consumes the primary subject; every data section
//! spawns a matcher on its own thread. The primary terminator bounds the
//! fan-out -- no global done signal is needed -- and is forwarded verbatim
//! to the reassembly subject, since the reassembler's completeness
//! predicate needs every primary section including the terminator.
//! Matcher failures and panics are absorbed at the join boundary: they
//! are logged and counted, never cascaded to sibling matchers. A missing
//! section then surfaces downstream as reassembly incompleteness and a
//! task-level stall.

use std::collections::VecDeque;
use std::thread;

use hashbrown::HashSet;

use crate::error::Error;
use crate::matcher::match_section;
use crate::section::{codec, Section};
use crate::stream::{
    publish_with_retry, reassembly_subject, CursorGuard, StreamProvider,
    DEFAULT_PUBLISH_ATTEMPTS, PRIMARY_SECTIONS_STREAM,
};

use super::{CancelFlag, MatcherLimits, ReconTask};

/// What the fan-out saw, reported to the pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MatchReport {
    /// Data sections dispatched to matchers.
    pub sections: u64,
    /// Matchers that failed or panicked; their sections never reach the
    /// reassembler.
    pub stalled: u64,
}

/// Consume the primary subject and run one matcher per data section.
///
/// Returns once the primary terminator has been observed and every
/// spawned matcher has been joined. The primary cursor
/// (`consumer_id = primary_file_id`) is closed on every exit path.
///
/// # Errors
///
/// [`Error::Stalled`] when the primary subject goes quiet beyond the
/// fetch budget, [`Error::Cancelled`] on cancellation between fetches,
/// plus codec and substrate failures. Matcher-level failures do NOT
/// surface here; they are counted in the report.
pub fn run_matchers(
    provider: &dyn StreamProvider,
    task: &ReconTask,
    primary_file_id: &str,
    comparison_file_id: &str,
    limits: MatcherLimits,
    cancel: &CancelFlag,
) -> Result<MatchReport, Error> {
    let mut cursor = provider.open_cursor(PRIMARY_SECTIONS_STREAM, primary_file_id, primary_file_id)?;
    let _guard = CursorGuard::new(provider, primary_file_id);

    let mut report = MatchReport::default();
    let fetch = limits.fetch;

    thread::scope(|scope| -> Result<(), Error> {
        let mut outstanding: VecDeque<(u64, thread::ScopedJoinHandle<'_, Result<Section, Error>>)> =
            VecDeque::new();
        let mut seen: HashSet<u64> = HashSet::new();
        let mut attempts_left = fetch.attempts.max(1);

        loop {
            if cancel.is_cancelled() {
                tracing::debug!(task_id = %task.id, "coordinator observed cancellation");
                break;
            }

            let payload = match cursor.next(fetch.deadline) {
                Ok(payload) => {
                    attempts_left = fetch.attempts.max(1);
                    payload
                }
                Err(crate::stream::Error::Transient) => {
                    attempts_left -= 1;
                    if attempts_left == 0 {
                        drain(outstanding, &mut report);
                        return Err(Error::Stalled {
                            task_id: task.id.clone(),
                        });
                    }
                    continue;
                }
                Err(err) => {
                    drain(outstanding, &mut report);
                    return Err(err.into());
                }
            };

            let section = match codec::decode(&payload) {
                Ok(section) => section,
                Err(err) => {
                    drain(outstanding, &mut report);
                    return Err(err.into());
                }
            };
            if !seen.insert(section.seq) {
                continue;
            }
            if section.is_terminator {
                tracing::debug!(task_id = %task.id, seq = section.seq, "primary terminator observed");
                // The terminator has nothing to match; hand it straight to
                // the reassembler so the section set can complete.
                if let Err(err) = publish_with_retry(
                    provider,
                    &reassembly_subject(&task.id),
                    &payload,
                    DEFAULT_PUBLISH_ATTEMPTS,
                ) {
                    drain(outstanding, &mut report);
                    return Err(err.into());
                }
                break;
            }

            if let Some(ceiling) = limits.max_parallel_matchers {
                while outstanding.len() >= ceiling.max(1) {
                    if let Some((seq, handle)) = outstanding.pop_front() {
                        join_matcher(seq, handle, &mut report);
                    }
                }
            }

            let seq = section.seq;
            tracing::debug!(task_id = %task.id, seq, rows = section.rows.len(), "dispatching matcher");
            report.sections += 1;
            let handle =
                scope.spawn(move || match_section(section, provider, comparison_file_id, fetch, cancel));
            outstanding.push_back((seq, handle));
        }

        drain(outstanding, &mut report);
        Ok(())
    })?;

    tracing::debug!(
        task_id = %task.id,
        sections = report.sections,
        stalled = report.stalled,
        "coordinator finished"
    );
    Ok(report)
}

fn drain(
    outstanding: VecDeque<(u64, thread::ScopedJoinHandle<'_, Result<Section, Error>>)>,
    report: &mut MatchReport,
) {
    for (seq, handle) in outstanding {
        join_matcher(seq, handle, report);
    }
}

/// Absorb one matcher outcome. A panicking matcher must not kill the
/// coordinator; it is logged and treated like a stall for that section.
fn join_matcher(
    seq: u64,
    handle: thread::ScopedJoinHandle<'_, Result<Section, Error>>,
    report: &mut MatchReport,
) {
    match handle.join() {
        Ok(Ok(section)) => {
            tracing::debug!(seq = section.seq, "matcher joined cleanly");
        }
        Ok(Err(err)) => {
            report.stalled += 1;
            tracing::error!(seq, %err, "matcher failed");
        }
        Err(_) => {
            report.stalled += 1;
            tracing::error!(seq, "matcher panicked");
        }
    }
}
