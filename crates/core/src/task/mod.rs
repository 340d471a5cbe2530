//! The task layer: metadata types, stores, the coordinator, and the
//! pipeline entry points.
//!
//! A task pairs exactly one primary file with exactly one comparison file.
//! [`reconcile`] is the all-in entry: it sections both files, fans primary
//! sections out to matchers, reassembles the verdict-annotated sections,
//! and writes the output file -- all stages running concurrently and
//! composing only through the stream substrate.

pub mod coordinator;
pub mod store;

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Local};

pub use coordinator::{run_matchers, MatchReport};
pub use store::{FileStore, TaskStore};

use crate::error::Error;
use crate::matcher::FetchBudget;
use crate::reassembler::{reassemble, ReassemblyBudget};
use crate::section::{ComparisonPair, FilePurpose, RuleConfig};
use crate::sectioner::{open_csv, section_reader, DEFAULT_SECTION_SIZE};
use crate::stream::{
    reassembly_subject, StreamProvider, COMPARISON_SECTIONS_STREAM, PRIMARY_SECTIONS_STREAM,
    REASSEMBLY_STREAM,
};

/// One reconciliation job.
#[derive(Clone, Debug)]
pub struct ReconTask {
    pub id: String,
    pub pairs: Vec<ComparisonPair>,
    pub config: RuleConfig,
    pub primary_file_id: Option<String>,
    pub comparison_file_id: Option<String>,
    pub has_begun: bool,
    pub is_done: bool,
    pub created_at: DateTime<Local>,
}

impl ReconTask {
    #[must_use]
    pub fn new(id: impl Into<String>, pairs: Vec<ComparisonPair>, config: RuleConfig) -> Self {
        Self {
            id: id.into(),
            pairs,
            config,
            primary_file_id: None,
            comparison_file_id: None,
            has_begun: false,
            is_done: false,
            created_at: Local::now(),
        }
    }
}

/// One input file attached to a task.
#[derive(Clone, Debug)]
pub struct FileDescriptor {
    pub id: String,
    pub task_id: String,
    pub purpose: FilePurpose,
    pub path: PathBuf,
    pub has_header_row: bool,
    /// Field separators for input parsing; the first byte is used.
    pub column_delimiters: Vec<u8>,
}

impl FileDescriptor {
    #[must_use]
    pub fn delimiter(&self) -> u8 {
        self.column_delimiters.first().copied().unwrap_or(b',')
    }
}

/// Cooperative cancellation shared by every stage of a task. Stages check
/// it between substrate fetches.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Knobs for the matcher fan-out.
#[derive(Clone, Copy, Debug, Default)]
pub struct MatcherLimits {
    /// Ceiling on concurrently running matchers. `None` lets every
    /// primary section run at once.
    pub max_parallel_matchers: Option<usize>,
    /// Fetch budget shared by the coordinator and each matcher.
    pub fetch: FetchBudget,
}

/// Knobs for one pipeline run.
#[derive(Clone, Copy, Debug)]
pub struct PipelineOptions {
    /// Rows per non-terminator section; at least 1.
    pub section_size: usize,
    pub limits: MatcherLimits,
    pub reassembly: ReassemblyBudget,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            section_size: DEFAULT_SECTION_SIZE,
            limits: MatcherLimits::default(),
            reassembly: ReassemblyBudget::default(),
        }
    }
}

/// Outcome of a completed reconciliation.
#[derive(Clone, Debug)]
pub struct ReconReport {
    pub task_id: String,
    /// Primary data sections dispatched to matchers.
    pub primary_sections: u64,
    /// Sections whose matcher failed; non-zero only on a failed task.
    pub stalled_sections: u64,
    /// Sections received by the reassembler, terminator included.
    pub sections_reassembled: u64,
    /// Data rows in the output, header excluded.
    pub rows_written: u64,
    pub started: DateTime<Local>,
    pub finished: DateTime<Local>,
}

impl ReconReport {
    #[must_use]
    pub fn duration(&self) -> chrono::Duration {
        self.finished - self.started
    }
}

/// Run one full reconciliation from the metadata stores to an output file.
///
/// Looks the task and its two files up, opens both inputs, runs
/// [`run_pipeline`], and only writes `output_path` when the whole task
/// succeeded -- a failed task leaves no partial output behind.
///
/// # Errors
///
/// Store lookups, input validation, and every stage failure from
/// [`run_pipeline`].
pub fn reconcile(
    provider: &dyn StreamProvider,
    tasks: &TaskStore,
    files: &FileStore,
    task_id: &str,
    output_path: &Path,
    options: &PipelineOptions,
    cancel: &CancelFlag,
) -> Result<ReconReport, Error> {
    let task = tasks.get(task_id)?;
    if task.has_begun {
        return Err(Error::bad_input(format!(
            "reconciliation already begun for task [{task_id}]"
        )));
    }
    let primary = files.primary_for_task(task_id)?;
    let comparison = files.comparison_for_task(task_id)?;

    // Open both inputs before spawning anything so a bad path fails fast.
    let primary_input = open_csv(&primary.path)?;
    let comparison_input = open_csv(&comparison.path)?;
    tasks.set_started(task_id)?;

    let mut output = Vec::new();
    let report = run_pipeline(
        provider,
        &task,
        &primary,
        primary_input,
        &comparison,
        comparison_input,
        &mut output,
        options,
        cancel,
    )?;

    fs::write(output_path, &output)?;
    tasks.set_done(task_id)?;

    // The output is durable; release the retained sections. Best-effort,
    // the task already succeeded.
    let cleanup = [
        (PRIMARY_SECTIONS_STREAM, primary.id.clone()),
        (COMPARISON_SECTIONS_STREAM, comparison.id.clone()),
        (REASSEMBLY_STREAM, reassembly_subject(&task.id)),
    ];
    for (stream, subject) in cleanup {
        if let Err(err) = provider.delete_topic(stream, &subject) {
            tracing::warn!(stream, subject = %subject, %err, "failed to release a topic");
        }
    }

    Ok(report)
}

/// Run the three-stage pipeline over already-open inputs and an in-memory
/// or caller-owned sink.
///
/// Spawns the two sectioners and the reassembler on their own threads and
/// drives the coordinator on the calling thread; everything is joined
/// before returning. On the first stage failure the cancellation flag is
/// raised so the remaining stages wind down instead of waiting out their
/// budgets.
///
/// # Errors
///
/// The first stage failure, in pipeline order: primary sectioner,
/// comparison sectioner, coordinator, reassembler. A matcher stall
/// surfaces as the reassembler's [`Error::Stalled`].
#[allow(clippy::too_many_arguments)]
pub fn run_pipeline<P, C, W>(
    provider: &dyn StreamProvider,
    task: &ReconTask,
    primary: &FileDescriptor,
    primary_input: P,
    comparison: &FileDescriptor,
    comparison_input: C,
    sink: &mut W,
    options: &PipelineOptions,
    cancel: &CancelFlag,
) -> Result<ReconReport, Error>
where
    P: Read + Send,
    C: Read + Send,
    W: Write + Send,
{
    if options.section_size == 0 {
        return Err(Error::bad_input("section size must be at least 1"));
    }
    if primary.purpose != FilePurpose::Primary {
        return Err(Error::bad_input(format!(
            "file [{}] is not a primary file",
            primary.id
        )));
    }
    if comparison.purpose != FilePurpose::Comparison {
        return Err(Error::bad_input(format!(
            "file [{}] is not a comparison file",
            comparison.id
        )));
    }

    provider.ensure_topic(PRIMARY_SECTIONS_STREAM, &primary.id)?;
    provider.ensure_topic(COMPARISON_SECTIONS_STREAM, &comparison.id)?;
    provider.ensure_topic(REASSEMBLY_STREAM, &reassembly_subject(&task.id))?;

    let started = Local::now();
    tracing::debug!(task_id = %task.id, primary = %primary.id, comparison = %comparison.id, "pipeline started");

    let (match_result, primary_result, comparison_result, reassembly_result) =
        thread::scope(|scope| {
            let primary_handle = scope.spawn(move || {
                section_reader(primary_input, primary, task, provider, options.section_size)
            });
            let comparison_handle = scope.spawn(move || {
                section_reader(
                    comparison_input,
                    comparison,
                    task,
                    provider,
                    options.section_size,
                )
            });
            let reassembly_handle = scope
                .spawn(move || reassemble(provider, &task.id, sink, options.reassembly, cancel));

            let match_result = run_matchers(
                provider,
                task,
                &primary.id,
                &comparison.id,
                options.limits,
                cancel,
            );
            if match_result.is_err() {
                cancel.cancel();
            }

            let primary_result = join_stage("primary sectioner", primary_handle);
            if primary_result.is_err() {
                cancel.cancel();
            }
            let comparison_result = join_stage("comparison sectioner", comparison_handle);
            if comparison_result.is_err() {
                cancel.cancel();
            }
            let reassembly_result = join_stage("reassembler", reassembly_handle);

            (
                match_result,
                primary_result,
                comparison_result,
                reassembly_result,
            )
        });

    primary_result?;
    comparison_result?;
    let match_report = match_result?;
    let reassembly = reassembly_result?;

    let report = ReconReport {
        task_id: task.id.clone(),
        primary_sections: match_report.sections,
        stalled_sections: match_report.stalled,
        sections_reassembled: reassembly.sections,
        rows_written: reassembly.rows_written,
        started,
        finished: Local::now(),
    };
    tracing::debug!(
        task_id = %task.id,
        rows = report.rows_written,
        ms = report.duration().num_milliseconds(),
        "pipeline finished"
    );
    Ok(report)
}

fn join_stage<T>(
    stage: &'static str,
    handle: thread::ScopedJoinHandle<'_, Result<T, Error>>,
) -> Result<T, Error> {
    handle.join().map_err(|_| Error::StagePanic { stage })?
}
