use core::fmt::{self, Display, Formatter};

use ::derive_more::From;

use crate::section::FilePurpose;
use crate::stream;

/// Error returned when a reconciliation task cannot make progress.
#[derive(Debug, From)]
pub enum Error {
    /// Caller-supplied input that cannot be processed (bad section size,
    /// unsupported file extension, task in the wrong state).
    BadInput { reason: String },
    /// A comparison pair references a column outside a row. Programmer
    /// error in the rule set; never retried.
    BadRuleConfig {
        column: usize,
        row_width: usize,
        side: FilePurpose,
    },
    /// File read or write failure; fatal for its stage.
    #[from]
    Io(std::io::Error),
    /// CSV parse or write failure; fatal for its stage.
    #[from]
    Csv(csv::Error),
    /// Section wire codec failure.
    #[from]
    Codec(serde_json::Error),
    /// Substrate failure that survived its local retry budget.
    #[from]
    Stream(stream::Error),
    /// One primary section exhausted its comparison fetch budget; only
    /// that section is lost, siblings keep running.
    MatchStalled { file_id: String, seq: u64 },
    /// The task stopped making progress before reassembly completeness.
    Stalled { task_id: String },
    /// The task-wide cancellation flag was raised.
    Cancelled,
    /// A pipeline stage crashed; converted at the join boundary.
    StagePanic { stage: &'static str },
    /// Task id not present in the store.
    UnknownTask { task_id: String },
    /// File id not present in the store.
    UnknownFile { file_id: String },
    /// No file with the wanted purpose is attached to the task.
    MissingFile {
        task_id: String,
        purpose: FilePurpose,
    },
}

impl Error {
    /// Convenience constructor for [`Error::BadInput`].
    pub fn bad_input(reason: impl Into<String>) -> Self {
        Self::BadInput {
            reason: reason.into(),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadInput { reason } => write!(f, "bad input: {reason}"),
            Self::BadRuleConfig {
                column,
                row_width,
                side,
            } => write!(
                f,
                "comparison pair references {side} column {column} but the row has {row_width} columns"
            ),
            Self::Io(err) => write!(f, "i/o failure: {err}"),
            Self::Csv(err) => write!(f, "csv failure: {err}"),
            Self::Codec(err) => write!(f, "section codec failure: {err}"),
            Self::Stream(err) => write!(f, "stream failure: {err}"),
            Self::MatchStalled { file_id, seq } => {
                write!(f, "matcher for section [{seq}] of file [{file_id}] stalled")
            }
            Self::Stalled { task_id } => {
                write!(f, "task [{task_id}] stopped making progress")
            }
            Self::Cancelled => f.write_str("task cancelled"),
            Self::StagePanic { stage } => write!(f, "{stage} panicked"),
            Self::UnknownTask { task_id } => write!(f, "task [{task_id}] not found"),
            Self::UnknownFile { file_id } => write!(f, "file [{file_id}] not found"),
            Self::MissingFile { task_id, purpose } => {
                write!(f, "no {purpose} file attached to task [{task_id}]")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Csv(err) => Some(err),
            Self::Codec(err) => Some(err),
            Self::Stream(err) => Some(err),
            _ => None,
        }
    }
}
