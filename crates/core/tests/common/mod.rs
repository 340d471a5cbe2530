#![allow(dead_code)]

use core::time::Duration;

use recon_core::matcher::FetchBudget;
use recon_core::reassembler::ReassemblyBudget;
use recon_core::section::codec;
use recon_core::stream::{MemoryBroker, StreamProvider};
use recon_core::{ComparisonPair, FilePurpose, Row, RuleConfig, Section};

/// Build rows from cell literals.
///
/// ```ignore
/// let rows = rows![["1", "Alice", "10"], ["2", "Bob", "20"]];
/// ```
///
/// Row numbers are assigned in order starting at 0; `raw` is the cells
/// joined with commas.
#[macro_export]
macro_rules! rows {
    ($( [ $($cell:expr),* $(,)? ] ),* $(,)?) => {{
        let cells_list: Vec<Vec<String>> = vec![$( vec![$($cell.to_string()),*] ),*];
        cells_list
            .into_iter()
            .enumerate()
            .map(|(number, cells)| {
                recon_core::Row::new(number as u64, cells.join(","), cells)
            })
            .collect::<Vec<recon_core::Row>>()
    }};
}

/// The scenario rule set: column 0 identifies the row, columns 1 and 2
/// must agree for a match.
pub fn standard_pairs() -> Vec<ComparisonPair> {
    vec![
        ComparisonPair::identifier(0, 0),
        ComparisonPair::equality(1, 1),
        ComparisonPair::equality(2, 2),
    ]
}

/// The scenario rule config: case-insensitive, whitespace-insensitive.
pub fn standard_config() -> RuleConfig {
    RuleConfig {
        case_sensitive: false,
        ignore_whitespace: true,
        ..RuleConfig::default()
    }
}

pub fn standard_headers() -> Vec<String> {
    vec!["id".to_owned(), "name".to_owned(), "amount".to_owned()]
}

pub fn make_section(
    file_id: &str,
    seq: u64,
    purpose: FilePurpose,
    rows: Vec<Row>,
    is_terminator: bool,
) -> Section {
    Section {
        id: Section::derive_id(file_id, seq),
        task_id: "task-1".to_owned(),
        file_id: file_id.to_owned(),
        seq,
        purpose,
        rows,
        column_headers: standard_headers(),
        pairs: standard_pairs(),
        config: standard_config(),
        is_terminator,
    }
}

pub fn publish_section(broker: &MemoryBroker, subject: &str, section: &Section) {
    let payload = codec::encode(section).unwrap();
    broker.publish(subject, &payload).unwrap();
}

/// A fetch budget short enough for tests that exercise stalls.
pub fn fast_fetch() -> FetchBudget {
    FetchBudget {
        deadline: Duration::from_millis(50),
        attempts: 10,
    }
}

pub fn fast_reassembly() -> ReassemblyBudget {
    ReassemblyBudget {
        fetch_deadline: Duration::from_millis(50),
        max_idle_fetches: 40,
    }
}

/// Parse CSV output into (header, data rows).
pub fn parse_output(bytes: &[u8]) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);
    let mut records: Vec<Vec<String>> = reader
        .records()
        .map(|record| record.unwrap().iter().map(str::to_owned).collect())
        .collect();
    if records.is_empty() {
        return (Vec::new(), Vec::new());
    }
    let header = records.remove(0);
    (header, records)
}
