use chrono::{DateTime, Duration, Local};
use rand::distr::{Distribution, Uniform};
use rand::seq::SliceRandom;
use rand::RngExt;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use recon_core::ComparisonPair;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

#[derive(Clone, Debug, Default, Deserialize, Serialize, TypedBuilder)]
pub struct FixtureParams {
    pub id: u64,
    /// Data rows in the primary file.
    pub n_row: u64,
    /// Columns per row; column 0 is the row key.
    pub n_column: u64,
    /// Fraction of comparison rows with one perturbed value column.
    #[builder(default)]
    pub mismatch_rate: f64,
    /// Fraction of primary rows absent from the comparison file.
    #[builder(default)]
    pub missing_rate: f64,
    /// Shuffle the comparison rows so matches cross section boundaries.
    #[builder(default)]
    pub shuffle: bool,
}

/// Row counts the pipeline must reproduce for a fixture.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExpectedCounts {
    pub matched: u64,
    pub mismatched: u64,
    pub unmatched: u64,
}

/// A generated primary/comparison pair with its ground truth.
///
/// Both files carry a header row (`key, col_1, ...`) and share the same
/// column layout, so [`standard_pairs`] reconciles them with column 0 as
/// the row identifier.
#[derive(Deserialize, Serialize, Debug)]
pub struct Fixture {
    params: FixtureParams,
    info: String,
    start: DateTime<Local>,
    end: DateTime<Local>,
    primary_csv: String,
    comparison_csv: String,
    expected: ExpectedCounts,
}

impl Fixture {
    #[must_use]
    pub const fn get_id(&self) -> u64 {
        self.params.id
    }

    #[must_use]
    pub const fn get_params(&self) -> &FixtureParams {
        &self.params
    }

    #[must_use]
    pub fn get_primary_csv(&self) -> &str {
        &self.primary_csv
    }

    #[must_use]
    pub fn get_comparison_csv(&self) -> &str {
        &self.comparison_csv
    }

    #[must_use]
    pub const fn get_expected(&self) -> ExpectedCounts {
        self.expected
    }

    #[must_use]
    pub fn get_duration(&self) -> Duration {
        self.end - self.start
    }
}

/// The rule set fixtures are reconciled under: column 0 identifies the
/// row, every other column participates in the equality predicate.
#[must_use]
pub fn standard_pairs(n_column: u64) -> Vec<ComparisonPair> {
    let mut pairs = vec![ComparisonPair::identifier(0, 0)];
    for column in 1..n_column as usize {
        pairs.push(ComparisonPair::equality(column, column));
    }
    pairs
}

/// Generate one fixture.
///
/// Every primary row gets a unique key, so the identifier predicate pairs
/// it with at most one comparison row. A row's fate is sampled once:
/// missing (absent from the comparison file, must come out `Unmatched`),
/// mismatched (one value column perturbed, must come out `Mismatched`),
/// or matched. The expected counts record exactly what was sampled.
///
/// # Panics
///
/// Panics if `n_column` is zero (a row needs at least its key column).
#[must_use]
pub fn generate_fixture(params: FixtureParams) -> Fixture {
    assert!(params.n_column >= 1, "fixtures need at least the key column");
    let start = Local::now();
    let mut random_generator = rand::rng();
    let value_range = Uniform::new(0u64, 1_000_000).unwrap();

    let mut primary_rows: Vec<Vec<String>> = Vec::with_capacity(params.n_row as usize);
    let mut comparison_rows: Vec<Vec<String>> = Vec::new();
    let mut expected = ExpectedCounts::default();

    for row in 0..params.n_row {
        let mut cells: Vec<String> = Vec::with_capacity(params.n_column as usize);
        cells.push(format!("key-{}-{row}", params.id));
        for _ in 1..params.n_column {
            cells.push(value_range.sample(&mut random_generator).to_string());
        }
        primary_rows.push(cells.clone());

        let missing = random_generator.random::<f64>() < params.missing_rate;
        if missing {
            expected.unmatched += 1;
            continue;
        }

        let mismatched =
            params.n_column > 1 && random_generator.random::<f64>() < params.mismatch_rate;
        if mismatched {
            let column_range = Uniform::new(1, params.n_column as usize).unwrap();
            let victim = column_range.sample(&mut random_generator);
            let perturbed = format!("{}-off", cells[victim]);
            cells[victim] = perturbed;
            expected.mismatched += 1;
        } else {
            expected.matched += 1;
        }
        comparison_rows.push(cells);
    }

    if params.shuffle {
        comparison_rows.shuffle(&mut random_generator);
    }

    Fixture {
        primary_csv: render_csv(params.n_column, &primary_rows),
        comparison_csv: render_csv(params.n_column, &comparison_rows),
        params,
        info: "generated".to_string(),
        start,
        end: Local::now(),
        expected,
    }
}

#[must_use]
pub fn generate_fixtures(n_fixture: u64, params: &FixtureParams) -> Vec<Fixture> {
    (0..n_fixture)
        .into_par_iter()
        .map(|id| {
            let mut fixture_params = params.clone();
            fixture_params.id = id;
            generate_fixture(fixture_params)
        })
        .collect()
}

/// # Panics
///
/// The `expect`s never panic: every record has `n_column` cells and the
/// sink is an infallible `Vec`.
fn render_csv(n_column: u64, rows: &[Vec<String>]) -> String {
    let mut header: Vec<String> = vec!["key".to_owned()];
    for column in 1..n_column {
        header.push(format!("col_{column}"));
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(&header)
        .expect("writing a record to a Vec sink cannot fail");
    for row in rows {
        writer
            .write_record(row)
            .expect("writing a record to a Vec sink cannot fail");
    }
    let bytes = writer
        .into_inner()
        .expect("flushing to a Vec sink cannot fail");
    String::from_utf8(bytes).expect("generated csv is always utf-8")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(n_row: u64) -> FixtureParams {
        FixtureParams::builder()
            .id(7)
            .n_row(n_row)
            .n_column(3)
            .build()
    }

    #[test]
    fn counts_cover_every_row() {
        let fixture = generate_fixture(FixtureParams {
            mismatch_rate: 0.3,
            missing_rate: 0.2,
            ..params(200)
        });
        let expected = fixture.get_expected();
        assert_eq!(
            expected.matched + expected.mismatched + expected.unmatched,
            200
        );
    }

    #[test]
    fn clean_fixture_matches_everything() {
        let fixture = generate_fixture(params(50));
        assert_eq!(
            fixture.get_expected(),
            ExpectedCounts {
                matched: 50,
                mismatched: 0,
                unmatched: 0
            }
        );
    }

    #[test]
    fn csv_has_header_and_all_rows() {
        let fixture = generate_fixture(params(10));
        let lines: Vec<&str> = fixture.get_primary_csv().lines().collect();
        assert_eq!(lines.len(), 11);
        assert_eq!(lines[0], "key,col_1,col_2");
    }

    #[test]
    fn missing_rows_shrink_the_comparison_file() {
        let fixture = generate_fixture(FixtureParams {
            missing_rate: 1.0,
            ..params(10)
        });
        let comparison_lines = fixture.get_comparison_csv().lines().count();
        // Header only.
        assert_eq!(comparison_lines, 1);
        assert_eq!(fixture.get_expected().unmatched, 10);
    }

    #[test]
    fn standard_pairs_put_the_key_first() {
        let pairs = standard_pairs(3);
        assert_eq!(pairs.len(), 3);
        assert!(pairs[0].is_row_identifier);
        assert!(!pairs[1].is_row_identifier);
        assert_eq!(pairs[2].primary_column, 2);
    }
}
