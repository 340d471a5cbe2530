use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use recon_core::matcher::{evaluate, match_section, FetchBudget};
use recon_core::section::codec;
use recon_core::stream::{MemoryBroker, StreamProvider, COMPARISON_SECTIONS_STREAM, REASSEMBLY_STREAM};
use recon_core::{CancelFlag, ComparisonPair, FilePurpose, Row, RuleConfig, Section};

/// Build a section of `rows` rows with `columns` columns each.
/// Row keys are unique; `offset` shifts them so two sections can be made
/// fully disjoint or fully overlapping.
fn build_section(
    file_id: &str,
    purpose: FilePurpose,
    rows: usize,
    columns: usize,
    offset: usize,
) -> Section {
    let headers: Vec<String> = (1..=columns).map(|i| format!("column_{i}")).collect();
    let pairs: Vec<ComparisonPair> = std::iter::once(ComparisonPair::identifier(0, 0))
        .chain((1..columns).map(|i| ComparisonPair::equality(i, i)))
        .collect();
    let section_rows: Vec<Row> = (0..rows)
        .map(|row| {
            let cells: Vec<String> = std::iter::once(format!("key-{}", row + offset))
                .chain((1..columns).map(|col| format!("value-{row}-{col}")))
                .collect();
            Row::new(row as u64, cells.join(","), cells)
        })
        .collect();
    Section {
        id: Section::derive_id(file_id, 1),
        task_id: "bench-task".to_owned(),
        file_id: file_id.to_owned(),
        seq: 1,
        purpose,
        rows: section_rows,
        column_headers: headers,
        pairs,
        config: RuleConfig::default(),
        is_terminator: false,
    }
}

fn bench_evaluate(c: &mut Criterion) {
    let primary = build_section("file-p", FilePurpose::Primary, 1, 6, 0);
    let hit = build_section("file-c", FilePurpose::Comparison, 1, 6, 0);
    let miss = build_section("file-c", FilePurpose::Comparison, 1, 6, 1_000_000);

    let mut group = c.benchmark_group("evaluate");

    group.bench_function("identifier_hit_full_match", |b| {
        b.iter(|| {
            evaluate(
                black_box(&primary.rows[0]),
                black_box(&hit.rows[0]),
                &primary.pairs,
                &primary.config,
                &primary.column_headers,
            )
        })
    });

    group.bench_function("identifier_miss", |b| {
        b.iter(|| {
            evaluate(
                black_box(&primary.rows[0]),
                black_box(&miss.rows[0]),
                &primary.pairs,
                &primary.config,
                &primary.column_headers,
            )
        })
    });

    let case_sensitive = RuleConfig {
        case_sensitive: true,
        ..RuleConfig::default()
    };
    group.bench_function("identifier_hit_case_sensitive", |b| {
        b.iter(|| {
            evaluate(
                black_box(&primary.rows[0]),
                black_box(&hit.rows[0]),
                &primary.pairs,
                &case_sensitive,
                &primary.column_headers,
            )
        })
    });

    group.finish();
}

fn bench_section_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("section_scan");
    group.sample_size(20);

    // Worst case: no primary row ever hits, so every pair of rows is
    // evaluated against every comparison section.
    for size in [50_usize, 200] {
        let comparison = build_section("file-c", FilePurpose::Comparison, size, 4, 1_000_000);
        let mut terminator = build_section("file-c", FilePurpose::Comparison, 0, 4, 0);
        terminator.seq = 2;
        terminator.is_terminator = true;

        group.bench_function(format!("unmatched_{size}x{size}"), |b| {
            b.iter_batched(
                || {
                    let broker = MemoryBroker::new();
                    broker
                        .ensure_topic(COMPARISON_SECTIONS_STREAM, "file-c")
                        .unwrap();
                    broker
                        .ensure_topic(REASSEMBLY_STREAM, "Reconstruct-bench-task")
                        .unwrap();
                    for section in [&comparison, &terminator] {
                        broker
                            .publish("file-c", &codec::encode(section).unwrap())
                            .unwrap();
                    }
                    (
                        broker,
                        build_section("file-p", FilePurpose::Primary, size, 4, 0),
                    )
                },
                |(broker, primary)| {
                    match_section(
                        black_box(primary),
                        &broker,
                        "file-c",
                        FetchBudget::default(),
                        &CancelFlag::new(),
                    )
                    .unwrap()
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(benches, bench_evaluate, bench_section_scan);
criterion_main!(benches);
