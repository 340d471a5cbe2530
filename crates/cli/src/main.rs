use std::{fs, process};

use clap::Parser;
use recon_cli::{App, Command};
use recon_core::stream::MemoryBroker;
use recon_core::task::{FileStore, MatcherLimits, TaskStore};
use recon_core::{
    reconcile, CancelFlag, FileDescriptor, FilePurpose, PipelineOptions, ReconTask, RuleConfig,
};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let app = App::parse();
    match &app.command {
        Command::Run(args) => run(args),
        Command::Generate(args) => generate(args),
    }
}

fn run(args: &recon_cli::RunArgs) {
    let broker = MemoryBroker::new();
    let tasks = TaskStore::new();
    let files = FileStore::new();

    let config = RuleConfig {
        case_sensitive: args.case_sensitive,
        ignore_whitespace: args.ignore_whitespace,
        ..RuleConfig::default()
    };
    let task_id = tasks.save(ReconTask::new(String::new(), args.pairs.clone(), config));

    let primary_id = files.save(FileDescriptor {
        id: String::new(),
        task_id: task_id.clone(),
        purpose: FilePurpose::Primary,
        path: args.primary.clone(),
        has_header_row: args.has_header,
        column_delimiters: vec![args.delimiter],
    });
    let comparison_id = files.save(FileDescriptor {
        id: String::new(),
        task_id: task_id.clone(),
        purpose: FilePurpose::Comparison,
        path: args.comparison.clone(),
        has_header_row: args.has_header,
        column_delimiters: vec![args.delimiter],
    });
    attach(&tasks, &task_id, &primary_id, &comparison_id);

    let options = PipelineOptions {
        section_size: args.section_size,
        limits: MatcherLimits {
            max_parallel_matchers: args.max_parallel,
            ..MatcherLimits::default()
        },
        ..PipelineOptions::default()
    };

    match reconcile(
        &broker,
        &tasks,
        &files,
        &task_id,
        &args.output,
        &options,
        &CancelFlag::new(),
    ) {
        Ok(report) => println!(
            "{task_id}: {} rows reconciled across {} sections in {} ms -> {}",
            report.rows_written,
            report.primary_sections,
            report.duration().num_milliseconds(),
            args.output.display()
        ),
        Err(err) => {
            eprintln!("reconciliation failed: {err}");
            process::exit(1);
        }
    }
}

fn attach(tasks: &TaskStore, task_id: &str, primary_id: &str, comparison_id: &str) {
    tasks
        .attach_primary_file(task_id, primary_id)
        .unwrap_or_else(|err| {
            eprintln!("Failed to attach primary file: {err}");
            process::exit(1);
        });
    tasks
        .attach_comparison_file(task_id, comparison_id)
        .unwrap_or_else(|err| {
            eprintln!("Failed to attach comparison file: {err}");
            process::exit(1);
        });
}

fn generate(args: &recon_cli::GenerateArgs) {
    fs::create_dir_all(&args.output_dir).unwrap_or_else(|e| {
        eprintln!("Failed to create output directory: {e}");
        process::exit(1);
    });

    let params = recon_testgen::FixtureParams::builder()
        .id(0)
        .n_row(args.rows)
        .n_column(args.columns)
        .mismatch_rate(args.mismatch_rate)
        .missing_rate(args.missing_rate)
        .shuffle(args.shuffle)
        .build();
    let fixtures = recon_testgen::generate_fixtures(args.count, &params);

    for fixture in &fixtures {
        let id = fixture.get_id();
        let write = |name: String, contents: &str| {
            let path = args.output_dir.join(name);
            fs::write(&path, contents).unwrap_or_else(|e| {
                eprintln!("Failed to write {}: {e}", path.display());
                process::exit(1);
            });
        };
        write(format!("{id}-primary.csv"), fixture.get_primary_csv());
        write(format!("{id}-comparison.csv"), fixture.get_comparison_csv());

        let manifest = args.output_dir.join(format!("{id}.json"));
        let file = fs::File::create(&manifest).unwrap_or_else(|e| {
            eprintln!("Failed to create {}: {e}", manifest.display());
            process::exit(1);
        });
        serde_json::to_writer_pretty(file, fixture).unwrap_or_else(|e| {
            eprintln!("Failed to write {}: {e}", manifest.display());
            process::exit(1);
        });
    }

    println!(
        "Generated {} fixture pairs to {}",
        fixtures.len(),
        args.output_dir.display()
    );
}
