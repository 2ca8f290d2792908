//! Example: Run the round-trip suite over a corpus of SQL files
//!
//! Usage:
//!   cargo run --package querygraph-compat --example run_compat_suite -- fixtures/corpus [dialect] [config.toml]
//!
//! This will:
//! 1. Discover every `.sql` file under the corpus directory
//! 2. Parse, regenerate and re-parse each query
//! 3. Print a round-trip report and save it as JSON next to the corpus
//!
//! Set `RUST_LOG=querygraph_sql=debug` to trace strategy decisions.

use anyhow::Context;
use querygraph_compat::{CompatReport, CorpusHarness};
use querygraph_core::{Config, DialectConfig};
use std::env;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <corpus-dir> [dialect] [config.toml]", args[0]);
        eprintln!("\nExample:");
        eprintln!("  {} fixtures/corpus postgres", args[0]);
        eprintln!("\nDialects: ansi, postgres, mysql, bigquery, snowflake, mssql, oracle, sqlite");
        std::process::exit(1);
    }

    let corpus_path = PathBuf::from(&args[1]);

    let mut config = match args.get(3) {
        Some(path) => Config::from_file(PathBuf::from(path).as_path())
            .with_context(|| format!("Failed to load config from {}", path))?,
        None => Config::default(),
    };
    if let Some(dialect) = args.get(2) {
        config.dialect = dialect
            .parse::<DialectConfig>()
            .with_context(|| format!("Invalid dialect argument '{}'", dialect))?;
    }

    println!("Running QueryGraph round-trip suite...");
    println!("Corpus: {}", corpus_path.display());
    println!("Dialect: {}\n", config.dialect);

    let harness = CorpusHarness::new(&corpus_path, config);
    let metrics = harness.run()?;

    let report = CompatReport::new(vec![metrics]);
    report.print_terminal_report();

    let report_path = corpus_path.join("querygraph-roundtrip-report.json");
    report
        .save_json(&report_path)
        .with_context(|| format!("Failed to write {}", report_path.display()))?;
    println!("\nDetailed JSON report saved to: {}", report_path.display());

    if !report.passed() {
        std::process::exit(2);
    }
    Ok(())
}
