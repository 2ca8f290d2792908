//! Benchmarks for parsing, generation and round-trip validation
//!
//! Queries are synthesized with a configurable number of columns and joins so
//! the cost of extraction and rendering can be measured as queries grow.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use querygraph_core::{Config, DialectConfig};
use querygraph_sql::{FallbackOrchestrator, GeneratorOptions, PatternMatcher, SqlGenerator, Transpiler};

/// SELECT with N columns over a chain of N joined tables
fn generate_join_chain(num_columns: usize, num_joins: usize) -> String {
    let select_cols: Vec<String> = (0..num_columns)
        .map(|i| format!("t{}.col_{}", i % (num_joins + 1), i))
        .collect();

    let joins: Vec<String> = (1..=num_joins)
        .map(|i| format!("LEFT JOIN table_{} t{} ON t{}.id = t{}.parent_id", i, i, i - 1, i))
        .collect();

    format!(
        "SELECT {} FROM table_0 t0 {} WHERE t0.active = true ORDER BY t0.id LIMIT 100",
        select_cols.join(", "),
        joins.join(" ")
    )
}

/// Benchmark: strategy chain without caching
fn bench_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("parsing");
    let orchestrator = FallbackOrchestrator::new(DialectConfig::Ansi, Default::default());

    for num_joins in [1, 5, 20].iter() {
        let sql = generate_join_chain(num_joins * 5, *num_joins);

        group.bench_with_input(BenchmarkId::from_parameter(num_joins), num_joins, |b, _| {
            b.iter(|| black_box(orchestrator.parse(&sql)));
        });
    }

    group.finish();
}

/// Benchmark: pattern strategy on its own
fn bench_pattern_matching(c: &mut Criterion) {
    let matcher = PatternMatcher::new();
    let sql = "SELECT o.id, c.name FROM orders o JOIN customers c ON o.customer_id = c.id";

    c.bench_function("pattern_matching", |b| {
        b.iter(|| black_box(matcher.extract(sql)));
    });
}

/// Benchmark: cold vs warm parse cache
fn bench_parse_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_cache");
    let sql = generate_join_chain(50, 5);

    group.bench_function("cold_cache", |b| {
        b.iter(|| {
            let transpiler = Transpiler::default();
            black_box(transpiler.parse(&sql))
        });
    });

    let transpiler = Transpiler::default();
    let _ = transpiler.parse(&sql);

    group.bench_function("warm_cache", |b| {
        b.iter(|| black_box(transpiler.parse(&sql)));
    });

    group.finish();
}

/// Benchmark: SQL generation per dialect
fn bench_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("generation");

    let transpiler = Transpiler::new(Config::default());
    let parsed = transpiler.parse(&generate_join_chain(30, 10));
    let Some(model) = parsed.model() else {
        panic!("benchmark query failed to parse: {:?}", parsed.errors);
    };

    for dialect in [
        DialectConfig::Ansi,
        DialectConfig::Postgres,
        DialectConfig::MySql,
        DialectConfig::MsSql,
        DialectConfig::Oracle,
    ] {
        let generator = SqlGenerator::new(GeneratorOptions::default().with_dialect(dialect));

        group.bench_with_input(BenchmarkId::from_parameter(dialect), &dialect, |b, _| {
            b.iter(|| black_box(generator.generate(model)));
        });
    }

    group.finish();
}

/// Benchmark: end-to-end parse, generate and compare
fn bench_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("round_trip");

    for num_joins in [1, 5, 20].iter() {
        let sql = generate_join_chain(num_joins * 5, *num_joins);

        group.bench_with_input(BenchmarkId::from_parameter(num_joins), num_joins, |b, _| {
            b.iter(|| {
                // Fresh transpiler so the cache does not hide the parse
                let transpiler = Transpiler::default();
                black_box(transpiler.validate_round_trip(&sql))
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_parsing,
    bench_pattern_matching,
    bench_parse_cache,
    bench_generation,
    bench_round_trip
);

criterion_main!(benches);
