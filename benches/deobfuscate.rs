//! Benchmarks for the deobfuscation pipeline.
//!
//! Measures:
//! - Parsing and printing a script
//! - The safe rule set on branch-heavy input
//! - The full pipeline including sandbox evaluation

extern crate unravel;

use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use unravel::{
    ast::Ast,
    deobfuscation::{DeobfuscationEngine, EngineConfig},
};

/// Builds a script with `n` deterministic branches and string concatenations.
fn branchy_script(n: usize) -> String {
    let mut src = String::new();
    for i in 0..n {
        src.push_str(&format!(
            "if ({}) {{ f{i}('a' + '{i}'); }} else {{ g{i}(); }}\n",
            i % 2 == 0
        ));
    }
    src
}

/// Builds a string-array decoder in the shape of common obfuscator output.
fn array_decoder_script(n: usize) -> String {
    let items: Vec<String> = (0..25).map(|i| format!("'s{i}'")).collect();
    let mut src = format!(
        "var _0x1 = [{}];\nfunction _0x2(i) {{ return _0x1[i]; }}\n",
        items.join(", ")
    );
    for i in 0..n {
        src.push_str(&format!("use(_0x2({}));\n", i % 25));
    }
    src
}

fn bench_parse_print(c: &mut Criterion) {
    let src = branchy_script(200);

    c.bench_function("ast_parse_print_200", |b| {
        b.iter(|| {
            let ast = Ast::parse(black_box(&src)).unwrap();
            black_box(ast.print())
        });
    });
}

fn bench_safe_rules(c: &mut Criterion) {
    let src = branchy_script(100);
    let engine = DeobfuscationEngine::new(EngineConfig::safe_only());

    c.bench_function("safe_rules_100_branches", |b| {
        b.iter(|| {
            let (script, _) = engine.process_source(black_box(&src)).unwrap();
            black_box(script)
        });
    });
}

fn bench_full_pipeline(c: &mut Criterion) {
    let src = array_decoder_script(50);
    let engine = DeobfuscationEngine::new(EngineConfig::default());

    let mut group = c.benchmark_group("full_pipeline");
    group.sample_size(10);
    group.bench_function("array_decoder_50_calls", |b| {
        b.iter(|| {
            let (script, _) = engine.process_source(black_box(&src)).unwrap();
            black_box(script)
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_parse_print,
    bench_safe_rules,
    bench_full_pipeline
);
criterion_main!(benches);
