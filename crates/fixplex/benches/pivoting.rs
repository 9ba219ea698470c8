//! Criterion benchmarks for tableau construction and feasibility search.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fixplex::{Config, Fixplex, Var};

/// Chain of rows `v_i + 3 v_{i+1} == 0` with staggered bounds on the odd
/// variables, forcing a cascade of patches.
fn build_chain(n: u32) -> Fixplex<u64> {
    let mut s: Fixplex<u64> = Fixplex::new(Config::default());
    for i in 0..n {
        s.add_row(Var(i + 1), &[(Var(i), 1), (Var(i + 1), 3)]);
    }
    for i in (1..=n).step_by(2) {
        let lo = u64::from(i % 7) + 1;
        s.set_bounds(Var(i), lo, lo + 8, i);
    }
    s
}

fn bench_make_feasible(c: &mut Criterion) {
    let mut group = c.benchmark_group("make_feasible");
    for n in [16u32, 64, 256] {
        group.bench_with_input(BenchmarkId::new("chain", n), &n, |b, &n| {
            b.iter(|| {
                let mut s = build_chain(black_box(n));
                s.make_feasible()
            })
        });
    }
    group.finish();
}

fn bench_add_row(c: &mut Criterion) {
    let mut group = c.benchmark_group("add_row");
    for n in [64u32, 512] {
        group.bench_with_input(BenchmarkId::new("chain", n), &n, |b, &n| {
            b.iter(|| build_chain(black_box(n)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_make_feasible, bench_add_row);
criterion_main!(benches);
