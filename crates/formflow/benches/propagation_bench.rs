//! Benchmarks for validation propagation through a registry.
//!
//! Run with: `cargo bench --package formflow --bench propagation_bench`
//!
//! # Performance Baselines
//!
//! - Registering a form of N independent fields
//! - A write to a field that N other fields are validated against
//! - Reading the error snapshot of a form with N failing fields

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use formflow::commands::{form_errors, set_field_value};
use formflow::validators::is_at_least;
use formflow::{ControlOptions, FormRegistry};
use serde_json::json;
use std::hint::black_box;

const SIZES: [usize; 3] = [10, 100, 500];

// ============================================================================
// Setup
// ============================================================================

/// `f1..f{n}` each validated as at least `f0`.
fn fan_out(n: usize) -> FormRegistry {
    let form = FormRegistry::default();
    form.register_control(ControlOptions::new("f0").with_initial_value(json!(0)))
        .unwrap();
    for i in 1..=n {
        form.register_control(
            ControlOptions::new(format!("f{i}"))
                .with_initial_value(json!(i))
                .with_validator(is_at_least("f0")),
        )
        .unwrap();
    }
    form
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_register(c: &mut Criterion) {
    let mut group = c.benchmark_group("register");
    for n in SIZES {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| {
                let form = FormRegistry::default();
                for i in 0..n {
                    form.register_control(
                        ControlOptions::new(format!("field{i}"))
                            .with_initial_value(json!(i))
                            .with_validator(is_at_least(0.0)),
                    )
                    .unwrap();
                }
                black_box(form)
            });
        });
    }
    group.finish();
}

fn bench_dependency_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("dependency_write");
    for n in SIZES {
        let form = fan_out(n);
        let mut toggle = false;
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| {
                toggle = !toggle;
                let value = if toggle { json!(n) } else { json!(0) };
                set_field_value(&form, "f0", black_box(value)).unwrap();
            });
        });
    }
    group.finish();
}

fn bench_error_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("error_snapshot");
    for n in SIZES {
        let form = FormRegistry::default();
        for i in 0..n {
            form.register_control(
                ControlOptions::new(format!("field{i}"))
                    .with_initial_value(json!(-1))
                    .with_validator(is_at_least(0.0)),
            )
            .unwrap();
        }
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| black_box(form_errors(&form)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_register, bench_dependency_write, bench_error_snapshot);
criterion_main!(benches);
