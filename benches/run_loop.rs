use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use modelsim::{load_model_from_str, Model, SimulationConfig, SimulationEngine};

// Orders with lines; every order is born with two lines and a closing action.
const MODEL: &str = r#"{"invariants": ["\\A o \\in Order : o.total >= 0"],
    "domains": [{"key": "shop", "subdomains": [{"key": "orders",
    "classes": [
        {"key": "Order",
         "attributes": [{"key": "total", "default": "0"}, {"key": "ref", "data_type": "text", "indexes": [1]}],
         "states": [{"key": "Open"}, {"key": "Paid"}, {"key": "Closed"}],
         "events": [{"key": "place"}, {"key": "pay", "params": [{"name": "amount", "data_type": "[1 .. 500]"}]},
            {"key": "close"}, {"key": "archive"}],
         "actions": [
            {"key": "Charge", "requires": ["amount > 0"], "guarantees": ["self.total' = self.total + amount"]},
            {"key": "Settle", "guarantees": ["self.total' = 0"]}
         ],
         "transitions": [
            {"to": "Open", "event": "place"},
            {"from": "Open", "to": "Paid", "event": "pay", "action": "Charge"},
            {"from": "Paid", "to": "Closed", "event": "close", "action": "Settle"},
            {"from": "Closed", "event": "archive"}
         ]},
        {"key": "Line",
         "attributes": [{"key": "qty", "data_type": "[1 .. 9]", "default": "1"}],
         "states": [{"key": "Held"}],
         "events": [{"key": "add"}],
         "transitions": [{"to": "Held", "event": "add"}]}
    ],
    "associations": [{"key": "contains", "from": "Order", "to": "Line",
        "from_multiplicity": "0..1", "to_multiplicity": "2..*"}]}]}]}"#;

fn model() -> Model {
    load_model_from_str(MODEL).unwrap()
}

fn bench_run_loop(c: &mut Criterion) {
    let model = model();
    let mut group = c.benchmark_group("run_loop");
    for steps in [100usize, 1_000] {
        group.throughput(Throughput::Elements(steps as u64));
        let engine = SimulationEngine::new(
            &model,
            SimulationConfig::default().with_seed(42).with_max_steps(steps),
        )
        .unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(steps), &engine, |b, engine| {
            b.iter(|| black_box(engine.run().unwrap().steps_taken));
        });
    }
    group.finish();
}

fn bench_engine_setup(c: &mut Criterion) {
    let model = model();
    c.bench_function("run_loop/engine_setup", |b| {
        b.iter(|| black_box(SimulationEngine::new(&model, SimulationConfig::default()).unwrap()));
    });
}

fn bench_fingerprint(c: &mut Criterion) {
    let result = SimulationEngine::new(&model(), SimulationConfig::default().with_max_steps(500))
        .unwrap()
        .run()
        .unwrap();
    c.bench_function("run_loop/fingerprint_500", |b| {
        b.iter(|| black_box(result.fingerprint().unwrap()));
    });
}

criterion_group!(benches, bench_run_loop, bench_engine_setup, bench_fingerprint);
criterion_main!(benches);
