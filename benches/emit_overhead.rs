use criterion::{Criterion, black_box, criterion_group, criterion_main};
use dial9_trace::{ArgValue, CategoryId, DynamicKey, StaticKey, TraceCollector};

static BENCH_SCOPE: StaticKey = StaticKey::new("bench_scope");
static BENCH_ARG: StaticKey = StaticKey::new("bench_arg");

fn bench_emit_overhead(c: &mut Criterion) {
    let collector = TraceCollector::instance();

    collector.set_enabled(false);
    c.bench_function("begin_scope_disabled", |b| {
        b.iter(|| collector.begin_scope(black_box(&BENCH_SCOPE), CategoryId::DEFAULT));
    });

    collector.set_enabled(true);
    c.bench_function("scope_pair_enabled", |b| {
        b.iter(|| {
            collector.begin_scope(&BENCH_SCOPE, CategoryId::DEFAULT);
            collector.end_scope(&BENCH_SCOPE, CategoryId::DEFAULT);
        });
    });
    collector.create_collection();

    c.bench_function("counter_delta_enabled", |b| {
        b.iter(|| collector.record_counter_delta(&BENCH_SCOPE, black_box(1.5), CategoryId::DEFAULT));
    });
    collector.create_collection();

    let dynamic = DynamicKey::new("bench_dynamic");
    c.bench_function("begin_end_event_enabled", |b| {
        b.iter(|| {
            collector.begin_event(&dynamic, CategoryId::DEFAULT);
            collector.end_event(&dynamic, CategoryId::DEFAULT);
        });
    });
    collector.create_collection();

    c.bench_function("store_string_enabled", |b| {
        b.iter(|| collector.store_data(&BENCH_SCOPE, black_box("payload"), CategoryId::DEFAULT));
    });
    collector.create_collection();

    c.bench_function("scope_args_enabled", |b| {
        b.iter(|| {
            collector.scope_args(
                CategoryId::DEFAULT,
                &[(&BENCH_ARG, ArgValue::from(black_box(7u64)))],
            );
        });
    });
    collector.create_collection();

    c.bench_function("create_collection_10k_events", |b| {
        b.iter(|| {
            for i in 0..10_000u64 {
                collector.store_data(&BENCH_ARG, i, CategoryId::DEFAULT);
            }
            black_box(collector.create_collection());
        });
    });

    collector.set_enabled(false);
    collector.clear();
}

criterion_group!(benches, bench_emit_overhead);
criterion_main!(benches);
