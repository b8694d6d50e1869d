use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use redlilium_pipelining::graph::{build_graphs, prewarm_plan};
use redlilium_pipelining::{
    Diagnostics, DispatchMode, DummyBackend, DummyDrawList, Scheduler, SchedulerConfig,
};

// ---------------------------------------------------------------------------
// Stage graph construction
// ---------------------------------------------------------------------------

fn bench_build_graphs(c: &mut Criterion) {
    c.bench_function("stage_graphs_build_4_slots", |b| {
        b.iter(|| {
            let graphs = build_graphs(black_box(4));
            let plan = prewarm_plan(black_box(4));
            black_box((&graphs, &plan));
        });
    });
}

// ---------------------------------------------------------------------------
// Scheduler ticks on the dummy backend
// ---------------------------------------------------------------------------

fn scheduler(config: SchedulerConfig) -> Scheduler<DummyBackend> {
    let backend = Arc::new(DummyBackend::new());
    let surface = backend.create_surface().expect("dummy surface");
    Scheduler::new(
        backend,
        surface,
        config,
        Arc::new(Diagnostics::new("bench")),
    )
    .expect("scheduler")
}

fn bench_tick(c: &mut Criterion, name: &str, config: SchedulerConfig) {
    let mut scheduler = scheduler(config);
    c.bench_function(name, |b| {
        b.iter(|| {
            let status = scheduler
                .tick(|slot| DummyDrawList::new(32 + slot.index() as u32))
                .expect("tick");
            black_box(status);
        });
    });
    scheduler.shutdown().expect("shutdown");
}

fn bench_tick_conservative(c: &mut Criterion) {
    bench_tick(c, "tick_conservative_parallel", SchedulerConfig::conservative());
}

fn bench_tick_aggressive(c: &mut Criterion) {
    bench_tick(c, "tick_aggressive_parallel", SchedulerConfig::aggressive());
}

fn bench_tick_aggressive_sequential(c: &mut Criterion) {
    bench_tick(
        c,
        "tick_aggressive_sequential",
        SchedulerConfig::aggressive().with_dispatch(DispatchMode::Sequential),
    );
}

criterion_group!(
    benches,
    bench_build_graphs,
    bench_tick_conservative,
    bench_tick_aggressive,
    bench_tick_aggressive_sequential,
);
criterion_main!(benches);
