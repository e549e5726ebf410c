//! Scalability benchmarks for the bubble arena
//!
//! Measures the tick systems from a few hundred bubbles up to the 20k target.
//!
//! Run with: cargo bench --bench scalability

use bubble_arena::config::SimConfig;
use bubble_arena::game::round::Round;
use bubble_arena::game::spatial::{CollisionStrategy, PairFinder};
use bubble_arena::game::state::{Arena, ImageRef, ModeKind};
use bubble_arena::game::store::{Bubble, BubbleStore};
use bubble_arena::game::systems::{collision, movement};
use bubble_arena::roster::Roster;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const ARENA: Arena = Arena {
    width: 4000.0,
    height: 4000.0,
};

/// Store with `count` randomly placed, moving bubbles
fn create_store(count: usize) -> BubbleStore {
    let mut store = BubbleStore::with_capacity(count);
    let mut rng = StdRng::seed_from_u64(42);
    for i in 0..count {
        let angle = rng.gen_range(0.0..std::f32::consts::TAU);
        let id = store.alloc_id();
        store
            .append(Bubble {
                id,
                x: rng.gen_range(10.0..ARENA.width - 10.0),
                y: rng.gen_range(10.0..ARENA.height - 10.0),
                vx: angle.cos() * 3.0,
                vy: angle.sin() * 3.0,
                radius: 6.0,
                target_radius: 6.0,
                health: 100.0,
                image: ImageRef((i % 64) as u32),
            })
            .unwrap();
    }
    store
}

/// Normal-mode round with `count` bubbles, already running
fn running_round(count: usize, collision: CollisionStrategy) -> Round {
    let mut config = SimConfig::default();
    config.arena.width = ARENA.width;
    config.arena.height = ARENA.height;
    config.round.collision = collision;

    let mut round = Round::new(&config, 7);
    let request = round.select_mode(ModeKind::Normal).unwrap();
    let roster = Roster {
        images: (0..count).map(|i| format!("/images/{}.png", i)).collect(),
        super_image: None,
    };
    round.apply_roster(request.epoch, Ok(roster));
    round.start();
    round
}

/// Movement phase (parallel above the threshold when the feature is on)
fn bench_movement(c: &mut Criterion) {
    let mut group = c.benchmark_group("movement");
    group.sample_size(50);

    for count in [100, 1000, 5000, 20000] {
        let mut store = create_store(count);

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("integrate", count), &count, |b, _| {
            b.iter(|| {
                movement::update(&mut store, ARENA, black_box(2.5));
            })
        });
    }
    group.finish();
}

/// Pair generation and resolution per strategy
fn bench_collision(c: &mut Criterion) {
    let mut group = c.benchmark_group("collision");
    group.sample_size(30);

    let cases: [(CollisionStrategy, &[usize]); 3] = [
        (CollisionStrategy::Exhaustive, &[100, 500, 1000]),
        (CollisionStrategy::Sampled, &[1000, 5000, 20000]),
        (CollisionStrategy::Grid, &[1000, 5000, 20000]),
    ];

    for (strategy, counts) in cases {
        for &count in counts {
            let mut store = create_store(count);
            let mut finder = PairFinder::new(strategy);
            let mut rng = StdRng::seed_from_u64(1);
            let mut contacts = Vec::with_capacity(1024);

            group.throughput(Throughput::Elements(count as u64));
            group.bench_with_input(BenchmarkId::new(strategy.as_str(), count), &count, |b, _| {
                b.iter(|| {
                    collision::resolve_bubbles(&mut store, &mut finder, &mut rng, &mut contacts);
                    black_box(contacts.len())
                })
            });
        }
    }
    group.finish();
}

/// Full tick through the round, including damage and the death queue
fn bench_full_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_tick");
    group.sample_size(20);

    for count in [100, 1000, 5000] {
        let mut round = running_round(count, CollisionStrategy::Auto);

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("complete", count), &count, |b, _| {
            b.iter(|| {
                if !round.tick() {
                    round = running_round(count, CollisionStrategy::Auto);
                }
                black_box(round.store().alive_count())
            })
        });
    }
    group.finish();
}

/// Snapshot building for the renderer
fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");
    group.sample_size(30);

    for count in [1000, 5000] {
        let mut round = running_round(count, CollisionStrategy::Auto);

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("build", count), &count, |b, _| {
            b.iter(|| {
                // A tick invalidates the cached snapshot
                round.tick();
                black_box(round.snapshot().bubbles.len())
            })
        });
    }
    group.finish();
}

/// Tick budget check: movement plus grid collision at 20k must fit in 30 ms
fn bench_tick_budget(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick_budget");
    group.sample_size(30);
    group.measurement_time(std::time::Duration::from_secs(10));

    let count = 20000;
    let mut store = create_store(count);
    let mut finder = PairFinder::new(CollisionStrategy::Grid);
    let mut rng = StdRng::seed_from_u64(3);
    let mut contacts = Vec::with_capacity(4096);

    group.bench_function("20k_bubbles", |b| {
        b.iter(|| {
            movement::update(&mut store, ARENA, 2.5);
            collision::resolve_bubbles(&mut store, &mut finder, &mut rng, &mut contacts);
            movement::contain(&mut store, ARENA);
            black_box(contacts.len())
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_movement,
    bench_collision,
    bench_full_tick,
    bench_snapshot,
    bench_tick_budget,
);
criterion_main!(benches);
