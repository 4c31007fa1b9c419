use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use fireflies_core::{
    Firefly, FireflyId, Forces, GardenConfig, Lantern, SwarmSummary, Vec2, Vitality,
};
use rand::{SeedableRng, rngs::SmallRng};
use std::time::Duration;

fn bench_firefly_ticks(c: &mut Criterion) {
    let mut group = c.benchmark_group("firefly_tick");
    let samples: usize = std::env::var("FF_BENCH_SAMPLES")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(30);
    group.sample_size(samples);
    group.measurement_time(Duration::from_secs(5));
    // Steps per bench iteration (can override via FF_BENCH_STEPS)
    let steps: usize = std::env::var("FF_BENCH_STEPS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(600);

    let config = GardenConfig {
        rng_seed: Some(0xF1EF),
        ..GardenConfig::default()
    };
    let bounds = Vec2::new(config.world.width, config.world.height);
    let lanterns: Vec<Lantern> = (0..config.lantern.max)
        .map(|i| Lantern::new(Vec2::new(90.0 * i as f32 + 40.0, 384.0), config.lantern.radius))
        .collect();

    for &lantern_count in &[0_usize, lanterns.len()] {
        group.bench_function(format!("steps{steps}_lanterns{lantern_count}"), |b| {
            b.iter_batched(
                || {
                    let mut rng = config.seeded_rng();
                    let firefly = Firefly::spawn(
                        FireflyId(1),
                        Vec2::new(512.0, 384.0),
                        &config.firefly,
                        bounds,
                        &mut rng,
                    );
                    (firefly, rng)
                },
                |(mut firefly, mut rng)| {
                    let forces = Forces {
                        lanterns: &lanterns[..lantern_count],
                        attraction: Some(Vec2::new(100.0, 100.0)),
                        wind: Some(Vec2::new(0.8, 0.0)),
                    };
                    for _ in 0..steps {
                        if firefly.tick(config.dt(), &forces, &mut rng) == Vitality::Expired {
                            break;
                        }
                    }
                    firefly
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_swarm_summary(c: &mut Criterion) {
    let config = GardenConfig::default();
    let bounds = Vec2::new(config.world.width, config.world.height);
    let mut rng = SmallRng::seed_from_u64(7);
    let states: Vec<_> = (1..=config.population.max as u64)
        .map(|raw| {
            let position = Vec2::random_in(&mut rng, bounds.x, bounds.y);
            Firefly::spawn(FireflyId(raw), position, &config.firefly, bounds, &mut rng).state(true)
        })
        .collect();
    c.bench_function("swarm_summary_max_population", |b| {
        b.iter(|| SwarmSummary::from_states(&states));
    });
}

criterion_group!(benches, bench_firefly_ticks, bench_swarm_summary);
criterion_main!(benches);
