use fireflies_core::{
    Firefly, FireflyId, FireflySettings, Forces, GardenConfig, Lantern, SwarmSummary, Vec2,
    Vitality, WindState,
};
use rand::{SeedableRng, rngs::SmallRng};

const BOUNDS: Vec2 = Vec2::new(1024.0, 768.0);

fn long_lived() -> FireflySettings {
    FireflySettings {
        lifespan_min: 1_000.0,
        lifespan_max: 1_000.0,
        ..FireflySettings::default()
    }
}

fn swarm_around(centre: Vec2, radius: f32, count: u64, rng: &mut SmallRng) -> Vec<Firefly> {
    let settings = long_lived();
    (0..count)
        .map(|raw| {
            let angle = raw as f32 / count as f32 * std::f32::consts::TAU;
            let position = centre + Vec2::new(angle.cos(), angle.sin()) * radius;
            Firefly::spawn(FireflyId(raw + 1), position, &settings, BOUNDS, rng)
        })
        .collect()
}

fn mean_distance(swarm: &[Firefly], point: Vec2) -> f32 {
    swarm.iter().map(|f| f.position().distance(point)).sum::<f32>() / swarm.len() as f32
}

#[test]
fn attraction_point_draws_the_swarm_in() {
    let mut rng = SmallRng::seed_from_u64(0xA77);
    let centre = Vec2::new(512.0, 384.0);
    let mut swarm = swarm_around(centre, 200.0, 24, &mut rng);
    let before = mean_distance(&swarm, centre);
    let forces = Forces {
        attraction: Some(centre),
        ..Forces::default()
    };

    for _ in 0..1_200 {
        for firefly in &mut swarm {
            assert_eq!(firefly.tick(1.0 / 60.0, &forces, &mut rng), Vitality::Alive);
        }
    }

    let after = mean_distance(&swarm, centre);
    assert!(
        after < before - 20.0,
        "expected the swarm to close in: before {before}, after {after}"
    );
}

#[test]
fn lantern_keeps_nearby_fireflies_inside_its_radius() {
    let mut rng = SmallRng::seed_from_u64(0x1A7);
    let lantern = Lantern::new(Vec2::new(300.0, 300.0), 120.0);
    let lanterns = [lantern];
    let mut swarm = swarm_around(lantern.position(), 50.0, 12, &mut rng);
    let forces = Forces {
        lanterns: &lanterns,
        ..Forces::default()
    };

    for _ in 0..1_800 {
        for firefly in &mut swarm {
            firefly.tick(1.0 / 60.0, &forces, &mut rng);
        }
    }

    for firefly in &swarm {
        let distance = firefly.position().distance(lantern.position());
        assert!(
            distance < lantern.radius(),
            "{} drifted to {distance}",
            firefly.id()
        );
    }
}

#[test]
fn seeded_runs_are_reproducible() {
    let config = GardenConfig {
        rng_seed: Some(99),
        ..GardenConfig::default()
    };
    let run = || {
        let mut rng = config.seeded_rng();
        let mut wind = WindState::new(config.wind.strength);
        let mut firefly = Firefly::spawn(
            FireflyId(1),
            Vec2::new(10.0, 10.0),
            &config.firefly,
            BOUNDS,
            &mut rng,
        );
        let mut states = Vec::new();
        for step in 0..300 {
            if step % 60 == 0 {
                wind.shuffle(&mut rng);
            }
            let forces = Forces {
                wind: Some(wind.force()),
                ..Forces::default()
            };
            firefly.tick(config.dt(), &forces, &mut rng);
            states.push(firefly.state(true));
        }
        SwarmSummary::from_states(&states)
    };
    assert_eq!(run(), run());
}
