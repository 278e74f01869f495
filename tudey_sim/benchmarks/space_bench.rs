use std::sync::Arc;

use bevy::math::Vec2;
use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tudey_schema::ConfigReference;
use tudey_sim::{
    ConfigManager, HashSpace, Rect, SceneConfig, SceneManager, Shape, SimpleSpace, Space,
    SpaceElement, Transform2D, TudeySceneModel,
};

fn random_element(rng: &mut ChaCha8Rng, tag: usize, extent: f32) -> SpaceElement<usize> {
    let center = Vec2::new(rng.gen_range(-extent..extent), rng.gen_range(-extent..extent));
    let radius = if rng.gen_bool(0.05) {
        rng.gen_range(4.0..12.0)
    } else {
        rng.gen_range(0.1..1.0)
    };
    SpaceElement::with_transform(
        Shape::circle(Vec2::ZERO, radius),
        Transform2D::from_translation(center),
        tag,
    )
}

fn query_rects(rng: &mut ChaCha8Rng, extent: f32) -> Vec<Rect> {
    (0..64)
        .map(|_| {
            let center = Vec2::new(rng.gen_range(-extent..extent), rng.gen_range(-extent..extent));
            Rect::from_center(center, Vec2::splat(rng.gen_range(1.0..6.0)))
        })
        .collect()
}

fn fill<S: Space<usize>>(space: &mut S, count: usize, extent: f32) {
    let mut rng = ChaCha8Rng::seed_from_u64(count as u64);
    for tag in 0..count {
        space.add(random_element(&mut rng, tag, extent));
    }
}

fn bench_region_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("space_region_queries");
    for count in [256usize, 2048, 8192] {
        let extent = (count as f32).sqrt() * 2.0;
        let rects = query_rects(&mut ChaCha8Rng::seed_from_u64(7), extent);

        let mut hashed = HashSpace::new(2.0, 3);
        fill(&mut hashed, count, extent);
        group.bench_with_input(BenchmarkId::new("hash", count), &rects, |b, rects| {
            let mut results = Vec::new();
            b.iter(|| {
                for rect in rects {
                    results.clear();
                    hashed.get_elements(rect, &mut results);
                    black_box(results.len());
                }
            });
        });

        let mut simple = SimpleSpace::new();
        fill(&mut simple, count, extent);
        group.bench_with_input(BenchmarkId::new("simple", count), &rects, |b, rects| {
            let mut results = Vec::new();
            b.iter(|| {
                for rect in rects {
                    results.clear();
                    simple.get_elements(rect, &mut results);
                    black_box(results.len());
                }
            });
        });
    }
    group.finish();
}

fn bench_wandering_ticks(c: &mut Criterion) {
    let configs = Arc::new(ConfigManager::builtin());
    let mut group = c.benchmark_group("scene_ticks");
    for actors in [16usize, 128] {
        group.bench_with_input(BenchmarkId::new("wanderers", actors), &actors, |b, &actors| {
            b.iter_batched(
                || {
                    let mut manager = SceneManager::new(
                        SceneConfig::default(),
                        configs.clone(),
                        TudeySceneModel::new("bench"),
                    );
                    for index in 0..actors {
                        let x = (index % 16) as f32 * 3.0;
                        let y = (index / 16) as f32 * 3.0;
                        manager.spawn_actor(
                            &ConfigReference::new("actor/wanderer"),
                            Vec2::new(x, y),
                            0.0,
                        );
                    }
                    manager
                },
                |mut manager| {
                    for _ in 0..10 {
                        manager.tick();
                    }
                    black_box(manager.timestamp())
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_region_queries, bench_wandering_ticks);
criterion_main!(benches);
