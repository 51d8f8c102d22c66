// Benchmarks for the per-tick step.
//
// `tick` measures `Engine::tick()` alone over a steady scene and over a
// crossfade (both scenes voiced, the faded one silenced). `session` adds the
// store round trip and dispatch on top.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use diurnal_engine::command::RecordingHost;
use diurnal_engine::scene::SceneVolumes;
use diurnal_engine::session::Session;
use diurnal_engine::store::MemoryStore;
use diurnal_engine::tick::{Engine, TickInput};
use diurnal_engine::types::TimeOfDay;
use diurnal_prng::SeededRng;

fn crossfade_input() -> TickInput {
    let mut scene_volumes = SceneVolumes::new();
    scene_volumes.insert(TimeOfDay::Day, 0.5);
    scene_volumes.insert(TimeOfDay::Evening, 0.5);
    TickInput {
        scene_volumes,
        ..Default::default()
    }
}

fn bench_tick(c: &mut Criterion) {
    let engine = Engine::builtin().unwrap();
    let mut group = c.benchmark_group("tick");
    for (label, input) in [
        ("steady", TickInput::steady(TimeOfDay::Day)),
        ("crossfade", crossfade_input()),
    ] {
        group.bench_with_input(BenchmarkId::from_parameter(label), &input, |b, input| {
            let mut state = engine.seed_state().unwrap();
            let mut rng = SeededRng::new(42);
            b.iter(|| {
                let outcome = engine.tick(black_box(&state), input, &mut rng).unwrap();
                state = outcome.state;
                black_box(outcome.commands.len());
            });
        });
    }
    group.finish();
}

fn bench_session(c: &mut Criterion) {
    let input = TickInput::steady(TimeOfDay::Day);
    c.bench_function("session_tick", |b| {
        let mut session = Session::new(
            Engine::builtin().unwrap(),
            MemoryStore::new(),
            RecordingHost::new(),
            SeededRng::new(42),
        );
        b.iter(|| {
            black_box(session.run_tick(&input).unwrap());
            session.host_mut().commands.clear();
        });
    });
}

criterion_group!(benches, bench_tick, bench_session);
criterion_main!(benches);
