// Diurnal offline simulator: CLI entry point.
//
// Runs a session without the installation's host: a simulated clock raises
// the tick and bell controls, a simulated mixer crossfades each scene into its
// successor, and a `MidiRecorder` stands in for the instruments. The result is
// written as a multi-track MIDI file.
//
// Usage:
//   cargo run -p diurnal_engine --bin simulate -- [--ticks N] [--seed N]
//     [--ticks-per-scene N] [--beats-per-tick B] [--tempo BPM]
//     [--config FILE] [--tables FILE] [--motifs FILE] [--state FILE]
//     [--history FILE] [--out FILE]
//
// Logging goes through env_logger; set RUST_LOG=debug for per-stage detail.

use clap::Parser;
use diurnal_engine::config::EngineConfig;
use diurnal_engine::midi::MidiRecorder;
use diurnal_engine::motif::MotifBank;
use diurnal_engine::scene::SceneVolumes;
use diurnal_engine::session::Session;
use diurnal_engine::store::{JsonFileStore, MemoryStore, StateStore};
use diurnal_engine::tables::Tables;
use diurnal_engine::tick::{Engine, TickInput};
use diurnal_engine::types::{InstrumentId, InstrumentRole, TimeOfDay};
use diurnal_engine::voicing::PlaybackPositions;
use diurnal_prng::SeededRng;
use env_logger::Env;
use std::path::PathBuf;

/// Run the Diurnal sequencer offline and render it to MIDI.
#[derive(Parser, Debug)]
#[command(name = "simulate")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Number of tick edges to run
    #[arg(long, default_value_t = 256)]
    ticks: u64,

    /// PRNG seed
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Ticks each scene holds before it has crossfaded into the next
    #[arg(long, default_value_t = 64)]
    ticks_per_scene: u64,

    /// Beats of music between tick edges
    #[arg(long, default_value_t = 4.0)]
    beats_per_tick: f64,

    /// Tempo of the MIDI file
    #[arg(long, default_value_t = 90)]
    tempo: u32,

    /// Engine configuration (JSON); defaults to the built-in one
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Lookup tables (JSON); defaults to the built-in ones
    #[arg(long, value_name = "FILE")]
    tables: Option<PathBuf>,

    /// Motif bank (JSON); defaults to the built-in one
    #[arg(long, value_name = "FILE")]
    motifs: Option<PathBuf>,

    /// Persist the song state in this file instead of in memory
    #[arg(long, value_name = "FILE")]
    state: Option<PathBuf>,

    /// Write the harmony history here as JSON
    #[arg(long, value_name = "FILE")]
    history: Option<PathBuf>,

    /// MIDI output path
    #[arg(long, value_name = "FILE", default_value = "diurnal.mid")]
    out: PathBuf,
}

/// Scene volumes for step `step` of a scene lasting `length` ticks. The last
/// quarter of the scene crossfades linearly into `next`.
fn crossfade(current: TimeOfDay, next: TimeOfDay, step: u64, length: u64) -> SceneVolumes {
    let fade = (length / 4).max(1);
    let fade_start = length.saturating_sub(fade);
    let mut volumes = SceneVolumes::new();
    if step < fade_start {
        volumes.insert(current, 1.0);
    } else {
        let t = (step - fade_start + 1) as f32 / fade as f32;
        volumes.insert(current, (1.0 - t).max(0.0));
        volumes.insert(next, t.min(1.0));
    }
    volumes
}

fn run<S: StateStore>(args: &Args, engine: Engine, store: S) -> Result<(), Box<dyn std::error::Error>> {
    let sfx: Vec<InstrumentId> = engine
        .config
        .roster
        .iter()
        .filter(|spec| spec.role == InstrumentRole::Sfx)
        .map(|spec| spec.name.clone())
        .collect();
    let recorder = MidiRecorder::new(args.tempo);
    let mut session = Session::new(engine, store, recorder, SeededRng::new(args.seed));

    let mut scene = session.load_state()?.current_scene;
    let mut step = 0;
    let length = args.ticks_per_scene.max(1);
    let mut rejected = 0;

    for tick in 0..args.ticks {
        let next = session.engine().config.next_scene(scene)?;
        let mut playback = PlaybackPositions::new();
        for name in &sfx {
            // Clips run for four ticks, then report stopped.
            playback.insert(name.clone(), (tick % 4) as f64);
        }
        let input = TickInput {
            scene_volumes: crossfade(scene, next, step, length),
            playback,
            ..Default::default()
        };

        session.on_tick_signal(false, &input)?;
        match session.on_tick_signal(true, &input) {
            Ok(Some(report)) => {
                if let Some(advanced) = report.advanced_to {
                    log::info!("scene {scene} -> {advanced}");
                }
            }
            Ok(None) => {}
            Err(e) => {
                rejected += 1;
                log::warn!("tick {tick}: {e}");
            }
        }
        session.on_bell_signal(false)?;
        session.on_bell_signal(true)?;

        step += 1;
        if step >= length {
            step = 0;
            scene = next;
        }
        session.host_mut().advance(args.beats_per_tick);
    }

    let (_, recorder, history) = session.into_parts();
    recorder.write(&args.out)?;
    let (keys, chords, shifts) = history.kind_counts();
    println!(
        "{} ticks ({} rejected): {} key changes, {} chord changes, {} variation shifts",
        args.ticks, rejected, keys, chords, shifts
    );
    println!("MIDI written to {}", args.out.display());
    if let Some(path) = &args.history {
        let rows: Vec<_> = history.iter().collect();
        std::fs::write(path, serde_json::to_string_pretty(&rows)?)?;
        println!("History written to {}", path.display());
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let tables = match &args.tables {
        Some(path) => Tables::load(path)?,
        None => Tables::builtin(),
    };
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let bank = match &args.motifs {
        Some(path) => MotifBank::load(path)?,
        None => MotifBank::default_bank(),
    };
    let engine = Engine::new(tables, config, bank)?;

    match &args.state {
        Some(path) => run(&args, engine, JsonFileStore::open(path)?),
        None => run(&args, engine, MemoryStore::new()),
    }
}
