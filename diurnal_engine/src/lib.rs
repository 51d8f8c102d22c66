// diurnal_engine: harmonic sequencer for a four-scene day/night installation.
//
// On each tick edge the engine walks a key / scale mode / chord / chord
// variation state machine, voice-leads every sounding instrument of the
// current and next scene to the new chord, queues melody motifs and
// percussion hits, and silences scenes that have faded out. A separate bell
// edge strikes the event instruments on a chord tone.
//
// Module overview:
// - `types.rs`:     TimeOfDay, InstrumentRole, InstrumentId, pitch aliases.
// - `error.rs`:     EngineError + Result alias.
// - `pitch.rs`:     Pitch-class arithmetic, closest-pitch search, scale fitting.
// - `tables.rs`:    Keys, scale modes, chords and chord variations (data/tables.json).
// - `config.rs`:    EngineConfig: timers, probabilities, scenes, instrument roster.
// - `state.rs`:     SongState, the per-scene instrument registry, countdown timers.
// - `store.rs`:     StateStore trait, in-memory and JSON-file stores.
// - `command.rs`:   HostCommand / HostAction, the InstrumentHost seam.
// - `harmony.rs`:   Transition selection and chord pitch construction.
// - `voicing.rs`:   Voice-leading and per-role note changes.
// - `motif.rs`:     The 16-slot motif bank and slot selection.
// - `melody.rs`:    Motif rendering, melody and percussion triggers.
// - `bell.rs`:      Bell strikes for event instruments.
// - `scene.rs`:     Scene advance, silencing, panic and full reset.
// - `tick.rs`:      Engine: the pure per-tick step, edge triggers.
// - `session.rs`:   Session: load, step, commit, dispatch.
// - `event.rs`:     Harmony history rows.
// - `telemetry.rs`: Integer-coded show-control frames.
// - `midi.rs`:      MidiRecorder, an offline host that writes SMF files.
//
// **Determinism.** `Engine::tick()` is a pure function
// `(state, input, rng) -> (new_state, commands)`. All randomness comes from
// a `diurnal_prng::RandomSource`; collections are `BTreeMap` so iteration
// order (and therefore draw order) is stable.

pub mod bell;
pub mod command;
pub mod config;
pub mod error;
pub mod event;
pub mod harmony;
pub mod melody;
pub mod midi;
pub mod motif;
pub mod pitch;
pub use diurnal_prng as prng;
pub mod scene;
pub mod session;
pub mod state;
pub mod store;
pub mod tables;
pub mod telemetry;
pub mod tick;
pub mod types;
pub mod voicing;
