// End-to-end tests for the session pipeline.
//
// Each test drives a real `Session` (store + host + PRNG) through trigger
// edges and checks the path load → step → commit → dispatch from the
// outside: what the store holds afterwards and what the host received.

use diurnal_engine::command::{HostAction, RecordingHost};
use diurnal_engine::config::EngineConfig;
use diurnal_engine::error::EngineError;
use diurnal_engine::harmony::TransitionKind;
use diurnal_engine::motif::MotifBank;
use diurnal_engine::session::Session;
use diurnal_engine::store::{self, JsonFileStore, MemoryStore, StateStore};
use diurnal_engine::tables::Tables;
use diurnal_engine::tick::{Engine, TickInput};
use diurnal_engine::types::TimeOfDay;
use diurnal_prng::{RandomSource, ScriptedRng, SeededRng};
use serde_json::json;

fn session_with<R: RandomSource>(rng: R) -> Session<MemoryStore, RecordingHost, R> {
    Session::new(Engine::builtin().unwrap(), MemoryStore::new(), RecordingHost::new(), rng)
}

// ---------------------------------------------------------------------------
// Triggers
// ---------------------------------------------------------------------------

#[test]
fn ticks_run_on_rising_edges_only() {
    let mut session = session_with(SeededRng::new(5));
    let input = TickInput::steady(TimeOfDay::Day);

    assert!(session.on_tick_signal(true, &input).unwrap().is_some());
    assert!(session.on_tick_signal(true, &input).unwrap().is_none());
    assert!(session.on_tick_signal(false, &input).unwrap().is_none());
    let report = session.on_tick_signal(true, &input).unwrap().unwrap();

    assert_eq!(report.tick, 2);
    assert_eq!(session.ticks(), 2);
    assert_eq!(session.history().len(), 2);
}

#[test]
fn bell_edges_are_independent_of_tick_edges() {
    let mut session = session_with(SeededRng::new(6));
    let input = TickInput::steady(TimeOfDay::Day);
    session.on_tick_signal(true, &input).unwrap();

    assert!(session.on_bell_signal(true).unwrap().is_some());
    assert!(session.on_bell_signal(true).unwrap().is_none());
    assert_eq!(session.ticks(), 1);
}

// ---------------------------------------------------------------------------
// Commit and dispatch
// ---------------------------------------------------------------------------

#[test]
fn forced_chord_change_reaches_store_and_host() {
    // IV, plain triad, then no melody and no percussion.
    let rng = ScriptedRng::new([0], [0.9, 0.9, 0.9]);
    let mut session = session_with(rng);
    let input = TickInput {
        force: Some(TransitionKind::ChordChange),
        ..TickInput::steady(TimeOfDay::Day)
    };

    let report = session.run_tick(&input).unwrap();
    assert_eq!(report.transition, TransitionKind::ChordChange);
    assert_eq!(report.record.chord, "IV");

    assert_eq!(session.store().fetch(store::CHORD).unwrap(), Some(json!("IV")));
    assert_eq!(session.store().fetch(store::CHORD_NOTES).unwrap(), Some(json!([5, 9, 12])));

    let bass: Vec<_> = session.host().for_instrument("bass_drone_retro").cloned().collect();
    assert_eq!(bass, vec![HostAction::NoteOn { pitch: 29, velocity: 100 }]);

    let state = session.load_state().unwrap();
    let bass_inst = state.instrument(&"bass_drone_retro".into()).unwrap();
    assert_eq!(bass_inst.playing_notes, vec![29]);
}

#[test]
fn unknown_chord_rejects_the_tick_without_side_effects() {
    let mut session = session_with(SeededRng::new(7));
    let input = TickInput::steady(TimeOfDay::Day);
    session.run_tick(&input).unwrap();
    let host_before = session.host().commands.len();

    let (mut saved, host, _) = session.into_parts();
    saved.store(store::CHORD, json!("IX")).unwrap();
    let snapshot = saved.clone();
    let mut session = Session::new(Engine::builtin().unwrap(), saved, host, SeededRng::new(7));

    let err = session.run_tick(&input).unwrap_err();
    assert!(matches!(err, EngineError::LookupMiss { .. }));
    assert_eq!(session.store(), &snapshot);
    assert_eq!(session.host().commands.len(), host_before);
    assert!(session.history().is_empty());
    assert_eq!(session.ticks(), 0);
}

#[test]
fn missing_store_keys_fall_back_per_field() {
    let mut saved = MemoryStore::new();
    saved.store(store::KEY, json!("G")).unwrap();
    let session = Session::new(Engine::builtin().unwrap(), saved, RecordingHost::new(), SeededRng::new(1));

    let state = session.load_state().unwrap();
    let seeded = session.engine().seed_state().unwrap();
    assert_eq!(state.key, "G");
    assert_eq!(state.chord, seeded.chord);
    assert_eq!(state.instruments, seeded.instruments);
}

#[test]
fn commit_writes_every_state_key() {
    let mut session = session_with(SeededRng::new(8));
    session.run_tick(&TickInput::steady(TimeOfDay::Day)).unwrap();
    for key in store::STATE_KEYS {
        assert!(session.store().fetch(key).unwrap().is_some(), "missing {key}");
    }
}

// ---------------------------------------------------------------------------
// Panic, reset, telemetry
// ---------------------------------------------------------------------------

#[test]
fn panic_silences_every_instrument() {
    let mut session = session_with(SeededRng::new(9));
    let input = TickInput::steady(TimeOfDay::Day);
    for _ in 0..8 {
        session.run_tick(&input).unwrap();
    }
    let dispatched = session.host().commands.len();

    session.panic().unwrap();
    assert!(session.host().commands.len() > dispatched);
    let state = session.load_state().unwrap();
    for scene in state.instruments.values() {
        for inst in scene.values() {
            assert!(inst.playing_notes.is_empty());
        }
    }
}

#[test]
fn reset_lands_in_the_reset_scene() {
    let mut session = session_with(SeededRng::new(10));
    let input = TickInput::steady(TimeOfDay::Day);
    for _ in 0..4 {
        session.run_tick(&input).unwrap();
    }

    assert_eq!(session.history().len(), 4);

    session.reset().unwrap();
    let state = session.load_state().unwrap();
    assert_eq!(state.current_scene, TimeOfDay::Night);
    assert_eq!(state.active_melody, None);
    assert!(session.history().is_empty());

    let frame = session.telemetry().unwrap();
    assert_eq!(frame.get("scene"), Some(3));
    assert_eq!(frame.get("key"), Some(0));
    assert_eq!(frame.get("active_melody"), Some(0));
}

#[test]
fn history_after_reset_starts_over() {
    let mut session = session_with(SeededRng::new(13));
    let input = TickInput::steady(TimeOfDay::Day);
    for _ in 0..5 {
        session.run_tick(&input).unwrap();
    }
    session.reset().unwrap();

    let report = session.run_tick(&TickInput::steady(TimeOfDay::Night)).unwrap();
    assert_eq!(session.history().len(), 1);
    assert_eq!(session.history().last(), Some(&report.record));
}

#[test]
fn history_is_bounded_by_config() {
    let config = EngineConfig {
        history_limit: Some(3),
        ..EngineConfig::default()
    };
    let engine = Engine::new(Tables::builtin(), config, MotifBank::default_bank()).unwrap();
    let mut session = Session::new(engine, MemoryStore::new(), RecordingHost::new(), SeededRng::new(14));
    let input = TickInput::steady(TimeOfDay::Day);
    for _ in 0..10 {
        session.run_tick(&input).unwrap();
    }
    let ticks: Vec<u64> = session.history().iter().map(|r| r.tick).collect();
    assert_eq!(ticks, vec![8, 9, 10]);
}

#[test]
fn telemetry_tracks_committed_voices() {
    let mut session = session_with(SeededRng::new(11));
    session.run_tick(&TickInput::steady(TimeOfDay::Day)).unwrap();
    let state = session.load_state().unwrap();
    let frame = session.telemetry().unwrap();

    for scene in state.instruments.values() {
        for (name, inst) in scene {
            for (n, &pitch) in inst.playing_notes.iter().enumerate() {
                assert_eq!(frame.get(&format!("{name}_note{n}")), Some(pitch));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[test]
fn file_store_carries_state_across_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let input = TickInput::steady(TimeOfDay::Day);

    let final_state = {
        let saved = JsonFileStore::open(&path).unwrap();
        let mut session = Session::new(Engine::builtin().unwrap(), saved, RecordingHost::new(), SeededRng::new(12));
        for _ in 0..6 {
            session.run_tick(&input).unwrap();
        }
        session.load_state().unwrap()
    };

    let saved = JsonFileStore::open(&path).unwrap();
    let session = Session::new(Engine::builtin().unwrap(), saved, RecordingHost::new(), SeededRng::new(99));
    assert_eq!(session.load_state().unwrap(), final_state);
}

#[test]
fn seeded_sessions_replay_identically() {
    let run = |seed| {
        let mut session = session_with(SeededRng::new(seed));
        let input = TickInput::steady(TimeOfDay::Day);
        for _ in 0..40 {
            session.run_tick(&input).unwrap();
            session.run_bell().unwrap();
        }
        let (saved, host, _) = session.into_parts();
        (saved, host.commands)
    };
    assert_eq!(run(21), run(21));
}
