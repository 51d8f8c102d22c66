// Tick orchestration: one trigger edge in, one new song state and a command
// list out.
//
// `Engine::tick()` is a pure function `(state, input, rng) -> outcome`. It
// never touches the store or the host; `session.rs` commits the returned
// state and then dispatches the returned commands. The stage order is fixed:
//
// 1. Scene advance: the successor becomes current once the crossfade into it
//    has completed.
// 2. Harmony: decide the transition (key change / chord change / variation
//    shift) and its pitches.
// 3. Voice-leading: current and next scene instruments move from the previous
//    chord notes to the new ones, in the new key. The new notes then become
//    `chord_notes`.
// 4. Melody and percussion triggers for the current and next scene.
// 5. Scene cleanup: silence scenes that are neither current, next nor still
//    audible.
//
// PRNG draws follow the same order, which keeps a seeded session
// reproducible. Any error rejects the whole tick and the caller's state is
// left as it was.
//
// `EdgeTrigger` turns a sampled boolean control into rising edges; the host
// may hold the control high for several samples.

use crate::bell::{BellOutcome, ring_bells};
use crate::command::HostCommand;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::harmony::{HarmonyInput, TransitionKind, next_transition};
use crate::melody::{trigger_melody, trigger_percussion};
use crate::motif::MotifBank;
use crate::scene::{SceneVolumes, advance_scene, kill_instruments, volume_of};
use crate::state::{SceneInstruments, SongState};
use crate::tables::Tables;
use crate::types::TimeOfDay;
use crate::voicing::{PlaybackPositions, change_notes_for_scene};
use diurnal_prng::RandomSource;

/// Per-tick readings from the host.
#[derive(Clone, Debug, Default)]
pub struct TickInput {
    pub scene_volumes: SceneVolumes,
    pub playback: PlaybackPositions,
    /// Mood tag for mood-weighted scale mode selection.
    pub mood: Option<String>,
    /// Force this transition kind instead of consulting the countdowns.
    pub force: Option<TransitionKind>,
}

impl TickInput {
    /// Current scene fully up, everything else silent.
    pub fn steady(scene: TimeOfDay) -> Self {
        let mut scene_volumes = SceneVolumes::new();
        scene_volumes.insert(scene, 1.0);
        Self {
            scene_volumes,
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug)]
pub struct TickOutcome {
    pub state: SongState,
    pub commands: Vec<HostCommand>,
    pub transition: TransitionKind,
    /// Scene the timeline advanced into at the start of this tick.
    pub advanced_to: Option<TimeOfDay>,
}

/// Rising-edge detector over a sampled boolean control.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EdgeTrigger {
    level: bool,
}

impl EdgeTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one sample; `true` on a false → true transition.
    pub fn update(&mut self, level: bool) -> bool {
        let rising = level && !self.level;
        self.level = level;
        rising
    }
}

/// Everything the engine reads but never mutates.
#[derive(Clone, Debug)]
pub struct Engine {
    pub tables: Tables,
    pub config: EngineConfig,
    pub bank: MotifBank,
}

impl Engine {
    /// Validate `config` against `tables` and bundle them.
    pub fn new(tables: Tables, config: EngineConfig, bank: MotifBank) -> Result<Self> {
        config.validate(&tables)?;
        Ok(Self { tables, config, bank })
    }

    /// Built-in tables, default config and default motif bank.
    pub fn builtin() -> Result<Self> {
        Self::new(Tables::builtin(), EngineConfig::default(), MotifBank::default_bank())
    }

    /// The state a store with nothing in it stands for.
    pub fn seed_state(&self) -> Result<SongState> {
        SongState::seeded(&self.config, &self.tables)
    }

    pub fn tick(
        &self,
        state: &SongState,
        input: &TickInput,
        rng: &mut impl RandomSource,
    ) -> Result<TickOutcome> {
        let config = &self.config;
        let mut staged = state.clone();
        let mut commands = Vec::new();

        let advanced_to = advance_scene(staged.current_scene, &input.scene_volumes, config)?;
        if let Some(scene) = advanced_to {
            log::debug!("scene advance: {} -> {scene}", staged.current_scene);
            staged.current_scene = scene;
        }
        let current = staged.current_scene;
        let next = staged.next_scene(config)?;

        let harmony_input = HarmonyInput {
            mood: input.mood.as_deref(),
            force: input.force,
        };
        let transition = next_transition(&staged, &self.tables, config, harmony_input, rng)?;
        log::debug!(
            "{}: {} {} {} {} {:?}",
            transition.kind,
            transition.key,
            transition.scale_mode,
            transition.chord,
            transition.chord_variation,
            transition.chord_notes
        );
        let key_offset = self.tables.key(&transition.key)?.offset;
        let previous_notes = std::mem::take(&mut staged.chord_notes);
        staged.key = transition.key;
        staged.scale_mode = transition.scale_mode;
        staged.chord = transition.chord;
        staged.chord_variation = transition.chord_variation;
        staged.timers = transition.timers;

        for scene in [current, next] {
            let Some(instruments) = staged.instruments.get(&scene) else {
                continue;
            };
            let (updated, scene_commands): (SceneInstruments, _) = change_notes_for_scene(
                &previous_notes,
                &transition.chord_notes,
                key_offset,
                instruments,
                &input.playback,
                config,
                rng,
            );
            staged.instruments.insert(scene, updated);
            commands.extend(scene_commands);
        }
        staged.chord_notes = transition.chord_notes;

        let transitioning =
            volume_of(&input.scene_volumes, current) < config.transition_volume_threshold;
        let (active_melody, melody_commands) = trigger_melody(
            &staged,
            [current, next],
            transitioning,
            &self.bank,
            &self.tables,
            config,
            rng,
        )?;
        staged.active_melody = active_melody;
        commands.extend(melody_commands);
        commands.extend(trigger_percussion(&staged, [current, next], transition.kind, config, rng));

        let (instruments, kill_commands) =
            kill_instruments(&staged.instruments, current, next, &input.scene_volumes, config);
        staged.instruments = instruments;
        commands.extend(kill_commands);

        Ok(TickOutcome {
            state: staged,
            commands,
            transition: transition.kind,
            advanced_to,
        })
    }

    /// One bell trigger edge.
    pub fn bell(&self, state: &SongState, rng: &mut impl RandomSource) -> Result<BellOutcome> {
        ring_bells(state.clone(), &self.tables, &self.config, rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::HostAction;
    use crate::error::EngineError;
    use crate::types::InstrumentId;
    use diurnal_prng::{ScriptedRng, SeededRng};

    fn engine() -> Engine {
        Engine::builtin().unwrap()
    }

    #[test]
    fn edge_trigger_fires_on_rising_edges_only() {
        let mut edge = EdgeTrigger::new();
        let fired: Vec<bool> = [false, true, true, false, true, false, false]
            .iter()
            .map(|&level| edge.update(level))
            .collect();
        assert_eq!(fired, vec![false, true, false, false, true, false, false]);
    }

    #[test]
    fn forced_chord_change_moves_bass_to_iv() {
        let engine = engine();
        let mut state = engine.seed_state().unwrap();
        let bass = InstrumentId::new("bass_drone_retro");
        // The bass is sounding C (pitch class 0) over its base note.
        state
            .instruments
            .get_mut(&TimeOfDay::Day)
            .unwrap()
            .get_mut(&bass)
            .unwrap()
            .playing_notes = vec![24];
        let input = TickInput {
            force: Some(TransitionKind::ChordChange),
            ..TickInput::steady(TimeOfDay::Day)
        };
        // IV, plain triad, then no melody and no percussion.
        let mut rng = ScriptedRng::new([0], [0.9, 0.9, 0.9]);
        let outcome = engine.tick(&state, &input, &mut rng).unwrap();
        assert_eq!(outcome.state.chord, "IV");
        assert_eq!(outcome.state.chord_notes, vec![5, 9, 12]);
        let bass_inst = outcome.state.instrument(&bass).unwrap();
        assert_eq!(bass_inst.playing_notes, vec![29]);
        let bass_actions: Vec<_> = outcome
            .commands
            .iter()
            .filter(|c| c.instrument == bass)
            .map(|c| c.action.clone())
            .collect();
        assert_eq!(
            bass_actions,
            vec![HostAction::NoteOff { pitch: 24 }, HostAction::NoteOn { pitch: 29, velocity: 100 }]
        );
        assert_eq!(outcome.state.active_melody, None);
    }

    #[test]
    fn tick_leaves_input_state_untouched() {
        let engine = engine();
        let state = engine.seed_state().unwrap();
        let before = state.clone();
        let mut rng = SeededRng::new(1);
        let outcome = engine.tick(&state, &TickInput::steady(TimeOfDay::Day), &mut rng).unwrap();
        assert_eq!(state, before);
        assert_ne!(outcome.state, before);
    }

    #[test]
    fn unknown_chord_rejects_tick() {
        let engine = engine();
        let mut state = engine.seed_state().unwrap();
        state.chord = "IX".into();
        let mut rng = SeededRng::new(1);
        let err = engine.tick(&state, &TickInput::steady(TimeOfDay::Day), &mut rng).unwrap_err();
        assert!(matches!(err, EngineError::LookupMiss { .. }));
    }

    #[test]
    fn scene_advances_when_crossfade_completes() {
        let engine = engine();
        let state = engine.seed_state().unwrap();
        let mut rng = SeededRng::new(2);
        let outcome = engine.tick(&state, &TickInput::steady(TimeOfDay::Evening), &mut rng).unwrap();
        assert_eq!(outcome.advanced_to, Some(TimeOfDay::Evening));
        assert_eq!(outcome.state.current_scene, TimeOfDay::Evening);
    }

    #[test]
    fn chord_notes_track_transition() {
        let engine = engine();
        let mut state = engine.seed_state().unwrap();
        let mut rng = SeededRng::new(3);
        let input = TickInput::steady(TimeOfDay::Day);
        for _ in 0..100 {
            let outcome = engine.tick(&state, &input, &mut rng).unwrap();
            // Every chord instrument of the current scene sounds only chord
            // tones, in key.
            let key = engine.tables.key(&outcome.state.key).unwrap().offset;
            let classes: Vec<i32> = outcome
                .state
                .chord_notes
                .iter()
                .map(|p| (p + key).rem_euclid(12))
                .collect();
            for inst in outcome.state.instruments[&TimeOfDay::Day].values() {
                if inst.role == crate::types::InstrumentRole::Chords {
                    for p in &inst.playing_notes {
                        assert!(classes.contains(&(p - inst.base_note).rem_euclid(12)));
                    }
                }
            }
            state = outcome.state;
        }
    }

    #[test]
    fn same_seed_same_session() {
        let engine = engine();
        let run = |seed| {
            let mut state = engine.seed_state().unwrap();
            let mut rng = SeededRng::new(seed);
            let mut all = Vec::new();
            for _ in 0..50 {
                let outcome = engine.tick(&state, &TickInput::steady(TimeOfDay::Day), &mut rng).unwrap();
                all.extend(outcome.commands);
                state = outcome.state;
            }
            (state, all)
        };
        assert_eq!(run(77), run(77));
    }
}
