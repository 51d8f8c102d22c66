// Song state: the persisted musical state the engine threads through a tick.
//
// `SongState` holds the harmonic descriptor (key, scale mode, chord, chord
// variation, chord notes), the scene timeline position, the active motif, the
// transition countdowns and every instrument's voice assignment. It is an
// owned value: each engine stage takes the staged state and returns a new
// one, and only `session.rs` writes it back to the store.
//
// `chord_notes` always equals the pitch set last handed to voice-leading; a
// transition's new notes become `chord_notes` only after voice-leading ran.
//
// Instruments are keyed scene → name in `BTreeMap`s so iteration order (and
// therefore command order and PRNG draw order) is deterministic.

use crate::config::{EngineConfig, InstrumentSpec};
use crate::error::Result;
use crate::tables::{TONIC_CHORD, TONIC_VARIATION, Tables};
use crate::types::{InstrumentId, InstrumentRole, Pitch, TimeOfDay};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One instrument's static parameters and current voices.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub base_note: Pitch,
    pub num_voices: usize,
    pub role: InstrumentRole,
    pub scene: TimeOfDay,
    /// Exactly the absolute pitches with an outstanding note-on.
    pub playing_notes: Vec<Pitch>,
}

impl Instrument {
    pub fn from_spec(spec: &InstrumentSpec) -> Self {
        Self {
            base_note: spec.base_note,
            num_voices: spec.num_voices,
            role: spec.role,
            scene: spec.scene,
            playing_notes: Vec::new(),
        }
    }

    /// Snapshot with a different voice set; everything else unchanged.
    pub fn with_playing_notes(&self, playing_notes: Vec<Pitch>) -> Self {
        Self {
            playing_notes,
            ..self.clone()
        }
    }

    pub fn is_sounding(&self) -> bool {
        !self.playing_notes.is_empty()
    }
}

/// The instruments of one scene, by name.
pub type SceneInstruments = BTreeMap<InstrumentId, Instrument>;

/// Every instrument, partitioned by scene.
pub type InstrumentRegistry = BTreeMap<TimeOfDay, SceneInstruments>;

/// Transition countdowns, in ticks (bell: in bell trigger edges).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timers {
    pub key_change: u32,
    pub chord_change: u32,
    pub bell: u32,
}

/// Observe a countdown: `true` if it is due (at zero), otherwise decrement it.
pub fn observe_countdown(countdown: &mut u32) -> bool {
    if *countdown == 0 {
        true
    } else {
        *countdown -= 1;
        false
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SongState {
    pub key: String,
    pub scale_mode: String,
    pub chord: String,
    pub chord_variation: String,
    pub chord_notes: Vec<Pitch>,
    pub current_scene: TimeOfDay,
    /// Bank slot of the motif fired on the last tick, if any.
    pub active_melody: Option<usize>,
    pub timers: Timers,
    pub instruments: InstrumentRegistry,
}

impl SongState {
    /// A fresh state: key C, the initial scene's scale mode, the tonic chord
    /// with its tonic triad, the configured roster with no voices sounding.
    /// Countdowns start at the top of the key-change range and the bottom of
    /// the others.
    pub fn seeded(config: &EngineConfig, tables: &Tables) -> Result<Self> {
        let scale_mode_name = &config.scene(config.initial_scene)?.scale_mode;
        let scale_mode = tables.scale_mode(scale_mode_name)?;
        let mut instruments = InstrumentRegistry::new();
        for scene in TimeOfDay::ALL {
            instruments.insert(scene, SceneInstruments::new());
        }
        for spec in &config.roster {
            instruments
                .entry(spec.scene)
                .or_default()
                .insert(spec.name.clone(), Instrument::from_spec(spec));
        }
        Ok(Self {
            key: "C".to_string(),
            scale_mode: scale_mode.name.clone(),
            chord: TONIC_CHORD.to_string(),
            chord_variation: TONIC_VARIATION.to_string(),
            chord_notes: scale_mode.tonic_triad(),
            current_scene: config.initial_scene,
            active_melody: None,
            timers: Timers {
                key_change: config.key_change_timer.max,
                chord_change: config.chord_change_timer.min,
                bell: config.bell_timer.min,
            },
            instruments,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// The crossfade target of the current scene.
    pub fn next_scene(&self, config: &EngineConfig) -> Result<TimeOfDay> {
        config.next_scene(self.current_scene)
    }

    pub fn scene_instruments(&self, scene: TimeOfDay) -> Option<&SceneInstruments> {
        self.instruments.get(&scene)
    }

    pub fn instrument(&self, name: &InstrumentId) -> Option<&Instrument> {
        self.instruments.values().find_map(|scene| scene.get(name))
    }

    /// Every (scene, name, instrument) with the given role, in registry order.
    pub fn instruments_with_role(
        &self,
        role: InstrumentRole,
    ) -> impl Iterator<Item = (TimeOfDay, &InstrumentId, &Instrument)> {
        self.instruments.iter().flat_map(move |(scene, instruments)| {
            instruments
                .iter()
                .filter(move |(_, inst)| inst.role == role)
                .map(move |(name, inst)| (*scene, name, inst))
        })
    }
}
