// Data-driven engine configuration.
//
// All tunable parameters live in `EngineConfig`, loadable from JSON and with
// defaults matching the installation: timer ranges, coin-flip probabilities,
// crossfade thresholds, clip-buffer windows, the scale-mode and exemption
// policies, per-scene definitions (successor, fixed scale mode, motif window)
// and the instrument roster used to seed a fresh song state.
//
// The engine never uses magic numbers for these; it reads them from here.
// `validate()` checks the config against the lookup tables once at startup so
// a scene naming an unknown scale mode is caught before the first tick.
//
// See also: `tables.rs` for the musical data, `state.rs` for how the roster
// seeds instruments.

use crate::error::{EngineError, Result};
use crate::tables::Tables;
use crate::types::{InstrumentId, InstrumentRole, Pitch, TimeOfDay};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Inclusive range a countdown is reset into after it fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerRange {
    pub min: u32,
    pub max: u32,
}

impl TimerRange {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }
}

/// How a key change picks its scale mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleModePolicy {
    /// Use the current scene's fixed scale mode.
    SceneFixed,
    /// Uniform among the scale modes sharing the mood tag.
    MoodWeighted,
}

/// Which chord tones the scale correction leaves alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChordExemption {
    /// Offsets listed in the variation's ignore-list.
    IgnoreList,
    /// The note at this position of the variation's note list. Legacy rule;
    /// prefer `IgnoreList`.
    LegacyIndex(usize),
}

/// Static description of one scene.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneConfig {
    /// Successor in the timeline (the crossfade target).
    pub next: TimeOfDay,
    /// Scale mode a key change lands on while this scene is current.
    pub scale_mode: String,
    /// First slot of this scene's window in the 16-slot motif bank.
    pub motif_window_start: usize,
}

/// One instrument of the roster a fresh state is seeded from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSpec {
    pub name: InstrumentId,
    pub scene: TimeOfDay,
    pub role: InstrumentRole,
    pub base_note: Pitch,
    pub num_voices: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Ticks between key changes.
    pub key_change_timer: TimerRange,
    /// Ticks between chord changes.
    pub chord_change_timer: TimerRange,
    /// Bell trigger edges between event-instrument hits.
    pub bell_timer: TimerRange,

    /// Chance a chord change lands on a random variation instead of the
    /// chord's plain triad.
    pub random_variation_probability: f64,
    /// Chance a tick fires a melody motif.
    pub melody_probability: f64,
    /// Chance a tick fires the percussion hit.
    pub percussion_probability: f64,

    /// Below this volume the current scene counts as crossfading.
    pub transition_volume_threshold: f32,
    /// Above this volume a non-current scene is still audible and is not
    /// silenced.
    pub audible_volume_threshold: f32,

    pub note_velocity: u8,
    /// Beats of clip buffer cleared before scheduling a new motif.
    pub melody_clear_window: f64,
    /// Beats of clip buffer cleared when silencing a melody instrument.
    pub silence_clear_window: f64,

    pub scale_mode_policy: ScaleModePolicy,
    pub chord_exemption: ChordExemption,
    /// Chords that always correct against the scale mode, whatever the
    /// variation kind.
    pub borrowed_chords: Vec<String>,

    pub scenes: BTreeMap<TimeOfDay, SceneConfig>,
    /// Scene a freshly seeded state starts in.
    pub initial_scene: TimeOfDay,
    /// Scene a scene reset jumps to.
    pub reset_scene: TimeOfDay,

    /// Retrigger probability for stochastic sfx sources. Instruments not
    /// listed always retrigger.
    pub sfx_gates: BTreeMap<InstrumentId, f64>,

    pub roster: Vec<InstrumentSpec>,

    /// Harmony history rows a session keeps before dropping the oldest.
    /// `None` keeps every row.
    #[serde(default = "default_history_limit")]
    pub history_limit: Option<usize>,
}

fn default_history_limit() -> Option<usize> {
    Some(4096)
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn scene(&self, scene: TimeOfDay) -> Result<&SceneConfig> {
        self.scenes
            .get(&scene)
            .ok_or_else(|| EngineError::InvalidConfig(format!("no configuration for scene '{scene}'")))
    }

    /// Successor of `scene` in the timeline.
    pub fn next_scene(&self, scene: TimeOfDay) -> Result<TimeOfDay> {
        Ok(self.scene(scene)?.next)
    }

    /// Check internal consistency and consistency with the tables.
    pub fn validate(&self, tables: &Tables) -> Result<()> {
        for range in [self.key_change_timer, self.chord_change_timer, self.bell_timer] {
            if range.min > range.max {
                return Err(EngineError::InvalidConfig(format!(
                    "timer range {}..={} is empty",
                    range.min, range.max
                )));
            }
        }
        for (name, p) in [
            ("random_variation_probability", self.random_variation_probability),
            ("melody_probability", self.melody_probability),
            ("percussion_probability", self.percussion_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(EngineError::InvalidConfig(format!("{name} = {p} is not a probability")));
            }
        }
        for scene in TimeOfDay::ALL {
            let def = self.scene(scene)?;
            if !tables.has_scale_mode(&def.scale_mode) {
                return Err(EngineError::InvalidConfig(format!(
                    "scene '{scene}' uses unknown scale mode '{}'",
                    def.scale_mode
                )));
            }
        }
        let mut seen = BTreeSet::new();
        for spec in &self.roster {
            if !seen.insert(&spec.name) {
                return Err(EngineError::InvalidConfig(format!(
                    "instrument '{}' appears twice in the roster",
                    spec.name
                )));
            }
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        let scene = |next, scale_mode: &str, motif_window_start| SceneConfig {
            next,
            scale_mode: scale_mode.to_string(),
            motif_window_start,
        };
        let mut scenes = BTreeMap::new();
        scenes.insert(TimeOfDay::Morning, scene(TimeOfDay::Day, "lydian", 12));
        scenes.insert(TimeOfDay::Day, scene(TimeOfDay::Evening, "ionian", 0));
        scenes.insert(TimeOfDay::Evening, scene(TimeOfDay::Night, "mixolydian", 4));
        scenes.insert(TimeOfDay::Night, scene(TimeOfDay::Morning, "dorian", 8));

        let mut sfx_gates = BTreeMap::new();
        sfx_gates.insert(InstrumentId::new("crickets"), 0.3);

        Self {
            key_change_timer: TimerRange::new(20, 50),
            chord_change_timer: TimerRange::new(0, 4),
            bell_timer: TimerRange::new(1, 10),
            random_variation_probability: 0.5,
            melody_probability: 0.5,
            percussion_probability: 0.5,
            transition_volume_threshold: 0.65,
            audible_volume_threshold: 0.35,
            note_velocity: 100,
            melody_clear_window: 8.0,
            silence_clear_window: 16.0,
            scale_mode_policy: ScaleModePolicy::SceneFixed,
            chord_exemption: ChordExemption::IgnoreList,
            borrowed_chords: ["II", "III", "VI", "VII"].iter().map(|s| s.to_string()).collect(),
            scenes,
            initial_scene: TimeOfDay::Day,
            reset_scene: TimeOfDay::Night,
            sfx_gates,
            roster: default_roster(),
            history_limit: default_history_limit(),
        }
    }
}

fn default_roster() -> Vec<InstrumentSpec> {
    use InstrumentRole::*;
    use TimeOfDay::*;
    let spec = |name: &str, scene, role, base_note, num_voices| InstrumentSpec {
        name: InstrumentId::new(name),
        scene,
        role,
        base_note,
        num_voices,
    };
    vec![
        // Meditative morning.
        spec("synth_pad", Morning, Chords, 60, 4),
        spec("meditation_pad", Morning, Effects, 60, 1),
        spec("zen_bowl", Morning, Effects, 72, 4),
        spec("bass_drone", Morning, Bass, 24, 1),
        spec("morning_birds", Morning, Sfx, 0, 0),
        spec("wind_chimes", Morning, Event, 84, 0),
        // Retro day.
        spec("synth_melody", Day, Melody, 60, 0),
        spec("synth_pad_retro", Day, Chords, 60, 4),
        spec("synth_arpeggiator", Day, Effects, 60, 4),
        spec("bass_drone_retro", Day, Bass, 24, 1),
        spec("retro_kit", Day, Percussion, 36, 0),
        // Church evening.
        spec("choir_melody", Evening, Melody, 60, 0),
        spec("choir_ahs", Evening, Chords, 60, 4),
        spec("strings_hi", Evening, Chords, 72, 1),
        spec("strings_lo", Evening, Bass, 24, 1),
        spec("frame_drum", Evening, Percussion, 41, 0),
        // Night.
        spec("church_organ", Night, Chords, 60, 4),
        spec("chimes", Night, Effects, 60, 4),
        spec("night_melody", Night, Melody, 72, 0),
        spec("night_drone", Night, Bass, 24, 1),
        spec("crickets", Night, Sfx, 0, 0),
        spec("church_bell", Night, Event, 48, 0),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates_against_builtin_tables() {
        EngineConfig::default().validate(&Tables::builtin()).unwrap();
    }

    #[test]
    fn default_config_serializes() {
        let config = EngineConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let restored = EngineConfig::from_json(&json).unwrap();
        assert_eq!(restored.key_change_timer, TimerRange::new(20, 50));
        assert_eq!(restored.scenes, config.scenes);
        assert_eq!(restored.roster, config.roster);
        assert_eq!(restored.sfx_gates[&InstrumentId::new("crickets")], 0.3);
        assert_eq!(restored.history_limit, Some(4096));
    }

    #[test]
    fn history_limit_defaults_when_absent_and_null_means_unbounded() {
        let mut value = serde_json::to_value(EngineConfig::default()).unwrap();
        let fields = value.as_object_mut().unwrap();
        fields.remove("history_limit");
        let restored: EngineConfig = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(restored.history_limit, Some(4096));

        value.as_object_mut().unwrap().insert("history_limit".into(), serde_json::Value::Null);
        let unbounded: EngineConfig = serde_json::from_value(value).unwrap();
        assert_eq!(unbounded.history_limit, None);
    }

    #[test]
    fn scene_timeline_is_a_cycle() {
        let config = EngineConfig::default();
        let mut scene = TimeOfDay::Day;
        let mut visited = Vec::new();
        for _ in 0..4 {
            visited.push(scene);
            scene = config.next_scene(scene).unwrap();
        }
        assert_eq!(scene, TimeOfDay::Day);
        assert_eq!(
            visited,
            vec![TimeOfDay::Day, TimeOfDay::Evening, TimeOfDay::Night, TimeOfDay::Morning]
        );
    }

    #[test]
    fn unknown_scene_scale_mode_is_rejected() {
        let mut config = EngineConfig::default();
        config.scenes.get_mut(&TimeOfDay::Night).unwrap().scale_mode = "locrian".into();
        let err = config.validate(&Tables::builtin()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig(_)));
    }

    #[test]
    fn empty_timer_range_is_rejected() {
        let config = EngineConfig {
            chord_change_timer: TimerRange::new(5, 1),
            ..Default::default()
        };
        assert!(config.validate(&Tables::builtin()).is_err());
    }

    #[test]
    fn duplicate_roster_entry_is_rejected() {
        let mut config = EngineConfig::default();
        let dup = config.roster[0].clone();
        config.roster.push(dup);
        assert!(config.validate(&Tables::builtin()).is_err());
    }
}
