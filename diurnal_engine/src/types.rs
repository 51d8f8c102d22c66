// Core types shared across the engine.
//
// Pitches are plain `i32` semitone offsets from an implicit root of 0, so
// they can go negative or past an octave; pitch classes are `u8` in 0..=11.
// Scenes and instrument roles are closed enums so every engine stage has to
// match them exhaustively. Instrument identifiers are host-facing names
// wrapped in a newtype.
//
// All types derive `Serialize`/`Deserialize` (lower-case names on the wire)
// because they are persisted in the state store between ticks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A semitone offset. Negative and >11 values are absolute positions.
pub type Pitch = i32;

/// A pitch folded into a single octave, 0..=11.
pub type PitchClass = u8;

/// MIDI velocity used for every sustained chord note-on.
pub const NOTE_ON_VELOCITY: u8 = 100;

// ---------------------------------------------------------------------------
// Scenes
// ---------------------------------------------------------------------------

/// A time-of-day scene. Instruments are partitioned by scene; one scene is
/// current and its successor is the crossfade target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeOfDay {
    Morning,
    Day,
    Evening,
    Night,
}

impl TimeOfDay {
    pub const ALL: [TimeOfDay; 4] = [
        TimeOfDay::Morning,
        TimeOfDay::Day,
        TimeOfDay::Evening,
        TimeOfDay::Night,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TimeOfDay::Morning => "morning",
            TimeOfDay::Day => "day",
            TimeOfDay::Evening => "evening",
            TimeOfDay::Night => "night",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        TimeOfDay::ALL.into_iter().find(|s| s.name() == name)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Instruments
// ---------------------------------------------------------------------------

/// What an instrument does. Every engine stage dispatches on this.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentRole {
    /// Sustains the chord root.
    Bass,
    /// Sustains `num_voices` voice-led chord tones.
    Chords,
    /// Voice-led like `Chords`, typically pads and textures.
    Effects,
    /// Plays motifs from the bank through its clip buffer.
    Melody,
    /// Single hits at its base note.
    Percussion,
    /// Looping sound-effect clips retriggered when they stop.
    Sfx,
    /// Bell-style one-shot chord tones on the event timer.
    Event,
}

/// Host-facing instrument name, e.g. `"synth_pad"`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentId(pub String);

impl InstrumentId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstrumentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_names_roundtrip() {
        for scene in TimeOfDay::ALL {
            assert_eq!(TimeOfDay::from_name(scene.name()), Some(scene));
        }
        assert_eq!(TimeOfDay::from_name("noon"), None);
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&InstrumentRole::Percussion).unwrap();
        assert_eq!(json, "\"percussion\"");
        let id: InstrumentId = serde_json::from_str("\"zen_bowl\"").unwrap();
        assert_eq!(id.as_str(), "zen_bowl");
    }
}
