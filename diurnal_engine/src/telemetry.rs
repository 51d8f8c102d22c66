// Show-control telemetry: the song state as a flat frame of integers.
//
// The lighting rig only understands numbers, so every symbolic field is sent
// as a fixed code from the tables below, and every sounding voice as its own
// channel named `<instrument>_note<n>`. The codes are part of the show
// file's contract and must not be renumbered.
//
// Active melody is sent as slot + 1, with 0 for "no motif this tick".
//
// Transport (OSC or anything else) is the host's business; this module only
// builds the frame.

use crate::error::{EngineError, Result};
use crate::state::SongState;
use crate::types::TimeOfDay;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const KEY_CODES: &[(&str, i32)] = &[
    ("C", 0),
    ("C#", 1),
    ("D", 2),
    ("D#", 3),
    ("E", 4),
    ("F", 5),
    ("F#", 6),
    ("G", 7),
    ("G#", 8),
    ("A", 9),
    ("A#", 10),
    ("B", 11),
];

const SCALE_MODE_CODES: &[(&str, i32)] =
    &[("lydian", 0), ("ionian", 1), ("mixolydian", 2), ("dorian", 3)];

const CHORD_CODES: &[(&str, i32)] = &[
    ("I", 0),
    ("ii", 1),
    ("iii", 2),
    ("IV", 3),
    ("V", 4),
    ("vi", 5),
    ("vii*", 6),
    ("VI", 7),
    ("II", 8),
    ("III", 9),
    ("VII", 10),
];

const VARIATION_CODES: &[(&str, i32)] = &[
    ("major triad", 0),
    ("minor triad", 1),
    ("diminished triad", 2),
    ("augmented triad", 3),
    ("sus2", 4),
    ("sus4", 5),
    ("6", 6),
    ("dominant 7", 7),
    ("major 7", 8),
    ("half-diminished 7", 9),
    ("diminished 7", 10),
    ("add9", 11),
];

fn code(table: &[(&str, i32)], field: &'static str, value: &str) -> Result<i32> {
    table
        .iter()
        .find(|(name, _)| *name == value)
        .map(|(_, code)| *code)
        .ok_or_else(|| EngineError::TelemetryCode {
            field,
            value: value.to_string(),
        })
}

pub fn scene_code(scene: TimeOfDay) -> i32 {
    match scene {
        TimeOfDay::Morning => 0,
        TimeOfDay::Day => 1,
        TimeOfDay::Evening => 2,
        TimeOfDay::Night => 3,
    }
}

/// One telemetry snapshot, channel name → value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    pub channels: BTreeMap<String, i32>,
}

impl TelemetryFrame {
    pub fn capture(state: &SongState) -> Result<Self> {
        let mut channels = BTreeMap::new();
        channels.insert("key".to_string(), code(KEY_CODES, "key", &state.key)?);
        channels.insert(
            "scale_mode".to_string(),
            code(SCALE_MODE_CODES, "scale mode", &state.scale_mode)?,
        );
        channels.insert("scene".to_string(), scene_code(state.current_scene));
        channels.insert("chord".to_string(), code(CHORD_CODES, "chord", &state.chord)?);
        channels.insert(
            "chord_variation".to_string(),
            code(VARIATION_CODES, "chord variation", &state.chord_variation)?,
        );
        let melody = state.active_melody.map_or(0, |slot| slot as i32 + 1);
        channels.insert("active_melody".to_string(), melody);
        for scene in state.instruments.values() {
            for (name, inst) in scene {
                for (n, &pitch) in inst.playing_notes.iter().enumerate() {
                    channels.insert(format!("{name}_note{n}"), pitch);
                }
            }
        }
        Ok(Self { channels })
    }

    pub fn get(&self, channel: &str) -> Option<i32> {
        self.channels.get(channel).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::tables::Tables;
    use crate::types::InstrumentId;

    fn seeded() -> SongState {
        SongState::seeded(&EngineConfig::default(), &Tables::builtin()).unwrap()
    }

    #[test]
    fn every_builtin_name_has_a_code() {
        let tables = Tables::builtin();
        for name in tables.variation_names() {
            code(VARIATION_CODES, "chord variation", name).unwrap();
        }
        for (name, _) in CHORD_CODES {
            tables.chord(name).unwrap();
        }
        for (name, offset) in KEY_CODES {
            assert_eq!(tables.key(name).unwrap().offset, *offset);
        }
    }

    #[test]
    fn frame_of_seeded_state() {
        let mut state = seeded();
        state.chord = "VI".into();
        state.active_melody = Some(3);
        let pad = InstrumentId::new("synth_pad_retro");
        state
            .instruments
            .get_mut(&TimeOfDay::Day)
            .unwrap()
            .get_mut(&pad)
            .unwrap()
            .playing_notes = vec![60, 64];
        let frame = TelemetryFrame::capture(&state).unwrap();
        assert_eq!(frame.get("key"), Some(0));
        assert_eq!(frame.get("scale_mode"), Some(1));
        assert_eq!(frame.get("scene"), Some(1));
        assert_eq!(frame.get("chord"), Some(7));
        assert_eq!(frame.get("active_melody"), Some(4));
        assert_eq!(frame.get("synth_pad_retro_note0"), Some(60));
        assert_eq!(frame.get("synth_pad_retro_note1"), Some(64));
        assert_eq!(frame.get("synth_pad_retro_note2"), None);
    }

    #[test]
    fn unknown_name_has_no_code() {
        let mut state = seeded();
        state.scale_mode = "locrian".into();
        match TelemetryFrame::capture(&state) {
            Err(EngineError::TelemetryCode { field, value }) => {
                assert_eq!(field, "scale mode");
                assert_eq!(value, "locrian");
            }
            other => panic!("expected TelemetryCode, got {other:?}"),
        }
    }
}
