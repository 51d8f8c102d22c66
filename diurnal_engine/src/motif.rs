// The motif bank: sixteen melodic fragments the melody instruments play.
//
// Each motif is a short list of notes whose pitch is either a scale degree
// (resolved against the current scale mode) or a literal semitone offset,
// both measured from the current chord root. Each note carries its onset and
// duration in beats, a velocity and a MIDI channel. A motif's ignore-list
// names chromatic offsets (from the chord root) that the scale correction
// leaves alone.
//
// The bank is laid out in four overlapping windows of eight slots, one per
// scene: Day starts at slot 0, Evening at 4, Night at 8, Morning at 12
// (wrapping). Slots 3, 7, 11 and 15 all hold the main theme, so every window
// contains it twice, once in its first half and once in the second half that
// is used while the scene is crossfading out.
//
// The default bank is built in code; `MotifBank::load()` reads a replacement
// from JSON.

use crate::error::{EngineError, Result};
use diurnal_prng::RandomSource;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const BANK_SIZE: usize = 16;

/// Slots holding the main theme.
pub const MAIN_THEME_SLOTS: [usize; 4] = [3, 7, 11, 15];

/// Width of a scene's window into the bank.
const WINDOW: usize = 8;

/// First raw index drawn while the current scene is crossfading.
const TRANSITION_WINDOW_START: usize = 4;

/// How a motif note's pitch is given.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    /// Zero-based scale degree; may leave 0..7 to reach other octaves.
    Degree(i32),
    /// Semitones above the chord root.
    Literal(i32),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MotifNote {
    pub step: Step,
    pub onset: f64,
    pub duration: f64,
    pub velocity: u8,
    pub channel: u8,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Motif {
    pub name: String,
    pub notes: Vec<MotifNote>,
    #[serde(default)]
    pub ignore: Vec<i32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MotifBank {
    pub motifs: Vec<Motif>,
}

/// Raw bank index for this tick: uniform over the scene's whole window, or
/// over its second half while the scene is crossfading out.
pub fn draw_raw_index(transitioning: bool, rng: &mut impl RandomSource) -> usize {
    let low = if transitioning { TRANSITION_WINDOW_START } else { 0 };
    rng.range_usize(low, WINDOW)
}

/// Bank slot of a raw index within a window.
pub fn slot_for(raw: usize, window_start: usize) -> usize {
    (raw + window_start) % BANK_SIZE
}

impl MotifBank {
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let bank: MotifBank = serde_json::from_str(&json)?;
        bank.validate()?;
        Ok(bank)
    }

    fn validate(&self) -> Result<()> {
        if self.motifs.len() != BANK_SIZE {
            return Err(EngineError::InvalidConfig(format!(
                "motif bank has {} motifs, expected {BANK_SIZE}",
                self.motifs.len()
            )));
        }
        if let Some(empty) = self.motifs.iter().find(|m| m.notes.is_empty()) {
            return Err(EngineError::InvalidConfig(format!("motif '{}' has no notes", empty.name)));
        }
        Ok(())
    }

    /// Motif in `slot`, wrapping past the end of the bank.
    pub fn get(&self, slot: usize) -> &Motif {
        &self.motifs[slot % self.motifs.len()]
    }

    /// Draw a slot from the window starting at `window_start`.
    pub fn select(&self, window_start: usize, transitioning: bool, rng: &mut impl RandomSource) -> usize {
        slot_for(draw_raw_index(transitioning, rng), window_start)
    }

    pub fn default_bank() -> Self {
        use Step::{Degree as D, Literal as L};
        let theme = motif(
            "main theme",
            &[
                (D(4), 0.0, 1.0),
                (D(2), 1.0, 0.5),
                (D(3), 1.5, 0.5),
                (D(4), 2.0, 1.0),
                (D(7), 3.0, 1.5),
                (D(6), 4.5, 0.5),
                (D(4), 5.0, 2.0),
            ],
            90,
            &[],
        );
        let motifs = vec![
            // Day
            motif("rising steps", &[(D(0), 0.0, 0.5), (D(1), 0.5, 0.5), (D(2), 1.0, 0.5), (D(4), 1.5, 1.5)], 96, &[]),
            motif("arp up", &[(D(0), 0.0, 0.5), (D(2), 0.5, 0.5), (D(4), 1.0, 0.5), (D(7), 1.5, 1.0)], 100, &[]),
            motif(
                "bounce",
                &[(D(4), 0.0, 0.25), (D(0), 0.5, 0.25), (D(4), 1.0, 0.25), (D(5), 1.5, 0.5), (D(4), 2.0, 1.0)],
                104,
                &[],
            ),
            theme.clone(),
            // Day crossfade / Evening
            motif("falling steps", &[(D(4), 0.0, 1.0), (D(3), 1.0, 1.0), (D(2), 2.0, 1.0), (D(0), 3.0, 2.0)], 84, &[]),
            motif(
                "blue turn",
                &[(D(2), 0.0, 0.5), (L(3), 0.5, 0.5), (D(1), 1.0, 0.5), (D(0), 1.5, 1.5)],
                88,
                &[3],
            ),
            motif("call", &[(D(0), 0.0, 1.0), (D(4), 1.0, 2.0), (D(3), 3.0, 1.0), (D(4), 4.0, 2.0)], 80, &[]),
            theme.clone(),
            // Evening crossfade / Night
            motif("hymn", &[(D(2), 0.0, 2.0), (D(1), 2.0, 2.0), (D(0), 4.0, 4.0)], 70, &[]),
            motif("lament", &[(D(4), 0.0, 1.5), (D(3), 1.5, 0.5), (D(2), 2.0, 1.0), (D(1), 3.0, 3.0)], 64, &[]),
            motif(
                "low answer",
                &[(D(-3), 0.0, 1.0), (D(-1), 1.0, 1.0), (D(0), 2.0, 3.0)],
                72,
                &[],
            ),
            theme.clone(),
            // Night crossfade / Morning
            motif("dawn fifths", &[(D(0), 0.0, 2.0), (D(4), 2.0, 2.0), (D(8), 4.0, 4.0)], 60, &[]),
            motif(
                "bird call",
                &[(D(7), 0.0, 0.25), (D(9), 0.25, 0.25), (D(7), 0.5, 0.25), (L(11), 1.0, 0.5), (D(7), 1.5, 1.0)],
                76,
                &[11],
            ),
            motif("breath", &[(D(2), 0.0, 3.0), (D(3), 3.0, 1.0), (D(2), 4.0, 4.0)], 58, &[]),
            theme,
        ];
        MotifBank { motifs }
    }
}

fn motif(name: &str, notes: &[(Step, f64, f64)], velocity: u8, ignore: &[i32]) -> Motif {
    Motif {
        name: name.to_string(),
        notes: notes
            .iter()
            .map(|&(step, onset, duration)| MotifNote {
                step,
                onset,
                duration,
                velocity,
                channel: 0,
            })
            .collect(),
        ignore: ignore.to_vec(),
    }
}
