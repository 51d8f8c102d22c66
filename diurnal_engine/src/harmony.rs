// Harmony transition engine.
//
// Every tick makes exactly one harmonic move:
//
// 1. Key change, when the key-change countdown is due: a new key from the
//    current key's target list, a scale mode per `ScaleModePolicy`, and a
//    reset to the tonic chord "I" / "major triad" whose notes are scale
//    degrees 1, 3 and 5.
// 2. Chord change, when the chord-change countdown is due and the current
//    variation is not a tension: a new chord from the current chord's
//    transitions and either a random variation or the chord's plain triad.
// 3. Variation shift otherwise: a new variation from the current variation's
//    transitions over the current chord root.
//
// A host may force the kind; the choices inside the kind stay random.
//
// Chord pitches are the variation's offsets on the chord root, then passed
// once through `pitch::adjust_to_permitted`. Variations of a scale-following
// kind, and borrowed chords, are corrected against the scale mode; any other
// variation is checked against its own offsets as pitch classes, untransposed,
// so it keeps its shape only on a root of 0. Exempt tones come from the
// variation's ignore-list (on the chord root), or from the legacy index rule.
//
// Draw order (matters for scripted tests): the transition's choices in the
// order above, then the reset of the countdown that fired.

use crate::config::{ChordExemption, EngineConfig, ScaleModePolicy};
use crate::error::Result;
use crate::pitch::{Exemption, PitchClassSet, adjust_to_permitted};
use crate::state::{SongState, Timers, observe_countdown};
use crate::tables::{
    Chord, ChordVariation, ScaleMode, TONIC_CHORD, TONIC_VARIATION, Tables, Tension,
};
use crate::types::Pitch;
use diurnal_prng::RandomSource;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    KeyChange,
    ChordChange,
    VariationShift,
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransitionKind::KeyChange => "key change",
            TransitionKind::ChordChange => "chord change",
            TransitionKind::VariationShift => "variation shift",
        };
        f.write_str(name)
    }
}

/// The outcome of one harmony decision: the new descriptor, its pitches and
/// the countdowns after this tick.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub kind: TransitionKind,
    pub key: String,
    pub scale_mode: String,
    pub chord: String,
    pub chord_variation: String,
    pub chord_notes: Vec<Pitch>,
    pub timers: Timers,
}

/// Per-tick inputs to the harmony decision that do not live in the state.
#[derive(Clone, Copy, Debug, Default)]
pub struct HarmonyInput<'a> {
    /// Mood tag for `ScaleModePolicy::MoodWeighted`.
    pub mood: Option<&'a str>,
    /// Host override of the transition kind.
    pub force: Option<TransitionKind>,
}

/// Decide this tick's transition from `state`.
///
/// Every name in the current descriptor is resolved first, so a state naming
/// an unknown key, scale mode, chord or variation is a `LookupMiss` whatever
/// kind would have been chosen.
pub fn next_transition(
    state: &SongState,
    tables: &Tables,
    config: &EngineConfig,
    input: HarmonyInput<'_>,
    rng: &mut impl RandomSource,
) -> Result<Transition> {
    let key = tables.key(&state.key)?;
    let scale_mode = tables.scale_mode(&state.scale_mode)?;
    let chord = tables.chord(&state.chord)?;
    let variation = tables.variation(&state.chord_variation)?;

    let mut timers = state.timers;
    let key_due = observe_countdown(&mut timers.key_change);
    let chord_due = observe_countdown(&mut timers.chord_change);

    let kind = input.force.unwrap_or(if key_due {
        TransitionKind::KeyChange
    } else if chord_due && variation.tension != Tension::Tension {
        TransitionKind::ChordChange
    } else {
        TransitionKind::VariationShift
    });

    let mut transition = match kind {
        TransitionKind::KeyChange => {
            let new_key = pick(rng, &key.targets, &key.name);
            let new_mode = pick_scale_mode(state, tables, config, scale_mode, input.mood, rng)?;
            Transition {
                kind,
                key: new_key,
                scale_mode: new_mode.name.clone(),
                chord: TONIC_CHORD.to_string(),
                chord_variation: TONIC_VARIATION.to_string(),
                chord_notes: new_mode.tonic_triad(),
                timers,
            }
        }
        TransitionKind::ChordChange => {
            let new_chord = tables.chord(&pick(rng, &chord.transitions, &chord.name))?;
            let new_variation = if rng.random_bool(config.random_variation_probability) {
                tables.variation(&pick(rng, tables.variation_names(), &variation.name))?
            } else {
                tables.variation(&new_chord.triad_name())?
            };
            Transition {
                kind,
                key: key.name.clone(),
                scale_mode: scale_mode.name.clone(),
                chord: new_chord.name.clone(),
                chord_variation: new_variation.name.clone(),
                chord_notes: chord_pitches(new_chord, new_variation, scale_mode, config),
                timers,
            }
        }
        TransitionKind::VariationShift => {
            let new_variation = tables.variation(&pick(rng, &variation.transitions, &variation.name))?;
            Transition {
                kind,
                key: key.name.clone(),
                scale_mode: scale_mode.name.clone(),
                chord: chord.name.clone(),
                chord_variation: new_variation.name.clone(),
                chord_notes: chord_pitches(chord, new_variation, scale_mode, config),
                timers,
            }
        }
    };

    match kind {
        TransitionKind::KeyChange => {
            let range = config.key_change_timer;
            transition.timers.key_change = rng.range_u32_inclusive(range.min, range.max);
        }
        TransitionKind::ChordChange => {
            let range = config.chord_change_timer;
            transition.timers.chord_change = rng.range_u32_inclusive(range.min, range.max);
        }
        TransitionKind::VariationShift => {}
    }
    Ok(transition)
}

/// Uniform choice from a validated, non-empty name list. Falls back to
/// `current` for an empty list (only reachable with unvalidated tables).
fn pick(rng: &mut impl RandomSource, names: &[String], current: &str) -> String {
    rng.choose(names).cloned().unwrap_or_else(|| current.to_string())
}

fn pick_scale_mode<'t>(
    state: &SongState,
    tables: &'t Tables,
    config: &EngineConfig,
    current: &ScaleMode,
    mood: Option<&str>,
    rng: &mut impl RandomSource,
) -> Result<&'t ScaleMode> {
    let scene_mode = tables.scale_mode(&config.scene(state.current_scene)?.scale_mode)?;
    match config.scale_mode_policy {
        ScaleModePolicy::SceneFixed => Ok(scene_mode),
        ScaleModePolicy::MoodWeighted => {
            let mood = mood.unwrap_or(&scene_mode.mood);
            let candidates = tables.scale_modes_with_mood(mood);
            match rng.choose(&candidates) {
                Some(mode) => Ok(*mode),
                None => {
                    log::debug!("no scale mode tagged '{mood}', keeping '{}'", current.name);
                    tables.scale_mode(&current.name)
                }
            }
        }
    }
}

/// Pitches of `variation` built on `chord`'s root, corrected into the
/// permitted set for this chord and scale mode.
pub fn chord_pitches(
    chord: &Chord,
    variation: &ChordVariation,
    scale_mode: &ScaleMode,
    config: &EngineConfig,
) -> Vec<Pitch> {
    let root = chord.root();
    let candidates: Vec<Pitch> = variation.notes.iter().map(|n| n + root).collect();
    let borrowed = config.borrowed_chords.iter().any(|c| *c == chord.name);
    let permitted = if variation.kind.follows_scale() || borrowed {
        scale_mode.pitch_classes
    } else {
        PitchClassSet::from_pitches(&variation.notes)
    };
    let exemption = match config.chord_exemption {
        ChordExemption::IgnoreList => {
            Exemption::PitchClasses(PitchClassSet::from_pitches(&variation.ignore).transposed(root))
        }
        ChordExemption::LegacyIndex(i) => Exemption::Index(i),
    };
    adjust_to_permitted(&candidates, &permitted, &exemption)
}
