// Voice-leading engine.
//
// Moves each instrument of a scene from the previous chord to the new one.
// Chord and effect instruments keep each voice as close as possible to where
// it was: every previous pitch class greedily takes the nearest remaining
// target (the target itself or an octave below), and targets nobody took are
// appended as new voices. Bass follows the chord's lowest pitch class.
// Melody instruments hold no chord voices. Percussion and event instruments
// are pitch-independent here. Sound-effect clips are retriggered when the
// host reports them stopped.
//
// The new voice set is diffed against what the instrument is playing: kept
// pitches emit nothing, removed pitches a note-off, added pitches a note-on.
// Instruments come back as new snapshots; the input registry is not touched.

use crate::command::{HostAction, HostCommand};
use crate::config::EngineConfig;
use crate::pitch::{find_closest, normalize, normalize_notes};
use crate::state::{Instrument, SceneInstruments};
use crate::types::{InstrumentId, InstrumentRole, Pitch};
use diurnal_prng::RandomSource;
use std::collections::BTreeMap;

/// Host-reported clip playback positions, in beats. An instrument missing
/// from the map counts as stopped.
pub type PlaybackPositions = BTreeMap<InstrumentId, f64>;

/// Voice-lead `previous` into `targets` for an instrument with `num_voices`
/// voices. Returns pitch offsets (relative to the instrument's base note and
/// key), one per voice.
///
/// Both lists are cut to `num_voices` and folded to pitch classes. Each
/// previous pitch takes its closest remaining target from {t, t - 12}; ties
/// go to the first found. Unused targets are appended unchanged. Previous
/// voices left without a target are dropped.
pub fn lead_voices(previous: &[Pitch], targets: &[Pitch], num_voices: usize) -> Vec<Pitch> {
    let previous = normalize_notes(&previous[..previous.len().min(num_voices)]);
    let mut remaining = normalize_notes(&targets[..targets.len().min(num_voices)]);
    let mut voices = Vec::with_capacity(remaining.len());
    for p in previous {
        let Some((candidate, original)) = find_closest(p, &remaining) else {
            break;
        };
        voices.push(p - normalize(p) as Pitch + candidate);
        if let Some(pos) = remaining.iter().position(|&t| t == original) {
            remaining.remove(pos);
        }
    }
    voices.extend(remaining);
    voices
}

/// Commands taking an instrument from `old` to `new` sounding pitches.
pub fn diff_notes(
    instrument: &InstrumentId,
    old: &[Pitch],
    new: &[Pitch],
    velocity: u8,
) -> Vec<HostCommand> {
    let offs = old
        .iter()
        .filter(|p| !new.contains(p))
        .map(|&p| HostCommand::note_off(instrument, p));
    let ons = new
        .iter()
        .filter(|p| !old.contains(p))
        .map(|&p| HostCommand::note_on(instrument, p, velocity));
    offs.chain(ons).collect()
}

fn dedup_in_order(pitches: Vec<Pitch>) -> Vec<Pitch> {
    let mut out = Vec::with_capacity(pitches.len());
    for p in pitches {
        if !out.contains(&p) {
            out.push(p);
        }
    }
    out
}

/// Voice-lead every instrument of one scene from `previous` to `next` chord
/// notes.
pub fn change_notes_for_scene(
    previous: &[Pitch],
    next: &[Pitch],
    key_offset: Pitch,
    instruments: &SceneInstruments,
    playback: &PlaybackPositions,
    config: &EngineConfig,
    rng: &mut impl RandomSource,
) -> (SceneInstruments, Vec<HostCommand>) {
    let mut updated = SceneInstruments::new();
    let mut commands = Vec::new();

    for (name, inst) in instruments {
        let new_inst = match inst.role {
            InstrumentRole::Percussion | InstrumentRole::Event => inst.clone(),
            InstrumentRole::Sfx => {
                let stopped = playback.get(name).is_none_or(|&pos| pos <= 0.0);
                if stopped && sfx_gate_open(name, config, rng) {
                    commands.push(HostCommand::new(name, HostAction::Fire));
                }
                inst.clone()
            }
            InstrumentRole::Melody => {
                commands.extend(diff_notes(name, &inst.playing_notes, &[], config.note_velocity));
                Instrument {
                    num_voices: 0,
                    ..inst.with_playing_notes(Vec::new())
                }
            }
            InstrumentRole::Bass => {
                let Some(&lowest) = next.iter().min() else {
                    updated.insert(name.clone(), inst.clone());
                    continue;
                };
                let pitch = inst.base_note + normalize(lowest) as Pitch + key_offset;
                let notes = vec![pitch];
                commands.extend(diff_notes(name, &inst.playing_notes, &notes, config.note_velocity));
                inst.with_playing_notes(notes)
            }
            InstrumentRole::Chords | InstrumentRole::Effects => {
                let voices = lead_voices(previous, next, inst.num_voices);
                if voices.len() < inst.num_voices {
                    log::debug!(
                        "{name}: {} of {} voices available, dropping the rest",
                        voices.len(),
                        inst.num_voices
                    );
                }
                let notes = dedup_in_order(
                    voices.iter().map(|v| inst.base_note + v + key_offset).collect(),
                );
                commands.extend(diff_notes(name, &inst.playing_notes, &notes, config.note_velocity));
                inst.with_playing_notes(notes)
            }
        };
        updated.insert(name.clone(), new_inst);
    }
    (updated, commands)
}

/// Whether a stopped sfx clip retriggers this tick. Ungated instruments
/// always do and draw nothing.
fn sfx_gate_open(name: &InstrumentId, config: &EngineConfig, rng: &mut impl RandomSource) -> bool {
    match config.sfx_gates.get(name) {
        Some(&p) if p < 1.0 => rng.random_bool(p),
        _ => true,
    }
}
