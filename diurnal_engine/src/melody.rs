// Melody and percussion triggers.
//
// Melody: at most one motif per tick, gated by a coin flip. The slot is drawn
// from the current scene's bank window, and the same motif is rendered
// independently for every melody instrument of the current and the next
// scene: steps resolve against the scale mode on the chord root, pass once
// through the scale correction (the motif's ignore-list exempt), are moved to
// the key, and are raised by octaves until they sit at or above the
// instrument's base note. Each instrument then gets clear-buffer, schedule and
// fire commands, in that order.
//
// Percussion: an independent coin flip, not drawn at all on a variation
// shift. A hit is a note-on/note-off pair at each percussion instrument's
// base note.

use crate::command::{ClearRange, HostAction, HostCommand, ScheduledNote};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::harmony::TransitionKind;
use crate::motif::{Motif, MotifBank, Step};
use crate::pitch::{Exemption, PitchClassSet, adjust_to_permitted, raise_to_floor};
use crate::state::SongState;
use crate::tables::{ScaleMode, Tables};
use crate::types::{InstrumentRole, Pitch, TimeOfDay};
use diurnal_prng::RandomSource;

/// Render `motif` for an instrument whose lowest note is `base_note`.
pub fn render_motif(
    motif: &Motif,
    scale_mode: &ScaleMode,
    chord_root: Pitch,
    key_offset: Pitch,
    base_note: Pitch,
) -> Vec<ScheduledNote> {
    let candidates: Vec<Pitch> = motif
        .notes
        .iter()
        .map(|note| match note.step {
            Step::Degree(d) => scale_mode.degree_pitch(d) + chord_root,
            Step::Literal(s) => s + chord_root,
        })
        .collect();
    let exemption =
        Exemption::PitchClasses(PitchClassSet::from_pitches(&motif.ignore).transposed(chord_root));
    let adjusted = adjust_to_permitted(&candidates, &scale_mode.pitch_classes, &exemption);
    let keyed: Vec<Pitch> = adjusted.iter().map(|p| p + key_offset).collect();
    let pitches = raise_to_floor(&keyed, base_note);
    motif
        .notes
        .iter()
        .zip(pitches)
        .map(|(note, pitch)| ScheduledNote {
            pitch,
            onset: note.onset,
            duration: note.duration,
            velocity: note.velocity,
            channel: note.channel,
        })
        .collect()
}

/// Maybe fire a motif on every melody instrument of `scenes`.
///
/// Returns the slot fired (or `None` when the coin did not come up) and the
/// commands. `state` is the tick's staged state, after the transition.
pub fn trigger_melody(
    state: &SongState,
    scenes: [TimeOfDay; 2],
    transitioning: bool,
    bank: &MotifBank,
    tables: &Tables,
    config: &EngineConfig,
    rng: &mut impl RandomSource,
) -> Result<(Option<usize>, Vec<HostCommand>)> {
    if !rng.random_bool(config.melody_probability) {
        return Ok((None, Vec::new()));
    }
    let window_start = config.scene(state.current_scene)?.motif_window_start;
    let slot = bank.select(window_start, transitioning, rng);
    let motif = bank.get(slot);
    let scale_mode = tables.scale_mode(&state.scale_mode)?;
    let chord_root = tables.chord(&state.chord)?.root();
    let key_offset = tables.key(&state.key)?.offset;
    log::debug!("melody: slot {slot} '{}'", motif.name);

    let mut commands = Vec::new();
    for scene in scenes {
        let Some(instruments) = state.scene_instruments(scene) else {
            continue;
        };
        for (name, inst) in instruments {
            if inst.role != InstrumentRole::Melody {
                continue;
            }
            let notes = render_motif(motif, scale_mode, chord_root, key_offset, inst.base_note);
            commands.push(HostCommand::new(
                name,
                HostAction::ClearBuffer(ClearRange::beats(config.melody_clear_window)),
            ));
            commands.push(HostCommand::new(name, HostAction::ScheduleNotes(notes)));
            commands.push(HostCommand::new(name, HostAction::Fire));
        }
    }
    Ok((Some(slot), commands))
}

/// Maybe hit every percussion instrument of `scenes` once.
pub fn trigger_percussion(
    state: &SongState,
    scenes: [TimeOfDay; 2],
    kind: TransitionKind,
    config: &EngineConfig,
    rng: &mut impl RandomSource,
) -> Vec<HostCommand> {
    if kind == TransitionKind::VariationShift || !rng.random_bool(config.percussion_probability) {
        return Vec::new();
    }
    let mut commands = Vec::new();
    for scene in scenes {
        let Some(instruments) = state.scene_instruments(scene) else {
            continue;
        };
        for (name, inst) in instruments {
            if inst.role == InstrumentRole::Percussion {
                commands.push(HostCommand::note_on(name, inst.base_note, config.note_velocity));
                commands.push(HostCommand::note_off(name, inst.base_note));
            }
        }
    }
    commands
}
