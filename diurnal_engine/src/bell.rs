// Event instruments: bells and chimes struck on their own trigger.
//
// The bell trigger is a separate control edge from the main tick. Each edge
// observes the bell countdown; when it is due, every event instrument of the
// current and next scene releases what it was ringing and strikes one chord
// tone (a uniformly chosen pitch class of the current chord notes) above its
// base note, in the current key. The countdown is then reset into the
// configured range.
//
// Like the main tick this is a pure step over an owned staged state; the
// session commits it and dispatches the commands.

use crate::command::HostCommand;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::pitch::normalize_notes;
use crate::state::{SongState, observe_countdown};
use crate::tables::Tables;
use crate::types::{InstrumentRole, Pitch};
use diurnal_prng::RandomSource;

/// Result of one bell trigger edge.
#[derive(Clone, Debug)]
pub struct BellOutcome {
    pub state: SongState,
    pub commands: Vec<HostCommand>,
    /// Whether the countdown was due and the bells were struck.
    pub rang: bool,
}

pub fn ring_bells(
    state: SongState,
    tables: &Tables,
    config: &EngineConfig,
    rng: &mut impl RandomSource,
) -> Result<BellOutcome> {
    let mut state = state;
    if !observe_countdown(&mut state.timers.bell) {
        return Ok(BellOutcome {
            state,
            commands: Vec::new(),
            rang: false,
        });
    }

    let key_offset = tables.key(&state.key)?.offset;
    let classes = normalize_notes(&state.chord_notes);
    let scenes = [state.current_scene, state.next_scene(config)?];
    let mut commands = Vec::new();

    for scene in scenes {
        let Some(instruments) = state.instruments.get_mut(&scene) else {
            continue;
        };
        for (name, inst) in instruments.iter_mut() {
            if inst.role != InstrumentRole::Event {
                continue;
            }
            let Some(&pc) = rng.choose(&classes) else {
                continue;
            };
            for &p in &inst.playing_notes {
                commands.push(HostCommand::note_off(name, p));
            }
            let pitch: Pitch = inst.base_note + pc + key_offset;
            commands.push(HostCommand::note_on(name, pitch, config.note_velocity));
            *inst = inst.with_playing_notes(vec![pitch]);
        }
    }

    let range = config.bell_timer;
    state.timers.bell = rng.range_u32_inclusive(range.min, range.max);
    log::debug!("bells struck, next in {} edges", state.timers.bell);
    Ok(BellOutcome {
        state,
        commands,
        rang: true,
    })
}
